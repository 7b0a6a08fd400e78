//! Incoming resident message.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Minimum accepted message length in characters.
pub const MIN_MESSAGE_CHARS: usize = 10;

/// Maximum accepted message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// A free-form message from a resident. Immutable input to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidentMessage {
    /// Identifier of the resident (e.g. `RES_Building123_1001`).
    pub resident_id: String,
    /// The message body, 10-5000 characters.
    pub message_text: String,
    /// Optional free-text preferences (e.g. "prefer weekday mornings").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<String>,
}

impl ResidentMessage {
    /// Creates a message without preferences.
    #[must_use]
    pub fn new(resident_id: impl Into<String>, message_text: impl Into<String>) -> Self {
        Self {
            resident_id: resident_id.into(),
            message_text: message_text.into(),
            preferences: None,
        }
    }

    /// Validates the message length bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the text is shorter than
    /// [`MIN_MESSAGE_CHARS`] or longer than [`MAX_MESSAGE_CHARS`].
    pub fn validate(&self) -> Result<(), Error> {
        let chars = self.message_text.chars().count();
        if chars < MIN_MESSAGE_CHARS {
            return Err(Error::InvalidInput {
                message: format!("message too short ({chars} chars, minimum {MIN_MESSAGE_CHARS})"),
            });
        }
        if chars > MAX_MESSAGE_CHARS {
            return Err(Error::InvalidInput {
                message: format!("message too long ({chars} chars, maximum {MAX_MESSAGE_CHARS})"),
            });
        }
        Ok(())
    }
}
