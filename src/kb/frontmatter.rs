//! Front-matter parsing for knowledge-base documents.
//!
//! Metadata and body are separated at the first parse step and never
//! recombined: chunk text downstream must not contain the `---` block.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::KbError;

/// Sentinel `building_id` meaning the document applies everywhere.
pub const ALL_BUILDINGS: &str = "all_buildings";

/// Document type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// Resident-facing policy.
    Policy,
    /// Standard operating procedure.
    Sop,
    /// Service or vendor catalog.
    Catalog,
    /// Service-level agreement.
    Sla,
    /// Cost reference table.
    Cost,
    /// Option-scoring guidance.
    Scoring,
}

impl DocType {
    /// Parses a document type string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "policy" => Some(Self::Policy),
            "sop" => Some(Self::Sop),
            "catalog" => Some(Self::Catalog),
            "sla" => Some(Self::Sla),
            "cost" => Some(Self::Cost),
            "scoring" => Some(Self::Scoring),
            _ => None,
        }
    }

    /// Returns the wire string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Sop => "sop",
            Self::Catalog => "catalog",
            Self::Sla => "sla",
            Self::Cost => "cost",
            Self::Scoring => "scoring",
        }
    }
}

/// Parsed front-matter metadata for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Unique document id.
    pub doc_id: String,
    /// Document type.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Category the document belongs to (free string; compared
    /// case-insensitively against the classifier's category).
    pub category: String,
    /// Building scope: a building id or [`ALL_BUILDINGS`].
    pub building_id: String,
    /// Semver-ish version string.
    pub version: String,
    /// Date the document took effect.
    pub effective_date: NaiveDate,
    /// Date of the last revision. Used as a retrieval tie-break.
    pub last_updated: NaiveDate,
    /// Optional search keywords.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Optional priority hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Optional author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Optional approver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

impl DocMetadata {
    /// Flattens the metadata into scalar values suitable for a filterable
    /// chunk store. List-valued fields are joined into a comma-separated
    /// string so every value stays scalar.
    #[must_use]
    pub fn to_scalar_map(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("doc_id".to_string(), Value::from(self.doc_id.clone()));
        map.insert("type".to_string(), Value::from(self.doc_type.as_str()));
        map.insert("category".to_string(), Value::from(self.category.clone()));
        map.insert(
            "building_id".to_string(),
            Value::from(self.building_id.clone()),
        );
        map.insert("version".to_string(), Value::from(self.version.clone()));
        map.insert(
            "effective_date".to_string(),
            Value::from(self.effective_date.to_string()),
        );
        map.insert(
            "last_updated".to_string(),
            Value::from(self.last_updated.to_string()),
        );
        if !self.keywords.is_empty() {
            map.insert(
                "keywords".to_string(),
                Value::from(self.keywords.join(",")),
            );
        }
        if let Some(ref priority) = self.priority {
            map.insert("priority".to_string(), Value::from(priority.clone()));
        }
        if let Some(ref author) = self.author {
            map.insert("author".to_string(), Value::from(author.clone()));
        }
        if let Some(ref approver) = self.approver {
            map.insert("approver".to_string(), Value::from(approver.clone()));
        }
        map
    }
}

/// Splits a raw file into `(front_matter_yaml, body)`.
///
/// The file must begin with a `---` line; the block ends at the next `---`
/// line. Returns `None` when no recognisable block is present, in which
/// case the caller skips the file.
#[must_use]
pub fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    // Find the closing delimiter on its own line.
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Parses the YAML front-matter block of one document.
///
/// # Errors
///
/// Returns [`KbError::MalformedFrontMatter`] when the block is not a YAML
/// mapping and [`KbError::MissingMetadata`] naming the first absent
/// required field (`doc_id`, `type`, `category`, `building_id`, `version`).
pub fn parse_metadata(path: &Path, yaml: &str) -> Result<DocMetadata, KbError> {
    let mapping: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| KbError::MalformedFrontMatter {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let mapping = mapping
        .as_mapping()
        .ok_or_else(|| KbError::MalformedFrontMatter {
            path: path.to_path_buf(),
            reason: "front matter is not a key/value mapping".to_string(),
        })?;

    let get_str = |key: &str| -> Option<String> {
        mapping.get(key).and_then(|v| match v {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    let require = |key: &'static str| -> Result<String, KbError> {
        get_str(key).ok_or_else(|| KbError::MissingMetadata {
            path: path.to_path_buf(),
            field: key.to_string(),
        })
    };

    let doc_id = require("doc_id")?;
    let type_str = require("type")?;
    let doc_type = DocType::parse(&type_str).ok_or_else(|| KbError::MalformedFrontMatter {
        path: path.to_path_buf(),
        reason: format!("unknown document type `{type_str}`"),
    })?;
    let category = require("category")?;
    let building_id = require("building_id")?;
    let version = require("version")?;

    // Dates are part of the interface but absent from some legacy files;
    // fall back to the epoch with a warning so tie-breaks stay total.
    let parse_date = |key: &str| -> NaiveDate {
        get_str(key)
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .unwrap_or_else(|| {
                warn!(path = %path.display(), field = key, "missing or unparseable date, defaulting to epoch");
                NaiveDate::default()
            })
    };
    let effective_date = parse_date("effective_date");
    let last_updated = parse_date("last_updated");

    let keywords = mapping
        .get("keywords")
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(DocMetadata {
        doc_id,
        doc_type,
        category,
        building_id,
        version,
        effective_date,
        last_updated,
        keywords,
        priority: get_str("priority"),
        author: get_str("author"),
        approver: get_str("approver"),
    })
}
