//! Command-line interface for the decision core.

pub mod commands;
pub mod parser;

pub use commands::execute;
pub use parser::{Cli, Commands, OutputFormat};
