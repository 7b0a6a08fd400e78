//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Decision core for apartment-management resident requests.
#[derive(Debug, Parser)]
#[command(name = "domus", version, about)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a knowledge-base directory into the vector store.
    Ingest {
        /// Directory of front-matter policy files.
        #[arg(long, env = "DOMUS_KB_DIR")]
        kb_dir: PathBuf,
    },
    /// Classify a message without running the rest of the pipeline.
    Classify {
        /// Resident identifier.
        #[arg(long)]
        resident_id: String,
        /// Message text.
        #[arg(long)]
        message: String,
    },
    /// Ask a policy question and get a grounded answer.
    Ask {
        /// Resident identifier.
        #[arg(long)]
        resident_id: String,
        /// Question text.
        #[arg(long)]
        message: String,
        /// Building the resident belongs to.
        #[arg(long)]
        building_id: String,
    },
    /// Submit a request through the full pipeline.
    Submit {
        /// Resident identifier.
        #[arg(long)]
        resident_id: String,
        /// Message text.
        #[arg(long)]
        message: String,
        /// Building the resident belongs to.
        #[arg(long)]
        building_id: String,
        /// Optional resident preferences.
        #[arg(long)]
        preferences: Option<String>,
        /// Risk score from the external predictor, in [0,1].
        #[arg(long, default_value_t = 0.0)]
        risk_score: f64,
        /// Risk level from the external predictor.
        #[arg(long, value_enum, default_value_t = RiskLevelArg::Low)]
        risk_level: RiskLevelArg,
    },
}

/// CLI mirror of the external risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RiskLevelArg {
    /// High operational risk.
    High,
    /// Medium operational risk.
    Medium,
    /// Low operational risk.
    Low,
}

impl From<RiskLevelArg> for crate::core::RiskLevel {
    fn from(level: RiskLevelArg) -> Self {
        match level {
            RiskLevelArg::High => Self::High,
            RiskLevelArg::Medium => Self::Medium,
            RiskLevelArg::Low => Self::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from(["domus", "ingest", "--kb-dir", "/tmp/kb"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_parse_submit_with_risk() {
        let cli = Cli::try_parse_from([
            "domus",
            "submit",
            "--resident-id",
            "RES_1",
            "--message",
            "My AC is broken",
            "--building-id",
            "B1",
            "--risk-score",
            "0.7",
            "--risk-level",
            "high",
        ]);
        let cli = cli.unwrap_or_else(|e| fail(&e));
        match cli.command {
            Commands::Submit {
                risk_score,
                risk_level,
                ..
            } => {
                assert!((risk_score - 0.7).abs() < f64::EPSILON);
                assert_eq!(risk_level, RiskLevelArg::High);
            }
            _ => fail(&"expected submit"),
        }
    }

    #[test]
    fn test_parse_json_format() {
        let cli = Cli::try_parse_from([
            "domus",
            "--format",
            "json",
            "classify",
            "--resident-id",
            "R",
            "--message",
            "text",
        ]);
        assert!(cli.map(|c| c.format == OutputFormat::Json).unwrap_or(false));
    }

    fn fail<T: std::fmt::Debug + ?Sized>(value: &T) -> ! {
        unreachable!("unexpected: {value:?}")
    }
}
