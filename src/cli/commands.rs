//! Command execution.

use crate::agent::Orchestrator;
use crate::config::CoreConfig;
use crate::core::{ResidentMessage, RiskAssessment};
use crate::error::{AgentError, Error, Result};
use crate::kb::{PolicyChunker, ingest_directory};
use crate::store::VectorStore;

use super::parser::{Cli, Commands, OutputFormat};

/// Executes the parsed CLI command and returns its rendered output.
///
/// # Errors
///
/// Returns configuration, ingestion, or pipeline errors. Pipeline error
/// *results* (escalations) are rendered as output, not returned as `Err`.
pub fn execute(cli: &Cli) -> Result<String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Config {
        message: format!("failed to start runtime: {e}"),
    })?;

    match &cli.command {
        Commands::Ingest { kb_dir } => {
            let config = load_config_keyless()?;
            let chunker =
                PolicyChunker::new(config.chunk_size_chars, config.chunk_overlap_chars)?;
            let embedder = crate::embedding::create_embedder(&config.embedding_model_id)?;
            let store = VectorStore::open(
                &config.vector_store_path,
                &config.vector_store_collection,
            )?;
            let report = ingest_directory(kb_dir, &chunker, &*embedder, &store)?;
            render(cli.format, &report, |r| {
                format!(
                    "Ingested {} documents ({} chunks); skipped {}, failed {}.",
                    r.documents, r.chunks, r.skipped, r.failed
                )
            })
        }
        Commands::Classify {
            resident_id: _,
            message,
        } => {
            let config = CoreConfig::from_env()?;
            let provider = crate::agent::create_provider(&config)?;
            let prompts = crate::agent::PromptSet::load(config.prompt_dir.as_deref());
            let classifier = crate::agent::Classifier::new(&config, prompts.classifier);
            let classification = runtime
                .block_on(classifier.classify(&*provider, message))
                .map_err(Error::from)?;
            render(cli.format, &classification, |c| {
                format!(
                    "category={} urgency={} intent={} confidence={:.2}",
                    c.category, c.urgency, c.intent, c.confidence
                )
            })
        }
        Commands::Ask {
            resident_id,
            message,
            building_id,
        } => {
            let config = CoreConfig::from_env()?;
            let orchestrator = Orchestrator::from_config(config)?;
            let request = ResidentMessage::new(resident_id.clone(), message.clone());
            let result = runtime.block_on(orchestrator.handle_message(
                &request,
                building_id,
                RiskAssessment::default(),
            ))?;
            render(cli.format, &result, render_result)
        }
        Commands::Submit {
            resident_id,
            message,
            building_id,
            preferences,
            risk_score,
            risk_level,
        } => {
            let config = CoreConfig::from_env()?;
            let orchestrator = Orchestrator::from_config(config)?;
            let request = ResidentMessage {
                resident_id: resident_id.clone(),
                message_text: message.clone(),
                preferences: preferences.clone(),
            };
            let risk = RiskAssessment::new(*risk_score, (*risk_level).into());
            let result =
                runtime.block_on(orchestrator.handle_message(&request, building_id, risk))?;
            render(cli.format, &result, render_result)
        }
    }
}

fn load_config_keyless() -> Result<CoreConfig> {
    match CoreConfig::from_env() {
        Ok(config) => Ok(config),
        // Ingestion never talks to the LLM; a missing key is fine.
        Err(AgentError::ApiKeyMissing) => CoreConfig::builder()
            .from_env()
            .api_key(String::new())
            .build()
            .map_err(Error::from),
        Err(e) => Err(e.into()),
    }
}

fn render<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl Fn(&T) -> String,
) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| Error::Config {
                message: format!("serialization failed: {e}"),
            }),
        OutputFormat::Text => Ok(format!("{}\n", text(value))),
    }
}

fn render_result(result: &crate::agent::HandleResult) -> String {
    match result {
        crate::agent::HandleResult::Answered {
            classification,
            answer,
        } => {
            let sources: Vec<&str> = answer.sources.iter().map(|s| s.doc_id.as_str()).collect();
            format!(
                "[{}/{}] {}\nsources: {:?} (confidence {:.2})",
                classification.category,
                classification.urgency,
                answer.text,
                sources,
                answer.confidence
            )
        }
        crate::agent::HandleResult::Submitted {
            classification,
            simulation,
            decision,
        } => {
            let mut out = format!(
                "[{}/{}] {} options, chose {}\n{}\n",
                classification.category,
                classification.urgency,
                simulation.options.len(),
                decision.chosen_option_id,
                decision.reasoning
            );
            for option in &simulation.options {
                let marker = if option.option_id == decision.chosen_option_id {
                    "*"
                } else {
                    " "
                };
                out.push_str(&format!(
                    "{marker} {}: {} (${:.0}, {:.1}h, score {:.2})\n",
                    option.option_id,
                    option.action,
                    option.estimated_cost,
                    option.estimated_time,
                    decision.policy_scores.get(&option.option_id).copied().unwrap_or_default(),
                ));
            }
            out
        }
        crate::agent::HandleResult::Error {
            message,
            escalation_required,
            ..
        } => format!("error: {message} (escalation_required={escalation_required})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Category, Classification, Intent, Urgency};

    #[test]
    fn test_render_json() {
        let classification = Classification {
            category: Category::Billing,
            urgency: Urgency::Low,
            intent: Intent::AnswerQuestion,
            confidence: 0.8,
        };
        let out = render(OutputFormat::Json, &classification, |_| String::new())
            .unwrap_or_default();
        assert!(out.contains("\"Billing\""));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_render_text() {
        let classification = Classification {
            category: Category::Billing,
            urgency: Urgency::Low,
            intent: Intent::AnswerQuestion,
            confidence: 0.8,
        };
        let out = render(OutputFormat::Text, &classification, |c| {
            format!("category={}", c.category)
        })
        .unwrap_or_default();
        assert_eq!(out, "category=Billing\n");
    }
}
