//! Language-model enrichment of scored projects.
//!
//! An [`Enricher`] turns one project's facts and scores into an
//! [`Enrichment`]. Backends are selected from configuration with
//! [`from_config`]; the pipeline treats every backend the same and owns the
//! timeout and cancellation around each call.

mod claude_cli;
mod codex_cli;
#[cfg(feature = "http-enrichers")]
mod http;
mod process;
pub mod prompt;

pub use claude_cli::ClaudeCliEnricher;
pub use codex_cli::CodexCliEnricher;
#[cfg(feature = "http-enrichers")]
pub use http::{MlxEnricher, OllamaEnricher, OpenRouterEnricher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::db::{EnrichmentRecord, MetadataFill};
use crate::error::{Error, Result};
use crate::github::GitHubData;
use crate::scan::FactRecord;
use crate::scoring::Scored;

/// Errors from a single enrichment call.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("enrichment timed out after {0}s")]
    Timeout(u64),

    #[error("enrichment cancelled")]
    Cancelled,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider process failed: {0}")]
    Process(String),

    #[error("provider request failed: {0}")]
    Http(String),

    #[error("unusable provider response: {0}")]
    Parse(String),
}

/// Everything a backend sees about one project.
#[derive(Debug, Clone)]
pub struct EnrichmentInput {
    pub fact: FactRecord,
    pub scored: Scored,
    pub previous_summary: Option<String>,
    /// Repository data collected this run, when the project is on GitHub.
    pub github: Option<GitHubData>,
}

/// Parsed analysis returned by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub summary: String,
    pub next_action: String,
    pub phase: String,
    pub phase_reason: String,
    pub tags: Vec<String>,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub framework: Option<String>,
    pub primary_language: Option<String>,
    pub goal: Option<String>,
    pub audience: Option<String>,
    pub success_metrics: Option<String>,
    pub publish_target: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Enrichment {
    /// Enrichment layer row for a successful call.
    pub fn to_record(&self, project_id: &str, generated_at: i64) -> EnrichmentRecord {
        EnrichmentRecord {
            project_id: project_id.to_string(),
            summary: non_empty(&self.summary),
            next_action: non_empty(&self.next_action),
            phase: non_empty(&self.phase),
            phase_reason: non_empty(&self.phase_reason),
            risks: self.risks.clone(),
            recommendations: self.recommendations.clone(),
            tags: Some(self.tags.clone()),
            framework: self.framework.clone(),
            primary_language: self.primary_language.clone(),
            generated_at: Some(generated_at),
            error: None,
        }
    }

    /// Metadata suggestions carried by this analysis.
    pub fn metadata_fill(&self) -> MetadataFill {
        MetadataFill {
            goal: self.goal.clone(),
            audience: self.audience.clone(),
            success_metrics: self.success_metrics.clone(),
            next_action: non_empty(&self.next_action),
            publish_target: self.publish_target.clone(),
        }
    }
}

/// A language-model backend.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Provider name used in logs and events.
    fn name(&self) -> &str;

    /// Analyze one project. Must be cancel-safe: dropping the future
    /// abandons the call and releases any child process or connection.
    async fn enrich(&self, input: &EnrichmentInput) -> std::result::Result<Enrichment, EnrichError>;
}

/// Providers that can act on the filesystem, built only with `allow_unsafe`.
pub const UNSAFE_PROVIDERS: [&str; 1] = ["codex-cli"];

/// Build the configured backend, or `None` when enrichment is disabled.
pub fn from_config(config: &LlmConfig) -> Result<Option<Arc<dyn Enricher>>> {
    if !config.enabled {
        return Ok(None);
    }

    let provider = config.provider.as_str();
    if UNSAFE_PROVIDERS.contains(&provider) && !config.allow_unsafe {
        return Err(Error::config(format!(
            "LLM_PROVIDER \"{}\" can perform agentic actions (file edits, commands). \
             Set LLM_ALLOW_UNSAFE=true to enable it.",
            provider
        )));
    }

    let enricher: Arc<dyn Enricher> = match provider {
        "claude-cli" => Arc::new(ClaudeCliEnricher::new(config.claude_model.clone()).with_debug(config.debug)),
        "codex-cli" => Arc::new(CodexCliEnricher::new().with_debug(config.debug)),
        #[cfg(feature = "http-enrichers")]
        "ollama" => Arc::new(OllamaEnricher::new(&config.ollama_url, &config.ollama_model)?),
        #[cfg(feature = "http-enrichers")]
        "openrouter" => {
            let key = config.openrouter_api_key.clone().ok_or_else(|| {
                Error::config("OPENROUTER_API_KEY is required for the openrouter provider")
            })?;
            Arc::new(OpenRouterEnricher::new(key, &config.openrouter_model)?)
        }
        #[cfg(feature = "http-enrichers")]
        "mlx" => Arc::new(MlxEnricher::new(&config.mlx_url, &config.mlx_model)?),
        other => {
            return Err(Error::config(format!(
                "Unknown LLM provider \"{}\". Available: {}",
                other,
                available_providers().join(", ")
            )))
        }
    };
    Ok(Some(enricher))
}

/// Provider names this build can construct.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = vec!["claude-cli"];
    if cfg!(feature = "http-enrichers") {
        names.extend(["ollama", "openrouter", "mlx"]);
    }
    names.extend(UNSAFE_PROVIDERS);
    names
}
