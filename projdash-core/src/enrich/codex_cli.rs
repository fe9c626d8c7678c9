//! Enrichment through the OpenAI `codex` command-line client.
//!
//! `codex exec --full-auto` may edit files and run commands in the working
//! directory, so this backend is only built when unsafe providers are
//! explicitly allowed.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::process;
use super::prompt::{build_prompt, parse_response};
use super::{EnrichError, Enricher, Enrichment, EnrichmentInput};

/// Runs `codex exec --full-auto <prompt>` once per project.
#[derive(Debug, Clone)]
pub struct CodexCliEnricher {
    binary: String,
    debug: bool,
}

impl Default for CodexCliEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl CodexCliEnricher {
    pub fn new() -> Self {
        Self {
            binary: "codex".to_string(),
            debug: false,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["exec", "--full-auto", prompt])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Enricher for CodexCliEnricher {
    fn name(&self) -> &str {
        "codex-cli"
    }

    async fn enrich(&self, input: &EnrichmentInput) -> Result<Enrichment, EnrichError> {
        let prompt = build_prompt(input);
        let stdout = process::run(self.command(&prompt), &self.binary, None).await?;

        if self.debug {
            debug!("{} raw output for {}:\n{}", self.name(), input.fact.name, stdout);
        }

        parse_response(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::FactRecord;
    use crate::scoring::score;

    #[test]
    fn test_prompt_is_last_argument() {
        let cmd = CodexCliEnricher::new().command("analyze me");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(cmd.as_std().get_program(), "codex");
        assert_eq!(args, ["exec", "--full-auto", "analyze me"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let enricher = CodexCliEnricher::new().with_binary("/nonexistent/codex-binary");
        let fact = FactRecord::default();
        let input = EnrichmentInput {
            scored: score(&fact),
            fact,
            previous_summary: None,
            github: None,
        };
        let err = enricher.enrich(&input).await.unwrap_err();
        assert!(matches!(err, EnrichError::Unavailable(_)));
    }
}
