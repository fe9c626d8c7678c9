//! Enrichment through the `claude` command-line client.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::process;
use super::prompt::{build_prompt, parse_response, SYSTEM_PROMPT};
use super::{EnrichError, Enricher, Enrichment, EnrichmentInput};

/// Runs `claude -p` once per project, prompt on stdin, reply on stdout.
#[derive(Debug, Clone)]
pub struct ClaudeCliEnricher {
    binary: String,
    model: Option<String>,
    debug: bool,
}

impl ClaudeCliEnricher {
    pub fn new(model: Option<String>) -> Self {
        Self {
            binary: "claude".to_string(),
            model,
            debug: false,
        }
    }

    /// Use a different executable (path or name on `PATH`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Resolve the executable on `PATH`.
    pub fn locate(&self) -> Result<PathBuf, EnrichError> {
        match which::which(&self.binary) {
            Ok(path) => {
                debug!("Found {} at: {:?}", self.binary, path);
                Ok(path)
            }
            Err(_) => Err(EnrichError::Unavailable(format!(
                "{} not found on PATH",
                self.binary
            ))),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-p", "--output-format", "text", "--append-system-prompt", SYSTEM_PROMPT]);
        if let Some(model) = &self.model {
            cmd.args(["--model", model]);
        }
        // Session markers would make the child believe it is nested.
        cmd.env_remove("CLAUDECODE")
            .env_remove("CLAUDE_CODE_ENTRYPOINT")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Enricher for ClaudeCliEnricher {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn enrich(&self, input: &EnrichmentInput) -> Result<Enrichment, EnrichError> {
        let prompt = build_prompt(input);
        let stdout = process::run(self.command(), &self.binary, Some(&prompt)).await?;

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
    fn test_command_arguments() {
        let enricher = ClaudeCliEnricher::new(Some("sonnet".into()));
        let cmd = enricher.command();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(cmd.as_std().get_program(), "claude");
        assert_eq!(&args[..3], ["-p", "--output-format", "text"]);
        assert_eq!(args[3], "--append-system-prompt");
        assert_eq!(&args[5..], ["--model", "sonnet"]);
    }

    #[test]
    fn test_command_without_model() {
        let cmd = ClaudeCliEnricher::new(None).command();
        assert_eq!(cmd.as_std().get_args().count(), 5);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let enricher = ClaudeCliEnricher::new(None).with_binary("/nonexistent/claude-binary");
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

    #[test]
    fn test_locate_missing_binary() {
        let enricher = ClaudeCliEnricher::new(None).with_binary("projdash-no-such-binary");
        assert!(matches!(enricher.locate(), Err(EnrichError::Unavailable(_))));
    }
}
