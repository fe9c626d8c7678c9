//! HTTP chat backends: a local Ollama server, OpenRouter and a local MLX
//! server. The last two speak the OpenAI chat-completions protocol.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::prompt::{build_prompt, parse_response, SYSTEM_PROMPT};
use super::{EnrichError, Enricher, Enrichment, EnrichmentInput};
use crate::error::{Error, Result};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("projdash/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}

fn messages(input: &EnrichmentInput) -> serde_json::Value {
    json!([
        { "role": "system", "content": SYSTEM_PROMPT },
        { "role": "user", "content": build_prompt(input) },
    ])
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Send `body` and decode the reply, mapping transport failures.
async fn post_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
    provider: &str,
) -> std::result::Result<T, EnrichError> {
    let response = request.json(body).send().await.map_err(|e| {
        if e.is_connect() {
            EnrichError::Unavailable(format!("{}: {}", provider, e))
        } else {
            EnrichError::Http(format!("{}: {}", provider, e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(EnrichError::Http(format!("{} API error: {} {}", provider, status, text)));
    }

    response
        .json()
        .await
        .map_err(|e| EnrichError::Parse(format!("{}: {}", provider, e)))
}

fn content_or_empty(content: Option<String>, provider: &str) -> std::result::Result<String, EnrichError> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| EnrichError::Parse(format!("Empty response from {}", provider)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OllamaReply {
    message: Option<ChatMessage>,
}

/// `POST {url}/api/chat` against a local Ollama.
#[derive(Debug, Clone)]
pub struct OllamaEnricher {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaEnricher {
    pub fn new(url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.url)
    }

    fn body(&self, input: &EnrichmentInput) -> serde_json::Value {
        json!({
            "model": self.model,
            "stream": false,
            "messages": messages(input),
        })
    }
}

#[async_trait]
impl Enricher for OllamaEnricher {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn enrich(&self, input: &EnrichmentInput) -> std::result::Result<Enrichment, EnrichError> {
        let reply: OllamaReply =
            post_json(self.client.post(self.endpoint()), &self.body(input), "Ollama").await?;
        let content = content_or_empty(reply.message.and_then(|m| m.content), "Ollama")?;
        parse_response(&content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl CompletionReply {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
    }
}

fn completion_body(model: &str, input: &EnrichmentInput) -> serde_json::Value {
    json!({
        "model": model,
        "messages": messages(input),
        "temperature": 0.3,
    })
}

/// OpenAI-style chat completions through OpenRouter.
#[derive(Debug, Clone)]
pub struct OpenRouterEnricher {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenRouterEnricher {
    pub fn new(api_key: String, model: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            model: model.to_string(),
            url: OPENROUTER_URL.to_string(),
        })
    }
}

#[async_trait]
impl Enricher for OpenRouterEnricher {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn enrich(&self, input: &EnrichmentInput) -> std::result::Result<Enrichment, EnrichError> {
        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        let body = completion_body(&self.model, input);
        let reply: CompletionReply = post_json(request, &body, "OpenRouter").await?;
        parse_response(&content_or_empty(reply.into_content(), "OpenRouter")?)
    }
}

/// `POST {url}/v1/chat/completions` against a local `mlx_lm.server`.
#[derive(Debug, Clone)]
pub struct MlxEnricher {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl MlxEnricher {
    pub fn new(url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.url)
    }
}

#[async_trait]
impl Enricher for MlxEnricher {
    fn name(&self) -> &str {
        "mlx"
    }

    async fn enrich(&self, input: &EnrichmentInput) -> std::result::Result<Enrichment, EnrichError> {
        let body = completion_body(&self.model, input);
        let reply: CompletionReply = post_json(self.client.post(self.endpoint()), &body, "MLX").await?;
        parse_response(&content_or_empty(reply.into_content(), "MLX")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::FactRecord;
    use crate::scoring::score;

    fn input() -> EnrichmentInput {
        let fact = FactRecord {
            name: "widget".into(),
            ..Default::default()
        };
        EnrichmentInput {
            scored: score(&fact),
            fact,
            previous_summary: None,
            github: None,
        }
    }

    #[test]
    fn test_ollama_request_shape() {
        let enricher = OllamaEnricher::new("http://localhost:11434/", "llama3").unwrap();
        assert_eq!(enricher.endpoint(), "http://localhost:11434/api/chat");

        let body = enricher.body(&input());
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("Name: widget"));
    }

    #[test]
    fn test_completion_request_shape() {
        let body = completion_body("anthropic/claude-sonnet-4", &input());
        assert_eq!(body["model"], "anthropic/claude-sonnet-4");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn test_mlx_endpoint() {
        let enricher = MlxEnricher::new("http://localhost:8080/", "default").unwrap();
        assert_eq!(enricher.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(enricher.name(), "mlx");
    }

    #[test]
    fn test_reply_decoding() {
        let reply: CompletionReply =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"{\"summary\":\"s\"}"}}]}"#).unwrap();
        assert_eq!(parse_response(&reply.into_content().unwrap()).unwrap().summary, "s");

        let no_choices: CompletionReply = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(no_choices.into_content(), None);

        let empty: OllamaReply = serde_json::from_str(r#"{"message":{"content":"  "}}"#).unwrap();
        let err = content_or_empty(empty.message.and_then(|m| m.content), "Ollama").unwrap_err();
        assert!(matches!(err, EnrichError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_unavailable() {
        // Port 9 (discard) is closed on test hosts.
        let enricher = OllamaEnricher::new("http://127.0.0.1:9", "llama3").unwrap();
        let err = enricher.enrich(&input()).await.unwrap_err();
        assert!(matches!(err, EnrichError::Unavailable(_) | EnrichError::Http(_)));
    }
}
