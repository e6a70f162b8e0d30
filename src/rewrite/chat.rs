use super::{clean_rewrite, Rewriter};
use crate::config::RewriteConfig;
use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Rewrites text through an OpenAI-compatible chat completions endpoint.
pub struct ChatRewriter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    instructions: String,
    max_retries: u32,
}

impl ChatRewriter {
    pub fn new(api_key: String, config: &RewriteConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(5));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            instructions: instructions_for(&config.tone),
            max_retries: config.max_retries,
        })
    }

    /// Reads the API key from the configured environment variable.
    pub fn from_config(config: &RewriteConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable is not set", config.api_key_env))?;
        Self::new(api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request_once(&self, text: &str) -> std::result::Result<String, RequestError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.2,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| RequestError::Retryable(anyhow!(err).context("Request failed")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let err = anyhow!("API error {}: {}", status, detail.trim());
            return Err(if is_retryable_status(status) {
                RequestError::Retryable(err)
            } else {
                RequestError::Fatal(err)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| RequestError::Fatal(anyhow!(err).context("Malformed API response")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RequestError::Fatal(anyhow!("API response contained no text")))
    }
}

impl Rewriter for ChatRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let started = Instant::now();
        let mut attempt = 0;

        let raw = loop {
            match self.request_once(text).await {
                Ok(raw) => break raw,
                Err(RequestError::Retryable(err)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Rewrite request failed (attempt {}/{}): {err:#}",
                        attempt,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(RequestError::Retryable(err)) | Err(RequestError::Fatal(err)) => {
                    return Err(err.context("Rewrite request failed"));
                }
            }
        };

        let cleaned = clean_rewrite(text, &raw);
        debug!(
            model = self.model.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rewrite response received"
        );
        info!("🧠 Rewrote {} characters", text.chars().count());
        Ok(cleaned)
    }
}

enum RequestError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn instructions_for(tone: &str) -> String {
    let tone = tone.trim();
    let tone = if tone.is_empty() { "neutral" } else { tone };
    format!(
        "Fix grammar, spelling and punctuation in the user's text and adjust it to a {tone} tone. \
         Keep the meaning, language and formatting. Reply with the corrected text only."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_rate_limits_and_server_errors_only() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn builds_completions_url_from_endpoint() {
        let config = RewriteConfig {
            endpoint: "http://localhost:11434/v1/".to_string(),
            ..RewriteConfig::default()
        };
        let rewriter = ChatRewriter::new("key".to_string(), &config).unwrap();
        assert_eq!(rewriter.url, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn blank_tone_falls_back_to_neutral() {
        assert!(instructions_for("  ").contains("neutral tone"));
        assert!(instructions_for("friendly").contains("friendly tone"));
    }
}
