//! Chat-completions client for the extraction model.
//!
//! Talks to any server implementing the OpenAI chat completions API.
//! Extraction uses plain (non-streaming) completions: a round is one
//! short JSON object, so latency is dominated by generation, not
//! delivery.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// HTTP client for the extraction model API.
pub struct ModelClient {
    http: reqwest::Client,
    config: ExtractionConfig,
}

impl ModelClient {
    /// Create a client for the configured endpoint.
    #[must_use]
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Request a completion, retrying retryable failures with backoff.
    ///
    /// The caller holds the transcript being extracted; only the HTTP
    /// exchange repeats, so no spoken input is ever lost to a retry.
    ///
    /// # Errors
    ///
    /// Returns the final [`ExtractionError`] once retries are exhausted
    /// or the failure is not retryable. Cancellation surfaces as a
    /// network error.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExtractionError> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ExtractionError::Network("request cancelled".to_owned()));
            }

            let result = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(ExtractionError::Network("request cancelled".to_owned()));
                }
                result = self.send_once(system, user) => result,
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.retry.max_attempts {
                        return Err(e);
                    }
                    attempt = attempt.saturating_add(1);
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(
                        "extraction request failed ({e}), retry {attempt}/{} in {delay:?}",
                        self.config.retry.max_attempts
                    );
                    tokio::select! {
                        () = cancel.cancelled() => {
                            return Err(ExtractionError::Network(
                                "cancelled during retry backoff".to_owned(),
                            ));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn send_once(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        let body = serde_json::json!({
            "model": self.config.api_model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let url = chat_completions_url(&self.config.api_url);
        debug!("extraction request to {url}");

        let mut request = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(self.config.request_timeout_secs));
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractionError::Network(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ExtractionError::RateLimited);
        }
        if !status.is_success() {
            return Err(ExtractionError::Network(format!(
                "model API returned {status}"
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(format!("invalid JSON body: {e}")))?;

        if value["choices"][0]["finish_reason"].as_str() == Some("content_filter") {
            return Err(ExtractionError::ContentFiltered);
        }

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ExtractionError::MalformedResponse("missing message content".to_owned())
            })?;

        Ok(content.to_owned())
    }
}

/// Normalize a base URL into the chat completions endpoint.
fn chat_completions_url(api_url: &str) -> String {
    let base = api_url.strip_suffix("/v1").unwrap_or(api_url);
    let base = base.trim_end_matches('/');
    format!("{base}/v1/chat/completions")
}
