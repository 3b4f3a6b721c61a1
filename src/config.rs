//! Configuration types for the voice capture pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoxConfig {
    /// Speech capture session settings.
    pub capture: CaptureConfig,
    /// Extraction model settings.
    pub extraction: ExtractionConfig,
    /// Entity resolution scoring thresholds.
    pub matcher: MatcherConfig,
    /// Local stop/cancel phrase lists.
    pub phrases: PhraseConfig,
}

/// Capture session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Consecutive recoverable engine errors tolerated before the
    /// session escalates to a fatal error and stops restarting.
    pub max_consecutive_errors: u32,
    /// Delay before a quiet restart after a recoverable error, in ms.
    pub restart_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 3,
            restart_delay_ms: 150,
        }
    }
}

impl CaptureConfig {
    /// Quiet-restart delay as a [`Duration`].
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Extraction model configuration.
///
/// Points at any server implementing the OpenAI chat completions API
/// (Ollama, vLLM, llama.cpp server, hosted providers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Model API base URL.
    pub api_url: String,
    /// Model identifier sent with each request.
    pub api_model: String,
    /// Bearer token (empty = no auth header).
    pub api_key: String,
    /// Sampling temperature. Extraction wants near-deterministic output.
    pub temperature: f32,
    /// Maximum tokens for the extraction response.
    pub max_tokens: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Extractions scoring below this confidence are flagged (still applied).
    pub low_confidence_threshold: f32,
    /// Maximum recent exchanges kept in the conversation context.
    pub history_cap: usize,
    /// Retry behavior for transient model API failures.
    pub retry: RetryConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434".to_owned(),
            api_model: "qwen3:4b".to_owned(),
            api_key: String::new(),
            temperature: 0.2,
            max_tokens: 512,
            request_timeout_secs: 30,
            low_confidence_threshold: 0.5,
            history_cap: 6,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy for transient extraction failures.
///
/// Exponential backoff with jitter. Only retryable errors (network,
/// rate limits) are retried; the transcript being extracted is held by
/// the caller and survives every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts (0 = no retries).
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth).
    pub max_delay_ms: u64,
    /// Backoff multiplier (2.0 for exponential backoff).
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry attempt (1-based), with jitter.
    ///
    /// Formula: `min(base * multiplier^(attempt-1), max_delay)` plus a
    /// random 0–10% jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let base = self.base_delay_ms as f64;
        let exp = self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = (base * exp).min(self.max_delay_ms as f64);
        let jitter = delay * (rand::random::<f64>() * 0.1);

        Duration::from_millis((delay + jitter) as u64)
    }
}

/// Name-matching thresholds for entity resolution.
///
/// The 0.6 / 0.8 / 0.2 values were chosen empirically against real
/// dictation transcripts; they are tunables, not contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity (inclusive) to stay a fuzzy candidate.
    pub min_similarity: f64,
    /// Similarity (inclusive) at which a lone candidate auto-resolves.
    pub auto_accept: f64,
    /// Top-two similarity gap above which the leader is offered for
    /// confirmation instead of reporting ambiguity.
    pub ambiguity_gap: f64,
    /// Scale applied to the best per-token score of a multi-word name,
    /// so a spoken short form can clear `min_similarity` without
    /// clearing `auto_accept`.
    pub token_match_discount: f64,
    /// How many candidates an ambiguous outcome carries at most.
    pub max_ambiguous: usize,
    /// Substring tier reports ambiguity up to this many hits; beyond
    /// that the query is too generic and falls through to scoring.
    pub substring_ambiguity_cap: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.6,
            auto_accept: 0.8,
            ambiguity_gap: 0.2,
            token_match_discount: 0.85,
            max_ambiguous: 3,
            substring_ambiguity_cap: 5,
        }
    }
}

/// Stop/cancel phrases matched locally, before any model round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Phrases that request saving the current task.
    pub save_phrases: Vec<String>,
    /// Phrases that abandon the current task.
    pub cancel_phrases: Vec<String>,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            save_phrases: [
                "save",
                "save it",
                "that's all",
                "that is all",
                "we're done",
                "salva",
                "abbiamo finito",
                "fatto",
            ]
            .map(str::to_owned)
            .to_vec(),
            cancel_phrases: [
                "cancel",
                "never mind",
                "forget it",
                "stop",
                "annulla",
                "lascia perdere",
            ]
            .map(str::to_owned)
            .to_vec(),
        }
    }
}

impl InvoxConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::InvoxError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::InvoxError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/invox/config.toml`.
    ///
    /// Resolves the platform config directory via [`dirs`]; override with
    /// `INVOX_CONFIG_DIR`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(override_dir) = std::env::var_os("INVOX_CONFIG_DIR") {
            return PathBuf::from(override_dir).join("config.toml");
        }
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("invox")
            .join("config.toml")
    }
}
