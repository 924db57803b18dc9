use anyhow::{bail, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub history: HistoryConfig,
    pub request: RequestConfig,
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub activity_log: ActivityLogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Conversation turns kept; one turn is a user message plus the agent reply.
    pub cap_turns: usize,
    pub enable_summarization: bool,
    /// Minimum history length (in messages) that switches to summary mode.
    pub summary_threshold: usize,
    pub enable_history_cache: bool,
}

impl HistoryConfig {
    /// Message cap derived from the turn cap (HISTORY_CAP_MESSAGES).
    pub fn cap_messages(&self) -> usize {
        self.cap_turns * 2
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap_turns: 4,
            enable_summarization: true,
            summary_threshold: 8,
            enable_history_cache: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RequestConfig {
    pub timeout_seconds: f64,
}

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

impl RequestConfig {
    /// Falls back to the default for values `validate` would reject.
    pub fn timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.timeout_seconds) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_REQUEST_TIMEOUT,
        }
    }

    fn validate(&self) -> Result<()> {
        match Duration::try_from_secs_f64(self.timeout_seconds) {
            Ok(timeout) if !timeout.is_zero() => Ok(()),
            _ => bail!(
                "request.timeout_seconds must be a positive, finite number of seconds, got {}",
                self.timeout_seconds
            ),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvictionKind {
    None,
    Lru,
    IdleTtl,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    pub eviction: EvictionKind,
    pub max_conversations: usize,
    pub idle_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ActivityLogConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub worker_count: usize,
}

/// Flat variables recognized for compatibility with plain `KEY=value` deployments.
const FLAT_OVERRIDES: &[(&str, &str)] = &[
    ("HISTORY_CAP_TURNS", "history.cap_turns"),
    ("ENABLE_SUMMARIZATION", "history.enable_summarization"),
    ("SUMMARY_THRESHOLD", "history.summary_threshold"),
    ("ENABLE_HISTORY_CACHE", "history.enable_history_cache"),
    ("REQUEST_TIMEOUT_SECONDS", "request.timeout_seconds"),
    ("GEMINI_API_KEY", "llm.api_key"),
];

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults()?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in FLAT_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()
    }

    /// Settings from built-in defaults only, ignoring files and environment.
    pub fn from_defaults() -> Result<Self> {
        let settings: Settings = Self::defaults()?.build()?.try_deserialize()?;
        settings.validate()
    }

    fn validate(self) -> Result<Self> {
        self.request.validate()?;
        Ok(self)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("history.cap_turns", 4)?
            .set_default("history.enable_summarization", true)?
            .set_default("history.summary_threshold", 8)?
            .set_default("history.enable_history_cache", true)?
            .set_default("request.timeout_seconds", 6.0)?
            .set_default("store.eviction", "lru")?
            .set_default("store.max_conversations", 10_000)?
            .set_default("store.idle_ttl_seconds", 6 * 60 * 60)?
            .set_default(
                "llm.base_url",
                "https://generativelanguage.googleapis.com/v1beta/openai",
            )?
            .set_default("llm.api_key", "")?
            .set_default("llm.model", "gemini-2.5-flash")?
            .set_default("llm.temperature", 0.3)?
            .set_default("llm.max_tokens", 1024)?
            .set_default("llm.timeout_seconds", 30)?
            .set_default("llm.max_retries", 3)?
            .set_default("activity_log.queue_capacity", 10_000)?
            .set_default("activity_log.batch_size", 100)?
            .set_default("activity_log.batch_timeout_ms", 1000)?
            .set_default("activity_log.worker_count", 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_defaults().unwrap();

        assert_eq!(settings.history, HistoryConfig::default());
        assert_eq!(settings.history.cap_messages(), 8);
        assert_eq!(settings.request.timeout(), Duration::from_secs(6));
        assert_eq!(settings.store.eviction, EvictionKind::Lru);
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.llm.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_string_overrides_are_coerced() {
        let settings: Settings = Settings::defaults()
            .unwrap()
            .set_override("history.cap_turns", "6")
            .unwrap()
            .set_override("history.enable_summarization", "false")
            .unwrap()
            .set_override("store.eviction", "idle_ttl")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.history.cap_messages(), 12);
        assert!(!settings.history.enable_summarization);
        assert_eq!(settings.store.eviction, EvictionKind::IdleTtl);
    }

    fn with_request_timeout(seconds: f64) -> Result<Settings> {
        let settings: Settings = Settings::defaults()?
            .set_override("request.timeout_seconds", seconds)?
            .build()?
            .try_deserialize()?;
        settings.validate()
    }

    #[test]
    fn test_request_timeout_must_be_positive_and_finite() {
        for seconds in [f64::INFINITY, f64::NAN, 0.0, -1.0, 1e300] {
            let err = with_request_timeout(seconds).unwrap_err();
            assert!(err.to_string().contains("request.timeout_seconds"), "{}", err);
        }

        let settings = with_request_timeout(0.25).unwrap();
        assert_eq!(settings.request.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_timeout_falls_back_instead_of_panicking() {
        let request = RequestConfig {
            timeout_seconds: f64::INFINITY,
        };
        assert_eq!(request.timeout(), Duration::from_secs(6));
    }
}
