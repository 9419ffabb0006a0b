//! Application-level configuration loading from the process environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

/// Default match length in seconds (a two-minute exhibition).
const DEFAULT_GAME_DURATION_SECS: u32 = 120;
/// Default quiet window after a flush before the next event flushes alone.
const DEFAULT_DEBOUNCE_MS: u64 = 4000;
/// Generation attempts per flush (one initial try plus two retries).
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Base delay of the linear retry backoff.
const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
/// Upper bound on a single streaming generation attempt.
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
/// Location of the commentator system prompt.
const DEFAULT_PROMPT_PATH: &str = "prompts/commentary-system.md";
/// Directory holding per-player bio markdown files.
const DEFAULT_PLAYER_DATA_DIR: &str = "data";
/// Model requested from the text-generation service.
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Base URL of the text-generation service.
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Retry policy applied to generation attempts inside one flush.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * base` before retrying.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the failure of `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Channel carrying inbound game events.
    pub main_channel: String,
    /// Channel carrying outbound commentary messages.
    pub commentary_channel: String,
    /// Match length in seconds.
    pub game_duration_secs: u32,
    /// Quiet window applied between flushes.
    pub debounce: Duration,
    /// Retry policy for generation attempts.
    pub retry: RetryPolicy,
    /// Upper bound on a single streaming generation attempt.
    pub generation_timeout: Duration,
    /// Path to the commentator system prompt.
    pub prompt_path: PathBuf,
    /// Directory of player bio files folded into the system prompt.
    pub player_data_dir: PathBuf,
    /// API key for the text-generation service, if configured.
    pub openai_api_key: Option<String>,
    /// Model requested from the text-generation service.
    pub openai_model: String,
    /// Base URL of the text-generation service.
    pub openai_base_url: String,
}

impl AppConfig {
    /// Load the configuration from the environment, logging the resolved
    /// channel names so concurrent deployments are easy to tell apart.
    pub fn load() -> Self {
        let namespace = channel_namespace();
        let main_channel = env::var("MAIN_CHANNEL")
            .unwrap_or_else(|_| format!("football-frenzy:{namespace}:main"));
        let commentary_channel = env::var("COMMENTARY_CHANNEL")
            .unwrap_or_else(|_| format!("football-frenzy:{namespace}:commentary"));

        let config = Self {
            main_channel,
            commentary_channel,
            game_duration_secs: env_parse("GAME_DURATION_SECS", DEFAULT_GAME_DURATION_SECS),
            debounce: Duration::from_millis(env_parse(
                "COMMENTARY_DEBOUNCE_MS",
                DEFAULT_DEBOUNCE_MS,
            )),
            retry: RetryPolicy {
                max_attempts: env_parse("COMMENTARY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                backoff_base: Duration::from_millis(env_parse(
                    "COMMENTARY_BACKOFF_BASE_MS",
                    DEFAULT_BACKOFF_BASE_MS,
                )),
            },
            generation_timeout: Duration::from_secs(env_parse(
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )),
            prompt_path: env_path("COMMENTARY_PROMPT_PATH", DEFAULT_PROMPT_PATH),
            player_data_dir: env_path("PLAYER_DATA_DIR", DEFAULT_PLAYER_DATA_DIR),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
        };

        info!(
            main = %config.main_channel,
            commentary = %config.commentary_channel,
            "resolved channel configuration"
        );

        config
    }
}

/// Namespace used to isolate concurrent deployments sharing one account.
fn channel_namespace() -> String {
    if let Ok(namespace) = env::var("CHANNEL_NAMESPACE")
        && !namespace.is_empty()
    {
        return namespace;
    }

    match env::var("APP_ENV").as_deref() {
        Ok("production") => "production".to_string(),
        _ => "dev-local".to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var_os(key)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(default))
}
