use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com/search";
pub const DEFAULT_SERPAPI_ENGINE: &str = "google";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_STREAM_BUFFER: usize = 32;

/// Process-level configuration, read once at startup.
///
/// Credentials are optional here: a missing key is reported per request as a
/// configuration failure instead of keeping the server from starting.
#[derive(Debug, Clone)]
pub struct Config {
    pub serpapi_key: Option<String>,
    pub serpapi_base_url: String,
    pub serpapi_engine: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub max_tokens: u32,
    pub bind_addr: String,
    pub stream_buffer: usize,
    pub stream_smoothing: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        dotenv().ok(); // Load .env file if present
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as
    /// unset; unparsable numbers are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let stream_buffer: usize = vars.parse_or_default("STREAM_BUFFER", DEFAULT_STREAM_BUFFER)?;
        if stream_buffer == 0 {
            anyhow::bail!("STREAM_BUFFER must be at least 1");
        }

        let stream_smoothing = vars
            .get("STREAM_SMOOTHING_MS")
            .map(|raw| {
                raw.parse::<u64>()
                    .with_context(|| format!("STREAM_SMOOTHING_MS is not a number: {raw}"))
            })
            .transpose()?
            .map(Duration::from_millis);

        Ok(Config {
            serpapi_key: vars.get("SERPAPI_KEY"),
            serpapi_base_url: vars.get_or_default("SERPAPI_BASE_URL", DEFAULT_SERPAPI_BASE_URL),
            serpapi_engine: vars.get_or_default("SERPAPI_ENGINE", DEFAULT_SERPAPI_ENGINE),
            anthropic_api_key: vars.get("ANTHROPIC_API_KEY"),
            anthropic_base_url: vars.get_or_default("ANTHROPIC_BASE_URL", DEFAULT_ANTHROPIC_BASE_URL),
            anthropic_model: vars.get_or_default("ANTHROPIC_MODEL", DEFAULT_ANTHROPIC_MODEL),
            max_tokens: vars.parse_or_default("ANTHROPIC_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            bind_addr: vars.get_or_default("BIND_ADDR", DEFAULT_BIND_ADDR),
            stream_buffer,
            stream_smoothing,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serpapi_key: None,
            serpapi_base_url: DEFAULT_SERPAPI_BASE_URL.to_string(),
            serpapi_engine: DEFAULT_SERPAPI_ENGINE.to_string(),
            anthropic_api_key: None,
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            stream_smoothing: None,
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or_default<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw}")),
            None => Ok(default),
        }
    }
}
