//! Watcher configuration, read from the environment or a `.env` file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::explorer::{EtherscanClient, ExplorerError};
use crate::notifier::DEFAULT_CHAT_ID;
use crate::pipeline::DEFAULT_ENRICHMENT_DELAY_MS;
use crate::stream::{StreamConfig, DEFAULT_RECONNECT_DELAY_MS};

pub const ENV_WS_URL: &str = "QUICK_NODE_WS_URL";
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_ETHERSCAN_KEY: &str = "ETHERSCAN_API_KEY";
pub const ENV_RECONNECT_DELAY_MS: &str = "RECONNECT_DELAY_MS";
pub const ENV_ENRICHMENT_DELAY_MS: &str = "ENRICHMENT_DELAY_MS";
pub const ENV_HTTP_TIMEOUT_MS: &str = "HTTP_TIMEOUT_MS";

/// Default per-request timeout for the HTTP clients
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Provider WebSocket endpoint
    pub ws_url: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,
    /// Only needed by the explorer helpers
    pub etherscan_api_key: Option<String>,
    pub reconnect_delay: Duration,
    pub enrichment_delay: Duration,
    pub http_timeout: Duration,
}

impl WatcherConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a `.env` file without touching the process environment
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ws_url = get(ENV_WS_URL).ok_or(ConfigError::MissingEnv(ENV_WS_URL))?;
        validate_ws_url(&ws_url)?;

        let telegram_bot_token = get(ENV_BOT_TOKEN).ok_or(ConfigError::MissingEnv(ENV_BOT_TOKEN))?;

        let telegram_chat_id = match get(ENV_CHAT_ID) {
            Some(raw) => raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: ENV_CHAT_ID,
                reason: e.to_string(),
            })?,
            None => DEFAULT_CHAT_ID,
        };

        Ok(Self {
            ws_url,
            telegram_bot_token,
            telegram_chat_id,
            etherscan_api_key: get(ENV_ETHERSCAN_KEY),
            reconnect_delay: millis(get(ENV_RECONNECT_DELAY_MS), ENV_RECONNECT_DELAY_MS, DEFAULT_RECONNECT_DELAY_MS)?,
            enrichment_delay: millis(get(ENV_ENRICHMENT_DELAY_MS), ENV_ENRICHMENT_DELAY_MS, DEFAULT_ENRICHMENT_DELAY_MS)?,
            http_timeout: millis(get(ENV_HTTP_TIMEOUT_MS), ENV_HTTP_TIMEOUT_MS, DEFAULT_HTTP_TIMEOUT_MS)?,
        })
    }

    /// Streaming settings derived from this config
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.ws_url.clone()).with_reconnect_delay(self.reconnect_delay)
    }

    /// Explorer helpers, when a key is configured
    pub fn etherscan_client(&self) -> Result<Option<EtherscanClient>, ExplorerError> {
        self.etherscan_api_key
            .as_ref()
            .map(|key| EtherscanClient::with_default_endpoint(key.clone(), self.http_timeout))
            .transpose()
    }
}

fn millis(raw: Option<String>, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let ms = match raw {
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?,
        None => default,
    };
    Ok(Duration::from_millis(ms))
}

/// Reject anything that is not a WebSocket URL
pub fn validate_ws_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: ENV_WS_URL,
            reason: format!("expected ws:// or wss:// URL, got {url}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("QUICK_NODE_WS_URL", "wss://eth.example/ws"),
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
    ];

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = WatcherConfig::from_lookup(lookup(MINIMAL)).unwrap();

        assert_eq!(config.ws_url, "wss://eth.example/ws");
        assert_eq!(config.telegram_bot_token, "123:abc");
        assert_eq!(config.telegram_chat_id, DEFAULT_CHAT_ID);
        assert_eq!(config.etherscan_api_key, None);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.enrichment_delay, Duration::from_secs(3));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = WatcherConfig::from_lookup(lookup(&[
            ("QUICK_NODE_WS_URL", "ws://localhost:8546"),
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "-100123"),
            ("ETHERSCAN_API_KEY", "KEY"),
            ("RECONNECT_DELAY_MS", "500"),
            ("ENRICHMENT_DELAY_MS", "0"),
            ("HTTP_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();

        assert_eq!(config.telegram_chat_id, -100123);
        assert_eq!(config.etherscan_api_key.as_deref(), Some("KEY"));
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.enrichment_delay, Duration::ZERO);
        assert_eq!(config.http_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_missing_ws_url() {
        let result = WatcherConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")]));
        assert!(matches!(result, Err(ConfigError::MissingEnv("QUICK_NODE_WS_URL"))));
    }

    #[test]
    fn test_blank_bot_token_is_missing() {
        let result = WatcherConfig::from_lookup(lookup(&[
            ("QUICK_NODE_WS_URL", "wss://x"),
            ("TELEGRAM_BOT_TOKEN", "   "),
        ]));
        assert!(matches!(result, Err(ConfigError::MissingEnv("TELEGRAM_BOT_TOKEN"))));
    }

    #[test]
    fn test_http_url_rejected() {
        let result = WatcherConfig::from_lookup(lookup(&[
            ("QUICK_NODE_WS_URL", "https://eth.example"),
            ("TELEGRAM_BOT_TOKEN", "t"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "QUICK_NODE_WS_URL", .. })));
    }

    #[test]
    fn test_bad_delay_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("RECONNECT_DELAY_MS", "soon"));
        let result = WatcherConfig::from_lookup(lookup(&pairs));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "RECONNECT_DELAY_MS", .. })));
    }

    #[test]
    fn test_bad_chat_id_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("TELEGRAM_CHAT_ID", "@channel"));
        let result = WatcherConfig::from_lookup(lookup(&pairs));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "TELEGRAM_CHAT_ID", .. })));
    }

    #[test]
    fn test_stream_config_carries_delay() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("RECONNECT_DELAY_MS", "1234"));
        let config = WatcherConfig::from_lookup(lookup(&pairs)).unwrap();
        let stream = config.stream_config();

        assert_eq!(stream.ws_url, "wss://eth.example/ws");
        assert_eq!(stream.reconnect_delay, Duration::from_millis(1234));
        assert_eq!(stream.sources.len(), 2);
    }

    #[test]
    fn test_etherscan_client_needs_key() {
        let config = WatcherConfig::from_lookup(lookup(MINIMAL)).unwrap();
        assert!(config.etherscan_client().unwrap().is_none());

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("ETHERSCAN_API_KEY", "KEY"));
        let config = WatcherConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.etherscan_client().unwrap().is_some());
    }

    #[test]
    fn test_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "QUICK_NODE_WS_URL=wss://node.example/ws\nTELEGRAM_BOT_TOKEN=999:xyz\nETHERSCAN_API_KEY=ABC\n",
        )
        .unwrap();

        let config = WatcherConfig::from_env_file(&path).unwrap();
        assert_eq!(config.ws_url, "wss://node.example/ws");
        assert_eq!(config.telegram_bot_token, "999:xyz");
        assert_eq!(config.etherscan_api_key.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_missing_env_file() {
        let result = WatcherConfig::from_env_file("/nonexistent/.env");
        assert!(matches!(result, Err(ConfigError::EnvFile(_))));
    }
}
