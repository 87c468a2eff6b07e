// src/config.rs

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SYMBOL: &str = "^NSEBANK";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Server settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_path: String,
    pub default_symbol: String,
    pub yahoo_base_url: String,
    pub http_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            model_path: "model/lstm_model.json".to_string(),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            yahoo_base_url: "https://query1.finance.yahoo.com".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value })?,
            None => defaults.port,
        };
        let http_timeout = match var("HTTP_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    key: "HTTP_TIMEOUT_SECS",
                    value,
                })?,
            None => defaults.http_timeout,
        };

        Ok(ServerConfig {
            host: var("HOST").unwrap_or(defaults.host),
            port,
            model_path: var("MODEL_PATH").unwrap_or(defaults.model_path),
            default_symbol: var("DEFAULT_SYMBOL").unwrap_or(defaults.default_symbol),
            yahoo_base_url: var("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            http_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.default_symbol, "^NSEBANK");
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("MODEL_PATH", "/srv/model.json"),
            ("DEFAULT_SYMBOL", "AAPL"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("YAHOO_BASE_URL", ""),
        ]))
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.model_path, "/srv/model.json");
        assert_eq!(config.default_symbol, "AAPL");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.yahoo_base_url, "https://query1.finance.yahoo.com");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for PORT: \"eighty\"");
    }
}
