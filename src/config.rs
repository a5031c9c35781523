//! Runtime configuration
//!
//! Loaded once at startup from the environment (and an optional `.env`
//! file), then handed to the application as an immutable value.

use crate::catalog::DEFAULT_PERMITTED_MODELS;
use crate::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://api.1min.ai";
const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub permitted_models: Vec<String>,
    pub subset_only: bool,
    pub upstream_timeout: Duration,
    pub host: String,
    pub port: u16,
    pub worker_threads: usize,
    pub rate_limit_per_minute: u32,
    /// Largest accepted request body; inline base64 images count towards it.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            permitted_models: DEFAULT_PERMITTED_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            subset_only: false,
            upstream_timeout: Duration::from_secs(120),
            host: "0.0.0.0".to_string(),
            port: 5001,
            worker_threads: 6,
            rate_limit_per_minute: 500,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    /// for anything unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let permitted_models = match lookup("SUBSET_OF_ONE_MIN_PERMITTED_MODELS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.permitted_models,
        };

        let subset_only = match lookup("PERMIT_MODELS_FROM_SUBSET_ONLY") {
            Some(raw) => parse_bool("PERMIT_MODELS_FROM_SUBSET_ONLY", &raw)?,
            None => defaults.subset_only,
        };

        let api_base_url = lookup("ONE_MIN_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);

        let timeout_secs: u64 = parse_or("UPSTREAM_TIMEOUT_SECS", &lookup, 120)?;
        let worker_threads: usize = parse_or("RELAY_WORKER_THREADS", &lookup, defaults.worker_threads)?;
        let rate_limit_per_minute: u32 =
            parse_or("RATE_LIMIT_PER_MINUTE", &lookup, defaults.rate_limit_per_minute)?;
        let max_body_bytes: usize =
            parse_or("MAX_REQUEST_BODY_BYTES", &lookup, defaults.max_body_bytes)?;

        if timeout_secs == 0 {
            return Err(Error::Config("UPSTREAM_TIMEOUT_SECS must be positive".to_string()));
        }
        if worker_threads == 0 {
            return Err(Error::Config("RELAY_WORKER_THREADS must be positive".to_string()));
        }
        if rate_limit_per_minute == 0 {
            return Err(Error::Config("RATE_LIMIT_PER_MINUTE must be positive".to_string()));
        }
        if max_body_bytes == 0 {
            return Err(Error::Config("MAX_REQUEST_BODY_BYTES must be positive".to_string()));
        }

        Ok(Self {
            api_base_url,
            permitted_models,
            subset_only,
            upstream_timeout: Duration::from_secs(timeout_secs),
            host: lookup("RELAY_HOST").unwrap_or(defaults.host),
            port: parse_or("RELAY_PORT", &lookup, defaults.port)?,
            worker_threads,
            rate_limit_per_minute,
            max_body_bytes,
        })
    }

    /// Whether requests may target `model` under the subset policy.
    pub fn is_permitted(&self, model: &str) -> bool {
        !self.subset_only || self.permitted_models.iter().any(|m| m == model)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_base_url, "https://api.1min.ai");
        assert_eq!(config.permitted_models, vec!["mistral-nemo", "gpt-4o", "deepseek-chat"]);
        assert!(!config.subset_only);
        assert_eq!(config.port, 5001);
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.rate_limit_per_minute, 500);
        assert_eq!(config.upstream_timeout, Duration::from_secs(120));
        assert_eq!(config.max_body_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_body_limit_override() {
        let config = config_from(&[("MAX_REQUEST_BODY_BYTES", "1048576")]).unwrap();
        assert_eq!(config.max_body_bytes, 1_048_576);
        assert!(config_from(&[("MAX_REQUEST_BODY_BYTES", "0")]).is_err());
    }

    #[test]
    fn test_subset_parsing_drops_blanks() {
        let config = config_from(&[
            ("SUBSET_OF_ONE_MIN_PERMITTED_MODELS", "gpt-4o, claude-2.1,,"),
            ("PERMIT_MODELS_FROM_SUBSET_ONLY", "True"),
        ])
        .unwrap();
        assert_eq!(config.permitted_models, vec!["gpt-4o", "claude-2.1"]);
        assert!(config.subset_only);
        assert!(config.is_permitted("claude-2.1"));
        assert!(!config.is_permitted("mistral-nemo"));
    }

    #[test]
    fn test_everything_permitted_without_enforcement() {
        let config = config_from(&[("PERMIT_MODELS_FROM_SUBSET_ONLY", "false")]).unwrap();
        assert!(config.is_permitted("anything-at-all"));
    }

    #[test]
    fn test_invalid_bool_is_config_error() {
        let err = config_from(&[("PERMIT_MODELS_FROM_SUBSET_ONLY", "maybe")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = config_from(&[("RELAY_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("RELAY_PORT"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(config_from(&[("UPSTREAM_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = config_from(&[("ONE_MIN_API_BASE_URL", "http://localhost:9000/")]).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:9000");
    }
}
