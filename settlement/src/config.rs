//! Configuration for merchant settlement

use crate::{retry::RetryConfig, rounding::RoundingRule, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settlement run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Merchant directory service
    pub directory: DirectoryConfig,

    /// Export output
    pub export: ExportConfig,

    /// Pipeline behaviour
    pub pipeline: PipelineConfig,
}

/// Merchant directory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL; `/merchants` is appended
    pub base_url: String,

    /// Timeout for each fetch, in seconds
    pub fetch_timeout_seconds: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://simpledebit.gocardless.io".to_string(),
            fetch_timeout_seconds: 30,
        }
    }
}

impl DirectoryConfig {
    /// Fetch timeout as a duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory the CSV batch is written to
    pub output_dir: PathBuf,

    /// Rounding applied to net amounts on export
    pub rounding: RoundingRule,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            rounding: RoundingRule::HalfUp,
        }
    }
}

/// What to do when a single merchant cannot be settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the run; nothing is exported
    #[default]
    Abort,
    /// Record the failure and carry on with the next merchant
    Skip,
}

impl FromStr for ErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "skip" => Ok(ErrorPolicy::Skip),
            other => Err(Error::Config(format!("Unknown error policy: {}", other))),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-merchant failure handling
    pub error_policy: ErrorPolicy,

    /// Retry of failed fetches
    pub retry: RetryConfig,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Apply `SETTLEMENT_*` overrides from `lookup` to the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(url) = lookup("SETTLEMENT_BASE_URL") {
            config.directory.base_url = url;
        }

        if let Some(timeout) = lookup("SETTLEMENT_FETCH_TIMEOUT_SECONDS") {
            config.directory.fetch_timeout_seconds = timeout.parse().map_err(|_| {
                Error::Config(format!("Invalid SETTLEMENT_FETCH_TIMEOUT_SECONDS: {}", timeout))
            })?;
        }

        if let Some(dir) = lookup("SETTLEMENT_OUTPUT_DIR") {
            config.export.output_dir = PathBuf::from(dir);
        }

        if let Some(rounding) = lookup("SETTLEMENT_ROUNDING") {
            config.export.rounding = rounding.parse()?;
        }

        if let Some(policy) = lookup("SETTLEMENT_ERROR_POLICY") {
            config.pipeline.error_policy = policy.parse()?;
        }

        if let Some(retries) = lookup("SETTLEMENT_MAX_RETRIES") {
            config.pipeline.retry.max_retries = retries.parse().map_err(|_| {
                Error::Config(format!("Invalid SETTLEMENT_MAX_RETRIES: {}", retries))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.directory.base_url.trim().is_empty() {
            return Err(Error::Config("directory.base_url must not be empty".to_string()));
        }

        if self.directory.fetch_timeout_seconds == 0 {
            return Err(Error::Config(
                "directory.fetch_timeout_seconds must be greater than zero".to_string(),
            ));
        }

        let retry = &self.pipeline.retry;
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(Error::Config(format!(
                "pipeline.retry.jitter_factor must be within 0.0 - 1.0, got {}",
                retry.jitter_factor
            )));
        }
        if retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "pipeline.retry.backoff_multiplier must be at least 1.0, got {}",
                retry.backoff_multiplier
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.directory.base_url, "https://simpledebit.gocardless.io");
        assert_eq!(config.directory.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.export.rounding, RoundingRule::HalfUp);
        assert_eq!(config.pipeline.error_policy, ErrorPolicy::Abort);
        assert_eq!(config.pipeline.retry.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settlement.toml");
        std::fs::write(
            &path,
            r#"
[directory]
base_url = "http://localhost:9000"

[export]
output_dir = "/tmp/debit"
rounding = "half_even"

[pipeline]
error_policy = "skip"

[pipeline.retry]
max_retries = 2
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.directory.base_url, "http://localhost:9000");
        assert_eq!(config.directory.fetch_timeout_seconds, 30);
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/debit"));
        assert_eq!(config.export.rounding, RoundingRule::HalfEven);
        assert_eq!(config.pipeline.error_policy, ErrorPolicy::Skip);
        assert_eq!(config.pipeline.retry.max_retries, 2);
        assert_eq!(config.pipeline.retry.initial_delay_ms, 500);
    }

    #[test]
    fn test_from_file_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settlement.toml");
        std::fs::write(&path, "[directory]\nfetch_timeout_seconds = 0\n").unwrap();

        assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_error_policy_parse() {
        assert_eq!("Skip".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Skip);
        assert_eq!("abort".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
        assert!("ignore".parse::<ErrorPolicy>().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SETTLEMENT_BASE_URL", "http://directory.local"),
            ("SETTLEMENT_FETCH_TIMEOUT_SECONDS", "7"),
            ("SETTLEMENT_OUTPUT_DIR", "/var/batches"),
            ("SETTLEMENT_ROUNDING", "floor"),
            ("SETTLEMENT_ERROR_POLICY", "skip"),
            ("SETTLEMENT_MAX_RETRIES", "3"),
        ]))
        .unwrap();

        assert_eq!(config.directory.base_url, "http://directory.local");
        assert_eq!(config.directory.fetch_timeout(), Duration::from_secs(7));
        assert_eq!(config.export.output_dir, PathBuf::from("/var/batches"));
        assert_eq!(config.export.rounding, RoundingRule::Floor);
        assert_eq!(config.pipeline.error_policy, ErrorPolicy::Skip);
        assert_eq!(config.pipeline.retry.max_retries, 3);
    }

    #[test]
    fn test_env_unset_keeps_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn test_env_invalid_values() {
        for (name, value) in [
            ("SETTLEMENT_MAX_RETRIES", "three"),
            ("SETTLEMENT_MAX_RETRIES", "-1"),
            ("SETTLEMENT_FETCH_TIMEOUT_SECONDS", "0"),
            ("SETTLEMENT_ERROR_POLICY", "ignore"),
        ] {
            let err = Config::from_lookup(lookup(&[(name, value)])).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{}={}: {}", name, value, err);
        }
    }
}
