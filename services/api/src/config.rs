//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Missing required variables stop the
//! service before it binds a socket.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use transcript_insights_core::PipelineSettings;

/// A custom error type for configuration loading failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_service_key: String,
    pub max_db_connections: u32,
    pub log_level: Level,
    pub openai_api_key: String,
    pub extraction_model: String,
    pub embedding_model: String,
    pub extraction_timeout: Duration,
    pub extraction_max_attempts: u32,
    pub embedding_max_attempts: u32,
    pub similarity_threshold: f32,
    pub similarity_max_results: usize,
    pub trend_window_months: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        // --- Required Settings ---
        let database_url = required("DATABASE_URL")?;
        let database_service_key = required("DATABASE_SERVICE_KEY")?;
        let openai_api_key = required("OPENAI_API_KEY")?;

        // --- Server and Logging ---
        let bind_address =
            parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>().ok())?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Adapter-specific Settings ---
        let extraction_model = lookup("EXTRACTION_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let embedding_model =
            lookup("EMBEDDING_MODEL").unwrap_or_else(|| "text-embedding-3-small".to_string());
        let max_db_connections = parse_or(&lookup, "MAX_DB_CONNECTIONS", Some(5))?;

        // --- Pipeline Tunables ---
        let extraction_timeout_secs: u64 = parse_or(&lookup, "EXTRACTION_TIMEOUT_SECS", Some(180))?;
        let extraction_max_attempts = parse_or(&lookup, "EXTRACTION_MAX_ATTEMPTS", Some(3))?;
        let embedding_max_attempts = parse_or(&lookup, "EMBEDDING_MAX_ATTEMPTS", Some(3))?;
        let similarity_threshold: f32 = parse_or(&lookup, "SIMILARITY_THRESHOLD", Some(0.85))?;
        if !(-1.0..=1.0).contains(&similarity_threshold) {
            return Err(ConfigError::InvalidValue(
                "SIMILARITY_THRESHOLD".to_string(),
                format!("{} is outside [-1, 1]", similarity_threshold),
            ));
        }
        let similarity_max_results = parse_or(&lookup, "SIMILARITY_MAX_RESULTS", Some(10))?;
        let trend_window_months = parse_or(&lookup, "TREND_WINDOW_MONTHS", Some(6))?;

        Ok(Self {
            bind_address,
            database_url,
            database_service_key,
            max_db_connections,
            log_level,
            openai_api_key,
            extraction_model,
            embedding_model,
            extraction_timeout: Duration::from_secs(extraction_timeout_secs),
            extraction_max_attempts,
            embedding_max_attempts,
            similarity_threshold,
            similarity_max_results,
            trend_window_months,
        })
    }

    /// The pipeline tunables carried by this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            extraction_max_attempts: self.extraction_max_attempts,
            extraction_timeout: self.extraction_timeout,
            embedding_max_attempts: self.embedding_max_attempts,
            similarity_threshold: self.similarity_threshold,
            similarity_max_results: self.similarity_max_results,
            trend_window_months: self.trend_window_months,
            ..PipelineSettings::default()
        }
    }
}

/// Parses an optional variable, falling back to `default` when it is unset.
fn parse_or<T, F>(lookup: &F, name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/insights"),
        ("DATABASE_SERVICE_KEY", "service-key"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.extraction_model, "gpt-4o");
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.extraction_timeout, Duration::from_secs(180));
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.trend_window_months, 6);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn missing_service_key_fails_fast() {
        let vars = [REQUIRED[0], REQUIRED[2]];
        assert_eq!(
            Config::from_lookup(lookup_from(&vars)).unwrap_err(),
            ConfigError::MissingVar("DATABASE_SERVICE_KEY".to_string())
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TREND_WINDOW_MONTHS", "half a year"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&vars)),
            Err(ConfigError::InvalidValue(name, _)) if name == "TREND_WINDOW_MONTHS"
        ));
    }

    #[test]
    fn overrides_reach_pipeline_settings() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SIMILARITY_THRESHOLD", "0.9"));
        vars.push(("EXTRACTION_MAX_ATTEMPTS", "5"));
        let settings = Config::from_lookup(lookup_from(&vars)).unwrap().pipeline_settings();

        assert_eq!(settings.similarity_threshold, 0.9);
        assert_eq!(settings.extraction_max_attempts, 5);
    }
}
