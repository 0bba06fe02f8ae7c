//! Process-wide configuration
//!
//! Built once at start-up from the environment (after `.env` is loaded)
//! and handed to every component that needs it.

use crate::error::MonitorError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Empty when no key is configured; runs then use the fallback paths
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub llm_timeout: Duration,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub target_currency: String,
    pub prior_log_count: usize,
    pub api_port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            llm_timeout: Duration::from_secs(60),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            target_currency: "INR".to_string(),
            prior_log_count: 3,
            api_port: 8080,
        }
    }
}

impl MonitorConfig {
    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let timeout_secs: u64 = parse_var("LLM_TIMEOUT_SECS", 60)?;

        let api_port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|e| {
                MonitorError::ConfigError(format!("Invalid port '{}': {}", raw, e))
            })?,
            Err(_) => defaults.api_port,
        };

        Ok(Self {
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            llm_timeout: Duration::from_secs(timeout_secs),
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            log_dir: env::var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            target_currency: env::var("TARGET_CURRENCY").unwrap_or(defaults.target_currency),
            prior_log_count: parse_var("PRIOR_LOG_COUNT", defaults.prior_log_count)?,
            api_port,
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            MonitorError::ConfigError(format!("Invalid value for {} ('{}'): {}", name, raw, e))
        }),
        Err(_) => Ok(default),
    }
}
