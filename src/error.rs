//! Error types for the liquidity risk monitor

use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {

    // =============================
    // Fatal Pipeline Errors
    // =============================

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Forecast error: {0}")]
    ForecastError(String),

    // =============================
    // Recoverable Agent Errors
    // =============================

    #[error("Collaborator error: {0}")]
    CollaboratorError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // =============================
    // Infrastructure Errors
    // =============================

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("KYC error: {0}")]
    KycError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether this error aborts a pipeline run.
    ///
    /// Only data and forecast failures are fatal; everything raised by an
    /// agent stage is absorbed by that stage's fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::DataError(_) | MonitorError::ForecastError(_)
        )
    }
}
