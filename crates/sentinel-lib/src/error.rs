//! Error types for the sentinel library
//!
//! Each component owns a narrow error enum; orchestration code wraps them
//! in `anyhow::Error` at the loop boundary.

use thiserror::Error;

/// Failure to obtain a reading from a telemetry source
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telemetry source returned HTTP {0}")]
    Status(u16),

    #[error("telemetry query returned no samples")]
    EmptyResult,

    #[error("malformed telemetry response: {0}")]
    Malformed(String),

    #[error("telemetry source timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid telemetry URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failure inside the incident audit store
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt incident row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    #[error("audit store lock poisoned")]
    Poisoned,
}

/// Reason a single process could not be terminated
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TerminateError {
    #[error("process {0} no longer exists")]
    Vanished(u32),

    #[error("permission denied terminating process {0}")]
    PermissionDenied(u32),
}

/// Failure of a remediation pass as a whole
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("no remediation script configured")]
    ScriptNotConfigured,

    #[error("failed to launch remediation script {path}: {source}")]
    ScriptLaunch {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid or unloadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
