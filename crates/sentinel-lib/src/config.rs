//! Sentinel configuration
//!
//! Loaded once at startup from an optional TOML file overlaid by
//! `SENTINEL_`-prefixed environment variables, then frozen for the run.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "SENTINEL_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "sentinel.toml";

/// Default Prometheus expression: aggregate CPU-busy percent across cores
pub const DEFAULT_CPU_QUERY: &str =
    r#"100 - (avg by (instance) (irate(node_cpu_seconds_total{mode="idle"}[2m])) * 100)"#;

/// Process-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// Host identifier attached to log events
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for the health, metrics and observer API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub remediation: RemediationConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// Control loop cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Seconds between cycles (2-10)
    pub interval_secs: u64,
    /// Seconds to wait after a failed cycle
    pub error_backoff_secs: u64,
    /// Drop the history after a remediation that acted on something
    pub reset_window_after_remediation: bool,
}

/// Anomaly detector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Learning period length; no verdicts before this many samples
    pub min_samples: usize,
    pub window_capacity: usize,
    /// Expected outlier fraction of the window
    pub contamination: f64,
    pub n_estimators: usize,
    /// Readings above this are critical regardless of the model
    pub critical_ceiling_percent: f64,
    pub random_seed: u64,
    pub outlier_gain: f64,
    pub outlier_base: f64,
    pub inlier_shift: f64,
    pub inlier_gain: f64,
}

/// Which remediation backend acts on a positive decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Process,
    Script,
}

/// Remediation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub backend: BackendKind,
    /// Minimum detector confidence for automatic remediation (50-95)
    pub confidence_threshold_percent: f64,
    /// Processes above this utilisation are selected for termination
    pub cpu_kill_threshold_percent: f64,
    /// Processes with exactly this name are always selected
    pub target_process_name: Option<String>,
    /// Names that are never terminated
    pub protected_processes: Vec<String>,
    pub script_path: Option<PathBuf>,
    pub script_timeout_secs: u64,
}

/// Where CPU readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySourceKind {
    Prometheus,
    Local,
    Synthetic,
}

/// Telemetry source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub source: TelemetrySourceKind,
    pub prometheus_url: String,
    pub query: String,
    pub timeout_ms: u64,
    /// Bounds of the synthetic fallback distribution
    pub fallback_min: f64,
    pub fallback_max: f64,
}

/// Incident store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub database_path: PathBuf,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            scan: ScanConfig::default(),
            detector: DetectorConfig::default(),
            remediation: RemediationConfig::default(),
            telemetry: TelemetryConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            error_backoff_secs: 10,
            reset_window_after_remediation: false,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_samples: 15,
            window_capacity: 30,
            contamination: 0.01,
            n_estimators: 100,
            critical_ceiling_percent: 90.0,
            random_seed: 42,
            outlier_gain: 500.0,
            outlier_base: 50.0,
            inlier_shift: 0.5,
            inlier_gain: 100.0,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Process,
            confidence_threshold_percent: 85.0,
            cpu_kill_threshold_percent: 80.0,
            target_process_name: None,
            protected_processes: Vec::new(),
            script_path: None,
            script_timeout_secs: 30,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            source: TelemetrySourceKind::Prometheus,
            prometheus_url: "http://localhost:9090".to_string(),
            query: DEFAULT_CPU_QUERY.to_string(),
            timeout_ms: 2000,
            fallback_min: 5.0,
            fallback_max: 12.0,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sentinel_ops.db"),
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SentinelConfig {
    /// Load configuration from the config file (if any) and environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file path plus environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: SentinelConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values outside their operating ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=10).contains(&self.scan.interval_secs) {
            return Err(ConfigError::invalid(
                "scan.interval_secs",
                format!("must be within 2-10, got {}", self.scan.interval_secs),
            ));
        }
        if self.scan.error_backoff_secs == 0 {
            return Err(ConfigError::invalid("scan.error_backoff_secs", "must be positive"));
        }

        let detector = &self.detector;
        if detector.min_samples < 2 {
            return Err(ConfigError::invalid("detector.min_samples", "must be at least 2"));
        }
        if detector.window_capacity < detector.min_samples {
            return Err(ConfigError::invalid(
                "detector.window_capacity",
                format!(
                    "must be at least min_samples ({}), got {}",
                    detector.min_samples, detector.window_capacity
                ),
            ));
        }
        if !(detector.contamination > 0.0 && detector.contamination <= 0.5) {
            return Err(ConfigError::invalid(
                "detector.contamination",
                format!("must be within (0, 0.5], got {}", detector.contamination),
            ));
        }
        if detector.n_estimators == 0 {
            return Err(ConfigError::invalid("detector.n_estimators", "must be positive"));
        }

        let remediation = &self.remediation;
        if !(50.0..=95.0).contains(&remediation.confidence_threshold_percent) {
            return Err(ConfigError::invalid(
                "remediation.confidence_threshold_percent",
                format!(
                    "must be within 50-95, got {}",
                    remediation.confidence_threshold_percent
                ),
            ));
        }
        if !(0.0..=100.0).contains(&remediation.cpu_kill_threshold_percent) {
            return Err(ConfigError::invalid(
                "remediation.cpu_kill_threshold_percent",
                "must be within 0-100",
            ));
        }
        if remediation.backend == BackendKind::Script && remediation.script_path.is_none() {
            return Err(ConfigError::invalid(
                "remediation.script_path",
                "required when backend is 'script'",
            ));
        }

        let telemetry = &self.telemetry;
        if telemetry.fallback_min > telemetry.fallback_max {
            return Err(ConfigError::invalid(
                "telemetry.fallback_min",
                "must not exceed telemetry.fallback_max",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_config_is_valid() {
        let config = SentinelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.interval_secs, 5);
        assert_eq!(config.detector.min_samples, 15);
        assert_eq!(config.detector.window_capacity, 30);
        assert_eq!(config.remediation.confidence_threshold_percent, 85.0);
        assert_eq!(config.remediation.cpu_kill_threshold_percent, 80.0);
        assert!(config.remediation.target_process_name.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_interval() {
        let mut config = SentinelConfig::default();
        config.scan.interval_secs = 30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "scan.interval_secs", .. })
        ));
    }

    #[test]
    fn test_rejects_window_smaller_than_learning_period() {
        let mut config = SentinelConfig::default();
        config.detector.window_capacity = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_script_backend_requires_path() {
        let mut config = SentinelConfig::default();
        config.remediation.backend = BackendKind::Script;
        assert!(config.validate().is_err());

        config.remediation.script_path = Some(PathBuf::from("/usr/local/bin/heal.sh"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
node_name = "web-01"

[scan]
interval_secs = 3

[detector]
contamination = 0.05
window_capacity = 40

[remediation]
confidence_threshold_percent = 90
target_process_name = "yes"
protected_processes = ["sshd"]

[telemetry]
source = "synthetic"
"#;
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let path = file.path().with_extension("");
        let config = SentinelConfig::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(config.node_name, "web-01");
        assert_eq!(config.scan.interval_secs, 3);
        assert_eq!(config.scan.error_backoff_secs, 10);
        assert_eq!(config.detector.contamination, 0.05);
        assert_eq!(config.detector.window_capacity, 40);
        assert_eq!(config.detector.min_samples, 15);
        assert_eq!(config.remediation.confidence_threshold_percent, 90.0);
        assert_eq!(config.remediation.target_process_name.as_deref(), Some("yes"));
        assert_eq!(config.remediation.protected_processes, vec!["sshd".to_string()]);
        assert_eq!(config.telemetry.source, TelemetrySourceKind::Synthetic);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = SentinelConfig::load_from("/nonexistent/sentinel-config").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.telemetry.source, TelemetrySourceKind::Prometheus);
    }
}
