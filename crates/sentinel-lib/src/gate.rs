//! Remediation gate
//!
//! Decides whether an automatic remediation may follow a verdict. Critical
//! verdicts always pass so the fail-safe override cannot be blocked by the
//! confidence threshold.

use crate::config::RemediationConfig;
use crate::models::{HealthStatus, HealthVerdict};

/// True when the verdict warrants automatic remediation
pub fn should_remediate(verdict: &HealthVerdict, config: &RemediationConfig) -> bool {
    verdict.is_anomaly
        && (verdict.confidence >= config.confidence_threshold_percent
            || verdict.status == HealthStatus::Critical)
}
