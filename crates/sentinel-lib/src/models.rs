//! Core data models for the sentinel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a sample's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    /// Read from the configured telemetry source
    Telemetry,
    /// Generated locally because the telemetry source was unreachable
    Fallback,
}

/// One CPU-load reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Aggregate CPU-busy percentage, 0-100
    pub value: f64,
    pub origin: SampleOrigin,
}

impl Sample {
    pub fn new(value: f64, origin: SampleOrigin) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
            origin,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == SampleOrigin::Fallback
    }
}

/// Health classification for one evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Learning,
    Healthy,
    Anomaly,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Learning => "LEARNING",
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Anomaly => "ANOMALY",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector output for the most recent sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub is_anomaly: bool,
    /// Self-reported certainty, 0-100
    pub confidence: f64,
    pub status: HealthStatus,
    /// Raw value of the sample the verdict was computed for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_load: Option<f64>,
}

impl HealthVerdict {
    pub fn learning(current_load: Option<f64>) -> Self {
        Self {
            is_anomaly: false,
            confidence: 0.0,
            status: HealthStatus::Learning,
            current_load,
        }
    }

    pub fn critical(current_load: f64) -> Self {
        Self {
            is_anomaly: true,
            confidence: 100.0,
            status: HealthStatus::Critical,
            current_load: Some(current_load),
        }
    }

    pub fn healthy(confidence: f64, current_load: f64) -> Self {
        Self {
            is_anomaly: false,
            confidence,
            status: HealthStatus::Healthy,
            current_load: Some(current_load),
        }
    }

    pub fn anomaly(confidence: f64, current_load: f64) -> Self {
        Self {
            is_anomaly: true,
            confidence,
            status: HealthStatus::Anomaly,
            current_load: Some(current_load),
        }
    }
}

/// A process selected for termination in one remediation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationTarget {
    pub process_id: u32,
    pub process_name: String,
    pub observed_load: f64,
}

/// Live process as seen by a process table
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Utilisation in percent of one core, may exceed 100 on multi-core hosts
    pub cpu_percent: f64,
}

/// Outcome label stored with each incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    Terminated,
    #[serde(rename = "Auto-Healed")]
    AutoHealed,
    Manual,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Terminated => "Terminated",
            IncidentStatus::AutoHealed => "Auto-Healed",
            IncidentStatus::Manual => "Manual",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Terminated" => Ok(IncidentStatus::Terminated),
            "Auto-Healed" => Ok(IncidentStatus::AutoHealed),
            "Manual" => Ok(IncidentStatus::Manual),
            other => Err(format!("unknown incident status '{}'", other)),
        }
    }
}

/// Incident about to be appended to the audit store
#[derive(Debug, Clone, PartialEq)]
pub struct NewIncident {
    pub timestamp: DateTime<Utc>,
    pub process_name: String,
    pub process_id: u32,
    pub cpu_load: String,
    pub status: IncidentStatus,
}

impl NewIncident {
    pub fn for_target(target: &RemediationTarget, status: IncidentStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            process_name: target.process_name.clone(),
            process_id: target.process_id,
            cpu_load: format_load(target.observed_load),
            status,
        }
    }
}

/// Persisted remediation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub process_name: String,
    pub process_id: u32,
    pub cpu_load: String,
    pub status: IncidentStatus,
}

/// Render a load percentage the way incidents store it
pub fn format_load(load: f64) -> String {
    format!("{:.1}%", load)
}
