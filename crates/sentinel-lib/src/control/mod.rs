//! Sense-think-act control loop
//!
//! One cycle samples CPU load, updates the rolling window, evaluates it,
//! publishes the verdict and, when the gate opens, remediates. Observers
//! read `LoopSnapshot`s from a watch channel and never touch loop state.

mod r#loop;

pub use r#loop::{ControlLoop, ControlLoopBuilder};

use crate::models::{HealthVerdict, RemediationTarget, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub sample: Sample,
    pub verdict: HealthVerdict,
    /// Targets acted on, when the gate opened
    pub remediated: Option<Vec<RemediationTarget>>,
}

impl CycleOutcome {
    pub fn remediated_count(&self) -> usize {
        self.remediated.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Read-only view of loop state for observers
#[derive(Debug, Clone, Serialize)]
pub struct LoopSnapshot {
    pub window: Vec<Sample>,
    pub verdict: Option<HealthVerdict>,
    pub cycles: u64,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for LoopSnapshot {
    fn default() -> Self {
        Self {
            window: Vec::new(),
            verdict: None,
            cycles: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}
