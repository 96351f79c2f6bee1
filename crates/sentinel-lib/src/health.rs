//! Component health tracking
//!
//! Every stage of the control loop reports a transition after each cycle:
//! the sampler degrades while the fallback generator stands in for real
//! telemetry, the detector goes unhealthy when a fit panics, the audit store
//! goes unhealthy when an incident cannot be written. The registry keeps
//! when each component entered its current state and how many failing
//! reports it has seen in a row, so `/healthz` shows a flapping sampler
//! differently from one that has been down for an hour.
//!
//! Readiness is stricter than liveness: the sentinel is ready once startup
//! finished and the control loop completed its first cycle, and stays ready
//! until any component turns unhealthy or shutdown begins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Running on a fallback path
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    fn severity(self) -> u8 {
        match self {
            ComponentStatus::Healthy => 0,
            ComponentStatus::Degraded => 1,
            ComponentStatus::Unhealthy => 2,
        }
    }
}

/// Last reported state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered `status`
    pub since: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Non-healthy reports since the last healthy one
    pub consecutive_failures: u32,
}

impl ComponentHealth {
    fn registered(now: DateTime<Utc>) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            since: now,
            updated_at: now,
            consecutive_failures: 0,
        }
    }

    fn apply(&mut self, status: ComponentStatus, message: Option<String>, now: DateTime<Utc>) {
        if status != self.status {
            self.since = now;
        }
        self.consecutive_failures = match status {
            ComponentStatus::Healthy => 0,
            _ => self.consecutive_failures.saturating_add(1),
        };
        self.status = status;
        self.message = message;
        self.updated_at = now;
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_cycle_at: Option<DateTime<Utc>>,
}

impl HealthResponse {
    /// Worst status across all components; an empty registry is healthy
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SAMPLER: &str = "sampler";
    pub const DETECTOR: &str = "detector";
    pub const EXECUTOR: &str = "executor";
    pub const AUDIT_STORE: &str = "audit_store";
    pub const CONTROL_LOOP: &str = "control_loop";

    /// Every component the sentinel registers at startup
    pub const ALL: &[&str] = &[SAMPLER, DETECTOR, EXECUTOR, AUDIT_STORE, CONTROL_LOOP];
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    started: bool,
    first_cycle_at: Option<DateTime<Utc>>,
}

/// Shared view of component health, cloned into every stage
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy; re-registering resets it
    pub async fn register(&self, name: &str) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::registered(Utc::now()));
    }

    /// Register every sentinel component
    pub async fn register_all(&self) {
        for name in components::ALL {
            self.register(name).await;
        }
    }

    pub async fn status_of(&self, name: &str) -> Option<ComponentStatus> {
        self.state.read().await.components.get(name).map(|h| h.status)
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.state.read().await.components.get(name).cloned()
    }

    async fn report(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state
            .components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::registered(now))
            .apply(status, message, now);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.report(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Called by the control loop after every successful cycle
    pub async fn cycle_completed(&self) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.first_cycle_at.get_or_insert(now);
        state
            .components
            .entry(components::CONTROL_LOOP.to_string())
            .or_insert_with(|| ComponentHealth::registered(now))
            .apply(ComponentStatus::Healthy, None, now);
    }

    /// Startup finished (`true`) or shutdown began (`false`)
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.started = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(&state.components),
            components: state.components.clone(),
            first_cycle_at: state.first_cycle_at,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.started {
            Some("Sentinel not started".to_string())
        } else if state.first_cycle_at.is_none() {
            Some("Awaiting first control cycle".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, h)| h.status == ComponentStatus::Unhealthy)
                .map(|(name, h)| {
                    format!(
                        "Component {} unhealthy: {}",
                        name,
                        h.message.as_deref().unwrap_or("no detail")
                    )
                })
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
