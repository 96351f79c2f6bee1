//! Remediation
//!
//! A `RemediationExecutor` runs one configured `RemediationBackend` and
//! routes every incident through the shared `AuditStore`. Both the control
//! loop and manual triggers use the same executor.

mod process;
mod script;

pub use process::{select_targets, ProcessBackend, ProcessTable, SysinfoProcessTable};
pub use script::ScriptBackend;

use crate::audit::AuditStore;
use crate::config::{BackendKind, RemediationConfig};
use crate::error::RemediationError;
use crate::health::{components, HealthRegistry};
use crate::models::{Incident, IncidentStatus, NewIncident, RemediationTarget};
use crate::observability::{SentinelMetrics, StructuredLogger};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What initiated a remediation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Gate opened by the control loop
    Automatic,
    /// Operator request; bypasses the gate
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Automatic => "automatic",
            Trigger::Manual => "manual",
        }
    }

    /// Incident status for this trigger, given the backend's automatic status
    pub fn incident_status(&self, automatic: IncidentStatus) -> IncidentStatus {
        match self {
            Trigger::Automatic => automatic,
            Trigger::Manual => IncidentStatus::Manual,
        }
    }
}

/// Persists incidents and reports per-target problems
///
/// An incident that cannot be written is logged and counted and the audit
/// component is marked unhealthy; remediation itself carries on.
pub struct IncidentRecorder {
    audit: Arc<AuditStore>,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl IncidentRecorder {
    pub fn new(
        audit: Arc<AuditStore>,
        metrics: SentinelMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        Self {
            audit,
            metrics,
            logger,
            health,
        }
    }

    pub async fn record(&self, target: &RemediationTarget, status: IncidentStatus) -> Option<Incident> {
        match self.audit.record(&NewIncident::for_target(target, status)) {
            Ok(incident) => {
                self.health.set_healthy(components::AUDIT_STORE).await;
                Some(incident)
            }
            Err(e) => {
                self.metrics.inc_audit_errors();
                self.logger
                    .log_audit_failure(&target.process_name, target.process_id, &e.to_string());
                self.health
                    .set_unhealthy(components::AUDIT_STORE, e.to_string())
                    .await;
                None
            }
        }
    }

    pub fn target_skipped(&self, target: &RemediationTarget, reason: &str) {
        self.metrics.inc_targets_skipped();
        self.logger.log_target_skipped(target, reason);
    }
}

/// Per-pass inputs handed to a backend
pub struct RemediationContext<'a> {
    pub trigger: Trigger,
    /// Load that prompted the pass, when known
    pub observed_load: Option<f64>,
    pub recorder: &'a IncidentRecorder,
}

/// Trait for remediation implementations
#[async_trait]
pub trait RemediationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Act on every qualifying target and return those actually acted on
    async fn remediate(
        &self,
        ctx: &RemediationContext<'_>,
    ) -> Result<Vec<RemediationTarget>, RemediationError>;
}

/// Create the backend named by the configuration
pub fn create_backend(config: &RemediationConfig) -> Result<Arc<dyn RemediationBackend>, RemediationError> {
    match config.backend {
        BackendKind::Process => {
            tracing::info!(
                kill_threshold = config.cpu_kill_threshold_percent,
                target = ?config.target_process_name,
                "Using process termination backend"
            );
            Ok(Arc::new(ProcessBackend::new(
                Arc::new(SysinfoProcessTable::new()),
                config.clone(),
            )))
        }
        BackendKind::Script => {
            let path = config
                .script_path
                .clone()
                .ok_or(RemediationError::ScriptNotConfigured)?;
            tracing::info!(script = %path.display(), "Using script backend");
            Ok(Arc::new(ScriptBackend::new(
                path,
                Duration::from_secs(config.script_timeout_secs),
            )))
        }
    }
}

/// Runs remediation passes against one backend
pub struct RemediationExecutor {
    backend: Arc<dyn RemediationBackend>,
    audit: Arc<AuditStore>,
    recorder: IncidentRecorder,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl RemediationExecutor {
    pub fn new(
        backend: Arc<dyn RemediationBackend>,
        audit: Arc<AuditStore>,
        metrics: SentinelMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        let recorder = IncidentRecorder::new(
            audit.clone(),
            metrics.clone(),
            logger.clone(),
            health.clone(),
        );
        Self {
            backend,
            audit,
            recorder,
            metrics,
            logger,
            health,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn audit(&self) -> &Arc<AuditStore> {
        &self.audit
    }

    /// Run one remediation pass
    pub async fn remediate(
        &self,
        trigger: Trigger,
        observed_load: Option<f64>,
    ) -> anyhow::Result<Vec<RemediationTarget>> {
        let ctx = RemediationContext {
            trigger,
            observed_load,
            recorder: &self.recorder,
        };

        match self.backend.remediate(&ctx).await {
            Ok(targets) => {
                self.metrics.inc_remediations(trigger);
                self.metrics.add_processes_terminated(targets.len());
                self.logger
                    .log_remediation(trigger, self.backend.name(), &targets);
                self.health.set_healthy(components::EXECUTOR).await;
                Ok(targets)
            }
            Err(e) => {
                self.health
                    .set_degraded(components::EXECUTOR, e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use chrono::{TimeZone, Utc};

    struct FixedBackend {
        targets: Vec<RemediationTarget>,
    }

    #[async_trait]
    impl RemediationBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn remediate(
            &self,
            ctx: &RemediationContext<'_>,
        ) -> Result<Vec<RemediationTarget>, RemediationError> {
            for target in &self.targets {
                ctx.recorder
                    .record(target, ctx.trigger.incident_status(IncidentStatus::Terminated))
                    .await;
            }
            Ok(self.targets.clone())
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl RemediationBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn remediate(
            &self,
            _ctx: &RemediationContext<'_>,
        ) -> Result<Vec<RemediationTarget>, RemediationError> {
            Err(RemediationError::ScriptNotConfigured)
        }
    }

    fn target(pid: u32) -> RemediationTarget {
        RemediationTarget {
            process_id: pid,
            process_name: format!("proc-{}", pid),
            observed_load: 95.0,
        }
    }

    fn executor(backend: Arc<dyn RemediationBackend>, health: HealthRegistry) -> RemediationExecutor {
        RemediationExecutor::new(
            backend,
            Arc::new(AuditStore::open_in_memory().unwrap()),
            SentinelMetrics::new(),
            StructuredLogger::new("test-node"),
            health,
        )
    }

    fn epoch() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn test_trigger_statuses() {
        assert_eq!(
            Trigger::Automatic.incident_status(IncidentStatus::AutoHealed),
            IncidentStatus::AutoHealed
        );
        assert_eq!(
            Trigger::Manual.incident_status(IncidentStatus::Terminated),
            IncidentStatus::Manual
        );
        assert_eq!(Trigger::Manual.as_str(), "manual");
    }

    #[tokio::test]
    async fn test_manual_trigger_records_manual_incidents() {
        let health = HealthRegistry::new();
        let exec = executor(
            Arc::new(FixedBackend {
                targets: vec![target(10), target(11)],
            }),
            health.clone(),
        );

        let targets = exec.remediate(Trigger::Manual, None).await.unwrap();
        assert_eq!(targets.len(), 2);

        let incidents = exec.audit().query(epoch()).unwrap();
        assert_eq!(incidents.len(), 2);
        assert!(incidents.iter().all(|i| i.status == IncidentStatus::Manual));
        assert_eq!(
            health.status_of(components::EXECUTOR).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_nothing_qualifying_writes_nothing() {
        let exec = executor(
            Arc::new(FixedBackend { targets: vec![] }),
            HealthRegistry::new(),
        );

        let targets = exec.remediate(Trigger::Automatic, Some(95.0)).await.unwrap();
        assert!(targets.is_empty());
        assert!(exec.audit().query(epoch()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_executor() {
        let health = HealthRegistry::new();
        health.register_all().await;
        let exec = executor(Arc::new(BrokenBackend), health.clone());

        assert!(exec.remediate(Trigger::Automatic, Some(99.0)).await.is_err());
        assert_eq!(
            health.status_of(components::EXECUTOR).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[test]
    fn test_script_backend_requires_path() {
        let config = RemediationConfig {
            backend: BackendKind::Script,
            script_path: None,
            ..Default::default()
        };
        assert!(matches!(
            create_backend(&config),
            Err(RemediationError::ScriptNotConfigured)
        ));
    }

    #[test]
    fn test_create_process_backend() {
        let backend = create_backend(&RemediationConfig::default()).unwrap();
        assert_eq!(backend.name(), "process");
    }
}
