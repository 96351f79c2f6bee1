//! Process termination backend

use super::{RemediationBackend, RemediationContext};
use crate::config::RemediationConfig;
use crate::error::{RemediationError, TerminateError};
use crate::models::{IncidentStatus, ProcessInfo, RemediationTarget};
use async_trait::async_trait;
use std::sync::Arc;
use sysinfo::{Pid, Signal, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::sync::Mutex;

/// Enumerates and terminates OS processes
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Live processes with their current CPU utilisation
    async fn snapshot(&self) -> Vec<ProcessInfo>;

    /// Send a graceful termination request
    async fn terminate(&self, pid: u32) -> Result<(), TerminateError>;
}

/// `ProcessTable` backed by sysinfo
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessTable for SysinfoProcessTable {
    async fn snapshot(&self) -> Vec<ProcessInfo> {
        let mut system = self.system.lock().await;
        // Per-process usage needs two refreshes
        system.refresh_processes();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_processes();

        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                cpu_percent: process.cpu_usage() as f64,
            })
            .collect()
    }

    async fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
        let mut system = self.system.lock().await;
        let sys_pid = Pid::from_u32(pid);

        if !system.refresh_process(sys_pid) {
            return Err(TerminateError::Vanished(pid));
        }
        let process = system
            .process(sys_pid)
            .ok_or(TerminateError::Vanished(pid))?;

        let delivered = match process.kill_with(Signal::Term) {
            Some(delivered) => delivered,
            // No SIGTERM on this platform
            None => process.kill(),
        };

        if delivered {
            Ok(())
        } else {
            Err(TerminateError::PermissionDenied(pid))
        }
    }
}

/// Choose the processes a pass should act on, busiest first
///
/// A process qualifies when its name equals the configured target name or
/// its utilisation exceeds the kill threshold. The sentinel itself and
/// protected names never qualify.
pub fn select_targets(
    processes: &[ProcessInfo],
    config: &RemediationConfig,
    own_pid: u32,
) -> Vec<RemediationTarget> {
    let mut targets: Vec<RemediationTarget> = processes
        .iter()
        .filter(|p| p.pid != own_pid)
        .filter(|p| !config.protected_processes.iter().any(|name| name == &p.name))
        .filter(|p| {
            config.target_process_name.as_deref() == Some(p.name.as_str())
                || p.cpu_percent > config.cpu_kill_threshold_percent
        })
        .map(|p| RemediationTarget {
            process_id: p.pid,
            process_name: p.name.clone(),
            observed_load: p.cpu_percent,
        })
        .collect();

    targets.sort_by(|a, b| {
        b.observed_load
            .total_cmp(&a.observed_load)
            .then(a.process_id.cmp(&b.process_id))
    });
    targets
}

/// Terminates runaway processes
pub struct ProcessBackend {
    table: Arc<dyn ProcessTable>,
    config: RemediationConfig,
    own_pid: u32,
}

impl ProcessBackend {
    pub fn new(table: Arc<dyn ProcessTable>, config: RemediationConfig) -> Self {
        Self {
            table,
            config,
            own_pid: std::process::id(),
        }
    }
}

#[async_trait]
impl RemediationBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn remediate(
        &self,
        ctx: &RemediationContext<'_>,
    ) -> Result<Vec<RemediationTarget>, RemediationError> {
        let snapshot = self.table.snapshot().await;
        let targets = select_targets(&snapshot, &self.config, self.own_pid);
        let status = ctx.trigger.incident_status(IncidentStatus::Terminated);

        let mut terminated = Vec::with_capacity(targets.len());
        for target in targets {
            ctx.recorder.record(&target, status).await;

            match self.table.terminate(target.process_id).await {
                Ok(()) => terminated.push(target),
                Err(e) => ctx.recorder.target_skipped(&target, &e.to_string()),
            }
        }

        Ok(terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStore;
    use crate::health::HealthRegistry;
    use crate::observability::{SentinelMetrics, StructuredLogger};
    use crate::remediation::{IncidentRecorder, Trigger};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeTable {
        processes: Vec<ProcessInfo>,
        failures: HashMap<u32, TerminateError>,
        terminated: StdMutex<Vec<u32>>,
    }

    #[async_trait]
    impl ProcessTable for FakeTable {
        async fn snapshot(&self) -> Vec<ProcessInfo> {
            self.processes.clone()
        }

        async fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
            if let Some(e) = self.failures.get(&pid) {
                return Err(e.clone());
            }
            self.terminated.lock().unwrap().push(pid);
            Ok(())
        }
    }

    fn proc(pid: u32, name: &str, cpu: f64) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
        }
    }

    fn recorder() -> IncidentRecorder {
        IncidentRecorder::new(
            Arc::new(AuditStore::open_in_memory().unwrap()),
            SentinelMetrics::new(),
            StructuredLogger::new("test-node"),
            HealthRegistry::new(),
        )
    }

    fn epoch() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn test_select_by_threshold_and_name() {
        let config = RemediationConfig {
            cpu_kill_threshold_percent: 80.0,
            target_process_name: Some("miner".to_string()),
            ..Default::default()
        };
        let processes = vec![
            proc(1, "init", 0.1),
            proc(2, "stress", 97.0),
            proc(3, "miner", 3.0),
            proc(4, "editor", 80.0),
            proc(5, "compile", 150.0),
        ];

        let pids: Vec<u32> = select_targets(&processes, &config, 999)
            .into_iter()
            .map(|t| t.process_id)
            .collect();
        assert_eq!(pids, vec![5, 2, 3]);
    }

    #[test]
    fn test_select_excludes_self_and_protected() {
        let config = RemediationConfig {
            cpu_kill_threshold_percent: 50.0,
            protected_processes: vec!["sshd".to_string()],
            ..Default::default()
        };
        let processes = vec![proc(42, "sentinel", 99.0), proc(7, "sshd", 99.0), proc(8, "hog", 99.0)];

        let targets = select_targets(&processes, &config, 42);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].process_name, "hog");
        assert_eq!(targets[0].observed_load, 99.0);
    }

    #[tokio::test]
    async fn test_no_qualifying_process_writes_no_incident() {
        let table = Arc::new(FakeTable {
            processes: vec![proc(1, "idle", 2.0), proc(2, "shell", 5.0)],
            ..Default::default()
        });
        let backend = ProcessBackend::new(table.clone(), RemediationConfig::default());
        let recorder = recorder();
        let ctx = RemediationContext {
            trigger: Trigger::Automatic,
            observed_load: Some(95.0),
            recorder: &recorder,
        };

        let targets = backend.remediate(&ctx).await.unwrap();
        assert!(targets.is_empty());
        assert!(table.terminated.lock().unwrap().is_empty());
        assert!(recorder.audit.query(epoch()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminates_and_records_each_target() {
        let table = Arc::new(FakeTable {
            processes: vec![proc(100, "hog", 95.0), proc(101, "calm", 4.0)],
            ..Default::default()
        });
        let backend = ProcessBackend::new(table.clone(), RemediationConfig::default());
        let recorder = recorder();
        let ctx = RemediationContext {
            trigger: Trigger::Automatic,
            observed_load: Some(95.0),
            recorder: &recorder,
        };

        let targets = backend.remediate(&ctx).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].process_id, 100);
        assert_eq!(*table.terminated.lock().unwrap(), vec![100]);

        let incidents = recorder.audit.query(epoch()).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].process_name, "hog");
        assert_eq!(incidents[0].cpu_load, "95.0%");
        assert_eq!(incidents[0].status, IncidentStatus::Terminated);
    }

    #[tokio::test]
    async fn test_vanished_and_denied_targets_are_skipped() {
        let mut failures = HashMap::new();
        failures.insert(200, TerminateError::Vanished(200));
        failures.insert(201, TerminateError::PermissionDenied(201));
        let table = Arc::new(FakeTable {
            processes: vec![proc(200, "gone", 99.0), proc(201, "root-owned", 98.0), proc(202, "hog", 97.0)],
            failures,
            ..Default::default()
        });
        let backend = ProcessBackend::new(table.clone(), RemediationConfig::default());
        let recorder = recorder();
        let ctx = RemediationContext {
            trigger: Trigger::Manual,
            observed_load: None,
            recorder: &recorder,
        };

        let targets = backend.remediate(&ctx).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].process_id, 202);

        // Incidents are written before the signal is sent
        let incidents = recorder.audit.query(epoch()).unwrap();
        assert_eq!(incidents.len(), 3);
        assert!(incidents.iter().all(|i| i.status == IncidentStatus::Manual));
    }

    #[tokio::test]
    async fn test_sysinfo_table_reports_missing_pid() {
        let table = SysinfoProcessTable::new();
        // PIDs this large are not allocated on Linux
        assert_eq!(
            table.terminate(u32::MAX - 1).await,
            Err(TerminateError::Vanished(u32::MAX - 1))
        );
    }

    #[tokio::test]
    async fn test_sysinfo_snapshot_contains_self() {
        let table = SysinfoProcessTable::new();
        let own = std::process::id();
        let snapshot = table.snapshot().await;
        assert!(snapshot.iter().any(|p| p.pid == own));
    }
}
