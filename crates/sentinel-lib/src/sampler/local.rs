//! Host-local CPU telemetry via sysinfo

use super::{async_trait, TelemetrySource};
use crate::error::TelemetryError;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::sync::Mutex;

/// Reads global CPU usage of the machine the sentinel runs on
pub struct LocalCpuSource {
    system: Mutex<System>,
}

impl LocalCpuSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for LocalCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for LocalCpuSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn current_load(&self) -> Result<f64, TelemetryError> {
        let mut system = self.system.lock().await;
        // Usage is a delta between two refreshes
        system.refresh_cpu();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu();

        let usage = system.global_cpu_info().cpu_usage() as f64;
        if usage.is_finite() {
            Ok(usage)
        } else {
            Err(TelemetryError::Malformed(format!("non-finite cpu usage {}", usage)))
        }
    }
}
