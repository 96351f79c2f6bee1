//! Script remediation backend
//!
//! Runs one registered executable with no arguments. Output is logged only.
//! A launch is a remediation; the timeout only bounds how long the cycle
//! waits for the script, which is left running past it.

use super::{RemediationBackend, RemediationContext};
use crate::error::RemediationError;
use crate::models::{IncidentStatus, RemediationTarget};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

pub struct ScriptBackend {
    path: PathBuf,
    timeout: Duration,
}

impl ScriptBackend {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    fn script_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[async_trait]
impl RemediationBackend for ScriptBackend {
    fn name(&self) -> &'static str {
        "script"
    }

    async fn remediate(
        &self,
        ctx: &RemediationContext<'_>,
    ) -> Result<Vec<RemediationTarget>, RemediationError> {
        let path = self.path.display().to_string();
        let child = Command::new(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RemediationError::ScriptLaunch {
                path: path.clone(),
                source,
            })?;

        let target = RemediationTarget {
            process_id: child.id().unwrap_or_default(),
            process_name: self.script_name(),
            observed_load: ctx.observed_load.unwrap_or_default(),
        };
        ctx.recorder
            .record(&target, ctx.trigger.incident_status(IncidentStatus::AutoHealed))
            .await;

        // The reaper outlives the wait below, so a slow script still finishes
        // and its output is still logged
        let script = path.clone();
        let pid = target.process_id;
        let mut reaper = tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) => info!(
                    script = %script,
                    pid = pid,
                    exit_code = ?output.status.code(),
                    stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Remediation script finished"
                ),
                Err(e) => {
                    warn!(script = %script, pid = pid, error = %e, "Failed to collect remediation script output")
                }
            }
        });

        match tokio::time::timeout(self.timeout, &mut reaper).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(script = %path, error = %e, "Remediation script reaper failed"),
            Err(_) => warn!(
                script = %path,
                pid = pid,
                timeout = ?self.timeout,
                "Remediation script still running, not waiting for it"
            ),
        }

        Ok(vec![target])
    }
}
