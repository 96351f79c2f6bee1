//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (cycle latency, detector latency, current load, remediation counts)
//! - Structured JSON logging with tracing

use crate::models::{HealthStatus, HealthVerdict, RemediationTarget};
use crate::remediation::Trigger;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    cycle_latency_seconds: Histogram,
    detector_latency_seconds: Histogram,
    cpu_load_percent: Gauge,
    confidence_percent: Gauge,
    window_samples: IntGauge,
    verdicts_total: IntCounterVec,
    remediations_total: IntCounterVec,
    processes_terminated: IntCounter,
    targets_skipped: IntCounter,
    telemetry_fallbacks: IntCounter,
    cycle_errors: IntCounter,
    audit_errors: IntCounter,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "cpu_sentinel_cycle_latency_seconds",
                "Time spent on one sample-evaluate-remediate cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            detector_latency_seconds: register_histogram!(
                "cpu_sentinel_detector_latency_seconds",
                "Time spent fitting and scoring the novelty model",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detector_latency_seconds"),

            cpu_load_percent: register_gauge!(
                "cpu_sentinel_cpu_load_percent",
                "Most recent aggregate CPU-busy percentage"
            )
            .expect("Failed to register cpu_load_percent"),

            confidence_percent: register_gauge!(
                "cpu_sentinel_confidence_percent",
                "Detector confidence for the most recent sample"
            )
            .expect("Failed to register confidence_percent"),

            window_samples: register_int_gauge!(
                "cpu_sentinel_window_samples",
                "Number of samples in the rolling window"
            )
            .expect("Failed to register window_samples"),

            verdicts_total: register_int_counter_vec!(
                "cpu_sentinel_verdicts_total",
                "Verdicts emitted by the detector, by status",
                &["status"]
            )
            .expect("Failed to register verdicts_total"),

            remediations_total: register_int_counter_vec!(
                "cpu_sentinel_remediations_total",
                "Remediation passes executed, by trigger",
                &["trigger"]
            )
            .expect("Failed to register remediations_total"),

            processes_terminated: register_int_counter!(
                "cpu_sentinel_processes_terminated_total",
                "Processes terminated by remediation"
            )
            .expect("Failed to register processes_terminated"),

            targets_skipped: register_int_counter!(
                "cpu_sentinel_targets_skipped_total",
                "Selected processes that vanished or could not be terminated"
            )
            .expect("Failed to register targets_skipped"),

            telemetry_fallbacks: register_int_counter!(
                "cpu_sentinel_telemetry_fallbacks_total",
                "Samples generated synthetically because telemetry was unavailable"
            )
            .expect("Failed to register telemetry_fallbacks"),

            cycle_errors: register_int_counter!(
                "cpu_sentinel_cycle_errors_total",
                "Control loop cycles that failed and backed off"
            )
            .expect("Failed to register cycle_errors"),

            audit_errors: register_int_counter!(
                "cpu_sentinel_audit_errors_total",
                "Incident writes that failed"
            )
            .expect("Failed to register audit_errors"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn observe_detector_latency(&self, duration_secs: f64) {
        self.inner().detector_latency_seconds.observe(duration_secs);
    }

    /// Publish the gauges describing the latest cycle
    pub fn record_verdict(&self, load: f64, verdict: &HealthVerdict, window_len: usize) {
        let inner = self.inner();
        inner.cpu_load_percent.set(load);
        inner.confidence_percent.set(verdict.confidence);
        inner.window_samples.set(window_len as i64);
        inner
            .verdicts_total
            .with_label_values(&[verdict.status.as_str()])
            .inc();
    }

    pub fn inc_remediations(&self, trigger: Trigger) {
        self.inner()
            .remediations_total
            .with_label_values(&[trigger.as_str()])
            .inc();
    }

    pub fn add_processes_terminated(&self, count: usize) {
        self.inner().processes_terminated.inc_by(count as u64);
    }

    pub fn inc_targets_skipped(&self) {
        self.inner().targets_skipped.inc();
    }

    pub fn inc_telemetry_fallbacks(&self) {
        self.inner().telemetry_fallbacks.inc();
    }

    pub fn inc_cycle_errors(&self) {
        self.inner().cycle_errors.inc();
    }

    pub fn inc_audit_errors(&self) {
        self.inner().audit_errors.inc();
    }
}

/// Structured logger for sentinel events
///
/// Provides consistent JSON-formatted logging for verdicts, remediations
/// and loop failures.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, backend: &str, source: &str) {
        info!(
            event = "sentinel_started",
            node = %self.node_name,
            version = %version,
            backend = %backend,
            telemetry_source = %source,
            "CPU sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            node = %self.node_name,
            reason = %reason,
            "CPU sentinel shutting down"
        );
    }

    /// Log one cycle's verdict; anomalies go out at a higher level
    pub fn log_verdict(&self, verdict: &HealthVerdict, window_len: usize) {
        match verdict.status {
            HealthStatus::Critical => warn!(
                event = "anomaly_detected",
                node = %self.node_name,
                status = %verdict.status,
                confidence = verdict.confidence,
                cpu_load = ?verdict.current_load,
                window = window_len,
                "Critical CPU load, fail-safe override engaged"
            ),
            HealthStatus::Anomaly => warn!(
                event = "anomaly_detected",
                node = %self.node_name,
                status = %verdict.status,
                confidence = verdict.confidence,
                cpu_load = ?verdict.current_load,
                window = window_len,
                "Abnormal CPU load detected"
            ),
            HealthStatus::Healthy | HealthStatus::Learning => debug!(
                event = "verdict_evaluated",
                node = %self.node_name,
                status = %verdict.status,
                confidence = verdict.confidence,
                cpu_load = ?verdict.current_load,
                window = window_len,
                "System healthy"
            ),
        }
    }

    pub fn log_gate_paused(&self, confidence: f64, threshold: f64) {
        info!(
            event = "remediation_paused",
            node = %self.node_name,
            confidence = confidence,
            threshold = threshold,
            "Confidence below threshold, remediation paused"
        );
    }

    pub fn log_remediation(&self, trigger: Trigger, backend: &str, targets: &[RemediationTarget]) {
        let names: Vec<&str> = targets.iter().map(|t| t.process_name.as_str()).collect();
        let pids: Vec<u32> = targets.iter().map(|t| t.process_id).collect();
        info!(
            event = "remediation_executed",
            node = %self.node_name,
            trigger = %trigger.as_str(),
            backend = %backend,
            affected = targets.len(),
            processes = ?names,
            pids = ?pids,
            "Remediation executed"
        );
    }

    pub fn log_target_skipped(&self, target: &RemediationTarget, reason: &str) {
        warn!(
            event = "remediation_target_skipped",
            node = %self.node_name,
            pid = target.process_id,
            process_name = %target.process_name,
            reason = %reason,
            "Skipping remediation target"
        );
    }

    pub fn log_telemetry_fallback(&self, source: &str, reason: &str, value: f64) {
        warn!(
            event = "telemetry_fallback",
            node = %self.node_name,
            source = %source,
            reason = %reason,
            synthetic_value = value,
            "Telemetry unavailable, using synthetic reading"
        );
    }

    pub fn log_audit_failure(&self, process_name: &str, pid: u32, reason: &str) {
        error!(
            event = "audit_write_failed",
            node = %self.node_name,
            process_name = %process_name,
            pid = pid,
            reason = %reason,
            "Failed to persist incident"
        );
    }

    pub fn log_cycle_failure(&self, cycle: u64, reason: &str, backoff_secs: u64) {
        error!(
            event = "cycle_failed",
            node = %self.node_name,
            cycle = cycle,
            reason = %reason,
            backoff_secs = backoff_secs,
            "Control loop cycle failed, backing off"
        );
    }
}
