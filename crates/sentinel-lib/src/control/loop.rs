//! Control loop driver

use super::{CycleOutcome, LoopSnapshot};
use crate::anomaly::AnomalyDetector;
use crate::config::SentinelConfig;
use crate::gate::should_remediate;
use crate::health::{components, HealthRegistry};
use crate::models::HealthVerdict;
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::remediation::{RemediationExecutor, Trigger};
use crate::sampler::MetricSampler;
use crate::window::RollingWindow;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Owns the window and drives sample-evaluate-remediate cycles
pub struct ControlLoop {
    sampler: MetricSampler,
    window: RollingWindow,
    detector: AnomalyDetector,
    executor: Arc<RemediationExecutor>,
    config: Arc<SentinelConfig>,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    snapshot_tx: watch::Sender<LoopSnapshot>,
    cycles: u64,
    last_error: Option<String>,
}

impl ControlLoop {
    /// Create a loop and the receiver observers read snapshots from
    pub fn new(
        sampler: MetricSampler,
        executor: Arc<RemediationExecutor>,
        config: Arc<SentinelConfig>,
        metrics: SentinelMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> (Self, watch::Receiver<LoopSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(LoopSnapshot::default());

        let control = Self {
            sampler,
            window: RollingWindow::new(config.detector.window_capacity),
            detector: AnomalyDetector::new(config.detector.clone()),
            executor,
            config,
            metrics,
            logger,
            health,
            snapshot_tx,
            cycles: 0,
            last_error: None,
        };

        (control, snapshot_rx)
    }

    /// Additional receiver for observers
    pub fn subscribe(&self) -> watch::Receiver<LoopSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.scan.interval_secs,
            backend = self.executor.backend_name(),
            telemetry_source = self.sampler.source_name(),
            "Starting control loop"
        );

        loop {
            let delay = match self.run_cycle().await {
                Ok(outcome) => {
                    debug!(
                        cycle = self.cycles,
                        status = %outcome.verdict.status,
                        remediated = outcome.remediated_count(),
                        "Cycle complete"
                    );
                    self.health.cycle_completed().await;
                    self.config.scan.interval()
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    let backoff = self.config.scan.error_backoff();
                    self.metrics.inc_cycle_errors();
                    self.logger
                        .log_cycle_failure(self.cycles, &reason, backoff.as_secs());
                    self.health
                        .set_degraded(components::CONTROL_LOOP, reason.clone())
                        .await;
                    self.last_error = Some(reason);
                    self.publish(None);
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }
        }
    }

    /// Execute one cycle
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let started = Instant::now();
        self.cycles += 1;
        self.last_error = None;

        // Sense
        let reading = self.sampler.sample_detailed().await;
        match &reading.fallback_reason {
            Some(reason) => {
                self.metrics.inc_telemetry_fallbacks();
                self.logger.log_telemetry_fallback(
                    self.sampler.source_name(),
                    &reason.to_string(),
                    reading.sample.value,
                );
                self.health
                    .set_degraded(components::SAMPLER, reason.to_string())
                    .await;
            }
            None => self.health.set_healthy(components::SAMPLER).await,
        }
        let sample = reading.sample;
        self.window.push(sample.clone());

        // Think
        let verdict = self.evaluate().await?;
        self.metrics
            .record_verdict(sample.value, &verdict, self.window.len());
        self.logger.log_verdict(&verdict, self.window.len());
        self.publish(Some(verdict.clone()));

        // Act
        let remediation = &self.config.remediation;
        let remediated = if should_remediate(&verdict, remediation) {
            let targets = self
                .executor
                .remediate(Trigger::Automatic, verdict.current_load)
                .await?;
            if !targets.is_empty() && self.config.scan.reset_window_after_remediation {
                self.window.clear();
                self.publish(Some(verdict.clone()));
            }
            Some(targets)
        } else {
            if verdict.is_anomaly {
                self.logger
                    .log_gate_paused(verdict.confidence, remediation.confidence_threshold_percent);
            }
            None
        };

        self.metrics
            .observe_cycle_latency(started.elapsed().as_secs_f64());

        Ok(CycleOutcome {
            sample,
            verdict,
            remediated,
        })
    }

    /// Fit and score off the async runtime; a panic surfaces as an error
    async fn evaluate(&self) -> Result<HealthVerdict> {
        let detector = self.detector.clone();
        let values = self.window.values();
        let started = Instant::now();

        match tokio::task::spawn_blocking(move || detector.evaluate(&values)).await {
            Ok(verdict) => {
                self.metrics
                    .observe_detector_latency(started.elapsed().as_secs_f64());
                self.health.set_healthy(components::DETECTOR).await;
                Ok(verdict)
            }
            Err(e) => {
                self.health
                    .set_unhealthy(components::DETECTOR, e.to_string())
                    .await;
                Err(anyhow!("detector task failed: {}", e))
            }
        }
    }

    fn publish(&self, verdict: Option<HealthVerdict>) {
        let verdict = verdict.or_else(|| self.snapshot_tx.borrow().verdict.clone());
        self.snapshot_tx.send_replace(LoopSnapshot {
            window: self.window.snapshot(),
            verdict,
            cycles: self.cycles,
            last_error: self.last_error.clone(),
            updated_at: Utc::now(),
        });
    }
}

/// Builder for creating the control loop
pub struct ControlLoopBuilder {
    sampler: Option<MetricSampler>,
    executor: Option<Arc<RemediationExecutor>>,
    config: Arc<SentinelConfig>,
    metrics: Option<SentinelMetrics>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            executor: None,
            config: Arc::new(SentinelConfig::default()),
            metrics: None,
            logger: None,
            health: None,
        }
    }

    pub fn sampler(mut self, sampler: MetricSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn executor(mut self, executor: Arc<RemediationExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(mut self, config: Arc<SentinelConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(mut self, metrics: SentinelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Override the scan interval
    pub fn interval(mut self, interval: Duration) -> Self {
        Arc::make_mut(&mut self.config).scan.interval_secs = interval.as_secs();
        self
    }

    /// Build the control loop
    pub fn build(self) -> Result<(ControlLoop, watch::Receiver<LoopSnapshot>)> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow!("Sampler is required"))?;
        let executor = self
            .executor
            .ok_or_else(|| anyhow!("Executor is required"))?;
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new(self.config.node_name.clone()));

        Ok(ControlLoop::new(
            sampler,
            executor,
            self.config,
            self.metrics.unwrap_or_default(),
            logger,
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
