//! CPU-load sampling
//!
//! A `MetricSampler` reads the aggregate CPU-busy percentage from a
//! `TelemetrySource`. Source failures never reach the caller: the sampler
//! substitutes a synthetic low-load reading so a missing value is neither
//! mistaken for zero load nor allowed to stall the control loop.

mod local;
mod prometheus;
mod synthetic;

pub use local::LocalCpuSource;
pub use prometheus::PrometheusSource;
pub use synthetic::SyntheticSource;

use crate::config::{TelemetryConfig, TelemetrySourceKind};
use crate::error::TelemetryError;
use crate::models::{Sample, SampleOrigin};
use std::sync::Arc;
use std::time::Duration;

pub use async_trait::async_trait;

/// Trait for CPU telemetry implementations
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Current aggregate CPU-busy percentage for the host
    async fn current_load(&self) -> Result<f64, TelemetryError>;
}

/// Create the telemetry source named by the configuration
pub fn create_source(config: &TelemetryConfig) -> Result<Arc<dyn TelemetrySource>, TelemetryError> {
    match config.source {
        TelemetrySourceKind::Prometheus => {
            tracing::info!(url = %config.prometheus_url, "Using Prometheus telemetry source");
            Ok(Arc::new(PrometheusSource::new(
                &config.prometheus_url,
                &config.query,
                config.timeout(),
            )?))
        }
        TelemetrySourceKind::Local => {
            tracing::info!("Using local host telemetry source");
            Ok(Arc::new(LocalCpuSource::new()))
        }
        TelemetrySourceKind::Synthetic => {
            tracing::warn!("Using synthetic telemetry source, readings are not real");
            Ok(Arc::new(SyntheticSource::new(
                config.fallback_min,
                config.fallback_max,
            )))
        }
    }
}

/// Result of one sampling attempt
#[derive(Debug)]
pub struct SampleOutcome {
    pub sample: Sample,
    /// Why the telemetry source was bypassed, when it was
    pub fallback_reason: Option<TelemetryError>,
}

/// Produces one reading per call, falling back to synthetic data on failure
pub struct MetricSampler {
    source: Arc<dyn TelemetrySource>,
    fallback: SyntheticSource,
    timeout: Duration,
}

impl MetricSampler {
    pub fn new(source: Arc<dyn TelemetrySource>, fallback: SyntheticSource, timeout: Duration) -> Self {
        Self {
            source,
            fallback,
            timeout,
        }
    }

    /// Build a sampler from telemetry configuration
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        Ok(Self::new(
            create_source(config)?,
            SyntheticSource::new(config.fallback_min, config.fallback_max),
            config.timeout(),
        ))
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Take one reading; never fails
    pub async fn sample(&self) -> Sample {
        self.sample_detailed().await.sample
    }

    /// Take one reading and report whether the fallback was used
    pub async fn sample_detailed(&self) -> SampleOutcome {
        match self.read_source().await {
            Ok(value) => SampleOutcome {
                sample: Sample::new(normalise(value), SampleOrigin::Telemetry),
                fallback_reason: None,
            },
            Err(e) => SampleOutcome {
                sample: Sample::new(self.fallback.reading(), SampleOrigin::Fallback),
                fallback_reason: Some(e),
            },
        }
    }

    async fn read_source(&self) -> Result<f64, TelemetryError> {
        match tokio::time::timeout(self.timeout, self.source.current_load()).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Clamp to a percentage and round to two decimals
fn normalise(value: f64) -> f64 {
    (value.clamp(0.0, 100.0) * 100.0).round() / 100.0
}
