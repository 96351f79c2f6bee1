//! Core library for the CPU sentinel
//!
//! This crate provides the core functionality for:
//! - CPU-load sampling with a synthetic fallback
//! - Rolling-window novelty detection (isolation forest)
//! - Gated remediation (process termination or a registered script)
//! - An SQLite incident audit trail
//! - The control loop tying them together
//! - Health checks and observability

pub mod anomaly;
pub mod audit;
pub mod config;
pub mod control;
pub mod error;
pub mod gate;
pub mod health;
pub mod models;
pub mod observability;
pub mod remediation;
pub mod sampler;
pub mod window;

pub use audit::AuditStore;
pub use config::SentinelConfig;
pub use control::{ControlLoop, ControlLoopBuilder, CycleOutcome, LoopSnapshot};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use remediation::{RemediationExecutor, Trigger};
pub use sampler::MetricSampler;
pub use window::RollingWindow;
