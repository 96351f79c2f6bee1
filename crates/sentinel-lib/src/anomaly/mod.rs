//! Anomaly detection for host CPU load
//!
//! This module provides:
//! - A one-dimensional isolation forest (unsupervised novelty model)
//! - The detector that turns a rolling window into a health verdict

mod detector;
mod isolation_forest;

pub use detector::AnomalyDetector;
pub use isolation_forest::{IsolationForest, IsolationForestParams, Label};
