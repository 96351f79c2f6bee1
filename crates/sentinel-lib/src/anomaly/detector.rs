//! CPU-load anomaly detector
//!
//! Evaluates the newest sample of a window against an isolation forest fit
//! from scratch over the whole window. A learning gate suppresses verdicts
//! until enough history exists, and a hard ceiling forces a critical verdict
//! regardless of what the model says.

use super::isolation_forest::{IsolationForest, IsolationForestParams, Label, DEFAULT_MAX_SAMPLES};
use crate::config::DetectorConfig;
use crate::models::HealthVerdict;
use tracing::debug;

/// Stateless detector; every call to `evaluate` rebuilds the model
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Classify the last value of `history`
    pub fn evaluate(&self, history: &[f64]) -> HealthVerdict {
        let Some(&current) = history.last() else {
            return HealthVerdict::learning(None);
        };

        if history.len() < self.config.min_samples {
            return HealthVerdict::learning(Some(current));
        }

        if current > self.config.critical_ceiling_percent {
            return HealthVerdict::critical(current);
        }

        if is_degenerate(history) {
            debug!(samples = history.len(), "Zero-variance window, skipping model fit");
            return HealthVerdict::healthy(0.0, current);
        }

        let Some(forest) = IsolationForest::fit(history, &self.forest_params()) else {
            debug!(samples = history.len(), "Window not usable for model fit");
            return HealthVerdict::healthy(0.0, current);
        };

        let margin = forest.decision_function(current);
        let label = if margin < 0.0 {
            Label::Outlier
        } else {
            Label::Inlier
        };
        let confidence = self.confidence(label, margin);

        match label {
            Label::Outlier => HealthVerdict::anomaly(confidence, current),
            Label::Inlier => HealthVerdict::healthy(confidence, current),
        }
    }

    /// Map a decision margin to a 0-100 confidence.
    ///
    /// Outliers grow with distance past the boundary; inliers grow with
    /// distance inside it. Both saturate at 100.
    pub fn confidence(&self, label: Label, margin: f64) -> f64 {
        let raw = match label {
            Label::Outlier => margin.abs() * self.config.outlier_gain + self.config.outlier_base,
            Label::Inlier => (margin + self.config.inlier_shift) * self.config.inlier_gain,
        };
        round2(raw.clamp(0.0, 100.0))
    }

    fn forest_params(&self) -> IsolationForestParams {
        IsolationForestParams {
            n_estimators: self.config.n_estimators,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: self.config.contamination,
            seed: self.config.random_seed,
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

fn is_degenerate(values: &[f64]) -> bool {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    !(max - min > f64::EPSILON)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthStatus;

    fn baseline(len: usize) -> Vec<f64> {
        [7.0, 8.0, 9.0, 8.0].iter().copied().cycle().take(len).collect()
    }

    #[test]
    fn test_learning_gate_ignores_content() {
        let detector = AnomalyDetector::default();
        for history in [vec![], vec![99.0; 14], baseline(10), vec![1.0, 100.0, 50.0]] {
            let verdict = detector.evaluate(&history);
            assert!(!verdict.is_anomaly);
            assert_eq!(verdict.confidence, 0.0);
            assert_eq!(verdict.status, HealthStatus::Learning);
        }
    }

    #[test]
    fn test_identical_values_are_healthy() {
        let detector = AnomalyDetector::default();
        let history = vec![42.0; 21];
        let verdict = detector.evaluate(&history);
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.status, HealthStatus::Healthy);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn test_override_fires_above_ceiling_even_when_model_agrees_with_history() {
        let detector = AnomalyDetector::default();
        // Cluster around 90 so the model alone would call 91 ordinary
        let mut history: Vec<f64> = (0..20).map(|i| 89.5 + (i % 3) as f64 * 0.5).collect();
        history.push(91.0);

        let verdict = detector.evaluate(&history);
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.confidence, 100.0);
        assert_eq!(verdict.status, HealthStatus::Critical);
    }

    #[test]
    fn test_override_applies_to_constant_high_window() {
        let detector = AnomalyDetector::default();
        let verdict = detector.evaluate(&vec![95.0; 15]);
        assert_eq!(verdict.status, HealthStatus::Critical);
    }

    #[test]
    fn test_override_waits_for_learning_gate() {
        let detector = AnomalyDetector::default();
        let verdict = detector.evaluate(&vec![99.0; 5]);
        assert_eq!(verdict.status, HealthStatus::Learning);
    }

    #[test]
    fn test_value_at_ceiling_is_not_critical() {
        let detector = AnomalyDetector::default();
        let mut history = baseline(20);
        history.push(90.0);
        let verdict = detector.evaluate(&history);
        assert_ne!(verdict.status, HealthStatus::Critical);
    }

    #[test]
    fn test_spike_below_ceiling_is_anomaly() {
        let detector = AnomalyDetector::default();
        let mut history = baseline(29);
        history.push(60.0);

        let verdict = detector.evaluate(&history);
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.status, HealthStatus::Anomaly);
        assert!(verdict.confidence >= 50.0);
        assert!(verdict.confidence <= 100.0);
        assert_eq!(verdict.current_load, Some(60.0));
    }

    #[test]
    fn test_typical_value_is_healthy() {
        let detector = AnomalyDetector::default();
        let mut history = baseline(29);
        history.push(8.0);

        let verdict = detector.evaluate(&history);
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let detector = AnomalyDetector::default();
        let mut history = baseline(25);
        history.push(35.0);
        assert_eq!(detector.evaluate(&history), detector.evaluate(&history));
    }

    #[test]
    fn test_outlier_confidence_is_monotone_and_clamped() {
        let detector = AnomalyDetector::default();
        let near = detector.confidence(Label::Outlier, -0.01);
        let far = detector.confidence(Label::Outlier, -0.05);
        let extreme = detector.confidence(Label::Outlier, -5.0);
        assert!(near < far);
        assert_eq!(extreme, 100.0);
        assert_eq!(near, 55.0);
    }

    #[test]
    fn test_inlier_confidence_is_monotone_and_clamped() {
        let detector = AnomalyDetector::default();
        let low = detector.confidence(Label::Inlier, 0.0);
        let high = detector.confidence(Label::Inlier, 0.2);
        assert!(low < high);
        assert_eq!(low, 50.0);
        assert_eq!(detector.confidence(Label::Inlier, 3.0), 100.0);
        assert_eq!(detector.confidence(Label::Inlier, -3.0), 0.0);
    }
}
