//! Bounded FIFO history of recent CPU samples

use crate::models::Sample;
use std::collections::VecDeque;

/// Default number of samples retained
pub const DEFAULT_CAPACITY: usize = 30;

/// Fixed-capacity window; the oldest sample is evicted on overflow
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl RollingWindow {
    /// Create an empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: Sample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Sample values in chronological order
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Owned copy for observers
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleOrigin;

    fn sample(value: f64) -> Sample {
        Sample::new(value, SampleOrigin::Telemetry)
    }

    #[test]
    fn test_push_below_capacity_keeps_everything() {
        let mut window = RollingWindow::new(5);
        for v in [1.0, 2.0, 3.0] {
            window.push(sample(v));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        let capacity = 30;
        let extra = 7;
        let mut window = RollingWindow::new(capacity);

        for i in 0..(capacity + extra) {
            window.push(sample(i as f64));
        }

        assert_eq!(window.len(), capacity);
        let expected: Vec<f64> = (extra..capacity + extra).map(|i| i as f64).collect();
        assert_eq!(window.values(), expected);
        assert_eq!(window.latest().map(|s| s.value), Some((capacity + extra - 1) as f64));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut window = RollingWindow::new(4);
        for _ in 0..4 {
            window.push(sample(8.0));
        }
        assert_eq!(window.values(), vec![8.0; 4]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut window = RollingWindow::new(0);
        window.push(sample(1.0));
        window.push(sample(2.0));
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.values(), vec![2.0]);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut window = RollingWindow::new(3);
        window.push(sample(1.0));
        let snapshot = window.snapshot();
        window.push(sample(2.0));
        window.clear();

        assert_eq!(snapshot.len(), 1);
        assert!(window.is_empty());
    }
}
