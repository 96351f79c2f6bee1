//! Synthetic low-load readings

use super::{async_trait, TelemetrySource};
use crate::error::TelemetryError;
use rand::Rng;

/// Uniform baseline noise in `[low, high]`
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    low: f64,
    high: f64,
}

impl SyntheticSource {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low: low.min(high),
            high: low.max(high),
        }
    }

    /// Draw one reading, rounded to two decimals
    pub fn reading(&self) -> f64 {
        let value = if self.high > self.low {
            rand::thread_rng().gen_range(self.low..=self.high)
        } else {
            self.low
        };
        (value * 100.0).round() / 100.0
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(5.0, 12.0)
    }
}

#[async_trait]
impl TelemetrySource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn current_load(&self) -> Result<f64, TelemetryError> {
        Ok(self.reading())
    }
}
