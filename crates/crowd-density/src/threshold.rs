//! Threshold classification.
//!
//! [`ThresholdEvaluator::evaluate`] is a pure function of a reading, the
//! area's capacity and the area's previous level. It keeps no state, so it
//! is safe to call concurrently for different areas. No hysteresis is
//! applied here; flap suppression belongs to the alert engine.

use crowd_proto::{DensityReading, Evaluation, MonitoredArea, ThresholdLevel};
use serde::{Deserialize, Serialize};

use crate::error::{DensityError, Result};

/// Percentage boundaries between levels.
///
/// Each boundary is an inclusive lower bound: with the defaults, `60.0` is
/// already `Warning` and `100.0` is already `Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Lower bound of `Warning`, in percent of capacity.
    pub warning_percent: f64,
    /// Lower bound of `Critical`, in percent of capacity.
    pub critical_percent: f64,
    /// Lower bound of `Emergency`, in percent of capacity.
    pub emergency_percent: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            warning_percent: 60.0,
            critical_percent: 80.0,
            emergency_percent: 100.0,
        }
    }
}

impl ThresholdConfig {
    /// Checks that the boundaries are finite, positive and ascending.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` on invalid boundaries.
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            self.warning_percent,
            self.critical_percent,
            self.emergency_percent,
        ];
        if bounds.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(DensityError::config(
                "threshold boundaries must be positive finite percentages",
            ));
        }
        if !(self.warning_percent < self.critical_percent
            && self.critical_percent <= self.emergency_percent)
        {
            return Err(DensityError::config(
                "threshold boundaries must satisfy warning < critical <= emergency",
            ));
        }
        Ok(())
    }

    /// Classifies a percentage of capacity.
    #[must_use]
    pub fn level_for(&self, percentage: f64) -> ThresholdLevel {
        if percentage >= self.emergency_percent {
            ThresholdLevel::Emergency
        } else if percentage >= self.critical_percent {
            ThresholdLevel::Critical
        } else if percentage >= self.warning_percent {
            ThresholdLevel::Warning
        } else {
            ThresholdLevel::Normal
        }
    }

    /// Returns the lower-bound percentage of a level (`0.0` for `Normal`).
    #[must_use]
    pub const fn boundary(&self, level: ThresholdLevel) -> f64 {
        match level {
            ThresholdLevel::Normal => 0.0,
            ThresholdLevel::Warning => self.warning_percent,
            ThresholdLevel::Critical => self.critical_percent,
            ThresholdLevel::Emergency => self.emergency_percent,
        }
    }

    /// Returns the lower bound of a level expressed in people for an area.
    #[must_use]
    pub fn boundary_for_capacity(&self, level: ThresholdLevel, capacity: u32) -> f64 {
        f64::from(capacity) * self.boundary(level) / 100.0
    }
}

/// Stateless classifier of density readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
}

impl ThresholdEvaluator {
    /// Creates an evaluator with validated boundaries.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` if the boundaries are invalid.
    pub fn new(config: ThresholdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the boundaries in use.
    #[must_use]
    pub const fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Returns `density / capacity * 100`.
    ///
    /// Capacity is validated when areas are registered, so a zero capacity
    /// never reaches this point; it maps to an infinite percentage if it does.
    #[must_use]
    pub fn percentage(density_value: f64, capacity: u32) -> f64 {
        if capacity == 0 {
            return f64::INFINITY;
        }
        density_value * 100.0 / f64::from(capacity)
    }

    /// Classifies a reading against the area's capacity.
    #[must_use]
    pub fn evaluate(
        &self,
        reading: &DensityReading,
        area: &MonitoredArea,
        previous_level: ThresholdLevel,
    ) -> Evaluation {
        let percentage = Self::percentage(reading.density_value, area.capacity);
        let current_level = self.config.level_for(percentage);

        Evaluation::new(
            area.id.clone(),
            current_level,
            previous_level,
            reading.timestamp,
            reading.density_value,
            percentage,
        )
    }
}
