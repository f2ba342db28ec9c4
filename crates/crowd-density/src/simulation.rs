//! Synthetic density patterns for demos and tests.
//!
//! The generator only produces [`DensityReading`]s; nothing about patterns
//! reaches the evaluation path.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crowd_proto::{DensityReading, MonitoredArea};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DensityError, Result};
use crate::source::ReadingSource;

/// The shape of a synthetic density series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum Pattern {
    /// A constant value.
    Steady {
        /// The density reported every tick.
        value: f64,
    },
    /// Uniformly random values in `[min, max]`.
    Random {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Linear movement from `from` to `to`, then holding at `to`.
    Trend {
        /// Starting density.
        from: f64,
        /// Target density.
        to: f64,
        /// Time to reach the target.
        #[serde(with = "duration_secs")]
        duration: Duration,
    },
    /// A rise from `base` to `peak` and back over `duration`.
    Spike {
        /// Density before and after the spike.
        base: f64,
        /// Density at the midpoint.
        peak: f64,
        /// Total length of the spike.
        #[serde(with = "duration_secs")]
        duration: Duration,
    },
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl Pattern {
    /// Checks that the pattern only produces non-negative values.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` for negative or inverted bounds.
    pub fn validate(&self) -> Result<()> {
        let values = match self {
            Self::Steady { value } => [*value, *value],
            Self::Random { min, max } => {
                if min > max {
                    return Err(DensityError::config(format!(
                        "random pattern min {min} exceeds max {max}"
                    )));
                }
                [*min, *max]
            }
            Self::Trend { from, to, .. } => [*from, *to],
            Self::Spike { base, peak, .. } => [*base, *peak],
        };
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(DensityError::config(
                "pattern values must be non-negative and finite",
            ));
        }
        Ok(())
    }

    /// Returns the deterministic value of the pattern after `elapsed`.
    ///
    /// `Random` patterns have no deterministic value and return their midpoint.
    #[must_use]
    pub fn value_at(&self, elapsed: Duration) -> f64 {
        match self {
            Self::Steady { value } => *value,
            Self::Random { min, max } => (min + max) / 2.0,
            Self::Trend { from, to, duration } => {
                let progress = progress(elapsed, *duration);
                from + (to - from) * progress
            }
            Self::Spike {
                base,
                peak,
                duration,
            } => {
                let progress = progress(elapsed, *duration);
                if progress >= 1.0 {
                    return *base;
                }
                // Triangle: up for the first half, down for the second.
                let shape = 1.0 - (2.0 * progress - 1.0).abs();
                base + (peak - base) * shape
            }
        }
    }
}

fn progress(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
struct ActivePattern {
    pattern: Pattern,
    started_at: DateTime<Utc>,
}

/// A [`ReadingSource`] that plays back synthetic patterns per area.
#[derive(Debug)]
pub struct PatternGenerator {
    patterns: RwLock<HashMap<String, ActivePattern>>,
    fallback: Pattern,
    rng: Mutex<StdRng>,
}

impl PatternGenerator {
    /// Creates a generator whose unconfigured areas report `fallback`.
    #[must_use]
    pub fn new(fallback: Pattern) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            fallback,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a generator with a fixed random seed.
    #[must_use]
    pub fn with_seed(fallback: Pattern, seed: u64) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            fallback,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Creates a generator with the gate / hall / exit ranges of the
    /// reference three-zone venue.
    #[must_use]
    pub fn three_zone_defaults() -> Self {
        let generator = Self::new(Pattern::Random {
            min: 0.0,
            max: 100.0,
        });
        let now = Utc::now();
        {
            let mut patterns = generator.patterns.write();
            let zones = [("gate", 50.0, 600.0), ("hall", 100.0, 800.0), ("exit", 30.0, 400.0)];
            for (area, min, max) in zones {
                patterns.insert(
                    area.to_string(),
                    ActivePattern {
                        pattern: Pattern::Random { min, max },
                        started_at: now,
                    },
                );
            }
        }
        generator
    }

    /// Assigns a pattern to an area, restarting its clock.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` if the pattern is invalid.
    pub fn set_pattern(&self, area_id: impl Into<String>, pattern: Pattern) -> Result<()> {
        self.set_pattern_at(area_id, pattern, Utc::now())
    }

    /// Assigns a pattern to an area with an explicit start time.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` if the pattern is invalid.
    pub fn set_pattern_at(
        &self,
        area_id: impl Into<String>,
        pattern: Pattern,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        pattern.validate()?;
        self.patterns
            .write()
            .insert(area_id.into(), ActivePattern { pattern, started_at });
        Ok(())
    }

    /// Trends an area toward `target` over `duration`, starting at `from`.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` if the values are invalid.
    pub fn trend_toward(
        &self,
        area_id: impl Into<String>,
        from: f64,
        target: f64,
        duration: Duration,
    ) -> Result<()> {
        self.set_pattern(
            area_id,
            Pattern::Trend {
                from,
                to: target,
                duration,
            },
        )
    }

    /// Plays a spike on an area.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` if the values are invalid.
    pub fn spike(
        &self,
        area_id: impl Into<String>,
        base: f64,
        peak: f64,
        duration: Duration,
    ) -> Result<()> {
        self.set_pattern(
            area_id,
            Pattern::Spike {
                base,
                peak,
                duration,
            },
        )
    }

    /// Removes an area's pattern so it falls back to the default.
    pub fn clear_pattern(&self, area_id: &str) -> bool {
        self.patterns.write().remove(area_id).is_some()
    }

    /// Returns the pattern currently assigned to an area.
    #[must_use]
    pub fn pattern(&self, area_id: &str) -> Option<Pattern> {
        self.patterns.read().get(area_id).map(|p| p.pattern.clone())
    }

    fn sample(&self, pattern: &Pattern, elapsed: Duration) -> f64 {
        match pattern {
            Pattern::Random { min, max } => {
                if (max - min).abs() < f64::EPSILON {
                    *min
                } else {
                    self.rng.lock().gen_range(*min..=*max)
                }
            }
            other => other.value_at(elapsed),
        }
    }
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::new(Pattern::Steady { value: 0.0 })
    }
}

impl ReadingSource for PatternGenerator {
    fn next_reading(&self, area: &MonitoredArea, now: DateTime<Utc>) -> Option<DensityReading> {
        let active = self.patterns.read().get(&area.id).cloned();
        let (pattern, started_at) = match active {
            Some(active) => (active.pattern, active.started_at),
            None => (self.fallback.clone(), now),
        };
        let elapsed = now
            .signed_duration_since(started_at)
            .to_std()
            .unwrap_or_default();
        let value = self.sample(&pattern, elapsed).max(0.0);
        Some(DensityReading::new(area.id.clone(), value, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn hall() -> MonitoredArea {
        MonitoredArea::new("hall", "Hall", 500)
    }

    mod pattern_tests {
        use super::*;

        #[test]
        fn trend_interpolates_and_holds() {
            let pattern = Pattern::Trend {
                from: 100.0,
                to: 300.0,
                duration: Duration::from_secs(10),
            };
            assert!((pattern.value_at(Duration::ZERO) - 100.0).abs() < 1e-9);
            assert!((pattern.value_at(Duration::from_secs(5)) - 200.0).abs() < 1e-9);
            assert!((pattern.value_at(Duration::from_secs(60)) - 300.0).abs() < 1e-9);
        }

        #[test]
        fn spike_peaks_midway() {
            let pattern = Pattern::Spike {
                base: 50.0,
                peak: 450.0,
                duration: Duration::from_secs(20),
            };
            assert!((pattern.value_at(Duration::ZERO) - 50.0).abs() < 1e-9);
            assert!((pattern.value_at(Duration::from_secs(10)) - 450.0).abs() < 1e-9);
            assert!((pattern.value_at(Duration::from_secs(30)) - 50.0).abs() < 1e-9);
        }

        #[test]
        fn zero_duration_trend_jumps_to_target() {
            let pattern = Pattern::Trend {
                from: 0.0,
                to: 10.0,
                duration: Duration::ZERO,
            };
            assert!((pattern.value_at(Duration::ZERO) - 10.0).abs() < 1e-9);
        }

        #[test]
        fn validate_rejects_inverted_range() {
            let pattern = Pattern::Random {
                min: 10.0,
                max: 1.0,
            };
            assert!(pattern.validate().is_err());
        }

        #[test]
        fn validate_rejects_negative() {
            assert!(Pattern::Steady { value: -1.0 }.validate().is_err());
        }

        #[test]
        fn pattern_serde_tagged() {
            let pattern = Pattern::Spike {
                base: 1.0,
                peak: 2.0,
                duration: Duration::from_secs(3),
            };
            let json = serde_json::to_string(&pattern).unwrap();
            assert!(json.contains("\"pattern\":\"spike\""));
            let back: Pattern = serde_json::from_str(&json).unwrap();
            assert_eq!(back, pattern);
        }
    }

    mod generator_tests {
        use super::*;

        #[test]
        fn fallback_for_unconfigured_area() {
            let generator = PatternGenerator::new(Pattern::Steady { value: 42.0 });
            let reading = generator.next_reading(&hall(), Utc::now()).unwrap();
            assert_eq!(reading.area_id, "hall");
            assert!((reading.density_value - 42.0).abs() < f64::EPSILON);
        }

        #[test]
        fn trend_follows_clock() {
            let generator = PatternGenerator::default();
            let start = Utc::now();
            generator
                .set_pattern_at(
                    "hall",
                    Pattern::Trend {
                        from: 0.0,
                        to: 500.0,
                        duration: Duration::from_secs(100),
                    },
                    start,
                )
                .unwrap();

            let reading = generator
                .next_reading(&hall(), start + ChronoDuration::seconds(50))
                .unwrap();
            assert!((reading.density_value - 250.0).abs() < 1e-6);
        }

        #[test]
        fn random_stays_in_range() {
            let generator = PatternGenerator::with_seed(
                Pattern::Random {
                    min: 100.0,
                    max: 200.0,
                },
                7,
            );
            for _ in 0..100 {
                let value = generator
                    .next_reading(&hall(), Utc::now())
                    .unwrap()
                    .density_value;
                assert!((100.0..=200.0).contains(&value));
            }
        }

        #[test]
        fn three_zone_defaults_cover_reference_areas() {
            let generator = PatternGenerator::three_zone_defaults();
            assert!(generator.pattern("gate").is_some());
            assert!(generator.pattern("hall").is_some());
            assert!(generator.pattern("exit").is_some());
        }

        #[test]
        fn clear_pattern_restores_fallback() {
            let generator = PatternGenerator::new(Pattern::Steady { value: 1.0 });
            generator.spike("hall", 0.0, 10.0, Duration::from_secs(1)).unwrap();
            assert!(generator.clear_pattern("hall"));
            assert!(generator.pattern("hall").is_none());
        }
    }
}
