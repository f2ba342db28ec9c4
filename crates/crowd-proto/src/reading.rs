//! Density readings, threshold levels and evaluations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Default unit for density readings.
pub const DEFAULT_UNIT: &str = "people";

/// A single density observation for an area.
///
/// A newer reading always supersedes the previous one for the same area;
/// readings are never edited after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityReading {
    /// The area this reading belongs to.
    pub area_id: String,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Observed density, never negative.
    pub density_value: f64,
    /// Unit of `density_value`.
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

impl DensityReading {
    /// Creates a reading measured in people at the given instant.
    #[must_use]
    pub fn new(area_id: impl Into<String>, density_value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            area_id: area_id.into(),
            timestamp,
            density_value,
            unit: default_unit(),
        }
    }

    /// Creates a reading stamped with the current time.
    #[must_use]
    pub fn now(area_id: impl Into<String>, density_value: f64) -> Self {
        Self::new(area_id, density_value, Utc::now())
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Ordered risk classification of an area.
///
/// `Normal < Warning < Critical < Emergency`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    /// Below the warning boundary.
    #[default]
    Normal,
    /// Crowding that should be watched.
    Warning,
    /// Crowding that needs intervention.
    Critical,
    /// At or above capacity.
    Emergency,
}

impl ThresholdLevel {
    /// All levels in ascending order.
    pub const ALL: [Self; 4] = [Self::Normal, Self::Warning, Self::Critical, Self::Emergency];

    /// Returns the level as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }

    /// Returns a display label for dashboards.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
            Self::Emergency => "Emergency",
        }
    }

    /// Returns the hex colour dashboards use for this level.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Normal => "#90EE90",
            Self::Warning => "#FFD700",
            Self::Critical => "#FF6B6B",
            Self::Emergency => "#B00020",
        }
    }

    /// Returns true if this level raises alerts.
    #[must_use]
    pub const fn is_alerting(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for ThresholdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdLevel {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            "emergency" => Ok(Self::Emergency),
            _ => Err(ProtoError::UnknownVariant {
                kind: "threshold level",
                value: s.to_string(),
            }),
        }
    }
}

/// The classified state of an area after a reading.
///
/// One live evaluation exists per area; each new reading overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// The evaluated area.
    pub area_id: String,
    /// Level derived from the latest reading.
    pub current_level: ThresholdLevel,
    /// Level of the previous evaluation of the same area.
    pub previous_level: ThresholdLevel,
    /// True iff `current_level > previous_level`.
    pub is_escalation: bool,
    /// Timestamp of the reading that produced this evaluation.
    pub timestamp: DateTime<Utc>,
    /// The density value that was classified.
    pub density_value: f64,
    /// `density_value / capacity * 100`.
    pub percentage: f64,
}

impl Evaluation {
    /// Creates an evaluation, deriving the escalation flag from the levels.
    #[must_use]
    pub fn new(
        area_id: impl Into<String>,
        current_level: ThresholdLevel,
        previous_level: ThresholdLevel,
        timestamp: DateTime<Utc>,
        density_value: f64,
        percentage: f64,
    ) -> Self {
        Self {
            area_id: area_id.into(),
            current_level,
            previous_level,
            is_escalation: current_level > previous_level,
            timestamp,
            density_value,
            percentage,
        }
    }

    /// Returns true if the level dropped compared to the previous evaluation.
    #[must_use]
    pub fn is_deescalation(&self) -> bool {
        self.current_level < self.previous_level
    }
}
