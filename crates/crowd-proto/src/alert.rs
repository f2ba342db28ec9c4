//! Alert events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::area::MonitoredArea;
use crate::error::{ProtoError, Result};
use crate::reading::ThresholdLevel;

/// Unique identifier for an alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Create a new random `AlertId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an `AlertId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ProtoError::Validation(format!("invalid alert ID: {e}")))
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AlertId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What caused an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// An area's density crossed a threshold boundary upwards.
    ThresholdViolation,
    /// Emergency mode was activated; raised for the trigger area and each
    /// affected neighbour.
    EmergencyEscalation,
}

impl AlertType {
    /// Returns the alert type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ThresholdViolation => "threshold_violation",
            Self::EmergencyEscalation => "emergency_escalation",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to an alert for responders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    /// Where the area is.
    pub location: String,
    /// Actions responders should consider.
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    /// Estimated number of people affected.
    pub affected_count: u64,
    /// For emergency companion alerts, the area that triggered emergency mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_area_id: Option<String>,
}

/// An alert raised for an area.
///
/// Alert events are immutable once created: acknowledgments and resolution
/// are recorded alongside the event by the alert log rather than on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique id, one per triggering transition.
    pub id: AlertId,
    /// What caused the alert.
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Severity; never `Normal`.
    pub severity: ThresholdLevel,
    /// The area the alert concerns.
    pub area_id: String,
    /// Name of that area.
    pub area_name: String,
    /// Density that triggered the alert.
    pub density_value: f64,
    /// The boundary that was crossed, in the reading's unit.
    pub threshold: f64,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Responder context.
    pub metadata: AlertMetadata,
}

impl AlertEvent {
    /// Creates a new alert for `area`.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Validation` if `severity` is `Normal`.
    pub fn new(
        alert_type: AlertType,
        severity: ThresholdLevel,
        area: &MonitoredArea,
        density_value: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if !severity.is_alerting() {
            return Err(ProtoError::Validation(
                "alerts require warning severity or above".to_string(),
            ));
        }

        Ok(Self {
            id: AlertId::new(),
            alert_type,
            severity,
            area_id: area.id.clone(),
            area_name: area.name.clone(),
            density_value,
            threshold,
            timestamp,
            metadata: AlertMetadata {
                location: area.location.clone(),
                suggested_actions: Vec::new(),
                affected_count: density_value.max(0.0).round() as u64,
                trigger_area_id: None,
            },
        })
    }

    /// Sets the suggested actions.
    #[must_use]
    pub fn with_suggested_actions(mut self, actions: Vec<String>) -> Self {
        self.metadata.suggested_actions = actions;
        self
    }

    /// Records the emergency trigger area.
    #[must_use]
    pub fn with_trigger_area(mut self, area_id: impl Into<String>) -> Self {
        self.metadata.trigger_area_id = Some(area_id.into());
        self
    }

    /// Returns true if this is an emergency-severity alert.
    #[must_use]
    pub fn is_emergency(&self) -> bool {
        self.severity == ThresholdLevel::Emergency
    }
}
