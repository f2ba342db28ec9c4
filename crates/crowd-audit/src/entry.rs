//! Audit trail records.

use std::fmt;

use chrono::{DateTime, Utc};
use crowd_proto::{AlertEvent, AlertId, EmergencyMode, NotificationResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One admin's acknowledgment of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// Who acknowledged.
    pub admin_id: String,
    /// When.
    pub timestamp: DateTime<Utc>,
}

impl Acknowledgment {
    /// Creates an acknowledgment stamped now.
    #[must_use]
    pub fn now(admin_id: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// How an alert was closed. Set at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Admin id, or `system` for automatic resolution.
    pub resolved_by: String,
    /// When.
    pub resolved_at: DateTime<Utc>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Resolution {
    /// Creates a resolution stamped now.
    #[must_use]
    pub fn now(resolved_by: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            resolved_by: resolved_by.into(),
            resolved_at: Utc::now(),
            notes,
        }
    }
}

/// Delivery outcomes attached to an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSummary {
    /// Every admin delivery attempt, in the order recorded.
    #[serde(default)]
    pub admin_notifications: Vec<NotificationResult>,
    /// People in the area when the alert was raised.
    #[serde(default)]
    pub pilgrim_count: u64,
}

impl NotificationSummary {
    /// Number of attempts that reached their recipient.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.admin_notifications.iter().filter(|r| r.delivered).count()
    }

    /// Number of failed attempts.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.admin_notifications.len() - self.delivered_count()
    }
}

/// Everything known about one alert.
///
/// The wrapped [`AlertEvent`] never changes. Acknowledgments are only
/// appended and the resolution is set once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// Creation order across the whole log.
    pub sequence: u64,
    /// The alert itself.
    pub alert_event: AlertEvent,
    /// Acknowledgments in the order received.
    #[serde(default)]
    pub acknowledgments: Vec<Acknowledgment>,
    /// Resolution, once closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Delivery outcomes.
    #[serde(default)]
    pub notification_results: NotificationSummary,
}

impl AlertLogEntry {
    /// Creates an unsequenced entry for an alert.
    #[must_use]
    pub fn new(alert_event: AlertEvent, admin_notifications: Vec<NotificationResult>) -> Self {
        let pilgrim_count = alert_event.metadata.affected_count;
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            alert_event,
            acknowledgments: Vec::new(),
            resolution: None,
            notification_results: NotificationSummary {
                admin_notifications,
                pilgrim_count,
            },
        }
    }

    /// Returns the alert id.
    #[must_use]
    pub const fn alert_id(&self) -> AlertId {
        self.alert_event.id
    }

    /// Returns true once anyone has acknowledged.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        !self.acknowledgments.is_empty()
    }

    /// Returns true once resolved.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// What happened to emergency mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyAction {
    /// Emergency mode was switched on.
    Activated,
    /// Emergency mode was switched off.
    Deactivated,
}

impl fmt::Display for EmergencyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated => f.write_str("activated"),
            Self::Deactivated => f.write_str("deactivated"),
        }
    }
}

/// Audit record of an emergency-mode transition.
///
/// `mode` is the state that was entered on activation, or the state that was
/// cleared on deactivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Order among emergency records.
    pub sequence: u64,
    /// The transition.
    pub action: EmergencyAction,
    /// The admin who performed it.
    pub admin_id: String,
    /// When.
    pub timestamp: DateTime<Utc>,
    /// The emergency state involved.
    pub mode: EmergencyMode,
}

impl EmergencyRecord {
    /// Records an activation.
    #[must_use]
    pub fn activated(mode: EmergencyMode) -> Self {
        let admin_id = mode.admin_id.clone().unwrap_or_default();
        Self::new(EmergencyAction::Activated, admin_id, mode)
    }

    /// Records a deactivation of `previous` by `admin_id`.
    #[must_use]
    pub fn deactivated(admin_id: impl Into<String>, previous: EmergencyMode) -> Self {
        Self::new(EmergencyAction::Deactivated, admin_id.into(), previous)
    }

    fn new(action: EmergencyAction, admin_id: String, mode: EmergencyMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            action,
            admin_id,
            timestamp: Utc::now(),
            mode,
        }
    }
}
