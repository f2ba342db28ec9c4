//! Administrator notification preferences and delivery outcomes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertId;
use crate::error::{ProtoError, Result};
use crate::reading::ThresholdLevel;

/// A delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Mobile push notification.
    Push,
    /// SMS text message.
    Sms,
    /// Email.
    Email,
}

impl ChannelKind {
    /// All channels.
    pub const ALL: [Self; 3] = [Self::Push, Self::Sms, Self::Email];

    /// Returns the channel as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ProtoError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            _ => Err(ProtoError::UnknownVariant {
                kind: "channel",
                value: s.to_string(),
            }),
        }
    }
}

/// Per-administrator notification preferences.
///
/// An empty filter set means "no restriction" for that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNotificationConfig {
    /// The administrator these preferences belong to.
    pub admin_id: String,
    /// Channels to deliver on; never empty.
    pub channels: BTreeSet<ChannelKind>,
    /// Severities the admin wants (empty = all).
    #[serde(default)]
    pub severity_filter: BTreeSet<ThresholdLevel>,
    /// Areas the admin wants (empty = all).
    #[serde(default)]
    pub area_filter: BTreeSet<String>,
}

impl AdminNotificationConfig {
    /// Creates a config with no filters.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Validation` if the admin id or channel set is empty.
    pub fn new(
        admin_id: impl Into<String>,
        channels: impl IntoIterator<Item = ChannelKind>,
    ) -> Result<Self> {
        let config = Self {
            admin_id: admin_id.into(),
            channels: channels.into_iter().collect(),
            severity_filter: BTreeSet::new(),
            area_filter: BTreeSet::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Restricts the severities this admin receives.
    #[must_use]
    pub fn with_severities(mut self, severities: impl IntoIterator<Item = ThresholdLevel>) -> Self {
        self.severity_filter = severities.into_iter().collect();
        self
    }

    /// Restricts the areas this admin receives.
    #[must_use]
    pub fn with_areas<S: Into<String>>(mut self, areas: impl IntoIterator<Item = S>) -> Self {
        self.area_filter = areas.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the invariants of a config.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Validation` if the admin id or channel set is empty.
    pub fn validate(&self) -> Result<()> {
        if self.admin_id.trim().is_empty() {
            return Err(ProtoError::Validation("admin id cannot be empty".to_string()));
        }
        if self.channels.is_empty() {
            return Err(ProtoError::Validation(format!(
                "admin '{}' must have at least one channel",
                self.admin_id
            )));
        }
        Ok(())
    }

    /// Returns true if the severity and area filters both admit the alert.
    #[must_use]
    pub fn matches_filters(&self, severity: ThresholdLevel, area_id: &str) -> bool {
        let severity_ok =
            self.severity_filter.is_empty() || self.severity_filter.contains(&severity);
        let area_ok = self.area_filter.is_empty() || self.area_filter.contains(area_id);
        severity_ok && area_ok
    }
}

/// The outcome of one delivery attempt to one admin on one channel.
///
/// Retried attempts produce new results; the most recent result for an
/// `(alert, admin, channel)` tuple is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    /// The alert being delivered.
    pub alert_id: AlertId,
    /// The channel used.
    pub channel: ChannelKind,
    /// The recipient.
    pub admin_id: String,
    /// Whether the transport reported success.
    pub delivered: bool,
    /// How long the attempt took, in milliseconds.
    pub delivery_time_ms: u64,
    /// Failure reason when `delivered` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the attempt finished.
    pub attempted_at: DateTime<Utc>,
    /// 1 for the initial fan-out, incremented by each retry.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

const fn first_attempt() -> u32 {
    1
}

impl NotificationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        alert_id: AlertId,
        admin_id: impl Into<String>,
        channel: ChannelKind,
        delivery_time_ms: u64,
    ) -> Self {
        Self {
            alert_id,
            channel,
            admin_id: admin_id.into(),
            delivered: true,
            delivery_time_ms,
            error: None,
            attempted_at: Utc::now(),
            attempt: first_attempt(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        alert_id: AlertId,
        admin_id: impl Into<String>,
        channel: ChannelKind,
        delivery_time_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            alert_id,
            channel,
            admin_id: admin_id.into(),
            delivered: false,
            delivery_time_ms,
            error: Some(error.into()),
            attempted_at: Utc::now(),
            attempt: first_attempt(),
        }
    }

    /// Sets the attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn config_requires_channels() {
        let result = AdminNotificationConfig::new("admin-1", []);
        assert!(result.is_err());
    }

    #[test]
    fn config_requires_admin_id() {
        let result = AdminNotificationConfig::new("  ", [ChannelKind::Sms]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_filters_match_everything() {
        let config = AdminNotificationConfig::new("admin-1", [ChannelKind::Push]).unwrap();
        assert!(config.matches_filters(ThresholdLevel::Warning, "gate"));
        assert!(config.matches_filters(ThresholdLevel::Critical, "hall"));
    }

    #[test_case(ThresholdLevel::Critical, "gate", true ; "severity and area match")]
    #[test_case(ThresholdLevel::Warning, "gate", false ; "severity excluded")]
    #[test_case(ThresholdLevel::Critical, "exit", false ; "area excluded")]
    fn filters_apply(severity: ThresholdLevel, area: &str, expected: bool) {
        let config = AdminNotificationConfig::new("admin-1", [ChannelKind::Email])
            .unwrap()
            .with_severities([ThresholdLevel::Critical])
            .with_areas(["gate"]);
        assert_eq!(config.matches_filters(severity, area), expected);
    }

    #[test]
    fn channel_parse() {
        assert_eq!("SMS".parse::<ChannelKind>().unwrap(), ChannelKind::Sms);
        assert!("fax".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn failure_result_carries_error() {
        let result =
            NotificationResult::failure(AlertId::new(), "admin-1", ChannelKind::Sms, 12, "timeout")
                .with_attempt(2);
        assert!(!result.delivered);
        assert_eq!(result.error.as_deref(), Some("timeout"));
        assert_eq!(result.attempt, 2);
    }
}
