//! Alert history queries.
//!
//! Empty list fields mean "no restriction" for that dimension, the same
//! convention admin notification filters use.

use chrono::{DateTime, Utc};
use crowd_proto::{AlertType, ThresholdLevel};
use serde::{Deserialize, Serialize};

use crate::entry::AlertLogEntry;

/// Restricts history by acknowledgment state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcknowledgmentStatus {
    /// Every entry.
    #[default]
    All,
    /// Entries with at least one acknowledgment.
    Acknowledged,
    /// Entries nobody has acknowledged yet.
    Unacknowledged,
}

impl AcknowledgmentStatus {
    /// Returns true if the entry passes this restriction.
    #[must_use]
    pub fn matches(self, entry: &AlertLogEntry) -> bool {
        match self {
            Self::All => true,
            Self::Acknowledged => entry.is_acknowledged(),
            Self::Unacknowledged => !entry.is_acknowledged(),
        }
    }
}

/// Result ordering by alert timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Most recent first.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
}

/// Filter criteria for alert history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertHistoryFilter {
    /// Areas to include (empty means all).
    pub area_ids: Vec<String>,
    /// Severities to include (empty means all).
    pub severities: Vec<ThresholdLevel>,
    /// Alert types to include (empty means all).
    pub alert_types: Vec<AlertType>,
    /// Acknowledgment restriction.
    pub acknowledgment_status: AcknowledgmentStatus,
    /// Earliest alert timestamp, inclusive.
    pub start_time: Option<DateTime<Utc>>,
    /// Latest alert timestamp, inclusive.
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
    /// Result ordering.
    pub sort: SortOrder,
}

impl AlertHistoryFilter {
    /// Creates an unrestricted filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given areas.
    #[must_use]
    pub fn with_areas<S: Into<String>>(mut self, areas: impl IntoIterator<Item = S>) -> Self {
        self.area_ids = areas.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts to the given severities.
    #[must_use]
    pub fn with_severities(mut self, severities: impl IntoIterator<Item = ThresholdLevel>) -> Self {
        self.severities = severities.into_iter().collect();
        self
    }

    /// Restricts to the given alert types.
    #[must_use]
    pub fn with_alert_types(mut self, types: impl IntoIterator<Item = AlertType>) -> Self {
        self.alert_types = types.into_iter().collect();
        self
    }

    /// Restricts by acknowledgment state.
    #[must_use]
    pub const fn with_acknowledgment_status(mut self, status: AcknowledgmentStatus) -> Self {
        self.acknowledgment_status = status;
        self
    }

    /// Restricts to alerts raised within `[start, end]`.
    #[must_use]
    pub const fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns results oldest first.
    #[must_use]
    pub const fn oldest_first(mut self) -> Self {
        self.sort = SortOrder::OldestFirst;
        self
    }

    /// Returns true if the entry passes every restriction.
    #[must_use]
    pub fn matches(&self, entry: &AlertLogEntry) -> bool {
        let event = &entry.alert_event;

        if !self.area_ids.is_empty() && !self.area_ids.contains(&event.area_id) {
            return false;
        }
        if !self.severities.is_empty() && !self.severities.contains(&event.severity) {
            return false;
        }
        if !self.alert_types.is_empty() && !self.alert_types.contains(&event.alert_type) {
            return false;
        }
        if !self.acknowledgment_status.matches(entry) {
            return false;
        }
        if self.start_time.is_some_and(|start| event.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| event.timestamp > end) {
            return false;
        }
        true
    }

    /// Filters, sorts and truncates a set of entries.
    ///
    /// Ties on timestamp are broken by log sequence so results are stable.
    #[must_use]
    pub fn apply<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a AlertLogEntry>,
    ) -> Vec<AlertLogEntry> {
        let mut matched: Vec<AlertLogEntry> = entries
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            a.alert_event
                .timestamp
                .cmp(&b.alert_event.timestamp)
                .then(a.sequence.cmp(&b.sequence))
        });
        if self.sort == SortOrder::NewestFirst {
            matched.reverse();
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}
