//! Venue-wide emergency mode state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How emergency mode was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyTrigger {
    /// An operator activated it.
    Manual,
    /// An area reached emergency density.
    Automatic,
}

impl fmt::Display for EmergencyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Automatic => f.write_str("automatic"),
        }
    }
}

/// Snapshot of the emergency-mode singleton.
///
/// When inactive, every optional field is `None` and `affected_areas` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyMode {
    /// Whether emergency mode is on.
    pub active: bool,
    /// When it was activated.
    pub activated_at: Option<DateTime<Utc>>,
    /// How it was activated.
    pub activated_by: Option<EmergencyTrigger>,
    /// The admin responsible for activation.
    pub admin_id: Option<String>,
    /// The area that triggered activation.
    pub trigger_area_id: Option<String>,
    /// The trigger area followed by its direct neighbours.
    pub affected_areas: Vec<String>,
}

impl EmergencyMode {
    /// The inactive state.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Creates an active state.
    #[must_use]
    pub fn activated(
        trigger_area_id: impl Into<String>,
        trigger: EmergencyTrigger,
        admin_id: impl Into<String>,
        affected_areas: Vec<String>,
    ) -> Self {
        Self {
            active: true,
            activated_at: Some(Utc::now()),
            activated_by: Some(trigger),
            admin_id: Some(admin_id.into()),
            trigger_area_id: Some(trigger_area_id.into()),
            affected_areas,
        }
    }

    /// Returns true if `area_id` is inside the affected set.
    #[must_use]
    pub fn affects(&self, area_id: &str) -> bool {
        self.active && self.affected_areas.iter().any(|a| a == area_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_is_empty() {
        let mode = EmergencyMode::inactive();
        assert!(!mode.active);
        assert!(mode.trigger_area_id.is_none());
        assert!(!mode.affects("gate"));
    }

    #[test]
    fn activated_tracks_affected_set() {
        let mode = EmergencyMode::activated(
            "hall",
            EmergencyTrigger::Manual,
            "admin-1",
            vec!["hall".to_string(), "gate".to_string()],
        );
        assert!(mode.active);
        assert!(mode.affects("gate"));
        assert!(!mode.affects("exit"));
        assert_eq!(mode.activated_by, Some(EmergencyTrigger::Manual));
    }
}
