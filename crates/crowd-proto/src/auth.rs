//! Caller capabilities for operator actions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An operator capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Activate or deactivate emergency mode.
    ActivateEmergency,
    /// Acknowledge alerts.
    AcknowledgeAlerts,
    /// Resolve alerts.
    ResolveAlerts,
    /// Change notification preferences.
    ConfigureNotifications,
}

impl Permission {
    /// Returns the permission as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ActivateEmergency => "activate_emergency",
            Self::AcknowledgeAlerts => "acknowledge_alerts",
            Self::ResolveAlerts => "resolve_alerts",
            Self::ConfigureNotifications => "configure_notifications",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verified identity and permissions of a caller.
///
/// Tokens are minted by the authentication layer; this crate only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The admin acting.
    pub admin_id: String,
    /// What the admin may do.
    pub permissions: BTreeSet<Permission>,
}

impl AccessToken {
    /// Creates a token with the given permissions.
    #[must_use]
    pub fn new(
        admin_id: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            admin_id: admin_id.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Creates a token holding every permission.
    #[must_use]
    pub fn full_access(admin_id: impl Into<String>) -> Self {
        Self::new(
            admin_id,
            [
                Permission::ActivateEmergency,
                Permission::AcknowledgeAlerts,
                Permission::ResolveAlerts,
                Permission::ConfigureNotifications,
            ],
        )
    }

    /// Returns true if the token grants `permission`.
    #[must_use]
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}
