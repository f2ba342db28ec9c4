//! Venue-wide emergency mode.
//!
//! A single [`EmergencyMode`] value guarded by one mutex. Every transition
//! is written to the audit trail before the live state changes, so a
//! deactivated emergency survives only as an
//! [`EmergencyRecord`](crowd_audit::EmergencyRecord).

use std::sync::Arc;

use crowd_audit::{AlertLogger, EmergencyRecord};
use crowd_density::AreaGraph;
use crowd_proto::{AccessToken, EmergencyMode, EmergencyTrigger, Permission};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{AlertError, Result};

/// Owns the emergency-mode singleton.
#[derive(Debug)]
pub struct EmergencyModeManager {
    graph: Arc<AreaGraph>,
    state: Arc<Mutex<EmergencyMode>>,
    logger: AlertLogger,
}

impl Clone for EmergencyModeManager {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            state: Arc::clone(&self.state),
            logger: self.logger.clone(),
        }
    }
}

fn authorize(token: Option<&AccessToken>) -> Result<()> {
    match token {
        Some(token) if !token.has(Permission::ActivateEmergency) => {
            warn!(admin_id = %token.admin_id, "emergency mode change denied");
            Err(AlertError::denied(&token.admin_id, Permission::ActivateEmergency))
        }
        _ => Ok(()),
    }
}

impl EmergencyModeManager {
    /// Creates a manager in the inactive state.
    #[must_use]
    pub fn new(graph: Arc<AreaGraph>, logger: AlertLogger) -> Self {
        Self {
            graph,
            state: Arc::new(Mutex::new(EmergencyMode::inactive())),
            logger,
        }
    }

    /// Activates emergency mode for `trigger_area_id` and its neighbours.
    ///
    /// A token, when given, must carry `ActivateEmergency`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for an insufficient token,
    /// `EmergencyAlreadyActive` if an emergency is running, `Density` for
    /// an unknown area, or `Audit` if the transition cannot be recorded.
    pub fn activate(
        &self,
        trigger_area_id: &str,
        trigger: EmergencyTrigger,
        admin_id: &str,
        token: Option<&AccessToken>,
    ) -> Result<EmergencyMode> {
        authorize(token)?;
        let affected = self.graph.affected_areas(trigger_area_id)?;

        let mut state = self.state.lock();
        if state.active {
            return Err(AlertError::EmergencyAlreadyActive {
                trigger_area_id: state.trigger_area_id.clone().unwrap_or_default(),
            });
        }

        let mode = EmergencyMode::activated(trigger_area_id, trigger, admin_id, affected);
        self.logger.log_emergency(EmergencyRecord::activated(mode.clone()))?;
        state.clone_from(&mode);

        info!(
            trigger_area_id,
            %trigger,
            admin_id,
            affected_areas = ?mode.affected_areas,
            "emergency mode activated"
        );
        Ok(mode)
    }

    /// Deactivates emergency mode and returns the state that was cleared.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for an insufficient token,
    /// `EmergencyNotActive` if no emergency is running, or `Audit` if the
    /// transition cannot be recorded.
    pub fn deactivate(&self, admin_id: &str, token: Option<&AccessToken>) -> Result<EmergencyMode> {
        authorize(token)?;

        let mut state = self.state.lock();
        if !state.active {
            return Err(AlertError::EmergencyNotActive);
        }

        self.logger
            .log_emergency(EmergencyRecord::deactivated(admin_id, state.clone()))?;
        let previous = std::mem::take(&mut *state);

        info!(
            admin_id,
            trigger_area_id = previous.trigger_area_id.as_deref().unwrap_or(""),
            "emergency mode deactivated"
        );
        Ok(previous)
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn status(&self) -> EmergencyMode {
        self.state.lock().clone()
    }

    /// Returns true while an emergency is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Returns the running emergency, if any.
    #[must_use]
    pub fn current(&self) -> Option<EmergencyMode> {
        let state = self.state.lock();
        state.active.then(|| state.clone())
    }
}
