//! Per-area alert state machine.
//!
//! Each area is either quiet or has one open alert. Only upward level
//! transitions raise alerts; a higher level supersedes the open alert and
//! a return to `Normal` auto-resolves it. Steady readings and
//! de-escalations inside the alerting band are suppressed.
//!
//! Notifications run on spawned tasks so evaluation never waits on a
//! channel transport. Failed deliveries are handed to the [`RetryQueue`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use crowd_audit::{AlertLogEntry, AlertLogger, AuditError};
use crowd_density::{AreaGraph, DensityError, ThresholdConfig};
use crowd_proto::{
    AccessToken, AlertEvent, AlertId, AlertType, AreaType, EmergencyMode, EmergencyTrigger,
    Evaluation, Permission, ThresholdLevel,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::emergency::EmergencyModeManager;
use crate::error::{AlertError, Result};
use crate::notifier::AdminNotifier;
use crate::retry::RetryQueue;

/// Actor recorded for resolutions the engine makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Resolution notes when density returns to normal.
pub const AUTO_RESOLVE_NOTES: &str = "density returned to normal";

/// Resolution notes for emergency alerts closed by deactivation.
pub const EMERGENCY_DEACTIVATED_NOTES: &str = "emergency mode deactivated";

/// Engine behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Activate emergency mode automatically when an area reaches `Emergency`.
    pub auto_emergency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_emergency: true,
        }
    }
}

/// What the engine did with an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    /// A new alert was opened, possibly superseding a lower one.
    Raised {
        /// The new alert.
        alert: AlertEvent,
        /// The open alert it replaced, now resolved.
        superseded: Option<AlertId>,
    },
    /// The area returned to normal and its open alert was resolved.
    AutoResolved {
        /// The resolved alert.
        alert_id: AlertId,
    },
    /// The area is alerting but did not escalate.
    Suppressed {
        /// The unchanged alerting level.
        level: ThresholdLevel,
    },
    /// Normal level with nothing open.
    Quiet,
}

impl EngineOutcome {
    /// Returns the raised alert, if any.
    #[must_use]
    pub const fn raised(&self) -> Option<&AlertEvent> {
        match self {
            Self::Raised { alert, .. } => Some(alert),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct AreaAlertState {
    open: Option<AlertEvent>,
    last_density: f64,
}

/// Turns evaluations into alerts, notifications and audit records.
///
/// Cloning is cheap; clones share all state.
#[derive(Debug)]
pub struct AlertEngine {
    graph: Arc<AreaGraph>,
    thresholds: ThresholdConfig,
    config: EngineConfig,
    notifier: AdminNotifier,
    logger: AlertLogger,
    emergency: EmergencyModeManager,
    retry: Arc<RetryQueue>,
    areas: Arc<HashMap<String, Mutex<AreaAlertState>>>,
    emergency_alerts: Arc<Mutex<Vec<AlertId>>>,
    dispatch: TaskTracker,
}

impl Clone for AlertEngine {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            thresholds: self.thresholds,
            config: self.config,
            notifier: self.notifier.clone(),
            logger: self.logger.clone(),
            emergency: self.emergency.clone(),
            retry: Arc::clone(&self.retry),
            areas: Arc::clone(&self.areas),
            emergency_alerts: Arc::clone(&self.emergency_alerts),
            dispatch: self.dispatch.clone(),
        }
    }
}

fn require(token: &AccessToken, permission: Permission) -> Result<()> {
    if token.has(permission) {
        Ok(())
    } else {
        warn!(admin_id = %token.admin_id, %permission, "operator action denied");
        Err(AlertError::denied(&token.admin_id, permission))
    }
}

impl AlertEngine {
    /// Creates an engine over a venue.
    #[must_use]
    pub fn new(
        graph: Arc<AreaGraph>,
        thresholds: ThresholdConfig,
        notifier: AdminNotifier,
        logger: AlertLogger,
        retry: Arc<RetryQueue>,
    ) -> Self {
        let areas = graph
            .area_ids()
            .iter()
            .map(|id| (id.clone(), Mutex::new(AreaAlertState::default())))
            .collect();
        let emergency = EmergencyModeManager::new(Arc::clone(&graph), logger.clone());
        Self {
            graph,
            thresholds,
            config: EngineConfig::default(),
            notifier,
            logger,
            emergency,
            retry,
            areas: Arc::new(areas),
            emergency_alerts: Arc::new(Mutex::new(Vec::new())),
            dispatch: TaskTracker::new(),
        }
    }

    /// Sets the engine switches.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the notifier used for dispatch.
    #[must_use]
    pub const fn notifier(&self) -> &AdminNotifier {
        &self.notifier
    }

    /// Returns the audit logger.
    #[must_use]
    pub const fn logger(&self) -> &AlertLogger {
        &self.logger
    }

    /// Returns the emergency-mode manager.
    #[must_use]
    pub const fn emergency(&self) -> &EmergencyModeManager {
        &self.emergency
    }

    /// Returns the retry queue failed deliveries go to.
    #[must_use]
    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry
    }

    fn slot(&self, area_id: &str) -> Result<&Mutex<AreaAlertState>> {
        self.areas.get(area_id).ok_or_else(|| {
            AlertError::Density(DensityError::UnknownArea {
                id: area_id.to_string(),
            })
        })
    }

    /// Applies one evaluation to its area's alert state.
    ///
    /// # Errors
    ///
    /// Returns `Density` for an unknown area or `Audit` if the alert log
    /// cannot be written.
    pub fn handle_evaluation(&self, evaluation: &Evaluation) -> Result<EngineOutcome> {
        let area = self.graph.require(&evaluation.area_id)?;
        let slot = self.slot(&area.id)?;
        let level = evaluation.current_level;

        let mut state = slot.lock();
        state.last_density = evaluation.density_value;

        if level == ThresholdLevel::Normal {
            let Some(open) = state.open.take() else {
                return Ok(EngineOutcome::Quiet);
            };
            self.close(open.id, SYSTEM_ACTOR, AUTO_RESOLVE_NOTES)?;
            info!(
                area_id = %area.id,
                alert_id = %open.id,
                density = evaluation.density_value,
                "alert auto-resolved"
            );
            return Ok(EngineOutcome::AutoResolved { alert_id: open.id });
        }

        if !evaluation.is_escalation {
            debug!(
                area_id = %area.id,
                %level,
                previous = %evaluation.previous_level,
                "no escalation; alert suppressed"
            );
            return Ok(EngineOutcome::Suppressed { level });
        }

        if let Some(open) = state.open.as_ref().filter(|open| open.severity >= level) {
            debug!(
                area_id = %area.id,
                %level,
                open_severity = %open.severity,
                "open alert already covers this level; alert suppressed"
            );
            return Ok(EngineOutcome::Suppressed { level });
        }

        let threshold = self.thresholds.boundary_for_capacity(level, area.capacity);
        let alert = AlertEvent::new(
            AlertType::ThresholdViolation,
            level,
            area,
            evaluation.density_value,
            threshold,
            evaluation.timestamp,
        )?
        .with_suggested_actions(suggested_actions(level, area.area_type));

        let superseded = match state.open.take() {
            Some(previous) => {
                let notes = format!("superseded by {level} alert {}", alert.id);
                self.close(previous.id, SYSTEM_ACTOR, &notes)?;
                Some(previous.id)
            }
            None => None,
        };
        self.logger.log(&alert, Vec::new())?;
        state.open = Some(alert.clone());
        drop(state);

        info!(
            area_id = %area.id,
            alert_id = %alert.id,
            severity = %level,
            density = evaluation.density_value,
            percentage = evaluation.percentage,
            superseded = ?superseded,
            "alert raised"
        );
        self.dispatch(alert.clone());

        if level == ThresholdLevel::Emergency
            && self.config.auto_emergency
            && !self.emergency.is_active()
        {
            self.auto_activate(&area.id);
        }

        Ok(EngineOutcome::Raised { alert, superseded })
    }

    fn auto_activate(&self, area_id: &str) {
        match self
            .emergency
            .activate(area_id, EmergencyTrigger::Automatic, SYSTEM_ACTOR, None)
        {
            Ok(mode) => {
                if let Err(e) = self.raise_emergency_alerts(&mode) {
                    warn!(area_id, error = %e, "failed to raise emergency alerts");
                }
            }
            Err(AlertError::EmergencyAlreadyActive { .. }) => {}
            Err(e) => warn!(area_id, error = %e, "automatic emergency activation failed"),
        }
    }

    /// Resolves an alert, treating an already-resolved alert as closed.
    fn close(&self, alert_id: AlertId, actor: &str, notes: &str) -> Result<()> {
        match self.logger.resolve(alert_id, actor, Some(notes.to_string())) {
            Ok(_) | Err(AuditError::AlreadyResolved { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn dispatch(&self, alert: AlertEvent) {
        let Ok(handle) = Handle::try_current() else {
            warn!(alert_id = %alert.id, "no async runtime; notifications not sent");
            return;
        };
        let notifier = self.notifier.clone();
        let logger = self.logger.clone();
        let retry = Arc::clone(&self.retry);
        self.dispatch.spawn_on(
            async move {
                let results = notifier.send_alert(&alert, None).await;
                if let Err(e) = logger.record_notifications(alert.id, &results) {
                    warn!(
                        alert_id = %alert.id,
                        error = %e,
                        "failed to record notification outcomes"
                    );
                }
                for result in results.iter().filter(|r| !r.delivered) {
                    retry.enqueue(&alert, result);
                }
            },
            &handle,
        );
    }

    fn raise_emergency_alerts(&self, mode: &EmergencyMode) -> Result<Vec<AlertEvent>> {
        let trigger = mode.trigger_area_id.as_deref().unwrap_or_default();
        let mut raised = Vec::with_capacity(mode.affected_areas.len());
        for area_id in &mode.affected_areas {
            let area = self.graph.require(area_id)?;
            let density = self.slot(area_id)?.lock().last_density;
            let threshold = self
                .thresholds
                .boundary_for_capacity(ThresholdLevel::Emergency, area.capacity);
            let alert = AlertEvent::new(
                AlertType::EmergencyEscalation,
                ThresholdLevel::Emergency,
                area,
                density,
                threshold,
                Utc::now(),
            )?
            .with_trigger_area(trigger)
            .with_suggested_actions(emergency_actions(area_id == trigger));

            self.logger.log(&alert, Vec::new())?;
            self.emergency_alerts.lock().push(alert.id);
            self.dispatch(alert.clone());
            raised.push(alert);
        }
        info!(
            trigger_area_id = trigger,
            alerts = raised.len(),
            "emergency escalation alerts raised"
        );
        Ok(raised)
    }

    /// Records an acknowledgment. Repeated acknowledgments are kept.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` without `AcknowledgeAlerts` and
    /// `AlertNotFound` for an unknown alert.
    pub fn acknowledge_alert(
        &self,
        alert_id: AlertId,
        token: &AccessToken,
    ) -> Result<AlertLogEntry> {
        require(token, Permission::AcknowledgeAlerts)?;
        let entry = self.logger.acknowledge(alert_id, &token.admin_id)?;
        info!(%alert_id, admin_id = %token.admin_id, "alert acknowledged");
        Ok(entry)
    }

    /// Resolves an alert. A resolved threshold alert returns its area to
    /// quiet until the next escalation.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` without `ResolveAlerts`, `AlertNotFound`
    /// for an unknown alert and `AlreadyResolved` on a second call.
    pub fn resolve(
        &self,
        alert_id: AlertId,
        token: &AccessToken,
        notes: Option<String>,
    ) -> Result<AlertLogEntry> {
        require(token, Permission::ResolveAlerts)?;
        let existing = self
            .logger
            .get(alert_id)
            .ok_or(AlertError::AlertNotFound { id: alert_id })?;

        let entry = match self.areas.get(&existing.alert_event.area_id) {
            Some(slot) => {
                let mut state = slot.lock();
                let entry = self.logger.resolve(alert_id, &token.admin_id, notes)?;
                if state.open.as_ref().is_some_and(|open| open.id == alert_id) {
                    state.open = None;
                }
                entry
            }
            None => self.logger.resolve(alert_id, &token.admin_id, notes)?,
        };
        self.emergency_alerts.lock().retain(|id| *id != alert_id);

        info!(%alert_id, admin_id = %token.admin_id, "alert resolved");
        Ok(entry)
    }

    /// Activates emergency mode on an area and alerts every affected area.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` without `ActivateEmergency`,
    /// `EmergencyAlreadyActive` if one is running, or `Density` for an
    /// unknown area.
    pub fn activate_emergency(&self, area_id: &str, token: &AccessToken) -> Result<EmergencyMode> {
        require(token, Permission::ActivateEmergency)?;
        let mode = self.emergency.activate(
            area_id,
            EmergencyTrigger::Manual,
            &token.admin_id,
            Some(token),
        )?;
        self.raise_emergency_alerts(&mode)?;
        Ok(mode)
    }

    /// Deactivates emergency mode and resolves the alerts it raised.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` without `ActivateEmergency` or
    /// `EmergencyNotActive` if none is running.
    pub fn deactivate_emergency(&self, token: &AccessToken) -> Result<EmergencyMode> {
        require(token, Permission::ActivateEmergency)?;
        let previous = self.emergency.deactivate(&token.admin_id, Some(token))?;

        let open = std::mem::take(&mut *self.emergency_alerts.lock());
        for alert_id in open {
            if let Err(e) = self.close(alert_id, &token.admin_id, EMERGENCY_DEACTIVATED_NOTES) {
                warn!(%alert_id, error = %e, "failed to resolve emergency alert");
            }
        }
        Ok(previous)
    }

    /// Returns the emergency-mode state.
    #[must_use]
    pub fn emergency_status(&self) -> EmergencyMode {
        self.emergency.status()
    }

    /// Returns the open alert of an area.
    #[must_use]
    pub fn open_alert(&self, area_id: &str) -> Option<AlertEvent> {
        self.areas.get(area_id)?.lock().open.clone()
    }

    /// Returns every unresolved alert, oldest first.
    #[must_use]
    pub fn active_alerts(&self) -> Vec<AlertEvent> {
        let mut alerts: Vec<AlertEvent> = self
            .areas
            .values()
            .filter_map(|slot| slot.lock().open.clone())
            .collect();
        let emergency_ids = self.emergency_alerts.lock().clone();
        alerts.extend(
            emergency_ids
                .into_iter()
                .filter_map(|id| self.logger.get(id))
                .filter(|entry| !entry.is_resolved())
                .map(|entry| entry.alert_event),
        );
        alerts.sort_by_key(|a| a.timestamp);
        alerts
    }

    /// Drops in-memory alert state. The audit log is untouched.
    pub fn clear_all(&self) {
        for slot in self.areas.values() {
            *slot.lock() = AreaAlertState::default();
        }
        self.emergency_alerts.lock().clear();
        debug!("in-memory alert state cleared");
    }

    /// Waits for every notification dispatched so far to finish.
    pub async fn wait_for_dispatch(&self) {
        self.dispatch.close();
        self.dispatch.wait().await;
        self.dispatch.reopen();
    }

    /// Applies evaluations from `rx` in arrival order until the channel
    /// closes or `token` is cancelled.
    ///
    /// On cancellation, evaluations already queued in `rx` are applied
    /// before returning.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<Evaluation>, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    let mut drained = 0_usize;
                    while let Ok(evaluation) = rx.try_recv() {
                        self.apply(&evaluation);
                        drained += 1;
                    }
                    debug!(drained, "queued evaluations applied before stop");
                    break;
                }
                evaluation = rx.recv() => {
                    let Some(evaluation) = evaluation else { break };
                    self.apply(&evaluation);
                }
            }
        }
        debug!("alert engine stopped");
    }

    fn apply(&self, evaluation: &Evaluation) {
        if let Err(e) = self.handle_evaluation(evaluation) {
            warn!(area_id = %evaluation.area_id, error = %e, "failed to handle evaluation");
        }
    }
}

fn suggested_actions(level: ThresholdLevel, area_type: AreaType) -> Vec<String> {
    let mut actions: Vec<&str> = match level {
        ThresholdLevel::Normal => Vec::new(),
        ThresholdLevel::Warning => vec!["Monitor crowd flow closely"],
        ThresholdLevel::Critical => vec!["Deploy staff to manage crowd flow"],
        ThresholdLevel::Emergency => vec![
            "Stop all entry to the area",
            "Alert on-site medical and security teams",
        ],
    };
    let specific = match (level, area_type) {
        (ThresholdLevel::Warning, AreaType::Entrance) => Some("Slow admission at the entrance"),
        (ThresholdLevel::Critical, AreaType::Entrance) => Some("Pause entry until density drops"),
        (ThresholdLevel::Warning | ThresholdLevel::Critical, AreaType::Exit) => {
            Some("Open additional exit lanes")
        }
        (ThresholdLevel::Warning | ThresholdLevel::Critical, AreaType::Corridor) => {
            Some("Enforce one-way flow and keep the corridor moving")
        }
        (ThresholdLevel::Warning, AreaType::GatheringSpace) => {
            Some("Direct visitors to less crowded areas")
        }
        (ThresholdLevel::Critical, AreaType::GatheringSpace) => Some("Open overflow areas"),
        (ThresholdLevel::Emergency, _) => Some("Begin controlled evacuation via the nearest exits"),
        _ => None,
    };
    actions.extend(specific);
    actions.into_iter().map(String::from).collect()
}

fn emergency_actions(is_trigger: bool) -> Vec<String> {
    let actions: &[&str] = if is_trigger {
        &[
            "Follow the venue emergency plan",
            "Begin controlled evacuation via the nearest exits",
        ]
    } else {
        &[
            "Follow the venue emergency plan",
            "Hold inflow towards the trigger area",
        ]
    };
    actions.iter().map(|a| (*a).to_string()).collect()
}
