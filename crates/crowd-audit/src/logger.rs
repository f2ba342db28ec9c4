//! The alert audit trail.

use std::path::PathBuf;
use std::sync::Arc;

use crowd_proto::{AlertEvent, AlertId, NotificationResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entry::{Acknowledgment, AlertLogEntry, EmergencyAction, EmergencyRecord, Resolution};
use crate::error::Result;
use crate::file_store::FileAlertStore;
use crate::filter::AlertHistoryFilter;
use crate::store::{AlertLogStore, MemoryAlertStore};

/// Audit trail settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertLoggerConfig {
    /// Journal file. In-memory only when unset.
    pub persistence_path: Option<PathBuf>,
}

impl AlertLoggerConfig {
    /// Persists history to `path`.
    #[must_use]
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        Self {
            persistence_path: Some(path.into()),
        }
    }
}

/// Durable record of every alert, its notifications, acknowledgments and
/// resolution, plus emergency-mode transitions.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct AlertLogger {
    store: Arc<dyn AlertLogStore>,
}

impl std::fmt::Debug for AlertLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertLogger")
            .field("entries", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl Default for AlertLogger {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl AlertLogger {
    /// Creates a logger over any store.
    #[must_use]
    pub fn new(store: Arc<dyn AlertLogStore>) -> Self {
        Self { store }
    }

    /// Creates a logger that keeps history in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAlertStore::new()))
    }

    /// Creates a logger from configuration, replaying any existing journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be opened.
    pub fn from_config(config: &AlertLoggerConfig) -> Result<Self> {
        match &config.persistence_path {
            Some(path) => Ok(Self::new(Arc::new(FileAlertStore::open(path.clone())?))),
            None => Ok(Self::in_memory()),
        }
    }

    /// Records a new alert with its initial delivery outcomes.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::DuplicateAlert` if the alert was already logged,
    /// or a storage error.
    pub fn log(
        &self,
        alert: &AlertEvent,
        results: Vec<NotificationResult>,
    ) -> Result<AlertLogEntry> {
        let entry = self.store.insert(AlertLogEntry::new(alert.clone(), results))?;
        info!(
            target: "crowd_audit",
            alert_id = %alert.id,
            entry_id = %entry.id,
            sequence = entry.sequence,
            area_id = %alert.area_id,
            severity = %alert.severity,
            alert_type = %alert.alert_type,
            "alert logged"
        );
        Ok(entry)
    }

    /// Appends an acknowledgment. Repeated acknowledgments are kept.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::AlertNotFound` for an unknown alert id.
    pub fn acknowledge(&self, alert_id: AlertId, admin_id: &str) -> Result<AlertLogEntry> {
        let entry = self.store.acknowledge(alert_id, Acknowledgment::now(admin_id))?;
        info!(
            target: "crowd_audit",
            %alert_id,
            admin_id,
            count = entry.acknowledgments.len(),
            "alert acknowledged"
        );
        Ok(entry)
    }

    /// Resolves an alert.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::AlertNotFound` for an unknown alert id and
    /// `AuditError::AlreadyResolved` if it is already resolved; the first
    /// resolution is never overwritten.
    pub fn resolve(
        &self,
        alert_id: AlertId,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<AlertLogEntry> {
        let entry = self
            .store
            .resolve(alert_id, Resolution::now(resolved_by, notes))?;
        info!(
            target: "crowd_audit",
            %alert_id,
            resolved_by,
            "alert resolved"
        );
        Ok(entry)
    }

    /// Appends delivery outcomes to an alert's entry.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::AlertNotFound` for an unknown alert id.
    pub fn record_notifications(
        &self,
        alert_id: AlertId,
        results: &[NotificationResult],
    ) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        self.store.append_notifications(alert_id, results)?;
        let delivered = results.iter().filter(|r| r.delivered).count();
        info!(
            target: "crowd_audit",
            %alert_id,
            attempts = results.len(),
            delivered,
            "notification outcomes recorded"
        );
        Ok(())
    }

    /// Returns the entry for an alert.
    #[must_use]
    pub fn get(&self, alert_id: AlertId) -> Option<AlertLogEntry> {
        self.store.get(alert_id)
    }

    /// Returns every entry in creation order.
    #[must_use]
    pub fn entries(&self) -> Vec<AlertLogEntry> {
        self.store.entries()
    }

    /// Returns entries matching the filter, newest first unless the filter
    /// asks otherwise.
    #[must_use]
    pub fn get_filtered_alert_history(&self, filter: &AlertHistoryFilter) -> Vec<AlertLogEntry> {
        self.store.query(filter)
    }

    /// Records an emergency-mode transition.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn log_emergency(&self, record: EmergencyRecord) -> Result<EmergencyRecord> {
        let record = self.store.insert_emergency(record)?;
        let trigger_area = record.mode.trigger_area_id.as_deref().unwrap_or("-");
        match record.action {
            EmergencyAction::Activated => tracing::warn!(
                target: "crowd_audit",
                admin_id = %record.admin_id,
                trigger_area,
                affected = record.mode.affected_areas.len(),
                "emergency mode activated"
            ),
            EmergencyAction::Deactivated => info!(
                target: "crowd_audit",
                admin_id = %record.admin_id,
                trigger_area,
                "emergency mode deactivated"
            ),
        }
        Ok(record)
    }

    /// Returns emergency-mode records in creation order.
    #[must_use]
    pub fn emergency_history(&self) -> Vec<EmergencyRecord> {
        self.store.emergency_records()
    }

    /// Returns the number of logged alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Removes all history.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        info!(target: "crowd_audit", "alert history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::filter::AcknowledgmentStatus;
    use chrono::Utc;
    use std::collections::HashSet;
    use crowd_proto::{
        AlertType, ChannelKind, EmergencyMode, EmergencyTrigger, MonitoredArea, ThresholdLevel,
    };
    use tempfile::TempDir;

    fn alert(area: &str, severity: ThresholdLevel) -> AlertEvent {
        let area = MonitoredArea::new(area, area, 500);
        AlertEvent::new(
            AlertType::ThresholdViolation,
            severity,
            &area,
            420.0,
            400.0,
            Utc::now(),
        )
        .unwrap()
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn acknowledge_then_resolve() {
            let logger = AlertLogger::in_memory();
            let event = alert("gate", ThresholdLevel::Critical);
            logger.log(&event, Vec::new()).unwrap();

            logger.acknowledge(event.id, "admin-1").unwrap();
            let entry = logger.get(event.id).unwrap();
            assert!(!entry.acknowledgments.is_empty());

            logger.resolve(event.id, "admin-1", Some("handled".into())).unwrap();
            let second = logger.resolve(event.id, "admin-2", None);
            assert!(matches!(second, Err(AuditError::AlreadyResolved { .. })));

            let entry = logger.get(event.id).unwrap();
            let resolution = entry.resolution.unwrap();
            assert_eq!(resolution.resolved_by, "admin-1");
            assert_eq!(resolution.notes.as_deref(), Some("handled"));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn concurrent_logging_keeps_ids_and_sequences_unique() {
            let logger = AlertLogger::in_memory();
            let area = MonitoredArea::new("gate", "gate", 500);
            let at = Utc::now();

            let writers: Vec<_> = (0..8)
                .map(|_| {
                    let logger = logger.clone();
                    let area = area.clone();
                    tokio::spawn(async move {
                        let mut entries = Vec::new();
                        for _ in 0..25 {
                            let event = AlertEvent::new(
                                AlertType::ThresholdViolation,
                                ThresholdLevel::Critical,
                                &area,
                                420.0,
                                400.0,
                                at,
                            )
                            .unwrap();
                            entries.push(logger.log(&event, Vec::new()).unwrap());
                            tokio::task::yield_now().await;
                        }
                        entries
                    })
                })
                .collect();

            let mut ids = HashSet::new();
            let mut sequences = HashSet::new();
            for writer in writers {
                for entry in writer.await.unwrap() {
                    assert!(ids.insert(entry.id));
                    assert!(sequences.insert(entry.sequence));
                }
            }
            assert_eq!(ids.len(), 200);
            assert_eq!(logger.len(), 200);
        }

        #[test]
        fn acknowledge_is_repeatable() {
            let logger = AlertLogger::in_memory();
            let event = alert("gate", ThresholdLevel::Warning);
            logger.log(&event, Vec::new()).unwrap();
            logger.acknowledge(event.id, "admin-1").unwrap();
            let entry = logger.acknowledge(event.id, "admin-2").unwrap();
            assert_eq!(entry.acknowledgments.len(), 2);
        }

        #[test]
        fn unknown_alert_is_not_found() {
            let logger = AlertLogger::in_memory();
            assert!(matches!(
                logger.acknowledge(AlertId::new(), "admin-1"),
                Err(AuditError::AlertNotFound { .. })
            ));
            assert!(matches!(
                logger.resolve(AlertId::new(), "admin-1", None),
                Err(AuditError::AlertNotFound { .. })
            ));
        }

        #[test]
        fn notifications_are_appended() {
            let logger = AlertLogger::in_memory();
            let event = alert("gate", ThresholdLevel::Critical);
            let initial =
                vec![NotificationResult::failure(event.id, "a", ChannelKind::Sms, 10, "down")];
            logger.log(&event, initial).unwrap();
            logger
                .record_notifications(
                    event.id,
                    &[NotificationResult::success(event.id, "a", ChannelKind::Sms, 4)
                        .with_attempt(2)],
                )
                .unwrap();
            logger.record_notifications(event.id, &[]).unwrap();

            let entry = logger.get(event.id).unwrap();
            assert_eq!(entry.notification_results.admin_notifications.len(), 2);
            assert_eq!(entry.notification_results.delivered_count(), 1);
        }
    }

    mod history_tests {
        use super::*;

        #[test]
        fn filtered_history() {
            let logger = AlertLogger::in_memory();
            let gate = alert("gate", ThresholdLevel::Critical);
            let hall = alert("hall", ThresholdLevel::Warning);
            logger.log(&gate, Vec::new()).unwrap();
            logger.log(&hall, Vec::new()).unwrap();
            logger.acknowledge(gate.id, "admin-1").unwrap();

            let unacked = logger.get_filtered_alert_history(
                &AlertHistoryFilter::new()
                    .with_acknowledgment_status(AcknowledgmentStatus::Unacknowledged),
            );
            assert_eq!(unacked.len(), 1);
            assert_eq!(unacked[0].alert_event.area_id, "hall");

            let all = logger.get_filtered_alert_history(&AlertHistoryFilter::new());
            assert_eq!(all.len(), 2);
        }

        #[test]
        fn emergency_history_is_kept() {
            let logger = AlertLogger::in_memory();
            let mode = EmergencyMode::activated(
                "hall",
                EmergencyTrigger::Manual,
                "admin-1",
                vec!["hall".into()],
            );
            logger.log_emergency(EmergencyRecord::activated(mode.clone())).unwrap();
            logger
                .log_emergency(EmergencyRecord::deactivated("admin-2", mode))
                .unwrap();

            let history = logger.emergency_history();
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].action, EmergencyAction::Activated);
            assert_eq!(history[1].admin_id, "admin-2");
        }

        #[test]
        fn clear_removes_everything() {
            let logger = AlertLogger::in_memory();
            logger.log(&alert("gate", ThresholdLevel::Warning), Vec::new()).unwrap();
            logger.clear().unwrap();
            assert!(logger.is_empty());
        }
    }

    mod persistence_tests {
        use super::*;

        #[test]
        fn from_config_replays_journal() {
            let dir = TempDir::new().unwrap();
            let config = AlertLoggerConfig::with_persistence(dir.path().join("alerts.jsonl"));
            let event = alert("gate", ThresholdLevel::Critical);
            {
                let logger = AlertLogger::from_config(&config).unwrap();
                logger.log(&event, Vec::new()).unwrap();
                logger.acknowledge(event.id, "admin-1").unwrap();
            }
            let logger = AlertLogger::from_config(&config).unwrap();
            let entry = logger.get(event.id).unwrap();
            assert!(entry.is_acknowledged());
        }

        #[test]
        fn default_config_is_in_memory() {
            let logger = AlertLogger::from_config(&AlertLoggerConfig::default()).unwrap();
            assert!(logger.is_empty());
        }
    }
}
