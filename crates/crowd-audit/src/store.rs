//! Storage backends for the alert audit trail.
//!
//! [`AlertLogStore`] abstracts over where entries live. [`MemoryAlertStore`]
//! keeps everything in process; [`FileAlertStore`](crate::file_store::FileAlertStore)
//! adds a JSON-lines journal that survives restarts.

use std::collections::HashMap;

use crowd_proto::{AlertId, NotificationResult};
use parking_lot::RwLock;

use crate::entry::{Acknowledgment, AlertLogEntry, EmergencyRecord, Resolution};
use crate::error::{AuditError, Result};
use crate::filter::AlertHistoryFilter;

/// Trait for alert log storage backends.
///
/// Entries are append-mostly: after insertion only acknowledgments,
/// notification results and a single resolution may be added.
pub trait AlertLogStore: Send + Sync {
    /// Stores a new entry, assigning its sequence number.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::DuplicateAlert` if the alert id is already
    /// stored, or an I/O error from persistent backends.
    fn insert(&self, entry: AlertLogEntry) -> Result<AlertLogEntry>;

    /// Appends an acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::AlertNotFound` for an unknown alert id.
    fn acknowledge(&self, alert_id: AlertId, ack: Acknowledgment) -> Result<AlertLogEntry>;

    /// Sets the resolution.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::AlertNotFound` for an unknown alert id and
    /// `AuditError::AlreadyResolved` if a resolution is already present.
    fn resolve(&self, alert_id: AlertId, resolution: Resolution) -> Result<AlertLogEntry>;

    /// Appends delivery outcomes.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::AlertNotFound` for an unknown alert id.
    fn append_notifications(&self, alert_id: AlertId, results: &[NotificationResult]) -> Result<()>;

    /// Returns the entry for an alert.
    fn get(&self, alert_id: AlertId) -> Option<AlertLogEntry>;

    /// Returns every entry in creation order.
    fn entries(&self) -> Vec<AlertLogEntry>;

    /// Returns the entries matching a filter.
    fn query(&self, filter: &AlertHistoryFilter) -> Vec<AlertLogEntry>;

    /// Stores an emergency-mode record, assigning its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from persistent backends.
    fn insert_emergency(&self, record: EmergencyRecord) -> Result<EmergencyRecord>;

    /// Returns emergency-mode records in creation order.
    fn emergency_records(&self) -> Vec<EmergencyRecord>;

    /// Returns the number of alert entries.
    fn len(&self) -> usize;

    /// Returns true if there are no alert entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes everything.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from persistent backends.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<AlertLogEntry>,
    index: HashMap<AlertId, usize>,
    emergencies: Vec<EmergencyRecord>,
    next_sequence: u64,
    next_emergency_sequence: u64,
}

impl MemoryState {
    fn entry_mut(&mut self, alert_id: AlertId) -> Result<&mut AlertLogEntry> {
        let idx = *self
            .index
            .get(&alert_id)
            .ok_or(AuditError::AlertNotFound { id: alert_id })?;
        self.entries
            .get_mut(idx)
            .ok_or(AuditError::AlertNotFound { id: alert_id })
    }
}

/// In-memory alert store.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    state: RwLock<MemoryState>,
}

impl MemoryAlertStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that an acknowledgment would be accepted.
    pub(crate) fn check_exists(&self, alert_id: AlertId) -> Result<()> {
        if self.state.read().index.contains_key(&alert_id) {
            Ok(())
        } else {
            Err(AuditError::AlertNotFound { id: alert_id })
        }
    }

    /// Checks that a resolution would be accepted.
    pub(crate) fn check_resolvable(&self, alert_id: AlertId) -> Result<()> {
        let state = self.state.read();
        let idx = state
            .index
            .get(&alert_id)
            .ok_or(AuditError::AlertNotFound { id: alert_id })?;
        match state.entries.get(*idx) {
            Some(entry) if entry.is_resolved() => Err(AuditError::AlreadyResolved { id: alert_id }),
            Some(_) => Ok(()),
            None => Err(AuditError::AlertNotFound { id: alert_id }),
        }
    }

    /// Checks that an entry could be inserted.
    pub(crate) fn check_new(&self, alert_id: AlertId) -> Result<()> {
        if self.state.read().index.contains_key(&alert_id) {
            Err(AuditError::DuplicateAlert { id: alert_id })
        } else {
            Ok(())
        }
    }

    /// Returns the sequence the next inserted entry will receive.
    pub(crate) fn peek_sequence(&self) -> u64 {
        self.state.read().next_sequence + 1
    }

    /// Returns the sequence the next emergency record will receive.
    pub(crate) fn peek_emergency_sequence(&self) -> u64 {
        self.state.read().next_emergency_sequence + 1
    }

    /// Inserts an entry whose sequence is already assigned.
    pub(crate) fn restore(&self, entry: AlertLogEntry) {
        let mut state = self.state.write();
        state.next_sequence = state.next_sequence.max(entry.sequence);
        if let Some(idx) = state.index.get(&entry.alert_id()).copied() {
            if let Some(slot) = state.entries.get_mut(idx) {
                *slot = entry;
            }
            return;
        }
        let idx = state.entries.len();
        state.index.insert(entry.alert_id(), idx);
        state.entries.push(entry);
    }

    /// Inserts an emergency record whose sequence is already assigned.
    pub(crate) fn restore_emergency(&self, record: EmergencyRecord) {
        let mut state = self.state.write();
        state.next_emergency_sequence = state.next_emergency_sequence.max(record.sequence);
        state.emergencies.push(record);
    }
}

impl AlertLogStore for MemoryAlertStore {
    fn insert(&self, mut entry: AlertLogEntry) -> Result<AlertLogEntry> {
        let mut state = self.state.write();
        let alert_id = entry.alert_id();
        if state.index.contains_key(&alert_id) {
            return Err(AuditError::DuplicateAlert { id: alert_id });
        }
        state.next_sequence += 1;
        entry.sequence = state.next_sequence;

        let idx = state.entries.len();
        state.index.insert(alert_id, idx);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    fn acknowledge(&self, alert_id: AlertId, ack: Acknowledgment) -> Result<AlertLogEntry> {
        let mut state = self.state.write();
        let entry = state.entry_mut(alert_id)?;
        entry.acknowledgments.push(ack);
        Ok(entry.clone())
    }

    fn resolve(&self, alert_id: AlertId, resolution: Resolution) -> Result<AlertLogEntry> {
        let mut state = self.state.write();
        let entry = state.entry_mut(alert_id)?;
        if entry.is_resolved() {
            return Err(AuditError::AlreadyResolved { id: alert_id });
        }
        entry.resolution = Some(resolution);
        Ok(entry.clone())
    }

    fn append_notifications(
        &self,
        alert_id: AlertId,
        results: &[NotificationResult],
    ) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.entry_mut(alert_id)?;
        entry
            .notification_results
            .admin_notifications
            .extend_from_slice(results);
        Ok(())
    }

    fn get(&self, alert_id: AlertId) -> Option<AlertLogEntry> {
        let state = self.state.read();
        state
            .index
            .get(&alert_id)
            .and_then(|idx| state.entries.get(*idx))
            .cloned()
    }

    fn entries(&self) -> Vec<AlertLogEntry> {
        self.state.read().entries.clone()
    }

    fn query(&self, filter: &AlertHistoryFilter) -> Vec<AlertLogEntry> {
        filter.apply(&self.state.read().entries)
    }

    fn insert_emergency(&self, mut record: EmergencyRecord) -> Result<EmergencyRecord> {
        let mut state = self.state.write();
        state.next_emergency_sequence += 1;
        record.sequence = state.next_emergency_sequence;
        state.emergencies.push(record.clone());
        Ok(record)
    }

    fn emergency_records(&self) -> Vec<EmergencyRecord> {
        self.state.read().emergencies.clone()
    }

    fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.entries.clear();
        state.index.clear();
        state.emergencies.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crowd_proto::{
        AlertEvent, AlertType, ChannelKind, EmergencyMode, MonitoredArea, ThresholdLevel,
    };

    fn entry(area: &str) -> AlertLogEntry {
        let area = MonitoredArea::new(area, area, 100);
        let event = AlertEvent::new(
            AlertType::ThresholdViolation,
            ThresholdLevel::Warning,
            &area,
            65.0,
            60.0,
            Utc::now(),
        )
        .unwrap();
        AlertLogEntry::new(event, Vec::new())
    }

    #[test]
    fn insert_assigns_increasing_sequence() {
        let store = MemoryAlertStore::new();
        let a = store.insert(entry("gate")).unwrap();
        let b = store.insert(entry("gate")).unwrap();
        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn insert_rejects_duplicate_alert() {
        let store = MemoryAlertStore::new();
        let e = entry("gate");
        store.insert(e.clone()).unwrap();
        assert!(matches!(
            store.insert(e),
            Err(AuditError::DuplicateAlert { .. })
        ));
    }

    #[test]
    fn acknowledge_appends() {
        let store = MemoryAlertStore::new();
        let e = store.insert(entry("gate")).unwrap();
        store.acknowledge(e.alert_id(), Acknowledgment::now("a")).unwrap();
        let updated = store.acknowledge(e.alert_id(), Acknowledgment::now("a")).unwrap();
        assert_eq!(updated.acknowledgments.len(), 2);
    }

    #[test]
    fn acknowledge_unknown_fails() {
        let store = MemoryAlertStore::new();
        let result = store.acknowledge(AlertId::new(), Acknowledgment::now("a"));
        assert!(matches!(result, Err(AuditError::AlertNotFound { .. })));
    }

    #[test]
    fn resolve_once() {
        let store = MemoryAlertStore::new();
        let e = store.insert(entry("gate")).unwrap();
        store
            .resolve(e.alert_id(), Resolution::now("admin-1", Some("cleared".into())))
            .unwrap();
        let second = store.resolve(e.alert_id(), Resolution::now("admin-2", None));
        assert!(matches!(second, Err(AuditError::AlreadyResolved { .. })));

        let stored = store.get(e.alert_id()).unwrap();
        assert_eq!(stored.resolution.unwrap().resolved_by, "admin-1");
    }

    #[test]
    fn notifications_accumulate() {
        let store = MemoryAlertStore::new();
        let e = store.insert(entry("gate")).unwrap();
        let id = e.alert_id();
        store
            .append_notifications(id, &[NotificationResult::success(id, "a", ChannelKind::Push, 1)])
            .unwrap();
        store
            .append_notifications(
                id,
                &[NotificationResult::failure(id, "a", ChannelKind::Sms, 1, "x")],
            )
            .unwrap();
        let stored = store.get(id).unwrap();
        assert_eq!(stored.notification_results.admin_notifications.len(), 2);
    }

    #[test]
    fn emergency_records_are_sequenced() {
        let store = MemoryAlertStore::new();
        let first = store
            .insert_emergency(EmergencyRecord::deactivated("a", EmergencyMode::inactive()))
            .unwrap();
        let second = store
            .insert_emergency(EmergencyRecord::deactivated("a", EmergencyMode::inactive()))
            .unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!(store.emergency_records().len(), 2);
    }

    #[test]
    fn clear_empties_store() {
        let store = MemoryAlertStore::new();
        store.insert(entry("gate")).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(store.entries().is_empty());
    }
}
