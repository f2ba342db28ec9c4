//! File-backed alert store.
//!
//! Every mutation is appended to a JSON-lines journal before it is applied
//! in memory. Opening the store replays the journal, so history survives
//! process restarts.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crowd_proto::{AlertId, NotificationResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::{Acknowledgment, AlertLogEntry, EmergencyRecord, Resolution};
use crate::error::Result;
use crate::filter::AlertHistoryFilter;
use crate::store::{AlertLogStore, MemoryAlertStore};

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JournalRecord {
    Created {
        entry: AlertLogEntry,
    },
    Acknowledged {
        alert_id: AlertId,
        acknowledgment: Acknowledgment,
    },
    Resolved {
        alert_id: AlertId,
        resolution: Resolution,
    },
    Notified {
        alert_id: AlertId,
        results: Vec<NotificationResult>,
    },
    Emergency {
        emergency: EmergencyRecord,
    },
}

/// Persistent alert store backed by a JSON-lines journal.
pub struct FileAlertStore {
    path: PathBuf,
    inner: MemoryAlertStore,
    /// Serializes mutations so journal order matches memory order.
    writer: Mutex<()>,
}

impl std::fmt::Debug for FileAlertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAlertStore")
            .field("path", &self.path)
            .field("entries", &self.inner.len())
            .finish_non_exhaustive()
    }
}

impl FileAlertStore {
    /// Opens (or creates) a journal and replays it.
    ///
    /// Unparseable lines are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// journal cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let inner = MemoryAlertStore::new();
        let replayed = if path.exists() {
            Self::replay(&path, &inner)?
        } else {
            0
        };
        debug!(
            target: "crowd_audit",
            path = %path.display(),
            records = replayed,
            entries = inner.len(),
            "alert journal opened"
        );

        Ok(Self {
            path,
            inner,
            writer: Mutex::new(()),
        })
    }

    /// Returns the journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path, inner: &MemoryAlertStore) -> Result<usize> {
        let reader = BufReader::new(File::open(path)?);
        let mut applied = 0;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        target: "crowd_audit",
                        line = line_no + 1,
                        error = %e,
                        "skipping unreadable journal line"
                    );
                    continue;
                }
            };
            if let Err(e) = Self::apply(inner, record) {
                warn!(
                    target: "crowd_audit",
                    line = line_no + 1,
                    error = %e,
                    "skipping inconsistent journal record"
                );
                continue;
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn apply(inner: &MemoryAlertStore, record: JournalRecord) -> Result<()> {
        match record {
            JournalRecord::Created { entry } => inner.restore(entry),
            JournalRecord::Acknowledged {
                alert_id,
                acknowledgment,
            } => {
                inner.acknowledge(alert_id, acknowledgment)?;
            }
            JournalRecord::Resolved {
                alert_id,
                resolution,
            } => {
                inner.resolve(alert_id, resolution)?;
            }
            JournalRecord::Notified { alert_id, results } => {
                inner.append_notifications(alert_id, &results)?;
            }
            JournalRecord::Emergency { emergency } => inner.restore_emergency(emergency),
        }
        Ok(())
    }

    fn append(&self, record: &JournalRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl AlertLogStore for FileAlertStore {
    fn insert(&self, mut entry: AlertLogEntry) -> Result<AlertLogEntry> {
        let _guard = self.writer.lock();
        self.inner.check_new(entry.alert_id())?;
        entry.sequence = self.inner.peek_sequence();
        self.append(&JournalRecord::Created {
            entry: entry.clone(),
        })?;
        self.inner.restore(entry.clone());
        Ok(entry)
    }

    fn acknowledge(&self, alert_id: AlertId, ack: Acknowledgment) -> Result<AlertLogEntry> {
        let _guard = self.writer.lock();
        self.inner.check_exists(alert_id)?;
        self.append(&JournalRecord::Acknowledged {
            alert_id,
            acknowledgment: ack.clone(),
        })?;
        self.inner.acknowledge(alert_id, ack)
    }

    fn resolve(&self, alert_id: AlertId, resolution: Resolution) -> Result<AlertLogEntry> {
        let _guard = self.writer.lock();
        self.inner.check_resolvable(alert_id)?;
        self.append(&JournalRecord::Resolved {
            alert_id,
            resolution: resolution.clone(),
        })?;
        self.inner.resolve(alert_id, resolution)
    }

    fn append_notifications(
        &self,
        alert_id: AlertId,
        results: &[NotificationResult],
    ) -> Result<()> {
        let _guard = self.writer.lock();
        self.inner.check_exists(alert_id)?;
        self.append(&JournalRecord::Notified {
            alert_id,
            results: results.to_vec(),
        })?;
        self.inner.append_notifications(alert_id, results)
    }

    fn get(&self, alert_id: AlertId) -> Option<AlertLogEntry> {
        self.inner.get(alert_id)
    }

    fn entries(&self) -> Vec<AlertLogEntry> {
        self.inner.entries()
    }

    fn query(&self, filter: &AlertHistoryFilter) -> Vec<AlertLogEntry> {
        self.inner.query(filter)
    }

    fn insert_emergency(&self, mut record: EmergencyRecord) -> Result<EmergencyRecord> {
        let _guard = self.writer.lock();
        record.sequence = self.inner.peek_emergency_sequence();
        self.append(&JournalRecord::Emergency {
            emergency: record.clone(),
        })?;
        self.inner.restore_emergency(record.clone());
        Ok(record)
    }

    fn emergency_records(&self) -> Vec<EmergencyRecord> {
        self.inner.emergency_records()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.writer.lock();
        File::create(&self.path)?;
        self.inner.clear()
    }
}
