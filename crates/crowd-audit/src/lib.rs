//! Alert audit trail for crowd safety.
//!
//! Every raised alert is recorded as an [`AlertLogEntry`] together with its
//! delivery outcomes, acknowledgments and resolution. Emergency-mode
//! transitions are kept as [`EmergencyRecord`]s. History is queried with an
//! [`AlertHistoryFilter`].
//!
//! Storage is pluggable through [`AlertLogStore`]: [`MemoryAlertStore`]
//! for tests and ephemeral runs, [`FileAlertStore`] for a JSON-lines journal
//! that is replayed on startup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod file_store;
pub mod filter;
pub mod logger;
pub mod store;

pub use entry::{
    Acknowledgment, AlertLogEntry, EmergencyAction, EmergencyRecord, NotificationSummary,
    Resolution,
};
pub use error::{AuditError, Result};
pub use file_store::FileAlertStore;
pub use filter::{AcknowledgmentStatus, AlertHistoryFilter, SortOrder};
pub use logger::{AlertLogger, AlertLoggerConfig};
pub use store::{AlertLogStore, MemoryAlertStore};
