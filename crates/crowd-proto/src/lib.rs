//! # crowd-proto
//!
//! Shared data model for crowd density monitoring, alerting and
//! administrator notification.
//!
//! Every other crowd crate speaks in these types:
//!
//! - [`MonitoredArea`] — a physical venue area with capacity and adjacency
//! - [`DensityReading`] — one sensor observation for an area
//! - [`ThresholdLevel`] / [`Evaluation`] — classified risk for an area
//! - [`AlertEvent`] — an immutable record of an escalation
//! - [`AdminNotificationConfig`] / [`NotificationResult`] — delivery preferences and outcomes
//! - [`EmergencyMode`] — the venue-wide emergency override
//! - [`AccessToken`] / [`Permission`] — caller capabilities for operator actions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod area;
pub mod auth;
pub mod emergency;
pub mod error;
pub mod notification;
pub mod reading;

pub use alert::{AlertEvent, AlertId, AlertMetadata, AlertType};
pub use area::{AreaType, MonitoredArea};
pub use auth::{AccessToken, Permission};
pub use emergency::{EmergencyMode, EmergencyTrigger};
pub use error::{ProtoError, Result};
pub use notification::{AdminNotificationConfig, ChannelKind, NotificationResult};
pub use reading::{DensityReading, Evaluation, ThresholdLevel};
