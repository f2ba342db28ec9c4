//! Alerting, notification and emergency handling for crowd safety.
//!
//! This crate provides:
//! - [`AlertEngine`]: the per-area alert state machine and operator actions
//! - [`AdminNotifier`]: concurrent multi-channel delivery to administrators
//! - [`RetryQueue`]: bounded backoff replay of failed deliveries
//! - [`EmergencyModeManager`]: the venue-wide emergency gate
//! - [`CrowdSafetySystem`]: the assembled pipeline from readings to audit
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use crowd_alerts::{CrowdSafetySystem, LogTransport, SystemSettings};
//! use crowd_proto::{AdminNotificationConfig, ChannelKind, MonitoredArea};
//!
//! let system = CrowdSafetySystem::new(
//!     vec![MonitoredArea::new("gate", "Main Gate", 500)],
//!     &SystemSettings::default(),
//! )
//! .unwrap();
//! system.register_transport(Arc::new(LogTransport::new(ChannelKind::Email)));
//! system
//!     .configure_admin(AdminNotificationConfig::new("ops", [ChannelKind::Email]).unwrap())
//!     .unwrap();
//! assert_eq!(system.notifier().admins().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod emergency;
pub mod engine;
pub mod error;
pub mod message;
pub mod notifier;
pub mod retry;
pub mod system;
pub mod transport;

pub use emergency::EmergencyModeManager;
pub use engine::{AlertEngine, EngineConfig, EngineOutcome};
pub use error::{AlertError, Result};
pub use message::NotificationMessage;
pub use notifier::{AdminNotifier, ChannelStats, NotifierConfig};
pub use retry::{RetryEntry, RetryPolicy, RetryQueue};
pub use system::{CrowdSafetySystem, SystemSettings};
pub use transport::{
    ChannelTransport, DeliveryFuture, DeliveryReport, LogTransport, SimulatedTransport,
};
