//! crowdwatch - crowd density monitoring daemon
//!
//! Loads a venue description from TOML, drives the density monitor from a
//! synthetic reading source, dispatches alerts to administrators and keeps
//! the audit journal that the `history` command reads back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
pub mod config;
pub mod error;

pub use config::{SimulationConfig, TransportMode, VenueConfig};
pub use error::{Result, WatchError};
