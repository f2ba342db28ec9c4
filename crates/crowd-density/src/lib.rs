//! Density classification and monitoring for crowd safety.
//!
//! This crate provides:
//! - [`AreaGraph`]: the validated venue topology with one-hop neighbours
//! - [`ThresholdEvaluator`]: stateless classification of readings into levels
//! - [`DensityMonitor`]: per-area state, ordered evaluation and subscriptions
//! - [`PatternGenerator`]: synthetic readings for demos and tests
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use crowd_density::{AreaGraph, DensityMonitor, ThresholdEvaluator};
//! use crowd_proto::{DensityReading, MonitoredArea, ThresholdLevel};
//!
//! let graph = AreaGraph::new(vec![MonitoredArea::new("gate", "Main Gate", 500)]).unwrap();
//! let monitor = DensityMonitor::new(Arc::new(graph), ThresholdEvaluator::default());
//!
//! let outcome = monitor.ingest(DensityReading::now("gate", 420.0)).unwrap();
//! let eval = outcome.evaluation().unwrap();
//! assert_eq!(eval.current_level, ThresholdLevel::Critical);
//! assert!(eval.is_escalation);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod monitor;
pub mod simulation;
pub mod source;
pub mod threshold;

pub use error::{DensityError, Result};
pub use graph::AreaGraph;
pub use monitor::{
    AreaSnapshot, DensityMonitor, IngestOutcome, MonitorConfig, DEFAULT_TICK_INTERVAL,
};
pub use simulation::{Pattern, PatternGenerator};
pub use source::ReadingSource;
pub use threshold::{ThresholdConfig, ThresholdEvaluator};
