//! Reading producers polled by monitoring tasks.

use std::fmt;

use chrono::{DateTime, Utc};
use crowd_proto::{DensityReading, MonitoredArea};

/// Something that can produce the next density reading for an area.
///
/// Implemented by sensor adapters and by the synthetic
/// [`PatternGenerator`](crate::simulation::PatternGenerator). Returning `None`
/// means no reading is available this tick.
pub trait ReadingSource: Send + Sync + fmt::Debug {
    /// Produces the reading for `area` at `now`, if any.
    fn next_reading(&self, area: &MonitoredArea, now: DateTime<Utc>) -> Option<DensityReading>;
}
