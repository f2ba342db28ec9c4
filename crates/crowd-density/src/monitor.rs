//! Continuous density monitoring.
//!
//! The [`DensityMonitor`] keeps the latest reading and level for every area,
//! classifies new readings and publishes each [`Evaluation`] to subscribers.
//! Readings for one area are processed one at a time and published in arrival
//! order; different areas proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crowd_proto::{DensityReading, Evaluation, MonitoredArea, ThresholdLevel};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{DensityError, Result};
use crate::graph::AreaGraph;
use crate::source::ReadingSource;
use crate::threshold::ThresholdEvaluator;

/// Default polling period for monitoring tasks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Monitoring settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How often each monitored area is polled, in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: u64::try_from(DEFAULT_TICK_INTERVAL.as_millis()).unwrap_or(5_000),
        }
    }
}

impl MonitorConfig {
    /// Returns the tick interval as a `Duration`.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Sets the tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Checks the interval is non-zero.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` for a zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(DensityError::config("tick interval must be positive"));
        }
        Ok(())
    }
}

/// Result of ingesting a reading.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The reading was classified and published.
    Evaluated(Evaluation),
    /// The reading was older than the latest one for its area and was dropped.
    Stale,
}

impl IngestOutcome {
    /// Returns the evaluation, if the reading was processed.
    #[must_use]
    pub const fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            Self::Evaluated(eval) => Some(eval),
            Self::Stale => None,
        }
    }
}

/// Current state of one area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaSnapshot {
    /// The area definition.
    pub area: MonitoredArea,
    /// The most recent accepted reading.
    pub latest_reading: Option<DensityReading>,
    /// The most recent evaluation.
    pub evaluation: Option<Evaluation>,
}

impl AreaSnapshot {
    /// Returns the current level, `Normal` if nothing has been read yet.
    #[must_use]
    pub fn level(&self) -> ThresholdLevel {
        self.evaluation
            .as_ref()
            .map_or(ThresholdLevel::Normal, |e| e.current_level)
    }
}

#[derive(Debug, Default)]
struct AreaSlot {
    latest: Option<DensityReading>,
    evaluation: Option<Evaluation>,
}

/// Tracks per-area density and emits evaluations.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug)]
pub struct DensityMonitor {
    graph: Arc<AreaGraph>,
    evaluator: ThresholdEvaluator,
    config: MonitorConfig,
    slots: Arc<HashMap<String, Mutex<AreaSlot>>>,
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<Evaluation>>>>,
    tasks: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl Clone for DensityMonitor {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            evaluator: self.evaluator,
            config: self.config,
            slots: Arc::clone(&self.slots),
            subscribers: Arc::clone(&self.subscribers),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl DensityMonitor {
    /// Creates a monitor over the given topology.
    #[must_use]
    pub fn new(graph: Arc<AreaGraph>, evaluator: ThresholdEvaluator) -> Self {
        let slots = graph
            .area_ids()
            .iter()
            .map(|id| (id.clone(), Mutex::new(AreaSlot::default())))
            .collect();

        Self {
            graph,
            evaluator,
            config: MonitorConfig::default(),
            slots: Arc::new(slots),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sets the monitoring configuration.
    #[must_use]
    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the topology.
    #[must_use]
    pub fn graph(&self) -> &Arc<AreaGraph> {
        &self.graph
    }

    /// Returns the evaluator in use.
    #[must_use]
    pub const fn evaluator(&self) -> &ThresholdEvaluator {
        &self.evaluator
    }

    /// Registers a new evaluation subscriber.
    ///
    /// Every evaluation produced after this call is delivered to the returned
    /// receiver. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Evaluation> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().iter().filter(|s| !s.is_closed()).count()
    }

    /// Classifies a reading, updates the area state and publishes the result.
    ///
    /// A reading whose timestamp is older than the latest accepted reading
    /// for the same area is dropped and reported as [`IngestOutcome::Stale`].
    ///
    /// # Errors
    ///
    /// - `DensityError::UnknownArea` if the area is not registered
    /// - `DensityError::InvalidReading` for negative or non-finite values
    pub fn ingest(&self, reading: DensityReading) -> Result<IngestOutcome> {
        let area = self.graph.require(&reading.area_id)?;
        if !reading.density_value.is_finite() || reading.density_value < 0.0 {
            return Err(DensityError::InvalidReading {
                reason: format!(
                    "density for '{}' must be a non-negative number, got {}",
                    reading.area_id, reading.density_value
                ),
            });
        }
        let slot = self
            .slots
            .get(&reading.area_id)
            .ok_or_else(|| DensityError::UnknownArea {
                id: reading.area_id.clone(),
            })?;

        // Held through publish so per-area order is preserved.
        let mut slot = slot.lock();
        if let Some(latest) = &slot.latest {
            if reading.timestamp < latest.timestamp {
                debug!(
                    area_id = %reading.area_id,
                    timestamp = %reading.timestamp,
                    latest = %latest.timestamp,
                    "dropping stale reading"
                );
                return Ok(IngestOutcome::Stale);
            }
        }

        let previous = slot
            .evaluation
            .as_ref()
            .map_or(ThresholdLevel::Normal, |e| e.current_level);
        let evaluation = self.evaluator.evaluate(&reading, area, previous);

        if evaluation.current_level == previous {
            trace!(
                area_id = %area.id,
                level = %evaluation.current_level,
                density = evaluation.density_value,
                "density evaluated"
            );
        } else {
            info!(
                area_id = %area.id,
                from = %previous,
                to = %evaluation.current_level,
                percentage = evaluation.percentage,
                "threshold level changed"
            );
        }

        slot.latest = Some(reading);
        slot.evaluation = Some(evaluation.clone());
        self.publish(&evaluation);
        drop(slot);

        Ok(IngestOutcome::Evaluated(evaluation))
    }

    fn publish(&self, evaluation: &Evaluation) {
        let mut closed = false;
        for subscriber in self.subscribers.read().iter() {
            if subscriber.send(evaluation.clone()).is_err() {
                closed = true;
            }
        }
        if closed {
            self.subscribers.write().retain(|s| !s.is_closed());
        }
    }

    /// Returns the latest evaluation for an area.
    #[must_use]
    pub fn evaluation(&self, area_id: &str) -> Option<Evaluation> {
        self.slots
            .get(area_id)
            .and_then(|slot| slot.lock().evaluation.clone())
    }

    /// Returns the current level of an area (`Normal` before any reading).
    ///
    /// # Errors
    ///
    /// Returns `DensityError::UnknownArea` if the area is not registered.
    pub fn current_level(&self, area_id: &str) -> Result<ThresholdLevel> {
        self.graph.require(area_id)?;
        Ok(self
            .evaluation(area_id)
            .map_or(ThresholdLevel::Normal, |e| e.current_level))
    }

    /// Returns the state of one area.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::UnknownArea` if the area is not registered.
    pub fn area_snapshot(&self, area_id: &str) -> Result<AreaSnapshot> {
        let area = self.graph.require(area_id)?;
        let (latest_reading, evaluation) = self
            .slots
            .get(area_id)
            .map(|slot| {
                let slot = slot.lock();
                (slot.latest.clone(), slot.evaluation.clone())
            })
            .unwrap_or_default();
        Ok(AreaSnapshot {
            area: area.clone(),
            latest_reading,
            evaluation,
        })
    }

    /// Returns the state of every area in declaration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AreaSnapshot> {
        self.graph
            .area_ids()
            .iter()
            .filter_map(|id| self.area_snapshot(id).ok())
            .collect()
    }

    /// Starts a polling task for each listed area.
    ///
    /// Areas that already have a running task are left alone. Must be called
    /// from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::UnknownArea` if any id is not registered; no
    /// task is started in that case.
    pub fn start_monitoring(
        &self,
        area_ids: &[String],
        source: Arc<dyn ReadingSource>,
    ) -> Result<usize> {
        for id in area_ids {
            self.graph.require(id)?;
        }

        let mut tasks = self.tasks.lock();
        let mut started = 0;
        for id in area_ids {
            if tasks.contains_key(id) {
                debug!(area_id = %id, "monitoring already running");
                continue;
            }
            let token = CancellationToken::new();
            tasks.insert(id.clone(), token.clone());
            self.spawn_poller(id.clone(), Arc::clone(&source), token);
            started += 1;
        }

        info!(
            started,
            interval_ms = self.config.tick_interval_ms,
            "monitoring started"
        );
        Ok(started)
    }

    fn spawn_poller(
        &self,
        area_id: String,
        source: Arc<dyn ReadingSource>,
        token: CancellationToken,
    ) {
        let monitor = self.clone();
        let period = self.config.tick_interval();

        tokio::spawn(async move {
            let Some(area) = monitor.graph.area(&area_id).cloned() else {
                return;
            };
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(reading) = source.next_reading(&area, Utc::now()) else {
                            continue;
                        };
                        if let Err(e) = monitor.ingest(reading) {
                            warn!(area_id = %area_id, error = %e, "failed to ingest reading");
                        }
                    }
                }
            }
            debug!(area_id = %area_id, "monitoring task stopped");
        });
    }

    /// Stops the polling task of one area. Returns false if none was running.
    pub fn stop_monitoring(&self, area_id: &str) -> bool {
        let Some(token) = self.tasks.lock().remove(area_id) else {
            return false;
        };
        token.cancel();
        info!(area_id = %area_id, "monitoring stopped");
        true
    }

    /// Stops every polling task.
    pub fn stop(&self) {
        let tokens: Vec<_> = self.tasks.lock().drain().collect();
        for (_, token) in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            info!(count = tokens.len(), "all monitoring stopped");
        }
    }

    /// Returns the ids of areas with a running polling task, sorted.
    #[must_use]
    pub fn monitored_areas(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.tasks.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the time of the latest accepted reading for an area.
    #[must_use]
    pub fn last_reading_at(&self, area_id: &str) -> Option<DateTime<Utc>> {
        self.slots
            .get(area_id)
            .and_then(|slot| slot.lock().latest.as_ref().map(|r| r.timestamp))
    }
}
