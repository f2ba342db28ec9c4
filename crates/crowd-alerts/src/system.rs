//! Wiring of the full crowd-safety pipeline.
//!
//! [`CrowdSafetySystem`] owns the monitor, the alert engine and the retry
//! worker. Once started, every evaluation the monitor publishes is pumped
//! into the engine in order, and failed deliveries are replayed in the
//! background until shutdown.

use std::sync::Arc;
use std::time::Duration;

use crowd_audit::{AlertLogger, AlertLoggerConfig};
use crowd_density::{
    AreaGraph, DensityMonitor, IngestOutcome, MonitorConfig, ReadingSource, ThresholdConfig,
    ThresholdEvaluator,
};
use crowd_proto::{AdminNotificationConfig, DensityReading, MonitoredArea};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{AlertEngine, EngineConfig};
use crate::error::Result;
use crate::notifier::{AdminNotifier, NotifierConfig};
use crate::retry::{RetryPolicy, RetryQueue};
use crate::transport::ChannelTransport;

/// How often the retry worker looks for due entries.
pub const RETRY_WORKER_TICK: Duration = Duration::from_millis(250);

/// Settings for every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    /// Level boundaries.
    pub thresholds: ThresholdConfig,
    /// Polling behaviour.
    pub monitor: MonitorConfig,
    /// Delivery timeout and history.
    pub notifier: NotifierConfig,
    /// Retry limits and backoff.
    pub retry: RetryPolicy,
    /// Engine switches.
    pub engine: EngineConfig,
    /// Audit trail persistence.
    pub audit: AlertLoggerConfig,
}

impl SystemSettings {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid section's error.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.monitor.validate()?;
        self.notifier.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

#[derive(Debug)]
struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// The assembled monitoring, alerting and audit pipeline.
#[derive(Debug)]
pub struct CrowdSafetySystem {
    graph: Arc<AreaGraph>,
    monitor: DensityMonitor,
    engine: AlertEngine,
    running: Mutex<Option<Running>>,
}

impl CrowdSafetySystem {
    /// Builds the pipeline for a venue.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or topology, or
    /// an audit error if the journal cannot be opened.
    pub fn new(areas: Vec<MonitoredArea>, settings: &SystemSettings) -> Result<Self> {
        settings.validate()?;
        let graph = Arc::new(AreaGraph::new(areas)?);
        let logger = AlertLogger::from_config(&settings.audit)?;
        Self::assemble(graph, settings, logger)
    }

    /// Builds the pipeline over an existing logger.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or topology.
    pub fn with_logger(
        areas: Vec<MonitoredArea>,
        settings: &SystemSettings,
        logger: AlertLogger,
    ) -> Result<Self> {
        settings.validate()?;
        let graph = Arc::new(AreaGraph::new(areas)?);
        Self::assemble(graph, settings, logger)
    }

    fn assemble(
        graph: Arc<AreaGraph>,
        settings: &SystemSettings,
        logger: AlertLogger,
    ) -> Result<Self> {
        let evaluator = ThresholdEvaluator::new(settings.thresholds)?;
        let notifier = AdminNotifier::new(settings.notifier);
        let retry = Arc::new(RetryQueue::new(settings.retry));
        let engine = AlertEngine::new(
            Arc::clone(&graph),
            settings.thresholds,
            notifier,
            logger,
            retry,
        )
        .with_config(settings.engine);
        let monitor =
            DensityMonitor::new(Arc::clone(&graph), evaluator).with_config(settings.monitor);

        info!(areas = graph.len(), "crowd safety system assembled");
        Ok(Self {
            graph,
            monitor,
            engine,
            running: Mutex::new(None),
        })
    }

    /// Returns the venue topology.
    #[must_use]
    pub fn graph(&self) -> &Arc<AreaGraph> {
        &self.graph
    }

    /// Returns the density monitor.
    #[must_use]
    pub const fn monitor(&self) -> &DensityMonitor {
        &self.monitor
    }

    /// Returns the alert engine.
    #[must_use]
    pub const fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    /// Returns the notifier.
    #[must_use]
    pub const fn notifier(&self) -> &AdminNotifier {
        self.engine.notifier()
    }

    /// Returns the audit logger.
    #[must_use]
    pub const fn logger(&self) -> &AlertLogger {
        self.engine.logger()
    }

    /// Registers a channel transport.
    pub fn register_transport(&self, transport: Arc<dyn ChannelTransport>) {
        self.notifier().register_transport(transport);
    }

    /// Sets an admin's notification preferences.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a config without channels.
    pub fn configure_admin(&self, config: AdminNotificationConfig) -> Result<()> {
        self.notifier().configure_notifications(config)
    }

    /// Feeds one reading into the monitor.
    ///
    /// # Errors
    ///
    /// Returns `Density` for an unknown area or unusable value.
    pub fn ingest(&self, reading: DensityReading) -> Result<IngestOutcome> {
        Ok(self.monitor.ingest(reading)?)
    }

    /// Starts the evaluation pump and the retry worker.
    ///
    /// Returns false if already running. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("crowd safety system already running");
            return false;
        }

        let token = CancellationToken::new();
        let rx = self.monitor.subscribe();
        let engine = self.engine.clone();
        let pump_token = token.clone();
        let pump = tokio::spawn(async move { engine.run(rx, pump_token).await });

        let worker = Arc::clone(self.engine.retry_queue()).spawn_worker(
            self.notifier().clone(),
            self.logger().clone(),
            RETRY_WORKER_TICK,
            token.clone(),
        );

        *running = Some(Running {
            token,
            tasks: vec![pump, worker],
        });
        info!("crowd safety system started");
        true
    }

    /// Returns true between [`start`](Self::start) and
    /// [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Starts polling `source` for the listed areas.
    ///
    /// # Errors
    ///
    /// Returns `Density` if any area is unknown.
    pub fn start_monitoring(
        &self,
        area_ids: &[String],
        source: Arc<dyn ReadingSource>,
    ) -> Result<usize> {
        Ok(self.monitor.start_monitoring(area_ids, source)?)
    }

    /// Stops polling, the pump and the retry worker, then waits for
    /// in-flight notifications to finish. Evaluations queued before the
    /// call are still applied.
    pub async fn shutdown(&self) {
        self.monitor.stop();
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.token.cancel();
            for task in running.tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "background task ended abnormally");
                }
            }
        }
        self.engine.wait_for_dispatch().await;
        info!(
            pending_retries = self.engine.retry_queue().len(),
            "crowd safety system stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use crate::transport::LogTransport;
    use crowd_proto::{ChannelKind, ThresholdLevel};

    fn areas() -> Vec<MonitoredArea> {
        vec![
            MonitoredArea::new("gate", "Main Gate", 500).with_adjacent("hall"),
            MonitoredArea::new("hall", "Main Hall", 800),
        ]
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = SystemSettings::default();
        settings.thresholds.warning_percent = 90.0;
        assert!(matches!(
            CrowdSafetySystem::new(areas(), &settings),
            Err(AlertError::Density(_))
        ));

        let mut settings = SystemSettings::default();
        settings.notifier.attempt_timeout_ms = 0;
        assert!(matches!(
            CrowdSafetySystem::new(areas(), &settings),
            Err(AlertError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn bad_topology_is_rejected() {
        let areas = vec![MonitoredArea::new("gate", "Gate", 0)];
        assert!(CrowdSafetySystem::new(areas, &SystemSettings::default()).is_err());
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: SystemSettings =
            serde_json::from_str(r#"{"engine":{"auto_emergency":false}}"#).unwrap();
        assert!(!settings.engine.auto_emergency);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[tokio::test]
    async fn pump_turns_readings_into_alerts() {
        let system = CrowdSafetySystem::new(areas(), &SystemSettings::default()).unwrap();
        system.register_transport(Arc::new(LogTransport::new(ChannelKind::Push)));
        system
            .configure_admin(AdminNotificationConfig::new("admin-1", [ChannelKind::Push]).unwrap())
            .unwrap();

        assert!(system.start());
        assert!(!system.start());
        assert!(system.is_running());

        system.ingest(DensityReading::now("gate", 420.0)).unwrap();

        let mut alert = None;
        for _ in 0..100 {
            alert = system.engine().open_alert("gate");
            if alert.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let alert = alert.unwrap();
        assert_eq!(alert.severity, ThresholdLevel::Critical);

        system.shutdown().await;
        assert!(!system.is_running());
        let entry = system.logger().get(alert.id).unwrap();
        assert_eq!(entry.notification_results.delivered_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_keeps_readings_already_evaluated() {
        let system = CrowdSafetySystem::new(areas(), &SystemSettings::default()).unwrap();
        system.register_transport(Arc::new(LogTransport::new(ChannelKind::Push)));
        system
            .configure_admin(AdminNotificationConfig::new("admin-1", [ChannelKind::Push]).unwrap())
            .unwrap();

        assert!(system.start());
        system.ingest(DensityReading::now("gate", 420.0)).unwrap();
        system.shutdown().await;

        let alert = system.engine().open_alert("gate").unwrap();
        assert_eq!(alert.severity, ThresholdLevel::Critical);
        let entry = system.logger().get(alert.id).unwrap();
        assert_eq!(entry.notification_results.delivered_count(), 1);
        assert_eq!(system.logger().len(), 1);
    }
}
