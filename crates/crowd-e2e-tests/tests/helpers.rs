//! Test helpers for E2E tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use crowd_alerts::{
    ChannelTransport, CrowdSafetySystem, EngineOutcome, LogTransport, SimulatedTransport,
    SystemSettings,
};
use crowd_audit::AlertLogger;
use crowd_proto::{
    AdminNotificationConfig, AreaType, ChannelKind, DensityReading, MonitoredArea, ThresholdLevel,
};

/// Every channel the notifier knows.
pub const ALL_CHANNELS: [ChannelKind; 3] =
    [ChannelKind::Push, ChannelKind::Sms, ChannelKind::Email];

/// Three areas of capacity 500 in a line; `area-2` touches both others.
pub fn venue_areas() -> Vec<MonitoredArea> {
    vec![
        MonitoredArea::new("area-1", "North Gate", 500)
            .with_type(AreaType::Entrance)
            .with_adjacent("area-2"),
        MonitoredArea::new("area-2", "Central Plaza", 500)
            .with_type(AreaType::GatheringSpace)
            .with_adjacent("area-1")
            .with_adjacent("area-3"),
        MonitoredArea::new("area-3", "South Exit", 500)
            .with_type(AreaType::Exit)
            .with_adjacent("area-2"),
    ]
}

/// Admins with deliberately narrow filters.
///
/// - `duty-manager`: push and email, everything
/// - `north-steward`: sms, only `area-1`
/// - `safety-officer`: email, only emergencies
pub fn venue_admins() -> Vec<AdminNotificationConfig> {
    vec![
        AdminNotificationConfig::new("duty-manager", [ChannelKind::Push, ChannelKind::Email])
            .unwrap(),
        AdminNotificationConfig::new("north-steward", [ChannelKind::Sms])
            .unwrap()
            .with_areas(["area-1"]),
        AdminNotificationConfig::new("safety-officer", [ChannelKind::Email])
            .unwrap()
            .with_severities([ThresholdLevel::Emergency]),
    ]
}

/// Transports that always deliver.
pub fn working_transports() -> Vec<Arc<dyn ChannelTransport>> {
    ALL_CHANNELS
        .into_iter()
        .map(|c| Arc::new(LogTransport::new(c)) as Arc<dyn ChannelTransport>)
        .collect()
}

/// Transports that always fail.
pub fn failing_transports() -> Vec<Arc<dyn ChannelTransport>> {
    ALL_CHANNELS
        .into_iter()
        .map(|c| {
            let transport = SimulatedTransport::new(c).with_success_ratio(0.0);
            Arc::new(transport) as Arc<dyn ChannelTransport>
        })
        .collect()
}

/// A configured venue that feeds readings with strictly increasing
/// timestamps.
pub struct TestVenue {
    pub system: CrowdSafetySystem,
    start: DateTime<Utc>,
    tick: AtomicI64,
}

impl TestVenue {
    /// Default settings with delivering transports.
    pub fn new() -> Self {
        Self::build(&SystemSettings::default(), working_transports(), AlertLogger::in_memory())
    }

    /// Default settings with failing transports.
    pub fn failing() -> Self {
        Self::build(&SystemSettings::default(), failing_transports(), AlertLogger::in_memory())
    }

    /// Full control over settings, transports and logger.
    pub fn build(
        settings: &SystemSettings,
        transports: Vec<Arc<dyn ChannelTransport>>,
        logger: AlertLogger,
    ) -> Self {
        let system = CrowdSafetySystem::with_logger(venue_areas(), settings, logger).unwrap();
        for transport in transports {
            system.register_transport(transport);
        }
        for admin in venue_admins() {
            system.configure_admin(admin).unwrap();
        }
        Self {
            system,
            start: Utc::now(),
            tick: AtomicI64::new(0),
        }
    }

    /// Ingests a reading and applies its evaluation to the engine.
    pub fn feed(&self, area_id: &str, density: f64) -> EngineOutcome {
        let n = self.tick.fetch_add(1, Ordering::SeqCst);
        let reading = DensityReading::new(area_id, density, self.start + Duration::seconds(n));
        let outcome = self.system.ingest(reading).unwrap();
        let evaluation = outcome.evaluation().cloned().unwrap();
        self.system.engine().handle_evaluation(&evaluation).unwrap()
    }

    /// Waits for all spawned notification tasks.
    pub async fn settle(&self) {
        self.system.engine().wait_for_dispatch().await;
    }
}
