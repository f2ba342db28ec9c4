//! Venue configuration.
//!
//! A venue is described by one TOML file:
//! - component sections (`[thresholds]`, `[monitor]`, `[notifier]`,
//!   `[retry]`, `[engine]`, `[audit]`), all optional
//! - `[[areas]]`: the monitored areas and their adjacency
//! - `[[admins]]`: per-administrator notification preferences
//! - `[simulation]`: the synthetic feed and transports used by `run`

use std::collections::BTreeMap;
use std::path::Path;

use crowd_alerts::{EngineConfig, NotifierConfig, RetryPolicy, SystemSettings};
use crowd_audit::AlertLoggerConfig;
use crowd_density::{AreaGraph, MonitorConfig, Pattern, ThresholdConfig};
use crowd_proto::{AdminNotificationConfig, AreaType, ChannelKind, MonitoredArea, ThresholdLevel};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// How `run` delivers notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Write rendered messages to the log.
    #[default]
    Log,
    /// Simulated gateways with a success ratio and latency.
    Simulated,
}

/// Synthetic feed and transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    /// Pattern for areas without an entry in `patterns`.
    pub fallback: Pattern,
    /// Per-area patterns keyed by area id.
    pub patterns: BTreeMap<String, Pattern>,
    /// Transport used for every channel.
    pub transport: TransportMode,
    /// Delivery success probability for simulated transports.
    pub success_ratio: f64,
    /// Delivery latency for simulated transports, in milliseconds.
    pub latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            fallback: Pattern::Steady { value: 0.0 },
            patterns: BTreeMap::new(),
            transport: TransportMode::Log,
            success_ratio: 1.0,
            latency_ms: 0,
        }
    }
}

/// Complete venue configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Display name of the venue.
    #[serde(default)]
    pub name: String,
    /// Level boundaries.
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Polling behaviour.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Delivery timeout and history.
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Retry limits and backoff.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Engine switches.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Audit trail persistence.
    #[serde(default)]
    pub audit: AlertLoggerConfig,
    /// Synthetic feed for `run`.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Monitored areas.
    #[serde(default)]
    pub areas: Vec<MonitoredArea>,
    /// Administrator preferences.
    #[serde(default)]
    pub admins: Vec<AdminNotificationConfig>,
}

impl VenueConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WatchError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| WatchError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WatchError::Config(format!("cannot serialize: {e}")))
    }

    /// Validates every section, the topology and the admin list.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.areas.is_empty() {
            return Err(WatchError::Config("at least one area must be defined".to_string()));
        }
        self.settings()
            .validate()
            .map_err(|e| WatchError::Config(e.to_string()))?;
        let graph = self.graph()?;

        let mut seen = std::collections::BTreeSet::new();
        for admin in &self.admins {
            admin
                .validate()
                .map_err(|e| WatchError::Config(e.to_string()))?;
            if !seen.insert(admin.admin_id.as_str()) {
                return Err(WatchError::Config(format!(
                    "admin '{}' is configured twice",
                    admin.admin_id
                )));
            }
            if let Some(area) = admin.area_filter.iter().find(|a| !graph.contains(a)) {
                return Err(WatchError::Config(format!(
                    "admin '{}' filters on unknown area '{area}'",
                    admin.admin_id
                )));
            }
        }

        for (area_id, pattern) in &self.simulation.patterns {
            if !graph.contains(area_id) {
                return Err(WatchError::Config(format!(
                    "simulation pattern for unknown area '{area_id}'"
                )));
            }
            pattern
                .validate()
                .map_err(|e| WatchError::Config(format!("simulation.patterns.{area_id}: {e}")))?;
        }
        self.simulation
            .fallback
            .validate()
            .map_err(|e| WatchError::Config(format!("simulation.fallback: {e}")))?;
        if !(0.0..=1.0).contains(&self.simulation.success_ratio) {
            return Err(WatchError::Config(
                "simulation.success_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the component settings.
    #[must_use]
    pub fn settings(&self) -> SystemSettings {
        SystemSettings {
            thresholds: self.thresholds,
            monitor: self.monitor,
            notifier: self.notifier,
            retry: self.retry,
            engine: self.engine,
            audit: self.audit.clone(),
        }
    }

    /// Builds the validated topology.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Config` for invalid capacities or adjacency.
    pub fn graph(&self) -> Result<AreaGraph> {
        AreaGraph::new(self.areas.clone()).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Returns the sample three-zone venue written by `init-config`.
    #[must_use]
    pub fn sample() -> Self {
        let areas = vec![
            MonitoredArea::new("gate", "Main Gate", 500)
                .with_location("North entrance")
                .with_type(AreaType::Entrance)
                .with_adjacent("hall"),
            MonitoredArea::new("hall", "Main Hall", 800)
                .with_location("Central courtyard")
                .with_type(AreaType::GatheringSpace)
                .with_adjacent("gate")
                .with_adjacent("exit"),
            MonitoredArea::new("exit", "East Exit", 300)
                .with_location("East wing")
                .with_type(AreaType::Exit)
                .with_adjacent("hall"),
        ];

        let mut admins = Vec::new();
        if let Ok(ops) =
            AdminNotificationConfig::new("ops-lead", [ChannelKind::Push, ChannelKind::Sms])
        {
            admins.push(ops);
        }
        if let Ok(gate) = AdminNotificationConfig::new("gate-steward", [ChannelKind::Push]) {
            admins.push(
                gate.with_areas(["gate"])
                    .with_severities([ThresholdLevel::Critical, ThresholdLevel::Emergency]),
            );
        }
        if let Ok(safety) = AdminNotificationConfig::new("safety-officer", [ChannelKind::Email]) {
            admins.push(safety.with_severities([ThresholdLevel::Emergency]));
        }

        let patterns = BTreeMap::from([
            ("gate".to_string(), Pattern::Random { min: 50.0, max: 600.0 }),
            ("hall".to_string(), Pattern::Random { min: 100.0, max: 800.0 }),
            ("exit".to_string(), Pattern::Random { min: 30.0, max: 400.0 }),
        ]);

        Self {
            name: "Sample venue".to_string(),
            areas,
            admins,
            simulation: SimulationConfig {
                patterns,
                ..SimulationConfig::default()
            },
            ..Self::default()
        }
    }
}
