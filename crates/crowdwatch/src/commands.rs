//! Subcommand implementations.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crowd_alerts::{ChannelTransport, CrowdSafetySystem, LogTransport, SimulatedTransport};
use crowd_audit::{AcknowledgmentStatus, AlertHistoryFilter, AlertLogEntry, AlertLogger};
use crowd_density::{AreaGraph, PatternGenerator, ReadingSource, ThresholdConfig};
use crowd_proto::{AlertType, ChannelKind, ThresholdLevel};
use tracing::{info, warn};

use crate::config::{SimulationConfig, TransportMode, VenueConfig};
use crate::error::{Result, WatchError};

/// Options for the `history` command.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Areas to include (empty = all).
    pub areas: Vec<String>,
    /// Severities to include (empty = all).
    pub severities: Vec<ThresholdLevel>,
    /// Restrict to emergency escalations.
    pub emergency_only: bool,
    /// Acknowledgment state to include.
    pub acknowledgment: AcknowledgmentStatus,
    /// Inclusive lower time bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of entries.
    pub limit: Option<usize>,
    /// List oldest entries first.
    pub oldest_first: bool,
}

impl HistoryQuery {
    /// Converts the options into a history filter.
    #[must_use]
    pub fn to_filter(&self) -> AlertHistoryFilter {
        let mut filter = AlertHistoryFilter::new()
            .with_areas(self.areas.iter().cloned())
            .with_severities(self.severities.iter().copied())
            .with_acknowledgment_status(self.acknowledgment)
            .with_time_range(self.since, self.until);
        if self.emergency_only {
            filter = filter.with_alert_types([AlertType::EmergencyEscalation]);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        if self.oldest_first {
            filter = filter.oldest_first();
        }
        filter
    }
}

/// Parses an RFC 3339 timestamp argument.
///
/// # Errors
///
/// Returns `WatchError::Argument` for malformed input.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WatchError::Argument(format!("'{value}' is not an RFC 3339 timestamp: {e}")))
}

/// Loads and validates a configuration, returning a one-screen summary.
///
/// # Errors
///
/// Returns the first configuration problem.
pub fn check_config(path: &Path) -> Result<String> {
    let config = VenueConfig::from_file(path)?;
    let mut out = String::new();
    let name = if config.name.is_empty() { "(unnamed)" } else { config.name.as_str() };
    let _ = writeln!(out, "Configuration OK: {name}");
    let _ = writeln!(out, "  Areas: {}", config.areas.len());
    let _ = writeln!(out, "  Admins: {}", config.admins.len());
    let _ = writeln!(
        out,
        "  Thresholds: warning {}%, critical {}%, emergency {}%",
        config.thresholds.warning_percent,
        config.thresholds.critical_percent,
        config.thresholds.emergency_percent
    );
    let _ = writeln!(
        out,
        "  Retry: {} attempts, {} ms initial backoff",
        config.retry.max_attempts, config.retry.initial_delay_ms
    );
    match &config.audit.persistence_path {
        Some(path) => {
            let _ = writeln!(out, "  Audit journal: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "  Audit journal: in memory only");
        }
    }
    Ok(out)
}

/// Writes the sample venue configuration.
///
/// # Errors
///
/// Returns an error if the file exists and `force` is false, or it cannot
/// be written.
pub fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(WatchError::Argument(format!(
            "{} already exists; pass --force to overwrite",
            output.display()
        )));
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, VenueConfig::sample().to_toml()?)?;
    Ok(())
}

/// Renders the venue topology with per-level thresholds in people.
#[must_use]
pub fn describe_areas(graph: &AreaGraph, thresholds: &ThresholdConfig) -> String {
    let mut out = String::new();
    for area in graph.areas() {
        let _ = writeln!(out, "{} ({})", area.name, area.id);
        let _ = writeln!(out, "  Type: {}", area.area_type);
        if !area.location.is_empty() {
            let _ = writeln!(out, "  Location: {}", area.location);
        }
        let _ = writeln!(out, "  Capacity: {}", area.capacity);
        let bounds: Vec<String> = [
            ThresholdLevel::Warning,
            ThresholdLevel::Critical,
            ThresholdLevel::Emergency,
        ]
        .into_iter()
        .map(|level| {
            format!(
                "{} >= {:.0}",
                level.as_str(),
                thresholds.boundary_for_capacity(level, area.capacity)
            )
        })
        .collect();
        let _ = writeln!(out, "  Levels: {}", bounds.join(", "));
        let neighbours = graph
            .neighbors(&area.id)
            .map(|ids| ids.join(", "))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  Adjacent: {}",
            if neighbours.is_empty() { "none".to_string() } else { neighbours }
        );
    }
    out
}

/// Formats one history entry as a single line.
#[must_use]
pub fn format_entry(entry: &AlertLogEntry) -> String {
    let event = &entry.alert_event;
    let status = if let Some(resolution) = &entry.resolution {
        format!("resolved by {}", resolution.resolved_by)
    } else if entry.is_acknowledged() {
        format!("acknowledged ({})", entry.acknowledgments.len())
    } else {
        "open".to_string()
    };
    let summary = &entry.notification_results;
    format!(
        "{}  {:<9}  {:<20}  {:<10}  {:>6.0}/{:<6.0}  notified {}/{}  {}  {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.severity.as_str(),
        event.alert_type.as_str(),
        event.area_id,
        event.density_value,
        event.threshold,
        summary.delivered_count(),
        summary.admin_notifications.len(),
        status,
        event.id,
    )
}

/// Prints the filtered alert history from the configured journal.
///
/// # Errors
///
/// Returns an error if no journal is configured or it cannot be read.
pub fn history(config: &VenueConfig, query: &HistoryQuery, json: bool) -> Result<()> {
    if config.audit.persistence_path.is_none() {
        return Err(WatchError::Config(
            "audit.persistence_path must be set to read history".to_string(),
        ));
    }
    let logger = AlertLogger::from_config(&config.audit)?;
    let entries = logger.get_filtered_alert_history(&query.to_filter());

    if json {
        for entry in &entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| WatchError::Argument(format!("cannot encode entry: {e}")))?;
            println!("{line}");
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No alerts match the filter");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    println!();
    println!("{} alert(s)", entries.len());
    Ok(())
}

/// Builds the synthetic reading source described by the configuration.
///
/// # Errors
///
/// Returns `WatchError::Config` for an invalid pattern.
pub fn build_source(simulation: &SimulationConfig) -> Result<PatternGenerator> {
    let generator = match simulation.seed {
        Some(seed) => PatternGenerator::with_seed(simulation.fallback.clone(), seed),
        None => PatternGenerator::new(simulation.fallback.clone()),
    };
    for (area_id, pattern) in &simulation.patterns {
        generator
            .set_pattern(area_id.clone(), pattern.clone())
            .map_err(|e| WatchError::Config(e.to_string()))?;
    }
    Ok(generator)
}

/// Builds one transport per channel.
#[must_use]
pub fn build_transports(simulation: &SimulationConfig) -> Vec<Arc<dyn ChannelTransport>> {
    [ChannelKind::Push, ChannelKind::Sms, ChannelKind::Email]
        .into_iter()
        .enumerate()
        .map(|(i, channel)| -> Arc<dyn ChannelTransport> {
            match simulation.transport {
                TransportMode::Log => Arc::new(LogTransport::new(channel)),
                TransportMode::Simulated => {
                    let transport = SimulatedTransport::new(channel)
                        .with_success_ratio(simulation.success_ratio)
                        .with_latency(Duration::from_millis(simulation.latency_ms));
                    match simulation.seed {
                        Some(seed) => Arc::new(transport.with_seed(seed.wrapping_add(i as u64))),
                        None => Arc::new(transport),
                    }
                }
            }
        })
        .collect()
}

/// Runs the monitoring pipeline until ctrl-c or `duration` elapses.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be assembled.
pub async fn run(config: VenueConfig, duration: Option<Duration>) -> Result<()> {
    let system = CrowdSafetySystem::new(config.areas.clone(), &config.settings())?;
    for transport in build_transports(&config.simulation) {
        system.register_transport(transport);
    }
    for admin in &config.admins {
        system.configure_admin(admin.clone())?;
    }

    let source: Arc<dyn ReadingSource> = Arc::new(build_source(&config.simulation)?);
    system.start();
    let area_ids = system.graph().area_ids().to_vec();
    let started = system.start_monitoring(&area_ids, source)?;
    info!(
        venue = %config.name,
        areas = started,
        admins = config.admins.len(),
        "crowdwatch running"
    );

    let stop = async {
        match duration {
            Some(limit) => tokio::time::sleep(limit).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
            }
        }
    };
    tokio::pin!(stop);

    let mut status = tokio::time::interval(config.monitor.tick_interval() * 6);
    status.tick().await;
    loop {
        tokio::select! {
            () = &mut stop => break,
            _ = status.tick() => log_status(&system),
        }
    }

    info!("shutting down");
    system.shutdown().await;
    log_status(&system);
    Ok(())
}

fn log_status(system: &CrowdSafetySystem) {
    for snapshot in system.monitor().snapshot() {
        info!(
            area_id = %snapshot.area.id,
            level = %snapshot.level(),
            density = snapshot.latest_reading.as_ref().map_or(0.0, |r| r.density_value),
            "area status"
        );
    }
    let emergency = system.engine().emergency_status();
    info!(
        active_alerts = system.engine().active_alerts().len(),
        emergency = emergency.active,
        pending_retries = system.engine().retry_queue().len(),
        dead_letters = system.engine().retry_queue().dead_letters().len(),
        logged = system.logger().len(),
        "pipeline status"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_alerts::SystemSettings;
    use crowd_audit::AlertLoggerConfig;
    use crowd_density::Pattern;
    use crowd_proto::{AccessToken, AdminNotificationConfig, DensityReading, MonitoredArea};
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("2026-03-01T10:00:00Z", true; "utc")]
    #[test_case("2026-03-01T12:00:00+02:00", true; "offset")]
    #[test_case("yesterday", false; "garbage")]
    fn timestamps(input: &str, ok: bool) {
        assert_eq!(parse_timestamp(input).is_ok(), ok);
    }

    #[test]
    fn query_maps_to_filter() {
        let query = HistoryQuery {
            areas: vec!["gate".into()],
            severities: vec![ThresholdLevel::Critical],
            emergency_only: true,
            acknowledgment: AcknowledgmentStatus::Unacknowledged,
            limit: Some(5),
            oldest_first: true,
            ..HistoryQuery::default()
        };
        let filter = query.to_filter();
        assert_eq!(filter.area_ids, ["gate"]);
        assert_eq!(filter.severities, [ThresholdLevel::Critical]);
        assert_eq!(filter.alert_types, [AlertType::EmergencyEscalation]);
        assert_eq!(filter.acknowledgment_status, AcknowledgmentStatus::Unacknowledged);
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.sort, crowd_audit::SortOrder::OldestFirst);
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("venue.toml");

        init_config(&path, false).unwrap();
        let loaded = VenueConfig::from_file(&path).unwrap();
        assert_eq!(loaded.areas.len(), 3);

        assert!(matches!(init_config(&path, false), Err(WatchError::Argument(_))));
        init_config(&path, true).unwrap();
    }

    #[test]
    fn check_config_summarises() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("venue.toml");
        init_config(&path, false).unwrap();

        let summary = check_config(&path).unwrap();
        assert!(summary.contains("Configuration OK: Sample venue"));
        assert!(summary.contains("Areas: 3"));
        assert!(summary.contains("in memory only"));
    }

    #[test]
    fn areas_show_people_thresholds() {
        let graph = VenueConfig::sample().graph().unwrap();
        let text = describe_areas(&graph, &ThresholdConfig::default());
        assert!(text.contains("Main Gate (gate)"));
        assert!(text.contains("warning >= 300, critical >= 400, emergency >= 500"));
        assert!(text.contains("Adjacent: gate, exit"));
    }

    #[test]
    fn source_uses_configured_patterns() {
        let mut simulation = SimulationConfig::default();
        simulation
            .patterns
            .insert("gate".into(), Pattern::Steady { value: 42.0 });
        let source = build_source(&simulation).unwrap();
        let area = MonitoredArea::new("gate", "Gate", 100);
        let reading = source.next_reading(&area, Utc::now()).unwrap();
        assert!((reading.density_value - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn transports_cover_every_channel() {
        let simulation = SimulationConfig {
            transport: TransportMode::Simulated,
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let channels: Vec<_> = build_transports(&simulation).iter().map(|t| t.channel()).collect();
        assert_eq!(channels, [ChannelKind::Push, ChannelKind::Sms, ChannelKind::Email]);
    }

    #[tokio::test]
    async fn history_reads_the_journal() {
        let dir = TempDir::new().unwrap();
        let journal = dir.path().join("alerts.jsonl");
        let settings = SystemSettings {
            audit: AlertLoggerConfig::with_persistence(&journal),
            ..SystemSettings::default()
        };
        let areas = vec![MonitoredArea::new("gate", "Gate", 100)];
        let system = CrowdSafetySystem::new(areas.clone(), &settings).unwrap();
        system
            .configure_admin(AdminNotificationConfig::new("ops", [ChannelKind::Push]).unwrap())
            .unwrap();
        let evaluation = system
            .ingest(DensityReading::now("gate", 85.0))
            .unwrap()
            .evaluation()
            .cloned()
            .unwrap();
        let alert = system
            .engine()
            .handle_evaluation(&evaluation)
            .unwrap()
            .raised()
            .cloned()
            .unwrap();
        system
            .engine()
            .acknowledge_alert(alert.id, &AccessToken::full_access("ops"))
            .unwrap();
        system.engine().wait_for_dispatch().await;

        let config = VenueConfig {
            areas,
            audit: AlertLoggerConfig::with_persistence(&journal),
            ..VenueConfig::default()
        };
        let reopened = AlertLogger::from_config(&config.audit).unwrap();
        let entries = reopened.get_filtered_alert_history(
            &HistoryQuery {
                acknowledgment: AcknowledgmentStatus::Acknowledged,
                ..HistoryQuery::default()
            }
            .to_filter(),
        );
        assert_eq!(entries.len(), 1);
        let line = format_entry(&entries[0]);
        assert!(line.contains("critical"));
        assert!(line.contains("acknowledged (1)"));
        history(&config, &HistoryQuery::default(), false).unwrap();
    }

    #[test]
    fn history_requires_a_journal() {
        let config = VenueConfig::sample();
        assert!(matches!(
            history(&config, &HistoryQuery::default(), false),
            Err(WatchError::Config(_))
        ));
    }
}
