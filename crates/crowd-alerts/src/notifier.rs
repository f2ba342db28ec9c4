//! Multi-channel administrator notification.
//!
//! The [`AdminNotifier`] fans an alert out to every eligible admin on every
//! channel the admin configured. Attempts run concurrently, each bounded by
//! a timeout, and every attempt yields exactly one [`NotificationResult`].
//! Failures are recorded, never raised; retries are the job of the
//! [`RetryQueue`](crate::retry::RetryQueue).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crowd_proto::{AdminNotificationConfig, AlertEvent, AlertId, ChannelKind, NotificationResult};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AlertError, Result};
use crate::transport::{ChannelTransport, elapsed_ms};

/// Error recorded when an attempt exceeds the timeout.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Error recorded when no transport serves a configured channel.
pub const NO_TRANSPORT_ERROR: &str = "no transport registered for channel";

/// Notifier settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Upper bound on a single delivery attempt, in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Number of results kept in delivery history.
    pub history_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 10_000,
            history_capacity: 1_000,
        }
    }
}

impl NotifierConfig {
    /// Returns the attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Sets the attempt timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the history capacity.
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Checks the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` for a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout_ms == 0 {
            return Err(AlertError::InvalidConfig {
                reason: "attempt timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Delivery counters for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// The channel.
    pub channel: ChannelKind,
    /// Attempts made.
    pub attempted: u64,
    /// Attempts that reached the recipient.
    pub delivered: u64,
}

impl ChannelStats {
    const fn empty(channel: ChannelKind) -> Self {
        Self {
            channel,
            attempted: 0,
            delivered: 0,
        }
    }

    /// Returns `delivered / attempted`, or `None` before any attempt.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        (self.attempted > 0).then(|| self.delivered as f64 / self.attempted as f64)
    }
}

/// Returns true if an admin should receive an alert.
///
/// Emergency alerts go to everyone; otherwise the admin's severity and
/// area filters must both admit the alert.
#[must_use]
pub fn is_eligible(config: &AdminNotificationConfig, alert: &AlertEvent) -> bool {
    alert.is_emergency() || config.matches_filters(alert.severity, &alert.area_id)
}

/// Dispatches alerts to administrators.
///
/// Cloning is cheap; clones share configuration, transports and history.
#[derive(Debug)]
pub struct AdminNotifier {
    config: NotifierConfig,
    admins: Arc<RwLock<BTreeMap<String, AdminNotificationConfig>>>,
    transports: Arc<RwLock<HashMap<ChannelKind, Arc<dyn ChannelTransport>>>>,
    history: Arc<Mutex<VecDeque<NotificationResult>>>,
    stats: Arc<Mutex<BTreeMap<ChannelKind, ChannelStats>>>,
}

impl Clone for AdminNotifier {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            admins: Arc::clone(&self.admins),
            transports: Arc::clone(&self.transports),
            history: Arc::clone(&self.history),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl Default for AdminNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl AdminNotifier {
    /// Creates a notifier with no admins and no transports.
    #[must_use]
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            admins: Arc::new(RwLock::new(BTreeMap::new())),
            transports: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Returns the settings in use.
    #[must_use]
    pub const fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Registers the transport for its channel, replacing any previous one.
    pub fn register_transport(&self, transport: Arc<dyn ChannelTransport>) {
        let channel = transport.channel();
        self.transports.write().insert(channel, transport);
        info!(%channel, "registered notification transport");
    }

    /// Returns true if a transport serves `channel`.
    #[must_use]
    pub fn has_transport(&self, channel: ChannelKind) -> bool {
        self.transports.read().contains_key(&channel)
    }

    /// Replaces an admin's preferences. Last write wins.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the config has no channels or
    /// an empty admin id.
    pub fn configure_notifications(&self, config: AdminNotificationConfig) -> Result<()> {
        config.validate().map_err(|e| AlertError::InvalidConfig {
            reason: e.to_string(),
        })?;
        for channel in &config.channels {
            if !self.has_transport(*channel) {
                warn!(
                    admin_id = %config.admin_id,
                    %channel,
                    "no transport registered for configured channel"
                );
            }
        }
        info!(
            admin_id = %config.admin_id,
            channels = config.channels.len(),
            severity_filter = config.severity_filter.len(),
            area_filter = config.area_filter.len(),
            "notification preferences updated"
        );
        self.admins.write().insert(config.admin_id.clone(), config);
        Ok(())
    }

    /// Removes an admin's preferences.
    pub fn remove_config(&self, admin_id: &str) -> bool {
        self.admins.write().remove(admin_id).is_some()
    }

    /// Returns an admin's preferences.
    #[must_use]
    pub fn get_config(&self, admin_id: &str) -> Option<AdminNotificationConfig> {
        self.admins.read().get(admin_id).cloned()
    }

    /// Returns every configured admin, sorted by id.
    #[must_use]
    pub fn admins(&self) -> Vec<AdminNotificationConfig> {
        self.admins.read().values().cloned().collect()
    }

    /// Returns the admins that should receive an alert.
    ///
    /// With `admin_ids` set, only those admins are considered; unknown ids
    /// are skipped.
    #[must_use]
    pub fn eligible_admins(
        &self,
        alert: &AlertEvent,
        admin_ids: Option<&[String]>,
    ) -> Vec<AdminNotificationConfig> {
        let admins = self.admins.read();
        let candidates: Vec<&AdminNotificationConfig> = match admin_ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let found = admins.get(id);
                    if found.is_none() {
                        debug!(admin_id = %id, "skipping unconfigured admin");
                    }
                    found
                })
                .collect(),
            None => admins.values().collect(),
        };
        candidates
            .into_iter()
            .filter(|c| is_eligible(c, alert))
            .cloned()
            .collect()
    }

    /// Delivers an alert to every eligible admin on every configured channel.
    ///
    /// Returns one result per (eligible admin, channel) pair, including
    /// failures and timeouts. Never fails.
    pub async fn send_alert(
        &self,
        alert: &AlertEvent,
        admin_ids: Option<&[String]>,
    ) -> Vec<NotificationResult> {
        let recipients = self.eligible_admins(alert, admin_ids);
        let attempts: Vec<_> = recipients
            .iter()
            .flat_map(|admin| {
                admin
                    .channels
                    .iter()
                    .map(move |channel| (admin.admin_id.as_str(), *channel))
            })
            .map(|(admin_id, channel)| self.attempt(alert, admin_id, channel, 1))
            .collect();

        let results = join_all(attempts).await;
        let delivered = results.iter().filter(|r| r.delivered).count();
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            recipients = recipients.len(),
            attempts = results.len(),
            delivered,
            "alert dispatched"
        );
        self.record(&results);
        results
    }

    /// Makes a single delivery attempt, recording the result.
    ///
    /// Used for retries; eligibility is not re-checked.
    pub async fn deliver(
        &self,
        alert: &AlertEvent,
        admin_id: &str,
        channel: ChannelKind,
        attempt: u32,
    ) -> NotificationResult {
        let result = self.attempt(alert, admin_id, channel, attempt).await;
        self.record(std::slice::from_ref(&result));
        result
    }

    async fn attempt(
        &self,
        alert: &AlertEvent,
        admin_id: &str,
        channel: ChannelKind,
        attempt: u32,
    ) -> NotificationResult {
        let transport = self.transports.read().get(&channel).cloned();
        let Some(transport) = transport else {
            warn!(alert_id = %alert.id, admin_id, %channel, "no transport registered");
            return NotificationResult::failure(alert.id, admin_id, channel, 0, NO_TRANSPORT_ERROR)
                .with_attempt(attempt);
        };

        let started = Instant::now();
        let delivery = transport.attempt_delivery(admin_id, alert);
        let outcome = tokio::time::timeout(self.config.attempt_timeout(), delivery).await;

        let result = match outcome {
            Ok(report) if report.delivered => {
                NotificationResult::success(alert.id, admin_id, channel, report.latency_ms)
            }
            Ok(report) => NotificationResult::failure(
                alert.id,
                admin_id,
                channel,
                report.latency_ms,
                report.error.unwrap_or_else(|| "delivery failed".to_string()),
            ),
            Err(_) => NotificationResult::failure(
                alert.id,
                admin_id,
                channel,
                elapsed_ms(started),
                TIMEOUT_ERROR,
            ),
        }
        .with_attempt(attempt);

        if !result.delivered {
            warn!(
                alert_id = %alert.id,
                admin_id,
                %channel,
                attempt,
                error = result.error.as_deref().unwrap_or(""),
                "notification delivery failed"
            );
        }
        result
    }

    fn record(&self, results: &[NotificationResult]) {
        {
            let mut stats = self.stats.lock();
            for result in results {
                let entry = stats
                    .entry(result.channel)
                    .or_insert_with(|| ChannelStats::empty(result.channel));
                entry.attempted += 1;
                if result.delivered {
                    entry.delivered += 1;
                }
            }
        }

        let capacity = self.config.history_capacity;
        let mut history = self.history.lock();
        history.extend(results.iter().cloned());
        while history.len() > capacity {
            history.pop_front();
        }
    }

    /// Returns up to `limit` results, most recent first.
    #[must_use]
    pub fn get_delivery_history(&self, limit: usize) -> Vec<NotificationResult> {
        self.history.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Clears delivery history and channel counters.
    pub fn clear_history(&self) {
        self.history.lock().clear();
        self.stats.lock().clear();
    }

    /// Returns `delivered / attempted` for one alert over retained history.
    #[must_use]
    pub fn success_rate(&self, alert_id: AlertId) -> Option<f64> {
        let history = self.history.lock();
        let (attempted, delivered) = history
            .iter()
            .filter(|r| r.alert_id == alert_id)
            .fold((0u64, 0u64), |(a, d), r| (a + 1, d + u64::from(r.delivered)));
        (attempted > 0).then(|| delivered as f64 / attempted as f64)
    }

    /// Returns counters for every channel that has seen an attempt.
    #[must_use]
    pub fn channel_stats(&self) -> Vec<ChannelStats> {
        self.stats.lock().values().copied().collect()
    }
}
