//! Bounded retry queue for failed notification attempts.
//!
//! Failed `(alert, admin, channel)` tuples are queued with an exponential
//! backoff and replayed through [`AdminNotifier::deliver`] until they
//! succeed or exhaust the [`RetryPolicy`]. Exhausted or overflowing
//! entries move to a dead-letter list for operator review. The list holds
//! at most `queue_capacity` entries; the oldest are evicted first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crowd_audit::AlertLogger;
use crowd_proto::{AlertEvent, AlertId, ChannelKind, NotificationResult};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AlertError, Result};
use crate::notifier::AdminNotifier;

/// Retry limits and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries per failed tuple after the initial attempt.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
    /// Maximum number of pending entries, and of dead-lettered entries kept.
    pub queue_capacity: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            queue_capacity: 1_024,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    /// Returns true if another retry is allowed after `retries_done`.
    #[must_use]
    pub const fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_attempts
    }

    /// Checks the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` for a non-finite or sub-1
    /// multiplier or a zero queue capacity.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(AlertError::InvalidConfig {
                reason: "retry backoff multiplier must be at least 1.0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(AlertError::InvalidConfig {
                reason: "retry queue capacity must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// A failed delivery awaiting replay.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    /// The alert to deliver.
    pub alert: AlertEvent,
    /// The recipient.
    pub admin_id: String,
    /// The channel to retry on.
    pub channel: ChannelKind,
    /// Retries already made.
    pub retries: u32,
    /// Earliest time of the next retry.
    pub next_attempt_at: Instant,
    /// Error of the most recent attempt.
    pub last_error: Option<String>,
}

impl RetryEntry {
    /// The alert this entry belongs to.
    #[must_use]
    pub const fn alert_id(&self) -> AlertId {
        self.alert.id
    }
}

/// Queue of failed deliveries with backoff.
#[derive(Debug, Default)]
pub struct RetryQueue {
    policy: RetryPolicy,
    pending: Mutex<VecDeque<RetryEntry>>,
    dead_letters: Mutex<VecDeque<RetryEntry>>,
}

impl RetryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queues a failed result for replay.
    ///
    /// Returns false if the result was delivered, retries are disabled or
    /// the queue is full; in the latter two cases the tuple is
    /// dead-lettered.
    pub fn enqueue(&self, alert: &AlertEvent, result: &NotificationResult) -> bool {
        if result.delivered {
            return false;
        }
        let entry = RetryEntry {
            alert: alert.clone(),
            admin_id: result.admin_id.clone(),
            channel: result.channel,
            retries: 0,
            next_attempt_at: Instant::now() + self.policy.delay_for_attempt(1),
            last_error: result.error.clone(),
        };

        if !self.policy.should_retry(0) {
            self.dead_letter(entry, "retries disabled");
            return false;
        }

        let mut pending = self.pending.lock();
        if pending.len() >= self.policy.queue_capacity {
            drop(pending);
            self.dead_letter(entry, "retry queue full");
            return false;
        }
        debug!(
            alert_id = %alert.id,
            admin_id = %result.admin_id,
            channel = %result.channel,
            "queued failed notification for retry"
        );
        pending.push_back(entry);
        true
    }

    /// Replays every entry whose backoff has elapsed.
    ///
    /// Returns the results of the retries made. Entries that fail again
    /// are rescheduled or dead-lettered.
    pub async fn process_due(&self, notifier: &AdminNotifier) -> Vec<NotificationResult> {
        let now = Instant::now();
        let due: Vec<RetryEntry> = {
            let mut pending = self.pending.lock();
            let (due, waiting): (VecDeque<_>, VecDeque<_>) =
                pending.drain(..).partition(|e| e.next_attempt_at <= now);
            *pending = waiting;
            due.into()
        };
        if due.is_empty() {
            return Vec::new();
        }

        let attempts = due.into_iter().map(|mut entry| async move {
            entry.retries += 1;
            let result = notifier
                .deliver(&entry.alert, &entry.admin_id, entry.channel, entry.retries + 1)
                .await;
            (entry, result)
        });
        let outcomes = join_all(attempts).await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (mut entry, result) in outcomes {
            if result.delivered {
                info!(
                    alert_id = %entry.alert.id,
                    admin_id = %entry.admin_id,
                    channel = %entry.channel,
                    retries = entry.retries,
                    "notification delivered on retry"
                );
            } else if self.policy.should_retry(entry.retries) {
                entry.last_error.clone_from(&result.error);
                entry.next_attempt_at =
                    Instant::now() + self.policy.delay_for_attempt(entry.retries + 1);
                self.pending.lock().push_back(entry);
            } else {
                entry.last_error.clone_from(&result.error);
                self.dead_letter(entry, "retries exhausted");
            }
            results.push(result);
        }
        results
    }

    fn dead_letter(&self, entry: RetryEntry, reason: &'static str) {
        warn!(
            alert_id = %entry.alert.id,
            admin_id = %entry.admin_id,
            channel = %entry.channel,
            retries = entry.retries,
            last_error = entry.last_error.as_deref().unwrap_or(""),
            reason,
            "notification dead-lettered"
        );
        let mut dead = self.dead_letters.lock();
        while dead.len() >= self.policy.queue_capacity.max(1) {
            dead.pop_front();
        }
        dead.push_back(entry);
    }

    /// Returns a snapshot of pending entries in queue order.
    #[must_use]
    pub fn pending(&self) -> Vec<RetryEntry> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Returns entries that will not be retried again, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<RetryEntry> {
        self.dead_letters.lock().iter().cloned().collect()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drops pending and dead-lettered entries.
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.dead_letters.lock().clear();
    }

    /// Runs [`process_due`](Self::process_due) every `tick` until cancelled,
    /// recording retry outcomes in the alert log.
    pub fn spawn_worker(
        self: Arc<Self>,
        notifier: AdminNotifier,
        logger: AlertLogger,
        tick: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let results = self.process_due(&notifier).await;
                        record_results(&logger, results);
                    }
                }
            }
            debug!(pending = self.len(), "retry worker stopped");
        })
    }
}

fn record_results(logger: &AlertLogger, results: Vec<NotificationResult>) {
    let mut by_alert: BTreeMap<AlertId, Vec<NotificationResult>> = BTreeMap::new();
    for result in results {
        by_alert.entry(result.alert_id).or_default().push(result);
    }
    for (alert_id, results) in by_alert {
        if let Err(e) = logger.record_notifications(alert_id, &results) {
            warn!(%alert_id, error = %e, "failed to record retry outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::tests::{ScriptedTransport, alert};
    use crate::transport::{ChannelTransport, DeliveryFuture, DeliveryReport};
    use crowd_proto::{AdminNotificationConfig, ThresholdLevel};
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    #[derive(Debug)]
    struct FlakyTransport {
        failures_left: AtomicU32,
    }

    impl ChannelTransport for FlakyTransport {
        fn channel(&self) -> ChannelKind {
            ChannelKind::Sms
        }

        fn attempt_delivery<'a>(
            &'a self,
            _admin_id: &'a str,
            _alert: &'a AlertEvent,
        ) -> DeliveryFuture<'a> {
            Box::pin(async move {
                let left = self.failures_left.load(Ordering::SeqCst);
                if left == 0 {
                    DeliveryReport::delivered(1)
                } else {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    DeliveryReport::failed(1, "flaky")
                }
            })
        }
    }

    fn failed(alert: &AlertEvent) -> NotificationResult {
        NotificationResult::failure(alert.id, "admin-1", ChannelKind::Sms, 3, "down")
    }

    #[test_case(1, 1_000; "first retry")]
    #[test_case(2, 2_000; "second retry")]
    #[test_case(3, 4_000; "third retry")]
    #[test_case(10, 30_000; "capped")]
    fn backoff_delays(retry: u32, millis: u64) {
        assert_eq!(
            RetryPolicy::default().delay_for_attempt(retry),
            Duration::from_millis(millis)
        );
    }

    #[test]
    fn should_retry_is_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn validate_rejects_bad_policies() {
        let shrinking = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(shrinking.validate().is_err());
        let no_room = RetryPolicy {
            queue_capacity: 0,
            ..RetryPolicy::default()
        };
        assert!(no_room.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[tokio::test]
    async fn delivered_results_are_not_queued() {
        let queue = RetryQueue::default();
        let alert = alert("hall", ThresholdLevel::Warning);
        let ok = NotificationResult::success(alert.id, "a", ChannelKind::Push, 1);
        assert!(!queue.enqueue(&alert, &ok));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn overflow_is_dead_lettered() {
        let queue = RetryQueue::new(RetryPolicy {
            queue_capacity: 1,
            ..RetryPolicy::default()
        });
        let alert = alert("hall", ThresholdLevel::Warning);
        assert!(queue.enqueue(&alert, &failed(&alert)));
        assert!(!queue.enqueue(&alert, &failed(&alert)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn dead_letters_are_capped_oldest_first() {
        let queue = RetryQueue::new(RetryPolicy {
            max_attempts: 0,
            queue_capacity: 2,
            ..RetryPolicy::default()
        });
        let alert = alert("hall", ThresholdLevel::Warning);
        for admin in ["admin-1", "admin-2", "admin-3"] {
            let result = NotificationResult::failure(alert.id, admin, ChannelKind::Sms, 3, "down");
            assert!(!queue.enqueue(&alert, &result));
        }

        let kept: Vec<String> = queue.dead_letters().into_iter().map(|e| e.admin_id).collect();
        assert_eq!(kept, ["admin-2", "admin-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_for_backoff_then_succeed() {
        let notifier = AdminNotifier::default();
        notifier.register_transport(Arc::new(FlakyTransport {
            failures_left: AtomicU32::new(1),
        }));
        let queue = RetryQueue::default();
        let alert = alert("hall", ThresholdLevel::Critical);
        queue.enqueue(&alert, &failed(&alert));

        assert!(queue.process_due(&notifier).await.is_empty());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let first = queue.process_due(&notifier).await;
        assert_eq!(first.len(), 1);
        assert!(!first[0].delivered);
        assert_eq!(first[0].attempt, 2);
        assert_eq!(queue.len(), 1);

        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert!(queue.process_due(&notifier).await.is_empty());
        tokio::time::advance(Duration::from_millis(1)).await;
        let second = queue.process_due(&notifier).await;
        assert!(second[0].delivered);
        assert_eq!(second[0].attempt, 3);
        assert!(queue.is_empty());
        assert!(queue.dead_letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_entries_are_dead_lettered() {
        let transport = ScriptedTransport::new(ChannelKind::Sms, false);
        let notifier = AdminNotifier::default();
        notifier.register_transport(Arc::clone(&transport) as Arc<dyn ChannelTransport>);
        let queue = RetryQueue::default();
        let alert = alert("hall", ThresholdLevel::Critical);
        queue.enqueue(&alert, &failed(&alert));

        let mut attempts = Vec::new();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(30)).await;
            attempts.extend(queue.process_due(&notifier).await.into_iter().map(|r| r.attempt));
        }

        assert_eq!(attempts, [2, 3, 4]);
        assert_eq!(transport.calls(), 3);
        assert!(queue.is_empty());
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].retries, 3);
        assert_eq!(dead[0].last_error.as_deref(), Some("sms gateway down"));
    }

    #[tokio::test(start_paused = true)]
    async fn worker_records_outcomes_and_stops() {
        let notifier = AdminNotifier::default();
        notifier.register_transport(Arc::new(FlakyTransport {
            failures_left: AtomicU32::new(0),
        }));
        notifier
            .configure_notifications(
                AdminNotificationConfig::new("admin-1", [ChannelKind::Sms]).unwrap(),
            )
            .unwrap();
        let logger = AlertLogger::in_memory();
        let alert = alert("hall", ThresholdLevel::Critical);
        logger.log(&alert, vec![failed(&alert)]).unwrap();

        let queue = Arc::new(RetryQueue::default());
        queue.enqueue(&alert, &failed(&alert));
        let token = CancellationToken::new();
        let worker = Arc::clone(&queue).spawn_worker(
            notifier,
            logger.clone(),
            Duration::from_millis(250),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        token.cancel();
        worker.await.unwrap();

        assert!(queue.is_empty());
        let entry = logger.get(alert.id).unwrap();
        assert_eq!(entry.notification_results.admin_notifications.len(), 2);
        assert!(entry.notification_results.admin_notifications[1].delivered);
    }
}
