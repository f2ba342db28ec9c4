//! Channel transports.
//!
//! A [`ChannelTransport`] performs one delivery attempt of an alert to one
//! admin on one channel and reports the outcome. Real push, SMS and email
//! gateways implement this trait outside this crate; [`LogTransport`] and
//! [`SimulatedTransport`] cover development and demos.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crowd_proto::{AlertEvent, ChannelKind};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::message::NotificationMessage;

/// Outcome reported by a transport for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Whether the recipient was reached.
    pub delivered: bool,
    /// Time spent on the attempt, in milliseconds.
    pub latency_ms: u64,
    /// Failure reason when not delivered.
    pub error: Option<String>,
}

impl DeliveryReport {
    /// A successful attempt.
    #[must_use]
    pub const fn delivered(latency_ms: u64) -> Self {
        Self {
            delivered: true,
            latency_ms,
            error: None,
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failed(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            delivered: false,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

/// Future returned by [`ChannelTransport::attempt_delivery`].
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = DeliveryReport> + Send + 'a>>;

/// A delivery mechanism for one channel.
///
/// Transport failures are reported in the [`DeliveryReport`], never raised.
pub trait ChannelTransport: Send + Sync + fmt::Debug {
    /// The channel this transport serves.
    fn channel(&self) -> ChannelKind;

    /// Attempts to deliver `alert` to `admin_id`.
    fn attempt_delivery<'a>(
        &'a self,
        admin_id: &'a str,
        alert: &'a AlertEvent,
    ) -> DeliveryFuture<'a>;
}

/// Transport that writes the rendered message to the log and always succeeds.
#[derive(Debug, Clone)]
pub struct LogTransport {
    channel: ChannelKind,
}

impl LogTransport {
    /// Creates a log transport for a channel.
    #[must_use]
    pub const fn new(channel: ChannelKind) -> Self {
        Self { channel }
    }
}

impl ChannelTransport for LogTransport {
    fn channel(&self) -> ChannelKind {
        self.channel
    }

    fn attempt_delivery<'a>(
        &'a self,
        admin_id: &'a str,
        alert: &'a AlertEvent,
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let message = NotificationMessage::render(alert, self.channel);
            info!(
                channel = %self.channel,
                admin_id,
                alert_id = %alert.id,
                subject = message.subject.as_deref().unwrap_or(""),
                body = %message.body,
                "notification"
            );
            DeliveryReport::delivered(elapsed_ms(started))
        })
    }
}

/// Transport that simulates a gateway with fixed latency and a success ratio.
#[derive(Debug)]
pub struct SimulatedTransport {
    channel: ChannelKind,
    success_ratio: f64,
    latency: Duration,
    rng: Mutex<StdRng>,
}

impl SimulatedTransport {
    /// Creates a transport that always succeeds with no latency.
    #[must_use]
    pub fn new(channel: ChannelKind) -> Self {
        Self {
            channel,
            success_ratio: 1.0,
            latency: Duration::ZERO,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Sets the probability of success, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_success_ratio(mut self, ratio: f64) -> Self {
        self.success_ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        self
    }

    /// Sets the simulated latency.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seeds the random source for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    fn roll(&self) -> bool {
        if self.success_ratio >= 1.0 {
            return true;
        }
        if self.success_ratio <= 0.0 {
            return false;
        }
        self.rng.lock().gen_bool(self.success_ratio)
    }
}

impl ChannelTransport for SimulatedTransport {
    fn channel(&self) -> ChannelKind {
        self.channel
    }

    fn attempt_delivery<'a>(
        &'a self,
        admin_id: &'a str,
        alert: &'a AlertEvent,
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let latency_ms = u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX);
            if self.roll() {
                debug!(
                    channel = %self.channel,
                    admin_id,
                    alert_id = %alert.id,
                    "simulated delivery"
                );
                DeliveryReport::delivered(latency_ms)
            } else {
                DeliveryReport::failed(
                    latency_ms,
                    format!("simulated {} gateway failure", self.channel),
                )
            }
        })
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crowd_proto::{AlertType, MonitoredArea, ThresholdLevel};

    fn alert() -> AlertEvent {
        let area = MonitoredArea::new("gate", "Gate", 100);
        AlertEvent::new(
            AlertType::ThresholdViolation,
            ThresholdLevel::Warning,
            &area,
            65.0,
            60.0,
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn log_transport_always_delivers() {
        let transport = LogTransport::new(ChannelKind::Email);
        let report = transport.attempt_delivery("admin-1", &alert()).await;
        assert!(report.delivered);
        assert_eq!(transport.channel(), ChannelKind::Email);
    }

    #[tokio::test]
    async fn simulated_ratio_extremes() {
        let alert = alert();
        let always = SimulatedTransport::new(ChannelKind::Sms);
        let never = SimulatedTransport::new(ChannelKind::Sms).with_success_ratio(0.0);

        for _ in 0..20 {
            assert!(always.attempt_delivery("a", &alert).await.delivered);
            let failed = never.attempt_delivery("a", &alert).await;
            assert!(!failed.delivered);
            assert_eq!(failed.error.as_deref(), Some("simulated sms gateway failure"));
        }
    }

    #[tokio::test]
    async fn simulated_seeded_is_reproducible() {
        let alert = alert();
        let a = SimulatedTransport::new(ChannelKind::Push).with_success_ratio(0.5).with_seed(42);
        let b = SimulatedTransport::new(ChannelKind::Push).with_success_ratio(0.5).with_seed(42);
        for _ in 0..20 {
            assert_eq!(
                a.attempt_delivery("x", &alert).await.delivered,
                b.attempt_delivery("x", &alert).await.delivered
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_latency_is_reported() {
        let transport =
            SimulatedTransport::new(ChannelKind::Push).with_latency(Duration::from_millis(250));
        let report = transport.attempt_delivery("a", &alert()).await;
        assert_eq!(report.latency_ms, 250);
    }

    #[test]
    fn ratio_is_clamped() {
        let t = SimulatedTransport::new(ChannelKind::Push).with_success_ratio(7.0);
        assert!((t.success_ratio - 1.0).abs() < f64::EPSILON);
        let t = SimulatedTransport::new(ChannelKind::Push).with_success_ratio(f64::NAN);
        assert!(t.success_ratio.abs() < f64::EPSILON);
    }
}
