//! Human-readable rendering of alerts per channel.

use std::fmt::Write as _;

use crowd_proto::{AlertEvent, AlertType, ChannelKind};
use serde::Serialize;

/// Maximum SMS body length before truncation.
pub const SMS_MAX_LEN: usize = 160;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    /// The channel this was rendered for.
    pub channel: ChannelKind,
    /// Push title or email subject. Absent for SMS.
    pub subject: Option<String>,
    /// The message body.
    pub body: String,
}

impl NotificationMessage {
    /// Renders an alert for a channel.
    ///
    /// SMS gets one short line, push a title and a short body, email a
    /// subject and a full body with suggested actions.
    #[must_use]
    pub fn render(alert: &AlertEvent, channel: ChannelKind) -> Self {
        let severity = alert.severity.label().to_uppercase();
        let headline = match alert.alert_type {
            AlertType::ThresholdViolation => {
                format!("{severity} crowd density at {}", alert.area_name)
            }
            AlertType::EmergencyEscalation => {
                format!("EMERGENCY mode affecting {}", alert.area_name)
            }
        };

        match channel {
            ChannelKind::Sms => {
                let mut body = format!(
                    "{headline}: {:.0} people (limit {:.0}).",
                    alert.density_value, alert.threshold
                );
                if let Some(first) = alert.metadata.suggested_actions.first() {
                    let _ = write!(body, " {first}");
                }
                Self {
                    channel,
                    subject: None,
                    body: truncate(body, SMS_MAX_LEN),
                }
            }
            ChannelKind::Push => {
                let mut body = format!(
                    "{:.0} people, threshold {:.0}",
                    alert.density_value, alert.threshold
                );
                if !alert.metadata.location.is_empty() {
                    let _ = write!(body, " at {}", alert.metadata.location);
                }
                Self {
                    channel,
                    subject: Some(headline),
                    body,
                }
            }
            ChannelKind::Email => Self {
                channel,
                subject: Some(format!("[Crowd alert] {headline}")),
                body: email_body(alert),
            },
        }
    }
}

fn email_body(alert: &AlertEvent) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Area: {} ({})", alert.area_name, alert.area_id);
    if !alert.metadata.location.is_empty() {
        let _ = writeln!(body, "Location: {}", alert.metadata.location);
    }
    let _ = writeln!(body, "Severity: {}", alert.severity.label());
    let _ = writeln!(body, "Density: {:.0} people", alert.density_value);
    let _ = writeln!(body, "Threshold crossed: {:.0} people", alert.threshold);
    let _ = writeln!(body, "Raised at: {}", alert.timestamp.to_rfc3339());
    if let Some(trigger) = &alert.metadata.trigger_area_id {
        let _ = writeln!(body, "Emergency triggered by: {trigger}");
    }
    if !alert.metadata.suggested_actions.is_empty() {
        body.push_str("\nSuggested actions:\n");
        for action in &alert.metadata.suggested_actions {
            let _ = writeln!(body, "- {action}");
        }
    }
    let _ = write!(body, "\nAlert id: {}", alert.id);
    body
}

fn truncate(mut text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(max.saturating_sub(3))
        .map_or(text.len(), |(idx, _)| idx);
    text.truncate(cut);
    text.push_str("...");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crowd_proto::{MonitoredArea, ThresholdLevel};

    fn alert() -> AlertEvent {
        let area = MonitoredArea::new("hall", "Main Hall", 500).with_location("Central courtyard");
        AlertEvent::new(
            AlertType::ThresholdViolation,
            ThresholdLevel::Critical,
            &area,
            420.0,
            400.0,
            Utc::now(),
        )
        .unwrap()
        .with_suggested_actions(vec!["Open overflow gates".into(), "Pause entry".into()])
    }

    #[test]
    fn sms_is_short() {
        let msg = NotificationMessage::render(&alert(), ChannelKind::Sms);
        assert!(msg.subject.is_none());
        assert!(msg.body.starts_with("CRITICAL crowd density at Main Hall"));
        assert!(msg.body.contains("420 people (limit 400)"));
        assert!(msg.body.chars().count() <= SMS_MAX_LEN);
    }

    #[test]
    fn sms_truncates_long_text() {
        let long = alert().with_suggested_actions(vec!["x".repeat(400)]);
        let msg = NotificationMessage::render(&long, ChannelKind::Sms);
        assert_eq!(msg.body.chars().count(), SMS_MAX_LEN);
        assert!(msg.body.ends_with("..."));
    }

    #[test]
    fn push_has_title_and_location() {
        let msg = NotificationMessage::render(&alert(), ChannelKind::Push);
        assert_eq!(msg.subject.as_deref(), Some("CRITICAL crowd density at Main Hall"));
        assert!(msg.body.contains("Central courtyard"));
    }

    #[test]
    fn email_lists_actions() {
        let msg = NotificationMessage::render(&alert(), ChannelKind::Email);
        assert!(msg.subject.unwrap().starts_with("[Crowd alert]"));
        assert!(msg.body.contains("- Open overflow gates"));
        assert!(msg.body.contains("Severity: Critical"));
    }

    #[test]
    fn emergency_headline() {
        let area = MonitoredArea::new("exit", "East Exit", 100);
        let alert = AlertEvent::new(
            AlertType::EmergencyEscalation,
            ThresholdLevel::Emergency,
            &area,
            10.0,
            100.0,
            Utc::now(),
        )
        .unwrap()
        .with_trigger_area("hall");
        let msg = NotificationMessage::render(&alert, ChannelKind::Email);
        assert_eq!(
            msg.subject.as_deref(),
            Some("[Crowd alert] EMERGENCY mode affecting East Exit")
        );
        assert!(msg.body.contains("Emergency triggered by: hall"));
    }
}
