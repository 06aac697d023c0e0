//! ==============================================================================
//! alerts.rs - alert gate with per-device cooldown
//! ==============================================================================
//!
//! purpose:
//!     decides whether a reading deserves a notification right now and, if so,
//!     composes it. the same (device, status) pair notifies at most once per
//!     cooldown window.
//!
//! decision order:
//!     1. alertable?   mail or tampering, never "no mail"
//!     2. cooldown?    last send for (device, status) older than the window
//!     3. recipients?  none configured -> skip WITHOUT consuming the window
//!     4. compose + record `now` for the key
//!
//! relationships:
//!     - owned by: pipeline.rs (inside the shared Monitor)
//!     - produces: Notification, handed to notifier.rs after the lock is released
//!
//! ==============================================================================

use crate::domain::Reading;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_COOLDOWN_MINUTES: u64 = 15;
pub const DEFAULT_LOW_BATTERY_PERCENT: u8 = 25;

/// what happened to a reading at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    SuppressedCooldown,
    SuppressedNoRecipients,
    SkippedNotAlertable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub device_id: u8,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Dispatch(Notification),
    Skip(NotificationOutcome),
}

/// mail present or tampering; "no mail" labels contain "mail" but never alert
pub fn is_alertable(status_label: &str) -> bool {
    let label = status_label.to_lowercase();
    if label.contains("no mail") {
        return false;
    }
    label.contains("mail") || label.contains("tamper")
}

/// last approved notification per (device, status label)
#[derive(Debug)]
pub struct CooldownTable {
    window: Duration,
    last_notified: HashMap<(u8, String), DateTime<Utc>>,
}

impl CooldownTable {
    pub fn new(window: Duration) -> Self {
        Self { window, last_notified: HashMap::new() }
    }

    /// strictly more than `window` must have passed since the last send
    pub fn permits(&self, device_id: u8, status_label: &str, now: DateTime<Utc>) -> bool {
        match self.last_notified.get(&(device_id, status_label.to_string())) {
            Some(last) => now - *last > self.window,
            None => true,
        }
    }

    pub fn record(&mut self, device_id: u8, status_label: &str, now: DateTime<Utc>) {
        self.last_notified.insert((device_id, status_label.to_string()), now);
    }
}

pub struct AlertGate {
    cooldowns: CooldownTable,
    dashboard_url: String,
    low_battery_percent: u8,
}

impl AlertGate {
    pub fn new(
        cooldown: Duration,
        dashboard_url: impl Into<String>,
        low_battery_percent: u8,
    ) -> Self {
        Self {
            cooldowns: CooldownTable::new(cooldown),
            dashboard_url: dashboard_url.into(),
            low_battery_percent,
        }
    }

    pub fn evaluate(
        &mut self,
        reading: &Reading,
        device_name: &str,
        recipients: &[String],
        now: DateTime<Utc>,
    ) -> GateDecision {
        if !is_alertable(&reading.status_label) {
            return GateDecision::Skip(NotificationOutcome::SkippedNotAlertable);
        }
        if !self.cooldowns.permits(reading.device_id, &reading.status_label, now) {
            return GateDecision::Skip(NotificationOutcome::SuppressedCooldown);
        }
        if recipients.is_empty() {
            return GateDecision::Skip(NotificationOutcome::SuppressedNoRecipients);
        }

        let notification = self.compose(reading, device_name, recipients);
        self.cooldowns.record(reading.device_id, &reading.status_label, now);
        GateDecision::Dispatch(notification)
    }

    fn compose(&self, reading: &Reading, device_name: &str, recipients: &[String]) -> Notification {
        let mut body = format!(
            "Your Smart Mailbox detected a new event:\n\n\
             Device: {}\n\
             Status: {}\n\
             Battery: {}\n",
            device_name,
            reading.status_label,
            reading.battery_text(),
        );
        if let Some(p) = reading.battery_percent.filter(|p| *p < self.low_battery_percent) {
            body.push_str(&format!("⚠️ Low battery ({}%): replace or recharge soon.\n", p));
        }
        body.push_str(&format!(
            "Time: {}\n\nView Dashboard: {}",
            reading.observed_at, self.dashboard_url
        ));

        Notification {
            device_id: reading.device_id,
            subject: format!("📬 Mailbox Alert: {}", reading.status_label),
            body,
            recipients: recipients.to_vec(),
        }
    }
}
