//! ==============================================================================
//! pipeline.rs - per-uplink processing
//! ==============================================================================
//!
//! purpose:
//!     runs one uplink through decode -> dashboard -> alert gate -> notifier.
//!
//! locking:
//!
//!     decode (no lock, pure)
//!        │
//!        ▼
//!     ┌──────────── write guard ────────────┐
//!     │ dashboard.apply  ->  gate.evaluate  │
//!     └──────────────────┬──────────────────┘
//!                        │ guard dropped
//!                        ▼
//!     notifier.deliver (may be slow, never holds the lock)
//!
//!     dashboard and cooldown table share ONE RwLock so two identical frames
//!     racing inside the cooldown window cannot both be approved.
//!
//! relationships:
//!     - used by: server.rs (POST / handler, GET / and /api/status reads)
//!     - uses: decoder.rs, dashboard.rs, alerts.rs, directory.rs, notifier.rs
//!
//! ==============================================================================

use crate::alerts::{AlertGate, GateDecision, NotificationOutcome};
use crate::dashboard::{DashboardSnapshot, DashboardStore};
use crate::decoder::{DecodeError, Decoder};
use crate::directory::DeviceDirectory;
use crate::domain::Reading;
use crate::notifier::Notifier;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// body posted by the network server for each uplink
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UplinkRequest {
    #[serde(default)]
    pub uplink_message: UplinkMessage,
    #[serde(default)]
    pub received_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UplinkMessage {
    #[serde(default)]
    pub frm_payload: Option<String>,
}

/// mutable state shared by all requests
pub struct Monitor {
    pub dashboard: DashboardStore,
    pub gate: AlertGate,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub reading: Reading,
    pub device_name: String,
    pub outcome: NotificationOutcome,
}

#[derive(Clone)]
pub struct Pipeline {
    decoder: Decoder,
    directory: Arc<DeviceDirectory>,
    monitor: Arc<RwLock<Monitor>>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        decoder: Decoder,
        directory: Arc<DeviceDirectory>,
        monitor: Monitor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { decoder, directory, monitor: Arc::new(RwLock::new(monitor)), notifier }
    }

    /// `Ok(None)` when the uplink carries no payload (nothing to do)
    pub async fn handle_uplink(
        &self,
        request: &UplinkRequest,
    ) -> Result<Option<IngestReport>, DecodeError> {
        let payload = match request.uplink_message.frm_payload.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => {
                info!("[UPLINK] No frm_payload, ignoring");
                return Ok(None);
            }
        };
        let now = Utc::now();
        let observed_at = request
            .received_at
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true));

        self.ingest(payload, observed_at, now).await.map(Some)
    }

    /// decode, record and maybe alert. a decode failure leaves all state untouched.
    pub async fn ingest(
        &self,
        envelope: &str,
        observed_at: String,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, DecodeError> {
        let reading = self.decoder.decode(envelope, observed_at).map_err(|e| {
            warn!("[UPLINK] Dropping frame: {}", e);
            e
        })?;

        let device_name = self.directory.display_name(reading.device_id);
        let recipients = self.directory.recipients(reading.device_id);

        let decision = {
            let mut monitor = self.monitor.write().await;
            monitor.dashboard.apply(&reading, &device_name);
            monitor.gate.evaluate(&reading, &device_name, recipients, now)
        };

        let outcome = match decision {
            GateDecision::Dispatch(notification) => {
                if let Err(e) = self.notifier.deliver(&notification).await {
                    error!(device_id = reading.device_id, "[ALERT] Delivery failed: {:#}", e);
                }
                NotificationOutcome::Sent
            }
            GateDecision::Skip(outcome) => outcome,
        };

        info!(
            device_id = reading.device_id,
            battery = ?reading.battery_percent,
            outcome = ?outcome,
            "[UPLINK] {} -> {}",
            device_name,
            reading.status_label
        );

        Ok(IngestReport { reading, device_name, outcome })
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.monitor.read().await.dashboard.snapshot()
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Notification, DEFAULT_COOLDOWN_MINUTES, DEFAULT_LOW_BATTERY_PERCENT};
    use crate::config::DeviceConfig;
    use crate::decoder::WireRevision;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use base64::{engine::general_purpose, Engine as _};
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _notification: &Notification) -> anyhow::Result<()> {
            Err(anyhow!("smtp down"))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn directory() -> Arc<DeviceDirectory> {
        Arc::new(DeviceDirectory::from_config(&[
            DeviceConfig {
                id: 21,
                name: "Front Gate".to_string(),
                recipients: vec!["a@example.com".to_string()],
            },
            DeviceConfig { id: 33, name: "Back Door".to_string(), recipients: vec![] },
        ]))
    }

    fn pipeline(notifier: Arc<dyn Notifier>) -> Pipeline {
        let monitor = Monitor {
            dashboard: DashboardStore::new(10),
            gate: AlertGate::new(
                Duration::minutes(DEFAULT_COOLDOWN_MINUTES as i64),
                "https://mailbox.example.com",
                DEFAULT_LOW_BATTERY_PERCENT,
            ),
        };
        Pipeline::new(Decoder::new(WireRevision::Tiered), directory(), monitor, notifier)
    }

    fn envelope(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn test_mail_frame_sends_once_within_cooldown() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(notifier.clone());
        let frame = envelope(&[0x21, 0x05, 0x08, 0x4B]);

        let first = pipeline
            .ingest(&frame, "2024-05-01T12:00:00Z".to_string(), t0())
            .await
            .unwrap();
        assert_eq!(first.reading.device_id, 21);
        assert_eq!(first.device_name, "Front Gate");
        assert_eq!(first.reading.battery_percent, Some(75));
        assert_eq!(first.outcome, NotificationOutcome::Sent);

        let second = pipeline
            .ingest(&frame, "2024-05-01T12:05:00Z".to_string(), t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(second.outcome, NotificationOutcome::SuppressedCooldown);

        {
            let sent = notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].recipients, vec!["a@example.com".to_string()]);
        }

        let snap = pipeline.snapshot().await;
        assert_eq!(snap.current.battery_color, "green");
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.history[0].time, "12:05:00");
    }

    #[tokio::test]
    async fn test_malformed_frame_leaves_state_untouched() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(notifier.clone());

        let err = pipeline.ingest(&envelope(&[0x21]), "t".to_string(), t0()).await.unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));

        let snap = pipeline.snapshot().await;
        assert_eq!(snap.current.status_label, "Waiting for data...");
        assert!(snap.history.is_empty());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_recorded_but_not_alerted() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(notifier.clone());

        let frame = envelope(&[0x21, 0x0F]);
        let report = pipeline.ingest(&frame, "t".to_string(), t0()).await.unwrap();
        assert_eq!(report.outcome, NotificationOutcome::SkippedNotAlertable);
        assert!(report.reading.status_label.contains("0x0F"));
        assert_eq!(pipeline.snapshot().await.history.len(), 1);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_device_without_recipients() {
        let pipeline = pipeline(Arc::new(RecordingNotifier::default()));
        let frame = envelope(&[0x33, 0x04]);
        let report = pipeline.ingest(&frame, "t".to_string(), t0()).await.unwrap();
        assert_eq!(report.device_name, "Back Door");
        assert_eq!(report.outcome, NotificationOutcome::SuppressedNoRecipients);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_state_and_cooldown() {
        let pipeline = pipeline(Arc::new(FailingNotifier));
        let frame = envelope(&[0x21, 0x04]);

        let first = pipeline.ingest(&frame, "t".to_string(), t0()).await.unwrap();
        assert_eq!(first.outcome, NotificationOutcome::Sent);
        assert_eq!(pipeline.snapshot().await.current.status_label, "⚠️ TAMPERING DETECTED");

        let retry = pipeline
            .ingest(&frame, "t".to_string(), t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(retry.outcome, NotificationOutcome::SuppressedCooldown);
    }

    #[tokio::test]
    async fn test_concurrent_identical_frames_send_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(notifier.clone());
        let frame = envelope(&[0x21, 0x06, 0x09, 0x50]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            let frame = frame.clone();
            handles.push(tokio::spawn(async move {
                pipeline.ingest(&frame, "t".to_string(), t0()).await.unwrap().outcome
            }));
        }

        let mut sent = 0;
        for handle in handles {
            if handle.await.unwrap() == NotificationOutcome::Sent {
                sent += 1;
            }
        }
        assert_eq!(sent, 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(pipeline.snapshot().await.history.len(), 8);
    }

    #[tokio::test]
    async fn test_handle_uplink_defaults() {
        let pipeline = pipeline(Arc::new(RecordingNotifier::default()));

        let empty = UplinkRequest::default();
        assert!(pipeline.handle_uplink(&empty).await.unwrap().is_none());

        let request: UplinkRequest = serde_json::from_value(serde_json::json!({
            "uplink_message": { "frm_payload": envelope(&[0x21, 0x08]) }
        }))
        .unwrap();
        let report = pipeline.handle_uplink(&request).await.unwrap().unwrap();
        assert_eq!(report.reading.status_label, "📭 No Mail");
        // server-assigned receipt time
        assert!(report.reading.observed_at.contains('T'));
        assert!(report.reading.observed_at.ends_with('Z'));
    }
}
