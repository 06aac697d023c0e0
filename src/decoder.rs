//! ==============================================================================
//! decoder.rs - uplink frame decoder
//! ==============================================================================
//!
//! purpose:
//!     turns the base64 `frm_payload` of an uplink into a `Reading`.
//!
//! frame layout:
//!
//!     ┌────────┬────────┬──────────┬───────────┐
//!     │ byte 0 │ byte 1 │ byte 2   │ byte 3    │
//!     │ device │ status │ type tag │ battery % │
//!     └────────┴────────┴──────────┴───────────┘
//!
//!     only bytes 0-1 are mandatory. firmware generations disagree on how
//!     byte 0 is encoded, on the status table and on when byte 3 is a battery
//!     value, so each generation is a `WireRevision` with its own rules.
//!
//! failure model:
//!     - envelope not base64, or shorter than 2 bytes -> DecodeError
//!     - unknown status code -> "Unknown: 0xHH" label, not an error
//!     - missing / out of range battery -> None, not an error
//!
//! relationships:
//!     - used by: pipeline.rs (decode happens before the state lock is taken)
//!     - produces: domain::Reading
//!
//! ==============================================================================

use crate::domain::Reading;

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use thiserror::Error;

/// battery sentinel used in byte 2 by legacy firmware
const LEGACY_BATTERY_TAG: u8 = 0x08;

const UNKNOWN_STATUS_COLOR: &str = "orange";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// one row of a status lookup table
#[derive(Debug, Clone, Copy)]
pub struct StatusEntry {
    pub code: u8,
    pub label: &'static str,
    pub color: &'static str,
}

const LEGACY_STATUSES: &[StatusEntry] = &[
    StatusEntry { code: 0x04, label: "⚠️ TAMPERING DETECTED", color: "red" },
    StatusEntry { code: 0x05, label: "📬 NEW MAIL!", color: "green" },
    StatusEntry { code: 0x06, label: "📭 No Mail", color: "blue" },
    StatusEntry { code: 0x07, label: "✅ System Ready", color: "purple" },
];

const TIERED_STATUSES: &[StatusEntry] = &[
    StatusEntry { code: 0x04, label: "⚠️ TAMPERING DETECTED", color: "red" },
    StatusEntry { code: 0x05, label: "📬 Heavy Mail", color: "green" },
    StatusEntry { code: 0x06, label: "📬 Medium Mail", color: "green" },
    StatusEntry { code: 0x07, label: "📬 Light Mail", color: "green" },
    StatusEntry { code: 0x08, label: "📭 No Mail", color: "blue" },
];

/// firmware generation of the sending unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRevision {
    /// raw device byte, single "new mail" status, battery only behind the 0x08 tag
    Legacy,
    /// hex-as-decimal device byte, mail weight tiers, battery at byte 3 whenever present
    #[default]
    Tiered,
}

impl WireRevision {
    pub fn status_table(self) -> &'static [StatusEntry] {
        match self {
            WireRevision::Legacy => LEGACY_STATUSES,
            WireRevision::Tiered => TIERED_STATUSES,
        }
    }

    /// tiered firmware writes the unit number as hex digits (unit 33 -> 0x33),
    /// so the hex string is read back as decimal. non-decimal digits fall back
    /// to the raw byte.
    pub fn device_id(self, byte: u8) -> u8 {
        match self {
            WireRevision::Legacy => byte,
            WireRevision::Tiered => format!("{:02x}", byte).parse().unwrap_or(byte),
        }
    }

    pub fn battery(self, bytes: &[u8]) -> Option<u8> {
        let percent = match self {
            WireRevision::Legacy => match bytes {
                [_, _, LEGACY_BATTERY_TAG, value, ..] => *value,
                _ => return None,
            },
            WireRevision::Tiered => *bytes.get(3)?,
        };
        (percent <= 100).then_some(percent)
    }

    pub fn status(self, code: u8) -> (String, String) {
        match self.status_table().iter().find(|s| s.code == code) {
            Some(entry) => (entry.label.to_string(), entry.color.to_string()),
            None => (format!("Unknown: 0x{:02X}", code), UNKNOWN_STATUS_COLOR.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    revision: WireRevision,
}

impl Decoder {
    pub fn new(revision: WireRevision) -> Self {
        Self { revision }
    }

    /// decode one envelope; `observed_at` is stamped onto the reading as is
    pub fn decode(
        &self,
        envelope: &str,
        observed_at: impl Into<String>,
    ) -> Result<Reading, DecodeError> {
        let bytes = general_purpose::STANDARD
            .decode(envelope.trim())
            .map_err(|e| DecodeError::MalformedEnvelope(format!("invalid base64: {}", e)))?;

        if bytes.len() < 2 {
            return Err(DecodeError::MalformedEnvelope(format!(
                "frame too short: {} byte(s), need at least 2",
                bytes.len()
            )));
        }

        let (status_label, status_color) = self.revision.status(bytes[1]);

        Ok(Reading {
            device_id: self.revision.device_id(bytes[0]),
            status_code: bytes[1],
            status_label,
            status_color,
            battery_percent: self.revision.battery(&bytes),
            observed_at: observed_at.into(),
        })
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_tiered_full_frame() {
        let decoder = Decoder::new(WireRevision::Tiered);
        let reading = decoder
            .decode(&envelope(&[0x21, 0x05, 0x08, 0x4B]), "2024-05-01T12:00:00Z")
            .unwrap();

        assert_eq!(reading.device_id, 21);
        assert_eq!(reading.status_code, 0x05);
        assert_eq!(reading.status_label, "📬 Heavy Mail");
        assert_eq!(reading.status_color, "green");
        assert_eq!(reading.battery_percent, Some(75));
        assert_eq!(reading.observed_at, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_decode_is_deterministic() {
        let decoder = Decoder::default();
        let env = envelope(&[0x33, 0x07, 0x09, 0x10]);
        let a = decoder.decode(&env, "t").unwrap();
        let b = decoder.decode(&env, "t").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_device_id_rules() {
        assert_eq!(WireRevision::Tiered.device_id(0x33), 33);
        assert_eq!(WireRevision::Tiered.device_id(0x05), 5);
        // "3a" is not decimal
        assert_eq!(WireRevision::Tiered.device_id(0x3A), 0x3A);
        assert_eq!(WireRevision::Legacy.device_id(0x33), 0x33);
    }

    #[test]
    fn test_one_byte_frame_is_malformed() {
        let decoder = Decoder::default();
        let err = decoder.decode(&envelope(&[0x33]), "t").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let decoder = Decoder::default();
        let err = decoder.decode("not base64!!", "t").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_unknown_status_is_not_an_error() {
        let decoder = Decoder::default();
        let reading = decoder.decode(&envelope(&[0x33, 0x0F]), "t").unwrap();
        assert!(reading.status_label.contains("Unknown"));
        assert!(reading.status_label.contains("0x0F"));
        assert_eq!(reading.status_color, "orange");
        assert_eq!(reading.battery_percent, None);
    }

    #[test]
    fn test_tiered_battery_needs_four_bytes() {
        let decoder = Decoder::new(WireRevision::Tiered);
        let reading = decoder.decode(&envelope(&[0x33, 0x08, 0x09]), "t").unwrap();
        assert_eq!(reading.status_label, "📭 No Mail");
        assert_eq!(reading.battery_percent, None);
    }

    #[test]
    fn test_battery_out_of_range_is_absent() {
        let decoder = Decoder::new(WireRevision::Tiered);
        let reading = decoder.decode(&envelope(&[0x33, 0x05, 0x09, 0xC8]), "t").unwrap();
        assert_eq!(reading.battery_percent, None);
    }

    #[test]
    fn test_legacy_battery_requires_sentinel() {
        let decoder = Decoder::new(WireRevision::Legacy);

        let tagged = decoder.decode(&envelope(&[0x33, 0x05, 0x08, 0x40]), "t").unwrap();
        assert_eq!(tagged.device_id, 0x33);
        assert_eq!(tagged.status_label, "📬 NEW MAIL!");
        assert_eq!(tagged.battery_percent, Some(64));

        let untagged = decoder.decode(&envelope(&[0x33, 0x05, 0x09, 0x40]), "t").unwrap();
        assert_eq!(untagged.battery_percent, None);
    }

    #[test]
    fn test_legacy_status_table() {
        let decoder = Decoder::new(WireRevision::Legacy);
        let ready = decoder.decode(&envelope(&[0x01, 0x07]), "t").unwrap();
        assert_eq!(ready.status_label, "✅ System Ready");
        assert_eq!(ready.status_color, "purple");

        let no_mail = decoder.decode(&envelope(&[0x01, 0x06]), "t").unwrap();
        assert_eq!(no_mail.status_label, "📭 No Mail");

        let unknown = decoder.decode(&envelope(&[0x01, 0x08]), "t").unwrap();
        assert_eq!(unknown.status_label, "Unknown: 0x08");
    }
}
