use serde::{Deserialize, Serialize};

/// a fully decoded uplink from one mailbox unit
///
/// produced only by `Decoder::decode`; there is no partially filled variant.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Reading {
    /// unit identity from byte 0 (see `WireRevision::device_id`)
    pub device_id: u8,

    /// raw status byte
    pub status_code: u8,

    /// human readable status, e.g. "📬 Heavy Mail" or "Unknown: 0x0F"
    pub status_label: String,

    /// css color name for the status box
    pub status_color: String,

    /// battery level 0-100, `None` when the frame carries no battery segment
    pub battery_percent: Option<u8>,

    /// network `received_at`, or the server receipt time when absent
    pub observed_at: String,
}

impl Reading {
    pub fn battery_band(&self) -> BatteryBand {
        BatteryBand::from_percent(self.battery_percent)
    }

    pub fn battery_text(&self) -> String {
        match self.battery_percent {
            Some(p) => format!("{}%", p),
            None => "N/A".to_string(),
        }
    }
}

/// color band for the battery indicator
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatteryBand {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl BatteryBand {
    /// `> 60` healthy, `21..=60` warning, `<= 20` critical
    pub fn from_percent(percent: Option<u8>) -> Self {
        match percent {
            Some(p) if p > 60 => BatteryBand::Healthy,
            Some(p) if p > 20 => BatteryBand::Warning,
            Some(_) => BatteryBand::Critical,
            None => BatteryBand::Unknown,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            BatteryBand::Healthy => "green",
            BatteryBand::Warning => "orange",
            BatteryBand::Critical => "red",
            BatteryBand::Unknown => "gray",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_band_boundaries() {
        assert_eq!(BatteryBand::from_percent(Some(100)), BatteryBand::Healthy);
        assert_eq!(BatteryBand::from_percent(Some(61)), BatteryBand::Healthy);
        assert_eq!(BatteryBand::from_percent(Some(60)), BatteryBand::Warning);
        assert_eq!(BatteryBand::from_percent(Some(21)), BatteryBand::Warning);
        assert_eq!(BatteryBand::from_percent(Some(20)), BatteryBand::Critical);
        assert_eq!(BatteryBand::from_percent(Some(0)), BatteryBand::Critical);
        assert_eq!(BatteryBand::from_percent(None), BatteryBand::Unknown);
    }

    #[test]
    fn test_battery_text() {
        let mut reading = Reading {
            device_id: 33,
            status_code: 0x05,
            status_label: "📬 Heavy Mail".to_string(),
            status_color: "green".to_string(),
            battery_percent: Some(75),
            observed_at: "2024-05-01T12:00:00Z".to_string(),
        };
        assert_eq!(reading.battery_text(), "75%");
        assert_eq!(reading.battery_band().color(), "green");

        reading.battery_percent = None;
        assert_eq!(reading.battery_text(), "N/A");
        assert_eq!(reading.battery_band().color(), "gray");
    }
}
