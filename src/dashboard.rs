//! ==============================================================================
//! dashboard.rs - current status + recent activity
//! ==============================================================================
//!
//! purpose:
//!     holds what the dashboard shows: the latest reading with its display
//!     fields, and a bounded most-recent-first history.
//!
//! relationships:
//!     - owned by: pipeline.rs (inside the shared Monitor, behind the RwLock)
//!     - read by: server.rs (via snapshot clones for html and json)
//!
//! ==============================================================================

use crate::domain::{BatteryBand, Reading};

use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CurrentStatus {
    pub device_name: String,
    pub status_label: String,
    pub status_color: String,
    pub battery_percent: Option<u8>,
    pub battery_text: String,
    pub battery_band: BatteryBand,
    pub battery_color: String,
    pub time: String,
}

impl Default for CurrentStatus {
    fn default() -> Self {
        Self {
            device_name: "Unknown device".to_string(),
            status_label: "Waiting for data...".to_string(),
            status_color: "gray".to_string(),
            battery_percent: None,
            battery_text: "N/A".to_string(),
            battery_band: BatteryBand::Unknown,
            battery_color: BatteryBand::Unknown.color().to_string(),
            time: "Never".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub time: String,
    pub status_label: String,
    pub status_color: String,
    pub device_name: String,
    pub battery_text: String,
}

/// point-in-time copy handed to readers
#[derive(Clone, Debug, Serialize, Default)]
pub struct DashboardSnapshot {
    pub current: CurrentStatus,
    /// most recent first
    pub history: Vec<HistoryEntry>,
}

pub struct DashboardStore {
    current: CurrentStatus,
    history: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl DashboardStore {
    /// `capacity` is clamped to at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            current: CurrentStatus::default(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// last write wins; `observed_at` is not compared against the current one
    pub fn apply(&mut self, reading: &Reading, device_name: &str) {
        let time = clean_time(&reading.observed_at);
        let band = reading.battery_band();
        let battery_text = reading.battery_text();

        self.current = CurrentStatus {
            device_name: device_name.to_string(),
            status_label: reading.status_label.clone(),
            status_color: reading.status_color.clone(),
            battery_percent: reading.battery_percent,
            battery_text: battery_text.clone(),
            battery_band: band,
            battery_color: band.color().to_string(),
            time: time.clone(),
        };

        if self.history.len() == self.capacity {
            self.history.pop_back();
        }
        self.history.push_front(HistoryEntry {
            time,
            status_label: reading.status_label.clone(),
            status_color: reading.status_color.clone(),
            device_name: device_name.to_string(),
            battery_text,
        });
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            current: self.current.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// "2024-05-01T12:34:56.789Z" -> "12:34:56"; anything without a 'T' is kept as is
pub fn clean_time(timestamp: &str) -> String {
    match timestamp.split_once('T') {
        Some((_, clock)) => {
            let clock = clock.split('.').next().unwrap_or(clock);
            let clock = clock.split(['+', '-', 'Z']).next().unwrap_or(clock);
            if clock.is_empty() {
                timestamp.to_string()
            } else {
                clock.to_string()
            }
        }
        None => timestamp.to_string(),
    }
}
