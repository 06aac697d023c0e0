//! device id -> display name and alert recipients. read-only after startup.

use crate::config::DeviceConfig;

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub name: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    devices: HashMap<u8, DeviceEntry>,
}

impl DeviceDirectory {
    pub fn from_config(devices: &[DeviceConfig]) -> Self {
        let devices = devices
            .iter()
            .map(|d| {
                let recipients = d
                    .recipients
                    .iter()
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect();
                (d.id, DeviceEntry { name: d.name.clone(), recipients })
            })
            .collect();
        Self { devices }
    }

    /// configured name, or "Device ID: N" for unmapped units
    pub fn display_name(&self, device_id: u8) -> String {
        match self.devices.get(&device_id) {
            Some(entry) if !entry.name.trim().is_empty() => entry.name.clone(),
            _ => format!("Device ID: {}", device_id),
        }
    }

    /// empty when the unit is unmapped or has nobody to notify
    pub fn recipients(&self, device_id: u8) -> &[String] {
        self.devices
            .get(&device_id)
            .map(|e| e.recipients.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> DeviceDirectory {
        DeviceDirectory::from_config(&[
            DeviceConfig {
                id: 33,
                name: "Front Gate".to_string(),
                recipients: vec!["a@example.com".to_string(), "  ".to_string()],
            },
            DeviceConfig { id: 7, name: "".to_string(), recipients: vec![] },
        ])
    }

    #[test]
    fn test_known_device() {
        let dir = directory();
        assert_eq!(dir.display_name(33), "Front Gate");
        assert_eq!(dir.recipients(33), ["a@example.com".to_string()]);
    }

    #[test]
    fn test_unmapped_device_gets_synthesized_name() {
        let dir = directory();
        assert_eq!(dir.display_name(21), "Device ID: 21");
        assert!(dir.recipients(21).is_empty());
    }

    #[test]
    fn test_blank_name_falls_back() {
        let dir = directory();
        assert_eq!(dir.display_name(7), "Device ID: 7");
        assert!(dir.recipients(7).is_empty());
    }
}
