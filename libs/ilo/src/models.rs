//! Redfish payloads and fan command types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Lowest fan speed, in percent, the panel will ever pin a channel to
pub const MIN_FAN_PERCENT: u8 = 10;
/// Highest fan speed, in percent
pub const MAX_FAN_PERCENT: u8 = 100;

/// Shell command handing every fan channel back to the controller
pub const UNLOCK_ALL_COMMAND: &str = "fan p global unlock";

/// Requested speed for each fan channel, in channel order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanSpeedRequest {
    pub fans: Vec<u8>,
}

impl FanSpeedRequest {
    pub fn new(fans: Vec<u8>) -> Self {
        Self { fans }
    }

    /// Check every percentage against the supported range
    pub fn out_of_range(&self) -> Vec<(usize, u8)> {
        self.fans
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, percent)| !(MIN_FAN_PERCENT..=MAX_FAN_PERCENT).contains(percent))
            .collect()
    }

    /// One lock command per channel
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.fans
            .iter()
            .enumerate()
            .map(|(channel, &percent)| DeviceCommand::lock(channel, percent))
            .collect()
    }
}

/// Pin a single fan channel to a raw PWM value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCommand {
    pub channel: usize,
    pub raw_value: u8,
}

impl DeviceCommand {
    pub fn lock(channel: usize, percent: u8) -> Self {
        Self {
            channel,
            raw_value: percent_to_raw(percent),
        }
    }

    /// The command line understood by the iLO shell
    pub fn to_shell(&self) -> String {
        format!("fan p {} lock {}", self.channel, self.raw_value)
    }
}

/// Scale a percentage onto the controller's 0..=255 range, rounding half up
///
/// Percentages above 100 saturate at 255.
pub fn percent_to_raw(percent: u8) -> u8 {
    let scaled = (u32::from(percent) * 255 + 50) / 100;
    u8::try_from(scaled).unwrap_or(u8::MAX)
}

/// Body of `GET /redfish/v1/chassis/1/Thermal`; only the fan list is kept
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThermalResponse {
    #[serde(rename = "Fans", default)]
    pub fans: Option<Vec<FanReading>>,
}

/// A single fan entry as reported by the controller
///
/// Fields the panel does not interpret are kept in `extra` so the reading is
/// handed back to clients exactly as the controller sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FanReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_reading: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oem: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FanStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_percent_to_raw_boundaries() {
        assert_eq!(percent_to_raw(10), 26);
        assert_eq!(percent_to_raw(50), 128);
        assert_eq!(percent_to_raw(100), 255);
    }

    #[test]
    fn test_percent_to_raw_stays_in_range() {
        for percent in MIN_FAN_PERCENT..=MAX_FAN_PERCENT {
            let raw = percent_to_raw(percent);
            assert!((26..=255).contains(&raw), "{percent}% mapped to {raw}");
        }
        assert_eq!(percent_to_raw(u8::MAX), u8::MAX);
    }

    #[test]
    fn test_commands_follow_channel_order() {
        let request = FanSpeedRequest::new(vec![50, 60, 70]);
        let commands: Vec<String> = request.commands().iter().map(DeviceCommand::to_shell).collect();
        assert_eq!(
            commands,
            vec!["fan p 0 lock 128", "fan p 1 lock 153", "fan p 2 lock 179"]
        );
    }

    #[test]
    fn test_out_of_range_reports_positions() {
        let request = FanSpeedRequest::new(vec![5, 50, 150]);
        assert_eq!(request.out_of_range(), vec![(0, 5), (2, 150)]);
        assert!(FanSpeedRequest::default().out_of_range().is_empty());
    }

    #[test]
    fn test_fan_reading_keeps_device_fields() {
        let raw = json!({
            "FanName": "Fan 1",
            "CurrentReading": 15,
            "Units": "Percent",
            "Status": { "Health": "OK", "State": "Enabled" },
            "Oem": { "Hp": { "Location": "System", "Type": "Fan" } },
            "PhysicalContext": "SystemBoard"
        });

        let reading: FanReading = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(reading.fan_name.as_deref(), Some("Fan 1"));
        assert_eq!(serde_json::to_value(&reading).unwrap(), raw);
    }

    #[test]
    fn test_thermal_response_without_fans() {
        let empty: ThermalResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.fans.is_none());

        let null: ThermalResponse = serde_json::from_value(json!({ "Fans": null })).unwrap();
        assert!(null.fans.is_none());
    }
}
