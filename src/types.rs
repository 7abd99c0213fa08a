use crate::error::TaillightError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr, time::Duration};

/// Brightness shown before the device has reported one
pub const DEFAULT_BRIGHTNESS: u8 = 80;

/// Light pattern of the tail-light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightMode {
    /// Constant light
    #[default]
    Solid,
    /// Slow fade in and out
    Breath,
    /// Running light along the LED strip
    Flow,
}

impl LightMode {
    /// Every mode, in the order the control page lists them
    pub const ALL: [Self; 3] = [Self::Solid, Self::Breath, Self::Flow];

    /// Identifier used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Breath => "breath",
            Self::Flow => "flow",
        }
    }

    /// Label shown to the rider
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Solid => "常亮",
            Self::Breath => "呼吸灯",
            Self::Flow => "流水灯",
        }
    }

    /// Icon shown next to the label
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Solid => "💡",
            Self::Breath => "🌬️",
            Self::Flow => "💧",
        }
    }

    /// Accent color of the mode button
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Solid => "#ff4444",
            Self::Breath => "#ff8844",
            Self::Flow => "#44aa44",
        }
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LightMode {
    type Err = TaillightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solid" => Ok(Self::Solid),
            "breath" => Ok(Self::Breath),
            "flow" => Ok(Self::Flow),
            other => Err(TaillightError::InvalidParameters(format!(
                "unknown light mode: {other}"
            ))),
        }
    }
}

/// Snapshot of a tail-light as last reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// Battery level in percent
    #[serde(default, deserialize_with = "battery_level")]
    pub battery: u8,
    /// Housing temperature in Celsius
    #[serde(default, deserialize_with = "null_as_default")]
    pub temperature: f32,
    /// Active light pattern
    #[serde(default, deserialize_with = "null_as_default")]
    pub mode: LightMode,
    /// LED brightness in percent
    #[serde(default = "default_brightness", deserialize_with = "brightness_level")]
    pub brightness: u8,
    /// Anti-theft alarm armed
    #[serde(default, deserialize_with = "null_as_default")]
    pub anti_theft: bool,
    /// Device reachable by the backend
    #[serde(default, deserialize_with = "null_as_default")]
    pub online: bool,
}

const fn default_brightness() -> u8 {
    DEFAULT_BRIGHTNESS
}

// Devices report null for fields they have not measured yet
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?
        .filter(|level| level.is_finite())
        .map(|level| level.round().clamp(0.0, 100.0) as u8))
}

fn battery_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(percent(deserializer)?.unwrap_or(0))
}

fn brightness_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(percent(deserializer)?.unwrap_or(DEFAULT_BRIGHTNESS))
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            battery: 0,
            temperature: 0.0,
            mode: LightMode::Solid,
            brightness: DEFAULT_BRIGHTNESS,
            anti_theft: false,
            online: false,
        }
    }
}

/// A tail-light bound to the current account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Identifier of the form `bike_light_` + 6-12 alphanumerics
    pub device_id: String,
    /// Rider-chosen name
    #[serde(default)]
    pub name: String,
    /// When the device was bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_at: Option<DateTime<Utc>>,
}

impl Device {
    /// Create a device record
    pub fn new(device_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            bound_at: None,
        }
    }
}

/// Profile record returned by the login procedure
///
/// The client never looks inside it; it is cached and handed back to pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(pub Value);

/// Login state of the client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Whether a token and profile are present
    pub logged_in: bool,
    /// Cached profile
    pub user: Option<UserProfile>,
    /// Access token issued by the login procedure
    pub token: Option<String>,
}

/// One GPS fix of a ride
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Time of the fix
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    /// Create a point stamped with the current time
    #[must_use]
    pub fn now(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            timestamp: Utc::now(),
        }
    }
}

/// Ride recording state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// Nothing is being recorded
    #[default]
    Idle,
    /// A track is open on the backend
    Active {
        /// Identifier issued by the backend
        track_id: String,
    },
}

impl TrackingState {
    /// Whether a track is open
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Identifier of the open track
    #[must_use]
    pub fn track_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Active { track_id } => Some(track_id),
        }
    }
}

/// Backend summary of a closed track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    /// Identifier of the closed track
    pub track_id: String,
    /// Remaining fields of the backend response
    pub details: Map<String, Value>,
}

impl TrackSummary {
    /// Total distance in meters, when the backend reported one
    #[must_use]
    pub fn distance_m(&self) -> Option<f64> {
        self.details.get("distance").and_then(Value::as_f64)
    }

    /// Ride duration in seconds, when the backend reported one
    #[must_use]
    pub fn duration_s(&self) -> Option<f64> {
        self.details.get("duration").and_then(Value::as_f64)
    }
}

/// Command sent to a tail-light through `deviceControl`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Switch light pattern
    SetMode(LightMode),
    /// Set brightness in percent
    SetBrightness(u8),
    /// Arm or disarm the anti-theft alarm
    AntiTheft(bool),
    /// Flash the brake light once
    Brake,
}

impl ControlCommand {
    /// Command name on the wire
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetMode(_) => "set_mode",
            Self::SetBrightness(_) => "set_brightness",
            Self::AntiTheft(_) => "antitheft",
            Self::Brake => "brake",
        }
    }

    /// Command value on the wire
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::SetMode(mode) => Value::from(mode.as_str()),
            Self::SetBrightness(level) => Value::from(*level),
            Self::AntiTheft(enabled) => Value::from(*enabled),
            Self::Brake => Value::from(""),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name(), self.value())
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Cloud environment the host bridge is initialized with
    pub cloud_env: String,
    /// Status polling interval of the control page in milliseconds
    pub poll_interval_ms: u64,
    /// Simulated discovery delay of the list page in milliseconds
    pub scan_delay_ms: u64,
    /// Name given to devices bound from the list page
    pub default_device_name: String,
    /// Client version reported in logs
    pub version: String,
}

impl ClientConfig {
    /// Polling interval as a [`Duration`]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Discovery delay as a [`Duration`]
    #[must_use]
    pub const fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cloud_env: String::new(),
            poll_interval_ms: 5_000,
            scan_delay_ms: 2_000,
            default_device_name: "我的自行车尾灯".to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_light_mode_from_str() {
        assert_eq!("solid".parse::<LightMode>().unwrap(), LightMode::Solid);
        assert_eq!("breath".parse::<LightMode>().unwrap(), LightMode::Breath);
        assert_eq!("flow".parse::<LightMode>().unwrap(), LightMode::Flow);
        assert!("strobe".parse::<LightMode>().is_err());
    }

    #[test]
    fn test_device_status_fallbacks() {
        let status: DeviceStatus =
            serde_json::from_value(json!({"battery": 64, "mode": "flow", "online": true})).unwrap();

        assert_eq!(status.battery, 64);
        assert_eq!(status.mode, LightMode::Flow);
        assert_eq!(status.brightness, DEFAULT_BRIGHTNESS);
        assert!(!status.anti_theft);
        assert!(status.online);
    }

    #[test]
    fn test_device_status_tolerates_nulls_and_fractions() {
        let status: DeviceStatus = serde_json::from_value(json!({
            "battery": 77.5, "temperature": null, "mode": null,
            "brightness": null, "antiTheft": null, "online": true
        }))
        .unwrap();

        assert_eq!(status.battery, 78);
        assert_eq!(status.mode, LightMode::Solid);
        assert_eq!(status.brightness, DEFAULT_BRIGHTNESS);
        assert!(!status.anti_theft);

        let status: DeviceStatus =
            serde_json::from_value(json!({"battery": 140, "brightness": -3.2})).unwrap();
        assert_eq!(status.battery, 100);
        assert_eq!(status.brightness, 0);
    }

    #[test]
    fn test_device_wire_names() {
        let device: Device = serde_json::from_value(json!({
            "deviceId": "bike_light_ab12cd",
            "name": "通勤车",
            "boundAt": "2024-05-01T08:30:00Z"
        }))
        .unwrap();

        assert_eq!(device.device_id, "bike_light_ab12cd");
        assert_eq!(device.name, "通勤车");
        assert!(device.bound_at.is_some());

        let encoded = serde_json::to_value(Device::new("bike_light_ab12cd", "x")).unwrap();
        assert_eq!(encoded, json!({"deviceId": "bike_light_ab12cd", "name": "x"}));
    }

    #[test]
    fn test_control_command_wire_form() {
        assert_eq!(ControlCommand::SetMode(LightMode::Breath).name(), "set_mode");
        assert_eq!(ControlCommand::SetMode(LightMode::Breath).value(), json!("breath"));
        assert_eq!(ControlCommand::SetBrightness(40).value(), json!(40));
        assert_eq!(ControlCommand::AntiTheft(true).name(), "antitheft");
        assert_eq!(ControlCommand::Brake.value(), json!(""));
    }

    #[test]
    fn test_tracking_state() {
        let idle = TrackingState::Idle;
        assert!(!idle.is_active());
        assert_eq!(idle.track_id(), None);

        let active = TrackingState::Active {
            track_id: "track_1".to_string(),
        };
        assert!(active.is_active());
        assert_eq!(active.track_id(), Some("track_1"));
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.scan_delay(), Duration::from_secs(2));
        assert_eq!(config.default_device_name, "我的自行车尾灯");

        let partial: ClientConfig =
            serde_json::from_value(json!({"poll_interval_ms": 1000})).unwrap();
        assert_eq!(partial.poll_interval(), Duration::from_secs(1));
        assert_eq!(partial.scan_delay_ms, 2_000);
    }
}
