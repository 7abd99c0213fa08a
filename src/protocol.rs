use crate::{
    error::{Result, TaillightError},
    types::{ControlCommand, Device, DeviceStatus, TrackPoint, UserProfile},
};
use serde_json::{json, Map, Value};
use std::fmt;

/// Remote procedures exposed by the cloud-function backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    /// Exchange a login code for a token and profile
    Login,
    /// List devices bound to the account
    DeviceList,
    /// Read the status of one device
    DeviceStatus,
    /// Send a command to one device
    DeviceControl,
    /// Start, extend or end a ride track
    TrackRecord,
    /// Bind a device to the account
    DeviceBind,
    /// Firmware update management
    OtaManagement,
    /// Arm or disarm the anti-theft alert
    AntiTheftAlert,
    /// Riding group management
    GroupManagement,
}

impl Procedure {
    /// Every procedure the client calls
    pub const ALL: [Self; 9] = [
        Self::Login,
        Self::DeviceList,
        Self::DeviceStatus,
        Self::DeviceControl,
        Self::TrackRecord,
        Self::DeviceBind,
        Self::OtaManagement,
        Self::AntiTheftAlert,
        Self::GroupManagement,
    ];

    /// Cloud function name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::DeviceList => "deviceList",
            Self::DeviceStatus => "deviceStatus",
            Self::DeviceControl => "deviceControl",
            Self::TrackRecord => "trackRecord",
            Self::DeviceBind => "deviceBind",
            Self::OtaManagement => "otaManagement",
            Self::AntiTheftAlert => "antiTheftAlert",
            Self::GroupManagement => "groupManagement",
        }
    }

    /// Look up a procedure by its cloud function name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call to the backend: procedure, payload and the message
/// reported when the backend fails without one
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Target procedure
    pub procedure: Procedure,
    /// JSON payload
    pub payload: Value,
    /// Message used when the backend gives none
    pub fallback_message: &'static str,
}

impl Request {
    /// Create a new request
    #[must_use]
    pub const fn new(procedure: Procedure, payload: Value, fallback_message: &'static str) -> Self {
        Self {
            procedure,
            payload,
            fallback_message,
        }
    }

    /// `login{code}`
    #[must_use]
    pub fn login(code: &str) -> Self {
        Self::new(Procedure::Login, json!({ "code": code }), "登录失败")
    }

    /// `deviceList{}`
    #[must_use]
    pub fn device_list() -> Self {
        Self::new(Procedure::DeviceList, json!({}), "获取设备列表失败")
    }

    /// `deviceStatus{deviceId}`
    #[must_use]
    pub fn device_status(device_id: &str) -> Self {
        Self::new(
            Procedure::DeviceStatus,
            json!({ "deviceId": device_id }),
            "获取设备状态失败",
        )
    }

    /// `deviceControl{deviceId, command, value}`
    #[must_use]
    pub fn device_control(device_id: &str, command: ControlCommand) -> Self {
        Self::new(
            Procedure::DeviceControl,
            json!({
                "deviceId": device_id,
                "command": command.name(),
                "value": command.value(),
            }),
            "设备控制失败",
        )
    }

    /// `trackRecord{action: start, deviceId}`
    #[must_use]
    pub fn track_start(device_id: &str) -> Self {
        Self::new(
            Procedure::TrackRecord,
            json!({ "action": "start", "deviceId": device_id }),
            "开始轨迹记录失败",
        )
    }

    /// `trackRecord{action: add_point, trackId, point}`
    #[must_use]
    pub fn track_add_point(track_id: &str, point: &TrackPoint) -> Self {
        Self::new(
            Procedure::TrackRecord,
            json!({
                "action": "add_point",
                "trackId": track_id,
                "point": {
                    "lat": point.lat,
                    "lon": point.lon,
                    "timestamp": point.timestamp.timestamp_millis(),
                },
            }),
            "添加轨迹点失败",
        )
    }

    /// `trackRecord{action: end, trackId}`
    #[must_use]
    pub fn track_end(track_id: &str) -> Self {
        Self::new(
            Procedure::TrackRecord,
            json!({ "action": "end", "trackId": track_id }),
            "结束轨迹记录失败",
        )
    }

    /// `deviceBind{deviceId, name}`
    #[must_use]
    pub fn device_bind(device_id: &str, name: &str) -> Self {
        Self::new(
            Procedure::DeviceBind,
            json!({ "deviceId": device_id, "name": name }),
            "设备绑定失败",
        )
    }

    /// `otaManagement{action: check_update, deviceId}`
    #[must_use]
    pub fn ota_check(device_id: &str) -> Self {
        Self::new(
            Procedure::OtaManagement,
            json!({ "action": "check_update", "deviceId": device_id }),
            "检查OTA更新失败",
        )
    }

    /// `antiTheftAlert{deviceId, enable}`
    #[must_use]
    pub fn anti_theft_alert(device_id: &str, enable: bool) -> Self {
        Self::new(
            Procedure::AntiTheftAlert,
            json!({ "deviceId": device_id, "enable": enable }),
            if enable {
                "开启防盗模式失败"
            } else {
                "关闭防盗模式失败"
            },
        )
    }

    /// `groupManagement{action: create, name, password}`
    #[must_use]
    pub fn group_create(name: &str, password: &str) -> Self {
        Self::new(
            Procedure::GroupManagement,
            json!({ "action": "create", "name": name, "password": password }),
            "创建车队失败",
        )
    }

    /// `groupManagement{action: join, groupId, password}`
    #[must_use]
    pub fn group_join(group_id: &str, password: &str) -> Self {
        Self::new(
            Procedure::GroupManagement,
            json!({ "action": "join", "groupId": group_id, "password": password }),
            "加入车队失败",
        )
    }
}

/// Response shape shared by every procedure: `{success, message?, ...fields}`
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Whether the backend accepted the call
    pub success: bool,
    /// Backend message, mostly present on failure
    pub message: Option<String>,
    /// All other fields of the response
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Parse a raw bridge response
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::MalformedResponse`] if the response is not an
    /// object or has no boolean `success` field.
    pub fn from_value(procedure: Procedure, value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(TaillightError::MalformedResponse {
                procedure: procedure.to_string(),
                reason: "response is not an object".to_string(),
            });
        };

        let success = match fields.remove("success") {
            Some(Value::Bool(success)) => success,
            _ => {
                return Err(TaillightError::MalformedResponse {
                    procedure: procedure.to_string(),
                    reason: "missing boolean `success` field".to_string(),
                })
            }
        };

        let message = match fields.remove("message") {
            Some(Value::String(message)) => Some(message),
            _ => None,
        };

        Ok(Self {
            success,
            message,
            fields,
        })
    }

    /// Turn a failed envelope into a [`TaillightError::Remote`]
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::Remote`] carrying the backend message, or
    /// `fallback` when there is none, if `success` is false.
    pub fn into_result(self, procedure: Procedure, fallback: &str) -> Result<Self> {
        if self.success {
            return Ok(self);
        }

        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        Err(TaillightError::remote(procedure.as_str(), message))
    }

    /// Borrow a response field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a string response field
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Re-assemble the envelope into a JSON object
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut object = self.fields;
        object.insert("success".to_string(), Value::Bool(self.success));
        if let Some(message) = self.message {
            object.insert("message".to_string(), Value::String(message));
        }
        Value::Object(object)
    }
}

/// Extract token and profile from a `login` response
///
/// # Errors
///
/// Returns [`TaillightError::MalformedResponse`] if the token is missing.
pub fn parse_login(envelope: &Envelope) -> Result<(String, UserProfile)> {
    let token = envelope
        .str_field("token")
        .ok_or_else(|| TaillightError::MalformedResponse {
            procedure: Procedure::Login.to_string(),
            reason: "missing `token`".to_string(),
        })?
        .to_string();

    let user = envelope
        .field("userInfo")
        .or_else(|| envelope.field("user"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok((token, UserProfile(user)))
}

/// Extract the device list from a `deviceList` response
///
/// A response without `devices` is an empty list.
///
/// # Errors
///
/// Returns [`TaillightError::Json`] if an entry is not a device record.
pub fn parse_device_list(envelope: &Envelope) -> Result<Vec<Device>> {
    match envelope.field("devices") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(devices) => Ok(serde_json::from_value(devices.clone())?),
    }
}

/// Extract the status snapshot from a `deviceStatus` response
///
/// # Errors
///
/// Returns [`TaillightError::MalformedResponse`] if `data` is missing, or
/// [`TaillightError::Json`] if it is not a status record.
pub fn parse_device_status(envelope: &Envelope) -> Result<DeviceStatus> {
    let data = envelope
        .field("data")
        .ok_or_else(|| TaillightError::MalformedResponse {
            procedure: Procedure::DeviceStatus.to_string(),
            reason: "missing `data`".to_string(),
        })?;
    Ok(serde_json::from_value(data.clone())?)
}

/// Extract the track identifier from a `trackRecord` start response
///
/// # Errors
///
/// Returns [`TaillightError::MalformedResponse`] if `trackId` is missing.
pub fn parse_track_id(envelope: &Envelope) -> Result<String> {
    envelope
        .str_field("trackId")
        .map(ToString::to_string)
        .ok_or_else(|| TaillightError::MalformedResponse {
            procedure: Procedure::TrackRecord.to_string(),
            reason: "missing `trackId`".to_string(),
        })
}
