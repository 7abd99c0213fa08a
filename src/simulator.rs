use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    bridge::RpcBridge,
    error::{Result, TaillightError},
    protocol::Procedure,
    types::{Device, DeviceStatus, LightMode},
    util::{calculate_distance, is_valid_device_id},
};

/// Firmware version reported for newly bound devices
pub const INITIAL_FIRMWARE: &str = "1.0.0";

/// Firmware version offered by the simulated update server
pub const LATEST_FIRMWARE: &str = "1.1.0";

struct RecordedPoint {
    lat: f64,
    lon: f64,
    timestamp_ms: i64,
}

struct Track {
    device_id: String,
    points: Vec<RecordedPoint>,
    started_at: DateTime<Utc>,
    open: bool,
}

struct Group {
    password: String,
    members: u32,
}

#[derive(Default)]
struct CloudState {
    devices: Vec<Device>,
    statuses: HashMap<String, DeviceStatus>,
    firmware: HashMap<String, String>,
    tracks: HashMap<String, Track>,
    groups: HashMap<String, Group>,
    calls: Vec<(String, Value)>,
    failures: HashMap<String, String>,
    unreachable: bool,
}

fn ok(fields: Value) -> Value {
    let mut object = match fields {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.insert("success".to_string(), Value::Bool(true));
    Value::Object(object)
}

fn fail(message: &str) -> Value {
    json!({ "success": false, "message": message })
}

fn str_arg<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}

impl CloudState {
    fn is_bound(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.device_id == device_id)
    }

    fn login(payload: &Value) -> Value {
        match str_arg(payload, "code") {
            Some(code) if !code.is_empty() => ok(json!({
                "token": format!("token_{}", Uuid::new_v4().simple()),
                "userInfo": {
                    "openid": format!("openid_{code}"),
                    "nickName": "骑行者",
                },
            })),
            _ => fail("缺少登录code"),
        }
    }

    fn device_list(&self) -> Value {
        ok(json!({ "devices": self.devices }))
    }

    fn device_status(&self, payload: &Value) -> Value {
        let Some(device_id) = str_arg(payload, "deviceId") else {
            return fail("缺少设备ID");
        };
        match self.statuses.get(device_id) {
            Some(status) => ok(json!({ "data": status })),
            None => fail("设备不存在"),
        }
    }

    fn device_control(&mut self, payload: &Value) -> Value {
        let Some(device_id) = str_arg(payload, "deviceId") else {
            return fail("缺少设备ID");
        };
        let Some(status) = self.statuses.get_mut(device_id) else {
            return fail("设备不存在");
        };
        if !status.online {
            return fail("设备离线");
        }

        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        match str_arg(payload, "command") {
            Some("set_mode") => match value.as_str().map(str::parse::<LightMode>) {
                Some(Ok(mode)) => status.mode = mode,
                _ => return fail("无效的灯光模式"),
            },
            Some("set_brightness") => match value.as_u64().and_then(|v| u8::try_from(v).ok()) {
                Some(level) if level <= 100 => status.brightness = level,
                _ => return fail("亮度超出范围"),
            },
            Some("antitheft") => match value.as_bool() {
                Some(enabled) => status.anti_theft = enabled,
                None => return fail("无效的防盗设置"),
            },
            Some("brake") => debug!("Brake light flashed on {}", device_id),
            _ => return fail("未知命令"),
        }

        ok(json!({}))
    }

    fn track_record(&mut self, payload: &Value) -> Value {
        match str_arg(payload, "action") {
            Some("start") => {
                let Some(device_id) = str_arg(payload, "deviceId") else {
                    return fail("缺少设备ID");
                };
                if !self.is_bound(device_id) {
                    return fail("设备不存在");
                }
                let track_id = format!("track_{}", Uuid::new_v4().simple());
                self.tracks.insert(
                    track_id.clone(),
                    Track {
                        device_id: device_id.to_string(),
                        points: Vec::new(),
                        started_at: Utc::now(),
                        open: true,
                    },
                );
                ok(json!({ "trackId": track_id }))
            }
            Some("add_point") => {
                let Some(track) = str_arg(payload, "trackId").and_then(|id| self.tracks.get_mut(id))
                else {
                    return fail("轨迹不存在");
                };
                if !track.open {
                    return fail("轨迹已结束");
                }
                let point = payload.get("point");
                let coordinate = |name: &str| point.and_then(|p| p.get(name)).and_then(Value::as_f64);
                let (Some(lat), Some(lon)) = (coordinate("lat"), coordinate("lon")) else {
                    return fail("无效的轨迹点");
                };
                let timestamp_ms = point
                    .and_then(|p| p.get("timestamp"))
                    .and_then(Value::as_i64)
                    .unwrap_or_else(|| Utc::now().timestamp_millis());
                track.points.push(RecordedPoint {
                    lat,
                    lon,
                    timestamp_ms,
                });
                ok(json!({ "pointCount": track.points.len() }))
            }
            Some("end") => {
                let Some(track) = str_arg(payload, "trackId").and_then(|id| self.tracks.get_mut(id))
                else {
                    return fail("轨迹不存在");
                };
                if !track.open {
                    return fail("轨迹已结束");
                }
                track.open = false;

                let distance: f64 = track
                    .points
                    .windows(2)
                    .map(|w| calculate_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
                    .sum();
                let duration_ms = match (track.points.first(), track.points.last()) {
                    (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
                    _ => (Utc::now() - track.started_at).num_milliseconds(),
                };

                ok(json!({
                    "deviceId": track.device_id,
                    "distance": distance,
                    "duration": duration_ms.max(0) / 1000,
                    "pointCount": track.points.len(),
                }))
            }
            _ => fail("未知操作"),
        }
    }

    fn device_bind(&mut self, payload: &Value) -> Value {
        let Some(device_id) = str_arg(payload, "deviceId") else {
            return fail("缺少设备ID");
        };
        if !is_valid_device_id(device_id) {
            return fail("设备ID格式错误");
        }
        if self.is_bound(device_id) {
            return fail("设备已被绑定");
        }

        let name = str_arg(payload, "name").unwrap_or_default();
        let mut device = Device::new(device_id, name);
        device.bound_at = Some(Utc::now());
        self.devices.push(device);
        self.statuses.insert(
            device_id.to_string(),
            DeviceStatus {
                battery: 100,
                temperature: 25.0,
                online: true,
                ..DeviceStatus::default()
            },
        );
        self.firmware
            .insert(device_id.to_string(), INITIAL_FIRMWARE.to_string());

        ok(json!({ "deviceId": device_id }))
    }

    fn ota_management(&self, payload: &Value) -> Value {
        let Some(current) = str_arg(payload, "deviceId").and_then(|id| self.firmware.get(id))
        else {
            return fail("设备不存在");
        };
        match str_arg(payload, "action") {
            Some("check_update") => ok(json!({
                "hasUpdate": current != LATEST_FIRMWARE,
                "currentVersion": current,
                "latestVersion": LATEST_FIRMWARE,
            })),
            _ => fail("未知操作"),
        }
    }

    fn anti_theft_alert(&mut self, payload: &Value) -> Value {
        let Some(status) = str_arg(payload, "deviceId").and_then(|id| self.statuses.get_mut(id))
        else {
            return fail("设备不存在");
        };
        let Some(enable) = payload.get("enable").and_then(Value::as_bool) else {
            return fail("无效的防盗设置");
        };
        status.anti_theft = enable;
        ok(json!({ "enabled": enable }))
    }

    fn group_management(&mut self, payload: &Value) -> Value {
        let password = str_arg(payload, "password").unwrap_or_default();
        match str_arg(payload, "action") {
            Some("create") => {
                let Some(name) = str_arg(payload, "name").filter(|n| !n.is_empty()) else {
                    return fail("车队名称不能为空");
                };
                let group_id = format!("group_{}", Uuid::new_v4().simple());
                self.groups.insert(
                    group_id.clone(),
                    Group {
                        password: password.to_string(),
                        members: 1,
                    },
                );
                ok(json!({ "groupId": group_id, "name": name }))
            }
            Some("join") => {
                let Some((group_id, group)) = str_arg(payload, "groupId")
                    .and_then(|id| self.groups.get_mut(id).map(|group| (id, group)))
                else {
                    return fail("车队不存在");
                };
                if group.password != password {
                    return fail("车队密码错误");
                }
                group.members += 1;
                ok(json!({ "groupId": group_id, "members": group.members }))
            }
            _ => fail("未知操作"),
        }
    }
}

/// In-process cloud backend
#[derive(Default)]
pub struct SimulatedCloud {
    state: Mutex<CloudState>,
}

impl SimulatedCloud {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a device directly, bypassing the `deviceBind` procedure
    ///
    /// Returns whether the device was bound; a rejected seed is logged.
    pub async fn seed_device(&self, device_id: &str, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let response = state.device_bind(&json!({ "deviceId": device_id, "name": name }));
        let bound = response["success"].as_bool().unwrap_or(false);
        if !bound {
            warn!(
                "Seeding {} rejected: {}",
                device_id,
                response["message"].as_str().unwrap_or("unknown reason")
            );
        }
        bound
    }

    /// Overwrite the stored status of a device
    pub async fn set_status(&self, device_id: &str, status: DeviceStatus) {
        self.state
            .lock()
            .await
            .statuses
            .insert(device_id.to_string(), status);
    }

    /// Stored status of a device
    pub async fn status(&self, device_id: &str) -> Option<DeviceStatus> {
        self.state.lock().await.statuses.get(device_id).cloned()
    }

    /// Make the next call to `procedure` fail with `message`
    pub async fn fail_next(&self, procedure: Procedure, message: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert(procedure.as_str().to_string(), message.to_string());
    }

    /// Refuse every call at the transport level until re-enabled
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls received for `procedure`
    pub async fn calls_to(&self, procedure: Procedure) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|(name, _)| name == procedure.as_str())
            .count()
    }
}

#[async_trait]
impl RpcBridge for SimulatedCloud {
    async fn call_function(&self, name: &str, payload: Value) -> Result<Value> {
        let mut state = self.state.lock().await;
        if state.unreachable {
            return Err(TaillightError::Transport(format!(
                "cloud.callFunction:fail {name} unreachable"
            )));
        }
        state.calls.push((name.to_string(), payload.clone()));

        if let Some(message) = state.failures.remove(name) {
            warn!("Simulated failure of {}: {}", name, message);
            return Ok(fail(&message));
        }

        let Some(procedure) = Procedure::from_name(name) else {
            return Err(TaillightError::Transport(format!(
                "cloud.callFunction:fail function {name} not found"
            )));
        };

        let response = match procedure {
            Procedure::Login => CloudState::login(&payload),
            Procedure::DeviceList => state.device_list(),
            Procedure::DeviceStatus => state.device_status(&payload),
            Procedure::DeviceControl => state.device_control(&payload),
            Procedure::TrackRecord => state.track_record(&payload),
            Procedure::DeviceBind => {
                let response = state.device_bind(&payload);
                if response["success"] == Value::Bool(true) {
                    info!("Simulated backend bound {}", payload["deviceId"]);
                }
                response
            }
            Procedure::OtaManagement => state.ota_management(&payload),
            Procedure::AntiTheftAlert => state.anti_theft_alert(&payload),
            Procedure::GroupManagement => state.group_management(&payload),
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(cloud: &SimulatedCloud, name: &str, payload: Value) -> Value {
        cloud.call_function(name, payload).await.unwrap()
    }

    #[tokio::test]
    async fn test_bind_then_list() {
        let cloud = SimulatedCloud::new();
        let bound = call(
            &cloud,
            "deviceBind",
            json!({"deviceId": "bike_light_ab12cd", "name": "通勤车"}),
        )
        .await;
        assert_eq!(bound["success"], true);

        let again = call(
            &cloud,
            "deviceBind",
            json!({"deviceId": "bike_light_ab12cd", "name": "通勤车"}),
        )
        .await;
        assert_eq!(again["success"], false);
        assert_eq!(again["message"], "设备已被绑定");

        let list = call(&cloud, "deviceList", json!({})).await;
        assert_eq!(list["devices"][0]["deviceId"], "bike_light_ab12cd");
    }

    #[tokio::test]
    async fn test_seed_reports_rejection() {
        let cloud = SimulatedCloud::new();
        assert!(cloud.seed_device("bike_light_ab12cd", "通勤车").await);
        assert!(!cloud.seed_device("bike_light_ab12cd", "山地车").await);
        assert!(!cloud.seed_device("light_ab12", "通勤车").await);

        let list = call(&cloud, "deviceList", json!({})).await;
        assert_eq!(list["devices"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_control_updates_status() {
        let cloud = SimulatedCloud::new();
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;

        let response = call(
            &cloud,
            "deviceControl",
            json!({"deviceId": "bike_light_ab12cd", "command": "set_brightness", "value": 30}),
        )
        .await;
        assert_eq!(response["success"], true);

        let rejected = call(
            &cloud,
            "deviceControl",
            json!({"deviceId": "bike_light_ab12cd", "command": "set_brightness", "value": 130}),
        )
        .await;
        assert_eq!(rejected["success"], false);

        let status = cloud.status("bike_light_ab12cd").await.unwrap();
        assert_eq!(status.brightness, 30);
    }

    #[tokio::test]
    async fn test_track_summary() {
        let cloud = SimulatedCloud::new();
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;

        let started = call(
            &cloud,
            "trackRecord",
            json!({"action": "start", "deviceId": "bike_light_ab12cd"}),
        )
        .await;
        let track_id = started["trackId"].as_str().unwrap().to_string();

        for (lat, ts) in [(30.0, 0_i64), (30.001, 60_000)] {
            let added = call(
                &cloud,
                "trackRecord",
                json!({"action": "add_point", "trackId": track_id,
                       "point": {"lat": lat, "lon": 120.0, "timestamp": ts}}),
            )
            .await;
            assert_eq!(added["success"], true);
        }

        let ended = call(
            &cloud,
            "trackRecord",
            json!({"action": "end", "trackId": track_id}),
        )
        .await;
        assert_eq!(ended["pointCount"], 2);
        assert_eq!(ended["duration"], 60);
        let distance = ended["distance"].as_f64().unwrap();
        assert!((distance - 111.2).abs() < 1.0);

        let closed = call(
            &cloud,
            "trackRecord",
            json!({"action": "end", "trackId": track_id}),
        )
        .await;
        assert_eq!(closed["success"], false);
    }

    #[tokio::test]
    async fn test_group_join_checks_password() {
        let cloud = SimulatedCloud::new();
        let created = call(
            &cloud,
            "groupManagement",
            json!({"action": "create", "name": "周末骑行", "password": "1234"}),
        )
        .await;
        let group_id = created["groupId"].as_str().unwrap().to_string();

        let denied = call(
            &cloud,
            "groupManagement",
            json!({"action": "join", "groupId": group_id, "password": "0000"}),
        )
        .await;
        assert_eq!(denied["message"], "车队密码错误");

        let joined = call(
            &cloud,
            "groupManagement",
            json!({"action": "join", "groupId": group_id, "password": "1234"}),
        )
        .await;
        assert_eq!(joined["members"], 2);
    }

    #[tokio::test]
    async fn test_ota_check() {
        let cloud = SimulatedCloud::new();
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;

        let response = call(
            &cloud,
            "otaManagement",
            json!({"action": "check_update", "deviceId": "bike_light_ab12cd"}),
        )
        .await;
        assert_eq!(response["hasUpdate"], true);
        assert_eq!(response["latestVersion"], LATEST_FIRMWARE);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(Procedure::DeviceList, "服务繁忙").await;

        let failed = call(&cloud, "deviceList", json!({})).await;
        assert_eq!(failed["success"], false);
        assert_eq!(failed["message"], "服务繁忙");

        let recovered = call(&cloud, "deviceList", json!({})).await;
        assert_eq!(recovered["success"], true);
        assert_eq!(cloud.calls_to(Procedure::DeviceList).await, 2);
    }

    #[tokio::test]
    async fn test_unknown_function_is_transport_error() {
        let cloud = SimulatedCloud::new();
        let error = cloud.call_function("firmwareFlash", json!({})).await.unwrap_err();
        assert!(matches!(error, TaillightError::Transport(_)));
    }
}
