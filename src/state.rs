use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{
    bridge::{KeyValueStore, LoginProvider, RpcBridge, ACCESS_TOKEN_KEY, USER_INFO_KEY},
    error::{Result, TaillightError},
    gateway::Gateway,
    protocol::{
        parse_device_list, parse_device_status, parse_login, parse_track_id, Envelope, Request,
    },
    types::{
        ClientConfig, ControlCommand, Device, DeviceStatus, Session, TrackPoint, TrackSummary,
        TrackingState, UserProfile,
    },
    util::is_valid_device_id,
};

/// Result of refreshing the device list
///
/// Keeps "the account has no devices" apart from "the list could not be fetched".
#[derive(Debug)]
pub enum DeviceListOutcome {
    /// The backend returned the bound devices
    Loaded(Vec<Device>),
    /// The fetch failed; the previous local list was kept
    FetchFailed(TaillightError),
}

impl DeviceListOutcome {
    /// Whether the fetch failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::FetchFailed(_))
    }

    /// Fetched devices, or an empty list when the fetch failed
    #[must_use]
    pub fn into_devices(self) -> Vec<Device> {
        match self {
            Self::Loaded(devices) => devices,
            Self::FetchFailed(_) => Vec::new(),
        }
    }

    /// Convert into a plain [`Result`]
    ///
    /// # Errors
    ///
    /// Returns the fetch error if the fetch failed.
    pub fn into_result(self) -> Result<Vec<Device>> {
        match self {
            Self::Loaded(devices) => Ok(devices),
            Self::FetchFailed(e) => Err(e),
        }
    }
}

/// Application state shared by the pages
///
/// `AppState` holds the session, the bound devices, the selected device, the
/// last status snapshot and the ride tracking state. Every operation wraps a
/// single backend call made through the [`Gateway`] and updates local state
/// only when that call succeeds.
///
/// It is created once by the composition root and handed to the pages as an
/// `Arc<AppState>`.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use taillight::{AppState, ClientConfig, FixedLoginCode, MemoryStore, SimulatedCloud};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let state = AppState::new(
///         Arc::new(SimulatedCloud::new()),
///         Arc::new(FixedLoginCode::new("code")),
///         Arc::new(MemoryStore::new()),
///         ClientConfig::default(),
///     );
///
///     state.restore_session().await?;
///     if !state.is_logged_in().await {
///         state.login().await?;
///     }
///
///     state.bind_device("bike_light_ab12cd", "通勤车").await?;
///     println!("{} device(s)", state.devices().await.len());
///     Ok(())
/// }
/// ```
pub struct AppState {
    gateway: Gateway,
    login_provider: Arc<dyn LoginProvider>,
    store: Arc<dyn KeyValueStore>,
    config: ClientConfig,
    session: RwLock<Session>,
    devices: RwLock<Vec<Device>>,
    current_device: RwLock<Option<Device>>,
    device_status: RwLock<Option<DeviceStatus>>,
    tracking: RwLock<TrackingState>,
}

impl AppState {
    /// Create the state container over the host seams
    pub fn new(
        bridge: Arc<dyn RpcBridge>,
        login_provider: Arc<dyn LoginProvider>,
        store: Arc<dyn KeyValueStore>,
        config: ClientConfig,
    ) -> Self {
        info!(
            "Tail-light client {} starting (cloud env: {:?})",
            config.version, config.cloud_env
        );

        Self {
            gateway: Gateway::new(bridge),
            login_provider,
            store,
            config,
            session: RwLock::new(Session::default()),
            devices: RwLock::new(Vec::new()),
            current_device: RwLock::new(None),
            device_status: RwLock::new(None),
            tracking: RwLock::new(TrackingState::Idle),
        }
    }

    /// Client configuration
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current session
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Whether a session is established
    pub async fn is_logged_in(&self) -> bool {
        self.session.read().await.logged_in
    }

    /// Cached user profile
    pub async fn user(&self) -> Option<UserProfile> {
        self.session.read().await.user.clone()
    }

    /// Local copy of the bound devices
    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    /// Selected device
    pub async fn current_device(&self) -> Option<Device> {
        self.current_device.read().await.clone()
    }

    /// Last fetched status snapshot
    pub async fn device_status(&self) -> Option<DeviceStatus> {
        self.device_status.read().await.clone()
    }

    /// Ride tracking state
    pub async fn tracking(&self) -> TrackingState {
        self.tracking.read().await.clone()
    }

    /// Restore a session persisted by an earlier [`AppState::login`]
    ///
    /// Returns whether a session was restored. Both the profile and the token
    /// must be present.
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::Storage`] if the storage cannot be read.
    pub async fn restore_session(&self) -> Result<bool> {
        let user = self.store.get(USER_INFO_KEY).await?;
        let token = self.store.get(ACCESS_TOKEN_KEY).await?;

        match (user, token) {
            (Some(user), Some(Value::String(token))) if !user.is_null() && !token.is_empty() => {
                info!("Restored session for {}", user);
                *self.session.write().await = Session {
                    logged_in: true,
                    user: Some(UserProfile(user)),
                    token: Some(token),
                };
                Ok(true)
            }
            _ => {
                info!("No stored session");
                Ok(false)
            }
        }
    }

    /// Log in with a fresh host login code
    ///
    /// On success the token and profile are persisted and the session is
    /// marked logged in.
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::LoginCodeUnavailable`] if the host gives no
    /// code, a remote error if the exchange fails, or
    /// [`TaillightError::Storage`] if persisting fails.
    pub async fn login(&self) -> Result<Session> {
        let code = self
            .login_provider
            .login_code()
            .await?
            .filter(|code| !code.is_empty())
            .ok_or(TaillightError::LoginCodeUnavailable)?;

        let envelope = self.gateway.invoke(Request::login(&code)).await?;
        let (token, user) = parse_login(&envelope)?;

        self.store
            .set(ACCESS_TOKEN_KEY, Value::String(token.clone()))
            .await?;
        self.store.set(USER_INFO_KEY, user.0.clone()).await?;

        let session = Session {
            logged_in: true,
            user: Some(user),
            token: Some(token),
        };
        *self.session.write().await = session.clone();

        info!("Login succeeded");
        Ok(session)
    }

    /// Forget the session locally and in storage
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::Storage`] if the storage cannot be written.
    pub async fn logout(&self) -> Result<()> {
        self.store.remove(ACCESS_TOKEN_KEY).await?;
        self.store.remove(USER_INFO_KEY).await?;
        *self.session.write().await = Session::default();
        info!("Logged out");
        Ok(())
    }

    /// Refresh the list of bound devices
    ///
    /// A successful fetch replaces the local list wholesale. A failed fetch is
    /// logged, leaves the local list untouched and is reported as
    /// [`DeviceListOutcome::FetchFailed`].
    pub async fn list_devices(&self) -> DeviceListOutcome {
        match self.fetch_devices().await {
            Ok(devices) => {
                self.devices.write().await.clone_from(&devices);
                DeviceListOutcome::Loaded(devices)
            }
            Err(e) => {
                error!("Failed to fetch device list: {}", e);
                DeviceListOutcome::FetchFailed(e)
            }
        }
    }

    async fn fetch_devices(&self) -> Result<Vec<Device>> {
        let envelope = self.gateway.invoke(Request::device_list()).await?;
        parse_device_list(&envelope)
    }

    /// Make `device_id` the selected device
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::DeviceNotFound`] if the device is not in the
    /// local list.
    pub async fn select_device(&self, device_id: &str) -> Result<Device> {
        let device = self
            .devices
            .read()
            .await
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
            .ok_or_else(|| TaillightError::DeviceNotFound(device_id.to_string()))?;

        *self.current_device.write().await = Some(device.clone());
        info!("Selected device {}", device_id);
        Ok(device)
    }

    /// Fetch the status of a device and store it as the current snapshot
    ///
    /// # Errors
    ///
    /// Returns a remote error if the fetch fails; the previous snapshot is kept.
    pub async fn get_device_status(&self, device_id: &str) -> Result<DeviceStatus> {
        let envelope = self.gateway.invoke(Request::device_status(device_id)).await?;
        let status = parse_device_status(&envelope)?;
        *self.device_status.write().await = Some(status.clone());
        Ok(status)
    }

    /// Send a command to a device
    ///
    /// Local state is not touched; callers showing the new value do so themselves.
    ///
    /// # Errors
    ///
    /// Returns a remote error if the backend rejects the command.
    pub async fn control_device(
        &self,
        device_id: &str,
        command: ControlCommand,
    ) -> Result<Envelope> {
        let envelope = self
            .gateway
            .invoke(Request::device_control(device_id, command))
            .await?;
        info!("Device control succeeded: {}", command);
        Ok(envelope)
    }

    /// Open a ride track for a device
    ///
    /// An already active track is replaced without being closed on the backend.
    ///
    /// # Errors
    ///
    /// Returns a remote error if the backend refuses to start the track.
    pub async fn start_tracking(&self, device_id: &str) -> Result<String> {
        if let Some(previous) = self.tracking.read().await.track_id() {
            warn!("Starting a new track while {} is still active", previous);
        }

        let envelope = self.gateway.invoke(Request::track_start(device_id)).await?;
        let track_id = parse_track_id(&envelope)?;

        *self.tracking.write().await = TrackingState::Active {
            track_id: track_id.clone(),
        };
        info!("Tracking started: {}", track_id);
        Ok(track_id)
    }

    /// Append a point to the active track
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::NoActiveTrack`] if no track is active,
    /// [`TaillightError::TrackMismatch`] if `track_id` is not the active
    /// track, both without contacting the backend, or a remote error.
    pub async fn add_track_point(&self, track_id: &str, point: TrackPoint) -> Result<Envelope> {
        match &*self.tracking.read().await {
            TrackingState::Idle => return Err(TaillightError::NoActiveTrack),
            TrackingState::Active { track_id: active } if active != track_id => {
                return Err(TaillightError::TrackMismatch {
                    expected: active.clone(),
                    actual: track_id.to_string(),
                })
            }
            TrackingState::Active { .. } => {}
        }

        self.gateway
            .invoke(Request::track_add_point(track_id, &point))
            .await
    }

    /// Close the active track
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::NoActiveTrack`] without contacting the
    /// backend if no track is active, or a remote error, in which case the
    /// track stays active.
    pub async fn stop_tracking(&self) -> Result<TrackSummary> {
        let track_id = self
            .tracking
            .read()
            .await
            .track_id()
            .map(ToString::to_string)
            .ok_or(TaillightError::NoActiveTrack)?;

        let envelope = self.gateway.invoke(Request::track_end(&track_id)).await?;

        *self.tracking.write().await = TrackingState::Idle;
        info!("Tracking stopped: {}", track_id);

        Ok(TrackSummary {
            track_id,
            details: envelope.fields,
        })
    }

    /// Bind a device to the account, then refresh the device list
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::InvalidDeviceId`] without contacting the
    /// backend if the identifier is malformed, or a remote error if binding
    /// fails. A failed list refresh after binding is logged, not returned.
    pub async fn bind_device(&self, device_id: &str, name: &str) -> Result<Envelope> {
        if !is_valid_device_id(device_id) {
            return Err(TaillightError::InvalidDeviceId(device_id.to_string()));
        }

        let envelope = self
            .gateway
            .invoke(Request::device_bind(device_id, name))
            .await?;
        info!("Bound device {} as {:?}", device_id, name);

        if let DeviceListOutcome::FetchFailed(e) = self.list_devices().await {
            warn!("Device list not refreshed after binding {}: {}", device_id, e);
        }

        Ok(envelope)
    }

    /// Ask the update service whether new firmware is available
    ///
    /// # Errors
    ///
    /// Returns a remote error if the check fails.
    pub async fn check_ota_update(&self, device_id: &str) -> Result<Envelope> {
        self.gateway.invoke(Request::ota_check(device_id)).await
    }

    /// Arm the anti-theft alert
    ///
    /// # Errors
    ///
    /// Returns a remote error if the backend refuses.
    pub async fn enable_anti_theft(&self, device_id: &str) -> Result<Envelope> {
        self.gateway
            .invoke(Request::anti_theft_alert(device_id, true))
            .await
    }

    /// Disarm the anti-theft alert
    ///
    /// # Errors
    ///
    /// Returns a remote error if the backend refuses.
    pub async fn disable_anti_theft(&self, device_id: &str) -> Result<Envelope> {
        self.gateway
            .invoke(Request::anti_theft_alert(device_id, false))
            .await
    }

    /// Create a riding group
    ///
    /// # Errors
    ///
    /// Returns a remote error if the backend refuses.
    pub async fn create_group(&self, name: &str, password: &str) -> Result<Envelope> {
        self.gateway
            .invoke(Request::group_create(name, password))
            .await
    }

    /// Join a riding group
    ///
    /// # Errors
    ///
    /// Returns a remote error if the group is unknown or the password is wrong.
    pub async fn join_group(&self, group_id: &str, password: &str) -> Result<Envelope> {
        self.gateway
            .invoke(Request::group_join(group_id, password))
            .await
    }
}
