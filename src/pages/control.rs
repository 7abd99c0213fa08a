use std::sync::Arc;
use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::{interval_at, Duration, Instant},
};
use tracing::{debug, error, info};

use crate::{
    error::{Result, TaillightError},
    pages::{Notifier, Route, Toast},
    state::AppState,
    types::{ControlCommand, Device, DeviceStatus, LightMode, DEFAULT_BRIGHTNESS},
};

/// Where a control change stands relative to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPhase {
    /// Shown value matches the last device report or an acknowledged command
    #[default]
    Confirmed,
    /// Shown value applied locally, command in flight
    Optimistic,
    /// Command failed; the shown value is kept until the next status report
    Failed,
}

/// What the control page displays
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
    /// Selected device
    pub device: Option<Device>,
    /// Last status report
    pub status: DeviceStatus,
    /// Highlighted light mode
    pub selected_mode: LightMode,
    /// Brightness slider position
    pub brightness: u8,
    /// Anti-theft switch position
    pub anti_theft: bool,
    /// Whether the status detail panel is expanded
    pub show_status_detail: bool,
    /// State of the last mode change
    pub mode_phase: ControlPhase,
    /// State of the last brightness change
    pub brightness_phase: ControlPhase,
    /// State of the last anti-theft change
    pub anti_theft_phase: ControlPhase,
    /// Number of mode changes issued
    pub mode_seq: u64,
    /// Number of brightness changes issued
    pub brightness_seq: u64,
    /// Number of anti-theft changes issued
    pub anti_theft_seq: u64,
}

impl Default for ControlView {
    fn default() -> Self {
        Self {
            device: None,
            status: DeviceStatus::default(),
            selected_mode: LightMode::Solid,
            brightness: DEFAULT_BRIGHTNESS,
            anti_theft: false,
            show_status_detail: false,
            mode_phase: ControlPhase::Confirmed,
            brightness_phase: ControlPhase::Confirmed,
            anti_theft_phase: ControlPhase::Confirmed,
            mode_seq: 0,
            brightness_seq: 0,
            anti_theft_seq: 0,
        }
    }
}

/// Share card for the control page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareMessage {
    /// Card title
    pub title: String,
    /// Page opened by the card
    pub path: String,
    /// Card image
    pub image_url: String,
}

/// Running status poll; dropping it stops the timer
#[derive(Debug)]
pub struct PollGuard {
    handle: JoinHandle<()>,
}

impl PollGuard {
    /// Whether the timer task is still running
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Status polling stopped");
    }
}

/// Controller of the device control page
///
/// While the page is shown it polls the selected device's status and mirrors
/// it into a [`ControlView`]. Mode, brightness and anti-theft changes are shown
/// at once and then sent to the device; a failed command is logged and
/// reported but the shown value is not rolled back. The next status report
/// corrects it.
///
/// Only the response to the latest change of a control settles its phase, and
/// status reports leave a control alone while its change is in flight.
pub struct ControlPage {
    state: Arc<AppState>,
    notifier: Arc<dyn Notifier>,
    view: Arc<RwLock<ControlView>>,
    poller: Option<PollGuard>,
}

impl ControlPage {
    /// Create the page
    pub fn new(state: Arc<AppState>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state,
            notifier,
            view: Arc::new(RwLock::new(ControlView::default())),
            poller: None,
        }
    }

    /// Snapshot of the view model
    pub async fn view(&self) -> ControlView {
        self.view.read().await.clone()
    }

    /// Whether status polling is running
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollGuard::is_active)
    }

    /// Page became visible: load the selected device and start polling
    pub async fn on_show(&mut self) {
        self.load_current_device().await;
        self.start_status_polling();
    }

    /// Page was hidden: stop polling
    pub fn on_hide(&mut self) {
        self.stop_status_polling();
    }

    /// Mirror the selected device and fetch its status once
    pub async fn load_current_device(&self) {
        if let Some(device) = self.state.current_device().await {
            self.view.write().await.device = Some(device);
            refresh_status(&self.state, &self.view).await;
        }
    }

    /// Fetch the status now and mirror it into the view
    pub async fn refresh_status(&self) {
        refresh_status(&self.state, &self.view).await;
    }

    /// Start polling at the configured interval; no-op if already polling
    pub fn start_status_polling(&mut self) {
        if self.is_polling() {
            return;
        }

        let period = self.state.config().poll_interval();
        let state = self.state.clone();
        let view = self.view.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                refresh_status(&state, &view).await;
            }
        });

        info!("Status polling started every {:?}", period);
        self.poller = Some(PollGuard { handle });
    }

    /// Stop polling
    pub fn stop_status_polling(&mut self) {
        self.poller = None;
    }

    async fn selected_device_id(&self) -> Result<String> {
        self.view
            .read()
            .await
            .device
            .as_ref()
            .map(|d| d.device_id.clone())
            .ok_or(TaillightError::NoDeviceSelected)
    }

    /// Switch the light mode
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::NoDeviceSelected`] if no device is shown.
    /// Command failures are reported through the returned phase.
    pub async fn select_mode(&self, mode: LightMode) -> Result<ControlPhase> {
        let device_id = self.selected_device_id().await?;
        let seq = {
            let mut view = self.view.write().await;
            view.selected_mode = mode;
            view.mode_phase = ControlPhase::Optimistic;
            view.mode_seq += 1;
            view.mode_seq
        };

        let phase = self
            .send(&device_id, ControlCommand::SetMode(mode), "模式已切换")
            .await;
        let mut view = self.view.write().await;
        if view.mode_seq == seq {
            view.mode_phase = phase;
        }
        Ok(phase)
    }

    /// Move the brightness slider
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::NoDeviceSelected`] if no device is shown, or
    /// [`TaillightError::InvalidParameters`] if `level` is above 100.
    pub async fn change_brightness(&self, level: u8) -> Result<ControlPhase> {
        if level > 100 {
            return Err(TaillightError::InvalidParameters(format!(
                "brightness {level} out of range 0-100"
            )));
        }
        let device_id = self.selected_device_id().await?;
        let seq = {
            let mut view = self.view.write().await;
            view.brightness = level;
            view.brightness_phase = ControlPhase::Optimistic;
            view.brightness_seq += 1;
            view.brightness_seq
        };

        let phase = self
            .send(&device_id, ControlCommand::SetBrightness(level), "")
            .await;
        let mut view = self.view.write().await;
        if view.brightness_seq == seq {
            view.brightness_phase = phase;
        }
        Ok(phase)
    }

    /// Flip the anti-theft switch
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::NoDeviceSelected`] if no device is shown.
    pub async fn toggle_anti_theft(&self) -> Result<ControlPhase> {
        let device_id = self.selected_device_id().await?;
        let (enabled, seq) = {
            let mut view = self.view.write().await;
            view.anti_theft = !view.anti_theft;
            view.anti_theft_phase = ControlPhase::Optimistic;
            view.anti_theft_seq += 1;
            (view.anti_theft, view.anti_theft_seq)
        };

        let confirmation = if enabled {
            "防盗已开启"
        } else {
            "防盗已关闭"
        };
        let phase = self
            .send(&device_id, ControlCommand::AntiTheft(enabled), confirmation)
            .await;
        let mut view = self.view.write().await;
        if view.anti_theft_seq == seq {
            view.anti_theft_phase = phase;
        }
        Ok(phase)
    }

    /// Flash the brake light once
    ///
    /// # Errors
    ///
    /// Returns [`TaillightError::NoDeviceSelected`] if no device is shown.
    pub async fn trigger_brake_light(&self) -> Result<ControlPhase> {
        let device_id = self.selected_device_id().await?;
        Ok(self
            .send(&device_id, ControlCommand::Brake, "刹车灯已触发")
            .await)
    }

    /// Expand or collapse the status detail panel
    pub async fn toggle_status_detail(&self) -> bool {
        let mut view = self.view.write().await;
        view.show_status_detail = !view.show_status_detail;
        view.show_status_detail
    }

    /// Route to the detail page of the shown device
    pub async fn show_device_detail(&self) -> Option<Route> {
        self.selected_device_id().await.ok().map(Route::DeviceDetail)
    }

    /// Share card for the shown device
    pub async fn share_message(&self) -> ShareMessage {
        let view = self.view.read().await;
        let (title, path) = match &view.device {
            Some(device) => (
                format!("{} - 智能自行车尾灯", device.name),
                format!("/pages/control/control?deviceId={}", device.device_id),
            ),
            None => (
                "智能自行车尾灯".to_string(),
                "/pages/control/control".to_string(),
            ),
        };

        ShareMessage {
            title,
            path,
            image_url: "/images/share-bike-light.png".to_string(),
        }
    }

    async fn send(
        &self,
        device_id: &str,
        command: ControlCommand,
        confirmation: &str,
    ) -> ControlPhase {
        match self.state.control_device(device_id, command).await {
            Ok(_) => {
                if !confirmation.is_empty() {
                    self.notifier.toast(Toast::success(confirmation));
                }
                ControlPhase::Confirmed
            }
            Err(e) => {
                error!("Command {} failed on {}: {}", command, device_id, e);
                self.notifier.toast(Toast::text(e.user_message()));
                ControlPhase::Failed
            }
        }
    }
}

async fn refresh_status(state: &AppState, view: &RwLock<ControlView>) {
    let Some(device_id) = view.read().await.device.as_ref().map(|d| d.device_id.clone()) else {
        return;
    };

    match state.get_device_status(&device_id).await {
        Ok(status) => {
            let mut view = view.write().await;
            if view.mode_phase != ControlPhase::Optimistic {
                view.selected_mode = status.mode;
                view.mode_phase = ControlPhase::Confirmed;
            }
            if view.brightness_phase != ControlPhase::Optimistic {
                view.brightness = status.brightness;
                view.brightness_phase = ControlPhase::Confirmed;
            }
            if view.anti_theft_phase != ControlPhase::Optimistic {
                view.anti_theft = status.anti_theft;
                view.anti_theft_phase = ControlPhase::Confirmed;
            }
            view.status = status;
        }
        Err(e) => error!("Failed to refresh status of {}: {}", device_id, e),
    }
}
