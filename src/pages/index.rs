use std::sync::Arc;
use tracing::{error, info};

use crate::{
    error::TaillightError,
    pages::{Notifier, Route, Toast},
    state::{AppState, DeviceListOutcome},
    types::{Device, UserProfile},
    util::generate_device_id,
};

/// What the device list page displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexView {
    /// Cached profile of the rider
    pub user: Option<UserProfile>,
    /// Bound devices
    pub devices: Vec<Device>,
    /// Discovery in progress
    pub scanning: bool,
    /// Whether the bind dialog is open
    pub show_bind_modal: bool,
    /// Identifier entered in the bind dialog
    pub new_device_id: String,
}

/// Controller of the device list page
pub struct IndexPage {
    state: Arc<AppState>,
    notifier: Arc<dyn Notifier>,
    view: IndexView,
}

impl IndexPage {
    /// Create the page
    pub fn new(state: Arc<AppState>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state,
            notifier,
            view: IndexView::default(),
        }
    }

    /// View model
    #[must_use]
    pub const fn view(&self) -> &IndexView {
        &self.view
    }

    /// Page loaded: show the cached profile and the device list
    pub async fn on_load(&mut self) {
        self.view.user = self.state.user().await;
        self.load_devices().await;
    }

    /// Refresh the device list; returns whether the fetch succeeded
    pub async fn load_devices(&mut self) -> bool {
        match self.state.list_devices().await {
            DeviceListOutcome::Loaded(devices) => {
                self.view.devices = devices;
                true
            }
            DeviceListOutcome::FetchFailed(e) => {
                error!("Failed to load devices: {}", e);
                self.notifier.toast(Toast::error("加载失败"));
                false
            }
        }
    }

    /// Look for a nearby tail-light and open the bind dialog for it
    ///
    /// Discovery is simulated: after the configured delay a well-formed
    /// identifier is proposed.
    pub async fn scan_and_bind(&mut self) -> String {
        self.view.scanning = true;
        tokio::time::sleep(self.state.config().scan_delay()).await;

        let candidate = generate_device_id();
        info!("Discovered candidate device {}", candidate);
        self.view.scanning = false;
        self.view.show_bind_modal = true;
        self.view.new_device_id.clone_from(&candidate);
        candidate
    }

    /// Edit the identifier in the bind dialog
    pub fn set_new_device_id(&mut self, device_id: impl Into<String>) {
        self.view.new_device_id = device_id.into();
    }

    /// Close the bind dialog without binding
    pub fn cancel_bind(&mut self) {
        self.view.show_bind_modal = false;
        self.view.new_device_id.clear();
    }

    /// Bind the identifier entered in the dialog
    ///
    /// Returns the page to open on success.
    pub async fn bind_device(&mut self) -> Option<Route> {
        let device_id = self.view.new_device_id.trim().to_string();
        if device_id.is_empty() {
            self.notifier.toast(Toast::text("请输入设备ID"));
            return None;
        }

        self.notifier.show_loading("绑定中...");
        let name = self.state.config().default_device_name.clone();
        let outcome = self.state.bind_device(&device_id, &name).await;
        self.notifier.hide_loading();

        match outcome {
            Ok(_) => {
                self.view.devices = self.state.devices().await;
                self.view.show_bind_modal = false;
                self.view.new_device_id.clear();
                self.notifier.toast(Toast::success("绑定成功"));
                Some(Route::Control)
            }
            Err(e) => {
                error!("Failed to bind device {}: {}", device_id, e);
                let message = match &e {
                    TaillightError::Remote { message, .. } if !message.trim().is_empty() => {
                        message.clone()
                    }
                    _ => "绑定失败".to_string(),
                };
                self.notifier.toast(Toast::error(message));
                None
            }
        }
    }

    /// Select a device from the list
    ///
    /// Returns the page to open when the device is known.
    pub async fn select_device(&mut self, device_id: &str) -> Option<Route> {
        match self.state.select_device(device_id).await {
            Ok(_) => Some(Route::Control),
            Err(e) => {
                error!("Cannot select {}: {}", device_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::{FixedLoginCode, MemoryStore},
        protocol::Procedure,
        simulator::SimulatedCloud,
        test_support::RecordingNotifier,
        types::ClientConfig,
        util::is_valid_device_id,
    };
    use std::time::Duration;

    async fn setup() -> (IndexPage, Arc<AppState>, Arc<SimulatedCloud>, Arc<RecordingNotifier>) {
        let cloud = Arc::new(SimulatedCloud::new());
        let state = Arc::new(AppState::new(
            cloud.clone(),
            Arc::new(FixedLoginCode::new("code")),
            Arc::new(MemoryStore::new()),
            ClientConfig::default(),
        ));
        state.login().await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let page = IndexPage::new(state.clone(), notifier.clone());
        (page, state, cloud, notifier)
    }

    #[tokio::test]
    async fn test_on_load_shows_profile_and_devices() {
        let (mut page, _, cloud, _) = setup().await;
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;

        page.on_load().await;
        assert!(page.view().user.is_some());
        assert_eq!(page.view().devices.len(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_toasts_and_keeps_list() {
        let (mut page, _, cloud, notifier) = setup().await;
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;
        page.on_load().await;

        cloud.fail_next(Procedure::DeviceList, "服务繁忙").await;
        assert!(!page.load_devices().await);
        assert_eq!(page.view().devices.len(), 1);
        assert_eq!(notifier.titles(), vec!["加载失败".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_then_bind() {
        let (mut page, state, _, notifier) = setup().await;

        let started = tokio::time::Instant::now();
        let candidate = page.scan_and_bind().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(is_valid_device_id(&candidate));
        assert!(page.view().show_bind_modal);
        assert!(!page.view().scanning);

        let route = page.bind_device().await;
        assert_eq!(route, Some(Route::Control));
        assert!(!page.view().show_bind_modal);
        assert!(page.view().new_device_id.is_empty());
        assert!(page.view().devices.iter().any(|d| d.device_id == candidate));
        assert_eq!(state.devices().await[0].name, "我的自行车尾灯");
        assert_eq!(notifier.titles(), vec!["绑定成功".to_string()]);
    }

    #[tokio::test]
    async fn test_bind_requires_id() {
        let (mut page, _, cloud, notifier) = setup().await;

        assert_eq!(page.bind_device().await, None);
        assert_eq!(notifier.titles(), vec!["请输入设备ID".to_string()]);
        assert_eq!(cloud.calls_to(Procedure::DeviceBind).await, 0);
    }

    #[tokio::test]
    async fn test_bind_failure_shows_backend_message() {
        let (mut page, _, cloud, notifier) = setup().await;
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;

        page.set_new_device_id("bike_light_ab12cd");
        assert_eq!(page.bind_device().await, None);
        assert_eq!(notifier.titles(), vec!["设备已被绑定".to_string()]);

        page.set_new_device_id("light_ab12");
        assert_eq!(page.bind_device().await, None);
        assert_eq!(notifier.titles()[1], "绑定失败");
    }

    #[tokio::test]
    async fn test_select_device() {
        let (mut page, state, cloud, _) = setup().await;
        cloud.seed_device("bike_light_ab12cd", "通勤车").await;
        page.on_load().await;

        assert_eq!(page.select_device("bike_light_zz99zz").await, None);
        assert_eq!(
            page.select_device("bike_light_ab12cd").await,
            Some(Route::Control)
        );
        assert_eq!(
            state.current_device().await.map(|d| d.device_id),
            Some("bike_light_ab12cd".to_string())
        );
    }
}
