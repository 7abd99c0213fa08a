/// Device control page
pub mod control;
/// Device list page
pub mod index;

pub use control::{ControlPage, ControlPhase, ControlView, PollGuard, ShareMessage};
pub use index::{IndexPage, IndexView};

use std::fmt;
use tracing::info;

/// Icon of a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastIcon {
    /// Check mark
    Success,
    /// Cross
    Error,
    /// Text only
    None,
}

/// Short notification shown to the rider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Text
    pub title: String,
    /// Icon
    pub icon: ToastIcon,
    /// Display time in milliseconds
    pub duration_ms: u64,
}

impl Toast {
    /// Success toast, shown for two seconds
    pub fn success(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            icon: ToastIcon::Success,
            duration_ms: 2_000,
        }
    }

    /// Error toast, shown for three seconds
    pub fn error(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            icon: ToastIcon::Error,
            duration_ms: 3_000,
        }
    }

    /// Text-only toast, shown for three seconds
    pub fn text(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            icon: ToastIcon::None,
            duration_ms: 3_000,
        }
    }
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.icon, self.title)
    }
}

/// Host-side presentation of notifications
pub trait Notifier: Send + Sync {
    /// Show a toast
    fn toast(&self, toast: Toast);

    /// Show a blocking loading indicator
    fn show_loading(&self, _title: &str) {}

    /// Hide the loading indicator
    fn hide_loading(&self) {}
}

/// [`Notifier`] that writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn toast(&self, toast: Toast) {
        info!("Toast: {}", toast);
    }

    fn show_loading(&self, title: &str) {
        info!("Loading: {}", title);
    }
}

/// Navigation requested by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Control page of the selected device
    Control,
    /// Detail page of a device
    DeviceDetail(String),
}

impl Route {
    /// Host page path
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Control => "/pages/control/control".to_string(),
            Self::DeviceDetail(device_id) => format!("/pages/device/detail?deviceId={device_id}"),
        }
    }
}
