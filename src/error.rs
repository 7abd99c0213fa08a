use thiserror::Error;

/// Toast text used when a failure carries no usable message
pub const GENERIC_FAILURE_MESSAGE: &str = "网络错误，请重试";

/// Errors that can occur when talking to the tail-light backend
#[derive(Error, Debug)]
pub enum TaillightError {
    /// The backend answered with `success: false`
    #[error("Remote procedure {procedure} failed: {message}")]
    Remote {
        /// Name of the remote procedure
        procedure: String,
        /// Backend-supplied message, or the per-procedure fallback
        message: String,
    },

    /// The host bridge could not complete the call
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with something that is not a valid envelope
    #[error("Malformed response from {procedure}: {reason}")]
    MalformedResponse {
        /// Name of the remote procedure
        procedure: String,
        /// What was wrong with the response
        reason: String,
    },

    /// The host platform did not hand out a login code
    #[error("Login code unavailable")]
    LoginCodeUnavailable,

    /// Tracking operation issued while no track is being recorded
    #[error("No tracking session is active")]
    NoActiveTrack,

    /// Track point addressed to a track that is not the active one
    #[error("Track {actual} is not the active track {expected}")]
    TrackMismatch {
        /// Identifier of the active track
        expected: String,
        /// Identifier the caller supplied
        actual: String,
    },

    /// An operation needs a selected device and none is selected
    #[error("No device selected")]
    NoDeviceSelected,

    /// The device is not part of the bound device list
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device identifier does not match `bike_light_` + 6-12 alphanumerics
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    /// Invalid command parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Persistent storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tail-light operations
pub type Result<T> = std::result::Result<T, TaillightError>;

impl TaillightError {
    /// Build a remote failure for `procedure`
    pub fn remote(procedure: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            procedure: procedure.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from the backend or the transport to it
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Transport(_) | Self::MalformedResponse { .. }
        )
    }

    /// Check if this error was raised locally without contacting the backend
    #[must_use]
    pub const fn is_local_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoActiveTrack
                | Self::TrackMismatch { .. }
                | Self::NoDeviceSelected
                | Self::DeviceNotFound(_)
                | Self::InvalidDeviceId(_)
                | Self::InvalidParameters(_)
        )
    }

    /// Text suitable for a user-facing toast
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(raw) => {
                if raw.contains("fail auth deny") {
                    "请先登录".to_string()
                } else if raw.contains("fail timeout") {
                    "网络超时，请检查网络连接".to_string()
                } else if raw.trim().is_empty() {
                    GENERIC_FAILURE_MESSAGE.to_string()
                } else {
                    raw.clone()
                }
            }
            Self::Remote { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::Remote { .. } | Self::MalformedResponse { .. } => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            Self::NoActiveTrack => "没有正在记录的轨迹".to_string(),
            Self::LoginCodeUnavailable => "获取登录code失败".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let remote = TaillightError::remote("deviceStatus", "设备离线");
        assert!(remote.is_remote());
        assert!(!remote.is_local_precondition());

        let transport = TaillightError::Transport("cloud.callFunction:fail".to_string());
        assert!(transport.is_remote());

        let no_track = TaillightError::NoActiveTrack;
        assert!(!no_track.is_remote());
        assert!(no_track.is_local_precondition());

        let storage = TaillightError::Storage("disk full".to_string());
        assert!(!storage.is_remote());
        assert!(!storage.is_local_precondition());
    }

    #[test]
    fn test_user_message_mapping() {
        let denied = TaillightError::Transport("cloud.callFunction:fail auth deny".to_string());
        assert_eq!(denied.user_message(), "请先登录");

        let timeout = TaillightError::Transport("request:fail timeout".to_string());
        assert_eq!(timeout.user_message(), "网络超时，请检查网络连接");

        let remote = TaillightError::remote("deviceBind", "设备已被绑定");
        assert_eq!(remote.user_message(), "设备已被绑定");

        let blank = TaillightError::remote("deviceBind", "  ");
        assert_eq!(blank.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_error_display() {
        let error = TaillightError::InvalidDeviceId("light_ab12".to_string());
        let error_string = format!("{error}");
        assert!(error_string.contains("Invalid device id"));
        assert!(error_string.contains("light_ab12"));
    }
}
