use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    bridge::RpcBridge,
    error::Result,
    protocol::{Envelope, Request},
};

/// Single chokepoint for backend calls
///
/// Every call goes through [`Gateway::invoke`], which delivers the request
/// over the host bridge and turns `success: false` envelopes into
/// [`crate::TaillightError::Remote`]. A failed call surfaces immediately;
/// there is no retry, timeout or backoff.
#[derive(Clone)]
pub struct Gateway {
    bridge: Arc<dyn RpcBridge>,
}

impl Gateway {
    /// Create a gateway over `bridge`
    pub fn new(bridge: Arc<dyn RpcBridge>) -> Self {
        Self { bridge }
    }

    /// Call a remote procedure and return its successful envelope
    ///
    /// # Errors
    ///
    /// Returns [`crate::TaillightError::Transport`] if the bridge fails,
    /// [`crate::TaillightError::MalformedResponse`] if the response is not an
    /// envelope, or [`crate::TaillightError::Remote`] if the backend reports failure.
    pub async fn invoke(&self, request: Request) -> Result<Envelope> {
        let Request {
            procedure,
            payload,
            fallback_message,
        } = request;

        debug!("Calling cloud function {}: {}", procedure, payload);

        let raw = match self.bridge.call_function(procedure.as_str(), payload).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Cloud function {} failed: {}", procedure, e);
                return Err(e);
            }
        };

        debug!("Cloud function {} returned: {}", procedure, raw);

        let outcome = Envelope::from_value(procedure, raw)
            .and_then(|envelope| envelope.into_result(procedure, fallback_message));
        if let Err(e) = &outcome {
            error!("Cloud function {} failed: {}", procedure, e);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TaillightError, protocol::Procedure, test_support::ScriptedBridge};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_invoke_success() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.respond("deviceList", json!({"success": true, "devices": []}));
        let gateway = Gateway::new(bridge.clone());

        let envelope = assert_ok!(gateway.invoke(Request::device_list()).await);
        assert!(envelope.field("devices").is_some());
        assert_eq!(bridge.calls().len(), 1);
        assert_eq!(bridge.calls()[0].0, "deviceList");
    }

    #[tokio::test]
    async fn test_invoke_backend_failure() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.respond("deviceStatus", json!({"success": false, "message": "设备离线"}));
        let gateway = Gateway::new(bridge);

        let error = assert_err!(gateway.invoke(Request::device_status("bike_light_ab12cd")).await);
        assert!(matches!(
            error,
            TaillightError::Remote { ref procedure, ref message }
                if procedure == "deviceStatus" && message == "设备离线"
        ));
    }

    #[tokio::test]
    async fn test_invoke_transport_failure_is_not_retried() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.fail_transport("deviceControl", "request:fail timeout");
        let gateway = Gateway::new(bridge.clone());

        let error = assert_err!(
            gateway
                .invoke(Request::device_control(
                    "bike_light_ab12cd",
                    crate::types::ControlCommand::Brake
                ))
                .await
        );
        assert!(error.is_remote());
        assert_eq!(error.user_message(), "网络超时，请检查网络连接");
        assert_eq!(bridge.calls_to(Procedure::DeviceControl), 1);
    }

    #[tokio::test]
    async fn test_invoke_malformed_response() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.respond("otaManagement", json!("ok"));
        let gateway = Gateway::new(bridge);

        let error = assert_err!(gateway.invoke(Request::ota_check("bike_light_ab12cd")).await);
        assert!(matches!(error, TaillightError::MalformedResponse { .. }));
    }
}
