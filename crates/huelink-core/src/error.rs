// ── Core error types ──
//
// Gateway-level errors. Consumers never see raw HTTP status codes or
// JSON parse failures; the `From<huelink_api::Error>` impl translates
// transport-layer errors into gateway variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Bridge errors ────────────────────────────────────────────────
    #[error("Bridge {bridge_id} has not been discovered yet")]
    BridgeUnresolved { bridge_id: String },

    #[error("Cannot reach bridge: {reason}")]
    BridgeUnreachable { reason: String },

    #[error("Bridge rejected request: {message}")]
    BridgeRejected { message: String },

    #[error("Unexpected bridge response: {message}")]
    BridgeResponse { message: String },

    #[error("Local address lookup failed: {reason}")]
    LocalAddress { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Device {device_id} has no usable '{field}' value")]
    MissingField { device_id: String, field: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Unknown service: {service_id}")]
    UnknownService { service_id: String },

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    #[error("Command queue closed")]
    QueueClosed,

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Unsubscribe from '{topic}' failed: {reason}")]
    Unsubscribe { topic: String, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` if retrying on the next natural cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BridgeUnresolved { .. }
                | Self::BridgeUnreachable { .. }
                | Self::Publish { .. }
                | Self::Subscribe { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<huelink_api::Error> for CoreError {
    fn from(err: huelink_api::Error) -> Self {
        let transient = err.is_transient();
        match err {
            huelink_api::Error::Transport(e) => CoreError::BridgeUnreachable {
                reason: e.to_string(),
            },
            huelink_api::Error::UnexpectedStatus { status } if transient => {
                CoreError::BridgeUnreachable {
                    reason: format!("HTTP {status}"),
                }
            }
            huelink_api::Error::UnexpectedStatus { status } => CoreError::BridgeResponse {
                message: format!("HTTP {status}"),
            },
            huelink_api::Error::Hub { description } => {
                CoreError::BridgeRejected { message: description }
            }
            huelink_api::Error::Deserialization { message, body: _ } => {
                CoreError::BridgeResponse { message }
            }
            huelink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            huelink_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidCommand {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_errors_map_to_rejected() {
        let err: CoreError = huelink_api::Error::Hub {
            description: "resource, /lights/9, not available".into(),
        }
        .into();
        assert!(matches!(err, CoreError::BridgeRejected { ref message } if message.contains("/lights/9")));
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_map_to_transient_unreachable() {
        let err: CoreError = huelink_api::Error::UnexpectedStatus { status: 503 }.into();
        assert!(matches!(err, CoreError::BridgeUnreachable { .. }));
        assert!(err.is_transient());

        let err: CoreError = huelink_api::Error::UnexpectedStatus { status: 404 }.into();
        assert!(matches!(err, CoreError::BridgeResponse { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn publish_failures_are_transient() {
        let err = CoreError::Publish {
            topic: "device-manager/device/dc".into(),
            reason: "no connection".into(),
        };
        assert!(err.is_transient());
    }
}
