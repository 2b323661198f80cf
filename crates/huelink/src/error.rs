//! Fatal startup errors with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use huelink_config::ConfigError;
use huelink_core::CoreError;

#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Missing required setting {field}")]
    #[diagnostic(
        code(huelink::config_missing),
        help("Set the {env} environment variable.")
    )]
    MissingSetting { field: String, env: String },

    #[error("Invalid setting {field}: {reason}")]
    #[diagnostic(code(huelink::config_invalid))]
    InvalidSetting { field: String, reason: String },

    #[error("Could not load configuration")]
    #[diagnostic(
        code(huelink::config_load),
        help("Check the HUELINK_* environment variables for malformed values.")
    )]
    ConfigLoad {
        #[source]
        source: ConfigError,
    },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Could not initialize the bridge client")]
    #[diagnostic(code(huelink::bridge_client))]
    BridgeClient {
        #[source]
        source: CoreError,
    },

    #[error("Gateway failed to start: {0}")]
    #[diagnostic(code(huelink::startup))]
    Startup(#[from] CoreError),
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing { field, env } => Self::MissingSetting { field, env },
            ConfigError::Invalid { field, reason } => Self::InvalidSetting { field, reason },
            other @ ConfigError::Figment(_) => Self::ConfigLoad { source: other },
        }
    }
}
