use thiserror::Error;

/// Top-level error type for the `huelink-api` crate.
///
/// Covers every failure mode of the two HTTP surfaces: the bridge's local
/// REST API and the discovery directory. `huelink-core` maps these into
/// gateway-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error while building the HTTP client.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-200 response.
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    // ── Bridge ──────────────────────────────────────────────────────
    /// Error object reported by the bridge (`[{"error": {"description": ..}}]`).
    #[error("Bridge error: {description}")]
    Hub { description: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::UnexpectedStatus { status } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(Error::UnexpectedStatus { status: 503 }.is_transient());
        assert!(!Error::UnexpectedStatus { status: 404 }.is_transient());
    }

    #[test]
    fn bridge_reported_errors_are_not_transient() {
        let err = Error::Hub {
            description: "unauthorized user".into(),
        };
        assert!(!err.is_transient());
    }
}
