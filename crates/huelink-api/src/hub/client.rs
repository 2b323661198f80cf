// Bridge API HTTP client
//
// Wraps `reqwest::Client` with bridge-specific URL construction and
// response interpretation. The bridge answers most failures with HTTP 200
// and an error array, so every response body is inspected before it is
// handed to the caller.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::hub::models::AckEntry;
use crate::transport::TransportConfig;

/// URL scheme used for authenticated bridge requests.
///
/// Bridges serve the API over HTTPS with a self-signed certificate; plain
/// HTTP is still answered on the local network and used by test servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw HTTP client for the bridge's v1 API.
///
/// The bridge address is passed per call: it is owned by discovery and may
/// change while the client is alive.
pub struct HubClient {
    http: reqwest::Client,
    scheme: Scheme,
    api_path: String,
    api_key: SecretString,
}

impl HubClient {
    /// Create a new bridge client from a `TransportConfig`.
    ///
    /// `api_path` is the path segment in front of the key (normally `api`).
    pub fn new(
        api_path: impl Into<String>,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, Scheme::Https, api_path, api_key))
    }

    /// Create a bridge client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        scheme: Scheme,
        api_path: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            http,
            scheme,
            api_path: api_path.into().trim_matches('/').to_owned(),
            api_key,
        }
    }

    /// The scheme used for authenticated requests.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build an authenticated URL: `{scheme}://{host}/{api_path}/{key}/{path}`
    pub(crate) fn api_url(&self, host: &str, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}://{}/{}/{}/{}",
            self.scheme,
            host,
            self.api_path,
            self.api_key.expose_secret(),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    /// Build the unauthenticated config URL: `{scheme}://{host}/api/na/config`
    pub(crate) fn config_url(scheme: Scheme, host: &str) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{scheme}://{host}/api/na/config"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the body, surfacing bridge error arrays.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!(host = url.host_str().unwrap_or_default(), "GET bridge resource");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let value = parse_json(&body)?;
        if let Some(err) = hub_error(&value) {
            return Err(err);
        }

        serde_json::from_value(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Send a PUT request with JSON body and interpret the acknowledgement.
    ///
    /// Succeeds only if the first acknowledgement entry is a `success`.
    pub(crate) async fn put(&self, url: Url, body: &impl Serialize) -> Result<(), Error> {
        debug!(host = url.host_str().unwrap_or_default(), "PUT bridge resource");

        let resp = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let acks: Vec<AckEntry> =
            serde_json::from_str(&body).map_err(|_| Error::Hub {
                description: "unknown error".into(),
            })?;

        match acks.into_iter().next() {
            Some(AckEntry {
                success: Some(_), ..
            }) => Ok(()),
            Some(AckEntry {
                error: Some(err), ..
            }) => Err(Error::Hub {
                description: err
                    .description
                    .unwrap_or_else(|| "unknown error".into()),
            }),
            _ => Err(Error::Hub {
                description: "unknown error".into(),
            }),
        }
    }
}

fn parse_json(body: &str) -> Result<Value, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })
}

/// Detect the `[{"error": {...}}]` shape the bridge uses for failed reads.
fn hub_error(value: &Value) -> Option<Error> {
    let first = value.as_array()?.first()?;
    let error = first.get("error")?;
    let description = error
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_owned();
    Some(Error::Hub { description })
}
