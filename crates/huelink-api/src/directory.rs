// Bridge discovery directory client
//
// The vendor's N-UPnP endpoint lists bridges registered from the caller's
// public address: `[{"id": "...", "internalipaddress": "..."}]`.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// One bridge as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(rename = "internalipaddress")]
    pub internal_ip_address: String,
}

/// Client for the cloud-hosted discovery directory.
pub struct DirectoryClient {
    http: reqwest::Client,
    url: Url,
}

impl DirectoryClient {
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?, url))
    }

    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    /// List all bridges the directory knows for this network.
    pub async fn list_bridges(&self) -> Result<Vec<DirectoryEntry>, Error> {
        debug!(url = %self.url, "querying discovery directory");

        let resp = self
            .http
            .get(self.url.clone())
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
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Find the address of the bridge whose id equals `bridge_id`
    /// (case-insensitive).
    pub async fn find_bridge(&self, bridge_id: &str) -> Result<Option<String>, Error> {
        let entries = self.list_bridges().await?;
        Ok(entries
            .into_iter()
            .find(|e| e.id.eq_ignore_ascii_case(bridge_id))
            .map(|e| e.internal_ip_address))
    }
}
