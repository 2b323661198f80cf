// Bridge sensor endpoints

use tracing::debug;

use crate::error::Error;
use crate::hub::client::HubClient;
use crate::hub::models::{HubDeviceState, HubInventory};

impl HubClient {
    /// List all sensors known to the bridge.
    ///
    /// `GET /{api}/{key}/sensors`
    pub async fn list_sensors(&self, host: &str) -> Result<HubInventory, Error> {
        let url = self.api_url(host, "sensors")?;
        debug!("listing sensors");
        self.get(url).await
    }

    /// `GET /{api}/{key}/sensors/{slot}`
    pub async fn get_sensor(&self, host: &str, slot: &str) -> Result<HubDeviceState, Error> {
        let url = self.api_url(host, &format!("sensors/{slot}"))?;
        self.get(url).await
    }
}
