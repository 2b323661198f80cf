// Bridge light endpoints
//
// Listing, single-light reads, and state updates.

use tracing::debug;

use crate::error::Error;
use crate::hub::client::HubClient;
use crate::hub::models::{HubDeviceState, HubInventory, StateUpdate};

impl HubClient {
    /// List all lights known to the bridge.
    ///
    /// `GET /{api}/{key}/lights`
    pub async fn list_lights(&self, host: &str) -> Result<HubInventory, Error> {
        let url = self.api_url(host, "lights")?;
        debug!("listing lights");
        self.get(url).await
    }

    /// Read the current state of a single light.
    ///
    /// `GET /{api}/{key}/lights/{slot}`
    pub async fn get_light(&self, host: &str, slot: &str) -> Result<HubDeviceState, Error> {
        let url = self.api_url(host, &format!("lights/{slot}"))?;
        self.get(url).await
    }

    /// Update the state of a single light.
    ///
    /// `PUT /{api}/{key}/lights/{slot}/state`
    pub async fn set_light_state(
        &self,
        host: &str,
        slot: &str,
        update: &StateUpdate,
    ) -> Result<(), Error> {
        let url = self.api_url(host, &format!("lights/{slot}/state"))?;
        debug!(slot, ?update, "updating light state");
        self.put(url, update).await
    }
}
