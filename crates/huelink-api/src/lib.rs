// huelink-api: Async Rust client for the Hue bridge REST API and the
// cloud-hosted bridge discovery directory.

pub mod directory;
pub mod error;
pub mod hub;
pub mod transport;

pub use directory::{DirectoryClient, DirectoryEntry};
pub use error::Error;
pub use hub::models::{BridgeConfig, HubDevice, HubDeviceState, HubInventory, StateUpdate};
pub use hub::{HubClient, Scheme};
pub use transport::{TlsMode, TransportConfig};
