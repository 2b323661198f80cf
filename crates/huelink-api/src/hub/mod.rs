// Bridge API client modules
//
// Hand-written client for the bridge's v1 REST endpoints. Transport
// mechanics live in `client`; endpoint groups are inherent methods in
// separate files.

mod bridge;
mod client;
mod lights;
pub mod models;
mod sensors;

pub use client::{HubClient, Scheme};
