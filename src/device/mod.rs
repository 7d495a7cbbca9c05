//! Endpoint data model.
//!
//! - `local`: the endpoint this application registers on the coordinator
//! - `remote`: joined remote endpoints with their cached cluster attributes

pub mod local;
pub mod remote;

pub use local::{LocalEndpoint, Signature, SimpleDescriptor};
pub use remote::{Cluster, PairingState, RemoteAddress, RemoteDescriptor, RemoteEndpoint};

/// Network address of the coordinator hosting the local endpoint.
pub const COORDINATOR_ADDRESS: u16 = 0x0000;

/// Request-surface URI of an endpoint.
pub fn endpoint_uri(network_address: u16, endpoint: u8) -> String {
    format!("/devices/{:04X}/endpoints/{:02X}", network_address, endpoint)
}
