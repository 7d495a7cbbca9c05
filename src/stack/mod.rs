//! ZigBee network stack collaborators.
//!
//! The controller never talks to the radio directly. It goes through
//! [`ZigbeeStack`], which has two implementations:
//! - `mqtt`: a coprocessor daemon reached over MQTT topics
//! - `simulated`: in-process virtual bulbs for tests and demos

pub mod mqtt;
pub mod simulated;

pub use mqtt::{MqttClient, MqttStack};
pub use simulated::SimulatedStack;

use crate::device::{RemoteAddress, RemoteDescriptor, SimpleDescriptor};
use crate::error::Result;
use crate::zcl::{Apdu, ZclFrame};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the join/leave broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Device presence announcements delivered by the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkEvent {
    /// A device joined (or rejoined) and one of its endpoints was described.
    DeviceJoined(RemoteDescriptor),
    /// A device left the network; all its endpoints are gone.
    DeviceLeft {
        #[serde(with = "crate::device::remote::ieee_hex")]
        ieee_address: u64,
    },
}

/// Primitives the controller consumes from the ZigBee stack.
#[async_trait]
pub trait ZigbeeStack: Send + Sync + 'static {
    /// Declare a local endpoint so the stack routes frames addressed to it.
    async fn register_endpoint(&self, endpoint: u8, descriptor: &SimpleDescriptor) -> Result<()>;

    /// Send `apdu` from local endpoint `source` to `target`.
    ///
    /// Resolves with the device's response frame. The future never times
    /// out on its own; callers bound it and dropping it discards the
    /// pending continuation.
    async fn request(&self, source: u8, target: RemoteAddress, apdu: &Apdu) -> Result<ZclFrame>;

    /// Subscribe to join/leave announcements from this point on.
    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_event_json() {
        let joined: NetworkEvent = serde_json::from_str(
            r#"{"type":"device_joined","ieee_address":"0x00158D0001A2B3C4","network_address":6699,"endpoint":11,"profile_id":260,"device_id":257}"#,
        )
        .unwrap();
        match joined {
            NetworkEvent::DeviceJoined(descriptor) => {
                assert_eq!(descriptor.ieee_address, 0x0015_8D00_01A2_B3C4);
                assert_eq!(descriptor.network_address, 0x1A2B);
                assert_eq!(descriptor.device_id, 0x0101);
                assert!(descriptor.in_clusters.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }

        let left = NetworkEvent::DeviceLeft {
            ieee_address: 0x0015_8D00_01A2_B3C4,
        };
        let json = serde_json::to_string(&left).unwrap();
        assert_eq!(
            json,
            r#"{"type":"device_left","ieee_address":"0x00158D0001A2B3C4"}"#
        );
    }
}
