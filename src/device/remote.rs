//! Remote endpoints discovered at join time and their attribute mirror.
//!
//! Each [`Cluster`] guards its cache with its own lock so overlapping
//! refreshes of the same cluster are serialized while different clusters
//! and different devices proceed independently.

use super::endpoint_uri;
use super::local::Signature;
use crate::zcl::{AttributeRecord, AttributeValue, ClusterId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Short network address plus endpoint id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteAddress {
    pub network_address: u16,
    pub endpoint: u8,
}

impl RemoteAddress {
    pub fn new(network_address: u16, endpoint: u8) -> Self {
        Self {
            network_address,
            endpoint,
        }
    }

    pub fn uri(&self) -> String {
        endpoint_uri(self.network_address, self.endpoint)
    }
}

impl std::fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}/{}", self.network_address, self.endpoint)
    }
}

/// Endpoint description announced by the stack when a device joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    /// IEEE (extended) address; stable across rejoins.
    #[serde(with = "ieee_hex")]
    pub ieee_address: u64,
    pub network_address: u16,
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    #[serde(default)]
    pub device_version: u8,
    #[serde(default)]
    pub in_clusters: Vec<u16>,
}

impl RemoteDescriptor {
    pub fn address(&self) -> RemoteAddress {
        RemoteAddress::new(self.network_address, self.endpoint)
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.profile_id, self.device_id)
    }

    /// Identity that survives a rejoin with a new network address.
    pub fn stable_id(&self) -> (u64, u8) {
        (self.ieee_address, self.endpoint)
    }
}

/// IEEE addresses travel as `0x`-prefixed hex strings.
pub(crate) mod ieee_hex {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:016X}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(&s);
        u64::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle of a remote endpoint as seen by this application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PairingState {
    /// Join announced, signature not yet evaluated.
    Discovered,
    /// Signature matched and routes installed.
    Paired,
    /// At least one attribute refresh has been applied.
    Active,
}

/// A remote cluster and its cached attribute values.
pub struct Cluster {
    id: ClusterId,
    attributes: RwLock<BTreeMap<u16, AttributeValue>>,
}

impl Cluster {
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            attributes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn get(&self, attribute: u16) -> Option<AttributeValue> {
        self.attributes.read().get(&attribute).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<u16, AttributeValue> {
        self.attributes.read().clone()
    }

    /// Record a value this application wrote to the device itself.
    pub fn set_attribute(&self, attribute: u16, value: AttributeValue) {
        self.attributes.write().insert(attribute, value);
    }

    /// Apply a read-attributes response. Failed records leave the cache
    /// untouched. Returns how many values were applied.
    pub fn apply_read_response(&self, records: &[AttributeRecord]) -> usize {
        let mut attributes = self.attributes.write();
        let mut applied = 0;
        for record in records {
            if let (true, Some(value)) = (record.status.is_success(), record.value) {
                attributes.insert(record.id, value);
                applied += 1;
            }
        }
        applied
    }
}

/// A joined remote endpoint. Owned by the pairing table; routes hold `Arc`s.
pub struct RemoteEndpoint {
    descriptor: RemoteDescriptor,
    on_off: Cluster,
    level: Cluster,
    identify: Cluster,
    state: RwLock<PairingState>,
    last_refreshed: RwLock<Option<DateTime<Utc>>>,
}

impl RemoteEndpoint {
    /// Every dimmable light carries Identify, On/Off and Level Control.
    pub fn new(descriptor: RemoteDescriptor) -> Self {
        Self {
            descriptor,
            on_off: Cluster::new(ClusterId::OnOff),
            level: Cluster::new(ClusterId::LevelControl),
            identify: Cluster::new(ClusterId::Identify),
            state: RwLock::new(PairingState::Discovered),
            last_refreshed: RwLock::new(None),
        }
    }

    pub fn descriptor(&self) -> &RemoteDescriptor {
        &self.descriptor
    }

    pub fn address(&self) -> RemoteAddress {
        self.descriptor.address()
    }

    pub fn uri(&self) -> String {
        self.address().uri()
    }

    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        match id {
            ClusterId::OnOff => &self.on_off,
            ClusterId::LevelControl => &self.level,
            ClusterId::Identify => &self.identify,
        }
    }

    /// Clusters in ascending cluster-id order.
    pub fn clusters(&self) -> [&Cluster; 3] {
        [&self.identify, &self.on_off, &self.level]
    }

    pub fn state(&self) -> PairingState {
        *self.state.read()
    }

    pub fn set_state(&self, state: PairingState) {
        *self.state.write() = state;
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        *self.last_refreshed.read()
    }

    /// Note a successfully applied refresh; promotes Paired to Active.
    pub fn mark_refreshed(&self, at: DateTime<Utc>) {
        *self.last_refreshed.write() = Some(at);
        let mut state = self.state.write();
        if *state == PairingState::Paired {
            *state = PairingState::Active;
        }
    }
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("address", &self.address())
            .field("ieee_address", &format_args!("0x{:016X}", self.descriptor.ieee_address))
            .field("state", &self.state())
            .finish()
    }
}
