//! State documents rendered for request responses.
//!
//! Rendering never touches the network: it reads whatever the attribute
//! cache holds at the time of the call.

use crate::device::remote::ieee_hex;
use crate::device::{LocalEndpoint, PairingState, RemoteEndpoint};
use crate::error::Result;
use crate::zcl::{AttributeValue, ClusterId, DataType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Serialized view of a remote endpoint and its cached clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub uri: String,
    pub network_address: u16,
    #[serde(with = "ieee_hex")]
    pub ieee_address: u64,
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub state: PairingState,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub clusters: Vec<ClusterDocument>,
    /// Absorbed communication failures of the request that produced this document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StateDocument {
    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterDocument> {
        self.clusters.iter().find(|c| c.id == id.id())
    }

    /// Cached value of a named attribute, if it has ever been read.
    pub fn attribute(&self, cluster: ClusterId, name: &str) -> Option<AttributeValue> {
        self.cluster(cluster)?.attributes.get(name)?.value().ok()
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDocument {
    pub id: u16,
    pub name: String,
    pub attributes: BTreeMap<String, AttributeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEntry {
    pub id: u16,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub value: Value,
}

impl AttributeEntry {
    fn new(id: u16, value: AttributeValue) -> Self {
        Self {
            id,
            data_type: value.data_type(),
            value: value.to_json(),
        }
    }

    pub fn value(&self) -> Result<AttributeValue> {
        AttributeValue::from_json(self.data_type, &self.value)
    }
}

/// Render a remote endpoint. Attributes never read are simply absent.
pub fn serialize(remote: &RemoteEndpoint) -> StateDocument {
    let descriptor = remote.descriptor();
    let clusters = remote
        .clusters()
        .iter()
        .map(|cluster| {
            let id = cluster.id();
            let attributes = cluster
                .snapshot()
                .into_iter()
                .map(|(attr, value)| {
                    let name = id
                        .attribute(attr)
                        .map(|def| def.name.to_string())
                        .unwrap_or_else(|| format!("attr_0x{:04x}", attr));
                    (name, AttributeEntry::new(attr, value))
                })
                .collect();
            ClusterDocument {
                id: id.id(),
                name: id.name().to_string(),
                attributes,
            }
        })
        .collect();

    StateDocument {
        uri: remote.uri(),
        network_address: descriptor.network_address,
        ieee_address: descriptor.ieee_address,
        endpoint: descriptor.endpoint,
        profile_id: descriptor.profile_id,
        device_id: descriptor.device_id,
        state: remote.state(),
        last_refreshed: remote.last_refreshed(),
        clusters,
        warnings: Vec::new(),
    }
}

/// Serialized descriptor of the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEndpointDocument {
    pub uri: String,
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub in_clusters: Vec<u16>,
    pub out_clusters: Vec<u16>,
    pub cluster_schema: String,
}

pub fn serialize_local(local: &LocalEndpoint) -> LocalEndpointDocument {
    let descriptor = local.descriptor();
    LocalEndpointDocument {
        uri: local.uri(),
        endpoint: local.id(),
        profile_id: descriptor.profile_id,
        device_id: descriptor.device_id,
        device_version: descriptor.device_version,
        in_clusters: descriptor.in_clusters.clone(),
        out_clusters: descriptor.out_clusters.clone(),
        cluster_schema: local.cluster_schema().display().to_string(),
    }
}
