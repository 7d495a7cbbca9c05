//! The local logical endpoint and its capability descriptor.

use super::{COORDINATOR_ADDRESS, endpoint_uri};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Profile/device pair used to pair remote endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub profile_id: u16,
    pub device_id: u16,
}

impl Signature {
    pub fn new(profile_id: u16, device_id: u16) -> Self {
        Self {
            profile_id,
            device_id,
        }
    }
}

/// ZigBee simple descriptor declared for the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleDescriptor {
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    #[serde(default)]
    pub in_clusters: Vec<u16>,
    #[serde(default)]
    pub out_clusters: Vec<u16>,
}

impl SimpleDescriptor {
    pub fn signature(&self) -> Signature {
        Signature::new(self.profile_id, self.device_id)
    }
}

/// Endpoint registered by this application. Immutable once registered.
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    id: u8,
    descriptor: SimpleDescriptor,
    cluster_schema: PathBuf,
}

impl LocalEndpoint {
    pub(crate) fn new(id: u8, descriptor: SimpleDescriptor, cluster_schema: PathBuf) -> Self {
        Self {
            id,
            descriptor,
            cluster_schema,
        }
    }

    /// Endpoint id actually granted by the registry.
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn descriptor(&self) -> &SimpleDescriptor {
        &self.descriptor
    }

    pub fn signature(&self) -> Signature {
        self.descriptor.signature()
    }

    /// Cluster-definition schema read by the stack, not by this crate.
    pub fn cluster_schema(&self) -> &Path {
        &self.cluster_schema
    }

    pub fn uri(&self) -> String {
        endpoint_uri(COORDINATOR_ADDRESS, self.id)
    }
}
