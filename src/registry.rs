//! Local endpoint registration.
//!
//! Endpoint ids are a shared resource on the coordinator. The registry
//! keeps track of claimed ids and hands out the next free one when the
//! requested id is taken, so callers must read the granted id back.

use crate::device::{LocalEndpoint, SimpleDescriptor};
use crate::error::{ControllerError, Result};
use crate::routes::{Route, RouteTable};
use crate::stack::ZigbeeStack;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Lowest application endpoint id.
pub const MIN_ENDPOINT_ID: u8 = 1;
/// Highest application endpoint id; 241..=254 are reserved.
pub const MAX_ENDPOINT_ID: u8 = 240;

#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub requested_id: u8,
    pub descriptor: SimpleDescriptor,
    pub cluster_schema: PathBuf,
}

pub struct EndpointRegistry {
    stack: Arc<dyn ZigbeeStack>,
    routes: Arc<RouteTable>,
    claimed: Mutex<BTreeSet<u8>>,
}

impl EndpointRegistry {
    pub fn new(stack: Arc<dyn ZigbeeStack>, routes: Arc<RouteTable>) -> Self {
        Self {
            stack,
            routes,
            claimed: Mutex::new(BTreeSet::new()),
        }
    }

    /// Mark ids as owned by other applications on the same coordinator.
    pub fn with_claimed(self, ids: impl IntoIterator<Item = u8>) -> Self {
        self.claimed.lock().extend(ids);
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn is_claimed(&self, id: u8) -> bool {
        self.claimed.lock().contains(&id)
    }

    /// Claim `requested` if free, otherwise the next free id above it,
    /// wrapping around to [`MIN_ENDPOINT_ID`].
    fn allocate(&self, requested: u8) -> Result<u8> {
        let mut claimed = self.claimed.lock();
        let start = requested.clamp(MIN_ENDPOINT_ID, MAX_ENDPOINT_ID);
        let id = (start..=MAX_ENDPOINT_ID)
            .chain(MIN_ENDPOINT_ID..start)
            .find(|id| !claimed.contains(id))
            .ok_or_else(|| ControllerError::Registration("no free endpoint id".to_string()))?;
        claimed.insert(id);
        Ok(id)
    }

    /// Register the local endpoint with the stack and install its descriptor route.
    pub async fn register_local_endpoint(&self, request: EndpointRequest) -> Result<Arc<LocalEndpoint>> {
        let id = self.allocate(request.requested_id)?;
        if id != request.requested_id {
            warn!(
                "[Registry] Endpoint {} is taken, using {} instead",
                request.requested_id, id
            );
        }

        if let Err(e) = self.stack.register_endpoint(id, &request.descriptor).await {
            self.claimed.lock().remove(&id);
            error!("[Registry] Failed to register endpoint {}: {}", id, e);
            return Err(match e {
                ControllerError::Registration(_) => e,
                other => ControllerError::Registration(other.to_string()),
            });
        }

        let local = Arc::new(LocalEndpoint::new(
            id,
            request.descriptor,
            request.cluster_schema,
        ));
        self.routes.install(local.uri(), Route::Local(local.clone()));
        info!(
            "[Registry] Registered endpoint {} (profile 0x{:04X}, device 0x{:04X})",
            id,
            local.descriptor().profile_id,
            local.descriptor().device_id
        );
        Ok(local)
    }
}
