//! The dimmable-light controller context.
//!
//! Owns the registry, the route table, the pairing matcher and the
//! dispatcher for one local endpoint. Nothing here is process-global, so
//! several controllers can run side by side against different stacks.

use crate::config::Config;
use crate::device::{LocalEndpoint, SimpleDescriptor};
use crate::dispatcher::CommandDispatcher;
use crate::error::{ControllerError, Result};
use crate::pairing::{PairingMatcher, RouteInstaller};
use crate::registry::{EndpointRegistry, EndpointRequest};
use crate::reporter::{self, LocalEndpointDocument, StateDocument};
use crate::request::{ActionRequest, RequestParams};
use crate::routes::{Route, RouteTable};
use crate::stack::{NetworkEvent, ZigbeeStack};
use crate::zcl::{ClusterId, DIMMABLE_LIGHT_DEVICE_ID, DIMMABLE_LIGHT_DEVICE_VERSION, HA_PROFILE_ID};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Body of a successful request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Local(LocalEndpointDocument),
    Remote(StateDocument),
}

impl Response {
    pub fn into_state(self) -> Option<StateDocument> {
        match self {
            Self::Remote(doc) => Some(doc),
            Self::Local(_) => None,
        }
    }
}

/// Descriptor declared for the local dimmable-light endpoint.
pub fn local_descriptor() -> SimpleDescriptor {
    SimpleDescriptor {
        profile_id: HA_PROFILE_ID,
        device_id: DIMMABLE_LIGHT_DEVICE_ID,
        device_version: DIMMABLE_LIGHT_DEVICE_VERSION,
        in_clusters: Vec::new(),
        out_clusters: vec![ClusterId::OnOff.id(), ClusterId::LevelControl.id()],
    }
}

pub struct LightController {
    registry: EndpointRegistry,
    local: Arc<LocalEndpoint>,
    matcher: Arc<PairingMatcher>,
    dispatcher: CommandDispatcher,
    events: Mutex<Option<broadcast::Receiver<NetworkEvent>>>,
    stack: Arc<dyn ZigbeeStack>,
}

impl LightController {
    /// Register the local endpoint and prepare pairing. Fails with
    /// [`ControllerError::Registration`] when the stack is unavailable.
    pub async fn start(stack: Arc<dyn ZigbeeStack>, config: &Config) -> Result<Self> {
        let registry = EndpointRegistry::new(stack.clone(), Arc::new(RouteTable::new()));
        Self::with_registry(stack, registry, config).await
    }

    pub async fn with_registry(
        stack: Arc<dyn ZigbeeStack>,
        registry: EndpointRegistry,
        config: &Config,
    ) -> Result<Self> {
        // Subscribe before registering so no join is missed in between.
        let events = stack.subscribe();

        let local = registry
            .register_local_endpoint(EndpointRequest {
                requested_id: config.endpoint.requested_id,
                descriptor: local_descriptor(),
                cluster_schema: PathBuf::from(&config.endpoint.cluster_schema),
            })
            .await?;

        let installer = Arc::new(RouteInstaller::new(registry.routes().clone()));
        let matcher = Arc::new(PairingMatcher::new(local.signature(), installer));
        let dispatcher = CommandDispatcher::new(stack.clone(), local.id(), config.dispatch.clone());

        info!(
            "[Controller] Local endpoint {} ready at {}",
            local.id(),
            local.uri()
        );

        Ok(Self {
            registry,
            local,
            matcher,
            dispatcher,
            events: Mutex::new(Some(events)),
            stack,
        })
    }

    pub fn local(&self) -> &Arc<LocalEndpoint> {
        &self.local
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        self.registry.routes()
    }

    pub fn matcher(&self) -> &Arc<PairingMatcher> {
        &self.matcher
    }

    /// Start consuming join/leave announcements.
    pub fn spawn_pairing(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let events = self
            .events
            .lock()
            .take()
            .unwrap_or_else(|| self.stack.subscribe());
        tokio::spawn(self.matcher.clone().run(events, shutdown))
    }

    /// Serve one request against the route table.
    ///
    /// Parameters are validated before anything is sent, so a rejected
    /// request never reaches the network.
    pub async fn handle_request(&self, path: &str, params: &RequestParams) -> Result<Response> {
        let route = self
            .routes()
            .resolve(path)
            .ok_or_else(|| ControllerError::UnknownEndpoint(path.to_string()))?;

        match route {
            Route::Local(local) => Ok(Response::Local(reporter::serialize_local(&local))),
            Route::Remote { remote, action } => {
                let request = ActionRequest::parse(action, params)?;
                debug!("[Controller] {} -> {:?}", path, request);
                Ok(Response::Remote(self.dispatcher.dispatch(&remote, request).await))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::SimulatedStack;
    use crate::stack::simulated::dimmable_light;

    #[tokio::test]
    async fn test_local_endpoint_route() {
        let stack = Arc::new(SimulatedStack::new());
        let controller = LightController::start(stack, &Config::default()).await.unwrap();
        let response = controller
            .handle_request("/devices/0000/endpoints/01", &RequestParams::new())
            .await
            .unwrap();
        match response {
            Response::Local(doc) => {
                assert_eq!(doc.profile_id, HA_PROFILE_ID);
                assert_eq!(doc.device_id, DIMMABLE_LIGHT_DEVICE_ID);
                assert_eq!(doc.out_clusters, vec![0x0006, 0x0008]);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_before_spawn_is_not_lost() {
        let stack = Arc::new(SimulatedStack::new());
        let controller = LightController::start(stack.clone(), &Config::default())
            .await
            .unwrap();
        stack.join(dimmable_light(7, 0x1A2B, 0x0B));

        let shutdown = CancellationToken::new();
        let task = controller.spawn_pairing(shutdown.clone());
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while controller.matcher().paired_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        shutdown.cancel();
        task.await.unwrap();

        assert!(controller.routes().resolve("/devices/1A2B/endpoints/0B/states").is_some());
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let stack = Arc::new(SimulatedStack::new());
        let controller = LightController::start(stack, &Config::default()).await.unwrap();
        let err = controller
            .handle_request("/devices/1A2B/endpoints/0B/toggle", &RequestParams::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
