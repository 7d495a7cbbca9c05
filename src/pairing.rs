//! Pairing of joined remote endpoints with the local endpoint.
//!
//! A joined endpoint pairs iff its (profile id, device id) equals the local
//! signature. Bindings are keyed by IEEE address + endpoint id, so a rejoin
//! of the same bulb (possibly under a new network address) replaces the
//! previous binding instead of stacking a second one.

use crate::device::{PairingState, RemoteAddress, RemoteEndpoint, Signature};
use crate::routes::RouteTable;
use crate::stack::NetworkEvent;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Called for every remote endpoint that matches the local signature.
pub trait JoinHandler: Send + Sync {
    fn on_join(&self, remote: &Arc<RemoteEndpoint>);

    /// Called when a paired endpoint left or was replaced by a rejoin.
    fn on_leave(&self, _remote: &Arc<RemoteEndpoint>) {}
}

/// Installs the per-device action routes.
pub struct RouteInstaller {
    routes: Arc<RouteTable>,
}

impl RouteInstaller {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }
}

impl JoinHandler for RouteInstaller {
    fn on_join(&self, remote: &Arc<RemoteEndpoint>) {
        self.routes.install_remote(remote);
    }

    fn on_leave(&self, remote: &Arc<RemoteEndpoint>) {
        self.routes.remove_remote(remote);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// New binding installed.
    Paired(RemoteAddress),
    /// A rejoin replaced the binding that was at the first address.
    Replaced {
        previous: RemoteAddress,
        current: RemoteAddress,
    },
    /// Signature mismatch; the endpoint stays invisible.
    Ignored,
    /// A device left; this many of its bindings were dropped.
    Left(usize),
}

pub struct PairingMatcher {
    local: Signature,
    handler: Arc<dyn JoinHandler>,
    paired: Mutex<HashMap<(u64, u8), Arc<RemoteEndpoint>>>,
}

impl PairingMatcher {
    pub fn new(local: Signature, handler: Arc<dyn JoinHandler>) -> Self {
        Self {
            local,
            handler,
            paired: Mutex::new(HashMap::new()),
        }
    }

    /// Exact signature match.
    pub fn matches(&self, remote: Signature) -> bool {
        remote.profile_id == self.local.profile_id && remote.device_id == self.local.device_id
    }

    pub fn paired_count(&self) -> usize {
        self.paired.lock().len()
    }

    pub fn handle_event(&self, event: NetworkEvent) -> PairingOutcome {
        match event {
            NetworkEvent::DeviceJoined(descriptor) => {
                let remote = Arc::new(RemoteEndpoint::new(descriptor));
                if !self.matches(remote.descriptor().signature()) {
                    debug!(
                        "[Pairing] Ignoring {} (profile 0x{:04X}, device 0x{:04X})",
                        remote.address(),
                        remote.descriptor().profile_id,
                        remote.descriptor().device_id
                    );
                    return PairingOutcome::Ignored;
                }

                let key = remote.descriptor().stable_id();
                let (previous, displaced) = {
                    let mut paired = self.paired.lock();
                    // A reused short address belongs to the newcomer now.
                    let stale: Vec<(u64, u8)> = paired
                        .iter()
                        .filter(|(k, bound)| **k != key && bound.address() == remote.address())
                        .map(|(k, _)| *k)
                        .collect();
                    let displaced: Vec<Arc<RemoteEndpoint>> =
                        stale.iter().filter_map(|k| paired.remove(k)).collect();
                    (paired.insert(key, remote.clone()), displaced)
                };
                if let Some(previous) = &previous {
                    info!(
                        "[Pairing] 0x{:016X} rejoined, replacing {} with {}",
                        key.0,
                        previous.address(),
                        remote.address()
                    );
                    self.handler.on_leave(previous);
                }
                for stale in &displaced {
                    info!(
                        "[Pairing] {} reassigned from 0x{:016X} to 0x{:016X}",
                        stale.address(),
                        stale.descriptor().ieee_address,
                        key.0
                    );
                    self.handler.on_leave(stale);
                }

                remote.set_state(PairingState::Paired);
                self.handler.on_join(&remote);
                info!("[Pairing] Paired {}", remote.address());

                match previous {
                    Some(previous) => PairingOutcome::Replaced {
                        previous: previous.address(),
                        current: remote.address(),
                    },
                    None => PairingOutcome::Paired(remote.address()),
                }
            }
            NetworkEvent::DeviceLeft { ieee_address } => {
                let removed: Vec<Arc<RemoteEndpoint>> = {
                    let mut paired = self.paired.lock();
                    let keys: Vec<(u64, u8)> = paired
                        .keys()
                        .filter(|(ieee, _)| *ieee == ieee_address)
                        .copied()
                        .collect();
                    keys.iter().filter_map(|key| paired.remove(key)).collect()
                };
                for remote in &removed {
                    info!("[Pairing] {} left the network", remote.address());
                    self.handler.on_leave(remote);
                }
                PairingOutcome::Left(removed.len())
            }
        }
    }

    /// Consume join/leave announcements until cancelled or the stack goes away.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<NetworkEvent>,
        shutdown: CancellationToken,
    ) {
        info!("[Pairing] Listening for join announcements");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        self.handle_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("[Pairing] Missed {} network events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("[Pairing] Event stream closed");
                        break;
                    }
                },
            }
        }
        info!("[Pairing] Stopped");
    }
}
