//! Route table for the request surface.
//!
//! Routes are plain URI paths:
//! - `/devices/0000/endpoints/<id>`: local endpoint descriptor
//! - `/devices/<nwk>/endpoints/<ep>/{states,toggle,level,identify}`: per-device actions

use crate::device::{LocalEndpoint, RemoteEndpoint};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Action verbs installed for every paired remote endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum Action {
    #[strum(serialize = "states")]
    QueryState,
    #[strum(serialize = "toggle")]
    Toggle,
    #[strum(serialize = "level")]
    SetLevel,
    #[strum(serialize = "identify")]
    Identify,
}

impl Action {
    /// Path suffix appended to the remote endpoint URI.
    pub fn suffix(self) -> &'static str {
        self.into()
    }
}

#[derive(Clone)]
pub enum Route {
    Local(Arc<LocalEndpoint>),
    Remote {
        remote: Arc<RemoteEndpoint>,
        action: Action,
    },
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(local) => write!(f, "Local({})", local.uri()),
            Self::Remote { remote, action } => write!(f, "Remote({}, {})", remote.uri(), action),
        }
    }
}

/// Shared table of installed routes, keyed by exact path.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<String, Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a route, replacing whatever was bound to `uri`.
    pub fn install(&self, uri: String, route: Route) {
        debug!("[Routes] {} -> {:?}", uri, route);
        self.routes.write().insert(uri, route);
    }

    /// Install the action routes of a paired remote endpoint.
    pub fn install_remote(&self, remote: &Arc<RemoteEndpoint>) {
        use strum::IntoEnumIterator;

        let base = remote.uri();
        let mut routes = self.routes.write();
        for action in Action::iter() {
            routes.insert(
                format!("{}/{}", base, action.suffix()),
                Route::Remote {
                    remote: remote.clone(),
                    action,
                },
            );
        }
        info!("[Routes] Installed action routes under {}", base);
    }

    /// Drop every route bound to `remote`. Routes another endpoint has
    /// since installed at the same address are kept. Returns how many were removed.
    pub fn remove_remote(&self, remote: &Arc<RemoteEndpoint>) -> usize {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|_, route| match route {
            Route::Remote { remote: bound, .. } => !Arc::ptr_eq(bound, remote),
            Route::Local(_) => true,
        });
        let removed = before - routes.len();
        if removed > 0 {
            info!("[Routes] Removed {} route(s) for {}", removed, remote.address());
        }
        removed
    }

    pub fn resolve(&self, path: &str) -> Option<Route> {
        let path = path.trim_end_matches('/');
        let routes = self.routes.read();
        routes
            .get(path)
            .or_else(|| routes.get(&normalize_path(path)))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Installed paths, sorted.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.routes.read().keys().cloned().collect();
        uris.sort();
        uris
    }
}

/// Upper-case the hex address segments of a path.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let is_address = i > 0
                && matches!(segments[i - 1], "devices" | "endpoints")
                && segment.bytes().all(|b| b.is_ascii_hexdigit());
            if is_address {
                segment.to_ascii_uppercase()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
