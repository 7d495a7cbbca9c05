//! Command dispatch for paired remote endpoints.
//!
//! Every state-changing action sends one cluster command and re-reads the
//! clusters it may have affected. With [`RefreshPolicy::Concurrent`] the
//! reads are outstanding while the command is still in flight, so the
//! returned document can reflect pre-command state if the bulb is slow.
//! [`RefreshPolicy::Sequenced`] awaits the command before reading.
//!
//! Communication failures never fail the request. They are logged and
//! reported as `warnings` next to the last-known cached state.

use crate::config::{DispatchConfig, RefreshPolicy};
use crate::device::RemoteEndpoint;
use crate::error::{ControllerError, Result};
use crate::reporter::{self, StateDocument};
use crate::request::{ActionRequest, IdentifyParams, LevelParams};
use crate::stack::ZigbeeStack;
use crate::zcl::attribute::decode_read_response;
use crate::zcl::{Apdu, ClusterId, ZclFrame};
use chrono::Utc;
use futures_util::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

/// Clusters re-read after a state query, toggle or level change.
const REFRESHED_CLUSTERS: &[ClusterId] = &[ClusterId::OnOff, ClusterId::LevelControl];

pub struct CommandDispatcher {
    stack: Arc<dyn ZigbeeStack>,
    source_endpoint: u8,
    config: DispatchConfig,
}

impl CommandDispatcher {
    pub fn new(stack: Arc<dyn ZigbeeStack>, source_endpoint: u8, config: DispatchConfig) -> Self {
        Self {
            stack,
            source_endpoint,
            config,
        }
    }

    /// Send one APDU and wait (bounded) for the device's response frame.
    ///
    /// On timeout the stack's future is dropped, which discards its pending
    /// continuation.
    async fn send(&self, remote: &RemoteEndpoint, apdu: &Apdu) -> Result<ZclFrame> {
        let target = remote.address();
        debug!("[Dispatch] {} -> {}", apdu, target);
        let request = self.stack.request(self.source_endpoint, target, apdu);
        match tokio::time::timeout(self.config.command_timeout(), request).await {
            Ok(response) => response,
            Err(_) => Err(ControllerError::Communication(format!(
                "{} to {} timed out after {} ms",
                apdu, target, self.config.command_timeout_ms
            ))),
        }
    }

    /// Send a state-changing command and check the status it was acknowledged with.
    pub async fn execute(&self, remote: &RemoteEndpoint, apdu: &Apdu) -> Result<()> {
        let response = self.send(remote, apdu).await?;
        if response.is_default_response() {
            let status = response.default_response_status()?;
            if !status.is_success() {
                return Err(ControllerError::Communication(format!(
                    "{} rejected by {}: {}",
                    apdu,
                    remote.address(),
                    status
                )));
            }
        }
        Ok(())
    }

    /// Read every known attribute of `cluster` and apply the answer to the cache.
    /// Returns how many values were applied.
    pub async fn refresh(&self, remote: &RemoteEndpoint, cluster: ClusterId) -> Result<usize> {
        let response = self.send(remote, &Apdu::read_all(cluster)).await?;
        if !response.is_read_attributes_response() {
            let status = response.default_response_status()?;
            return Err(ControllerError::Communication(format!(
                "{} read on {} answered with {}",
                cluster,
                remote.address(),
                status
            )));
        }
        let records = decode_read_response(&response.payload)?;
        let applied = remote.cluster(cluster).apply_read_response(&records);
        debug!(
            "[Dispatch] Applied {}/{} {} attributes from {}",
            applied,
            records.len(),
            cluster,
            remote.address()
        );
        Ok(applied)
    }

    /// Refresh several clusters concurrently, absorbing failures into warnings.
    pub async fn refresh_all(&self, remote: &RemoteEndpoint, clusters: &[ClusterId]) -> Vec<String> {
        let results = join_all(clusters.iter().map(|cluster| self.refresh(remote, *cluster))).await;

        let mut warnings = Vec::new();
        let mut refreshed = false;
        for (cluster, result) in clusters.iter().zip(results) {
            match result {
                Ok(_) => refreshed = true,
                Err(e) => {
                    warn!("[Dispatch] {} refresh of {} failed: {}", cluster, remote.address(), e);
                    warnings.push(format!("{} refresh failed: {}", cluster, e));
                }
            }
        }
        if refreshed {
            remote.mark_refreshed(Utc::now());
        }
        warnings
    }

    /// Refresh On/Off and Level, then render.
    pub async fn query_state(&self, remote: &RemoteEndpoint) -> StateDocument {
        let warnings = self.refresh_all(remote, REFRESHED_CLUSTERS).await;
        reporter::serialize(remote).with_warnings(warnings)
    }

    pub async fn toggle(&self, remote: &RemoteEndpoint) -> StateDocument {
        self.command_then_refresh(remote, Apdu::toggle()).await
    }

    /// Move to level. Levels above the ZCL maximum are saturated.
    pub async fn set_level(&self, remote: &RemoteEndpoint, params: LevelParams) -> StateDocument {
        self.command_then_refresh(remote, Apdu::move_to_level(params.val, params.rate))
            .await
    }

    /// Start identify mode. Nothing is re-read afterwards.
    pub async fn identify(&self, remote: &RemoteEndpoint, params: IdentifyParams) -> StateDocument {
        let apdu = Apdu::identify(params.identify_time);
        let mut warnings = Vec::new();
        if let Err(e) = self.execute(remote, &apdu).await {
            warn!("[Dispatch] {} on {} failed: {}", apdu, remote.address(), e);
            warnings.push(format!("{} failed: {}", apdu, e));
        }
        reporter::serialize(remote).with_warnings(warnings)
    }

    pub async fn dispatch(&self, remote: &RemoteEndpoint, request: ActionRequest) -> StateDocument {
        match request {
            ActionRequest::QueryState => self.query_state(remote).await,
            ActionRequest::Toggle => self.toggle(remote).await,
            ActionRequest::SetLevel(params) => self.set_level(remote, params).await,
            ActionRequest::Identify(params) => self.identify(remote, params).await,
        }
    }

    async fn command_then_refresh(&self, remote: &RemoteEndpoint, apdu: Apdu) -> StateDocument {
        let (command, mut warnings) = match self.config.refresh {
            RefreshPolicy::Concurrent => tokio::join!(
                self.execute(remote, &apdu),
                self.refresh_all(remote, REFRESHED_CLUSTERS)
            ),
            RefreshPolicy::Sequenced => {
                let command = self.execute(remote, &apdu).await;
                (command, self.refresh_all(remote, REFRESHED_CLUSTERS).await)
            }
        };

        if let Err(e) = command {
            warn!("[Dispatch] {} on {} failed: {}", apdu, remote.address(), e);
            warnings.insert(0, format!("{} failed: {}", apdu, e));
        }
        reporter::serialize(remote).with_warnings(warnings)
    }
}
