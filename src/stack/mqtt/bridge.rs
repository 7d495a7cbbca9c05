//! ZigBee stack reached through a coprocessor daemon over MQTT.
//!
//! Topics under the configured prefix:
//! - `<prefix>/register`: local endpoint declarations (retained)
//! - `<prefix>/events`: join/leave announcements from the daemon
//! - `<prefix>/tx`: APS frames to send
//! - `<prefix>/rx`: APS frames received from devices
//!
//! Responses are matched to requests by source address, endpoint, cluster
//! and ZCL transaction sequence number.

use super::client::{MqttClient, MqttMessage};
use crate::config::MqttConfig;
use crate::device::{RemoteAddress, SimpleDescriptor};
use crate::error::{ControllerError, Result};
use crate::stack::{EVENT_CHANNEL_CAPACITY, NetworkEvent, ZigbeeStack};
use crate::zcl::{Apdu, HA_PROFILE_ID, ZclFrame};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, QoS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// APS data frame as exchanged with the daemon.
///
/// `network_address`/`endpoint` name the destination on `tx` and the
/// source on `rx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApsMessage {
    pub network_address: u16,
    pub endpoint: u8,
    pub local_endpoint: u8,
    pub profile_id: u16,
    pub cluster_id: u16,
    pub payload: Vec<u8>,
}

/// Endpoint declaration published on `<prefix>/register`.
#[derive(Debug, Serialize)]
struct EndpointRegistration<'a> {
    endpoint: u8,
    #[serde(flatten)]
    descriptor: &'a SimpleDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PendingKey {
    network_address: u16,
    endpoint: u8,
    cluster_id: u16,
    sequence: u8,
}

type PendingMap = Arc<Mutex<HashMap<PendingKey, oneshot::Sender<ZclFrame>>>>;

/// Removes a pending continuation when its request future is dropped.
struct PendingGuard {
    key: PendingKey,
    pending: PendingMap,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}

#[derive(Debug, Clone)]
struct Topics {
    register: String,
    events: String,
    tx: String,
    rx: String,
}

impl Topics {
    fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            register: format!("{}/register", prefix),
            events: format!("{}/events", prefix),
            tx: format!("{}/tx", prefix),
            rx: format!("{}/rx", prefix),
        }
    }
}

/// Routes inbound bridge messages to waiting requests and event subscribers.
struct Inbox {
    topics: Topics,
    pending: PendingMap,
    events: broadcast::Sender<NetworkEvent>,
}

impl Inbox {
    fn handle(&self, msg: &MqttMessage) {
        if msg.topic == self.topics.rx {
            self.handle_frame(&msg.payload);
        } else if msg.topic == self.topics.events {
            self.handle_event(&msg.payload);
        } else {
            debug!("[MQTT] Ignoring message on {}", msg.topic);
        }
    }

    fn handle_frame(&self, payload: &str) {
        let message = match serde_json::from_str::<ApsMessage>(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("[MQTT] Failed to parse APS frame: {}", e);
                return;
            }
        };
        let frame = match ZclFrame::decode(&message.payload) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    "[MQTT] Dropping frame from 0x{:04X}: {}",
                    message.network_address, e
                );
                return;
            }
        };

        let key = PendingKey {
            network_address: message.network_address,
            endpoint: message.endpoint,
            cluster_id: message.cluster_id,
            sequence: frame.sequence(),
        };
        match self.pending.lock().remove(&key) {
            Some(waiter) => {
                let _ = waiter.send(frame);
            }
            None => debug!("[MQTT] Unsolicited frame {:?}", key),
        }
    }

    fn handle_event(&self, payload: &str) {
        match serde_json::from_str::<NetworkEvent>(payload) {
            Ok(event) => {
                debug!("[MQTT] Network event: {:?}", event);
                // No subscribers is fine; the event is simply dropped.
                let _ = self.events.send(event);
            }
            Err(e) => warn!("[MQTT] Failed to parse network event: {}", e),
        }
    }
}

/// [`ZigbeeStack`] backed by the MQTT coprocessor bridge.
pub struct MqttStack {
    client: AsyncClient,
    inbox: Arc<Inbox>,
    sequence: AtomicU8,
    tasks: Vec<JoinHandle<()>>,
}

impl MqttStack {
    /// Connect to the broker and start routing bridge traffic.
    ///
    /// Fails with a registration error if the broker does not accept the
    /// connection in time; without it no endpoint can be registered.
    pub async fn connect(config: &MqttConfig) -> Result<Self> {
        let topics = Topics::new(&config.topic_prefix);
        info!(
            "[MQTT] Connecting to {}:{}",
            config.broker_host, config.broker_port
        );

        let mqtt_client = MqttClient::new(config);
        let client = mqtt_client.client();
        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);
        let (connected_tx, connected_rx) = oneshot::channel();

        let subscriptions = vec![topics.events.clone(), topics.rx.clone()];
        let mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(subscriptions, msg_tx, Some(connected_tx)).await;
        });

        match tokio::time::timeout(CONNECT_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => info!("[MQTT] Bridge connection established"),
            Ok(Err(_)) => {
                mqtt_loop.abort();
                return Err(ControllerError::Registration(
                    "MQTT connection signal dropped".to_string(),
                ));
            }
            Err(_) => {
                mqtt_loop.abort();
                return Err(ControllerError::Registration(format!(
                    "broker {}:{} unreachable after {:?}",
                    config.broker_host, config.broker_port, CONNECT_TIMEOUT
                )));
            }
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inbox = Arc::new(Inbox {
            topics,
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
        });

        let router_inbox = inbox.clone();
        let router = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                router_inbox.handle(&msg);
            }
        });

        Ok(Self {
            client,
            inbox,
            sequence: AtomicU8::new(rand::random()),
            tasks: vec![mqtt_loop, router],
        })
    }
}

impl Drop for MqttStack {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl ZigbeeStack for MqttStack {
    async fn register_endpoint(&self, endpoint: u8, descriptor: &SimpleDescriptor) -> Result<()> {
        let registration = EndpointRegistration {
            endpoint,
            descriptor,
        };
        let payload = serde_json::to_vec(&registration)?;
        self.client
            .publish(&self.inbox.topics.register, QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| ControllerError::Registration(e.to_string()))?;
        info!("[MQTT] Declared endpoint {} to the coprocessor", endpoint);
        Ok(())
    }

    async fn request(&self, source: u8, target: RemoteAddress, apdu: &Apdu) -> Result<ZclFrame> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = apdu.to_frame(sequence);
        let key = PendingKey {
            network_address: target.network_address,
            endpoint: target.endpoint,
            cluster_id: apdu.cluster.id(),
            sequence,
        };

        let (tx, rx) = oneshot::channel();
        self.inbox.pending.lock().insert(key, tx);
        let _guard = PendingGuard {
            key,
            pending: self.inbox.pending.clone(),
        };

        let message = ApsMessage {
            network_address: target.network_address,
            endpoint: target.endpoint,
            local_endpoint: source,
            profile_id: HA_PROFILE_ID,
            cluster_id: apdu.cluster.id(),
            payload: frame.encode(),
        };
        debug!("[MQTT] -> {} seq={} {}", target, sequence, apdu);
        self.client
            .publish(
                &self.inbox.topics.tx,
                QoS::AtLeastOnce,
                false,
                serde_json::to_vec(&message)?,
            )
            .await?;

        rx.await.map_err(|_| {
            ControllerError::Communication(format!("response channel for {} closed", target))
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.inbox.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zcl::attribute::encode_read_response;
    use crate::zcl::frame::global_cmd;
    use crate::zcl::{AttributeRecord, AttributeValue, ClusterId, FrameType, level_attrs};

    fn inbox() -> Inbox {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Inbox {
            topics: Topics::new("zigbee/"),
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn rx_message(inbox: &Inbox, message: &ApsMessage) -> MqttMessage {
        MqttMessage {
            topic: inbox.topics.rx.clone(),
            payload: serde_json::to_string(message).unwrap(),
        }
    }

    #[test]
    fn test_topics_strip_trailing_slash() {
        let topics = Topics::new("zigbee/");
        assert_eq!(topics.tx, "zigbee/tx");
        assert_eq!(topics.events, "zigbee/events");
    }

    #[tokio::test]
    async fn test_response_resolves_matching_request() {
        let inbox = inbox();
        let key = PendingKey {
            network_address: 0x1A2B,
            endpoint: 0x0B,
            cluster_id: 0x0008,
            sequence: 42,
        };
        let (tx, rx) = oneshot::channel();
        inbox.pending.lock().insert(key, tx);

        let request = Apdu::read_all(ClusterId::LevelControl).to_frame(42);
        let response = ZclFrame::response_to(
            &request.header,
            FrameType::Global,
            global_cmd::READ_ATTRIBUTES_RESPONSE,
            encode_read_response(&[AttributeRecord::success(
                level_attrs::CURRENT_LEVEL,
                AttributeValue::U8(250),
            )]),
        );

        // Same sequence from another cluster does not match.
        let mut other = ApsMessage {
            network_address: 0x1A2B,
            endpoint: 0x0B,
            local_endpoint: 1,
            profile_id: HA_PROFILE_ID,
            cluster_id: 0x0006,
            payload: response.encode(),
        };
        inbox.handle(&rx_message(&inbox, &other));
        assert_eq!(inbox.pending.lock().len(), 1);

        other.cluster_id = 0x0008;
        inbox.handle(&rx_message(&inbox, &other));
        assert!(inbox.pending.lock().is_empty());
        assert_eq!(rx.await.unwrap(), response);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let inbox = inbox();
        let mut events = inbox.events.subscribe();
        inbox.handle(&MqttMessage {
            topic: "zigbee/events".to_string(),
            payload: r#"{"type":"device_left","ieee_address":"0x0000000000000001"}"#.to_string(),
        });
        assert_eq!(
            events.recv().await.unwrap(),
            NetworkEvent::DeviceLeft { ieee_address: 1 }
        );
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let inbox = inbox();
        inbox.handle(&MqttMessage {
            topic: "zigbee/rx".to_string(),
            payload: "not json".to_string(),
        });
        let message = ApsMessage {
            network_address: 1,
            endpoint: 1,
            local_endpoint: 1,
            profile_id: HA_PROFILE_ID,
            cluster_id: 6,
            payload: vec![0x01],
        };
        inbox.handle(&rx_message(&inbox, &message));
    }

    #[test]
    fn test_guard_discards_pending_entry() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let key = PendingKey {
            network_address: 1,
            endpoint: 1,
            cluster_id: 6,
            sequence: 0,
        };
        let (tx, _rx) = oneshot::channel();
        pending.lock().insert(key, tx);
        drop(PendingGuard {
            key,
            pending: pending.clone(),
        });
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_request_discards_pending_entry() {
        let (client, _event_loop) =
            AsyncClient::new(rumqttc::MqttOptions::new("test", "localhost", 1883), 10);
        let stack = MqttStack {
            client,
            inbox: Arc::new(inbox()),
            sequence: AtomicU8::new(0),
            tasks: Vec::new(),
        };

        let apdu = Apdu::toggle();
        let mut request = stack.request(1, RemoteAddress::new(0x1A2B, 0x0B), &apdu);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut request)
                .await
                .is_err()
        );
        assert_eq!(stack.inbox.pending.lock().len(), 1);

        drop(request);
        assert!(stack.inbox.pending.lock().is_empty());
    }
}
