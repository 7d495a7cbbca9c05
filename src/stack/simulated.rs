//! In-process ZigBee network with virtual dimmable bulbs.
//!
//! Frames go through the real ZCL codec on both directions so the
//! controller exercises the same encode/decode path it uses on air.

use crate::device::{RemoteAddress, RemoteDescriptor, SimpleDescriptor};
use crate::error::{ControllerError, Result};
use crate::stack::{EVENT_CHANNEL_CAPACITY, NetworkEvent, ZigbeeStack};
use crate::zcl::attribute::encode_read_response;
use crate::zcl::frame::global_cmd;
use crate::zcl::{
    Apdu, AttributeRecord, AttributeValue, ClusterCommand, ClusterId, DIMMABLE_LIGHT_DEVICE_ID,
    FrameType, HA_PROFILE_ID, OnOffCommand, ZclFrame, ZclStatus, identify_attrs, level_attrs,
    on_off_attrs,
};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::broadcast;

/// Descriptor of an HA dimmable light endpoint.
pub fn dimmable_light(ieee_address: u64, network_address: u16, endpoint: u8) -> RemoteDescriptor {
    RemoteDescriptor {
        ieee_address,
        network_address,
        endpoint,
        profile_id: HA_PROFILE_ID,
        device_id: DIMMABLE_LIGHT_DEVICE_ID,
        device_version: 1,
        in_clusters: vec![
            ClusterId::Identify.id(),
            ClusterId::OnOff.id(),
            ClusterId::LevelControl.id(),
        ],
    }
}

/// State of one virtual bulb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedLight {
    pub descriptor: RemoteDescriptor,
    pub on: bool,
    pub level: u8,
    pub on_time: u16,
    pub off_wait_time: u16,
    pub on_off_transition_time: u16,
    pub identify_time: u16,
    /// Unresponsive bulbs swallow frames without answering.
    pub responsive: bool,
}

impl SimulatedLight {
    fn new(descriptor: RemoteDescriptor) -> Self {
        Self {
            descriptor,
            on: false,
            level: 0x80,
            on_time: 0,
            off_wait_time: 0,
            on_off_transition_time: 0,
            identify_time: 0,
            responsive: true,
        }
    }

    fn read(&self, cluster: ClusterId, id: u16) -> AttributeRecord {
        let value = match (cluster, id) {
            (ClusterId::OnOff, on_off_attrs::ON_OFF) => AttributeValue::Bool(self.on),
            (ClusterId::OnOff, on_off_attrs::ON_TIME) => AttributeValue::U16(self.on_time),
            (ClusterId::OnOff, on_off_attrs::OFF_WAIT_TIME) => {
                AttributeValue::U16(self.off_wait_time)
            }
            (ClusterId::LevelControl, level_attrs::CURRENT_LEVEL) => AttributeValue::U8(self.level),
            (ClusterId::LevelControl, level_attrs::ON_OFF_TRANSITION_TIME) => {
                AttributeValue::U16(self.on_off_transition_time)
            }
            (ClusterId::Identify, identify_attrs::IDENTIFY_TIME) => {
                AttributeValue::U16(self.identify_time)
            }
            // RemainingTime and OnLevel are optional; this bulb lacks them.
            _ => return AttributeRecord::unsupported(id),
        };
        AttributeRecord::success(id, value)
    }

    /// Apply a decoded request and build the response frame.
    fn apply(&mut self, request: &ZclFrame, apdu: &Apdu) -> ZclFrame {
        match &apdu.command {
            ClusterCommand::ReadAttributes(ids) => {
                let records: Vec<AttributeRecord> =
                    ids.iter().map(|id| self.read(apdu.cluster, *id)).collect();
                return ZclFrame::response_to(
                    &request.header,
                    FrameType::Global,
                    global_cmd::READ_ATTRIBUTES_RESPONSE,
                    encode_read_response(&records),
                );
            }
            ClusterCommand::OnOff(cmd) => {
                self.on = match cmd {
                    OnOffCommand::Off => false,
                    OnOffCommand::On => true,
                    OnOffCommand::Toggle => !self.on,
                };
            }
            ClusterCommand::MoveToLevel { level, .. } => self.level = *level,
            ClusterCommand::Identify { identify_time } => self.identify_time = *identify_time,
        }
        ZclFrame::default_response(&request.header, ZclStatus::Success)
    }
}

/// [`ZigbeeStack`] serving virtual bulbs from memory.
pub struct SimulatedStack {
    lights: Mutex<HashMap<RemoteAddress, SimulatedLight>>,
    registered: Mutex<BTreeMap<u8, SimpleDescriptor>>,
    log: Mutex<Vec<(RemoteAddress, Apdu)>>,
    events: broadcast::Sender<NetworkEvent>,
    sequence: AtomicU8,
    available: AtomicBool,
}

impl SimulatedStack {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            lights: Mutex::new(HashMap::new()),
            registered: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
            events,
            sequence: AtomicU8::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Add (or re-add) a device and announce its join.
    pub fn join(&self, descriptor: RemoteDescriptor) {
        info!(
            "[Sim] Device 0x{:016X} joined as {}",
            descriptor.ieee_address,
            descriptor.address()
        );
        {
            let mut lights = self.lights.lock();
            // A rejoin may come with a new network address.
            lights.retain(|_, light| light.descriptor.stable_id() != descriptor.stable_id());
            lights.insert(descriptor.address(), SimulatedLight::new(descriptor.clone()));
        }
        let _ = self.events.send(NetworkEvent::DeviceJoined(descriptor));
    }

    /// Remove every endpoint of a device and announce the leave.
    pub fn leave(&self, ieee_address: u64) {
        info!("[Sim] Device 0x{:016X} left", ieee_address);
        self.lights
            .lock()
            .retain(|_, light| light.descriptor.ieee_address != ieee_address);
        let _ = self.events.send(NetworkEvent::DeviceLeft { ieee_address });
    }

    /// Make a bulb stop (or resume) answering frames.
    pub fn set_responsive(&self, address: RemoteAddress, responsive: bool) {
        if let Some(light) = self.lights.lock().get_mut(&address) {
            light.responsive = responsive;
        }
    }

    /// Simulate the coprocessor being offline.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn light(&self, address: RemoteAddress) -> Option<SimulatedLight> {
        self.lights.lock().get(&address).cloned()
    }

    /// Change a bulb behind the controller's back (e.g. a wall switch).
    pub fn update_light(&self, address: RemoteAddress, update: impl FnOnce(&mut SimulatedLight)) {
        if let Some(light) = self.lights.lock().get_mut(&address) {
            update(light);
        }
    }

    /// Every APDU delivered to `address`, oldest first.
    pub fn sent_to(&self, address: RemoteAddress) -> Vec<Apdu> {
        self.log
            .lock()
            .iter()
            .filter(|(target, _)| *target == address)
            .map(|(_, apdu)| apdu.clone())
            .collect()
    }

    /// State-changing commands delivered to `address`.
    pub fn commands_sent_to(&self, address: RemoteAddress) -> Vec<Apdu> {
        self.sent_to(address)
            .into_iter()
            .filter(|apdu| apdu.command.is_state_changing())
            .collect()
    }

    pub fn registered_endpoints(&self) -> Vec<u8> {
        self.registered.lock().keys().copied().collect()
    }

    fn exchange(&self, target: RemoteAddress, apdu: &Apdu) -> Result<Option<ZclFrame>> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let wire = apdu.to_frame(sequence).encode();

        let request = ZclFrame::decode(&wire)?;
        let received = Apdu::from_frame(apdu.cluster, &request)?;

        let mut lights = self.lights.lock();
        let light = lights
            .get_mut(&target)
            .ok_or_else(|| ControllerError::Communication(format!("no route to {}", target)))?;
        self.log.lock().push((target, received.clone()));

        if !light.responsive {
            debug!("[Sim] {} ignored {}", target, received);
            return Ok(None);
        }

        let response = light.apply(&request, &received);
        debug!("[Sim] {} handled {}", target, received);
        Ok(Some(ZclFrame::decode(&response.encode())?))
    }
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ZigbeeStack for SimulatedStack {
    async fn register_endpoint(&self, endpoint: u8, descriptor: &SimpleDescriptor) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ControllerError::Registration(
                "simulated coprocessor offline".to_string(),
            ));
        }
        self.registered.lock().insert(endpoint, descriptor.clone());
        Ok(())
    }

    async fn request(&self, _source: u8, target: RemoteAddress, apdu: &Apdu) -> Result<ZclFrame> {
        match self.exchange(target, apdu)? {
            Some(response) => Ok(response),
            // The continuation never fires; callers must time out.
            None => std::future::pending().await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }
}
