//! MQTT transport to the ZigBee coprocessor daemon.

mod bridge;
mod client;

pub use bridge::{ApsMessage, MqttStack};
pub use client::{MqttClient, MqttMessage};
