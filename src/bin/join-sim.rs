//! Dev tool announcing bulb joins and leaves on the coprocessor bridge topics.
//!
//! Usage:
//!   cargo run --bin join-sim -- join --ieee 0x00178801AABBCCDD --nwk 0x1A2B --endpoint 11
//!   cargo run --bin join-sim -- leave --ieee 0x00178801AABBCCDD
//!
//! The controller treats these exactly like announcements from the
//! coprocessor, which makes pairing observable without a radio.

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use zigbee_dimmable_light::config::{Config, load_dotenv};
use zigbee_dimmable_light::device::RemoteDescriptor;
use zigbee_dimmable_light::stack::{MqttClient, NetworkEvent};
use zigbee_dimmable_light::zcl::{ClusterId, DIMMABLE_LIGHT_DEVICE_ID, HA_PROFILE_ID};

#[derive(Parser, Debug)]
#[command(name = "join-sim")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Announce a joined endpoint
    Join {
        #[arg(long, value_parser = parse_u64)]
        ieee: u64,
        #[arg(long, value_parser = parse_u16)]
        nwk: u16,
        #[arg(long, default_value_t = 11)]
        endpoint: u8,
        #[arg(long, value_parser = parse_u16, default_value = "0x0104")]
        profile: u16,
        #[arg(long, value_parser = parse_u16, default_value = "0x0101")]
        device: u16,
    },
    /// Announce that a device left the network
    Leave {
        #[arg(long, value_parser = parse_u64)]
        ieee: u64,
    },
}

fn parse_u64(raw: &str) -> Result<u64, String> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    }
    .map_err(|e| format!("'{}': {}", raw, e))
}

fn parse_u16(raw: &str) -> Result<u16, String> {
    let value = parse_u64(raw)?;
    u16::try_from(value).map_err(|_| format!("'{}' does not fit in 16 bits", raw))
}

#[tokio::main]
async fn main() {
    load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let event = match cli.command {
        Command::Join {
            ieee,
            nwk,
            endpoint,
            profile,
            device,
        } => {
            if (profile, device) != (HA_PROFILE_ID, DIMMABLE_LIGHT_DEVICE_ID) {
                warn!("Signature 0x{:04X}/0x{:04X} will not pair", profile, device);
            }
            NetworkEvent::DeviceJoined(RemoteDescriptor {
                ieee_address: ieee,
                network_address: nwk,
                endpoint,
                profile_id: profile,
                device_id: device,
                device_version: 1,
                in_clusters: vec![
                    ClusterId::Identify.id(),
                    ClusterId::OnOff.id(),
                    ClusterId::LevelControl.id(),
                ],
            })
        }
        Command::Leave { ieee } => NetworkEvent::DeviceLeft { ieee_address: ieee },
    };

    let payload = match serde_json::to_string(&event) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to encode event: {}", e);
            std::process::exit(1);
        }
    };
    let topic = format!("{}/events", config.mqtt.topic_prefix.trim_end_matches('/'));

    info!(
        "Connecting to MQTT broker at {}:{}",
        config.mqtt.broker_host, config.mqtt.broker_port
    );
    let client = MqttClient::new(&config.mqtt);
    let publisher = client.client();
    let (msg_tx, _msg_rx) = mpsc::channel(1);
    let (connected_tx, connected_rx) = oneshot::channel();
    let mqtt_handle = tokio::spawn(client.run(Vec::new(), msg_tx, Some(connected_tx)));

    if tokio::time::timeout(Duration::from_secs(10), connected_rx)
        .await
        .is_err()
    {
        error!("Timed out connecting to the broker");
        std::process::exit(1);
    }

    info!("Publishing to {}: {}", topic, payload);
    if let Err(e) = publisher
        .publish(topic, rumqttc::QoS::AtLeastOnce, false, payload.into_bytes())
        .await
    {
        error!("Failed to publish: {}", e);
        std::process::exit(1);
    }

    // Give the event loop a moment to flush the publish.
    tokio::time::sleep(Duration::from_millis(500)).await;
    mqtt_handle.abort();
    info!("Done.");
}
