use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use zigbee_dimmable_light::config::{Config, RefreshPolicy, load_dotenv};
use zigbee_dimmable_light::controller::LightController;
use zigbee_dimmable_light::device::RemoteDescriptor;
use zigbee_dimmable_light::http;
use zigbee_dimmable_light::stack::simulated::dimmable_light;
use zigbee_dimmable_light::stack::{MqttStack, SimulatedStack, ZigbeeStack};

#[derive(Parser, Debug)]
#[command(name = "zigbee-dimmable-light")]
#[command(about = "ZigBee HA dimmable-light controller")]
struct Cli {
    /// Use in-process virtual bulbs instead of the MQTT coprocessor bridge
    #[arg(long, env = "ZIGBEE_SIMULATE")]
    simulate: bool,

    /// HTTP listen address
    #[arg(long)]
    bind: Option<String>,

    /// Requested local endpoint id
    #[arg(long)]
    endpoint: Option<u8>,

    /// Per-command response timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Await each command before re-reading attributes
    #[arg(long)]
    sequenced: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Bulbs announced by `--simulate`.
fn demo_bulbs() -> Vec<RemoteDescriptor> {
    vec![
        dimmable_light(0x0017_8801_0000_0001, 0x1A2B, 0x0B),
        dimmable_light(0x0017_8801_0000_0002, 0x3C4D, 0x0B),
    ]
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(bind) = cli.bind {
        config.http.bind = bind;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint.requested_id = endpoint;
    }
    if let Some(timeout) = cli.timeout_ms {
        config.dispatch.command_timeout_ms = timeout;
    }
    if cli.sequenced {
        config.dispatch.refresh = RefreshPolicy::Sequenced;
    }

    info!("Starting ZigBee dimmable-light controller");
    info!("Configuration loaded:");
    if cli.simulate {
        info!("  Stack: simulated");
    } else {
        info!(
            "  MQTT broker: {}:{} (prefix '{}')",
            config.mqtt.broker_host, config.mqtt.broker_port, config.mqtt.topic_prefix
        );
    }
    info!("  Requested endpoint: {}", config.endpoint.requested_id);
    info!("  HTTP bind: {}", config.http.bind);
    info!(
        "  Command timeout: {} ms ({:?} refresh)",
        config.dispatch.command_timeout_ms, config.dispatch.refresh
    );

    let shutdown = CancellationToken::new();

    let simulated = cli.simulate.then(|| Arc::new(SimulatedStack::new()));
    let stack: Arc<dyn ZigbeeStack> = match &simulated {
        Some(stack) => stack.clone(),
        None => match MqttStack::connect(&config.mqtt).await {
            Ok(stack) => Arc::new(stack),
            Err(e) => {
                error!("Failed to connect to the ZigBee stack: {}", e);
                std::process::exit(1);
            }
        },
    };

    let controller = match LightController::start(stack, &config).await {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            error!("Failed to start controller: {}", e);
            std::process::exit(1);
        }
    };

    let pairing_task = controller.spawn_pairing(shutdown.clone());

    // Announced after the controller has subscribed to join events.
    if let Some(stack) = &simulated {
        for bulb in demo_bulbs() {
            stack.join(bulb);
        }
    }

    let http_controller = controller.clone();
    let http_shutdown = shutdown.clone();
    let bind = config.http.bind.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http::serve(http_controller, &bind, http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("Controller is running");
    info!("  - Local endpoint at {}", controller.local().uri());
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    shutdown.cancel();
    let _ = pairing_task.await;
    let _ = http_task.await;

    info!("Controller stopped");
}
