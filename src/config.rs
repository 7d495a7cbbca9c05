use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default cluster-definition schema for an HA dimmable light.
pub const DEFAULT_CLUSTER_SCHEMA: &str = "/usr/lib/rsserial/philips_hue/hueclusters.json";

/// Load environment variables from a .env file.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called before the async runtime spawns any worker threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key, value));
        }
    }

    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub endpoint: EndpointConfig,
    pub http: HttpConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic prefix the coprocessor bridge publishes under.
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint id to claim; the registry may hand out another one.
    pub requested_id: u8,
    pub cluster_schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
}

/// How a state-changing command and its follow-up refresh are sequenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Command and refresh reads are outstanding at the same time.
    #[default]
    Concurrent,
    /// Await the command's completion before issuing the reads.
    Sequenced,
}

impl std::str::FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(Self::Concurrent),
            "sequenced" => Ok(Self::Sequenced),
            other => Err(format!("unknown refresh policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub command_timeout_ms: u64,
    pub refresh: RefreshPolicy,
}

impl DispatchConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 3000,
            refresh: RefreshPolicy::Concurrent,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: "zigbee-dimmable-light".to_string(),
                username: None,
                password: None,
                topic_prefix: "zigbee".to_string(),
            },
            endpoint: EndpointConfig {
                requested_id: 1,
                cluster_schema: DEFAULT_CLUSTER_SCHEMA.to_string(),
            },
            http: HttpConfig {
                bind: "0.0.0.0:8080".to_string(),
            },
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Ok(prefix) = std::env::var("ZIGBEE_TOPIC_PREFIX") {
            config.mqtt.topic_prefix = prefix;
        }

        // Local endpoint
        if let Ok(id) = std::env::var("LOCAL_ENDPOINT_ID")
            && let Ok(id) = id.parse()
        {
            config.endpoint.requested_id = id;
        }
        if let Ok(path) = std::env::var("CLUSTER_SCHEMA_PATH") {
            config.endpoint.cluster_schema = path;
        }

        if let Ok(bind) = std::env::var("HTTP_BIND") {
            config.http.bind = bind;
        }

        // Dispatch
        if let Ok(timeout) = std::env::var("COMMAND_TIMEOUT_MS")
            && let Ok(t) = timeout.parse()
        {
            config.dispatch.command_timeout_ms = t;
        }
        if let Ok(policy) = std::env::var("REFRESH_POLICY") {
            match policy.parse() {
                Ok(p) => config.dispatch.refresh = p,
                Err(e) => log::warn!("Ignoring REFRESH_POLICY: {}", e),
            }
        }

        config
    }
}
