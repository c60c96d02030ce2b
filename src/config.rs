use crate::input::iio::DEFAULT_IIO_DEVICE;
use crate::input::{SensorIdentity, SensorKind};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Parse `.env` content into key/value pairs.
/// Handles values with spaces without requiring quotes.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let mut value = value.trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key.trim(), value));
        }
    }

    pairs
}

/// Load environment variables from a `.env` file in the working directory.
///
/// Variables already present in the environment take precedence.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the async runtime starts any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sensor: SensorConfig,
    pub backend: BackendConfig,
    /// MQTT publishing is enabled only when a broker host is configured.
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Accessory name shown by the host
    pub name: String,
    pub kind: SensorKind,
    /// GPIO pin of the data line
    pub pin: u8,
    pub poll_interval_secs: u64,
}

impl SensorConfig {
    pub fn identity(&self) -> SensorIdentity {
        SensorIdentity::new(self.kind, self.pin)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Where physical reads come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Kernel `dht11` IIO driver
    Iio { device: PathBuf },
    /// Synthetic readings, no hardware needed
    Simulated { latency_ms: u64, failure_ratio: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// State is published to `{base_topic}/{sensor name}/state`
    pub base_topic: String,
}

impl MqttConfig {
    pub fn new(broker_host: impl Into<String>) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port: 1883,
            client_id: "dht-sensor-bridge".to_string(),
            username: None,
            password: None,
            base_topic: "dht-sensor-bridge".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let identity = SensorIdentity::default();
        Self {
            sensor: SensorConfig {
                name: "DHT Sensor".to_string(),
                kind: identity.kind,
                pin: identity.pin,
                poll_interval_secs: 60,
            },
            backend: BackendConfig::Iio {
                device: PathBuf::from(DEFAULT_IIO_DEVICE),
            },
            mqtt: None,
        }
    }
}

/// Parse `raw` or fall back to `default` with a warning.
fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup.
    ///
    /// Missing variables take their defaults; unparseable ones are logged
    /// and also defaulted.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("SENSOR_NAME") {
            config.sensor.name = name;
        }
        config.sensor.kind = parse_or("SENSOR_KIND", lookup("SENSOR_KIND"), config.sensor.kind);
        config.sensor.pin = parse_or("SENSOR_PIN", lookup("SENSOR_PIN"), config.sensor.pin);
        config.sensor.poll_interval_secs = parse_or(
            "POLL_INTERVAL_SECS",
            lookup("POLL_INTERVAL_SECS"),
            config.sensor.poll_interval_secs,
        );

        // Backend configuration
        match lookup("SENSOR_BACKEND").as_deref().map(str::trim) {
            None | Some("iio") => {
                if let Some(device) = lookup("IIO_DEVICE") {
                    config.backend = BackendConfig::Iio {
                        device: PathBuf::from(device),
                    };
                }
            }
            Some("simulated") | Some("sim") => {
                config.backend = BackendConfig::Simulated {
                    latency_ms: parse_or("SIM_LATENCY_MS", lookup("SIM_LATENCY_MS"), 250),
                    failure_ratio: parse_or("SIM_FAILURE_RATIO", lookup("SIM_FAILURE_RATIO"), 0.0),
                };
            }
            Some(other) => {
                warn!("Unknown SENSOR_BACKEND {:?}, using iio", other);
            }
        }

        // MQTT configuration
        if let Some(host) = lookup("MQTT_BROKER_HOST") {
            let mut mqtt = MqttConfig::new(host);
            mqtt.broker_port = parse_or("MQTT_BROKER_PORT", lookup("MQTT_BROKER_PORT"), 1883);
            if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
                mqtt.client_id = client_id;
            }
            mqtt.username = lookup("MQTT_USERNAME");
            mqtt.password = lookup("MQTT_PASSWORD");
            if let Some(base_topic) = lookup("MQTT_BASE_TOPIC") {
                mqtt.base_topic = base_topic.trim_end_matches('/').to_string();
            }
            config.mqtt = Some(mqtt);
        }

        config
    }
}
