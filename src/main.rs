use clap::{Parser, ValueEnum};
use dht_sensor_bridge::accessory::DhtAccessory;
use dht_sensor_bridge::config::{self, BackendConfig, Config};
use dht_sensor_bridge::coordinator::Coordinator;
use dht_sensor_bridge::error::{BridgeError, Result};
use dht_sensor_bridge::input::{IioSensor, PhysicalSensor, SensorKind, SimulatedSensor};
use dht_sensor_bridge::instance_lock::InstanceLock;
use dht_sensor_bridge::output::MqttPublisher;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Iio,
    Simulated,
}

/// Overrides for settings otherwise read from the environment / `.env`.
#[derive(Parser)]
#[command(name = "dht-sensor-bridge")]
#[command(about = "Expose a DHT temperature/humidity sensor to a home-automation host")]
struct Cli {
    /// Accessory name
    #[arg(long)]
    name: Option<String>,

    /// Sensor type: 11, 22, dht11, dht22 or am2302
    #[arg(long)]
    kind: Option<SensorKind>,

    /// GPIO pin of the sensor data line
    #[arg(long)]
    pin: Option<u8>,

    /// Seconds between periodic updates
    #[arg(long)]
    interval: Option<u64>,

    /// Physical read backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// IIO device directory for the iio backend
    #[arg(long)]
    iio_device: Option<PathBuf>,

    /// Read the sensor once, print the result and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(name) = &self.name {
            config.sensor.name = name.clone();
        }
        if let Some(kind) = self.kind {
            config.sensor.kind = kind;
        }
        if let Some(pin) = self.pin {
            config.sensor.pin = pin;
        }
        if let Some(interval) = self.interval {
            config.sensor.poll_interval_secs = interval;
        }
        let simulated = matches!(config.backend, BackendConfig::Simulated { .. });
        match self.backend {
            Some(Backend::Simulated) if !simulated => {
                config.backend = BackendConfig::Simulated {
                    latency_ms: 250,
                    failure_ratio: 0.0,
                };
            }
            Some(Backend::Iio) if simulated => {
                config.backend = Config::default().backend;
            }
            _ => {}
        }
        if let Some(device) = &self.iio_device {
            config.backend = BackendConfig::Iio {
                device: device.clone(),
            };
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn physical_sensor(backend: &BackendConfig) -> Arc<dyn PhysicalSensor> {
    match backend {
        BackendConfig::Iio { device } => Arc::new(IioSensor::new(device)),
        BackendConfig::Simulated {
            latency_ms,
            failure_ratio,
        } => Arc::new(SimulatedSensor::new(
            Duration::from_millis(*latency_ms),
            *failure_ratio,
        )),
    }
}

fn main() {
    // Load .env file before anything else
    config::load_dotenv();
    let cli = Cli::parse();
    init_logger();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(BridgeError::from)
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    cli.apply(&mut config);

    let identity = config.sensor.identity();
    info!("Starting DHT Sensor Bridge");
    info!("Configuration loaded:");
    info!("  Name: {}", config.sensor.name);
    info!("  Sensor: {}", identity);
    info!("  Backend: {:?}", config.backend);
    info!("  Poll interval: {}s", config.sensor.poll_interval().as_secs());

    let _lock = InstanceLock::acquire(identity)?;
    let coordinator = Coordinator::new(physical_sensor(&config.backend));

    if cli.once {
        let reading = coordinator.request(identity).await?;
        println!("{}", serde_json::to_string(&reading)?);
        return Ok(());
    }

    let (publisher, mqtt_task) = match &config.mqtt {
        Some(mqtt) => {
            let (publisher, task) = MqttPublisher::spawn(mqtt, &config.sensor.name);
            (Some(publisher), Some(task))
        }
        None => (None, None),
    };

    let mut accessory = DhtAccessory::new(config.sensor.name.clone(), identity, coordinator);
    if let Some(publisher) = publisher {
        accessory = accessory.with_publisher(publisher);
    }
    let accessory = Arc::new(accessory);

    let cancel = CancellationToken::new();
    let poller = accessory
        .clone()
        .run_poller(config.sensor.poll_interval(), cancel.clone());

    info!("DHT Sensor Bridge is running");
    info!("  - Press Ctrl+C to exit");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    cancel.cancel();
    let _ = poller.await;
    if let Some(task) = mqtt_task {
        task.abort();
    }

    info!("DHT Sensor Bridge stopped");
    Ok(())
}
