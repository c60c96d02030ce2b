//! DHT temperature/humidity accessory.
//!
//! Glue between the host and the [`Coordinator`]: two characteristic getters
//! and a periodic poller, all of which read through the coordinator so that
//! overlapping requests share one physical read.

use crate::characteristics::{Characteristic, HumidityCharacteristic, TemperatureCharacteristic};
use crate::coordinator::Coordinator;
use crate::error::SensorReadFailed;
use crate::input::{Reading, SensorIdentity};
use crate::output::MqttPublisher;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Accessory exposing one DHT sensor as two characteristics.
pub struct DhtAccessory {
    name: String,
    identity: SensorIdentity,
    coordinator: Coordinator,
    temperature: Arc<TemperatureCharacteristic>,
    humidity: Arc<HumidityCharacteristic>,
    publisher: Option<MqttPublisher>,
    /// Characteristic versions of the last state handed to the publisher
    published_versions: Mutex<Option<(u32, u32)>>,
}

impl DhtAccessory {
    pub fn new(
        name: impl Into<String>,
        identity: SensorIdentity,
        coordinator: Coordinator,
    ) -> Self {
        let name = name.into();
        info!("Accessory {:?} reading {}", name, identity);
        Self {
            name,
            identity,
            coordinator,
            temperature: Arc::new(TemperatureCharacteristic::new(0.0)),
            humidity: Arc::new(HumidityCharacteristic::new(0.0)),
            publisher: None,
            published_versions: Mutex::new(None),
        }
    }

    /// Push periodic readings that changed a characteristic through `publisher`.
    pub fn with_publisher(mut self, publisher: MqttPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> SensorIdentity {
        self.identity
    }

    /// Last reported temperature.
    pub fn temperature(&self) -> Arc<TemperatureCharacteristic> {
        self.temperature.clone()
    }

    /// Last reported humidity.
    pub fn humidity(&self) -> Arc<HumidityCharacteristic> {
        self.humidity.clone()
    }

    async fn read(&self) -> Result<Reading, SensorReadFailed> {
        let reading = self.coordinator.request(self.identity).await?;
        self.temperature.set_celsius(reading.temperature);
        self.humidity.set_percent(reading.humidity);
        Ok(reading)
    }

    /// Get the current temperature in °C with a fresh sensor read.
    pub async fn current_temperature(&self) -> Result<f32, SensorReadFailed> {
        debug!("Triggered GET CurrentTemperature");
        Ok(self.read().await?.temperature)
    }

    /// Get the current relative humidity in % with a fresh sensor read.
    pub async fn current_relative_humidity(&self) -> Result<f32, SensorReadFailed> {
        debug!("Triggered GET CurrentRelativeHumidity");
        Ok(self.read().await?.humidity)
    }

    /// Callback-style getter for hosts that cannot await.
    ///
    /// The callback runs on a runtime task once the read settles.
    pub fn handle_current_temperature_get<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(Result<f32, SensorReadFailed>) + Send + 'static,
    {
        let accessory = self.clone();
        tokio::spawn(async move {
            callback(accessory.current_temperature().await);
        });
    }

    /// Callback-style counterpart of [`Self::current_relative_humidity`].
    pub fn handle_current_relative_humidity_get<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(Result<f32, SensorReadFailed>) + Send + 'static,
    {
        let accessory = self.clone();
        tokio::spawn(async move {
            callback(accessory.current_relative_humidity().await);
        });
    }

    /// Run one periodic update cycle.
    ///
    /// A failed read is logged and the cycle skipped; both characteristics
    /// keep their previous values.
    pub async fn poll_once(&self) -> Option<Reading> {
        let reading = match self.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Skipping update of {:?}: {}", self.name, e);
                return None;
            }
        };
        info!(
            "{}: {:.1}°C, {:.1}%",
            self.name, reading.temperature, reading.humidity
        );

        if let Some(publisher) = &self.publisher
            && let Some(versions) = self.unpublished_versions()
        {
            match publisher.publish(self.identity, reading) {
                Ok(()) => *self.published_versions.lock() = Some(versions),
                Err(e) => warn!("Failed to publish to {}: {}", publisher.topic(), e),
            }
        }
        Some(reading)
    }

    /// Current characteristic versions, if they differ from the last published ones.
    fn unpublished_versions(&self) -> Option<(u32, u32)> {
        let versions = (self.temperature.version(), self.humidity.version());
        let published = *self.published_versions.lock();
        (published != Some(versions)).then_some(versions)
    }

    /// Spawn the periodic poller. The first cycle runs immediately.
    pub fn run_poller(
        self: Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // A slow read should not cause a burst of catch-up reads
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Poller for {:?} stopped", self.name);
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                }
            }
        })
    }
}
