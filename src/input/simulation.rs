//! Sensor simulation for testing.
//!
//! Provides a physical sensor stand-in that behaves like a DHT on a busy line:
//! each read takes a while, values drift slowly, and some reads time out.

use super::{PhysicalSensor, ReadError, Reading, SensorIdentity, check_range};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;

/// Simulated DHT sensor.
pub struct SimulatedSensor {
    latency: Duration,
    failure_ratio: f64,
    last: Mutex<Reading>,
}

impl SimulatedSensor {
    /// Create a simulated sensor.
    ///
    /// # Arguments
    /// * `latency` - How long each read takes
    /// * `failure_ratio` - Probability (0.0-1.0) that a read times out; NaN counts as 0.0
    pub fn new(latency: Duration, failure_ratio: f64) -> Self {
        // clamp passes NaN through and gen_bool panics on it
        let failure_ratio = if failure_ratio.is_nan() {
            0.0
        } else {
            failure_ratio.clamp(0.0, 1.0)
        };
        Self {
            latency,
            failure_ratio,
            last: Mutex::new(Reading::new(21.5, 46.0)),
        }
    }

    /// Advance the random walk and return the next value.
    fn next_reading(&self) -> Option<Reading> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.failure_ratio) {
            return None;
        }

        let mut last = self.last.lock();
        last.temperature = (last.temperature + rng.gen_range(-0.2..=0.2)).clamp(15.0, 30.0);
        last.humidity = (last.humidity + rng.gen_range(-0.5..=0.5)).clamp(25.0, 75.0);
        Some(*last)
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 0.0)
    }
}

#[async_trait]
impl PhysicalSensor for SimulatedSensor {
    async fn read(&self, identity: SensorIdentity) -> Result<Reading, ReadError> {
        tokio::time::sleep(self.latency).await;

        let Some(reading) = self.next_reading() else {
            debug!("[Sim] {} read timed out", identity);
            return Err(ReadError::Timeout);
        };
        debug!(
            "[Sim] {} read {:.1}°C {:.1}%",
            identity, reading.temperature, reading.humidity
        );
        check_range(identity, reading)
    }
}
