//! Physical sensor layer.
//!
//! This module defines what a single hardware transaction looks like
//! ([`PhysicalSensor::read`]) and the backends that perform it:
//! - `iio`: Linux IIO sysfs attributes exposed by the kernel `dht11` driver
//! - `simulation`: synthetic readings for development without hardware
//!
//! Backends are assumed non-reentrant for a given [`SensorIdentity`]; callers
//! go through [`crate::coordinator::Coordinator`] instead of calling them
//! directly.

pub mod iio;
pub mod simulation;

pub use iio::IioSensor;
pub use simulation::SimulatedSensor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use thiserror::Error;

/// DHT sensor family.
///
/// The AM2302 is a packaged DHT22 and shares its wire protocol, so it parses
/// to [`SensorKind::Dht22`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    #[strum(to_string = "dht11", serialize = "11")]
    Dht11,
    #[strum(to_string = "dht22", serialize = "22", serialize = "am2302")]
    Dht22,
}

impl SensorKind {
    /// Numeric type code used by DHT driver libraries (11 or 22).
    pub fn code(self) -> u8 {
        match self {
            SensorKind::Dht11 => 11,
            SensorKind::Dht22 => 22,
        }
    }

    /// Measurable temperature range in °C.
    pub fn temperature_range(self) -> (f32, f32) {
        match self {
            SensorKind::Dht11 => (0.0, 50.0),
            SensorKind::Dht22 => (-40.0, 80.0),
        }
    }

    /// Measurable relative humidity range in %.
    pub fn humidity_range(self) -> (f32, f32) {
        match self {
            SensorKind::Dht11 => (20.0, 90.0),
            SensorKind::Dht22 => (0.0, 100.0),
        }
    }
}

/// Address of one physical sensor: its family and the GPIO pin of its data line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorIdentity {
    pub kind: SensorKind,
    pub pin: u8,
}

impl SensorIdentity {
    pub fn new(kind: SensorKind, pin: u8) -> Self {
        Self { kind, pin }
    }
}

impl Default for SensorIdentity {
    fn default() -> Self {
        Self {
            kind: SensorKind::Dht22,
            pin: 4,
        }
    }
}

impl fmt::Display for SensorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@gpio{}", self.kind, self.pin)
    }
}

/// One completed measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in °C
    pub temperature: f32,
    /// Relative humidity in %
    pub humidity: f32,
}

impl Reading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

/// Failure reported by the physical layer for a single transaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("checksum mismatch")]
    Checksum,

    #[error("timed out waiting for sensor")]
    Timeout,

    #[error("sensor did not respond")]
    NoResponse,

    #[error("invalid sensor data: {0}")]
    InvalidData(String),

    #[error("{quantity} reading {value} outside sensor range")]
    OutOfRange { quantity: &'static str, value: f32 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("read aborted: {0}")]
    Aborted(String),
}

/// A slow, non-reentrant hardware read primitive.
#[async_trait]
pub trait PhysicalSensor: Send + Sync {
    /// Perform one hardware transaction against `identity`.
    async fn read(&self, identity: SensorIdentity) -> Result<Reading, ReadError>;
}

/// Reject readings the sensor family cannot physically produce.
pub fn check_range(identity: SensorIdentity, reading: Reading) -> Result<Reading, ReadError> {
    let (t_min, t_max) = identity.kind.temperature_range();
    if !(t_min..=t_max).contains(&reading.temperature) {
        return Err(ReadError::OutOfRange {
            quantity: "temperature",
            value: reading.temperature,
        });
    }

    let (h_min, h_max) = identity.kind.humidity_range();
    if !(h_min..=h_max).contains(&reading.humidity) {
        return Err(ReadError::OutOfRange {
            quantity: "humidity",
            value: reading.humidity,
        });
    }

    Ok(reading)
}
