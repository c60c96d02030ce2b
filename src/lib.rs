//! DHT Sensor Bridge library.
//!
//! Exposes a one-wire DHT temperature/humidity sensor to a home-automation
//! host as two characteristics, with a single-flight read coordinator so
//! concurrent requests never overlap on the sensor's data line.

pub mod accessory;
pub mod characteristics;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod instance_lock;
pub mod output;
