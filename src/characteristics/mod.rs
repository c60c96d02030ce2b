//! Host-facing characteristic values.
//!
//! The accessory exposes two characteristics: current temperature and current
//! relative humidity. Each is a small thread-safe cell holding the last value
//! reported to the host, in the fixed-point units home-automation hosts use
//! (hundredths of a degree / percent).
//!
//! A failed read leaves the cell untouched, so the host keeps seeing the last
//! good value until the next successful cycle.

pub mod humidity;
pub mod temperature;

pub use humidity::HumidityCharacteristic;
pub use temperature::TemperatureCharacteristic;

/// Trait for characteristics with change detection.
///
/// The version is incremented each time the stored value changes. The
/// accessory compares versions to skip publishing cycles where nothing moved.
pub trait Characteristic: Send + Sync {
    /// Get the current version number.
    fn version(&self) -> u32;
}
