//! CurrentTemperature characteristic.
//!
//! Temperature is stored in centidegrees Celsius (value * 100).
//!
//! For example: 21.5°C is stored as 2150.

use super::Characteristic;
use std::sync::atomic::{AtomicI16, AtomicU32, Ordering};

/// Last reported temperature.
pub struct TemperatureCharacteristic {
    /// Temperature in centidegrees Celsius (°C * 100)
    value: AtomicI16,
    /// Version counter for change detection
    version: AtomicU32,
}

impl TemperatureCharacteristic {
    /// Create a new characteristic with initial value.
    ///
    /// # Arguments
    /// * `initial_celsius` - Initial temperature in degrees Celsius
    pub fn new(initial_celsius: f32) -> Self {
        Self {
            value: AtomicI16::new(to_centidegrees(initial_celsius)),
            version: AtomicU32::new(0),
        }
    }

    /// Get the current temperature in degrees Celsius.
    pub fn get_celsius(&self) -> f32 {
        self.value.load(Ordering::SeqCst) as f32 / 100.0
    }

    /// Get the current temperature in centidegrees.
    pub fn get_centidegrees(&self) -> i16 {
        self.value.load(Ordering::SeqCst)
    }

    /// Set the temperature in degrees Celsius. Increments version if value changed.
    pub fn set_celsius(&self, celsius: f32) {
        let centidegrees = to_centidegrees(celsius);
        let old = self.value.swap(centidegrees, Ordering::SeqCst);
        if old != centidegrees {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Characteristic for TemperatureCharacteristic {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

fn to_centidegrees(celsius: f32) -> i16 {
    // `as` saturates at the i16 bounds (±327.67°C)
    (celsius * 100.0).round() as i16
}
