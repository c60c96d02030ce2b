//! CurrentRelativeHumidity characteristic.
//!
//! Humidity is stored in centi-percent (value * 100), clamped to 0-100%.

use super::Characteristic;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

/// Maximum humidity in centi-percent (100%)
const MAX_CENTIPERCENT: u16 = 10000;

/// Last reported relative humidity.
pub struct HumidityCharacteristic {
    /// Humidity in centi-percent (% * 100)
    value: AtomicU16,
    /// Version counter for change detection
    version: AtomicU32,
}

impl HumidityCharacteristic {
    /// Create a new characteristic with initial value.
    ///
    /// # Arguments
    /// * `initial_percent` - Initial humidity in percent (0-100)
    pub fn new(initial_percent: f32) -> Self {
        Self {
            value: AtomicU16::new(to_centipercent(initial_percent)),
            version: AtomicU32::new(0),
        }
    }

    /// Get the current humidity in percent.
    pub fn get_percent(&self) -> f32 {
        self.value.load(Ordering::SeqCst) as f32 / 100.0
    }

    /// Get the current humidity in centi-percent.
    pub fn get_centipercent(&self) -> u16 {
        self.value.load(Ordering::SeqCst)
    }

    /// Set the humidity in percent. Increments version if value changed.
    pub fn set_percent(&self, percent: f32) {
        let centipercent = to_centipercent(percent);
        let old = self.value.swap(centipercent, Ordering::SeqCst);
        if old != centipercent {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Characteristic for HumidityCharacteristic {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

fn to_centipercent(percent: f32) -> u16 {
    ((percent * 100.0).round() as u16).min(MAX_CENTIPERCENT)
}
