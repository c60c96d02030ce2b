//! DHT readings through the Linux IIO subsystem.
//!
//! With the `dht11` kernel driver bound to a GPIO (device tree overlay
//! `dht11,gpiopin=4` on a Raspberry Pi), the sensor shows up as an IIO device.
//! Reading an attribute triggers one transaction on the data line:
//! - `in_temp_input`: temperature in milli-degrees Celsius
//! - `in_humidityrelative_input`: relative humidity in milli-percent
//!
//! The driver handles DHT11 and DHT22 alike; the kind only selects the
//! accepted value range.

use super::{PhysicalSensor, ReadError, Reading, SensorIdentity, check_range};
use async_trait::async_trait;
use log::debug;
use nix::errno::Errno;
use std::io;
use std::path::PathBuf;

/// Default sysfs directory of the first IIO device.
pub const DEFAULT_IIO_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

const TEMPERATURE_ATTR: &str = "in_temp_input";
const HUMIDITY_ATTR: &str = "in_humidityrelative_input";

/// Physical sensor backed by an IIO device directory.
pub struct IioSensor {
    device_dir: PathBuf,
}

impl IioSensor {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    async fn read_attr(&self, attr: &str) -> Result<f32, ReadError> {
        let path = self.device_dir.join(attr);
        let raw = tokio::fs::read_to_string(&path).await.map_err(map_io_error)?;
        parse_milli(&raw)
    }
}

#[async_trait]
impl PhysicalSensor for IioSensor {
    async fn read(&self, identity: SensorIdentity) -> Result<Reading, ReadError> {
        debug!("Reading {} from {}", identity, self.device_dir.display());
        let temperature = self.read_attr(TEMPERATURE_ATTR).await?;
        // The driver caches both values from one transaction for ~2 s, so the
        // second attribute does not hit the line again.
        let humidity = self.read_attr(HUMIDITY_ATTR).await?;
        check_range(identity, Reading::new(temperature, humidity))
    }
}

/// Parse a sysfs milli-unit value ("21500\n") into units.
fn parse_milli(raw: &str) -> Result<f32, ReadError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i32>()
        .map(|milli| milli as f32 / 1000.0)
        .map_err(|_| ReadError::InvalidData(format!("{:?}", trimmed)))
}

/// Translate the errno the driver reports into a read failure.
fn map_io_error(e: io::Error) -> ReadError {
    if e.kind() == io::ErrorKind::NotFound {
        return ReadError::NoResponse;
    }
    match e.raw_os_error() {
        Some(code) if code == Errno::ETIMEDOUT as i32 => ReadError::Timeout,
        Some(code) if code == Errno::EIO as i32 => ReadError::Checksum,
        Some(code) if code == Errno::ENODEV as i32 => ReadError::NoResponse,
        _ => ReadError::Io(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SensorKind;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("iio-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_milli() {
        assert_eq!(parse_milli("21500\n").unwrap(), 21.5);
        assert_eq!(parse_milli("-4200").unwrap(), -4.2);
        assert!(matches!(parse_milli("abc"), Err(ReadError::InvalidData(_))));
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(
            map_io_error(io::Error::from_raw_os_error(Errno::ETIMEDOUT as i32)),
            ReadError::Timeout
        );
        assert_eq!(
            map_io_error(io::Error::from_raw_os_error(Errno::EIO as i32)),
            ReadError::Checksum
        );
        assert_eq!(
            map_io_error(io::Error::from(io::ErrorKind::NotFound)),
            ReadError::NoResponse
        );
        assert!(matches!(
            map_io_error(io::Error::from(io::ErrorKind::PermissionDenied)),
            ReadError::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_reads_device_attributes() {
        let dir = scratch_dir();
        std::fs::write(dir.join(TEMPERATURE_ATTR), "21500\n").unwrap();
        std::fs::write(dir.join(HUMIDITY_ATTR), "46000\n").unwrap();

        let sensor = IioSensor::new(&dir);
        let reading = sensor.read(SensorIdentity::default()).await.unwrap();
        assert_eq!(reading, Reading::new(21.5, 46.0));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_device_is_no_response() {
        let sensor = IioSensor::new("/nonexistent/iio:device42");
        let result = sensor.read(SensorIdentity::default()).await;
        assert_eq!(result, Err(ReadError::NoResponse));
    }

    #[tokio::test]
    async fn test_out_of_range_for_kind() {
        let dir = scratch_dir();
        std::fs::write(dir.join(TEMPERATURE_ATTR), "-10000\n").unwrap();
        std::fs::write(dir.join(HUMIDITY_ATTR), "46000\n").unwrap();

        let sensor = IioSensor::new(&dir);
        let dht11 = SensorIdentity::new(SensorKind::Dht11, 4);
        assert!(matches!(
            sensor.read(dht11).await,
            Err(ReadError::OutOfRange {
                quantity: "temperature",
                ..
            })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
