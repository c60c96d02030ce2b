use crate::input::{ReadError, SensorIdentity};
use crate::instance_lock::InstanceLockError;
use thiserror::Error as ThisError;

/// A physical read settled with a failure.
///
/// Every caller attached to the failed flight receives its own clone of the
/// same value, so the type is cheap to clone and carries no I/O handles.
#[derive(ThisError, Debug, Clone, PartialEq)]
#[error("Sensor read failed for {identity}: {cause}")]
pub struct SensorReadFailed {
    pub identity: SensorIdentity,
    #[source]
    pub cause: ReadError,
}

impl SensorReadFailed {
    pub fn new(identity: SensorIdentity, cause: ReadError) -> Self {
        Self { identity, cause }
    }
}

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    SensorReadFailed(#[from] SensorReadFailed),

    #[error(transparent)]
    InstanceLock(#[from] InstanceLockError),

    #[error("MQTT client error: {0}")]
    MqttError(#[from] rumqttc::ClientError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
