//! Outputs pushing readings to the home-automation host.
//!
//! Current outputs:
//! - `mqtt`: retained JSON state messages on an MQTT broker

pub mod mqtt;

pub use mqtt::MqttPublisher;
