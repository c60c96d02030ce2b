//! MQTT publisher for sensor state.

use crate::config::MqttConfig;
use crate::error::Result;
use crate::input::{Reading, SensorIdentity, SensorKind};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

/// JSON payload published for every successful reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub temperature: f32,
    pub humidity: f32,
    pub kind: SensorKind,
    pub pin: u8,
    pub timestamp: DateTime<Utc>,
}

impl StatePayload {
    pub fn new(identity: SensorIdentity, reading: Reading, timestamp: DateTime<Utc>) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            kind: identity.kind,
            pin: identity.pin,
            timestamp,
        }
    }
}

/// State topic for an accessory.
pub fn state_topic(base_topic: &str, accessory_name: &str) -> String {
    // Topic levels cannot contain wildcards or separators
    let name: String = accessory_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '+' | '#' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    format!("{}/{}/state", base_topic, name)
}

/// Publishes readings to an MQTT broker.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttPublisher {
    /// Create a publisher and spawn the task driving its connection.
    pub fn spawn(config: &MqttConfig, accessory_name: &str) -> (Self, JoinHandle<()>) {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        // Set credentials if provided
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 16);
        let topic = state_topic(&config.base_topic, accessory_name);
        info!(
            "Publishing state to mqtt://{}:{}/{}",
            config.broker_host, config.broker_port, topic
        );

        let handle = tokio::spawn(drive(event_loop));
        (Self { client, topic }, handle)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Queue a retained state message for `reading`.
    ///
    /// Never waits: while the broker is unreachable the client's request
    /// queue fills up and further messages are rejected instead of blocking
    /// the caller.
    pub fn publish(&self, identity: SensorIdentity, reading: Reading) -> Result<()> {
        let payload = StatePayload::new(identity, reading, Utc::now());
        let json = serde_json::to_string(&payload)?;
        debug!("Publishing to {}: {}", self.topic, json);
        self.client.try_publish(&self.topic, QoS::AtLeastOnce, true, json)?;
        Ok(())
    }
}

/// Poll the event loop forever, reconnecting after errors.
async fn drive(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {:?}", e);
                // Wait before reconnecting
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_state_topic() {
        assert_eq!(
            state_topic("dht-sensor-bridge", "Living Room"),
            "dht-sensor-bridge/living_room/state"
        );
        assert_eq!(state_topic("home", "a/b#"), "home/a_b_/state");
    }

    #[tokio::test]
    async fn test_publish_never_waits_for_broker() {
        let mut config = MqttConfig::new("127.0.0.1");
        // Nothing listens on port 1
        config.broker_port = 1;
        let (publisher, task) = MqttPublisher::spawn(&config, "Living Room");

        let mut rejected = 0;
        for _ in 0..40 {
            if publisher
                .publish(SensorIdentity::default(), Reading::new(21.5, 46.0))
                .is_err()
            {
                rejected += 1;
            }
        }
        assert!(rejected > 0);
        task.abort();
    }

    #[test]
    fn test_payload_json() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let payload = StatePayload::new(
            SensorIdentity::default(),
            Reading::new(21.5, 46.0),
            timestamp,
        );
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "temperature": 21.5,
                "humidity": 46.0,
                "kind": "dht22",
                "pin": 4,
                "timestamp": "2024-03-01T12:00:00Z"
            })
        );
    }
}
