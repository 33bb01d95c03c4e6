//! MQTT subscription feed
//!
//! Production sites publish device readings to an MQTT topic; this
//! transport subscribes and surfaces each publish payload to the stream
//! client. Session errors are returned to the client, which owns the
//! backoff/reconnect cycle; a fresh session is built on every open.

use crate::io::stream::{StreamTransport, TransportError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MqttFeedConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttFeedConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "experience/readings/#".to_string(),
            client_id: "showfloor".to_string(),
            username: None,
            password: None,
        }
    }
}

impl MqttFeedConfig {
    /// Build from application config; the site id doubles as the client id
    pub fn from_config(config: &crate::infra::config::Config) -> Self {
        Self {
            host: config.mqtt_host().to_string(),
            port: config.mqtt_port(),
            topic: config.mqtt_topic().to_string(),
            client_id: config.site_id().to_string(),
            username: config.mqtt_username().map(str::to_string),
            password: config.mqtt_password().map(str::to_string),
        }
    }
}

/// MQTT transport for [`crate::io::stream::StreamConnection`]
pub struct MqttTransport {
    config: MqttFeedConfig,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
}

impl MqttTransport {
    pub fn new(config: MqttFeedConfig) -> Self {
        Self { config, client: None, eventloop: None }
    }
}

#[async_trait]
impl StreamTransport for MqttTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let mut options = MqttOptions::new(
            self.config.client_id.as_str(),
            self.config.host.as_str(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.as_str(), password.as_str());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        client.subscribe(self.config.topic.as_str(), QoS::AtMostOnce).await?;

        // Drive the eventloop until the broker acks the session, so a dead
        // broker surfaces as a failed open rather than a successful one
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        host = %self.config.host,
                        port = self.config.port,
                        topic = %self.config.topic,
                        "feed_mqtt_subscribed"
                    );
                    self.client = Some(client);
                    self.eventloop = Some(eventloop);
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        let eventloop = self.eventloop.as_mut().ok_or("not connected")?;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match std::str::from_utf8(&publish.payload) {
                        Ok(payload) => return Ok(Some(payload.to_string())),
                        Err(e) => {
                            warn!(error = %e, topic = %publish.topic, "mqtt_payload_not_utf8");
                            continue;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(None),
                Ok(event) => {
                    debug!(event = ?event, "mqtt_event");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.disconnect().await;
        }
        self.eventloop = None;
    }
}
