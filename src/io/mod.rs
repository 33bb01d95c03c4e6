//! IO modules - live feed transports and payload normalization
//!
//! This module contains the push-feed client and its transports:
//! - `stream` - reconnecting stream client with exponential backoff
//! - `tcp_feed` - line-delimited JSON over TCP
//! - `mqtt_feed` - MQTT subscription feed
//! - `payload` - shape-tolerant payload parsing (field-name probing)

pub mod mqtt_feed;
pub mod payload;
pub mod stream;
pub mod tcp_feed;

// Re-export commonly used types
pub use mqtt_feed::{MqttFeedConfig, MqttTransport};
pub use payload::{parse_payload, parse_zone_counts, ParsedBatch};
pub use stream::{
    stop_channel, ConnectionStatus, ReconnectPolicy, StopHandle, StreamConnection,
    StreamTransport, TransportError,
};
pub use tcp_feed::TcpJsonTransport;
