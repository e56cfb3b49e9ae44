//! MQTT transport wiring: broker client construction and the
//! `Subscriber` seam the pipeline subscribes through.

use std::time::Duration;

use core_types::config::MqttConfig;
use core_types::transport::{Subscriber, TransportError};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};

pub use rumqttc::{ConnectionError, Event, Packet};

const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Build the broker client and its event loop from config. The event
/// loop owns reconnection; callers keep polling it and back off on
/// errors.
pub fn connect(cfg: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    options.set_credentials(&cfg.username, &cfg.password);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);
    AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY)
}

/// `Subscriber` backed by the broker client.
pub struct MqttSubscriber {
    client: AsyncClient,
}

impl MqttSubscriber {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Subscriber for MqttSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(TransportError::new)
    }
}
