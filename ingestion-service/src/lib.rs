//! Ingestion pipeline: decodes inbound payloads, drives subscription
//! expansion for tracked indices, and hands every reading to the
//! batch writer.

pub mod decode;
pub mod subscriptions;
pub mod wire;

use core_types::types::{index_name_from_topic, Reading};
use log::debug;
use tick_store::BatchWriter;

pub use subscriptions::SubscriptionManager;

pub struct Pipeline {
    subscriptions: SubscriptionManager,
    batch: BatchWriter,
    index_prefix: String,
}

impl Pipeline {
    pub fn new(
        subscriptions: SubscriptionManager,
        batch: BatchWriter,
        index_prefix: impl Into<String>,
    ) -> Self {
        Self {
            subscriptions,
            batch,
            index_prefix: index_prefix.into(),
        }
    }

    pub async fn on_connected(&mut self) {
        self.subscriptions.on_connected().await;
    }

    /// Process one raw transport message end to end: decode, expand
    /// subscriptions for index readings, enqueue everything for
    /// persistence. Never fails; all error paths terminate in a log.
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        for ltp in decode::decode_payload(topic, payload) {
            debug!("tick on {}: {}", topic, ltp);
            let index = index_name_from_topic(&self.index_prefix, topic)
                .filter(|name| self.subscriptions.is_tracked(name))
                .map(str::to_string);
            if let Some(index) = &index {
                self.subscriptions.on_index_reading(index, ltp).await;
            }
            let mut reading = Reading::new(topic, ltp);
            if let Some(index) = index {
                reading = reading.with_index(index);
            }
            self.batch.enqueue(reading);
        }
    }

    /// Drain buffered readings; called at shutdown.
    pub async fn shutdown(&self) {
        self.batch.drain().await;
    }
}
