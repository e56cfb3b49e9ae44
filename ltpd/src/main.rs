//! LTP ingestion daemon: MQTT in, Postgres out.

use std::process;
use std::sync::Arc;

use core_types::config::{AppConfig, ConfigError};
use core_types::retry::RetryPolicy;
use ingestion_service::{Pipeline, SubscriptionManager};
use log::{error, info};
use mqtt_source::{Event, MqttSubscriber, Packet};
use thiserror::Error;
use tick_store::{BatchWriter, PgTickStore, StoreError, TopicRegistry};
use token_client::HttpTokenResolver;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run().await {
        error!("ltpd failed: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;

    let store = Arc::new(PgTickStore::connect(&config.db)?);
    store.init_schema().await?;

    let retry = RetryPolicy::default();
    let registry = Arc::new(TopicRegistry::new(store.clone(), retry.clone()));
    let preloaded = registry.preload().await?;
    info!("preloaded {} topics into cache", preloaded);

    let batch = BatchWriter::new(store, registry, config.batch.clone(), retry);

    let (client, mut eventloop) = mqtt_source::connect(&config.mqtt);
    let subscriber = Arc::new(MqttSubscriber::new(client));
    let resolver = Arc::new(HttpTokenResolver::new(
        reqwest::Client::new(),
        config.subscriptions.token_api_url.clone(),
    ));
    let index_prefix = config.subscriptions.index_prefix.clone();
    let subscriptions =
        SubscriptionManager::new(config.subscriptions.clone(), resolver, subscriber);
    let mut pipeline = Pipeline::new(subscriptions, batch, index_prefix);

    info!(
        "connecting to mqtt broker at {}:{}",
        config.mqtt.host, config.mqtt.port
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl+c, shutting down");
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to mqtt broker");
                    pipeline.on_connected().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    pipeline.handle_message(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(err) => {
                    error!("mqtt connection error: {err}");
                    tokio::time::sleep(config.mqtt.reconnect).await;
                }
            }
        }
    }

    // A second ctrl+c during the drain is acknowledged but ignored.
    tokio::spawn(async {
        loop {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown already in progress");
        }
    });
    pipeline.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
