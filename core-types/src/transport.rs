use thiserror::Error;

/// Failure issuing a subscribe call; the transport's own reconnect
/// policy owns recovery, callers only log these.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

/// Subscribe seam between the pipeline and the pub/sub transport.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;
}
