//! Durable tick storage: Postgres-backed topic/LTP tables, the topic
//! resolution cache, and the micro-batching flush engine.

mod batch;
mod error;
mod pg;
mod topics;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::BatchWriter;
pub use error::{Result, StoreError};
pub use pg::{InsertOutcome, PgTickStore, TickStore};
pub use topics::{TopicMeta, TopicRegistry};
