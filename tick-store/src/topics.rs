use std::collections::HashMap;
use std::sync::Arc;

use core_types::retry::RetryPolicy;
use core_types::types::Reading;
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::pg::{InsertOutcome, TickStore};

/// Columns of a `topics` row, minus the generated id.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMeta {
    pub name: String,
    pub index_name: Option<String>,
    pub option_type: Option<String>,
    pub strike: Option<i32>,
}

impl TopicMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_name: None,
            option_type: None,
            strike: None,
        }
    }

    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            name: reading.topic.clone(),
            index_name: reading.index_name.clone(),
            option_type: reading.option_type.map(|ot| ot.as_str().to_string()),
            strike: reading.strike,
        }
    }
}

/// Maps topic names to their durable ids, memoizing every successful
/// resolution. A name's id never changes for the process lifetime, so
/// a cache hit needs no store I/O at all.
pub struct TopicRegistry {
    store: Arc<dyn TickStore>,
    cache: Mutex<HashMap<String, i32>>,
    retry: RetryPolicy,
}

impl TopicRegistry {
    pub fn new(store: Arc<dyn TickStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            retry,
        }
    }

    /// Warm the cache from existing `topics` rows. Returns how many
    /// mappings were loaded.
    pub async fn preload(&self) -> Result<usize> {
        let rows = self.store.load_topics().await?;
        let count = rows.len();
        let mut cache = self.cache.lock();
        for (name, id) in rows {
            cache.insert(name, id);
        }
        Ok(count)
    }

    /// Resolve a topic name to its id, inserting a new row on first
    /// sight. Store I/O is wrapped in the retry policy; exhausting it
    /// surfaces as `StoreError::Unavailable`.
    pub async fn resolve(&self, meta: &TopicMeta) -> Result<i32> {
        if let Some(id) = self.cache.lock().get(&meta.name).copied() {
            return Ok(id);
        }
        let id = self
            .retry
            .run(|| self.lookup_or_insert(meta))
            .await
            .map_err(|source| StoreError::Unavailable {
                attempts: self.retry.max_attempts,
                source: Box::new(source),
            })?;
        self.cache.lock().insert(meta.name.clone(), id);
        Ok(id)
    }

    async fn lookup_or_insert(&self, meta: &TopicMeta) -> Result<i32> {
        if let Some(id) = self.store.fetch_topic_id(&meta.name).await? {
            return Ok(id);
        }
        match self.store.insert_topic(meta).await? {
            InsertOutcome::Inserted(id) => Ok(id),
            // Lost a first-insert race: the unique constraint kept the
            // winner's row, so read it back instead of failing.
            InsertOutcome::Conflict => self
                .store
                .fetch_topic_id(&meta.name)
                .await?
                .ok_or_else(|| StoreError::TopicRace {
                    name: meta.name.clone(),
                }),
        }
    }
}
