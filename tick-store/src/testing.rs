//! In-memory `TickStore` double with fault-injection knobs.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;

use crate::error::Result;
use crate::pg::{InsertOutcome, TickStore};
use crate::topics::TopicMeta;

pub(crate) struct MemStore {
    topics: Mutex<HashMap<String, i32>>,
    pub rows: Mutex<Vec<(i32, f64)>>,
    next_id: AtomicI32,
    pub fetch_calls: AtomicUsize,
    pub insert_topic_calls: AtomicUsize,
    /// Fail this many store calls up front (`usize::MAX` = always).
    pub fail_remaining: AtomicUsize,
    conflict_id: Mutex<Option<i32>>,
    fail_topic: Mutex<Option<String>>,
    insert_delay: Mutex<Duration>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1),
            fetch_calls: AtomicUsize::new(0),
            insert_topic_calls: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            conflict_id: Mutex::new(None),
            fail_topic: Mutex::new(None),
            insert_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn seed_topic(&self, name: &str, id: i32) {
        self.topics.lock().insert(name.to_string(), id);
    }

    /// Make the next topic insert lose a simulated first-insert race:
    /// the "other writer" commits `winner_id` and the insert reports a
    /// unique-constraint conflict.
    pub fn conflict_next_insert(&self, winner_id: i32) {
        *self.conflict_id.lock() = Some(winner_id);
    }

    /// Fail every lookup for one specific topic name.
    pub fn fail_topic(&self, name: &str) {
        *self.fail_topic.lock() = Some(name.to_string());
    }

    /// Delay each reading insert, giving tests a window to interleave
    /// enqueues with an in-flight flush.
    pub fn set_insert_delay(&self, delay: Duration) {
        *self.insert_delay.lock() = delay;
    }

    pub fn row_prices(&self) -> Vec<f64> {
        self.rows.lock().iter().map(|(_, ltp)| *ltp).collect()
    }

    fn maybe_fail(&self) -> Result<()> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "store offline").into());
        }
        Ok(())
    }
}

#[async_trait]
impl TickStore for MemStore {
    async fn fetch_topic_id(&self, name: &str) -> Result<Option<i32>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        if self.fail_topic.lock().as_deref() == Some(name) {
            return Err(io::Error::new(io::ErrorKind::Other, "poisoned topic").into());
        }
        Ok(self.topics.lock().get(name).copied())
    }

    async fn insert_topic(&self, meta: &TopicMeta) -> Result<InsertOutcome> {
        self.insert_topic_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        if let Some(winner) = self.conflict_id.lock().take() {
            self.topics.lock().insert(meta.name.clone(), winner);
            return Ok(InsertOutcome::Conflict);
        }
        let mut topics = self.topics.lock();
        if topics.contains_key(&meta.name) {
            return Ok(InsertOutcome::Conflict);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        topics.insert(meta.name.clone(), id);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn insert_reading(
        &self,
        topic_id: i32,
        ltp: f64,
        _received_at: NaiveDateTime,
    ) -> Result<()> {
        self.maybe_fail()?;
        let delay = *self.insert_delay.lock();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        self.rows.lock().push((topic_id, ltp));
        Ok(())
    }

    async fn load_topics(&self) -> Result<Vec<(String, i32)>> {
        self.maybe_fail()?;
        Ok(self
            .topics
            .lock()
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }
}
