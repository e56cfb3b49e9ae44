use std::sync::Arc;

use core_types::config::BatchConfig;
use core_types::retry::RetryPolicy;
use core_types::types::Reading;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::pg::TickStore;
use crate::topics::{TopicMeta, TopicRegistry};

/// Accumulates readings and persists them in micro-batches.
///
/// A flush fires when the buffer reaches the configured size or when
/// the one-shot timer armed on the first pending reading expires,
/// whichever comes first. A flush snapshots the first L pending
/// readings, persists them item by item, and then removes exactly
/// those L; readings enqueued while the flush was in flight stay
/// buffered for the next cycle. Length-based removal is what keeps
/// concurrent enqueues from being dropped.
#[derive(Clone)]
pub struct BatchWriter {
    inner: Arc<BatchInner>,
}

struct BatchInner {
    store: Arc<dyn TickStore>,
    registry: Arc<TopicRegistry>,
    retry: RetryPolicy,
    cfg: BatchConfig,
    state: Mutex<BufferState>,
}

#[derive(Default)]
struct BufferState {
    pending: Vec<Reading>,
    flushing: bool,
    /// Whether a timer task for the current generation is in flight.
    timer_armed: bool,
    /// Bumped whenever a timer is armed or invalidated. A timer task
    /// that wakes to a different generation than it was armed with is
    /// stale and must not flush.
    timer_gen: u64,
}

/// Resets the in-progress flag if the flush future is dropped before
/// reaching its normal completion path.
struct FlushGuard {
    inner: Arc<BatchInner>,
    armed: bool,
}

impl FlushGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().flushing = false;
        }
    }
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn TickStore>,
        registry: Arc<TopicRegistry>,
        cfg: BatchConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                store,
                registry,
                retry,
                cfg,
                state: Mutex::new(BufferState::default()),
            }),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Append a reading; never fails. Arms the flush timer on the
    /// first pending reading and triggers an immediate flush once the
    /// size threshold is reached. The armed timer is never aborted,
    /// only invalidated: a preempted timer task wakes, sees a newer
    /// generation, and backs off without touching the buffer.
    pub fn enqueue(&self, reading: Reading) {
        let flush_now = {
            let mut state = self.inner.state.lock();
            state.pending.push(reading);
            debug!("buffered reading ({} pending)", state.pending.len());
            if state.pending.len() >= self.inner.cfg.size {
                state.timer_gen = state.timer_gen.wrapping_add(1);
                state.timer_armed = false;
                true
            } else {
                if !state.timer_armed {
                    self.arm_timer(&mut state);
                }
                false
            }
        };
        if flush_now {
            self.spawn_flush();
        }
    }

    /// Persist the currently buffered readings. Idempotent under
    /// concurrent invocation: if a flush is already in flight this is
    /// a no-op. The in-progress flag is committed before the first
    /// await and cleared last, with a drop guard covering early exits.
    pub async fn flush(&self) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.flushing {
                debug!("flush already in progress, skipping");
                return;
            }
            if state.pending.is_empty() {
                return;
            }
            state.flushing = true;
            state.pending.clone()
        };
        let guard = FlushGuard {
            inner: self.inner.clone(),
            armed: true,
        };

        let len = snapshot.len();
        let mut written = 0usize;
        for reading in &snapshot {
            match self.persist_one(reading).await {
                Ok(()) => written += 1,
                Err(err) => {
                    error!(
                        "failed to persist reading (topic={}, ltp={}): {}",
                        reading.topic, reading.ltp, err
                    );
                }
            }
        }
        if written == len {
            info!("flushed {} readings", len);
        } else {
            warn!("flushed {} of {} readings", written, len);
        }

        let flush_again = {
            let mut state = self.inner.state.lock();
            state.pending.drain(..len);
            state.flushing = false;
            let leftover = state.pending.len();
            if leftover >= self.inner.cfg.size {
                true
            } else {
                if leftover > 0 && !state.timer_armed {
                    self.arm_timer(&mut state);
                }
                false
            }
        };
        guard.disarm();
        if flush_again {
            self.spawn_flush();
        }
    }

    /// Flush until the buffer is empty; used at shutdown.
    pub async fn drain(&self) {
        loop {
            self.flush().await;
            let idle = {
                let state = self.inner.state.lock();
                state.pending.is_empty() && !state.flushing
            };
            if idle {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    async fn persist_one(&self, reading: &Reading) -> Result<()> {
        let meta = TopicMeta::from_reading(reading);
        let topic_id = self.inner.registry.resolve(&meta).await?;
        let inner = &self.inner;
        let received_at = reading.received_at.naive_utc();
        inner
            .retry
            .run(|| inner.store.insert_reading(topic_id, reading.ltp, received_at))
            .await
            .map_err(|source| StoreError::Unavailable {
                attempts: inner.retry.max_attempts,
                source: Box::new(source),
            })
    }

    fn spawn_flush(&self) {
        let writer = self.clone();
        tokio::spawn(async move {
            writer.flush().await;
        });
    }

    fn arm_timer(&self, state: &mut BufferState) {
        state.timer_gen = state.timer_gen.wrapping_add(1);
        state.timer_armed = true;
        let gen = state.timer_gen;
        let writer = self.clone();
        let interval = self.inner.cfg.interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            {
                let mut state = writer.inner.state.lock();
                if state.timer_gen != gen {
                    return;
                }
                state.timer_armed = false;
            }
            writer.flush().await;
        });
    }
}
