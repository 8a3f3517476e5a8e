//! Bounded producer queues between a camera driver and the tick loop.
//!
//! Producers never block: when the queue is full the oldest item is evicted
//! so the consumer always sees the freshest data. The consumer side polls
//! without blocking through `InputStream`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::camera::{InputStream, StreamItem, StreamRole};

/// Queue depth used by camera drivers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

#[derive(Default)]
struct QueueShared {
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Producer half of a stream queue.
pub struct StreamFeed {
    name: String,
    role: StreamRole,
    tx: Sender<StreamItem>,
    evict: Receiver<StreamItem>,
    shared: Arc<QueueShared>,
}

/// Consumer half of a stream queue.
pub struct ChannelStream {
    name: String,
    role: StreamRole,
    rx: Receiver<StreamItem>,
    shared: Arc<QueueShared>,
}

pub fn stream_channel(
    role: StreamRole,
    name: impl Into<String>,
    capacity: usize,
) -> (StreamFeed, ChannelStream) {
    let name = name.into();
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let shared = Arc::new(QueueShared::default());
    (
        StreamFeed {
            name: name.clone(),
            role,
            tx,
            evict: rx.clone(),
            shared: Arc::clone(&shared),
        },
        ChannelStream {
            name,
            role,
            rx,
            shared,
        },
    )
}

impl StreamFeed {
    /// Enqueue without blocking, evicting the oldest item when full.
    ///
    /// Fails when the consumer is gone or the item does not match the
    /// queue's role.
    pub fn push(&self, item: StreamItem) -> Result<()> {
        if item.role() != self.role {
            return Err(anyhow!(
                "stream '{}' carries {:?} items, got {:?}",
                self.name,
                self.role,
                item.role()
            ));
        }
        let mut pending = item;
        loop {
            if self.is_closed() {
                return Err(anyhow!("stream '{}' consumer closed", self.name));
            }
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(anyhow!("stream '{}' consumer closed", self.name));
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    /// Items evicted because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl ChannelStream {
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl InputStream for ChannelStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StreamRole {
        self.role
    }

    fn has(&self) -> bool {
        !self.rx.is_empty()
    }

    fn take(&mut self) -> Option<StreamItem> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}
