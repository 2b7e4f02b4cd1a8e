//! Outward storage events and the bus they are posted to.
//!
//! A monitor posts at most one [`StorageEvent`] per tick. The bundled
//! [`ChannelEventBus`] never blocks the tick: when its bounded queue is full
//! the event is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::channel::StorageChannel;
use crate::config::GridConfig;

use super::MonitorId;

/// "Something in this channel changed during the last tick."
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageEvent {
    /// Unique id of this event.
    pub event_id: Uuid,
    /// The monitor that posted it.
    pub monitor: MonitorId,
    /// The channel that changed.
    pub channel: StorageChannel,
    /// When the tick posted it.
    pub timestamp: DateTime<Utc>,
}

impl StorageEvent {
    /// Stamp a new event for `monitor` on `channel`.
    #[must_use]
    pub fn new(monitor: MonitorId, channel: StorageChannel) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            monitor,
            channel,
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget sink for outward events.
pub trait EventBus: Send + Sync {
    /// Hand off `event`. Must not block the tick.
    fn post_event(&self, event: StorageEvent);
}

/// Bounded, non-blocking [`EventBus`] backed by a crossbeam channel.
#[derive(Debug)]
pub struct ChannelEventBus {
    tx: Sender<StorageEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ChannelEventBus {
    /// Create a bus and the stream that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, StorageEventStream) {
        let (tx, rx) = bounded::<StorageEvent>(capacity.max(1));
        let dropped_events = Arc::new(AtomicU64::new(0));
        let bus = Self {
            tx,
            dropped_events: Arc::clone(&dropped_events),
        };
        (bus, StorageEventStream { rx, dropped_events })
    }

    /// Create a bus sized by `cfg.event_queue_capacity`.
    #[must_use]
    pub fn from_config(cfg: &GridConfig) -> (Self, StorageEventStream) {
        Self::new(cfg.event_queue_capacity)
    }

    /// Events dropped so far because the queue was full or the stream gone.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl EventBus for ChannelEventBus {
    fn post_event(&self, event: StorageEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %event.channel, "storage event queue full; event dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Receiving end of a [`ChannelEventBus`].
#[derive(Debug)]
pub struct StorageEventStream {
    rx: Receiver<StorageEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl StorageEventStream {
    /// Next queued event, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<StorageEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event. `None` on timeout or when the bus is gone.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StorageEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take everything currently queued.
    #[must_use]
    pub fn drain(&self) -> Vec<StorageEvent> {
        self.rx.try_iter().collect()
    }

    /// Events the bus had to drop because this stream fell behind.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}
