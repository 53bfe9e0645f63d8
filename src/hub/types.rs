//! Subscriber-facing types.

use crate::pages::PageBody;
use crate::types::Timestamp;
use std::fmt;

/// Unique identifier for a push subscriber.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// Configuration for one subscriber.
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    /// Max buffered messages before the subscriber is dropped as too slow.
    pub buffer_size: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// A frame delivered to a push subscriber.
#[derive(Clone, Debug)]
pub enum PushMessage {
    /// One published page, navigation stripped. The id is the page
    /// timestamp and is monotonic per agency, so clients can resync.
    Page { id: Timestamp, body: PageBody },

    /// Keep-alive; not a data event, advances no cursor.
    KeepAlive,

    /// The subscription ended.
    Dropped { reason: DropReason },
}

/// Why a subscriber was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Client went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Handle for receiving a subscriber's messages.
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub agency: String,
    /// Channel carrying replayed and live messages.
    pub receiver: crossbeam_channel::Receiver<PushMessage>,
}

impl SubscriberHandle {
    /// Receive the next message (blocking).
    pub fn recv(&self) -> Result<PushMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> Result<PushMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<PushMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
