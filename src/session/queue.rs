//! Byte-bounded message queue between producers and the bridge.
//!
//! The queue holds at most `capacity` bytes, each message charged its
//! payload plus [`LENGTH_PREFIX`]. Producers come in two roles:
//!
//! | Role | Enqueue | When full |
//! |------|---------|-----------|
//! | [`BlockingProducer`] | `async enqueue` | waits for space |
//! | [`NonBlockingProducer`] | `try_enqueue` | fails with [`Error::QueueOverflow`] |
//!
//! Delivery is FIFO to a single [`QueueReceiver`]. Once the receiver is
//! closed or dropped, waiting and future enqueues fail with
//! [`Error::SessionClosed`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::message::{LENGTH_PREFIX, SessionMessage};

// ============================================================================
// Constants
// ============================================================================

/// Default total byte capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default per-message payload capacity.
pub const DEFAULT_ITEM_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// A message holding its share of the byte budget until dequeued.
struct Queued {
    message: SessionMessage,
    _permit: OwnedSemaphorePermit,
}

/// State shared by every producer handle.
struct Shared {
    /// Total byte capacity.
    capacity: usize,
    /// Largest accepted payload.
    item_capacity: usize,
    /// Free bytes.
    space: Arc<Semaphore>,
    /// FIFO to the receiver.
    tx: mpsc::UnboundedSender<Queued>,
}

impl Shared {
    /// Returns the queued size of `message`, rejecting oversized payloads.
    ///
    /// A closed queue is reported before any size check.
    fn cost(&self, message: &SessionMessage) -> Result<u32> {
        if self.space.is_closed() {
            return Err(Error::SessionClosed);
        }
        let size = message.payload_len();
        if size > self.item_capacity {
            return Err(Error::message_too_large(size, self.item_capacity));
        }
        // Bounded by item_capacity, which validation keeps below capacity.
        Ok(message.queued_len() as u32)
    }

    fn push(&self, message: SessionMessage, permit: OwnedSemaphorePermit) -> Result<()> {
        self.tx
            .send(Queued {
                message,
                _permit: permit,
            })
            .map_err(|_| Error::SessionClosed)
    }
}

// ============================================================================
// MessageQueue
// ============================================================================

/// Producer-side handle to a session queue.
///
/// Hands out role-specific producers. Cloning is cheap.
#[derive(Clone)]
pub struct MessageQueue {
    shared: Arc<Shared>,
}

impl MessageQueue {
    /// Creates a queue and its single receiver.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total bytes the queue may hold
    /// * `item_capacity` - Largest payload a single message may carry
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a maximum-size message could never fit.
    pub fn new(capacity: usize, item_capacity: usize) -> Result<(Self, QueueReceiver)> {
        if item_capacity == 0 {
            return Err(Error::config("item capacity must be greater than zero"));
        }
        let framed = item_capacity
            .checked_add(LENGTH_PREFIX)
            .ok_or_else(|| {
                Error::config(format!("item capacity {item_capacity} is too large"))
            })?;
        if framed > capacity {
            return Err(Error::config(format!(
                "queue capacity {capacity} cannot hold one {item_capacity}-byte message"
            )));
        }
        if capacity > Semaphore::MAX_PERMITS || capacity > u32::MAX as usize {
            return Err(Error::config(format!("queue capacity {capacity} is too large")));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let space = Arc::new(Semaphore::new(capacity));

        let queue = Self {
            shared: Arc::new(Shared {
                capacity,
                item_capacity,
                space: Arc::clone(&space),
                tx,
            }),
        };

        Ok((queue, QueueReceiver { rx, space }))
    }

    /// Creates a queue with the default 1024/64 byte capacities.
    ///
    /// # Errors
    ///
    /// Never fails with the defaults; kept fallible for symmetry.
    pub fn with_defaults() -> Result<(Self, QueueReceiver)> {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_ITEM_CAPACITY)
    }

    /// Returns a producer that waits for space.
    #[inline]
    #[must_use]
    pub fn blocking_producer(&self) -> BlockingProducer {
        BlockingProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns a producer that never waits.
    #[inline]
    #[must_use]
    pub fn non_blocking_producer(&self) -> NonBlockingProducer {
        NonBlockingProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns the total byte capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Returns the per-message payload capacity.
    #[inline]
    #[must_use]
    pub fn item_capacity(&self) -> usize {
        self.shared.item_capacity
    }

    /// Returns the bytes currently free.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.space.available_permits()
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

// ============================================================================
// BlockingProducer
// ============================================================================

/// Producer that waits for queue space.
///
/// For task contexts that may suspend, such as interactive input.
#[derive(Clone)]
pub struct BlockingProducer {
    shared: Arc<Shared>,
}

impl BlockingProducer {
    /// Enqueues a message, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// - [`Error::MessageTooLarge`] if the payload exceeds the item capacity
    /// - [`Error::SessionClosed`] if the receiver is gone
    pub async fn enqueue(&self, message: SessionMessage) -> Result<()> {
        let cost = self.shared.cost(&message)?;
        let permit = Arc::clone(&self.shared.space)
            .acquire_many_owned(cost)
            .await
            .map_err(|_| Error::SessionClosed)?;

        trace!(?message, cost, "Enqueued");
        self.shared.push(message, permit)
    }
}

impl fmt::Debug for BlockingProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingProducer").finish_non_exhaustive()
    }
}

// ============================================================================
// NonBlockingProducer
// ============================================================================

/// Producer that never waits.
///
/// For timer and interrupt-like contexts; callers may drop the message
/// on [`Error::QueueOverflow`].
#[derive(Clone)]
pub struct NonBlockingProducer {
    shared: Arc<Shared>,
}

impl NonBlockingProducer {
    /// Enqueues a message if it fits right now.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueOverflow`] if there is not enough free space
    /// - [`Error::MessageTooLarge`] if the payload exceeds the item capacity
    /// - [`Error::SessionClosed`] if the receiver is gone
    pub fn try_enqueue(&self, message: SessionMessage) -> Result<()> {
        let cost = self.shared.cost(&message)?;
        let permit = match Arc::clone(&self.shared.space).try_acquire_many_owned(cost) {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                return Err(Error::queue_overflow(
                    cost as usize,
                    self.shared.space.available_permits(),
                ));
            }
            Err(TryAcquireError::Closed) => return Err(Error::SessionClosed),
        };

        trace!(?message, cost, "Enqueued without waiting");
        self.shared.push(message, permit)
    }
}

impl fmt::Debug for NonBlockingProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonBlockingProducer").finish_non_exhaustive()
    }
}

// ============================================================================
// QueueReceiver
// ============================================================================

/// The single consumer end of a session queue.
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Queued>,
    space: Arc<Semaphore>,
}

impl QueueReceiver {
    /// Waits for the next message.
    ///
    /// Returns `None` once every producer handle is gone and the queue is
    /// empty. The message's bytes are released back to producers.
    pub async fn dequeue(&mut self) -> Option<SessionMessage> {
        self.rx.recv().await.map(|queued| queued.message)
    }

    /// Returns the next message if one is already queued.
    #[inline]
    pub fn try_dequeue(&mut self) -> Option<SessionMessage> {
        self.rx.try_recv().ok().map(|queued| queued.message)
    }

    /// Stops accepting messages and discards what is queued.
    ///
    /// Wakes blocked producers with [`Error::SessionClosed`]. Returns the
    /// number of discarded messages.
    pub fn close(&mut self) -> usize {
        self.space.close();
        self.rx.close();

        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }

        if discarded > 0 {
            debug!(discarded, "Discarded queued messages on close");
        }
        discarded
    }
}

impl Drop for QueueReceiver {
    fn drop(&mut self) {
        self.space.close();
    }
}

impl fmt::Debug for QueueReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver")
            .field("queued", &self.rx.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
