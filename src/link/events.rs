//! Link event notifications and scoped subscriptions.
//!
//! The radio driver publishes [`LinkEvent`]s on a [`LinkEvents`] bus.
//! Listeners hold a [`Subscription`]; dropping it unregisters the
//! listener, after which no further events reach it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  publish   ┌──────────────┐  channel  ┌──────────────┐
//! │ Link driver  │───────────►│  LinkEvents  │──────────►│ Subscription │
//! │ (radio/MAC)  │            │  (listeners) │           │  (RAII)      │
//! └──────────────┘            └──────────────┘           └──────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

// ============================================================================
// LinkEvent
// ============================================================================

/// A notification from the link driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Station interface is up; a connect request may be issued.
    StationStarted,
    /// Association was lost or could not be established.
    StationDisconnected,
    /// The station obtained a routable address.
    ///
    /// The address is logged but otherwise only means "link up".
    AddressAcquired {
        /// Address assigned to the station.
        address: IpAddr,
    },
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StationStarted => f.write_str("station-started"),
            Self::StationDisconnected => f.write_str("station-disconnected"),
            Self::AddressAcquired { address } => write!(f, "address-acquired({address})"),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// Listener registry shared between the bus and its subscriptions.
#[derive(Default)]
struct Listeners {
    /// Next listener key.
    next_id: u64,
    /// Live listeners by key.
    senders: FxHashMap<u64, mpsc::UnboundedSender<LinkEvent>>,
}

// ============================================================================
// LinkEvents
// ============================================================================

/// Event bus a link driver publishes on.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct LinkEvents {
    listeners: Arc<Mutex<Listeners>>,
}

impl LinkEvents {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    ///
    /// Events published after this call are delivered to the returned
    /// subscription in publish order until it is dropped.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.senders.insert(id, tx);
            id
        };

        trace!(listener = id, "Link listener registered");

        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
            rx,
        }
    }

    /// Publishes an event to every registered listener.
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, event: LinkEvent) -> usize {
        let listeners = self.listeners.lock();
        let delivered = listeners
            .senders
            .values()
            .filter(|tx| tx.send(event).is_ok())
            .count();

        trace!(%event, delivered, "Link event published");
        delivered
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().senders.len()
    }
}

impl fmt::Debug for LinkEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A registered listener on a [`LinkEvents`] bus.
///
/// Unregisters on drop. Publishing and unregistering take the same lock,
/// so once `drop` returns no publish can reach this listener.
pub struct Subscription {
    /// Key in the listener registry.
    id: u64,
    /// Registry to remove ourselves from.
    listeners: Arc<Mutex<Listeners>>,
    /// Delivered events.
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// Returns `None` only if the listener was removed from the bus.
    pub async fn next(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }

    /// Returns an already-delivered event without waiting.
    #[inline]
    pub fn try_next(&mut self) -> Option<LinkEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners.lock().senders.remove(&self.id);
        self.rx.close();
        trace!(listener = self.id, "Link listener unregistered");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
