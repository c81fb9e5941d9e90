//! Session messages.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Per-message bookkeeping charged against the queue's byte capacity.
pub const LENGTH_PREFIX: usize = 4;

// ============================================================================
// SessionMessage
// ============================================================================

/// A unit of work for the bridge consumer.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// Opaque payload written to the peer.
    Data(Vec<u8>),
    /// Ends the session.
    Stop,
}

impl SessionMessage {
    /// Creates a data message.
    #[inline]
    #[must_use]
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self::Data(payload.into())
    }

    /// Returns the payload length (zero for `Stop`).
    #[inline]
    #[must_use]
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Data(payload) => payload.len(),
            Self::Stop => 0,
        }
    }

    /// Returns the bytes this message occupies in a queue.
    #[inline]
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.payload_len() + LENGTH_PREFIX
    }

    /// Returns `true` for `Stop`.
    #[inline]
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

impl fmt::Debug for SessionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(payload) => write!(f, "Data({:?})", String::from_utf8_lossy(payload)),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
