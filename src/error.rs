//! Error types for the rendezvous pipeline.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wifi_rendezvous::{BlockingProducer, Result, SessionMessage};
//!
//! async fn example(producer: &BlockingProducer) -> Result<()> {
//!     producer.enqueue(SessionMessage::data("ping")).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Link | [`Error::LinkExhausted`], [`Error::LinkDriver`] |
//! | Resolution | [`Error::ResolutionTimeout`], [`Error::ResolutionNotFound`], [`Error::ResolutionError`] |
//! | Transport | [`Error::TransportOpen`], [`Error::TransportIo`], [`Error::PartialWrite`], [`Error::PeerClosed`] |
//! | Queue | [`Error::QueueOverflow`], [`Error::MessageTooLarge`], [`Error::SessionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::net::SocketAddr;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::discovery::EngineError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when lifecycle configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Link Errors
    // ========================================================================
    /// Link acquisition gave up after the retry bound.
    #[error("Link not acquired after {retries} retries")]
    LinkExhausted {
        /// Number of reconnect attempts that were issued.
        retries: u32,
    },

    /// Link driver rejected a request.
    ///
    /// Returned when the radio driver cannot be started or refuses
    /// a connect request.
    #[error("Link driver error: {message}")]
    LinkDriver {
        /// Description of the driver failure.
        message: String,
    },

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// Lookup did not complete before its deadline.
    #[error("Resolution of {name} timed out after {timeout_ms}ms")]
    ResolutionTimeout {
        /// Name or service that was queried.
        name: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Lookup completed but returned no usable data.
    #[error("Resolution of {name} found nothing")]
    ResolutionNotFound {
        /// Name or service that was queried.
        name: String,
    },

    /// Query could not be dispatched or the engine faulted.
    #[error("Resolution of {name} failed: {source}")]
    ResolutionError {
        /// Name or service that was queried.
        name: String,
        /// Engine-level failure.
        source: EngineError,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Socket could not be opened to the peer.
    #[error("Unable to connect to {addr}: {message}")]
    TransportOpen {
        /// Peer address.
        addr: SocketAddr,
        /// Description of the connect failure.
        message: String,
    },

    /// Read or write failed on an open socket.
    #[error("Transport I/O error: {message}")]
    TransportIo {
        /// Description of the I/O failure.
        message: String,
    },

    /// Transport accepted fewer bytes than requested.
    ///
    /// Writes are all-or-fail; a short write ends the session.
    #[error("Partial write: {written} of {expected} bytes")]
    PartialWrite {
        /// Bytes the transport accepted.
        written: usize,
        /// Bytes that were submitted.
        expected: usize,
    },

    /// Peer closed the stream while a response was expected.
    #[error("Peer closed the connection")]
    PeerClosed,

    // ========================================================================
    // Queue Errors
    // ========================================================================
    /// Non-blocking enqueue found the queue full.
    #[error("Queue full: need {needed} bytes, {available} available")]
    QueueOverflow {
        /// Bytes the message would occupy.
        needed: usize,
        /// Bytes currently free.
        available: usize,
    },

    /// Message payload exceeds the per-message capacity.
    #[error("Message of {size} bytes exceeds item capacity {max}")]
    MessageTooLarge {
        /// Payload size.
        size: usize,
        /// Per-message capacity.
        max: usize,
    },

    /// Session has ended; the queue no longer accepts messages.
    #[error("Session closed")]
    SessionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a link exhausted error.
    #[inline]
    pub fn link_exhausted(retries: u32) -> Self {
        Self::LinkExhausted { retries }
    }

    /// Creates a link driver error.
    #[inline]
    pub fn link_driver(message: impl Into<String>) -> Self {
        Self::LinkDriver {
            message: message.into(),
        }
    }

    /// Creates a resolution timeout error.
    #[inline]
    pub fn resolution_timeout(name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ResolutionTimeout {
            name: name.into(),
            timeout_ms,
        }
    }

    /// Creates a resolution not found error.
    #[inline]
    pub fn resolution_not_found(name: impl Into<String>) -> Self {
        Self::ResolutionNotFound { name: name.into() }
    }

    /// Creates a resolution engine error.
    #[inline]
    pub fn resolution_error(name: impl Into<String>, source: EngineError) -> Self {
        Self::ResolutionError {
            name: name.into(),
            source,
        }
    }

    /// Creates a transport open error.
    #[inline]
    pub fn transport_open(addr: SocketAddr, message: impl Into<String>) -> Self {
        Self::TransportOpen {
            addr,
            message: message.into(),
        }
    }

    /// Creates a transport I/O error.
    #[inline]
    pub fn transport_io(message: impl Into<String>) -> Self {
        Self::TransportIo {
            message: message.into(),
        }
    }

    /// Creates a partial write error.
    #[inline]
    pub fn partial_write(written: usize, expected: usize) -> Self {
        Self::PartialWrite { written, expected }
    }

    /// Creates a queue overflow error.
    #[inline]
    pub fn queue_overflow(needed: usize, available: usize) -> Self {
        Self::QueueOverflow { needed, available }
    }

    /// Creates a message too large error.
    #[inline]
    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a resolution error.
    #[inline]
    #[must_use]
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::ResolutionTimeout { .. }
                | Self::ResolutionNotFound { .. }
                | Self::ResolutionError { .. }
        )
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportOpen { .. }
                | Self::TransportIo { .. }
                | Self::PartialWrite { .. }
                | Self::PeerClosed
        )
    }

    /// Returns `true` if this error ends the lifecycle before a session starts.
    ///
    /// These are reported to the operator; the pipeline is not retried.
    #[inline]
    #[must_use]
    pub fn is_lifecycle_fatal(&self) -> bool {
        matches!(
            self,
            Self::LinkExhausted { .. } | Self::LinkDriver { .. } | Self::TransportOpen { .. }
        ) || self.is_resolution_error()
    }

    /// Returns `true` if a producer may simply try again later.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueOverflow { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
