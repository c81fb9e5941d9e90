//! Lookup outcomes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::error::{Error, Result};

// ============================================================================
// EngineError
// ============================================================================

/// Failure reported by a discovery engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine was used before initialization.
    #[error("engine not initialized")]
    NotInitialized,

    /// Engine gave up waiting for answers.
    #[error("query timed out")]
    Timeout,

    /// Engine rejected the query arguments.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Engine does not implement this query kind.
    #[error("unsupported query: {0}")]
    Unsupported(String),

    /// Query daemon failed to start or stopped accepting queries.
    #[error("discovery daemon: {0}")]
    Daemon(String),

    /// Any other engine fault.
    #[error("engine fault: {0}")]
    Fault(String),
}

// ============================================================================
// ResolutionResult
// ============================================================================

/// Outcome of one lookup.
///
/// `NotFound` means the query completed without data; `Error` means it
/// could not be dispatched or the engine faulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    /// Usable address, with a port when the answer carried one.
    Address {
        /// Resolved address.
        ip: IpAddr,
        /// Port from an SRV answer.
        port: Option<u16>,
    },
    /// Query completed with no data.
    NotFound,
    /// Deadline elapsed before an answer.
    TimedOut,
    /// Query failed.
    Error(EngineError),
}

impl ResolutionResult {
    /// Returns `true` for an address answer.
    #[inline]
    #[must_use]
    pub const fn is_address(&self) -> bool {
        matches!(self, Self::Address { .. })
    }

    /// Returns the socket address, using `default_port` when the answer
    /// carried none.
    #[must_use]
    pub fn socket_addr(&self, default_port: u16) -> Option<SocketAddr> {
        match self {
            Self::Address { ip, port } => Some(SocketAddr::new(*ip, port.unwrap_or(default_port))),
            _ => None,
        }
    }

    /// Converts a failed outcome into the matching crate error.
    ///
    /// # Arguments
    ///
    /// * `name` - Queried name, for the error message
    /// * `timeout` - Deadline that applied to the query
    ///
    /// # Errors
    ///
    /// - [`Error::ResolutionTimeout`] for `TimedOut`
    /// - [`Error::ResolutionNotFound`] for `NotFound`
    /// - [`Error::ResolutionError`] for `Error`
    pub fn into_result(self, name: &str, timeout: Duration) -> Result<(IpAddr, Option<u16>)> {
        match self {
            Self::Address { ip, port } => Ok((ip, port)),
            Self::NotFound => Err(Error::resolution_not_found(name)),
            Self::TimedOut => Err(Error::resolution_timeout(name, timeout.as_millis() as u64)),
            Self::Error(source) => Err(Error::resolution_error(name, source)),
        }
    }
}

impl fmt::Display for ResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address { ip, port: Some(port) } => write!(f, "{ip}:{port}"),
            Self::Address { ip, port: None } => write!(f, "{ip}"),
            Self::NotFound => f.write_str("not found"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
