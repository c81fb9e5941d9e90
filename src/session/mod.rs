//! Session bridge between producers and the peer socket.
//!
//! # Data Flow
//!
//! ```text
//! heartbeat ──try_enqueue──┐
//!                          ├──▶ MessageQueue ──▶ SessionBridge ──write/read──▶ peer
//! interactive ──enqueue────┘                           │
//!                                                      └──▶ ResponseObserver
//! ```
//!
//! Producers wait on a [`ReadyWaiter`] until the bridge has opened its
//! transport. A `Stop` message ends the session.

// ============================================================================
// Submodules
// ============================================================================

/// Queue-to-socket bridge.
pub mod bridge;

/// Session messages.
pub mod message;

/// Heartbeat and interactive producers.
pub mod producer;

/// Byte-bounded message queue.
pub mod queue;

/// One-shot readiness signal.
pub mod ready;

/// Stream transport and connection handle.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{ActiveBridge, BridgeState, CloseReason, ResponseObserver, SessionBridge, SessionOutcome};
pub use message::{LENGTH_PREFIX, SessionMessage};
pub use producer::{ProducerStats, heartbeat, interactive, lines, stdin_lines};
pub use queue::{BlockingProducer, MessageQueue, NonBlockingProducer, QueueReceiver};
pub use ready::{ReadySignal, ReadyWaiter, readiness};
pub use transport::{ConnectionHandle, TcpTransport, Transport};
