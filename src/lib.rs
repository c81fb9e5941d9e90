//! Wi-Fi Rendezvous - link bring-up, mDNS peer resolution, session bridge.
//!
//! This library brings a networked endpoint from "no network" to "talking
//! to a peer over one TCP socket": it joins a wireless network, locates
//! the peer by multicast DNS name or service, opens a socket, and relays
//! messages from any number of producers through a bounded queue.
//!
//! # Architecture
//!
//! The pipeline runs strictly in order, once:
//!
//! - **Link**: event-driven association with bounded retries
//! - **Resolve**: one timeout-guarded host or service query
//! - **Connect**: one stream to the resolved address
//! - **Bridge**: a single consumer owns the socket and drains the queue
//!
//! Key design principles:
//!
//! - The socket is owned by the bridge alone; producers only see the queue
//! - Producers wait on a readiness signal before their first message
//! - A `Stop` message is the only way to end a session from outside
//! - Link, resolution, and connect failures are terminal
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wifi_rendezvous::{
//!     ConnectionLifecycle, HostLink, LifecycleConfig, Result, SystemEngine, stdin_lines,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = LifecycleConfig::new()
//!         .with_credentials("lab-network", "secret")
//!         .with_peer_host("esp32", 3333);
//!
//!     let lifecycle = ConnectionLifecycle::builder()
//!         .transport(config.session.tcp_transport())
//!         .config(config)
//!         .link_driver(Arc::new(HostLink::detect()))
//!         .engine(Arc::new(SystemEngine::new()))
//!         .build()?;
//!
//!     let _heartbeat = lifecycle.spawn_heartbeat();
//!     let _input = lifecycle.spawn_interactive(stdin_lines());
//!
//!     let outcome = lifecycle.run().await?;
//!     println!("Session {} ended: {:?}", outcome.session_id, outcome.reason);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`link`] | Link events, drivers, and the [`LinkManager`] state machine |
//! | [`discovery`] | Discovery engines, service records, and the [`Resolver`] |
//! | [`session`] | Message queue, producers, transport, and the [`SessionBridge`] |
//! | [`lifecycle`] | Configuration and the [`ConnectionLifecycle`] orchestrator |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Session and query identifiers |

// ============================================================================
// Modules
// ============================================================================

/// Name and service discovery.
///
/// - [`Resolver`] - Timeout-bounded host and service lookups
/// - [`DiscoveryEngine`] - Query engine seam
/// - [`MdnsEngine`] - Multicast queries on the local link
/// - [`ServiceRecord`] - One PTR/SRV/TXT/address answer
pub mod discovery;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Identifiers for sessions and queries.
pub mod identifiers;

/// Pipeline configuration and orchestration.
///
/// Use [`ConnectionLifecycle::builder()`] to assemble a lifecycle.
pub mod lifecycle;

/// Wireless link acquisition.
pub mod link;

/// Producer-to-socket session bridge.
///
/// - [`MessageQueue`] - Byte-bounded FIFO with blocking and non-blocking producers
/// - [`SessionBridge`] - Single consumer owning the socket
/// - [`Transport`] - Stream transport seam
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

// Discovery types
pub use discovery::{
    DiscoveryEngine, EngineError, IpFamily, MdnsEngine, ResolutionResult, Resolver,
    ServiceRecord, ServiceRecords, ServiceTarget, StaticEngine, SystemEngine, TxtAttribute,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{QueryId, SessionId};

// Lifecycle types
pub use lifecycle::{
    ConnectionLifecycle, LifecycleBuilder, LifecycleConfig, LifecyclePhase, LinkConfig,
    PeerLocator, SessionConfig,
};

// Link types
pub use link::{Credentials, HostLink, LinkDriver, LinkEvent, LinkEvents, LinkManager, LinkState};

// Session types
pub use session::{
    ActiveBridge, BlockingProducer, BridgeState, CloseReason, ConnectionHandle, MessageQueue,
    NonBlockingProducer, ProducerStats, QueueReceiver, ReadySignal, ReadyWaiter,
    ResponseObserver, SessionBridge, SessionMessage, SessionOutcome, TcpTransport, Transport,
    heartbeat, interactive, readiness, stdin_lines,
};
