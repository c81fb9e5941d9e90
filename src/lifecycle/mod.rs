//! Connection lifecycle: link, resolve, connect, bridge.
//!
//! # Example
//!
//! ```ignore
//! let config = LifecycleConfig::from_json_file("rendezvous.json")?;
//! let lifecycle = ConnectionLifecycle::builder()
//!     .transport(config.session.tcp_transport())
//!     .config(config)
//!     .link_driver(Arc::new(HostLink::detect()))
//!     .engine(Arc::new(SystemEngine::new()))
//!     .build()?;
//!
//! lifecycle.spawn_heartbeat();
//! lifecycle.spawn_interactive(stdin_lines());
//! let outcome = lifecycle.run().await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Lifecycle builder.
pub mod builder;

/// Serializable configuration.
pub mod config;

/// Pipeline orchestration.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::LifecycleBuilder;
pub use config::{DEFAULT_PEER_PORT, LifecycleConfig, LinkConfig, PeerLocator, SessionConfig};
pub use core::{ConnectionLifecycle, LifecyclePhase};
