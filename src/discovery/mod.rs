//! Peer name and service resolution.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Resolver`] | Deadline-bounded lookups with outcome classification |
//! | [`DiscoveryEngine`] | Query engine seen from the core |
//! | [`MdnsEngine`] | Multicast queries on the local link |
//! | [`ServiceRecords`] | Materialized service query answer |
//! | [`ResolutionResult`] | Outcome of one host lookup |

// ============================================================================
// Submodules
// ============================================================================

/// Discovery engine trait and bundled engines.
pub mod engine;

/// Multicast DNS engine.
pub mod mdns;

/// Service records and target selection.
pub mod record;

/// Deadline-bounded resolver.
pub mod resolver;

/// Lookup outcomes and engine errors.
pub mod result;

// ============================================================================
// Re-exports
// ============================================================================

pub use engine::{DiscoveryEngine, StaticEngine, SystemEngine};
pub use mdns::MdnsEngine;
pub use record::{IpFamily, ServiceRecord, ServiceRecords, ServiceTarget, TxtAttribute};
pub use resolver::Resolver;
pub use result::{EngineError, ResolutionResult};
