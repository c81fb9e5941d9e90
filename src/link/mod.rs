//! Wireless link acquisition.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`LinkManager`] | Blocking acquire with bounded retries |
//! | [`LinkDriver`] | Radio driver seen from the core |
//! | [`LinkEvents`] | Event bus with RAII [`Subscription`]s |
//! | [`HostLink`] | Driver for hosts already on a network |

// ============================================================================
// Submodules
// ============================================================================

/// Link driver trait, credentials and the host driver.
pub mod driver;

/// Link events and scoped subscriptions.
pub mod events;

/// Retry-bounded link manager.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use driver::{Credentials, HostLink, LinkDriver};
pub use events::{LinkEvent, LinkEvents, Subscription};
pub use manager::{LinkManager, LinkState};
