//! Link acquisition with a bounded retry policy.
//!
//! [`LinkManager::acquire`] drives a [`LinkDriver`] until the station
//! either obtains an address or exhausts its reconnect budget.
//!
//! # Event Handling
//!
//! | Event | Action |
//! |-------|--------|
//! | `StationStarted` | Issue a connect request |
//! | `StationDisconnected` | Retry while `retries < max_retries`, else fail |
//! | `AddressAcquired` | Reset the retry counter, connected |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::Result;

use super::driver::{Credentials, LinkDriver};
use super::events::LinkEvent;

// ============================================================================
// LinkState
// ============================================================================

/// Station link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No acquisition attempted yet.
    #[default]
    Idle,
    /// Acquisition in progress.
    Connecting,
    /// Address acquired.
    Connected,
    /// Retry budget exhausted.
    Failed,
}

impl LinkState {
    /// Returns `true` for `Connected` and `Failed`.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Failed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LinkManager
// ============================================================================

/// Owns station association and its retry policy.
pub struct LinkManager {
    /// Radio driver.
    driver: Arc<dyn LinkDriver>,
    /// Current state, observable through [`LinkManager::watch_state`].
    state: watch::Sender<LinkState>,
    /// Reconnect attempts since the last address acquisition.
    retries: u32,
}

impl LinkManager {
    /// Creates a manager over the given driver.
    #[must_use]
    pub fn new(driver: Arc<dyn LinkDriver>) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        Self {
            driver,
            state,
            retries: 0,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Returns reconnect attempts issued since the last acquired address.
    #[inline]
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Associates with the access point and waits for a terminal state.
    ///
    /// Returns [`LinkState::Connected`] or [`LinkState::Failed`]. The event
    /// listener is unregistered before this returns.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Access point to join
    /// * `max_retries` - Reconnect attempts allowed after disconnects
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkDriver`](crate::Error::LinkDriver) if the driver
    /// rejects a start or connect request.
    pub async fn acquire(&mut self, credentials: &Credentials, max_retries: u32) -> Result<LinkState> {
        // Listener must exist before start, or StationStarted is lost.
        let mut subscription = self.driver.events().subscribe();
        self.state.send_replace(LinkState::Connecting);

        info!(ssid = %credentials.ssid, max_retries, "Acquiring link");

        if let Err(e) = self.driver.start(credentials) {
            self.state.send_replace(LinkState::Failed);
            return Err(e);
        }

        let outcome = loop {
            let Some(event) = subscription.next().await else {
                warn!("Link event stream ended");
                break LinkState::Failed;
            };

            match self.handle_event(event, max_retries) {
                Ok(Some(terminal)) => break terminal,
                Ok(None) => {}
                Err(e) => {
                    self.state.send_replace(LinkState::Failed);
                    return Err(e);
                }
            }
        };

        drop(subscription);
        self.state.send_replace(outcome);

        match outcome {
            LinkState::Connected => info!(ssid = %credentials.ssid, "Connected to access point"),
            _ => error!(ssid = %credentials.ssid, retries = self.retries, "Failed to connect to access point"),
        }

        Ok(outcome)
    }

    /// Applies one event; returns the terminal state if reached.
    fn handle_event(&mut self, event: LinkEvent, max_retries: u32) -> Result<Option<LinkState>> {
        debug!(%event, retries = self.retries, "Link event");

        match event {
            LinkEvent::StationStarted => {
                self.driver.connect()?;
                Ok(None)
            }
            LinkEvent::StationDisconnected => {
                if self.retries < max_retries {
                    self.driver.connect()?;
                    self.retries += 1;
                    info!(retry = self.retries, max_retries, "Retry to connect to the access point");
                    Ok(None)
                } else {
                    Ok(Some(LinkState::Failed))
                }
            }
            LinkEvent::AddressAcquired { address } => {
                info!(%address, "Got address");
                self.retries = 0;
                Ok(Some(LinkState::Connected))
            }
        }
    }
}

impl fmt::Debug for LinkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkManager")
            .field("state", &self.state())
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
