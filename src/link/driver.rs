//! Link driver abstraction and the host driver.
//!
//! A [`LinkDriver`] is the radio/MAC layer seen from the core: it can be
//! started with [`Credentials`], accepts asynchronous connect requests,
//! and reports progress as [`LinkEvent`]s on its [`LinkEvents`] bus.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::events::{LinkEvent, LinkEvents};

// ============================================================================
// Credentials
// ============================================================================

/// Access point credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Network name.
    pub ssid: String,
    /// Pre-shared key. Empty for open networks.
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Creates credentials for the given network.
    #[inline]
    #[must_use]
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// LinkDriver
// ============================================================================

/// Wireless station driver.
///
/// Requests are fire-and-forget; outcomes arrive as events on
/// [`LinkDriver::events`]. Implementations must not block.
pub trait LinkDriver: Send + Sync {
    /// Bus the driver publishes its events on.
    fn events(&self) -> &LinkEvents;

    /// Applies credentials and starts the station interface.
    ///
    /// A successful start is followed by [`LinkEvent::StationStarted`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkDriver`] if the interface cannot be started.
    fn start(&self, credentials: &Credentials) -> Result<()>;

    /// Issues one association attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkDriver`] if the request is rejected outright.
    fn connect(&self) -> Result<()>;
}

// ============================================================================
// HostLink
// ============================================================================

/// Link driver for a host that is already on a network.
///
/// Reports started on [`start`](LinkDriver::start) and an acquired
/// address on the first [`connect`](LinkDriver::connect).
#[derive(Debug, Clone)]
pub struct HostLink {
    /// Bus for events.
    events: LinkEvents,
    /// Address reported on connect.
    address: IpAddr,
}

impl HostLink {
    /// Creates a host link that reports the given address.
    #[inline]
    #[must_use]
    pub fn new(address: IpAddr) -> Self {
        Self {
            events: LinkEvents::new(),
            address,
        }
    }

    /// Creates a host link using the address of the default route.
    ///
    /// Falls back to loopback when the host has no route.
    #[must_use]
    pub fn detect() -> Self {
        let address = default_route_address().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        debug!(%address, "Host link address detected");
        Self::new(address)
    }

    /// Returns the address this link reports.
    #[inline]
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }
}

impl LinkDriver for HostLink {
    fn events(&self) -> &LinkEvents {
        &self.events
    }

    fn start(&self, credentials: &Credentials) -> Result<()> {
        if credentials.ssid.is_empty() {
            return Err(Error::link_driver("ssid must not be empty"));
        }
        debug!(ssid = %credentials.ssid, "Host link started");
        self.events.publish(LinkEvent::StationStarted);
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        self.events.publish(LinkEvent::AddressAcquired {
            address: self.address,
        });
        Ok(())
    }
}

/// Local address the OS would use to reach a public destination.
///
/// Connecting a UDP socket sends no packets.
fn default_route_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).ok()?;
    socket
        .connect(SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 9)))
        .ok()?;
    let address = socket.local_addr().ok()?.ip();
    (!address.is_unspecified()).then_some(address)
}

// ============================================================================
// Tests
// ============================================================================
