//! Lifecycle configuration.
//!
//! Loadable from JSON or built in code. Every field has a default, so a
//! JSON document only needs the values it changes:
//!
//! ```ignore
//! use wifi_rendezvous::LifecycleConfig;
//!
//! let config = LifecycleConfig::from_json_str(r#"{
//!     "link": { "ssid": "lab", "password": "secret" },
//!     "peer": { "kind": "host", "hostname": "esp32" }
//! }"#)?;
//! assert_eq!(config.session.queue_capacity, 1024);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::link::Credentials;
use crate::session::LENGTH_PREFIX;
use crate::session::TcpTransport;

// ============================================================================
// Constants
// ============================================================================

/// Default peer port.
pub const DEFAULT_PEER_PORT: u16 = 3333;

/// Default link retry bound.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default resolution deadline in milliseconds.
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 10_000;

/// Default service query result bound.
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// Service type and protocol labels, e.g. `_service_3333` and `_udp`.
const SERVICE_LABEL: &str = r"^_[A-Za-z0-9][A-Za-z0-9_-]{0,62}$";

// ============================================================================
// LinkConfig
// ============================================================================

/// Wireless link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Network name.
    pub ssid: String,
    /// Network passphrase.
    pub password: String,
    /// Reconnect attempts after disconnects.
    pub max_retries: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl LinkConfig {
    /// Returns the credentials handed to the link driver.
    #[inline]
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.ssid.clone(), self.password.clone())
    }
}

// ============================================================================
// PeerLocator
// ============================================================================

/// How the peer is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerLocator {
    /// Address query for a host name.
    Host {
        /// Host name, with or without `.local`.
        hostname: String,
        /// Peer port.
        #[serde(default = "default_peer_port")]
        port: u16,
    },
    /// PTR/SRV query for a service.
    Service {
        /// Service type, e.g. `_service_3333`.
        service_type: String,
        /// Protocol label, e.g. `_udp`.
        proto: String,
        /// Port to use instead of the SRV port.
        #[serde(default)]
        port_override: Option<u16>,
        /// Records to collect at most.
        #[serde(default = "default_max_results")]
        max_results: usize,
    },
}

fn default_peer_port() -> u16 {
    DEFAULT_PEER_PORT
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl Default for PeerLocator {
    fn default() -> Self {
        Self::Host {
            hostname: String::new(),
            port: DEFAULT_PEER_PORT,
        }
    }
}

impl PeerLocator {
    /// Locates the peer by host name.
    #[inline]
    #[must_use]
    pub fn host(hostname: impl Into<String>, port: u16) -> Self {
        Self::Host {
            hostname: hostname.into(),
            port,
        }
    }

    /// Locates the peer by service query.
    #[inline]
    #[must_use]
    pub fn service(service_type: impl Into<String>, proto: impl Into<String>) -> Self {
        Self::Service {
            service_type: service_type.into(),
            proto: proto.into(),
            port_override: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Returns the queried name, for logs and errors.
    #[must_use]
    pub fn query_name(&self) -> String {
        match self {
            Self::Host { hostname, .. } => hostname.clone(),
            Self::Service {
                service_type, proto, ..
            } => format!("{service_type}.{proto}"),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Host { hostname, port } => {
                if hostname.trim().is_empty() {
                    return Err(Error::config("peer hostname is required"));
                }
                if hostname.chars().any(char::is_whitespace) {
                    return Err(Error::config(format!(
                        "peer hostname contains whitespace: {hostname:?}"
                    )));
                }
                if *port == 0 {
                    return Err(Error::config("peer port must be non-zero"));
                }
            }
            Self::Service {
                service_type,
                proto,
                port_override,
                max_results,
            } => {
                let label = Regex::new(SERVICE_LABEL)
                    .map_err(|e| Error::config(format!("service label pattern: {e}")))?;
                for (field, value) in [("service type", service_type), ("protocol", proto)] {
                    if !label.is_match(value) {
                        return Err(Error::config(format!(
                            "{field} {value:?} must look like _name"
                        )));
                    }
                }
                if *max_results == 0 {
                    return Err(Error::config("max_results must be greater than zero"));
                }
                if *port_override == Some(0) {
                    return Err(Error::config("port override must be non-zero"));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Session queue and transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Total queue bytes.
    pub queue_capacity: usize,
    /// Largest message payload.
    pub item_capacity: usize,
    /// Response buffer size.
    pub read_buffer: usize,
    /// Heartbeat period.
    pub heartbeat_interval_ms: u64,
    /// Connect deadline.
    pub connect_timeout_ms: u64,
    /// Response deadline; unbounded when absent.
    pub read_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            item_capacity: 64,
            read_buffer: 128,
            heartbeat_interval_ms: 5000,
            connect_timeout_ms: 10_000,
            read_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    /// Returns the heartbeat period.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Returns the connect deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the response deadline.
    #[inline]
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Returns a TCP transport using the configured connect deadline.
    #[inline]
    #[must_use]
    pub fn tcp_transport(&self) -> TcpTransport {
        TcpTransport::new().with_connect_timeout(self.connect_timeout())
    }

    fn validate(&self) -> Result<()> {
        if self.item_capacity == 0 {
            return Err(Error::config("item_capacity must be greater than zero"));
        }
        let framed = self
            .item_capacity
            .checked_add(LENGTH_PREFIX)
            .ok_or_else(|| {
                Error::config(format!("item_capacity {} is too large", self.item_capacity))
            })?;
        if framed > self.queue_capacity {
            return Err(Error::config(format!(
                "queue_capacity {} cannot hold one {}-byte message",
                self.queue_capacity, self.item_capacity
            )));
        }
        if self.read_buffer < 2 {
            return Err(Error::config("read_buffer must be at least 2 bytes"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::config("heartbeat_interval_ms must be non-zero"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect_timeout_ms must be non-zero"));
        }
        if self.read_timeout_ms == Some(0) {
            return Err(Error::config("read_timeout_ms must be non-zero when set"));
        }
        Ok(())
    }
}

// ============================================================================
// LifecycleConfig
// ============================================================================

/// Complete lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Link settings.
    pub link: LinkConfig,
    /// Peer location.
    pub peer: PeerLocator,
    /// Resolution deadline.
    pub resolve_timeout_ms: u64,
    /// Session settings.
    pub session: SessionConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            peer: PeerLocator::default(),
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            session: SessionConfig::default(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl LifecycleConfig {
    /// Creates a configuration with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if the document is malformed
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl LifecycleConfig {
    /// Sets the network credentials.
    #[inline]
    #[must_use]
    pub fn with_credentials(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.link.ssid = ssid.into();
        self.link.password = password.into();
        self
    }

    /// Sets the link retry bound.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.link.max_retries = max_retries;
        self
    }

    /// Sets how the peer is located.
    #[inline]
    #[must_use]
    pub fn with_peer(mut self, peer: PeerLocator) -> Self {
        self.peer = peer;
        self
    }

    /// Locates the peer by host name.
    #[inline]
    #[must_use]
    pub fn with_peer_host(self, hostname: impl Into<String>, port: u16) -> Self {
        self.with_peer(PeerLocator::host(hostname, port))
    }

    /// Sets the resolution deadline.
    #[inline]
    #[must_use]
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Replaces the session settings.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.session.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Returns the resolution deadline.
    #[inline]
    #[must_use]
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl LifecycleConfig {
    /// Checks the configuration for values the lifecycle cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.link.ssid.is_empty() {
            return Err(Error::config(
                "link ssid is required. Use .with_credentials() to set it.",
            ));
        }
        if self.resolve_timeout_ms == 0 {
            return Err(Error::config("resolve_timeout_ms must be non-zero"));
        }
        self.peer.validate()?;
        self.session.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
