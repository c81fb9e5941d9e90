//! Builder pattern for lifecycle assembly.
//!
//! Collects the configuration and the collaborators a
//! [`ConnectionLifecycle`] drives: a link driver, a discovery engine, and
//! a transport. The response observer is optional and defaults to
//! logging each response.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::discovery::{DiscoveryEngine, Resolver};
use crate::error::{Error, Result};
use crate::link::{LinkDriver, LinkManager};
use crate::session::{MessageQueue, ResponseObserver, Transport, readiness};

use super::config::LifecycleConfig;
use super::core::ConnectionLifecycle;

// ============================================================================
// LifecycleBuilder
// ============================================================================

/// Builder for a [`ConnectionLifecycle`].
///
/// Use [`ConnectionLifecycle::builder()`] to create one.
pub struct LifecycleBuilder<T> {
    /// Validated at build time.
    config: Option<LifecycleConfig>,
    /// Radio driver.
    driver: Option<Arc<dyn LinkDriver>>,
    /// Name and service query engine.
    engine: Option<Arc<dyn DiscoveryEngine>>,
    /// Stream transport.
    transport: Option<T>,
    /// Response callback.
    observer: Option<ResponseObserver>,
}

impl<T> Default for LifecycleBuilder<T> {
    fn default() -> Self {
        Self {
            config: None,
            driver: None,
            engine: None,
            transport: None,
            observer: None,
        }
    }
}

impl<T> LifecycleBuilder<T> {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the link driver.
    #[inline]
    #[must_use]
    pub fn link_driver(mut self, driver: Arc<dyn LinkDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Sets the discovery engine.
    #[inline]
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn DiscoveryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the transport, fixing the lifecycle's transport type.
    #[must_use]
    pub fn transport<U>(self, transport: U) -> LifecycleBuilder<U> {
        LifecycleBuilder {
            config: self.config,
            driver: self.driver,
            engine: self.engine,
            transport: Some(transport),
            observer: self.observer,
        }
    }

    /// Sets the response callback.
    #[inline]
    #[must_use]
    pub fn observer(mut self, observer: ResponseObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl<T> LifecycleBuilder<T>
where
    T: Transport,
{
    /// Builds the lifecycle with validation.
    ///
    /// Creates the session queue so producers can be handed out before
    /// the lifecycle runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a collaborator is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<ConnectionLifecycle<T>> {
        let config = self.config.ok_or_else(|| {
            Error::config(
                "Configuration is required. Use .config() to set it.\n\
                 Example: ConnectionLifecycle::builder().config(LifecycleConfig::new())",
            )
        })?;
        config.validate()?;

        let driver = self.driver.ok_or_else(|| {
            Error::config("Link driver is required. Use .link_driver() to set it.")
        })?;
        let engine = self.engine.ok_or_else(|| {
            Error::config("Discovery engine is required. Use .engine() to set it.")
        })?;
        let transport = self
            .transport
            .ok_or_else(|| Error::config("Transport is required. Use .transport() to set it."))?;

        let observer = self.observer.unwrap_or_else(log_observer);
        let (queue, receiver) =
            MessageQueue::new(config.session.queue_capacity, config.session.item_capacity)?;

        Ok(ConnectionLifecycle::new(
            config,
            LinkManager::new(driver),
            Resolver::new(engine),
            transport,
            observer,
            queue,
            receiver,
            readiness(),
        ))
    }
}

impl<T> fmt::Debug for LifecycleBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBuilder")
            .field("config", &self.config)
            .field("driver", &self.driver.is_some())
            .field("engine", &self.engine.is_some())
            .field("transport", &self.transport.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Observer that logs each response as text.
fn log_observer() -> ResponseObserver {
    Box::new(|response: &[u8]| {
        info!(len = response.len(), text = %String::from_utf8_lossy(response), "Message received");
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use crate::discovery::StaticEngine;
    use crate::link::HostLink;
    use crate::session::TcpTransport;

    fn config() -> LifecycleConfig {
        LifecycleConfig::new()
            .with_credentials("lab", "secret")
            .with_peer_host("peer", 3333)
    }

    fn complete() -> LifecycleBuilder<TcpTransport> {
        ConnectionLifecycle::builder()
            .config(config())
            .link_driver(Arc::new(HostLink::new(IpAddr::V4(Ipv4Addr::LOCALHOST))))
            .engine(Arc::new(StaticEngine::new()))
            .transport(TcpTransport::new())
    }

    fn message(result: Result<ConnectionLifecycle<TcpTransport>>) -> String {
        match result {
            Err(Error::Config { message }) => message,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("build should fail"),
        }
    }

    #[test]
    fn test_complete_builder_builds() {
        let lifecycle = complete().build().unwrap();
        assert_eq!(lifecycle.config().link.ssid, "lab");
    }

    #[test]
    fn test_missing_config() {
        let builder = LifecycleBuilder::<TcpTransport> {
            config: None,
            ..complete()
        };
        assert!(message(builder.build()).contains("Configuration is required"));
    }

    #[test]
    fn test_missing_driver() {
        let builder = LifecycleBuilder {
            driver: None,
            ..complete()
        };
        assert!(message(builder.build()).contains("Link driver"));
    }

    #[test]
    fn test_missing_engine() {
        let builder = LifecycleBuilder {
            engine: None,
            ..complete()
        };
        assert!(message(builder.build()).contains("Discovery engine"));
    }

    #[test]
    fn test_missing_transport() {
        let builder = LifecycleBuilder::<TcpTransport>::new()
            .config(config())
            .link_driver(Arc::new(HostLink::new(IpAddr::V4(Ipv4Addr::LOCALHOST))))
            .engine(Arc::new(StaticEngine::new()));
        assert!(message(builder.build()).contains("Transport"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let builder = complete().config(LifecycleConfig::new());
        assert!(message(builder.build()).contains("ssid"));
    }

    #[test]
    fn test_debug_lists_collaborators() {
        let debug = format!("{:?}", complete());
        assert!(debug.contains("driver: true"));
        assert!(debug.contains("observer: false"));
    }
}
