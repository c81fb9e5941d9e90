//! Discovery engines.
//!
//! The query engine is a collaborator behind the [`DiscoveryEngine`]
//! trait. Three engines ship with the crate:
//!
//! | Engine | Use |
//! |--------|-----|
//! | [`MdnsEngine`](super::mdns::MdnsEngine) | Multicast host and service queries on the local link |
//! | [`StaticEngine`] | Fixed host table and service records, optional latency |
//! | [`SystemEngine`] | Host lookups through the OS resolver (nss-mdns etc.) |

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;
use std::result::Result as StdResult;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::time::{sleep, timeout};
use tracing::trace;

use super::record::ServiceRecord;
use super::result::EngineError;

// ============================================================================
// Constants
// ============================================================================

/// Multicast DNS domain suffix.
pub const LOCAL_DOMAIN: &str = "local";

// ============================================================================
// DiscoveryEngine
// ============================================================================

/// Name and service query engine.
///
/// Each call issues one query and completes once: with an answer, with
/// "nothing found", or with an [`EngineError`].
#[async_trait]
pub trait DiscoveryEngine: Send + Sync {
    /// Queries the address of `name`.
    ///
    /// Returns `Ok(None)` when the query completed without an answer.
    async fn query_host(&self, name: &str, timeout: Duration) -> StdResult<Option<IpAddr>, EngineError>;

    /// Queries service pointers for `service_type.proto`.
    ///
    /// Records are returned in the order they were received.
    async fn query_service(
        &self,
        service_type: &str,
        proto: &str,
        timeout: Duration,
        max_results: usize,
    ) -> StdResult<Vec<ServiceRecord>, EngineError>;
}

// ============================================================================
// Name Helpers
// ============================================================================

/// Strips a trailing `.local` / `.local.` suffix.
#[must_use]
pub fn bare_name(name: &str) -> &str {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.strip_suffix(".local").unwrap_or(name)
}

/// Appends `.local` to single-label names other than `localhost`.
#[must_use]
pub fn local_name(name: &str) -> String {
    let bare = bare_name(name);
    if bare.contains('.') || bare == "localhost" {
        bare.to_string()
    } else {
        format!("{bare}.{LOCAL_DOMAIN}")
    }
}

/// Picks the answer address, IPv4 first, lowest address on ties.
pub(crate) fn preferred_address(addresses: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    addresses.into_iter().min_by_key(|ip| (ip.is_ipv6(), *ip))
}

// ============================================================================
// StaticEngine
// ============================================================================

/// Engine answering from a fixed table.
///
/// Answers after a configurable latency. An uninitialized engine fails
/// every query with [`EngineError::NotInitialized`].
#[derive(Debug, Clone, Default)]
pub struct StaticEngine {
    /// Host table keyed by bare name.
    hosts: FxHashMap<String, IpAddr>,
    /// Service records in answer order.
    services: Vec<ServiceRecord>,
    /// Delay before every answer.
    latency: Duration,
    /// Fail every query when set.
    uninitialized: bool,
}

impl StaticEngine {
    /// Creates an empty engine.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine that reports it was never initialized.
    #[inline]
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            uninitialized: true,
            ..Self::default()
        }
    }

    /// Adds a host entry.
    #[must_use]
    pub fn with_host(mut self, name: &str, address: impl Into<IpAddr>) -> Self {
        self.hosts.insert(bare_name(name).to_string(), address.into());
        self
    }

    /// Adds a service record.
    #[must_use]
    pub fn with_service(mut self, record: ServiceRecord) -> Self {
        self.services.push(record);
        self
    }

    /// Sets the answer latency.
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Waits out the configured latency.
    async fn answer_delay(&self) -> StdResult<(), EngineError> {
        if self.uninitialized {
            return Err(EngineError::NotInitialized);
        }
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl DiscoveryEngine for StaticEngine {
    async fn query_host(&self, name: &str, _timeout: Duration) -> StdResult<Option<IpAddr>, EngineError> {
        self.answer_delay().await?;
        let answer = self.hosts.get(bare_name(name)).copied();
        trace!(name, ?answer, "Static host query");
        Ok(answer)
    }

    async fn query_service(
        &self,
        service_type: &str,
        proto: &str,
        _timeout: Duration,
        max_results: usize,
    ) -> StdResult<Vec<ServiceRecord>, EngineError> {
        self.answer_delay().await?;
        Ok(self
            .services
            .iter()
            .filter(|record| record.matches(service_type, proto))
            .take(max_results)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SystemEngine
// ============================================================================

/// Engine backed by the operating system resolver.
///
/// Single-label names are queried as `<name>.local`, which the host's
/// multicast resolver answers. A resolver failure is an
/// [`EngineError::Fault`]; an empty answer is "nothing found". Service
/// queries are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEngine;

impl SystemEngine {
    /// Creates the engine.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiscoveryEngine for SystemEngine {
    async fn query_host(&self, name: &str, query_timeout: Duration) -> StdResult<Option<IpAddr>, EngineError> {
        let qualified = local_name(name);
        if qualified.len() > 253 {
            return Err(EngineError::InvalidQuery(format!("name too long: {qualified}")));
        }

        let lookup = tokio::net::lookup_host((qualified.as_str(), 0));
        match timeout(query_timeout, lookup).await {
            Err(_) => Err(EngineError::Timeout),
            Ok(Err(e)) => Err(EngineError::Fault(format!("lookup {qualified}: {e}"))),
            Ok(Ok(answers)) => Ok(preferred_address(answers.map(|addr| addr.ip()))),
        }
    }

    async fn query_service(
        &self,
        service_type: &str,
        proto: &str,
        _timeout: Duration,
        _max_results: usize,
    ) -> StdResult<Vec<ServiceRecord>, EngineError> {
        Err(EngineError::Unsupported(format!(
            "PTR {service_type}.{proto}.{LOCAL_DOMAIN} needs a multicast engine"
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    use super::super::record::IpFamily;

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("esp32.local"), "esp32");
        assert_eq!(bare_name("esp32.local."), "esp32");
        assert_eq!(bare_name("esp32"), "esp32");
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("esp32"), "esp32.local");
        assert_eq!(local_name("esp32.local"), "esp32.local");
        assert_eq!(local_name("peer.example.org"), "peer.example.org");
        assert_eq!(local_name("localhost"), "localhost");
    }

    #[tokio::test]
    async fn test_static_host_lookup_ignores_local_suffix() {
        let ip = Ipv4Addr::new(192, 168, 4, 2);
        let engine = StaticEngine::new().with_host("peer.local", ip);

        let answer = engine.query_host("peer", Duration::from_secs(1)).await;
        assert_eq!(answer, Ok(Some(IpAddr::V4(ip))));

        let missing = engine.query_host("other", Duration::from_secs(1)).await;
        assert_eq!(missing, Ok(None));
    }

    #[tokio::test]
    async fn test_static_uninitialized_fails() {
        let engine = StaticEngine::uninitialized();
        let answer = engine.query_host("peer", Duration::from_secs(1)).await;
        assert_eq!(answer, Err(EngineError::NotInitialized));
    }

    #[tokio::test]
    async fn test_static_service_filters_and_limits() {
        let record = |host: &str| {
            ServiceRecord::new("sta", IpFamily::V4)
                .with_instance(host, "_service_3333", "_udp")
                .with_srv(host, 3333)
        };
        let engine = StaticEngine::new()
            .with_service(record("a"))
            .with_service(
                ServiceRecord::new("sta", IpFamily::V4).with_instance("x", "_other", "_tcp"),
            )
            .with_service(record("b"))
            .with_service(record("c"));

        let records = engine
            .query_service("_service_3333", "_udp", Duration::from_secs(1), 2)
            .await
            .expect("records");

        let hosts: Vec<_> = records.iter().filter_map(|r| r.hostname.as_deref()).collect();
        assert_eq!(hosts, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_system_engine_rejects_service_queries() {
        let result = SystemEngine::new()
            .query_service("_service_3333", "_udp", Duration::from_secs(1), 20)
            .await;
        assert!(matches!(result, Err(EngineError::Unsupported(_))));
    }

    #[test]
    fn test_preferred_address_takes_ipv4_first() {
        let v6 = IpAddr::V6(std::net::Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2));
        assert_eq!(preferred_address([v6, v4]), Some(v4));
        assert_eq!(preferred_address([v6]), Some(v6));
        assert_eq!(preferred_address(Vec::<IpAddr>::new()), None);
    }

    #[tokio::test]
    async fn test_system_engine_failure_is_fault() {
        // The reserved .invalid domain never resolves.
        let answer = SystemEngine::new()
            .query_host("peer.invalid", Duration::from_secs(5))
            .await;
        assert!(matches!(answer, Err(EngineError::Fault(_)) | Err(EngineError::Timeout)));
    }

    #[tokio::test]
    async fn test_system_engine_resolves_localhost() {
        let answer = SystemEngine::new()
            .query_host("localhost", Duration::from_secs(5))
            .await;
        assert!(matches!(answer, Ok(Some(ip)) if ip.is_loopback()));
    }
}
