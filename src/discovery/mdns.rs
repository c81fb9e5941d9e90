//! Multicast DNS engine.
//!
//! [`MdnsEngine`] sends real queries on the local link through an
//! `mdns-sd` daemon thread:
//!
//! | Query | Daemon call | Answer |
//! |-------|-------------|--------|
//! | host | `resolve_hostname("<name>.local.")` | first address, IPv4 preferred |
//! | service | `browse("<type>.<proto>.local.")` | resolved instances in arrival order |
//!
//! Both queries listen for nine tenths of the caller's deadline, then
//! report what arrived. A window that closes with no answer is "nothing
//! found"; only daemon failures are errors.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::result::Result as StdResult;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{HostnameResolutionEvent, ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace};

use super::engine::{DiscoveryEngine, LOCAL_DOMAIN, bare_name, preferred_address};
use super::record::{IpFamily, ServiceRecord, TxtAttribute};
use super::result::EngineError;

// ============================================================================
// Constants
// ============================================================================

/// Interface label on records; the daemon listens on every interface.
pub const MDNS_INTERFACE: &str = "any";

// ============================================================================
// MdnsEngine
// ============================================================================

/// Engine issuing multicast DNS queries.
///
/// Owns a daemon thread, shut down when the engine is dropped.
pub struct MdnsEngine {
    daemon: ServiceDaemon,
}

impl MdnsEngine {
    /// Starts the query daemon.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Daemon`] if the daemon cannot bind its
    /// multicast sockets.
    pub fn new() -> StdResult<Self, EngineError> {
        let daemon = ServiceDaemon::new().map_err(daemon_error)?;
        info!("mDNS daemon started");
        Ok(Self { daemon })
    }
}

#[async_trait]
impl DiscoveryEngine for MdnsEngine {
    async fn query_host(&self, name: &str, deadline: Duration) -> StdResult<Option<IpAddr>, EngineError> {
        let domain = host_domain(name)?;
        let window = answer_window(deadline);

        let events = self
            .daemon
            .resolve_hostname(&domain, Some(window.as_millis() as u64))
            .map_err(daemon_error)?;
        let _search = ActiveSearch::host(&self.daemon, &domain);

        let until = Instant::now() + window;
        loop {
            let event = match timeout_at(until, events.recv_async()).await {
                Err(_) => return Ok(None),
                Ok(Err(_)) => return Err(EngineError::Daemon("daemon stopped".into())),
                Ok(Ok(event)) => event,
            };

            match event {
                HostnameResolutionEvent::AddressesFound(_, addresses) => {
                    if let Some(ip) = preferred_address(addresses.iter().copied()) {
                        debug!(name = %domain, %ip, "mDNS host answered");
                        return Ok(Some(ip));
                    }
                }
                HostnameResolutionEvent::SearchTimeout(_)
                | HostnameResolutionEvent::SearchStopped(_) => return Ok(None),
                _ => {}
            }
        }
    }

    async fn query_service(
        &self,
        service_type: &str,
        proto: &str,
        deadline: Duration,
        max_results: usize,
    ) -> StdResult<Vec<ServiceRecord>, EngineError> {
        let domain = service_domain(service_type, proto)?;
        let window = answer_window(deadline);

        let events = self.daemon.browse(&domain).map_err(daemon_error)?;
        let _search = ActiveSearch::browse(&self.daemon, &domain);

        let mut records: Vec<(String, ServiceRecord)> = Vec::new();
        let until = Instant::now() + window;
        while records.len() < max_results {
            let event = match timeout_at(until, events.recv_async()).await {
                Err(_) => break,
                Ok(Err(_)) => return Err(EngineError::Daemon("daemon stopped".into())),
                Ok(Ok(event)) => event,
            };

            match event {
                ServiceEvent::ServiceResolved(service) => {
                    let fullname = service.get_fullname().to_string();
                    let record = service_record(&service, service_type, proto);
                    trace!(instance = %fullname, "mDNS service resolved");
                    // Re-announcements update the record in place.
                    match records.iter_mut().find(|(name, _)| *name == fullname) {
                        Some((_, existing)) => *existing = record,
                        None => records.push((fullname, record)),
                    }
                }
                ServiceEvent::SearchStopped(_) => break,
                _ => {}
            }
        }

        debug!(service = %domain, count = records.len(), "mDNS browse finished");
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }
}

impl Drop for MdnsEngine {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!(error = %e, "mDNS daemon already stopped");
        }
    }
}

impl fmt::Debug for MdnsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MdnsEngine").finish_non_exhaustive()
    }
}

// ============================================================================
// ActiveSearch
// ============================================================================

enum SearchKind {
    Host,
    Browse,
}

/// Stops a daemon search when the query ends or is cancelled.
struct ActiveSearch<'a> {
    daemon: &'a ServiceDaemon,
    domain: &'a str,
    kind: SearchKind,
}

impl<'a> ActiveSearch<'a> {
    fn host(daemon: &'a ServiceDaemon, domain: &'a str) -> Self {
        Self {
            daemon,
            domain,
            kind: SearchKind::Host,
        }
    }

    fn browse(daemon: &'a ServiceDaemon, domain: &'a str) -> Self {
        Self {
            daemon,
            domain,
            kind: SearchKind::Browse,
        }
    }
}

impl Drop for ActiveSearch<'_> {
    fn drop(&mut self) {
        let stopped = match self.kind {
            SearchKind::Host => self.daemon.stop_resolve_hostname(self.domain),
            SearchKind::Browse => self.daemon.stop_browse(self.domain),
        };
        if let Err(e) = stopped {
            trace!(domain = self.domain, error = %e, "mDNS search already stopped");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn daemon_error(e: mdns_sd::Error) -> EngineError {
    EngineError::Daemon(e.to_string())
}

/// Listening time for a query that must finish within `deadline`.
fn answer_window(deadline: Duration) -> Duration {
    deadline.saturating_sub(deadline / 10)
}

/// Fully qualified `<name>.local.` for a single-label host.
fn host_domain(name: &str) -> StdResult<String, EngineError> {
    let bare = bare_name(name);
    if bare.is_empty() || bare.contains('.') || bare == "localhost" {
        return Err(EngineError::InvalidQuery(format!(
            "{name} is not a .{LOCAL_DOMAIN} host name"
        )));
    }
    Ok(format!("{bare}.{LOCAL_DOMAIN}."))
}

/// Fully qualified `<type>.<proto>.local.` browse domain.
fn service_domain(service_type: &str, proto: &str) -> StdResult<String, EngineError> {
    if !service_type.starts_with('_') || service_type.len() < 2 {
        return Err(EngineError::InvalidQuery(format!(
            "service type must start with '_': {service_type}"
        )));
    }
    if proto != "_udp" && proto != "_tcp" {
        return Err(EngineError::InvalidQuery(format!(
            "protocol must be _udp or _tcp: {proto}"
        )));
    }
    Ok(format!("{service_type}.{proto}.{LOCAL_DOMAIN}."))
}

/// Converts a resolved instance into a record.
///
/// The daemon keeps addresses in a set; they are ordered IPv4 first.
fn service_record(service: &ServiceInfo, service_type: &str, proto: &str) -> ServiceRecord {
    let fullname = service.get_fullname();
    let instance = fullname
        .strip_suffix(service.get_type())
        .map_or(fullname, |name| name.trim_end_matches('.'));

    let mut addresses: Vec<IpAddr> = service.get_addresses().iter().copied().collect();
    addresses.sort_by_key(|ip| (ip.is_ipv6(), *ip));
    let family = match addresses.first() {
        Some(IpAddr::V6(_)) => IpFamily::V6,
        _ => IpFamily::V4,
    };

    let mut record = ServiceRecord::new(MDNS_INTERFACE, family)
        .with_instance(instance, service_type, proto)
        .with_srv(bare_name(service.get_hostname()), service.get_port())
        .with_ttl(service.get_other_ttl());

    for property in service.get_properties().iter() {
        record = record.with_txt(TxtAttribute {
            key: property.key().to_string(),
            value: property.val().map(<[u8]>::to_vec),
        });
    }
    for address in addresses {
        record = record.with_address(address);
    }
    record
}

// ============================================================================
// Tests
// ============================================================================
