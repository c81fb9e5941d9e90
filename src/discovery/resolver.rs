//! Timeout-bounded lookups over a discovery engine.
//!
//! [`Resolver`] issues exactly one engine query per call and guards it
//! with the caller's deadline, so an engine that ignores its own timeout
//! still cannot stall the caller.
//!
//! # Classification
//!
//! | Engine outcome | Result |
//! |----------------|--------|
//! | answer | `Address` |
//! | completed, no data | `NotFound` |
//! | deadline elapsed / engine timeout | `TimedOut` |
//! | dispatch failure / fault | `Error` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::QueryId;

use super::engine::DiscoveryEngine;
use super::record::ServiceRecords;
use super::result::{EngineError, ResolutionResult};

// ============================================================================
// Resolver
// ============================================================================

/// Host and service lookups with failure classification.
#[derive(Clone)]
pub struct Resolver {
    /// Query engine.
    engine: Arc<dyn DiscoveryEngine>,
}

impl Resolver {
    /// Creates a resolver over the given engine.
    #[inline]
    #[must_use]
    pub fn new(engine: Arc<dyn DiscoveryEngine>) -> Self {
        Self { engine }
    }

    /// Resolves a host name to an address.
    ///
    /// Returns as soon as the engine answers; waits at most `deadline`.
    ///
    /// # Arguments
    ///
    /// * `name` - Host name, with or without `.local`
    /// * `deadline` - Maximum time to wait
    pub async fn lookup_host(&self, name: &str, deadline: Duration) -> ResolutionResult {
        let query = QueryId::next();
        let started = Instant::now();
        info!(%query, name, "Query A");

        let result = match timeout(deadline, self.engine.query_host(name, deadline)).await {
            Err(_) | Ok(Err(EngineError::Timeout)) => ResolutionResult::TimedOut,
            Ok(Ok(Some(ip))) => ResolutionResult::Address { ip, port: None },
            Ok(Ok(None)) => ResolutionResult::NotFound,
            Ok(Err(e)) => ResolutionResult::Error(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            ResolutionResult::Address { ip, .. } => {
                info!(%query, name, %ip, elapsed_ms, "Host resolved");
            }
            ResolutionResult::NotFound => warn!(%query, name, elapsed_ms, "Host was not found"),
            ResolutionResult::TimedOut => warn!(%query, name, elapsed_ms, "Host query timed out"),
            ResolutionResult::Error(e) => error!(%query, name, error = %e, "Host query failed"),
        }

        result
    }

    /// Queries service pointers for `service_type.proto`.
    ///
    /// Returns at most `max_results` records in engine order.
    ///
    /// # Errors
    ///
    /// - [`Error::ResolutionTimeout`] if no answer arrives within `deadline`
    /// - [`Error::ResolutionNotFound`] if the query completed with no records
    /// - [`Error::ResolutionError`] if the engine failed or `max_results` is zero
    pub async fn lookup_service(
        &self,
        service_type: &str,
        proto: &str,
        deadline: Duration,
        max_results: usize,
    ) -> Result<ServiceRecords> {
        let query = QueryId::next();
        let name = format!("{service_type}.{proto}");
        info!(%query, service = %name, max_results, "Query PTR");

        if max_results == 0 {
            return Err(Error::resolution_error(
                name,
                EngineError::InvalidQuery("max_results must be greater than zero".into()),
            ));
        }

        let answer = timeout(
            deadline,
            self.engine
                .query_service(service_type, proto, deadline, max_results),
        )
        .await;

        let records = match answer {
            Err(_) | Ok(Err(EngineError::Timeout)) => {
                warn!(%query, service = %name, "Service query timed out");
                return Err(Error::resolution_timeout(name, deadline.as_millis() as u64));
            }
            Ok(Err(e)) => {
                error!(%query, service = %name, error = %e, "Service query failed");
                return Err(Error::resolution_error(name, e));
            }
            Ok(Ok(records)) => records,
        };

        if records.is_empty() {
            warn!(%query, service = %name, "No results found");
            return Err(Error::resolution_not_found(name));
        }

        let records = ServiceRecords::new(records, max_results);
        debug!(%query, service = %name, count = records.len(), "Service records received");
        Ok(records)
    }

    /// Locates a connectable peer through a service query.
    ///
    /// Applies [`ServiceRecords::select_target`]; a result set with no
    /// selectable record is `NotFound`.
    pub async fn resolve_service(
        &self,
        service_type: &str,
        proto: &str,
        deadline: Duration,
        max_results: usize,
    ) -> ResolutionResult {
        match self
            .lookup_service(service_type, proto, deadline, max_results)
            .await
        {
            Ok(records) => match records.select_target() {
                Some(target) => {
                    info!(
                        hostname = %target.hostname,
                        address = %target.address,
                        port = target.port,
                        "Service target selected"
                    );
                    ResolutionResult::Address {
                        ip: IpAddr::V4(target.address),
                        port: Some(target.port),
                    }
                }
                None => {
                    warn!(count = records.len(), "No record carries an IPv4 service target");
                    ResolutionResult::NotFound
                }
            },
            Err(Error::ResolutionTimeout { .. }) => ResolutionResult::TimedOut,
            Err(Error::ResolutionNotFound { .. }) => ResolutionResult::NotFound,
            Err(Error::ResolutionError { source, .. }) => ResolutionResult::Error(source),
            Err(other) => ResolutionResult::Error(EngineError::Fault(other.to_string())),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
