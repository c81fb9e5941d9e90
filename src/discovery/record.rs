//! Service discovery records and target selection.
//!
//! A PTR query yields an ordered list of [`ServiceRecord`]s. Records live
//! only as long as the caller keeps the [`ServiceRecords`] value; nothing
//! is cached.
//!
//! # Selection Policy
//!
//! [`ServiceRecords::select_target`] walks records in engine order and
//! picks the first one that:
//!
//! - carries an SRV hostname (host and port come from the same record)
//! - has an attached IPv4 address (the session transport is v4-only)
//!
//! Records without addresses are informational and never selected.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

// ============================================================================
// IpFamily
// ============================================================================

/// Address family a record was received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpFamily {
    /// IPv4.
    #[default]
    V4,
    /// IPv6.
    V6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("V4"),
            Self::V6 => f.write_str("V6"),
        }
    }
}

// ============================================================================
// TxtAttribute
// ============================================================================

/// One key/value pair from a TXT record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtAttribute {
    /// Attribute key.
    pub key: String,
    /// Raw value; `None` for boolean attributes.
    pub value: Option<Vec<u8>>,
}

impl TxtAttribute {
    /// Creates an attribute with a value.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a key-only attribute.
    #[inline]
    #[must_use]
    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns the value length in bytes.
    #[inline]
    #[must_use]
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, Vec::len)
    }
}

impl fmt::Display for TxtAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            None => write!(f, "{}=NULL({})", self.key, self.value_len()),
            Some(raw) => match std::str::from_utf8(raw) {
                Ok(text) => write!(f, "{}={}({})", self.key, text, raw.len()),
                Err(_) => write!(f, "{}={}({})", self.key, STANDARD.encode(raw), raw.len()),
            },
        }
    }
}

// ============================================================================
// ServiceRecord
// ============================================================================

/// One answer from a service query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Interface the answer arrived on.
    pub interface: String,
    /// Family of the packet that carried the answer.
    pub family: IpFamily,
    /// PTR instance name.
    pub instance_name: Option<String>,
    /// Service type, e.g. `_service_3333`.
    pub service_type: Option<String>,
    /// Protocol label, e.g. `_udp`.
    pub proto: Option<String>,
    /// Record time-to-live in seconds.
    pub ttl: u32,
    /// SRV target host.
    pub hostname: Option<String>,
    /// SRV port.
    pub port: u16,
    /// TXT attributes in received order.
    pub txt: Vec<TxtAttribute>,
    /// A/AAAA addresses in received order.
    pub addresses: Vec<IpAddr>,
}

impl ServiceRecord {
    /// Creates an empty record received on `interface`.
    #[must_use]
    pub fn new(interface: impl Into<String>, family: IpFamily) -> Self {
        Self {
            interface: interface.into(),
            family,
            ..Default::default()
        }
    }

    /// Sets the PTR fields.
    #[must_use]
    pub fn with_instance(
        mut self,
        instance_name: impl Into<String>,
        service_type: impl Into<String>,
        proto: impl Into<String>,
    ) -> Self {
        self.instance_name = Some(instance_name.into());
        self.service_type = Some(service_type.into());
        self.proto = Some(proto.into());
        self
    }

    /// Sets the SRV target.
    #[must_use]
    pub fn with_srv(mut self, hostname: impl Into<String>, port: u16) -> Self {
        self.hostname = Some(hostname.into());
        self.port = port;
        self
    }

    /// Sets the TTL.
    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Appends a TXT attribute.
    #[must_use]
    pub fn with_txt(mut self, attribute: TxtAttribute) -> Self {
        self.txt.push(attribute);
        self
    }

    /// Appends an address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<IpAddr>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Returns `true` if the record has at least one address.
    #[inline]
    #[must_use]
    pub fn has_addresses(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// Returns the first IPv4 address in received order.
    #[must_use]
    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().find_map(|address| match address {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// Returns `true` if the record matches the given service type and proto.
    #[must_use]
    pub fn matches(&self, service_type: &str, proto: &str) -> bool {
        self.service_type.as_deref() == Some(service_type) && self.proto.as_deref() == Some(proto)
    }

    /// Builds a connection target from this record alone.
    #[must_use]
    pub fn target(&self) -> Option<ServiceTarget> {
        let hostname = self.hostname.clone()?;
        let address = self.first_ipv4()?;
        Some(ServiceTarget {
            hostname,
            address,
            port: self.port,
        })
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Interface: {}, Type: {}, TTL: {}",
            self.interface, self.family, self.ttl
        )?;

        if let Some(instance) = &self.instance_name {
            write!(
                f,
                "\n  PTR : {}.{}.{}",
                instance,
                self.service_type.as_deref().unwrap_or_default(),
                self.proto.as_deref().unwrap_or_default()
            )?;
        }

        if let Some(hostname) = &self.hostname {
            write!(f, "\n  SRV : {}.local:{}", hostname, self.port)?;
        }

        if !self.txt.is_empty() {
            write!(f, "\n  TXT : [{}] ", self.txt.len())?;
            for attribute in &self.txt {
                write!(f, "{attribute}; ")?;
            }
        }

        for address in &self.addresses {
            match address {
                IpAddr::V6(v6) => write!(f, "\n  AAAA: {v6}")?,
                IpAddr::V4(v4) => write!(f, "\n  A   : {v4}")?,
            }
        }

        Ok(())
    }
}

// ============================================================================
// ServiceTarget
// ============================================================================

/// Host, address and port taken from a single selected record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceTarget {
    /// SRV hostname.
    pub hostname: String,
    /// First IPv4 address of the record.
    pub address: Ipv4Addr,
    /// SRV port.
    pub port: u16,
}

impl ServiceTarget {
    /// Returns the socket address to connect to.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

// ============================================================================
// ServiceRecords
// ============================================================================

/// Fully materialized result of one service query, in engine order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceRecords {
    records: Vec<ServiceRecord>,
}

impl ServiceRecords {
    /// Wraps records, keeping at most `max_results`.
    #[must_use]
    pub fn new(mut records: Vec<ServiceRecord>, max_results: usize) -> Self {
        records.truncate(max_results);
        Self { records }
    }

    /// Returns the number of records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if there are no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in engine order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ServiceRecord> {
        self.records.iter()
    }

    /// Returns the first selectable connection target.
    #[must_use]
    pub fn select_target(&self) -> Option<ServiceTarget> {
        self.records.iter().find_map(ServiceRecord::target)
    }
}

impl<'a> IntoIterator for &'a ServiceRecords {
    type Item = &'a ServiceRecord;
    type IntoIter = std::slice::Iter<'a, ServiceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for ServiceRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, record) in self.records.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", index + 1, record)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv6Addr;

    use proptest::prelude::*;

    fn v6_only() -> ServiceRecord {
        ServiceRecord::new("sta", IpFamily::V6)
            .with_srv("alpha", 3001)
            .with_address(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))
    }

    fn dual_stack() -> ServiceRecord {
        ServiceRecord::new("sta", IpFamily::V4)
            .with_srv("beta", 3002)
            .with_address(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2))
            .with_address(Ipv4Addr::new(192, 168, 4, 20))
    }

    fn v4_only() -> ServiceRecord {
        ServiceRecord::new("sta", IpFamily::V4)
            .with_srv("gamma", 3003)
            .with_address(Ipv4Addr::new(192, 168, 4, 30))
    }

    #[test]
    fn test_select_prefers_first_record_with_ipv4() {
        let records = ServiceRecords::new(vec![v6_only(), dual_stack(), v4_only()], 20);

        let target = records.select_target().expect("target");

        assert_eq!(target.hostname, "beta");
        assert_eq!(target.address, Ipv4Addr::new(192, 168, 4, 20));
        assert_eq!(target.port, 3002);
        assert_eq!(target.socket_addr().to_string(), "192.168.4.20:3002");
    }

    #[test]
    fn test_record_without_addresses_is_not_selectable() {
        let informational = ServiceRecord::new("sta", IpFamily::V4)
            .with_instance("peer", "_service_3333", "_udp")
            .with_srv("delta", 4000);
        let records = ServiceRecords::new(vec![informational, v4_only()], 20);

        assert_eq!(records.select_target().unwrap().hostname, "gamma");
    }

    #[test]
    fn test_address_without_srv_is_not_selectable() {
        let bare = ServiceRecord::new("sta", IpFamily::V4).with_address(Ipv4Addr::new(10, 0, 0, 1));
        let records = ServiceRecords::new(vec![bare], 20);

        assert!(records.select_target().is_none());
    }

    #[test]
    fn test_max_results_truncates() {
        let records = ServiceRecords::new(vec![v6_only(), dual_stack(), v4_only()], 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().last().unwrap().hostname.as_deref(), Some("beta"));
    }

    #[test]
    fn test_txt_display() {
        assert_eq!(TxtAttribute::new("board", "esp32").to_string(), "board=esp32(5)");
        assert_eq!(TxtAttribute::flag("secure").to_string(), "secure=NULL(0)");
        assert_eq!(TxtAttribute::new("raw", vec![0xff, 0xfe]).to_string(), "raw=//4=(2)");
    }

    #[test]
    fn test_record_display() {
        let record = ServiceRecord::new("sta", IpFamily::V4)
            .with_ttl(120)
            .with_instance("esp32", "_service_3333", "_udp")
            .with_srv("esp32-a1b2c3", 3333)
            .with_txt(TxtAttribute::new("u", "user"))
            .with_address(Ipv4Addr::new(192, 168, 4, 2));

        let text = ServiceRecords::new(vec![record], 20).to_string();

        assert_eq!(
            text,
            "1: Interface: sta, Type: V4, TTL: 120\n\
             \x20 PTR : esp32._service_3333._udp\n\
             \x20 SRV : esp32-a1b2c3.local:3333\n\
             \x20 TXT : [1] u=user(4); \n\
             \x20 A   : 192.168.4.2"
        );
    }

    fn arb_address() -> impl Strategy<Value = IpAddr> {
        prop_oneof![
            any::<[u8; 4]>().prop_map(|o| IpAddr::V4(Ipv4Addr::from(o))),
            any::<[u16; 8]>().prop_map(|s| IpAddr::V6(Ipv6Addr::from(s))),
        ]
    }

    fn arb_record() -> impl Strategy<Value = ServiceRecord> {
        (
            proptest::option::of("[a-z]{1,8}"),
            any::<u16>(),
            proptest::collection::vec(arb_address(), 0..4),
        )
            .prop_map(|(hostname, port, addresses)| ServiceRecord {
                interface: "sta".into(),
                hostname,
                port,
                addresses,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn prop_selection_is_first_eligible_in_order(records in proptest::collection::vec(arb_record(), 0..8)) {
            let expected = records
                .iter()
                .find(|r| r.hostname.is_some() && r.first_ipv4().is_some())
                .cloned();
            let set = ServiceRecords::new(records.clone(), usize::MAX);

            prop_assert_eq!(set.iter().cloned().collect::<Vec<_>>(), records);

            let selected = set.select_target();
            match expected {
                Some(record) => {
                    let target = selected.expect("eligible record exists");
                    prop_assert_eq!(Some(target.hostname), record.hostname.clone());
                    prop_assert_eq!(target.port, record.port);
                    prop_assert_eq!(Some(target.address), record.first_ipv4());
                }
                None => prop_assert!(selected.is_none()),
            }
        }
    }
}
