//! Fabric transport abstraction
//!
//! Defines the transport identifier used to key listen addresses and the
//! Transport trait each fabric backend implements.

use std::fmt;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("address already in use: {0}")]
    AddrInUse(String),

    #[error("no listener bound to {0}")]
    NotListening(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Fabric transport types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Rdma,
    Fc,
    Tcp,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Rdma => "RDMA",
            TransportType::Fc => "FC",
            TransportType::Tcp => "TCP",
        }
    }

    /// Parse a transport type string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RDMA" => Some(TransportType::Rdma),
            "FC" => Some(TransportType::Fc),
            "TCP" => Some(TransportType::Tcp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family of a fabric address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    Ib,
    Fc,
}

impl AddressFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "IPv4",
            AddressFamily::Ipv6 => "IPv6",
            AddressFamily::Ib => "IB",
            AddressFamily::Fc => "FC",
        }
    }

    /// Parse an address family string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IPV4" => Some(AddressFamily::Ipv4),
            "IPV6" => Some(AddressFamily::Ipv6),
            "IB" => Some(AddressFamily::Ib),
            "FC" => Some(AddressFamily::Fc),
            _ => None,
        }
    }
}

/// Transport identifier: the key distinguishing one listen address from
/// another. Compared by value everywhere; a listen address stores the key,
/// not a reference to the transport serving it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportId {
    /// Transport type this address belongs to
    pub trtype: TransportType,
    /// Address family of traddr
    pub adrfam: AddressFamily,
    /// Fabric address (IP address, IB GID, FC WWN)
    pub traddr: String,
    /// Transport service id (e.g. TCP/RDMA port number)
    pub trsvcid: String,
}

impl TransportId {
    pub fn new(
        trtype: TransportType,
        adrfam: AddressFamily,
        traddr: impl Into<String>,
        trsvcid: impl Into<String>,
    ) -> Self {
        Self {
            trtype,
            adrfam,
            traddr: traddr.into(),
            trsvcid: trsvcid.into(),
        }
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}:{}",
            self.trtype,
            self.adrfam.as_str(),
            self.traddr,
            self.trsvcid
        )
    }
}

/// Fabric transport backend - the core abstraction each fabric type
/// (RDMA, TCP, FC) implements once.
///
/// The target registry calls these on one control thread only; backends do
/// not need to be thread-safe and must not block in `accept`.
pub trait Transport {
    /// Which transport type this instance serves
    fn transport_type(&self) -> TransportType;

    /// Begin accepting connections on the given address.
    /// Invoked by the external listener-creation path, not by the registry.
    fn start_listen(&mut self, trid: &TransportId) -> TransportResult<()>;

    /// Stop accepting connections on the given address.
    /// Invoked when the listen address is destroyed.
    fn stop_listen(&mut self, trid: &TransportId) -> TransportResult<()>;

    /// Service pending connection-acceptance work. Called once per poll
    /// pass; the backend surfaces or suppresses its own errors.
    fn accept(&mut self);

    /// Release all backend resources. Called exactly once during target
    /// teardown, before the instance is dropped.
    fn destroy(&mut self);
}
