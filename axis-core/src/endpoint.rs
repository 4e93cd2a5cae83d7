//! Endpoint descriptors: port numbers, `port`, `host:port` and `udp://host:port`.
//! Address literals parse to a concrete (ip, port) pair; host names are left for the
//! host to look up. Peers are identified by the (ip, port) pair.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Host used when a descriptor names only a port.
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const SCHEME: &str = "udp://";

/// Resolved network destination. Equality is exact (host, port) equality.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Endpoint {
    host: IpAddr,
    port: u16,
}

/// A remote endpoint that is part of this node's mesh.
pub type Peer = Endpoint;

impl Endpoint {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host: host.to_canonical(),
            port,
        }
    }

    /// `port` on the loopback host.
    pub fn loopback(port: u16) -> Self {
        Self::new(LOOPBACK, port)
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.socket_addr()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Address literals only; host names need a lookup and are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_str(s)? {
            Descriptor::Addr(ep) => Ok(ep),
            Descriptor::Host { host, .. } => Err(EndpointError::HostName(host)),
        }
    }
}

/// A parsed descriptor: either a concrete address or a host name still to be looked up.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Descriptor {
    Addr(Endpoint),
    Host { host: String, port: u16 },
}

impl Descriptor {
    /// The endpoint, when no lookup is needed.
    pub fn addr(&self) -> Option<Endpoint> {
        match self {
            Descriptor::Addr(ep) => Some(*ep),
            Descriptor::Host { .. } => None,
        }
    }
}

impl From<Endpoint> for Descriptor {
    fn from(ep: Endpoint) -> Self {
        Descriptor::Addr(ep)
    }
}

/// Anything that can name an endpoint: a port number, a descriptor string, or an
/// already resolved address.
pub trait ToDescriptor {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError>;
}

impl ToDescriptor for u16 {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        Ok(Endpoint::loopback(*self).into())
    }
}

impl ToDescriptor for str {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        parse_str(self)
    }
}

impl ToDescriptor for String {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        parse_str(self)
    }
}

impl ToDescriptor for Endpoint {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        Ok((*self).into())
    }
}

impl ToDescriptor for SocketAddr {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        Ok(Endpoint::from(*self).into())
    }
}

impl ToDescriptor for Descriptor {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        Ok(self.clone())
    }
}

impl<T: ToDescriptor + ?Sized> ToDescriptor for &T {
    fn to_descriptor(&self) -> Result<Descriptor, EndpointError> {
        (**self).to_descriptor()
    }
}

/// Parse a descriptor without touching the network.
pub fn parse<D: ToDescriptor + ?Sized>(descriptor: &D) -> Result<Descriptor, EndpointError> {
    descriptor.to_descriptor()
}

/// Descriptor could not be turned into an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("empty endpoint descriptor")]
    Empty,
    #[error("missing port in {0:?}")]
    MissingPort(String),
    #[error("invalid port {port:?} in {descriptor:?}")]
    InvalidPort { descriptor: String, port: String },
    #[error("{0:?} is a host name, not an address")]
    HostName(String),
    #[error("cannot resolve host {0:?}")]
    Unresolvable(String),
}

fn parse_str(descriptor: &str) -> Result<Descriptor, EndpointError> {
    let trimmed = descriptor.trim();
    let rest = trimmed.strip_prefix(SCHEME).unwrap_or(trimmed);
    if rest.is_empty() {
        return Err(EndpointError::Empty);
    }
    if rest.bytes().all(|b| b.is_ascii_digit()) {
        return parse_port(descriptor, rest).map(|p| Endpoint::loopback(p).into());
    }
    // IP literals, including bracketed IPv6.
    if let Ok(addr) = SocketAddr::from_str(rest) {
        return Ok(Endpoint::from(addr).into());
    }
    let Some((host, port)) = rest.rsplit_once(':') else {
        return Err(EndpointError::MissingPort(descriptor.to_string()));
    };
    let port = parse_port(descriptor, port)?;
    Ok(classify_host(host, port))
}

fn parse_port(descriptor: &str, port: &str) -> Result<u16, EndpointError> {
    let invalid = || EndpointError::InvalidPort {
        descriptor: descriptor.to_string(),
        port: port.to_string(),
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    port.parse::<u16>().map_err(|_| invalid())
}

fn classify_host(host: &str, port: u16) -> Descriptor {
    if host.is_empty() || host.eq_ignore_ascii_case("localhost") {
        return Endpoint::loopback(port).into();
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => Endpoint::new(ip, port).into(),
        Err(_) => Descriptor::Host {
            host: host.to_string(),
            port,
        },
    }
}
