//! Self-describing network addresses.
//!
//! The core only needs to recognise two shapes: `/ip4/<addr>/udp/<port>/quic-v1`
//! and `/ip6/<addr>/udp/<port>/quic-v1`. Anything else parses (so callers can
//! still print and compare it) but [`Multiaddr::can_dial`] returns `false`
//! for it, matching the transport contract in spec §4.1.

use crate::error::{MultiaddrError, TypesResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// One (protocol-code, value) element of a multiaddr.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    Udp(u16),
    QuicV1,
    /// Any other protocol/value pair we don't interpret, preserved verbatim
    /// so the address still round-trips through text and equality.
    Other(String, Option<String>),
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ip4(addr) => write!(f, "/ip4/{}", addr),
            Protocol::Ip6(addr) => write!(f, "/ip6/{}", addr),
            Protocol::Udp(port) => write!(f, "/udp/{}", port),
            Protocol::QuicV1 => write!(f, "/quic-v1"),
            Protocol::Other(name, Some(value)) => write!(f, "/{}/{}", name, value),
            Protocol::Other(name, None) => write!(f, "/{}", name),
        }
    }
}

/// An ordered sequence of protocol/value pairs, e.g.
/// `/ip4/127.0.0.1/udp/4001/quic-v1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Multiaddr(Vec<Protocol>);

impl Multiaddr {
    pub fn protocols(&self) -> &[Protocol] {
        &self.0
    }

    /// Construct the canonical `/ip{4,6}/<addr>/udp/<port>/quic-v1` form from
    /// a socket address, the shape every listener and connection hands back.
    pub fn from_socket_addr_quic(addr: SocketAddr) -> Self {
        let ip_proto = match addr.ip() {
            IpAddr::V4(v4) => Protocol::Ip4(v4),
            IpAddr::V6(v6) => Protocol::Ip6(v6),
        };
        Multiaddr(vec![ip_proto, Protocol::Udp(addr.port()), Protocol::QuicV1])
    }

    /// Extract a dialable `SocketAddr` if this address is a QUIC multiaddr.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let mut ip = None;
        let mut port = None;
        for proto in &self.0 {
            match proto {
                Protocol::Ip4(v4) => ip = Some(IpAddr::V4(*v4)),
                Protocol::Ip6(v6) => ip = Some(IpAddr::V6(*v6)),
                Protocol::Udp(p) => port = Some(*p),
                _ => {}
            }
        }
        match (ip, port) {
            (Some(ip), Some(port)) => Some(SocketAddr::new(ip, port)),
            _ => None,
        }
    }

    /// True iff the last protocol element is `quic-v1` — the only shape this
    /// core's transport is able to dial.
    pub fn can_dial(&self) -> bool {
        matches!(self.0.last(), Some(Protocol::QuicV1))
    }

    pub fn is_ip4(&self) -> bool {
        matches!(self.0.first(), Some(Protocol::Ip4(_)))
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for proto in &self.0 {
            write!(f, "{}", proto)?;
        }
        Ok(())
    }
}

impl FromStr for Multiaddr {
    type Err = MultiaddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl Multiaddr {
    pub fn parse(s: &str) -> TypesResult<Self> {
        parse(s)
    }
}

fn parse(s: &str) -> TypesResult<Multiaddr> {
    if !s.starts_with('/') {
        return Err(MultiaddrError::InvalidAddress(s.to_string()));
    }
    let parts: Vec<&str> = s.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Err(MultiaddrError::InvalidAddress(s.to_string()));
    }

    let mut protocols = Vec::new();
    let mut i = 0;
    while i < parts.len() {
        match parts[i] {
            "ip4" => {
                let addr = parts
                    .get(i + 1)
                    .ok_or_else(|| MultiaddrError::InvalidAddress(s.to_string()))?;
                let parsed: Ipv4Addr = addr
                    .parse()
                    .map_err(|_| MultiaddrError::InvalidAddress(s.to_string()))?;
                protocols.push(Protocol::Ip4(parsed));
                i += 2;
            }
            "ip6" => {
                let addr = parts
                    .get(i + 1)
                    .ok_or_else(|| MultiaddrError::InvalidAddress(s.to_string()))?;
                let parsed: Ipv6Addr = addr
                    .parse()
                    .map_err(|_| MultiaddrError::InvalidAddress(s.to_string()))?;
                protocols.push(Protocol::Ip6(parsed));
                i += 2;
            }
            "udp" => {
                let port = parts
                    .get(i + 1)
                    .ok_or_else(|| MultiaddrError::InvalidAddress(s.to_string()))?;
                let parsed: u16 = port
                    .parse()
                    .map_err(|_| MultiaddrError::InvalidAddress(s.to_string()))?;
                protocols.push(Protocol::Udp(parsed));
                i += 2;
            }
            "quic-v1" => {
                protocols.push(Protocol::QuicV1);
                i += 1;
            }
            other => {
                // Unknown protocol: consume a trailing value only if one is
                // present and doesn't itself look like a protocol name.
                if let Some(next) = parts.get(i + 1) {
                    protocols.push(Protocol::Other(other.to_string(), Some(next.to_string())));
                    i += 2;
                } else {
                    protocols.push(Protocol::Other(other.to_string(), None));
                    i += 1;
                }
            }
        }
    }

    if protocols.is_empty() {
        return Err(MultiaddrError::InvalidAddress(s.to_string()));
    }

    Ok(Multiaddr(protocols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip4_quic() {
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        assert!(addr.can_dial());
        assert_eq!(
            addr.to_socket_addr().unwrap(),
            "127.0.0.1:4001".parse().unwrap()
        );
    }

    #[test]
    fn parses_ip6_quic() {
        let addr: Multiaddr = "/ip6/::1/udp/4001/quic-v1".parse().unwrap();
        assert!(addr.can_dial());
        assert!(addr.to_socket_addr().is_some());
    }

    #[test]
    fn unknown_suffix_parses_but_cannot_dial() {
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/webrtc".parse().unwrap();
        assert!(!addr.can_dial());
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(Multiaddr::parse("not-a-multiaddr").is_err());
        assert!(Multiaddr::parse("/ip4/not-an-ip/udp/4001/quic-v1").is_err());
    }

    #[test]
    fn round_trips_through_display() {
        let addr: Multiaddr = "/ip4/10.0.0.5/udp/9000/quic-v1".parse().unwrap();
        let text = addr.to_string();
        let reparsed: Multiaddr = text.parse().unwrap();
        assert_eq!(addr, reparsed);
    }

    #[test]
    fn from_socket_addr_is_dialable() {
        let addr = Multiaddr::from_socket_addr_quic("192.168.1.1:4001".parse().unwrap());
        assert!(addr.can_dial());
        assert!(addr.is_ip4());
    }
}
