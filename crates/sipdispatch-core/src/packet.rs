//! Packet payload and address-normalization types
//!
//! The protocol boundary has two host-string conventions that must never mix:
//! the callback-facing representation brackets IPv6 literals (`"[::1]"`),
//! the socket-facing representation never does (`"::1"`). The conversions
//! happen here, at both boundaries, and only for IPv6-family transports.

use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};

use crate::errors::TransportError;

// ----------------------------------------------------------------------------
// Address Family
// ----------------------------------------------------------------------------

/// Address family of a transport's local socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "inet"),
            AddressFamily::Inet6 => write!(f, "inet6"),
        }
    }
}

impl AddressFamily {
    /// Derive the family from an already-parsed socket address
    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv6() {
            AddressFamily::Inet6
        } else {
            AddressFamily::Inet
        }
    }
}

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// Outbound datagram payload, either raw bytes or text.
///
/// Text payloads are encoded to bytes at the socket boundary, in the
/// outbound-drain loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
}

impl Payload {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Binary(bytes) => bytes,
            Payload::Text(text) => text.into_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Binary(bytes) => bytes.len(),
            Payload::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Binary(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

// ----------------------------------------------------------------------------
// Source Address (callback-facing)
// ----------------------------------------------------------------------------

/// Source of an inbound datagram as handed to the data callback.
///
/// For IPv6-family transports `host` carries the bracketed literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for SourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Convert a socket-level source address into the callback-facing form
pub fn source_addr(addr: SocketAddr, family: AddressFamily) -> SourceAddr {
    let host = match family {
        AddressFamily::Inet6 => format!("[{}]", addr.ip()),
        AddressFamily::Inet => addr.ip().to_string(),
    };
    SourceAddr {
        host,
        port: addr.port(),
    }
}

/// Convert a callback-facing `(host, port)` destination into a socket address,
/// stripping the bracket wrapping for IPv6-family transports.
pub fn destination_addr(
    host: &str,
    port: u16,
    family: AddressFamily,
) -> std::result::Result<SocketAddr, TransportError> {
    let bare = match family {
        AddressFamily::Inet6 => host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(host),
        AddressFamily::Inet => host,
    };
    let ip: IpAddr = bare
        .parse()
        .map_err(|e: AddrParseError| TransportError::InvalidAddress {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;
    Ok(SocketAddr::new(ip, port))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_encoding() {
        assert_eq!(Payload::from("ping").into_bytes(), b"ping".to_vec());
        assert_eq!(
            Payload::from(vec![0x00, 0xff]).into_bytes(),
            vec![0x00, 0xff]
        );
        assert!(Payload::from("").is_empty());
        assert_eq!(Payload::from("abc").len(), 3);
    }

    #[test]
    fn test_source_addr_brackets_ipv6_only() {
        let v6: SocketAddr = "[::1]:5060".parse().unwrap();
        let source = source_addr(v6, AddressFamily::Inet6);
        assert_eq!(source.host, "[::1]");
        assert_eq!(source.port, 5060);

        let v4: SocketAddr = "127.0.0.1:5060".parse().unwrap();
        let source = source_addr(v4, AddressFamily::Inet);
        assert_eq!(source.host, "127.0.0.1");
        assert_eq!(source.to_string(), "127.0.0.1:5060");
    }

    #[test]
    fn test_destination_addr_strips_brackets_ipv6_only() {
        let addr = destination_addr("[::1]", 5060, AddressFamily::Inet6).unwrap();
        assert_eq!(addr, "[::1]:5060".parse().unwrap());

        // unbracketed IPv6 literals are accepted as-is
        let addr = destination_addr("::1", 5060, AddressFamily::Inet6).unwrap();
        assert_eq!(addr, "[::1]:5060".parse().unwrap());

        let addr = destination_addr("127.0.0.1", 5060, AddressFamily::Inet).unwrap();
        assert_eq!(addr, "127.0.0.1:5060".parse().unwrap());
    }

    #[test]
    fn test_destination_addr_rejects_garbage() {
        let err = destination_addr("not-an-ip", 5060, AddressFamily::Inet).unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { port: 5060, .. }));

        // brackets are not stripped on IPv4-family transports
        let err = destination_addr("[::1]", 5060, AddressFamily::Inet).unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
    }

    #[test]
    fn test_round_trip_ipv6() {
        let wire: SocketAddr = "[::1]:5060".parse().unwrap();
        let source = source_addr(wire, AddressFamily::Inet6);
        let back = destination_addr(&source.host, source.port, AddressFamily::Inet6).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn test_family_of() {
        assert_eq!(
            AddressFamily::of(&"127.0.0.1:0".parse().unwrap()),
            AddressFamily::Inet
        );
        assert_eq!(
            AddressFamily::of(&"[::1]:0".parse().unwrap()),
            AddressFamily::Inet6
        );
    }
}
