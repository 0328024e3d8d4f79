//! Peer records: the (id, host, port) triple nodes gossip about.
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use super::rid::RingId;
use crate::error::Error;
use crate::error::Result;

/// A participant of the ring. Peers are value-typed and freely copied
/// across the network; nobody owns one, everybody may cache one.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Position on the ring.
    pub id: RingId,
    /// Reachable host name or address.
    pub host: String,
    /// Transport port.
    pub port: u16,
}

/// Derive the ring position of an endpoint: SHA-1 over `host:port`,
/// truncated to the leading 64 bits. Deterministic, so every node in the
/// cluster maps the same endpoint to the same position.
pub fn derive_id(host: &str, port: u16) -> RingId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{host}:{port}").as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    RingId::new(u64::from_be_bytes(head))
}

impl Peer {
    /// A peer with its id derived from the endpoint.
    pub fn new<H>(host: H, port: u16) -> Self
    where H: Into<String> {
        let host = host.into();
        let id = derive_id(&host, port);
        Self { id, host, port }
    }

    /// A peer with an explicitly assigned id.
    pub fn with_id<H>(id: RingId, host: H, port: u16) -> Self
    where H: Into<String> {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    /// `host:port` form used by transports.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Peer {
    type Err = Error;

    /// Parse a `host:port` seed address.
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::BadPeerAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(Error::BadPeerAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::BadPeerAddress(s.to_string()))?;
        Ok(Peer::new(host, port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_derivation_is_deterministic() {
        let a = Peer::new("10.0.0.1", 7700);
        let b = Peer::new("10.0.0.1", 7700);
        assert_eq!(a, b);
        assert_eq!(a.id, derive_id("10.0.0.1", 7700));

        let c = Peer::new("10.0.0.1", 7701);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_parse_seed_address() {
        let peer: Peer = "node-3.internal:9000".parse().unwrap();
        assert_eq!(peer.host, "node-3.internal");
        assert_eq!(peer.port, 9000);
        assert_eq!(peer.id, derive_id("node-3.internal", 9000));

        assert!("node-3.internal".parse::<Peer>().is_err());
        assert!(":9000".parse::<Peer>().is_err());
        assert!("host:notaport".parse::<Peer>().is_err());
    }
}
