//! Core types used throughout RelayNet

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use relaynet_crypto::signing::{self, PUBLIC_KEY_SIZE};
use relaynet_crypto::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Network address of a node: its secp256k1 public key.
///
/// Serialized as the 33-byte compressed key; displayed as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress(PublicKey);

impl NodeAddress {
    /// Wrap a public key
    pub fn new(key: PublicKey) -> Self {
        Self(key)
    }

    /// Parse from SEC1 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        signing::parse_public_key(bytes)
            .map(Self)
            .map_err(|e| Error::KeyFormat(e.to_string()))
    }

    /// Parse from a hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::KeyFormat(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// The wrapped public key
    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// Compressed key bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.serialize()
    }

    /// Full hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Short prefix suitable for logs
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(8);
        s
    }
}

impl From<PublicKey> for NodeAddress {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress({})", self.short())
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Stable relay identifier: hex SHA3-256 of the relay's compressed key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelayId(String);

impl RelayId {
    /// Derive from a relay address
    pub fn from_address(address: &NodeAddress) -> Self {
        Self(hex::encode(signing::hash(&[&address.to_bytes()])))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A network participant as recorded in the trust store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    /// Derived identifier
    pub id: RelayId,
    /// Public key
    pub address: NodeAddress,
    /// Declared transport type (e.g. "ws", "tcp")
    pub transport: String,
    /// Declared endpoint for that transport
    pub endpoint: String,
    /// Whether this relay is trusted
    pub trusted: bool,
    /// Last time a connection to this relay was used
    pub last_used: Option<DateTime<Utc>>,
}

impl Relay {
    /// Create an untrusted relay record
    pub fn new(
        address: NodeAddress,
        transport: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: RelayId::from_address(&address),
            address,
            transport: transport.into(),
            endpoint: endpoint.into(),
            trusted: false,
            last_used: None,
        }
    }

    /// Mark trusted
    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }
}

/// A destination reachable through a relay
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Destination address
    pub destination: NodeAddress,
    /// Relay through which the destination is reachable
    pub relay: RelayId,
    /// Hop count advertised for this route
    pub hops: u32,
    /// When this route was learned
    pub updated_at: DateTime<Utc>,
}

impl RouteEntry {
    /// Route to `destination` through `relay`
    pub fn new(destination: NodeAddress, relay: RelayId, hops: u32) -> Self {
        Self {
            destination,
            relay,
            hops,
            updated_at: Utc::now(),
        }
    }
}
