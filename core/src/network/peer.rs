//! Network peer identity: DIDs, public keys, and addressability

use serde::{Deserialize, Serialize};

/// Network name this service carries traffic for
pub const NETWORK_I2P: &str = "I2P";

/// Public key of a peer as the overlay knows it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Full destination address (base64 for I2P)
    pub address: Option<String>,
    /// Hash of the destination, used as the short identifier
    pub fingerprint: Option<String>,
}

/// Decentralized identifier of a participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Did {
    pub username: Option<String>,
    pub public_key: PublicKey,
}

/// A remote (or local) participant on some network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPeer {
    /// Network the peer lives on, e.g. `I2P`
    pub network: String,
    pub did: Did,
}

impl NetworkPeer {
    /// Create a peer from its address and fingerprint
    pub fn new(network: &str, address: &str, fingerprint: &str) -> Self {
        Self {
            network: network.to_string(),
            did: Did {
                username: None,
                public_key: PublicKey {
                    address: Some(address.to_string()),
                    fingerprint: Some(fingerprint.to_string()),
                },
            },
        }
    }

    /// Create a peer that has no key material yet
    pub fn unaddressed(network: &str) -> Self {
        Self {
            network: network.to_string(),
            did: Did::default(),
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.did.username = Some(username.to_string());
        self
    }

    /// Destination address, if present and non-empty
    pub fn address(&self) -> Option<&str> {
        self.did
            .public_key
            .address
            .as_deref()
            .filter(|a| !a.is_empty())
    }

    /// Fingerprint, if present and non-empty
    pub fn fingerprint(&self) -> Option<&str> {
        self.did
            .public_key
            .fingerprint
            .as_deref()
            .filter(|f| !f.is_empty())
    }

    pub fn username(&self) -> Option<&str> {
        self.did.username.as_deref()
    }

    /// A peer is usable as a destination only with both address and fingerprint
    pub fn is_addressable(&self) -> bool {
        self.address().is_some() && self.fingerprint().is_some()
    }

    /// Key used to deduplicate peers: fingerprint, else address
    pub fn key(&self) -> Option<&str> {
        self.fingerprint().or_else(|| self.address())
    }

    /// First seven characters of the fingerprint, for log lines
    pub fn short_fingerprint(&self) -> &str {
        match self.fingerprint() {
            Some(fp) => fp.get(..7).unwrap_or(fp),
            None => "<none>",
        }
    }
}
