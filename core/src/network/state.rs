//! Network state: local peer, connectivity, router params, known peers

use super::peer::NetworkPeer;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Connectivity of this node to the overlay network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkStatus {
    /// Not connected
    Disconnected,
    /// Router is testing reachability
    Connecting,
    /// Connected and able to talk to peers
    Connected,
    /// Behind a symmetric NAT
    Blocked,
    /// Router could not bind its port
    PortConflict,
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Blocked => write!(f, "BLOCKED"),
            Self::PortConflict => write!(f, "PORT_CONFLICT"),
        }
    }
}

/// Shared state about this node's place on the network
#[derive(Debug, Clone)]
pub struct NetworkState {
    /// Our own peer record, once the router has given us a destination
    pub local_peer: Option<NetworkPeer>,
    pub network_status: NetworkStatus,
    /// Router parameters as last applied (e.g. `router.sharePercentage`)
    pub params: HashMap<String, String>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self {
            local_peer: None,
            network_status: NetworkStatus::Disconnected,
            params: HashMap::new(),
        }
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::new()
    }
}

/// Peer book error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerBookError {
    #[error("Peer list is full")]
    PeerListFull,
    #[error("Peer has no address or fingerprint")]
    NotAddressable,
}

/// Known peers on the network, bounded by `max_peers`
pub struct PeerBook {
    /// key (fingerprint) -> peer
    peers: HashMap<String, NetworkPeer>,
    max_peers: usize,
}

impl PeerBook {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
        }
    }

    /// Add or update a peer
    pub fn add_peer(&mut self, peer: NetworkPeer) -> Result<(), PeerBookError> {
        if !peer.is_addressable() {
            return Err(PeerBookError::NotAddressable);
        }
        let key = peer.key().unwrap_or_default().to_string();

        if self.peers.contains_key(&key) {
            self.peers.insert(key, peer);
            Ok(())
        } else {
            if !self.has_capacity() {
                return Err(PeerBookError::PeerListFull);
            }

            self.peers.insert(key, peer);
            Ok(())
        }
    }

    pub fn has_peer(&self, key: &str) -> bool {
        self.peers.contains_key(key)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// Change capacity. Existing peers above the new limit are kept.
    pub fn set_max_peers(&mut self, max_peers: usize) {
        self.max_peers = max_peers;
    }

    pub fn has_capacity(&self) -> bool {
        self.peers.len() < self.max_peers
    }

    /// All known peers
    pub fn all_peers(&self) -> Vec<NetworkPeer> {
        self.peers.values().cloned().collect()
    }

    /// Uniformly random known peer
    pub fn random_peer(&self) -> Option<NetworkPeer> {
        let peers: Vec<&NetworkPeer> = self.peers.values().collect();
        peers.choose(&mut rand::thread_rng()).map(|p| (*p).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NETWORK_I2P;

    fn test_peer(id: &str) -> NetworkPeer {
        NetworkPeer::new(NETWORK_I2P, &format!("addr-{}", id), id)
    }

    #[test]
    fn test_network_state_defaults() {
        let state = NetworkState::new();
        assert!(state.local_peer.is_none());
        assert_eq!(state.network_status, NetworkStatus::Disconnected);
        assert!(state.params.is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(NetworkStatus::Connected.to_string(), "CONNECTED");
        assert_eq!(NetworkStatus::PortConflict.to_string(), "PORT_CONFLICT");
    }

    #[test]
    fn test_add_peer() {
        let mut book = PeerBook::new(10);
        assert!(book.add_peer(test_peer("p1")).is_ok());
        assert_eq!(book.peer_count(), 1);
        assert!(book.has_peer("p1"));
    }

    #[test]
    fn test_add_peer_duplicate_updates() {
        let mut book = PeerBook::new(10);
        book.add_peer(test_peer("p1")).unwrap();
        book.add_peer(test_peer("p1").with_username("bob")).unwrap();

        assert_eq!(book.peer_count(), 1);
        assert_eq!(book.all_peers()[0].username(), Some("bob"));
    }

    #[test]
    fn test_add_peer_capacity() {
        let mut book = PeerBook::new(2);
        book.add_peer(test_peer("p1")).unwrap();
        book.add_peer(test_peer("p2")).unwrap();

        assert!(!book.has_capacity());
        assert_eq!(
            book.add_peer(test_peer("p3")),
            Err(PeerBookError::PeerListFull)
        );
    }

    #[test]
    fn test_reject_unaddressable() {
        let mut book = PeerBook::new(2);
        assert_eq!(
            book.add_peer(NetworkPeer::unaddressed(NETWORK_I2P)),
            Err(PeerBookError::NotAddressable)
        );
    }

    #[test]
    fn test_random_peer() {
        let mut book = PeerBook::new(10);
        assert!(book.random_peer().is_none());

        book.add_peer(test_peer("p1")).unwrap();
        book.add_peer(test_peer("p2")).unwrap();

        let picked = book.random_peer().unwrap();
        assert!(book.has_peer(picked.key().unwrap()));
    }
}
