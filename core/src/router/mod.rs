//! Overlay router collaborator
//!
//! The service never talks to the I2P router directly. Everything it needs
//! (status probes, peer lookups, raw sends, config persistence) goes through
//! the [`OverlayRouter`] trait so that real router adapters and the in-process
//! [`LoopbackRouter`] are interchangeable.
//!
//! Every call is best-effort: callers turn a [`RouterError`] into a logged
//! warning and a sentinel value.

pub mod loopback;

use crate::network::{NetworkPeer, NetworkStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use loopback::LoopbackRouter;

/// Tuning options handed to the router when a session connects
pub type SessionOptions = BTreeMap<String, String>;

/// Errors reported by a router adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Router not available: {0}")]
    Unavailable(String),

    #[error("Destination not found: {0}")]
    DestinationNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Unsupported by router: {0}")]
    Unsupported(String),
}

/// 32-byte hash identifying a destination on the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationHash(pub [u8; 32]);

impl DestinationHash {
    /// SHA-256 of the destination address
    pub fn of_address(address: &str) -> Self {
        let digest = Sha256::digest(address.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DestinationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A resolved destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub address: String,
    pub hash: DestinationHash,
}

/// Reachability as reported by the router's comm system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterStatus {
    Unknown,
    Ipv4DisabledIpv6Unknown,
    Ipv4FirewalledIpv6Unknown,
    Ipv4SnatIpv6Unknown,
    Ipv4UnknownIpv6Firewalled,
    Ok,
    Ipv4DisabledIpv6Ok,
    Ipv4FirewalledIpv6Ok,
    Ipv4SnatIpv6Ok,
    Ipv4UnknownIpv6Ok,
    Ipv4OkIpv6Firewalled,
    Ipv4OkIpv6Unknown,
    Ipv4DisabledIpv6Firewalled,
    RejectUnsolicited,
    Disconnected,
    /// Symmetric NAT
    Different,
    /// UDP port conflict
    Hosed,
}

impl RouterStatus {
    /// Network status this router status implies
    pub fn network_status(&self) -> NetworkStatus {
        match self {
            Self::Unknown
            | Self::Ipv4DisabledIpv6Unknown
            | Self::Ipv4FirewalledIpv6Unknown
            | Self::Ipv4SnatIpv6Unknown
            | Self::Ipv4UnknownIpv6Firewalled => NetworkStatus::Connecting,
            Self::Ok
            | Self::Ipv4DisabledIpv6Ok
            | Self::Ipv4FirewalledIpv6Ok
            | Self::Ipv4SnatIpv6Ok
            | Self::Ipv4UnknownIpv6Ok
            | Self::Ipv4OkIpv6Firewalled
            | Self::Ipv4OkIpv6Unknown
            | Self::Ipv4DisabledIpv6Firewalled
            | Self::RejectUnsolicited => NetworkStatus::Connected,
            Self::Disconnected => NetworkStatus::Disconnected,
            Self::Different => NetworkStatus::Blocked,
            Self::Hosed => NetworkStatus::PortConflict,
        }
    }

    /// Statuses worth a warning rather than an info line
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::Ipv4DisabledIpv6Firewalled | Self::Different | Self::Hosed
        )
    }

    /// Operator-facing explanation
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "Testing I2P Network...",
            Self::Ipv4DisabledIpv6Unknown => "IPV4 Disabled but IPV6 Testing...",
            Self::Ipv4FirewalledIpv6Unknown => "IPV4 Firewalled but IPV6 Testing...",
            Self::Ipv4SnatIpv6Unknown => "IPV4 SNAT but IPV6 Testing...",
            Self::Ipv4UnknownIpv6Firewalled => "IPV6 Firewalled but IPV4 Testing...",
            Self::Ok => {
                "Connected to I2P Network. We are able to receive unsolicited connections."
            }
            Self::Ipv4DisabledIpv6Ok => "IPV4 Disabled but IPV6 OK: Connected to I2P Network.",
            Self::Ipv4FirewalledIpv6Ok => {
                "IPV4 Firewalled but IPV6 OK: Connected to I2P Network."
            }
            Self::Ipv4SnatIpv6Ok => "IPV4 SNAT but IPV6 OK: Connected to I2P Network.",
            Self::Ipv4UnknownIpv6Ok => "IPV4 Testing but IPV6 OK: Connected to I2P Network.",
            Self::Ipv4OkIpv6Firewalled => {
                "IPV6 Firewalled but IPV4 OK: Connected to I2P Network."
            }
            Self::Ipv4OkIpv6Unknown => "IPV6 Testing but IPV4 OK: Connected to I2P Network.",
            Self::Ipv4DisabledIpv6Firewalled => {
                "IPV4 Disabled but IPV6 Firewalled. Connected to I2P network."
            }
            Self::RejectUnsolicited => {
                "Able to talk to peers we initiate communication with, but cannot receive unsolicited connections. Connected to I2P network."
            }
            Self::Disconnected => "Disconnected from I2P Network.",
            Self::Different => {
                "Symmetric NAT: our 'from' address looks different to each peer we talk to."
            }
            Self::Hosed => {
                "Unable to open UDP port for I2P - Port Conflict. Verify another instance of I2P is not running."
            }
        }
    }
}

/// Capabilities the service consumes from the local I2P router.
#[async_trait]
pub trait OverlayRouter: Send + Sync {
    /// Probe the router's current reachability
    async fn check_status(&self) -> Result<RouterStatus, RouterError>;

    /// Whether a peer (or, with `None`, this router) sits in a strict country
    async fn is_in_strict_country(
        &self,
        peer: Option<&DestinationHash>,
    ) -> Result<bool, RouterError>;

    /// Two-letter country code of a peer
    async fn country(&self, peer: &DestinationHash) -> Result<String, RouterError>;

    async fn is_backlogged(&self, peer: &DestinationHash) -> Result<bool, RouterError>;

    async fn is_established(&self, peer: &DestinationHash) -> Result<bool, RouterError>;

    async fn was_unreachable(&self, peer: &DestinationHash) -> Result<bool, RouterError>;

    /// Resolve a destination address
    async fn lookup_destination(&self, address: &str) -> Result<Destination, RouterError>;

    /// Hand a payload to the router for delivery
    async fn send_raw(&self, destination: &DestinationHash, payload: Vec<u8>)
        -> Result<(), RouterError>;

    /// Persist a router config key
    async fn save_config(&self, key: &str, value: &str) -> Result<(), RouterError>;

    /// Local destination the router presents under `alias`
    async fn local_destination(&self, alias: &str) -> Result<NetworkPeer, RouterError>;

    /// Open the client connection for `alias` with the given tuning options
    async fn connect(&self, alias: &str, options: &SessionOptions) -> Result<(), RouterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_hash_is_stable() {
        let a = DestinationHash::of_address("abc");
        let b = DestinationHash::of_address("abc");
        let c = DestinationHash::of_address("abd");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_router_status_mapping() {
        assert_eq!(RouterStatus::Unknown.network_status(), NetworkStatus::Connecting);
        assert_eq!(RouterStatus::Ok.network_status(), NetworkStatus::Connected);
        assert_eq!(
            RouterStatus::RejectUnsolicited.network_status(),
            NetworkStatus::Connected
        );
        assert_eq!(
            RouterStatus::Disconnected.network_status(),
            NetworkStatus::Disconnected
        );
        assert_eq!(RouterStatus::Different.network_status(), NetworkStatus::Blocked);
        assert_eq!(RouterStatus::Hosed.network_status(), NetworkStatus::PortConflict);
    }

    #[test]
    fn test_degraded_statuses() {
        assert!(RouterStatus::Hosed.is_degraded());
        assert!(RouterStatus::Different.is_degraded());
        assert!(!RouterStatus::Ok.is_degraded());
    }
}
