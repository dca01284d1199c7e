//! Loopback router: an in-process `OverlayRouter`
//!
//! Answers status, country and peer-state queries from tables the caller
//! fills in, and records every raw send and saved config key instead of
//! putting anything on a wire. The CLI runs the service on top of it and the
//! test suites use it to observe what the service hands to the router.

use super::{
    Destination, DestinationHash, OverlayRouter, RouterError, RouterStatus, SessionOptions,
};
use crate::network::{NetworkPeer, NETWORK_I2P};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// A payload handed to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub destination: DestinationHash,
    pub payload: Vec<u8>,
}

pub struct LoopbackRouter {
    status: RwLock<RouterStatus>,
    destinations: RwLock<HashSet<String>>,
    countries: RwLock<HashMap<DestinationHash, String>>,
    strict_peers: RwLock<HashSet<DestinationHash>>,
    local_strict: RwLock<bool>,
    established: RwLock<HashSet<DestinationHash>>,
    backlogged: RwLock<HashSet<DestinationHash>>,
    unreachable: RwLock<HashSet<DestinationHash>>,
    /// When set, `connect` fails with this reason
    connect_failure: RwLock<Option<String>>,
    /// Artificial latency for `connect`
    connect_delay: RwLock<Option<Duration>>,
    /// When set, `save_config` reports the key as unsupported
    config_read_only: RwLock<bool>,
    /// When set, `send_raw` fails
    send_failure: RwLock<Option<String>>,
    connects: AtomicUsize,
    sent: Mutex<Vec<SentPacket>>,
    saved_config: Mutex<BTreeMap<String, String>>,
}

impl LoopbackRouter {
    /// A router that reports `Ok` and knows no destinations yet
    pub fn new() -> Self {
        Self {
            status: RwLock::new(RouterStatus::Ok),
            destinations: RwLock::new(HashSet::new()),
            countries: RwLock::new(HashMap::new()),
            strict_peers: RwLock::new(HashSet::new()),
            local_strict: RwLock::new(false),
            established: RwLock::new(HashSet::new()),
            backlogged: RwLock::new(HashSet::new()),
            unreachable: RwLock::new(HashSet::new()),
            connect_failure: RwLock::new(None),
            connect_delay: RwLock::new(None),
            config_read_only: RwLock::new(false),
            send_failure: RwLock::new(None),
            connects: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            saved_config: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn set_status(&self, status: RouterStatus) {
        *self.status.write() = status;
    }

    /// Make an address resolvable
    pub fn add_destination(&self, address: &str) -> DestinationHash {
        self.destinations.write().insert(address.to_string());
        DestinationHash::of_address(address)
    }

    /// Make a peer's address resolvable; returns its hash if it has one
    pub fn add_peer(&self, peer: &NetworkPeer) -> Option<DestinationHash> {
        peer.address().map(|a| self.add_destination(a))
    }

    pub fn set_country(&self, address: &str, country: &str) {
        self.countries
            .write()
            .insert(DestinationHash::of_address(address), country.to_string());
    }

    pub fn set_strict(&self, address: &str) {
        self.strict_peers
            .write()
            .insert(DestinationHash::of_address(address));
    }

    pub fn set_local_strict(&self, strict: bool) {
        *self.local_strict.write() = strict;
    }

    pub fn set_established(&self, address: &str) {
        self.established
            .write()
            .insert(DestinationHash::of_address(address));
    }

    pub fn set_backlogged(&self, address: &str) {
        self.backlogged
            .write()
            .insert(DestinationHash::of_address(address));
    }

    pub fn set_unreachable(&self, address: &str) {
        self.unreachable
            .write()
            .insert(DestinationHash::of_address(address));
    }

    pub fn fail_connect(&self, reason: Option<&str>) {
        *self.connect_failure.write() = reason.map(str::to_string);
    }

    pub fn delay_connect(&self, delay: Option<Duration>) {
        *self.connect_delay.write() = delay;
    }

    pub fn fail_send(&self, reason: Option<&str>) {
        *self.send_failure.write() = reason.map(str::to_string);
    }

    pub fn set_config_read_only(&self, read_only: bool) {
        *self.config_read_only.write() = read_only;
    }

    /// Number of successful `connect` calls
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Packets handed to `send_raw`, oldest first
    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.sent.lock().clone()
    }

    /// Config keys persisted through `save_config`
    pub fn saved_config(&self) -> BTreeMap<String, String> {
        self.saved_config.lock().clone()
    }
}

impl Default for LoopbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OverlayRouter for LoopbackRouter {
    async fn check_status(&self) -> Result<RouterStatus, RouterError> {
        Ok(*self.status.read())
    }

    async fn is_in_strict_country(
        &self,
        peer: Option<&DestinationHash>,
    ) -> Result<bool, RouterError> {
        Ok(match peer {
            Some(hash) => self.strict_peers.read().contains(hash),
            None => *self.local_strict.read(),
        })
    }

    async fn country(&self, peer: &DestinationHash) -> Result<String, RouterError> {
        self.countries
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| RouterError::Unsupported(format!("no GeoIP entry for {}", peer)))
    }

    async fn is_backlogged(&self, peer: &DestinationHash) -> Result<bool, RouterError> {
        Ok(self.backlogged.read().contains(peer))
    }

    async fn is_established(&self, peer: &DestinationHash) -> Result<bool, RouterError> {
        Ok(self.established.read().contains(peer))
    }

    async fn was_unreachable(&self, peer: &DestinationHash) -> Result<bool, RouterError> {
        Ok(self.unreachable.read().contains(peer))
    }

    async fn lookup_destination(&self, address: &str) -> Result<Destination, RouterError> {
        if self.destinations.read().contains(address) {
            Ok(Destination {
                address: address.to_string(),
                hash: DestinationHash::of_address(address),
            })
        } else {
            Err(RouterError::DestinationNotFound(
                address.get(..7).unwrap_or(address).to_string(),
            ))
        }
    }

    async fn send_raw(
        &self,
        destination: &DestinationHash,
        payload: Vec<u8>,
    ) -> Result<(), RouterError> {
        let failure = self.send_failure.read().clone();
        if let Some(reason) = failure {
            return Err(RouterError::SendFailed(reason));
        }
        debug!("Loopback send of {} bytes to {}", payload.len(), destination);
        self.sent.lock().push(SentPacket {
            destination: *destination,
            payload,
        });
        Ok(())
    }

    async fn save_config(&self, key: &str, value: &str) -> Result<(), RouterError> {
        if *self.config_read_only.read() {
            return Err(RouterError::Unsupported(key.to_string()));
        }
        self.saved_config
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn local_destination(&self, alias: &str) -> Result<NetworkPeer, RouterError> {
        let address = format!("loopback-{}", alias);
        let hash = self.add_destination(&address);
        Ok(NetworkPeer::new(NETWORK_I2P, &address, &hash.to_hex()).with_username(alias))
    }

    async fn connect(&self, alias: &str, options: &SessionOptions) -> Result<(), RouterError> {
        let delay = *self.connect_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.connect_failure.read().clone();
        if let Some(reason) = failure {
            return Err(RouterError::ConnectionFailed(reason));
        }
        debug!("Loopback connect for {} with {} option(s)", alias, options.len());
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
