//! A managed client session with the local I2P router
//!
//! One session presents one local identity to the router. It validates
//! outbound envelopes, serializes them, and hands them to the router for a
//! single destination lookup + raw send. Failures never escape as errors:
//! they are logged, written onto the envelope as coded annotations, and
//! reported as `false`.

use super::SendError;
use crate::config::ServiceConfig;
use crate::message::{encode_envelope, exceeds_soft_limit, Envelope, PACKET_SIZE_SOFT_LIMIT};
use crate::network::{NetworkPeer, NetworkState};
use crate::router::{OverlayRouter, SessionOptions};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Alias presented when the local peer has no username
pub const DEFAULT_ALIAS: &str = "anon";

pub const I2CP_DOMAIN_SOCKET: &str = "i2cp.domainSocket";

/// I2CP options a session passes through to the router.
/// Anything not listed here keeps the router's default.
pub const I2CP_PARAMETERS: [&str; 9] = [
    I2CP_DOMAIN_SOCKET,
    "inbound.length",
    "inbound.lengthVariance",
    "inbound.quantity",
    "inbound.backupQuantity",
    "outbound.length",
    "outbound.lengthVariance",
    "outbound.quantity",
    "outbound.backupQuantity",
];

pub struct I2pSession {
    router: Arc<dyn OverlayRouter>,
    network: Arc<RwLock<NetworkState>>,
    /// Network this session carries, compared against destinations
    network_name: String,
    /// Registry key this session was created for
    address: String,
    alias: String,
    options: SessionOptions,
    connect_timeout: Duration,
    connected: AtomicBool,
}

impl I2pSession {
    pub fn new(
        router: Arc<dyn OverlayRouter>,
        network: Arc<RwLock<NetworkState>>,
        network_name: &str,
        address: &str,
    ) -> Self {
        Self {
            router,
            network,
            network_name: network_name.to_string(),
            address: address.to_string(),
            alias: DEFAULT_ALIAS.to_string(),
            options: SessionOptions::new(),
            connect_timeout: Duration::from_secs(ServiceConfig::default().connect_timeout_secs),
            connected: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Pick up the I2CP tuning options and connect timeout from `config`.
    pub fn init(&mut self, config: &ServiceConfig) -> bool {
        info!("Initializing I2P Session....");
        self.options = I2CP_PARAMETERS
            .iter()
            .filter_map(|key| {
                config
                    .param(key)
                    .map(|value| (key.to_string(), value.to_string()))
            })
            .collect();
        self.connect_timeout = config.connect_timeout();
        debug!("I2CP options: {:?}", self.options);
        info!("I2P Session initialized.");
        true
    }

    /// Resolve and bind the local identity.
    ///
    /// Only one local I2P identity is supported, so `_address_hint` is ignored.
    pub async fn open(&mut self, _address_hint: Option<&str>) -> bool {
        info!("Opening connection...");
        let local_peer = self.network.read().local_peer.clone();

        self.alias = local_peer
            .as_ref()
            .and_then(NetworkPeer::username)
            .unwrap_or(DEFAULT_ALIAS)
            .to_string();

        let local_peer = match local_peer {
            Some(peer) if peer.is_addressable() => peer,
            _ => match self.router.local_destination(&self.alias).await {
                Ok(peer) => peer,
                Err(e) => {
                    warn!("Unable to load local destination for {}: {}", self.alias, e);
                    return false;
                }
            },
        };

        info!(
            "Local I2P Peer Address: {}",
            local_peer.address().unwrap_or_default()
        );
        info!(
            "Local I2P Peer Fingerprint (hash): {}",
            local_peer.fingerprint().unwrap_or_default()
        );
        self.network.write().local_peer = Some(local_peer);
        true
    }

    /// Connect to the I2P network. A connected session is left as is.
    pub async fn connect(&self) -> bool {
        if self.is_connected() {
            debug!("I2P Session already connected.");
            return true;
        }

        info!("I2P Session connecting...");
        let start = Instant::now();
        let attempt = tokio::time::timeout(
            self.connect_timeout,
            self.router.connect(&self.alias, &self.options),
        )
        .await;

        match attempt {
            Ok(Ok(())) => {
                self.connected.store(true, Ordering::SeqCst);
                info!(
                    "I2P Session connected. Took {} seconds.",
                    start.elapsed().as_secs()
                );
                true
            }
            Ok(Err(e)) => {
                warn!("{}", e);
                false
            }
            Err(_) => {
                warn!(
                    "I2P Session connect timed out after {} seconds.",
                    self.connect_timeout.as_secs()
                );
                false
            }
        }
    }

    pub fn disconnect(&self) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        true
    }

    pub fn close(&self) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        true
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send an envelope to its external destination.
    ///
    /// On failure the envelope carries a `Code:<n>, <reason>` annotation.
    pub async fn send(&self, envelope: &mut Envelope) -> bool {
        match self.try_send(envelope).await {
            Ok(()) => true,
            Err(e) => {
                envelope.message.add_error_message(e.annotation());
                false
            }
        }
    }

    async fn try_send(&self, envelope: &Envelope) -> Result<(), SendError> {
        let destination = self.validate(envelope)?;
        let address = destination.address().unwrap_or_default().to_string();

        info!(
            "Sending Envelope id: {}... to: {}...",
            envelope.short_id(),
            destination.short_fingerprint()
        );

        let content = encode_envelope(envelope).map_err(|e| {
            warn!("Unable to serialize envelope {}: {}", envelope.short_id(), e);
            SendError::Serialization(e.to_string())
        })?;
        debug!("Content to send: \n\t{}", String::from_utf8_lossy(&content));
        if exceeds_soft_limit(&content) {
            warn!(
                "Content longer than {} bytes ({} bytes). May have issues.",
                PACKET_SIZE_SOFT_LIMIT,
                content.len()
            );
        }

        if !self.is_connected() && !self.connect().await {
            warn!("I2P Session not connected; unable to send {}.", envelope.short_id());
            return Err(SendError::NotConnected);
        }

        let resolved = self.router.lookup_destination(&address).await.map_err(|e| {
            warn!("Destination lookup failed: {}", e);
            SendError::DestinationLookup(e.to_string())
        })?;

        self.router
            .send_raw(&resolved.hash, content)
            .await
            .map_err(|e| {
                warn!("I2P router rejected envelope {}: {}", envelope.short_id(), e);
                SendError::Transport(e.to_string())
            })
    }

    /// Egress checks, in order: external route, destination present and
    /// addressable, destination on our network.
    fn validate<'a>(&self, envelope: &'a Envelope) -> Result<&'a NetworkPeer, SendError> {
        let er = match envelope.route.as_external() {
            Some(er) => er,
            None => {
                warn!("Not an external route.");
                return Err(SendError::RouteNotExternal);
            }
        };

        let destination = match er.destination.as_ref() {
            Some(peer) if peer.is_addressable() => peer,
            _ => {
                warn!("No Destination Peer for I2P found while sending to I2P.");
                return Err(SendError::DestinationPeerRequired);
            }
        };

        if destination.network != self.network_name {
            warn!("Not an envelope for {}.", self.network_name);
            return Err(SendError::WrongNetwork(self.network_name.clone()));
        }

        Ok(destination)
    }
}
