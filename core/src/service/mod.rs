//! I2P network service
//!
//! [`I2pService`] ties the pieces together: it owns the session registry, the
//! known-peer book, the in-flight request table and the shared network state,
//! dispatches inbound envelopes to handlers, and runs the periodic discovery
//! and router-status tasks while it is up.
//!
//! Lifecycle lives in `lifecycle.rs`, the operation table in `dispatcher.rs`,
//! and router-backed queries and updates in `router_state.rs`.

pub mod dispatcher;
pub mod lifecycle;
pub mod router_state;
pub mod status;

use crate::bus::MessageBus;
use crate::config::ServiceConfig;
use crate::message::Envelope;
use crate::network::{
    NetworkPeer, NetworkState, NetworkStatus, PeerBook, PeerBookError, NETWORK_I2P,
};
use crate::router::{OverlayRouter, RouterStatus};
use crate::session::{I2pSession, SessionRegistry};
use crate::tasks::TaskRunnerHandle;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub use dispatcher::{Operation, UnknownOperation};
pub use status::{ServiceStatus, StatusObserver};

/// Name this service routes under
pub const SERVICE_NAME: &str = "I2PService";

/// Marker put on discovery requests
pub const NET_OP_REQ: &str = "NetOpReq";

/// Where the local peer record is announced once the router hands it out
pub const PEER_MANAGER_SERVICE: &str = "ra.peermanager.PeerManagerService";
pub const OPERATION_UPDATE_PEER: &str = "UPDATE_PEER";

pub struct I2pService {
    router: Arc<dyn OverlayRouter>,
    bus: Arc<dyn MessageBus>,
    observer: Option<Arc<dyn StatusObserver>>,
    config_file: Option<PathBuf>,
    status: RwLock<ServiceStatus>,
    config: RwLock<ServiceConfig>,
    network: Arc<RwLock<NetworkState>>,
    peers: RwLock<PeerBook>,
    sessions: SessionRegistry,
    /// Discovery request id -> unix millis when sent
    inflight_timers: Mutex<HashMap<String, u64>>,
    /// Last status the router reported
    router_status: Mutex<Option<RouterStatus>>,
    restart_attempts: AtomicU32,
    local_peer_announced: AtomicBool,
    runner: tokio::sync::Mutex<Option<TaskRunnerHandle>>,
}

impl I2pService {
    pub fn new(router: Arc<dyn OverlayRouter>, bus: Arc<dyn MessageBus>) -> Self {
        let config = ServiceConfig::default();
        let network = Arc::new(RwLock::new(NetworkState::new()));

        Self {
            sessions: SessionRegistry::new(router.clone(), network.clone(), NETWORK_I2P),
            router,
            bus,
            observer: None,
            config_file: None,
            status: RwLock::new(ServiceStatus::NotInitialized),
            peers: RwLock::new(PeerBook::new(config.max_peers)),
            config: RwLock::new(config),
            network,
            inflight_timers: Mutex::new(HashMap::new()),
            router_status: Mutex::new(None),
            restart_attempts: AtomicU32::new(0),
            local_peer_announced: AtomicBool::new(false),
            runner: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Config file merged under the explicit properties at start
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn network_name(&self) -> &'static str {
        NETWORK_I2P
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    pub(crate) fn update_status(&self, status: ServiceStatus) {
        *self.status.write() = status;
        debug!("Service status: {}", status);
        if let Some(observer) = &self.observer {
            observer.status_changed(status);
        }
    }

    /// Effective configuration (defaults until `start`)
    pub fn config(&self) -> ServiceConfig {
        self.config.read().clone()
    }

    // ------------------------------------------------------------------
    // Network state
    // ------------------------------------------------------------------

    pub fn network_status(&self) -> NetworkStatus {
        self.network.read().network_status
    }

    pub fn update_network_status(&self, status: NetworkStatus) {
        let mut network = self.network.write();
        if network.network_status != status {
            info!("Network status {} -> {}", network.network_status, status);
            network.network_status = status;
        }
    }

    pub fn local_peer(&self) -> Option<NetworkPeer> {
        self.network.read().local_peer.clone()
    }

    pub fn set_local_peer(&self, peer: NetworkPeer) {
        self.network.write().local_peer = Some(peer);
    }

    /// Current value of a router parameter
    pub fn network_param(&self, key: &str) -> Option<String> {
        self.network.read().params.get(key).cloned()
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Known peers
    // ------------------------------------------------------------------

    pub fn add_peer(&self, peer: NetworkPeer) -> Result<(), PeerBookError> {
        self.peers.write().add_peer(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().peer_count()
    }

    pub fn max_peers(&self) -> usize {
        self.peers.read().max_peers()
    }

    /// Change peer capacity; peers already known above it are kept
    pub fn set_max_peers(&self, max_peers: usize) {
        self.peers.write().set_max_peers(max_peers);
    }

    /// Whether the peer book is below capacity
    pub fn has_peer_capacity(&self) -> bool {
        self.peers.read().has_capacity()
    }

    pub fn peers(&self) -> Vec<NetworkPeer> {
        self.peers.read().all_peers()
    }

    pub fn random_peer(&self) -> Option<NetworkPeer> {
        self.peers.read().random_peer()
    }

    // ------------------------------------------------------------------
    // In-flight discovery requests
    // ------------------------------------------------------------------

    /// Remember a request as awaiting a response
    pub fn track_inflight(&self, request_id: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.inflight_timers
            .lock()
            .insert(request_id.to_string(), now);
    }

    /// Treat every outstanding request as timed out: clear the table and
    /// return how many entries it held. Check and clear happen under one lock.
    pub fn expire_inflight(&self) -> usize {
        let mut timers = self.inflight_timers.lock();
        let expired = timers.len();
        timers.clear();
        expired
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight_timers.lock().len()
    }

    pub fn is_inflight(&self, request_id: &str) -> bool {
        self.inflight_timers.lock().contains_key(request_id)
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Send an envelope out over I2P through the default session.
    ///
    /// The envelope's external route must name an I2P destination; failures
    /// are annotated on the envelope.
    pub async fn send_out(&self, envelope: &mut Envelope) -> bool {
        debug!("Send out Envelope over I2P...");
        let session = self.establish_default_session().await;
        session.send(envelope).await
    }

    pub(crate) async fn establish_default_session(&self) -> Arc<I2pSession> {
        let config = self.config();
        let session = self.sessions.establish_session(None, true, &config).await;
        self.announce_local_peer();
        session
    }

    /// Publish the local peer record on the bus the first time it is known
    fn announce_local_peer(&self) {
        let Some(peer) = self.local_peer() else {
            return;
        };
        if self.local_peer_announced.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut envelope = Envelope::for_operation(PEER_MANAGER_SERVICE, OPERATION_UPDATE_PEER);
        if let Err(e) = envelope.add_content(&peer) {
            warn!("Unable to attach local peer to announcement: {}", e);
            return;
        }
        if !self.bus.send(envelope) {
            warn!("Message bus refused local peer announcement.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LoggingBus, MockMessageBus};
    use crate::router::LoopbackRouter;

    fn service() -> I2pService {
        I2pService::new(Arc::new(LoopbackRouter::new()), Arc::new(LoggingBus))
    }

    fn peer(id: &str) -> NetworkPeer {
        NetworkPeer::new(NETWORK_I2P, &format!("addr-{}", id), id)
    }

    #[test]
    fn test_new_service_defaults() {
        let s = service();
        assert_eq!(s.status(), ServiceStatus::NotInitialized);
        assert_eq!(s.network_status(), NetworkStatus::Disconnected);
        assert_eq!(s.max_peers(), 50);
        assert!(s.local_peer().is_none());
        assert_eq!(s.network_name(), "I2P");
    }

    #[test]
    fn test_inflight_tracking() {
        let s = service();
        s.track_inflight("req-1");
        s.track_inflight("req-2");

        assert!(s.is_inflight("req-1"));
        assert_eq!(s.inflight_count(), 2);
        assert_eq!(s.expire_inflight(), 2);
        assert_eq!(s.inflight_count(), 0);
        assert_eq!(s.expire_inflight(), 0);
    }

    #[test]
    fn test_peer_book_access() {
        let s = service();
        s.add_peer(peer("p1")).unwrap();
        s.add_peer(peer("p2")).unwrap();

        assert_eq!(s.peer_count(), 2);
        assert_eq!(s.peers().len(), 2);
        assert!(s.random_peer().is_some());
    }

    #[test]
    fn test_network_status_update() {
        let s = service();
        s.update_network_status(NetworkStatus::Connected);
        assert_eq!(s.network_status(), NetworkStatus::Connected);
    }

    #[tokio::test]
    async fn test_local_peer_announced_once() {
        let mut bus = MockMessageBus::new();
        bus.expect_send()
            .withf(|e| e.operation() == OPERATION_UPDATE_PEER && e.message.body.is_some())
            .times(1)
            .returning(|_| true);
        let s = I2pService::new(Arc::new(LoopbackRouter::new()), Arc::new(bus));

        s.establish_default_session().await;
        s.establish_default_session().await;

        assert!(s.local_peer().is_some());
        assert_eq!(s.session_count().await, 1);
    }
}
