//! Session registry: lazily creates one session per destination address

use super::client::I2pSession;
use crate::config::ServiceConfig;
use crate::network::NetworkState;
use crate::router::OverlayRouter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry key used when no address is given
pub const DEFAULT_SESSION: &str = "default";

pub struct SessionRegistry {
    router: Arc<dyn OverlayRouter>,
    network: Arc<RwLock<NetworkState>>,
    network_name: String,
    /// address -> session. Held across session setup so that concurrent
    /// callers for a new address cannot both build one.
    sessions: Mutex<HashMap<String, Arc<I2pSession>>>,
}

impl SessionRegistry {
    pub fn new(
        router: Arc<dyn OverlayRouter>,
        network: Arc<RwLock<NetworkState>>,
        network_name: &str,
    ) -> Self {
        Self {
            router,
            network,
            network_name: network_name.to_string(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session for `address` (or [`DEFAULT_SESSION`]), creating,
    /// initializing, opening and, with `auto_connect`, connecting it first if
    /// it does not exist yet.
    pub async fn establish_session(
        &self,
        address: Option<&str>,
        auto_connect: bool,
        config: &ServiceConfig,
    ) -> Arc<I2pSession> {
        let address = address.unwrap_or(DEFAULT_SESSION);
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(address) {
            return session.clone();
        }

        debug!("Establishing session for {}", address);
        let mut session = I2pSession::new(
            self.router.clone(),
            self.network.clone(),
            &self.network_name,
            address,
        );
        if !session.init(config) {
            warn!("I2P Session for {} failed to initialize.", address);
        }
        if !session.open(None).await {
            warn!("I2P Session for {} failed to open.", address);
        }
        if auto_connect && !session.connect().await {
            warn!("I2P Session for {} failed to connect; will retry on send.", address);
        }

        let session = Arc::new(session);
        sessions.insert(address.to_string(), session.clone());
        session
    }

    /// Existing session for `address`, without creating one
    pub async fn get(&self, address: &str) -> Option<Arc<I2pSession>> {
        self.sessions.lock().await.get(address).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Close and forget every session (service teardown)
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (address, session) in sessions.drain() {
            session.close();
            debug!("Closed session {}", address);
        }
        info!("All I2P Sessions closed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NETWORK_I2P;
    use crate::router::LoopbackRouter;

    fn registry(router: Arc<LoopbackRouter>) -> SessionRegistry {
        SessionRegistry::new(
            router,
            Arc::new(RwLock::new(NetworkState::new())),
            NETWORK_I2P,
        )
    }

    #[tokio::test]
    async fn test_same_address_same_session() {
        let reg = registry(Arc::new(LoopbackRouter::new()));
        let config = ServiceConfig::default();

        let a = reg.establish_session(Some("dest"), true, &config).await;
        let b = reg.establish_session(Some("dest"), true, &config).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_none_maps_to_default() {
        let reg = registry(Arc::new(LoopbackRouter::new()));
        let config = ServiceConfig::default();

        let a = reg.establish_session(None, false, &config).await;
        let b = reg.establish_session(Some(DEFAULT_SESSION), false, &config).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.address(), DEFAULT_SESSION);
    }

    #[tokio::test]
    async fn test_auto_connect_flag() {
        let router = Arc::new(LoopbackRouter::new());
        let reg = registry(router.clone());
        let config = ServiceConfig::default();

        let lazy = reg.establish_session(Some("lazy"), false, &config).await;
        assert!(!lazy.is_connected());
        assert_eq!(router.connect_count(), 0);

        let eager = reg.establish_session(Some("eager"), true, &config).await;
        assert!(eager.is_connected());
        assert_eq!(router.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_still_registers() {
        let router = Arc::new(LoopbackRouter::new());
        router.fail_connect(Some("offline"));
        let reg = registry(router);

        let s = reg
            .establish_session(None, true, &ServiceConfig::default())
            .await;
        assert!(!s.is_connected());
        assert!(reg.get(DEFAULT_SESSION).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_establish_builds_one_session() {
        let router = Arc::new(LoopbackRouter::new());
        let reg = Arc::new(registry(router.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                tokio::spawn(async move {
                    reg.establish_session(Some("shared"), true, &ServiceConfig::default())
                        .await
                })
            })
            .collect();

        let sessions: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.len().await, 1);
        assert_eq!(router.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let reg = registry(Arc::new(LoopbackRouter::new()));
        let config = ServiceConfig::default();
        let s = reg.establish_session(Some("a"), true, &config).await;
        reg.establish_session(Some("b"), true, &config).await;

        reg.close_all().await;

        assert!(reg.is_empty().await);
        assert!(!s.is_connected());
    }
}
