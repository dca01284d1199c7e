// Router-backed queries and updates.
//
// Peer queries resolve the peer's address to a destination first; a peer
// without an address, or one the router cannot resolve, yields a neutral
// answer (false, or the "Unknown" country) and a warning.

use super::I2pService;
use crate::network::{NetworkPeer, NetworkStatus};
use crate::router::{DestinationHash, RouterStatus};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

pub const PARAM_HIDDEN_MODE: &str = "router.hiddenMode";
pub const PARAM_SHARE_PERCENTAGE: &str = "router.sharePercentage";
pub const PARAM_GEOIP_ENABLE: &str = "routerconsole.geoip.enable";

/// Country reported when the local peer is not known yet
pub const NO_LOCAL_PEER: &str = "NoLocalPeer";
/// Country reported when no remote peer was supplied
pub const NO_REMOTE_PEER: &str = "NoRemotePeer";
/// Country reported for a peer without an address
pub const NO_PEER: &str = "NoPeer";
/// Country reported when the router cannot place the peer
pub const UNKNOWN_COUNTRY: &str = "Unknown";

impl I2pService {
    /// Probe the router and act on a status change
    pub async fn check_router_status(&self) {
        let status = match self.router.check_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Unable to check I2P router status: {}", e);
                return;
            }
        };

        let changed = {
            let mut last = self.router_status.lock();
            if *last == Some(status) {
                false
            } else {
                *last = Some(status);
                true
            }
        };

        if changed {
            info!("I2P Router Status changed to: {:?}", status);
            self.report_router_status(status).await;
        }
    }

    pub fn router_status(&self) -> Option<RouterStatus> {
        *self.router_status.lock()
    }

    async fn report_router_status(&self, status: RouterStatus) {
        if status.is_degraded() {
            warn!("{}", status.description());
        } else {
            info!("{}", status.description());
        }

        let network_status = status.network_status();
        self.update_network_status(network_status);

        match network_status {
            NetworkStatus::Disconnected => {
                warn!("I2P router disconnected; restarting.");
                self.restart();
            }
            NetworkStatus::Connected => {
                self.restart_attempts.store(0, Ordering::SeqCst);
                if self.sessions.is_empty().await {
                    self.warm_up_session().await;
                }
            }
            _ => {}
        }
    }

    /// Open the default session ahead of the first outbound message
    async fn warm_up_session(&self) {
        info!("Network Connected and no Sessions.");
        if self.in_strict_country(None).await {
            warn!("This peer is in a 'strict' country defined by I2P.");
        }
        let hidden = self
            .network_param(PARAM_HIDDEN_MODE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if hidden {
            warn!("I2P Router is in Hidden mode. I2P Service setting for hidden mode is true.");
        }
        info!("Establishing Session to speed up future outgoing messages...");
        self.establish_default_session().await;
    }

    async fn resolve(&self, peer: &NetworkPeer, purpose: &str) -> Option<DestinationHash> {
        let Some(address) = peer.address() else {
            warn!("Network Peer with address is required to determine {}.", purpose);
            return None;
        };
        match self.router.lookup_destination(address).await {
            Ok(destination) => Some(destination.hash),
            Err(e) => {
                warn!("Unable to resolve peer {} for {}: {}", peer.short_fingerprint(), purpose, e);
                None
            }
        }
    }

    /// Two-letter country code of `peer`
    pub async fn country(&self, peer: &NetworkPeer) -> String {
        if peer.address().is_none() {
            warn!("Network Peer with address is required to determine country of peer.");
            return NO_PEER.to_string();
        }
        let Some(hash) = self.resolve(peer, "country of peer").await else {
            return UNKNOWN_COUNTRY.to_string();
        };
        match self.router.country(&hash).await {
            Ok(country) => country,
            Err(e) => {
                debug!("No country for {}: {}", hash, e);
                UNKNOWN_COUNTRY.to_string()
            }
        }
    }

    /// Whether `peer`, or this router when `None`, is in a strict country
    pub async fn in_strict_country(&self, peer: Option<&NetworkPeer>) -> bool {
        let hash = match peer {
            Some(peer) => match self.resolve(peer, "if in strict country").await {
                Some(hash) => Some(hash),
                None => return false,
            },
            None => None,
        };
        self.router
            .is_in_strict_country(hash.as_ref())
            .await
            .unwrap_or_else(|e| {
                warn!("Strict country check failed: {}", e);
                false
            })
    }

    pub async fn backlogged(&self, peer: &NetworkPeer) -> bool {
        match self.resolve(peer, "if backlogged").await {
            Some(hash) => self.router.is_backlogged(&hash).await.unwrap_or(false),
            None => false,
        }
    }

    pub async fn established(&self, peer: &NetworkPeer) -> bool {
        match self.resolve(peer, "if established").await {
            Some(hash) => self.router.is_established(&hash).await.unwrap_or(false),
            None => false,
        }
    }

    pub async fn unreachable(&self, peer: &NetworkPeer) -> bool {
        match self.resolve(peer, "if unreachable").await {
            Some(hash) => self.router.was_unreachable(&hash).await.unwrap_or(false),
            None => false,
        }
    }

    /// Known peers the router currently has an established connection with
    pub async fn active_peers_count(&self) -> usize {
        let mut count = 0;
        for peer in self.peers() {
            if self.established(&peer).await {
                count += 1;
            }
        }
        count
    }

    pub async fn update_hidden_mode(&self, hidden: bool) -> bool {
        self.update_router_param(PARAM_HIDDEN_MODE, &hidden.to_string())
            .await
    }

    pub async fn update_share_percentage(&self, percentage: u32) -> bool {
        self.update_router_param(PARAM_SHARE_PERCENTAGE, &percentage.to_string())
            .await
    }

    pub async fn update_geoip_enablement(&self, enable: bool) -> bool {
        self.update_router_param(PARAM_GEOIP_ENABLE, &enable.to_string())
            .await
    }

    /// Persist a router parameter if it changed; restarts on success
    async fn update_router_param(&self, key: &str, value: &str) -> bool {
        if self.network_param(key).as_deref() == Some(value) {
            debug!("{} already {}", key, value);
            return true;
        }
        match self.router.save_config(key, value).await {
            Ok(()) => {
                self.network
                    .write()
                    .params
                    .insert(key.to_string(), value.to_string());
                info!("Updated {} to {}", key, value);
                self.restart()
            }
            Err(e) => {
                warn!("Unable to update {}: {}", key, e);
                false
            }
        }
    }
}
