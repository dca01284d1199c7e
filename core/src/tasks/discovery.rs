// Peer discovery.
//
// While connected and below peer capacity, each run asks one random known peer
// for its peers by sending it our known-peer list. Responses are not awaited
// here; any request still outstanding at the next run is counted as timed out.

use super::Task;
use crate::message::Envelope;
use crate::network::NetworkStatus;
use crate::service::dispatcher::OPERATION_SEND;
use crate::service::{I2pService, NET_OP_REQ, SERVICE_NAME};
use async_trait::async_trait;
use std::sync::Weak;
use tracing::{debug, warn};

pub struct NetworkDiscovery {
    service: Weak<I2pService>,
}

impl NetworkDiscovery {
    pub fn new(service: Weak<I2pService>) -> Self {
        Self { service }
    }

    async fn discover(&self, service: &I2pService) {
        if service.network_status() != NetworkStatus::Connected {
            debug!("Not connected; skipping discovery.");
            return;
        }
        if !service.has_peer_capacity() {
            debug!("Peer book full; skipping discovery.");
            return;
        }

        let timed_out = service.expire_inflight();
        if timed_out > 0 {
            warn!("{} in-flight timer(s) timed out.", timed_out);
        }

        let Some(to_peer) = service.random_peer() else {
            warn!("Must have a peer to start the discovery process. Waiting for a peer to connect...");
            return;
        };

        // The session binds the local peer the request is sent from
        service.establish_default_session().await;

        let mut envelope = Envelope::document();
        if let Err(e) = envelope.add_content(&service.peers()) {
            warn!("Unable to attach known peers to discovery request: {}", e);
            return;
        }
        envelope.add_external_route(
            SERVICE_NAME,
            OPERATION_SEND,
            service.local_peer(),
            Some(to_peer.clone()),
        );
        envelope.mark(NET_OP_REQ);
        service.track_inflight(&envelope.id);

        debug!(
            "Sending discovery request {} to {}",
            envelope.short_id(),
            to_peer.short_fingerprint()
        );
        if !service.send_out(&mut envelope).await {
            debug!(
                "Discovery request {} not sent: {:?}",
                envelope.short_id(),
                envelope.message.errors
            );
        }
    }
}

#[async_trait]
impl Task for NetworkDiscovery {
    fn name(&self) -> &str {
        "NetworkDiscovery"
    }

    async fn execute(&self) -> bool {
        match self.service.upgrade() {
            Some(service) => {
                self.discover(&service).await;
                true
            }
            None => false,
        }
    }
}
