//! Inbound operation dispatch
//!
//! Each envelope names an operation; the handler reads its inputs from the
//! envelope's content fields and writes results back to the same envelope.
//! Operations this service does not know go to the dead letter sink.

use super::router_state::{NO_LOCAL_PEER, NO_REMOTE_PEER};
use super::I2pService;
use crate::message::Envelope;
use crate::network::NetworkPeer;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub const OPERATION_SEND: &str = "SEND";
pub const OPERATION_CHECK_ROUTER_STATUS: &str = "CHECK_ROUTER_STATUS";
pub const OPERATION_LOCAL_PEER_COUNTRY: &str = "LOCAL_PEER_COUNTRY";
pub const OPERATION_REMOTE_PEER_COUNTRY: &str = "REMOTE_PEER_COUNTRY";
pub const OPERATION_IN_STRICT_COUNTRY: &str = "IN_STRICT_COUNTRY";
pub const OPERATION_UPDATE_HIDDEN_MODE: &str = "UPDATE_HIDDEN_MODE";
pub const OPERATION_UPDATE_SHARE_PERCENTAGE: &str = "UPDATE_SHARE_PERCENTAGE";
pub const OPERATION_UPDATE_GEOIP_ENABLEMENT: &str = "UPDATE_GEOIP_ENABLEMENT";
pub const OPERATION_ACTIVE_PEERS_COUNT: &str = "ACTIVE_PEERS_COUNT";

// Content fields
pub const FIELD_COUNTRY: &str = "country";
pub const FIELD_REMOTE_PEER: &str = "remotePeer";
pub const FIELD_PEER: &str = "peer";
pub const FIELD_LOCAL_PEER_COUNTRY: &str = "localPeerCountry";
pub const FIELD_PEER_COUNTRY: &str = "peerCountry";
pub const FIELD_HIDDEN_MODE: &str = "hiddenMode";
pub const FIELD_SHARE_PERCENTAGE: &str = "sharePercentage";
pub const FIELD_ENABLE_GEOIP: &str = "enableGeoIP";
pub const FIELD_ACTIVE_PEERS_COUNT: &str = "activePeersCount";

/// Operations handled by [`I2pService::handle_document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Send,
    CheckRouterStatus,
    LocalPeerCountry,
    RemotePeerCountry,
    InStrictCountry,
    UpdateHiddenMode,
    UpdateSharePercentage,
    UpdateGeoipEnablement,
    ActivePeersCount,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Send,
        Operation::CheckRouterStatus,
        Operation::LocalPeerCountry,
        Operation::RemotePeerCountry,
        Operation::InStrictCountry,
        Operation::UpdateHiddenMode,
        Operation::UpdateSharePercentage,
        Operation::UpdateGeoipEnablement,
        Operation::ActivePeersCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Send => OPERATION_SEND,
            Operation::CheckRouterStatus => OPERATION_CHECK_ROUTER_STATUS,
            Operation::LocalPeerCountry => OPERATION_LOCAL_PEER_COUNTRY,
            Operation::RemotePeerCountry => OPERATION_REMOTE_PEER_COUNTRY,
            Operation::InStrictCountry => OPERATION_IN_STRICT_COUNTRY,
            Operation::UpdateHiddenMode => OPERATION_UPDATE_HIDDEN_MODE,
            Operation::UpdateSharePercentage => OPERATION_UPDATE_SHARE_PERCENTAGE,
            Operation::UpdateGeoipEnablement => OPERATION_UPDATE_GEOIP_ENABLEMENT,
            Operation::ActivePeersCount => OPERATION_ACTIVE_PEERS_COUNT,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Operation ({0}) not supported.")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// String or JSON boolean; anything else reads as `false`
fn bool_field(envelope: &Envelope, name: &str) -> Option<bool> {
    match envelope.value(name)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(s.trim().eq_ignore_ascii_case("true")),
        _ => Some(false),
    }
}

fn integer_field(envelope: &Envelope, name: &str) -> Option<Result<u32, String>> {
    let value = envelope.value(name)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| n.to_string()),
        Value::String(s) => s.trim().parse::<u32>().map_err(|_| s.clone()),
        other => Err(other.to_string()),
    };
    Some(parsed)
}

impl I2pService {
    /// Handle one inbound envelope.
    ///
    /// Returns `false` when the operation failed or was not recognized.
    /// Unrecognized envelopes go to the dead letter sink unmodified.
    pub async fn handle_document(&self, envelope: &mut Envelope) -> bool {
        let operation = match envelope.operation().parse::<Operation>() {
            Ok(operation) => operation,
            Err(_) => {
                warn!(
                    "Operation ({}) not supported. Sending to Dead Letter queue.",
                    envelope.operation()
                );
                self.bus.dead_letter(envelope.clone());
                return false;
            }
        };
        debug!("Handling {} for envelope {}", operation, envelope.short_id());

        match operation {
            Operation::Send => self.send_out(envelope).await,
            Operation::CheckRouterStatus => {
                self.check_router_status().await;
                true
            }
            Operation::LocalPeerCountry => {
                let country = match self.local_peer() {
                    Some(peer) => self.country(&peer).await,
                    None => NO_LOCAL_PEER.to_string(),
                };
                envelope.add_nvp(FIELD_COUNTRY, country);
                true
            }
            Operation::RemotePeerCountry => {
                let country = match envelope.value_as::<NetworkPeer>(FIELD_REMOTE_PEER) {
                    Some(peer) => self.country(&peer).await,
                    None => NO_REMOTE_PEER.to_string(),
                };
                envelope.add_nvp(FIELD_COUNTRY, country);
                true
            }
            Operation::InStrictCountry => {
                match envelope.value_as::<NetworkPeer>(FIELD_PEER) {
                    Some(peer) => {
                        let strict = self.in_strict_country(Some(&peer)).await;
                        envelope.add_nvp(FIELD_PEER_COUNTRY, strict);
                    }
                    None => {
                        let strict = self.in_strict_country(None).await;
                        envelope.add_nvp(FIELD_LOCAL_PEER_COUNTRY, strict);
                    }
                }
                true
            }
            Operation::UpdateHiddenMode => {
                if let Some(hidden) = bool_field(envelope, FIELD_HIDDEN_MODE) {
                    self.update_hidden_mode(hidden).await;
                }
                true
            }
            Operation::UpdateSharePercentage => {
                match integer_field(envelope, FIELD_SHARE_PERCENTAGE) {
                    Some(Ok(percentage)) => {
                        self.update_share_percentage(percentage).await;
                    }
                    Some(Err(raw)) => warn!("Unable to parse share percentage: {}", raw),
                    None => debug!("No share percentage supplied."),
                }
                true
            }
            Operation::UpdateGeoipEnablement => {
                if let Some(enable) = bool_field(envelope, FIELD_ENABLE_GEOIP) {
                    self.update_geoip_enablement(enable).await;
                }
                true
            }
            Operation::ActivePeersCount => {
                let count = self.active_peers_count().await;
                envelope.add_nvp(FIELD_ACTIVE_PEERS_COUNT, count);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LoggingBus, MockMessageBus};
    use crate::network::NETWORK_I2P;
    use crate::router::LoopbackRouter;
    use crate::service::router_state::{NO_PEER, PARAM_GEOIP_ENABLE, PARAM_SHARE_PERCENTAGE};
    use std::sync::Arc;

    fn setup() -> (Arc<LoopbackRouter>, I2pService) {
        let router = Arc::new(LoopbackRouter::new());
        let service = I2pService::new(router.clone(), Arc::new(LoggingBus));
        (router, service)
    }

    fn request(operation: &str) -> Envelope {
        Envelope::for_operation(crate::service::SERVICE_NAME, operation)
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>(), Ok(op));
        }
        assert_eq!(
            "send".parse::<Operation>(),
            Err(UnknownOperation("send".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_operation_goes_to_dead_letter() {
        let mut bus = MockMessageBus::new();
        bus.expect_dead_letter()
            .withf(|e| e.operation() == "FOO" && e.content.is_empty())
            .times(1)
            .returning(|_| true);
        bus.expect_send().never();
        let service = I2pService::new(Arc::new(LoopbackRouter::new()), Arc::new(bus));

        let mut envelope = request("FOO");
        let before = envelope.clone();
        assert!(!service.handle_document(&mut envelope).await);
        assert_eq!(envelope, before);
    }

    #[tokio::test]
    async fn test_local_peer_country() {
        let (router, service) = setup();

        let mut envelope = request(OPERATION_LOCAL_PEER_COUNTRY);
        assert!(service.handle_document(&mut envelope).await);
        assert_eq!(envelope.value_str(FIELD_COUNTRY), Some(NO_LOCAL_PEER));

        let local = NetworkPeer::new(NETWORK_I2P, "local-dest", "fp-local");
        router.add_peer(&local);
        router.set_country("local-dest", "nl");
        service.set_local_peer(local);

        let mut envelope = request(OPERATION_LOCAL_PEER_COUNTRY);
        assert!(service.handle_document(&mut envelope).await);
        assert_eq!(envelope.value_str(FIELD_COUNTRY), Some("nl"));
    }

    #[tokio::test]
    async fn test_remote_peer_country() {
        let (_router, service) = setup();

        let mut envelope = request(OPERATION_REMOTE_PEER_COUNTRY);
        service.handle_document(&mut envelope).await;
        assert_eq!(envelope.value_str(FIELD_COUNTRY), Some(NO_REMOTE_PEER));

        let mut envelope = request(OPERATION_REMOTE_PEER_COUNTRY);
        envelope.add_nvp(
            FIELD_REMOTE_PEER,
            serde_json::to_value(NetworkPeer::unaddressed(NETWORK_I2P)).unwrap(),
        );
        service.handle_document(&mut envelope).await;
        assert_eq!(envelope.value_str(FIELD_COUNTRY), Some(NO_PEER));
    }

    #[tokio::test]
    async fn test_in_strict_country_fields() {
        let (router, service) = setup();
        router.set_local_strict(true);
        let peer = NetworkPeer::new(NETWORK_I2P, "strict-dest", "fp-strict");
        router.add_peer(&peer);
        router.set_strict("strict-dest");

        let mut local = request(OPERATION_IN_STRICT_COUNTRY);
        service.handle_document(&mut local).await;
        assert_eq!(local.value(FIELD_LOCAL_PEER_COUNTRY), Some(&Value::Bool(true)));
        assert!(local.value(FIELD_PEER_COUNTRY).is_none());

        let mut remote = request(OPERATION_IN_STRICT_COUNTRY);
        remote.add_nvp(FIELD_PEER, serde_json::to_value(&peer).unwrap());
        service.handle_document(&mut remote).await;
        assert_eq!(remote.value(FIELD_PEER_COUNTRY), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_update_share_percentage_parsing() {
        let (router, service) = setup();

        let mut bad = request(OPERATION_UPDATE_SHARE_PERCENTAGE);
        bad.add_nvp(FIELD_SHARE_PERCENTAGE, "lots");
        assert!(service.handle_document(&mut bad).await);
        assert!(router.saved_config().is_empty());

        let mut good = request(OPERATION_UPDATE_SHARE_PERCENTAGE);
        good.add_nvp(FIELD_SHARE_PERCENTAGE, "25");
        assert!(service.handle_document(&mut good).await);
        assert_eq!(
            router.saved_config().get(PARAM_SHARE_PERCENTAGE).map(String::as_str),
            Some("25")
        );
    }

    #[tokio::test]
    async fn test_update_geoip_accepts_json_bool() {
        let (router, service) = setup();

        let mut envelope = request(OPERATION_UPDATE_GEOIP_ENABLEMENT);
        envelope.add_nvp(FIELD_ENABLE_GEOIP, true);
        assert!(service.handle_document(&mut envelope).await);
        assert_eq!(
            router.saved_config().get(PARAM_GEOIP_ENABLE).map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_active_peers_count_with_no_peers() {
        let (_router, service) = setup();

        let mut envelope = request(OPERATION_ACTIVE_PEERS_COUNT);
        assert!(service.handle_document(&mut envelope).await);
        assert_eq!(envelope.value_as::<u64>(FIELD_ACTIVE_PEERS_COUNT), Some(0));
    }

    #[tokio::test]
    async fn test_send_without_external_route_fails() {
        let (router, service) = setup();

        let mut envelope = request(OPERATION_SEND);
        assert!(!service.handle_document(&mut envelope).await);
        assert!(envelope.message.errors[0].starts_with("Code:1,"));
        assert!(router.sent_packets().is_empty());
    }
}
