//! Service lifecycle over the loopback router
//!
//! Start, send through the dispatcher, background status polling, and
//! shutdown, all against an in-process router.
//!
//! Run with: cargo test --test integration_service_lifecycle

use i2p_service_core::message::decode_envelope;
use i2p_service_core::network::NetworkPeer;
use i2p_service_core::service::dispatcher::OPERATION_SEND;
use i2p_service_core::{
    Envelope, I2pService, LoggingBus, LoopbackRouter, NetworkStatus, RouterStatus,
    ServiceStatus, StatusObserver, NETWORK_I2P, SERVICE_NAME,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<ServiceStatus>>,
}

impl StatusObserver for RecordingObserver {
    fn status_changed(&self, status: ServiceStatus) {
        self.seen.lock().push(status);
    }
}

fn service_with(router: Arc<LoopbackRouter>) -> Arc<I2pService> {
    Arc::new(I2pService::new(router, Arc::new(LoggingBus)))
}

#[tokio::test]
async fn test_start_send_shutdown() {
    let router = Arc::new(LoopbackRouter::new());
    let observer = Arc::new(RecordingObserver::default());
    let service = Arc::new(
        I2pService::new(router.clone(), Arc::new(LoggingBus)).with_observer(observer.clone()),
    );

    assert!(service.start(&HashMap::new()).await);
    assert_eq!(service.status(), ServiceStatus::Running);

    // Remote peer the router can resolve
    let remote = NetworkPeer::new(NETWORK_I2P, "remote-dest", "fp-remote");
    router.add_peer(&remote);

    let mut envelope = Envelope::document();
    envelope.add_nvp("greeting", "hello");
    envelope.add_external_route(SERVICE_NAME, OPERATION_SEND, None, Some(remote));

    assert!(service.handle_document(&mut envelope).await);
    assert!(!envelope.message.has_errors());

    let sent = router.sent_packets();
    assert_eq!(sent.len(), 1);
    let delivered = decode_envelope(&sent[0].payload).unwrap();
    assert_eq!(delivered.id, envelope.id);
    assert_eq!(delivered.value_str("greeting"), Some("hello"));

    assert!(service.shutdown().await);
    assert_eq!(service.session_count().await, 0);

    let seen = observer.seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            ServiceStatus::Initializing,
            ServiceStatus::Running,
            ServiceStatus::ShuttingDown,
            ServiceStatus::Shutdown,
        ]
    );
}

#[tokio::test]
async fn test_send_to_unknown_destination_is_annotated() {
    let router = Arc::new(LoopbackRouter::new());
    let service = service_with(router.clone());
    service.start(&HashMap::new()).await;

    let stranger = NetworkPeer::new(NETWORK_I2P, "not-in-netdb", "fp-x");
    let mut envelope = Envelope::document();
    envelope.add_external_route(SERVICE_NAME, OPERATION_SEND, None, Some(stranger));

    assert!(!service.handle_document(&mut envelope).await);
    assert!(envelope.message.errors[0].starts_with("Code:4,"));
    assert!(router.sent_packets().is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_config_file_and_property_precedence() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"ra.i2p.maxPeers": "7", "ra.i2p.connectTimeoutSecs": "12"}}"#
    )
    .unwrap();

    let service = Arc::new(
        I2pService::new(Arc::new(LoopbackRouter::new()), Arc::new(LoggingBus))
            .with_config_file(file.path()),
    );
    let mut properties = HashMap::new();
    properties.insert("ra.i2p.maxPeers".to_string(), "9".to_string());

    assert!(service.start(&properties).await);
    let config = service.config();
    assert_eq!(config.max_peers, 9);
    assert_eq!(config.connect_timeout_secs, 12);
    assert_eq!(service.max_peers(), 9);

    service.graceful_shutdown().await;
    assert_eq!(service.status(), ServiceStatus::GracefullyShutdown);
}

#[tokio::test]
async fn test_unreadable_config_file_fails_start() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();

    let service = Arc::new(
        I2pService::new(Arc::new(LoopbackRouter::new()), Arc::new(LoggingBus))
            .with_config_file(file.path()),
    );

    assert!(!service.start(&HashMap::new()).await);
    assert_eq!(service.status(), ServiceStatus::Initializing);
}

#[tokio::test]
async fn test_oversized_interval_fails_start() {
    let service = service_with(Arc::new(LoopbackRouter::new()));

    let mut properties = HashMap::new();
    properties.insert(
        "ra.i2p.discoveryIntervalSecs".to_string(),
        u64::MAX.to_string(),
    );
    properties.insert("ra.i2p.statusCheckIntervalSecs".to_string(), "1".to_string());

    assert!(!service.start(&properties).await);
    assert_eq!(service.status(), ServiceStatus::Initializing);
}

#[tokio::test(start_paused = true)]
async fn test_background_status_polling() {
    let router = Arc::new(LoopbackRouter::new());
    router.set_status(RouterStatus::Unknown);
    let service = service_with(router.clone());

    let mut properties = HashMap::new();
    properties.insert("ra.i2p.statusCheckIntervalSecs".to_string(), "2".to_string());
    assert!(service.start(&properties).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(service.network_status(), NetworkStatus::Connecting);
    assert_eq!(service.session_count().await, 0);

    router.set_status(RouterStatus::Ok);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(service.network_status(), NetworkStatus::Connected);
    assert_eq!(service.session_count().await, 1);
    assert!(service.local_peer().is_some());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_task_runs_after_shutdown() {
    let router = Arc::new(LoopbackRouter::new());
    router.set_status(RouterStatus::Unknown);
    let service = service_with(router.clone());

    let mut properties = HashMap::new();
    properties.insert("ra.i2p.statusCheckIntervalSecs".to_string(), "1".to_string());
    service.start(&properties).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    service.shutdown().await;

    router.set_status(RouterStatus::Ok);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(service.network_status(), NetworkStatus::Connecting);
    assert_eq!(service.session_count().await, 0);
}
