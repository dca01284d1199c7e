// I2P Service Core
//
// Adapter between a host message bus and a local I2P router: dispatches
// operation envelopes, keeps one client session per destination, and runs
// peer discovery and router-status polling in the background.

pub mod bus;
pub mod config;
pub mod message;
pub mod network;
pub mod router;
pub mod service;
pub mod session;
pub mod tasks;

use thiserror::Error;

pub use bus::{LoggingBus, MessageBus};
pub use config::{ConfigError, ServiceConfig, CONFIG_FILE_NAME};
pub use message::{Envelope, ExternalRoute, Message, Route};
pub use network::{NetworkPeer, NetworkStatus, NETWORK_I2P};
pub use router::{LoopbackRouter, OverlayRouter, RouterError, RouterStatus};
pub use service::{I2pService, Operation, ServiceStatus, StatusObserver, SERVICE_NAME};
pub use session::{I2pSession, SendError, SessionRegistry};
pub use tasks::{Task, TaskRunner, TaskRunnerHandle};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot start from state {0}")]
    InvalidState(ServiceStatus),
}
