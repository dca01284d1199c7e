//! Service lifecycle status and its observer

use serde::{Deserialize, Serialize};

/// Lifecycle state of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    NotInitialized,
    Initializing,
    Starting,
    Running,
    Pausing,
    Paused,
    Unpausing,
    Restarting,
    ShuttingDown,
    Shutdown,
    GracefullyShuttingDown,
    GracefullyShutdown,
    Error,
}

impl ServiceStatus {
    /// Shut down, gracefully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Shutdown | Self::GracefullyShutdown)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Initializing => "INITIALIZING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Pausing => "PAUSING",
            Self::Paused => "PAUSED",
            Self::Unpausing => "UNPAUSING",
            Self::Restarting => "RESTARTING",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Shutdown => "SHUTDOWN",
            Self::GracefullyShuttingDown => "GRACEFULLY_SHUTTING_DOWN",
            Self::GracefullyShutdown => "GRACEFULLY_SHUTDOWN",
            Self::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Told about every status transition
#[cfg_attr(test, mockall::automock)]
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, status: ServiceStatus);
}
