// Service lifecycle: start, pause/unpause, restart and the two shutdowns.
//
// Every transition is published to the status observer. Shutdown stops the
// task runner before sessions are closed so no task can reopen one.

use super::{I2pService, ServiceStatus};
use crate::config::ServiceConfig;
use crate::tasks::{CheckRouterStatus, NetworkDiscovery, TaskRunner};
use crate::ServiceError;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl I2pService {
    /// Start the service: load configuration and begin periodic discovery and
    /// router-status checks. Returns `false` if configuration fails to load.
    pub async fn start(self: &Arc<Self>, properties: &HashMap<String, String>) -> bool {
        match self.try_start(properties).await {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// [`start`](Self::start) with the failure reason
    pub async fn try_start(
        self: &Arc<Self>,
        properties: &HashMap<String, String>,
    ) -> Result<(), ServiceError> {
        let current = self.status();
        if !Self::can_start_from(current) {
            return Err(ServiceError::InvalidState(current));
        }

        info!("Starting I2P Service...");
        self.update_status(ServiceStatus::Initializing);

        info!("Loading I2P properties...");
        let config = ServiceConfig::load_all(properties, self.config_file.as_deref())?;
        self.apply_config(&config);
        self.start_tasks(&config).await;

        self.update_status(ServiceStatus::Running);
        info!("I2P Service started.");
        Ok(())
    }

    fn can_start_from(status: ServiceStatus) -> bool {
        matches!(
            status,
            ServiceStatus::NotInitialized
                | ServiceStatus::Initializing
                | ServiceStatus::Shutdown
                | ServiceStatus::GracefullyShutdown
                | ServiceStatus::Error
        )
    }

    fn apply_config(&self, config: &ServiceConfig) {
        self.set_max_peers(config.max_peers);
        {
            let mut network = self.network.write();
            for (key, value) in &config.params {
                network.params.insert(key.clone(), value.clone());
            }
        }
        *self.config.write() = config.clone();
        debug!(
            "Applied config: max_peers={}, discovery={}s, status check={}s",
            config.max_peers, config.discovery_interval_secs, config.status_check_interval_secs
        );
    }

    async fn start_tasks(self: &Arc<Self>, config: &ServiceConfig) {
        let mut runner = TaskRunner::new();
        runner.register(
            Arc::new(NetworkDiscovery::new(Arc::downgrade(self))),
            config.discovery_interval(),
        );
        runner.register(
            Arc::new(CheckRouterStatus::new(Arc::downgrade(self))),
            config.status_check_interval(),
        );

        let previous = self.runner.lock().await.replace(runner.start());
        if let Some(previous) = previous {
            warn!("Replacing a task runner that was still active.");
            previous.stop().await;
        }
    }

    async fn stop_tasks(&self) {
        let handle = self.runner.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn pause(&self) -> bool {
        debug!("Pause is not supported by the I2P service.");
        false
    }

    pub fn unpause(&self) -> bool {
        debug!("Unpause is not supported by the I2P service.");
        false
    }

    /// Restart the router connection.
    ///
    /// Currently only records the attempt; the router is left as is.
    pub fn restart(&self) -> bool {
        let attempts = self.restart_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("I2P restart requested (attempt {}).", attempts);
        true
    }

    /// Stop tasks and close every session
    pub async fn shutdown(&self) -> bool {
        self.update_status(ServiceStatus::ShuttingDown);
        info!("I2P router stopping...");
        self.teardown().await;
        self.update_status(ServiceStatus::Shutdown);
        info!("I2P router stopped.");
        true
    }

    /// Same teardown as [`shutdown`](Self::shutdown), reported through the
    /// graceful states.
    pub async fn graceful_shutdown(&self) -> bool {
        self.update_status(ServiceStatus::GracefullyShuttingDown);
        info!("Gracefully shutting down I2P router...");
        self.teardown().await;
        self.update_status(ServiceStatus::GracefullyShutdown);
        info!("I2P router gracefully stopped.");
        true
    }

    async fn teardown(&self) {
        self.stop_tasks().await;
        self.sessions.close_all().await;
        *self.router_status.lock() = None;
    }
}
