use super::Task;
use crate::service::I2pService;
use async_trait::async_trait;
use std::sync::Weak;

/// Polls the router's reachability
pub struct CheckRouterStatus {
    service: Weak<I2pService>,
}

impl CheckRouterStatus {
    pub fn new(service: Weak<I2pService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Task for CheckRouterStatus {
    fn name(&self) -> &str {
        "CheckRouterStatus"
    }

    async fn execute(&self) -> bool {
        let Some(service) = self.service.upgrade() else {
            return false;
        };
        service.check_router_status().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LoggingBus;
    use crate::network::NetworkStatus;
    use crate::router::{LoopbackRouter, RouterStatus};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_updates_network_status() {
        let router = Arc::new(LoopbackRouter::new());
        router.set_status(RouterStatus::Hosed);
        let service = Arc::new(I2pService::new(router.clone(), Arc::new(LoggingBus)));

        let task = CheckRouterStatus::new(Arc::downgrade(&service));
        assert!(task.execute().await);
        assert_eq!(service.network_status(), NetworkStatus::PortConflict);
    }
}
