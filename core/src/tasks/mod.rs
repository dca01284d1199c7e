//! Periodic background work
//!
//! A [`TaskRunner`] owns a set of [`Task`]s, each with its own period, and runs
//! them one at a time on a single tokio task until told to stop.

pub mod discovery;
pub mod router_status;
pub mod runner;

use async_trait::async_trait;

pub use discovery::NetworkDiscovery;
pub use router_status::CheckRouterStatus;
pub use runner::{TaskRunner, TaskRunnerHandle, DEFAULT_TICK, MAX_PERIOD};

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Run once. Returning `false` removes the task from the schedule.
    async fn execute(&self) -> bool;
}
