//! Message-bus collaborator
//!
//! The host application delivers inbound envelopes to the service's
//! dispatcher and accepts outbound ones through this trait. Envelopes the
//! dispatcher cannot handle go to the bus's dead-letter sink.

use crate::message::Envelope;
use tracing::{info, warn};

/// Outbound side of the host message bus
#[cfg_attr(test, mockall::automock)]
pub trait MessageBus: Send + Sync {
    /// Publish an envelope on the bus
    fn send(&self, envelope: Envelope) -> bool;

    /// Park an envelope nobody could handle
    fn dead_letter(&self, envelope: Envelope) -> bool;
}

/// Bus that only logs what it is given
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBus;

impl MessageBus for LoggingBus {
    fn send(&self, envelope: Envelope) -> bool {
        match serde_json::to_string(&envelope) {
            Ok(json) => info!("{}", json),
            Err(e) => warn!("Unable to render envelope {}: {}", envelope.short_id(), e),
        }
        true
    }

    fn dead_letter(&self, envelope: Envelope) -> bool {
        match serde_json::to_string(&envelope) {
            Ok(json) => warn!("Dead letter: \n\t{}", json),
            Err(_) => warn!("Dead letter: {}", envelope.id),
        }
        false
    }
}
