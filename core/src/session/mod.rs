//! Client sessions with the local router
//!
//! - [`I2pSession`]: one logical connection; validates and sends envelopes
//! - [`SessionRegistry`]: at most one session per destination address

pub mod client;
pub mod registry;

use thiserror::Error;

pub use client::{I2pSession, DEFAULT_ALIAS, I2CP_PARAMETERS};
pub use registry::{SessionRegistry, DEFAULT_SESSION};

/// Reasons an outbound envelope was not sent.
///
/// Each maps to a numeric code written onto the envelope as
/// `Code:<n>, <reason>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Route must be external.")]
    RouteNotExternal,

    #[error("Destination Peer Required.")]
    DestinationPeerRequired,

    #[error("Not meant for {0} Network.")]
    WrongNetwork(String),

    #[error("Destination lookup failed: {0}")]
    DestinationLookup(String),

    #[error("Unable to serialize envelope: {0}")]
    Serialization(String),

    #[error("Router rejected envelope: {0}")]
    Transport(String),

    #[error("Session not connected.")]
    NotConnected,
}

impl SendError {
    pub fn code(&self) -> u16 {
        match self {
            Self::RouteNotExternal => 1,
            Self::DestinationPeerRequired => 2,
            Self::WrongNetwork(_) => 3,
            Self::DestinationLookup(_) => 4,
            Self::Serialization(_) => 5,
            Self::Transport(_) => 6,
            Self::NotConnected => 7,
        }
    }

    /// Text written onto the envelope's message
    pub fn annotation(&self) -> String {
        format!("Code:{}, {}", self.code(), self)
    }
}
