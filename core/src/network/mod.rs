//! Network identity and state
//!
//! Peers as the overlay knows them, the local node's connectivity, and the
//! bounded book of known peers the discovery task draws from.

pub mod peer;
pub mod state;

pub use peer::{Did, NetworkPeer, PublicKey, NETWORK_I2P};
pub use state::{NetworkState, NetworkStatus, PeerBook, PeerBookError};
