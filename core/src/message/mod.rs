// Message module: envelopes, routes, and their wire encoding

pub mod types;
pub mod codec;

pub use types::{Envelope, ExternalRoute, Message, Route};
pub use codec::{decode_envelope, encode_envelope, exceeds_soft_limit, PACKET_SIZE_SOFT_LIMIT};
