// Envelope codec: JSON wire payloads for the overlay router

use super::types::Envelope;
use anyhow::{bail, Result};

/// Largest payload the router reliably carries in one packet: 31.5 KB.
/// Bigger payloads are still handed off; nothing fragments them.
pub const PACKET_SIZE_SOFT_LIMIT: usize = 31_500;

/// Hard ceiling on inbound payloads: 256 KB
pub const MAX_ENVELOPE_SIZE: usize = 256 * 1024;

/// Serialize an Envelope to its wire payload (JSON)
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Deserialize a wire payload back into an Envelope
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    if bytes.len() > MAX_ENVELOPE_SIZE {
        bail!(
            "Envelope too large: {} bytes (max {})",
            bytes.len(),
            MAX_ENVELOPE_SIZE
        );
    }

    let envelope: Envelope = serde_json::from_slice(bytes)?;
    Ok(envelope)
}

/// Whether a payload exceeds the single-packet soft limit
pub fn exceeds_soft_limit(payload: &[u8]) -> bool {
    payload.len() > PACKET_SIZE_SOFT_LIMIT
}
