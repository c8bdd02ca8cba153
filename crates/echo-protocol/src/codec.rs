//! JSON codec for channel envelopes.
//!
//! Envelopes travel as JSON objects. Captured traffic is stored as one
//! `Publication` per line.

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::{Envelope, Publication};

/// Maximum encoded envelope size (16 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    TooLarge(usize),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid JSON that is not a usable envelope.
    #[error("Invalid envelope: {0}")]
    Invalid(&'static str),
}

/// Encode an envelope to bytes.
///
/// # Errors
///
/// Returns an error if the envelope is too large or serialization fails.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(envelope)?;

    if payload.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode an envelope from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large, not JSON, or has an empty event name.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }

    let envelope: Envelope = serde_json::from_slice(data)?;
    if envelope.event.is_empty() {
        return Err(ProtocolError::Invalid("empty event name"));
    }

    Ok(envelope)
}

/// Decode one line of captured traffic.
///
/// # Errors
///
/// Returns an error if the line is not a publication with a channel and event.
pub fn decode_publication(line: &str) -> Result<Publication, ProtocolError> {
    let publication: Publication = serde_json::from_str(line.trim())?;

    if publication.channel.is_empty() {
        return Err(ProtocolError::Invalid("empty channel name"));
    }
    if publication.envelope.event.is_empty() {
        return Err(ProtocolError::Invalid("empty event name"));
    }

    Ok(publication)
}
