//! XOR stream stage: keyed, unauthenticated, the inverse is identical to
//! the forward direction. No crate pulls its weight for a one-line
//! repeating-key XOR, so this is the one hand-rolled primitive in the
//! pipeline.

use super::{message_to_canonical_bytes, try_message_from_bytes, PipelineValue};
use crate::error::TransformError;

fn apply(data: &[u8], key: &[u8]) -> Result<Vec<u8>, TransformError> {
    if key.is_empty() {
        return Err(TransformError::Construct("xor key must not be empty".into()));
    }
    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect())
}

pub(super) fn construct(value: PipelineValue, key: &[u8]) -> Result<Vec<u8>, TransformError> {
    let plaintext = match value {
        PipelineValue::Message(msg) => message_to_canonical_bytes(&msg),
        PipelineValue::Bytes(b) => b,
        PipelineValue::Text(s) => s.into_bytes(),
    };
    apply(&plaintext, key)
}

pub(super) fn deconstruct(bytes: Vec<u8>, key: &[u8]) -> Result<PipelineValue, TransformError> {
    let plaintext = apply(&bytes, key)?;
    if let Some(msg) = try_message_from_bytes(&plaintext) {
        return Ok(PipelineValue::Message(msg));
    }
    Ok(PipelineValue::Bytes(plaintext))
}
