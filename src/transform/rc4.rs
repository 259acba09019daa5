//! RC4 stream cipher stage: keyed, unauthenticated, the inverse is the
//! same operation as the forward direction (XOR of a keystream).

use super::{message_to_canonical_bytes, try_message_from_bytes, PipelineValue};
use crate::error::TransformError;
use ::rc4::{KeyInit, Rc4, StreamCipher};

fn apply(data: &[u8], key: &[u8]) -> Result<Vec<u8>, TransformError> {
    let mut cipher = Rc4::new_from_slice(key)
        .map_err(|e| TransformError::Construct(format!("rc4 key: {e}")))?;
    let mut buf = data.to_vec();
    cipher.apply_keystream(&mut buf);
    Ok(buf)
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
