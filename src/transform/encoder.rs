//! The three keyless encoder families: `base64`, `hex`, and the generic
//! binary encoder (`gob-*`). All three are "pure, keyless, round-trip
//! identity" per `spec.md` §4.1 — the bytes they put on the wire are the
//! same regardless of the `-byte`/`-string` suffix; that suffix only
//! picks which [`PipelineValue`] variant `deconstruct` reports.

use super::{message_to_canonical_bytes, try_message_from_bytes, Carrier, EncoderFamily, PipelineValue};
use crate::error::TransformError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

fn input_bytes(value: PipelineValue) -> Vec<u8> {
    match value {
        PipelineValue::Message(msg) => message_to_canonical_bytes(&msg),
        PipelineValue::Bytes(b) => b,
        PipelineValue::Text(s) => s.into_bytes(),
    }
}

fn encode(family: EncoderFamily, carrier: Carrier, bytes: &[u8]) -> Vec<u8> {
    match family {
        EncoderFamily::Base64 => B64.encode(bytes).into_bytes(),
        EncoderFamily::Hex => hex::encode(bytes).into_bytes(),
        // The generic binary encoder's "-base" form puts the canonical
        // serialization on the wire with no further obfuscation; its
        // "-string" form base64-wraps it so the result can travel as a
        // Text value even when the underlying bytes (e.g. a keyed
        // cipher stage's ciphertext) aren't valid UTF-8.
        EncoderFamily::BinEnc => match carrier {
            Carrier::Byte => bytes.to_vec(),
            Carrier::String => B64.encode(bytes).into_bytes(),
        },
    }
}

fn decode(family: EncoderFamily, carrier: Carrier, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
    match family {
        EncoderFamily::Base64 => B64
            .decode(bytes)
            .map_err(|e| TransformError::Deconstruct(format!("base64: {e}"))),
        EncoderFamily::Hex => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| TransformError::Deconstruct(format!("hex: {e}")))?;
            hex::decode(s).map_err(|e| TransformError::Deconstruct(format!("hex: {e}")))
        }
        EncoderFamily::BinEnc => match carrier {
            Carrier::Byte => Ok(bytes.to_vec()),
            Carrier::String => B64
                .decode(bytes)
                .map_err(|e| TransformError::Deconstruct(format!("gob-string: {e}"))),
        },
    }
}

pub(super) fn construct(
    family: EncoderFamily,
    carrier: Carrier,
    value: PipelineValue,
) -> Result<Vec<u8>, TransformError> {
    let raw = input_bytes(value);
    Ok(encode(family, carrier, &raw))
}

pub(super) fn deconstruct(
    family: EncoderFamily,
    carrier: Carrier,
    bytes: Vec<u8>,
) -> Result<PipelineValue, TransformError> {
    let decoded = decode(family, carrier, &bytes)?;
    if let Some(msg) = try_message_from_bytes(&decoded) {
        return Ok(PipelineValue::Message(msg));
    }
    match carrier {
        Carrier::Byte => Ok(PipelineValue::Bytes(decoded)),
        Carrier::String => {
            let s = String::from_utf8(decoded)
                .map_err(|e| TransformError::Deconstruct(format!("not valid utf-8: {e}")))?;
            Ok(PipelineValue::Text(s))
        }
    }
}
