//! The transform pipeline: an ordered, user-configured list of codec and
//! cipher stages that turns a [`Message`](crate::message::Message) into
//! wire bytes and back.
//!
//! Construction folds the pipeline right-to-left (the last-listed stage
//! is outermost and runs first); deconstruction folds left-to-right and
//! terminates the moment a stage reports it produced a [`Message`]. See
//! `SPEC_FULL.md` for why every stage — not just one designated
//! "structure-aware" stage — is able to recognise a `Message` on the way
//! out.

mod aes;
mod encoder;
mod jwe;
mod rc4;
mod xor;

use crate::error::TransformError;
use crate::message::Message;

/// What a stage's inverse direction produced, before the pipeline
/// decides whether to keep folding or to stop.
#[derive(Debug, Clone)]
pub enum PipelineValue {
    Bytes(Vec<u8>),
    Text(String),
    Message(Message),
}

impl PipelineValue {
    /// Collapse to the byte representation a following stage consumes.
    /// Only valid for `Bytes`/`Text` — callers must have already handled
    /// the `Message` (terminal) case.
    fn into_bytes_for_next_stage(self) -> Vec<u8> {
        match self {
            PipelineValue::Bytes(b) => b,
            PipelineValue::Text(s) => s.into_bytes(),
            PipelineValue::Message(_) => {
                unreachable!("Message is a terminal value, callers must check first")
            }
        }
    }
}

fn message_to_canonical_bytes(msg: &Message) -> Vec<u8> {
    serde_json::to_vec(msg).expect("Message always serializes to JSON")
}

fn try_message_from_bytes(bytes: &[u8]) -> Option<Message> {
    serde_json::from_slice(bytes).ok()
}

/// Byte-vs-text carrier tag for the three encoder stage families
/// (`base64`, `hex`, `gob`). The encoded bytes are identical either way;
/// this only controls what type the stage reports to the next stage in
/// `deconstruct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    Byte,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFamily {
    Base64,
    Hex,
    /// The "generic binary encoder" (`gob-base`/`gob-string` config
    /// identifiers): keyless, identity on raw bytes, and the stage that
    /// performs the canonical serialization when it is given a
    /// `Message` directly.
    BinEnc,
}

#[derive(Debug, Clone)]
pub enum TransformStage {
    Aes,
    Encoder(EncoderFamily, Carrier),
    Jwe,
    Rc4,
    Xor,
}

impl TransformStage {
    /// Recognise a stage identifier from `spec.md` §4.1, case-insensitive.
    /// Unknown identifiers fail client construction (§3 invariant).
    pub fn parse(name: &str) -> Result<Self, TransformError> {
        use Carrier::*;
        use EncoderFamily::*;
        Ok(match name.to_ascii_lowercase().as_str() {
            "aes" => TransformStage::Aes,
            "base64-byte" => TransformStage::Encoder(Base64, Byte),
            "base64-string" => TransformStage::Encoder(Base64, String),
            "gob-base" => TransformStage::Encoder(BinEnc, Byte),
            "gob-string" => TransformStage::Encoder(BinEnc, String),
            "hex-byte" => TransformStage::Encoder(Hex, Byte),
            "hex-string" => TransformStage::Encoder(Hex, String),
            "jwe" => TransformStage::Jwe,
            "rc4" => TransformStage::Rc4,
            "xor" => TransformStage::Xor,
            other => return Err(TransformError::UnknownStage(other.to_string())),
        })
    }

    fn construct(&self, value: PipelineValue, key: &[u8]) -> Result<Vec<u8>, TransformError> {
        match self {
            TransformStage::Aes => aes::construct(value, key),
            TransformStage::Encoder(family, carrier) => {
                encoder::construct(*family, *carrier, value)
            }
            TransformStage::Jwe => jwe::construct(value, key),
            TransformStage::Rc4 => rc4::construct(value, key),
            TransformStage::Xor => xor::construct(value, key),
        }
    }

    fn deconstruct(&self, bytes: Vec<u8>, key: &[u8]) -> Result<PipelineValue, TransformError> {
        match self {
            TransformStage::Aes => aes::deconstruct(bytes, key),
            TransformStage::Encoder(family, carrier) => {
                encoder::deconstruct(*family, *carrier, bytes)
            }
            TransformStage::Jwe => jwe::deconstruct(bytes, key),
            TransformStage::Rc4 => rc4::deconstruct(bytes, key),
            TransformStage::Xor => xor::deconstruct(bytes, key),
        }
    }
}

/// Fold the pipeline right-to-left: the last-listed stage is outermost
/// and is invoked first, directly on `msg`.
pub fn construct(pipeline: &[TransformStage], msg: Message, key: &[u8]) -> Result<Vec<u8>, TransformError> {
    let mut value = PipelineValue::Message(msg);
    for stage in pipeline.iter().rev() {
        let bytes = stage.construct(value, key)?;
        value = PipelineValue::Bytes(bytes);
    }
    Ok(value.into_bytes_for_next_stage())
}

/// Fold the pipeline left-to-right, stopping at the first stage whose
/// inverse reports a `Message`. Exhausting the pipeline without one is a
/// failure (§4.1).
pub fn deconstruct(pipeline: &[TransformStage], wire: Vec<u8>, key: &[u8]) -> Result<Message, TransformError> {
    let mut value = PipelineValue::Bytes(wire);
    for stage in pipeline.iter() {
        let bytes = value.into_bytes_for_next_stage();
        value = stage.deconstruct(bytes, key)?;
        if let PipelineValue::Message(msg) = value {
            return Ok(msg);
        }
    }
    Err(TransformError::PipelineExhausted)
}

/// Deconstruct with the §4.7 dual-key fallback: try `primary_key`
/// stage by stage; the first stage that fails is retried once under
/// `fallback_key`, and every stage after that retry also uses
/// `fallback_key` (a failed stage means the peer re-keyed the session,
/// not that one stage alone drifted). Returns whether the fallback key
/// ended up being used, so the caller can flip `authenticated`.
pub fn deconstruct_dual_key(
    pipeline: &[TransformStage],
    wire: Vec<u8>,
    primary_key: &[u8],
    fallback_key: &[u8],
) -> Result<(Message, bool), TransformError> {
    let mut value = PipelineValue::Bytes(wire);
    let mut used_fallback = false;
    for stage in pipeline.iter() {
        let bytes = value.into_bytes_for_next_stage();
        let key = if used_fallback { fallback_key } else { primary_key };
        value = match stage.deconstruct(bytes.clone(), key) {
            Ok(v) => v,
            Err(_) if !used_fallback => {
                used_fallback = true;
                stage.deconstruct(bytes, fallback_key)?
            }
            Err(e) => return Err(e),
        };
        if let PipelineValue::Message(msg) = value {
            return Ok((msg, used_fallback));
        }
    }
    Err(TransformError::PipelineExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;
    use uuid::Uuid;

    fn sample_message() -> Message {
        Message::new(Uuid::new_v4(), Payload::Command(vec![1, 2, 3, 4, 5]))
    }

    fn roundtrip(names: &[&str], key: &[u8]) {
        let pipeline: Vec<TransformStage> = names.iter().map(|n| TransformStage::parse(n).unwrap()).collect();
        let msg = sample_message();
        let wire = construct(&pipeline, msg.clone(), key).unwrap();
        let back = deconstruct(&pipeline, wire, key).unwrap();
        assert_eq!(msg.id, back.id);
        assert_eq!(msg.payload, back.payload);
    }

    #[test]
    fn single_stage_round_trips_for_every_stage_kind() {
        let key = [0x42u8; 32];
        for name in [
            "base64-byte",
            "base64-string",
            "hex-byte",
            "hex-string",
            "gob-base",
            "gob-string",
            "aes",
            "rc4",
            "xor",
            "jwe",
        ] {
            roundtrip(&[name], &key);
        }
    }

    #[test]
    fn multi_stage_pipeline_round_trips() {
        roundtrip(&["aes", "base64-string", "hex-byte"], &[7u8; 32]);
    }

    #[test]
    fn gob_string_wraps_ciphertext_as_base64_so_it_round_trips() {
        // gob-string sits outermost over a keyed cipher stage, so the
        // bytes it has to carry as a Text value are ciphertext, not
        // valid UTF-8 on their own.
        roundtrip(&["aes", "gob-string"], &[11u8; 32]);
        roundtrip(&["rc4", "gob-string"], &[12u8; 16]);
        roundtrip(&["xor", "gob-string"], &[13u8; 8]);
    }

    #[test]
    fn unknown_stage_identifier_rejected() {
        assert!(TransformStage::parse("rot13").is_err());
    }

    #[test]
    fn wrong_key_fails_aes_deconstruct_with_explicit_kind() {
        let pipeline = vec![TransformStage::Aes];
        let msg = sample_message();
        let wire = construct(&pipeline, msg, &[1u8; 32]).unwrap();
        let err = deconstruct(&pipeline, wire, &[2u8; 32]).unwrap_err();
        assert!(matches!(err, TransformError::WrongKey));
    }

    #[test]
    fn dual_key_fallback_recovers_and_reports_it_was_used() {
        let pipeline = vec![TransformStage::Aes];
        let msg = sample_message();
        let psk_key = [9u8; 32];
        let wire = construct(&pipeline, msg.clone(), &psk_key).unwrap();

        let session_key = [1u8; 32];
        let (back, used_fallback) =
            deconstruct_dual_key(&pipeline, wire, &session_key, &psk_key).unwrap();
        assert!(used_fallback);
        assert_eq!(back.id, msg.id);
    }

    #[test]
    fn dual_key_fallback_not_triggered_when_primary_key_works() {
        let pipeline = vec![TransformStage::Aes];
        let msg = sample_message();
        let key = [3u8; 32];
        let wire = construct(&pipeline, msg.clone(), &key).unwrap();

        let (back, used_fallback) = deconstruct_dual_key(&pipeline, wire, &key, &[4u8; 32]).unwrap();
        assert!(!used_fallback);
        assert_eq!(back.id, msg.id);
    }

    #[test]
    fn exhausted_pipeline_fails_deconstruct() {
        // xor alone on bytes that don't happen to decode into a Message.
        let pipeline = vec![TransformStage::Xor];
        let key = [9u8; 16];
        let garbage = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let err = deconstruct(&pipeline, garbage, &key);
        // Either it fails to parse as Message and the (single-stage)
        // pipeline is exhausted, or by coincidence it parses — assert
        // the failure path is the PipelineExhausted kind when it does fail.
        if let Err(e) = err {
            assert!(matches!(e, TransformError::PipelineExhausted));
        }
    }
}
