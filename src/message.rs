//! The wire-level unit of communication between agent and controller.
//!
//! The core never interprets [`Payload::Command`]; it is opaque bytes
//! handed in by the caller and handed back out to the caller. The
//! `Opaque(..)` variants are the subtypes driven by the OPAQUE state
//! machine in [`crate::auth::opaque`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of the OPAQUE registration/authentication exchange. Carries
/// the PAKE library's own serialized wire bytes — this crate never
/// looks inside them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "subtype", content = "bytes")]
pub enum OpaqueStep {
    RegInit(Vec<u8>),
    RegComplete(Vec<u8>),
    AuthInit(Vec<u8>),
    AuthComplete(Vec<u8>),
    ReRegister,
    ReAuthenticate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Payload {
    /// No payload at all. Used by the authenticator to signal "stop
    /// looping" and as the seed for `Initial()`.
    Empty,
    Opaque(OpaqueStep),
    /// Bytes meaningful only to the caller (command dispatch, telemetry,
    /// ...). Never interpreted here.
    Command(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Empty
    }
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// The message exchanged with the controller, before/after the
/// transform pipeline. Construction of padding and rotation of the
/// session token both happen on this type; transforms never inspect
/// `payload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    #[serde(default)]
    pub token: String,
    pub payload: Payload,
    #[serde(default, with = "base64_bytes")]
    pub padding: Vec<u8>,
}

impl Message {
    pub fn new(id: Uuid, payload: Payload) -> Self {
        Message {
            id,
            token: String::new(),
            payload,
            padding: Vec::new(),
        }
    }

    pub fn empty(id: Uuid) -> Self {
        Message::new(id, Payload::Empty)
    }
}

/// serde helper: store byte blobs as base64 so `Message` round-trips
/// through the JSON encoding used by the "generic binary encoder" and
/// JWE stages without losing bytes that aren't valid UTF-8.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
