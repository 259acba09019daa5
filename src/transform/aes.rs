//! AES-256-GCM stage: authenticated symmetric encryption keyed by the
//! client's current `secret`. The ciphertext embeds its own nonce and
//! authentication tag, so `deconstruct` needs nothing but the key.

use super::{message_to_canonical_bytes, try_message_from_bytes, PipelineValue};
use crate::error::TransformError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// `secret` is 32 or 64 bytes depending on auth state (§3 invariant);
/// normalise to a fixed 32-byte AES-256 key so the stage works
/// regardless of which one is current.
fn derive_key(secret: &[u8]) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret);
    Key::<Aes256Gcm>::clone_from_slice(&digest)
}

pub(super) fn construct(value: PipelineValue, key: &[u8]) -> Result<Vec<u8>, TransformError> {
    let plaintext = match value {
        PipelineValue::Message(msg) => message_to_canonical_bytes(&msg),
        PipelineValue::Bytes(b) => b,
        PipelineValue::Text(s) => s.into_bytes(),
    };
    let cipher = Aes256Gcm::new(&derive_key(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|e| TransformError::Construct(format!("aes-gcm encrypt: {e}")))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub(super) fn deconstruct(bytes: Vec<u8>, key: &[u8]) -> Result<PipelineValue, TransformError> {
    if bytes.len() < NONCE_LEN {
        return Err(TransformError::Deconstruct("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&derive_key(key));
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| TransformError::WrongKey)?;
    if let Some(msg) = try_message_from_bytes(&plaintext) {
        return Ok(PipelineValue::Message(msg));
    }
    Ok(PipelineValue::Bytes(plaintext))
}
