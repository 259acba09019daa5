//! JWE stage: wraps the current payload as the payload of a
//! signed-then-encrypted JSON Web Token (HS256 over the payload, then
//! direct-mode A256GCM), both keyed by `secret`. This is the same
//! sign-then-encrypt shape as the bootstrap minter in
//! [`crate::jwt`], but here the "claims" are whatever bytes the inner
//! stages produced rather than a fixed claim set.

use super::{message_to_canonical_bytes, try_message_from_bytes, PipelineValue};
use crate::error::TransformError;
use josekit::jwe::{JweHeader, Dir};
use josekit::jws::{JwsHeader, HS256};
use sha2::{Digest, Sha256};

fn encryption_key(secret: &[u8]) -> Vec<u8> {
    Sha256::digest(secret).to_vec()
}

pub(super) fn construct(value: PipelineValue, secret: &[u8]) -> Result<Vec<u8>, TransformError> {
    let payload = match value {
        PipelineValue::Message(msg) => message_to_canonical_bytes(&msg),
        PipelineValue::Bytes(b) => b,
        PipelineValue::Text(s) => s.into_bytes(),
    };

    let jws_header = JwsHeader::new();
    let signer = HS256
        .signer_from_bytes(secret)
        .map_err(|e| TransformError::Construct(format!("jwe: hs256 signer: {e}")))?;
    let signed = josekit::jws::serialize_compact(&payload, &jws_header, &signer)
        .map_err(|e| TransformError::Construct(format!("jwe: jws sign: {e}")))?;

    let mut jwe_header = JweHeader::new();
    jwe_header.set_content_encryption("A256GCM");
    let encrypter = Dir
        .encrypter_from_bytes(encryption_key(secret))
        .map_err(|e| TransformError::Construct(format!("jwe: dir encrypter: {e}")))?;
    let token = josekit::jwe::serialize_compact(signed.as_bytes(), &jwe_header, &encrypter)
        .map_err(|e| TransformError::Construct(format!("jwe: jwe encrypt: {e}")))?;
    Ok(token.into_bytes())
}

pub(super) fn deconstruct(bytes: Vec<u8>, secret: &[u8]) -> Result<PipelineValue, TransformError> {
    let token = std::str::from_utf8(&bytes)
        .map_err(|e| TransformError::Deconstruct(format!("jwe: not utf-8: {e}")))?;

    let decrypter = Dir
        .decrypter_from_bytes(encryption_key(secret))
        .map_err(|e| TransformError::Deconstruct(format!("jwe: dir decrypter: {e}")))?;
    let (signed_bytes, _) = josekit::jwe::deserialize_compact(token, &decrypter)
        .map_err(|_| TransformError::WrongKey)?;

    let signed = std::str::from_utf8(&signed_bytes)
        .map_err(|e| TransformError::Deconstruct(format!("jwe: inner token not utf-8: {e}")))?;
    let verifier = HS256
        .verifier_from_bytes(secret)
        .map_err(|e| TransformError::Deconstruct(format!("jwe: hs256 verifier: {e}")))?;
    let (payload, _) = josekit::jws::deserialize_compact(signed, &verifier)
        .map_err(|_| TransformError::WrongKey)?;

    if let Some(msg) = try_message_from_bytes(&payload) {
        return Ok(PipelineValue::Message(msg));
    }
    Ok(PipelineValue::Bytes(payload))
}
