//! The bootstrap JWT minter (`spec.md` §4.2).
//!
//! Used whenever the agent has no server-issued session token, or the
//! server just replied 401: a short-lived (10 second) token whose
//! claims carry only the agent's identity, signed with HS256 and then
//! encrypted direct-mode A256GCM, both keyed by `SHA-256(PSK)`. The
//! minted token is parsed back before it's handed to the caller so a
//! malformed token never silently reaches the wire.

use josekit::jwe::{Dir, JweHeader};
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::JwtPayload;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

const TOKEN_LIFETIME: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("jws signing failed: {0}")]
    Sign(String),
    #[error("jwe encryption failed: {0}")]
    Encrypt(String),
    #[error("jwe decryption failed: {0}")]
    Decrypt(String),
    #[error("jws verification failed: {0}")]
    Verify(String),
    #[error("token missing claim: {0}")]
    MissingClaim(&'static str),
    #[error("token id is not a uuid: {0}")]
    BadAgentId(#[from] uuid::Error),
    #[error("inner token is not valid utf-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub agent_id: Uuid,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
}

fn bootstrap_key(psk: &str) -> Vec<u8> {
    Sha256::digest(psk.as_bytes()).to_vec()
}

/// Mint a fresh bootstrap token for `agent_id`, keyed by `SHA-256(PSK)`.
pub fn mint(psk: &str, agent_id: Uuid) -> Result<String, JwtError> {
    let key = bootstrap_key(psk);
    let now = SystemTime::now();
    let exp = now + TOKEN_LIFETIME;

    let mut payload = JwtPayload::new();
    payload.set_jwt_id(agent_id.to_string());
    payload.set_issued_at(&now);
    payload.set_expires_at(&exp);

    let header = JwsHeader::new();
    let signer = HS256
        .signer_from_bytes(&key)
        .map_err(|e| JwtError::Sign(e.to_string()))?;
    let signed = josekit::jwt::encode_with_signer(&payload, &header, &signer)
        .map_err(|e| JwtError::Sign(e.to_string()))?;

    let mut jwe_header = JweHeader::new();
    jwe_header.set_content_encryption("A256GCM");
    let encrypter = Dir
        .encrypter_from_bytes(&key)
        .map_err(|e| JwtError::Encrypt(e.to_string()))?;
    let token = josekit::jwe::serialize_compact(signed.as_bytes(), &jwe_header, &encrypter)
        .map_err(|e| JwtError::Encrypt(e.to_string()))?;

    // Catch malformed output before it ever reaches the wire.
    parse(&token, psk)?;
    Ok(token)
}

/// Parse (decrypt, verify, decode) a token minted by [`mint`].
pub fn parse(token: &str, psk: &str) -> Result<Claims, JwtError> {
    let key = bootstrap_key(psk);

    let decrypter = Dir
        .decrypter_from_bytes(&key)
        .map_err(|e| JwtError::Decrypt(e.to_string()))?;
    let (signed_bytes, _) = josekit::jwe::deserialize_compact(token, &decrypter)
        .map_err(|e| JwtError::Decrypt(e.to_string()))?;
    let signed = std::str::from_utf8(&signed_bytes)?;

    let verifier = HS256
        .verifier_from_bytes(&key)
        .map_err(|e| JwtError::Verify(e.to_string()))?;
    let (payload, _) = josekit::jwt::decode_with_verifier(signed, &verifier)
        .map_err(|e| JwtError::Verify(e.to_string()))?;

    let jti = payload.jwt_id().ok_or(JwtError::MissingClaim("jti"))?;
    let agent_id = Uuid::parse_str(jti)?;
    let issued_at = payload.issued_at().ok_or(JwtError::MissingClaim("iat"))?;
    let expires_at = payload.expires_at().ok_or(JwtError::MissingClaim("exp"))?;

    Ok(Claims {
        agent_id,
        issued_at,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_parses_with_same_psk() {
        let id = Uuid::new_v4();
        let token = mint("test", id).unwrap();
        let claims = parse(&token, "test").unwrap();
        assert_eq!(claims.agent_id, id);
        let lifetime = claims.expires_at.duration_since(claims.issued_at).unwrap();
        assert_eq!(lifetime, TOKEN_LIFETIME);
    }

    #[test]
    fn wrong_psk_fails_to_parse() {
        let id = Uuid::new_v4();
        let token = mint("test", id).unwrap();
        assert!(parse(&token, "not-the-psk").is_err());
    }

    #[test]
    fn expiry_is_ten_seconds_from_issuance() {
        let id = Uuid::new_v4();
        let before = SystemTime::now();
        let token = mint("test", id).unwrap();
        let claims = parse(&token, "test").unwrap();
        assert!(claims.issued_at >= before);
        assert!(claims.expires_at.duration_since(claims.issued_at).unwrap() <= Duration::from_secs(11));
    }
}
