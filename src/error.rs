//! Crate-wide error taxonomy.
//!
//! Every fallible public operation returns [`Error`]. Module-specific
//! error types (`TransformError`, `TransportError`, `AuthError`,
//! `JwtError`) exist so each module can be unit-tested against a narrow
//! error surface, then fold into `Error` at the boundary via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    #[error("jwt construction failed: {0}")]
    JwtConstruction(#[from] crate::jwt::JwtError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("server returned status {0}")]
    Server(u16),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("transform: {0}")]
    Transform(#[from] TransformError),

    #[error("auth protocol: {0}")]
    AuthProtocol(#[from] AuthError),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("unknown setting: {0}")]
    UnknownSetting(String),
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unknown transform stage: {0}")]
    UnknownStage(String),

    #[error("construct failed: {0}")]
    Construct(String),

    #[error("deconstruct failed: {0}")]
    Deconstruct(String),

    #[error("wrong key")]
    WrongKey,

    #[error("pipeline exhausted without producing a message")]
    PipelineExhausted,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown protocol: {0}")]
    BadProtocol(String),

    #[error("failed to build transport: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unexpected inbound message for current auth state")]
    UnexpectedSubtype,

    #[error("agent id mismatch")]
    IdMismatch,

    #[error("pake library error: {0}")]
    Pake(String),

    #[error("secret requested before authentication completed")]
    NotAuthenticated,
}
