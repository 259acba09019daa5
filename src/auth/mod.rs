//! The authenticator capability (`spec.md` §4.5, §4.6).
//!
//! A small, object-safe capability the client drives without caring
//! which concrete package is behind it. `Authenticator` is a closed
//! enum rather than a trait object because there are exactly two
//! packages today (`none` and `opaque`) and both need different
//! constructor arguments — a trait object would just push that back
//! into a builder.

pub mod opaque;

use crate::error::AuthError;
use crate::message::Message;
use opaque::OpaqueAuth;
use uuid::Uuid;

pub enum Authenticator {
    None(NoneAuth),
    Opaque(OpaqueAuth),
}

impl Authenticator {
    pub fn none(agent_id: Uuid) -> Self {
        Authenticator::None(NoneAuth { agent_id })
    }

    pub fn opaque(agent_id: Uuid) -> Self {
        Authenticator::Opaque(OpaqueAuth::new(agent_id))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Authenticator::None(a) => a.name(),
            Authenticator::Opaque(a) => a.name(),
        }
    }

    pub fn step(&mut self, inbound: &Message) -> Result<(Message, bool), AuthError> {
        match self {
            Authenticator::None(a) => a.step(inbound),
            Authenticator::Opaque(a) => a.step(inbound),
        }
    }

    pub fn secret(&self) -> Result<Vec<u8>, AuthError> {
        match self {
            Authenticator::None(a) => a.secret(),
            Authenticator::Opaque(a) => a.secret(),
        }
    }
}

/// The trivial package: one step, zero-length secret, always "done".
pub struct NoneAuth {
    agent_id: Uuid,
}

impl NoneAuth {
    pub fn name(&self) -> &'static str {
        "none"
    }

    pub fn secret(&self) -> Result<Vec<u8>, AuthError> {
        Ok(Vec::new())
    }

    pub fn step(&mut self, inbound: &Message) -> Result<(Message, bool), AuthError> {
        if inbound.id != self.agent_id {
            return Err(AuthError::IdMismatch);
        }
        Ok((Message::empty(self.agent_id), true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;

    #[test]
    fn none_auth_completes_in_one_step() {
        let id = Uuid::new_v4();
        let mut auth = Authenticator::none(id);
        let (out, done) = auth.step(&Message::empty(id)).unwrap();
        assert!(done);
        assert!(out.payload.is_empty());
        assert_eq!(auth.secret().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn none_auth_rejects_mismatched_id() {
        let mut auth = Authenticator::none(Uuid::new_v4());
        let other = Message::new(Uuid::new_v4(), Payload::Empty);
        assert!(matches!(auth.step(&other), Err(AuthError::IdMismatch)));
    }
}
