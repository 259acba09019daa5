//! The OPAQUE authenticator (`spec.md` §4.5).
//!
//! The PAKE math itself — `register-init`/`complete`,
//! `auth-init`/`complete`, and the embedded SIGMA key exchange — is
//! taken as a black box provided by `opaque-ke`; this module only owns
//! the state machine that decides which black-box call to make next and
//! what to do with its output. The agent only ever plays the client
//! role: the controller's replies are fed back in under the *same*
//! step tag the agent used to ask for them (its `RegInit` is answered
//! by a `RegInit` carrying the controller's registration response, and
//! so on), which is why `step` below branches on tag plus local state
//! rather than on tag alone.

use crate::error::AuthError;
use crate::message::{Message, OpaqueStep, Payload};
use opaque_ke::key_exchange::tripledh::TripleDh;
use opaque_ke::ksf::Identity;
use opaque_ke::{
    ClientLogin, ClientLoginFinishParameters, ClientRegistration,
    ClientRegistrationFinishParameters, CipherSuite, CredentialResponse, RegistrationResponse,
};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

const PASSWORD_RAW_LEN: usize = 30;
const PASSWORD_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 5000;

pub struct AgentCipherSuite;

impl CipherSuite for AgentCipherSuite {
    type OprfCs = opaque_ke::Ristretto255;
    type KeGroup = opaque_ke::Ristretto255;
    type KeyExchange = TripleDh;
    type Ksf = Identity;
}

fn derive_password(agent_id: Uuid) -> [u8; PASSWORD_LEN] {
    let mut raw = [0u8; PASSWORD_RAW_LEN];
    rand::thread_rng().fill_bytes(&mut raw);
    let mut pwd = [0u8; PASSWORD_LEN];
    pbkdf2_hmac::<Sha256>(&raw, agent_id.as_bytes(), PBKDF2_ITERATIONS, &mut pwd);
    pwd
}

pub struct OpaqueAuth {
    agent_id: Uuid,
    registered: bool,
    authenticated: bool,
    password: Option<[u8; PASSWORD_LEN]>,
    pending_registration: Option<ClientRegistration<AgentCipherSuite>>,
    pending_login: Option<ClientLogin<AgentCipherSuite>>,
    secret: Option<Vec<u8>>,
}

impl OpaqueAuth {
    pub fn new(agent_id: Uuid) -> Self {
        OpaqueAuth {
            agent_id,
            registered: false,
            authenticated: false,
            password: None,
            pending_registration: None,
            pending_login: None,
            secret: None,
        }
    }

    pub fn name(&self) -> &'static str {
        "opaque"
    }

    pub fn secret(&self) -> Result<Vec<u8>, AuthError> {
        if !self.authenticated {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(self.secret.clone().unwrap_or_default())
    }

    fn start_registration(&mut self) -> Result<Message, AuthError> {
        let password = self.password.get_or_insert_with(|| derive_password(self.agent_id));
        let result = ClientRegistration::<AgentCipherSuite>::start(&mut OsRng, password)
            .map_err(|e| AuthError::Pake(e.to_string()))?;
        self.pending_registration = Some(result.state);
        Ok(self.outbound(OpaqueStep::RegInit(result.message.serialize().to_vec())))
    }

    fn finish_registration(&mut self, response_bytes: &[u8]) -> Result<Message, AuthError> {
        let state = self
            .pending_registration
            .take()
            .ok_or(AuthError::UnexpectedSubtype)?;
        let password = self.password.ok_or(AuthError::UnexpectedSubtype)?;
        let response = RegistrationResponse::<AgentCipherSuite>::deserialize(response_bytes)
            .map_err(|e| AuthError::Pake(e.to_string()))?;
        let result = state
            .finish(
                &mut OsRng,
                &password,
                response,
                ClientRegistrationFinishParameters::default(),
            )
            .map_err(|e| AuthError::Pake(e.to_string()))?;
        self.registered = true;
        Ok(self.outbound(OpaqueStep::RegComplete(result.message.serialize().to_vec())))
    }

    fn start_login(&mut self) -> Result<Message, AuthError> {
        let password = self.password.ok_or(AuthError::UnexpectedSubtype)?;
        let result = ClientLogin::<AgentCipherSuite>::start(&mut OsRng, &password)
            .map_err(|e| AuthError::Pake(e.to_string()))?;
        self.pending_login = Some(result.state);
        Ok(self.outbound(OpaqueStep::AuthInit(result.message.serialize().to_vec())))
    }

    fn finish_login(&mut self, response_bytes: &[u8]) -> Result<(Message, bool), AuthError> {
        let state = self.pending_login.take().ok_or(AuthError::UnexpectedSubtype)?;
        let password = self.password.ok_or(AuthError::UnexpectedSubtype)?;
        let response = CredentialResponse::<AgentCipherSuite>::deserialize(response_bytes)
            .map_err(|e| AuthError::Pake(e.to_string()))?;
        let result = state
            .finish(&password, response, ClientLoginFinishParameters::default())
            .map_err(|e| AuthError::Pake(e.to_string()))?;
        self.authenticated = true;
        self.secret = Some(result.session_key.to_vec());
        let msg = self.outbound(OpaqueStep::AuthComplete(result.message.serialize().to_vec()));
        Ok((msg, true))
    }

    fn outbound(&self, step: OpaqueStep) -> Message {
        Message::new(self.agent_id, Payload::Opaque(step))
    }

    /// Drive the state machine one step. Returns `(outbound, done)`;
    /// `done` is only ever true alongside `AuthComplete`.
    pub fn step(&mut self, inbound: &Message) -> Result<(Message, bool), AuthError> {
        if inbound.id != self.agent_id && !inbound.payload.is_empty() {
            return Err(AuthError::IdMismatch);
        }

        match &inbound.payload {
            Payload::Empty if !self.registered && self.pending_registration.is_none() => {
                Ok((self.start_registration()?, false))
            }
            Payload::Opaque(OpaqueStep::RegInit(bytes)) => Ok((self.finish_registration(bytes)?, false)),
            Payload::Opaque(OpaqueStep::RegComplete(_)) => Ok((self.start_login()?, false)),
            Payload::Opaque(OpaqueStep::AuthInit(bytes)) => self.finish_login(bytes),
            Payload::Opaque(OpaqueStep::ReRegister) => {
                if !self.registered {
                    // Reentrancy guard: a registration is already in
                    // flight (or never started). Don't wipe state out
                    // from under it; just exit the loop.
                    return Ok((Message::empty(self.agent_id), true));
                }
                self.registered = false;
                self.password = None;
                self.pending_registration = None;
                Ok((self.start_registration()?, false))
            }
            Payload::Opaque(OpaqueStep::ReAuthenticate) => {
                self.authenticated = false;
                self.secret = None;
                Ok((self.start_login()?, false))
            }
            _ => Err(AuthError::UnexpectedSubtype),
        }
    }
}
