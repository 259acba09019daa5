//! The client core (`spec.md` §4.4, §4.6, §4.8, Component F).
//!
//! Holds all mutable session state behind one mutex ([`Inner`]) but
//! never holds that mutex across network I/O: [`Client::send`] takes a
//! consistent snapshot (including a cheap `Arc` clone of the current
//! round-tripper), releases the lock, blocks on the wire, then
//! re-acquires the lock only to apply the handful of state changes a
//! response can trigger (URL rotation, JWT refresh, key fallback).

use crate::auth::Authenticator;
use crate::config::{AuthPackage, Config, Protocol};
use crate::error::Error;
use crate::jwt;
use crate::message::Message;
use crate::registry;
use crate::transform::{self, TransformStage};
use crate::transport::{self, RoundTripper, TransportSettings};
use log::{debug, info, trace, warn};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

fn random_padding(max: u64) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(0..max) as usize;
    (0..len).map(|_| rng.gen_range(0x20u8..=0x7e)).collect()
}

struct Inner {
    protocol: Protocol,
    urls: Vec<String>,
    current_url: usize,
    host: String,
    proxy: String,
    ja3: String,
    parrot: String,
    user_agent: String,
    headers: Vec<(String, String)>,
    psk: String,
    secret: Vec<u8>,
    jwt: String,
    padding_max: u64,
    pipeline: Vec<TransformStage>,
    authenticator: Authenticator,
    authenticated: bool,
    round_tripper: Arc<dyn RoundTripper>,
}

pub struct Client {
    agent_id: Uuid,
    inner: Mutex<Inner>,
}

pub enum SettingValue {
    Text(String),
    Bytes(Vec<u8>),
}

fn as_text(value: &SettingValue) -> Result<String, Error> {
    match value {
        SettingValue::Text(s) => Ok(s.clone()),
        SettingValue::Bytes(_) => Err(Error::Config("expected a text setting value".into())),
    }
}

impl Client {
    pub fn new(config: &Config) -> Result<Arc<Client>, Error> {
        let protocol = Protocol::from_str(&config.protocol)?;
        if config.url.is_empty() {
            return Err(Error::Config("url list is empty".into()));
        }
        let headers = Config::parse_headers(&config.headers)?;
        let padding_max = Config::parse_padding(&config.padding)?;
        let stage_names = Config::parse_transformer_names(&config.transformers)?;
        let pipeline = stage_names
            .iter()
            .map(|n| TransformStage::parse(n))
            .collect::<Result<Vec<_>, _>>()?;
        let auth_package = AuthPackage::from_str(&config.auth_package)?;
        let authenticator = match auth_package {
            AuthPackage::None => Authenticator::none(config.agent_id),
            AuthPackage::Opaque => Authenticator::opaque(config.agent_id),
        };

        let settings = TransportSettings {
            protocol,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            ja3: config.ja3.clone(),
            parrot: config.parrot.clone(),
        };
        let round_tripper = transport::build(&settings)?;

        let inner = Inner {
            protocol,
            urls: config.url.clone(),
            current_url: 0,
            host: config.host.clone(),
            proxy: config.proxy.clone(),
            ja3: config.ja3.clone(),
            parrot: config.parrot.clone(),
            user_agent: config.user_agent.clone(),
            headers,
            psk: config.psk.clone(),
            secret: sha256(config.psk.as_bytes()),
            jwt: String::new(),
            padding_max,
            pipeline,
            authenticator,
            authenticated: false,
            round_tripper,
        };

        let client = Arc::new(Client {
            agent_id: config.agent_id,
            inner: Mutex::new(inner),
        });
        registry::set_active(Arc::clone(&client));
        Ok(client)
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub fn authenticated(&self) -> bool {
        self.inner.lock().unwrap().authenticated
    }

    /// `Listen` is not supported by this poll-based transport.
    pub fn listen(&self) -> Result<(), Error> {
        Err(Error::Unsupported("listen"))
    }

    /// This client is poll-based, never server-push.
    pub fn synchronous(&self) -> bool {
        false
    }

    fn rebuild_transport(&self, clear_network_overrides: bool) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let settings = TransportSettings {
            protocol: inner.protocol,
            proxy: if clear_network_overrides {
                String::new()
            } else {
                inner.proxy.clone()
            },
            user_agent: inner.user_agent.clone(),
            ja3: if clear_network_overrides {
                String::new()
            } else {
                inner.ja3.clone()
            },
            parrot: if clear_network_overrides {
                String::new()
            } else {
                inner.parrot.clone()
            },
        };
        inner.round_tripper = transport::build(&settings)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_round_tripper_for_test(&self, rt: Arc<dyn RoundTripper>) {
        self.inner.lock().unwrap().round_tripper = rt;
    }

    #[cfg(test)]
    pub(crate) fn mark_authenticated_for_test(&self, secret: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.authenticated = true;
        inner.secret = secret;
    }

    #[cfg(test)]
    pub(crate) fn round_tripper_ptr_for_test(&self) -> *const () {
        Arc::as_ptr(&self.inner.lock().unwrap().round_tripper) as *const ()
    }

    #[cfg(test)]
    pub(crate) fn current_url_index_for_test(&self) -> usize {
        self.inner.lock().unwrap().current_url
    }

    /// `Send(msg) -> [msg]`, the single outbound operation (§4.4).
    pub fn send(&self, mut msg: Message) -> Result<Vec<Message>, Error> {
        let (pipeline, secret, psk, jwt, url, mut request_headers, round_tripper, padding_max, protocol) = {
            let inner = self.inner.lock().unwrap();
            let mut headers = vec![(
                "Content-Type".to_string(),
                "application/octet-stream; charset=utf-8".to_string(),
            )];
            if !inner.user_agent.is_empty() {
                headers.push(("User-Agent".to_string(), inner.user_agent.clone()));
            }
            if !inner.host.is_empty() {
                headers.push(("Host".to_string(), inner.host.clone()));
            }
            headers.extend(inner.headers.clone());
            (
                inner.pipeline.clone(),
                inner.secret.clone(),
                inner.psk.clone(),
                inner.jwt.clone(),
                inner.urls[inner.current_url].clone(),
                headers,
                Arc::clone(&inner.round_tripper),
                inner.padding_max,
                inner.protocol,
            )
        };

        if padding_max > 0 {
            msg.padding = random_padding(padding_max);
        }
        request_headers.push(("Authorization".to_string(), format!("Bearer {jwt}")));

        let body = transform::construct(&pipeline, msg, &secret)?;
        let result = round_tripper.round_trip(&url, &request_headers, body);

        // Rotation happens before interpreting the response error — a
        // failed send still advances the pointer, on purpose (avoids
        // stickiness on a down endpoint). Suppressed mid-OPAQUE-handshake,
        // where a rotation would strand a half-complete PAKE.
        {
            let mut inner = self.inner.lock().unwrap();
            let opaque_in_progress =
                matches!(inner.authenticator, Authenticator::Opaque(_)) && inner.secret.len() != 64;
            if !opaque_in_progress && inner.urls.len() > 1 {
                inner.current_url = rand::thread_rng().gen_range(0..inner.urls.len());
            }
        }

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                if protocol == Protocol::Http3 && transport::looks_like_protocol_rejection(&e.to_string()) {
                    warn!("http3 transport rejected by peer ({e}), rebuilding on fallback protocol");
                    self.rebuild_transport(true)?;
                    info!("transport rebuilt after http3 rejection");
                }
                return Err(Error::Transport(e));
            }
        };

        match response.status {
            200 => {}
            401 => {
                debug!("server returned 401, reminting bootstrap jwt");
                let fresh = jwt::mint(&psk, self.agent_id)?;
                self.inner.lock().unwrap().jwt = fresh;
                return Ok(Vec::new());
            }
            other => return Err(Error::Server(other)),
        }

        let content_type = response.header("content-type").unwrap_or_default();
        if !content_type.to_ascii_lowercase().contains("application/octet-stream") {
            return Err(Error::BadResponse(format!(
                "unexpected content-type {content_type:?}"
            )));
        }
        if response.body.is_empty() {
            return Err(Error::BadResponse("empty response body".into()));
        }

        let psk_key = sha256(psk.as_bytes());
        let (reply, used_fallback) =
            transform::deconstruct_dual_key(&pipeline, response.body, &secret, &psk_key)?;

        {
            let mut inner = self.inner.lock().unwrap();
            if used_fallback {
                warn!("dual-key fallback: session key rejected, falling back to PSK-derived key");
                inner.authenticated = false;
                inner.secret = psk_key;
            }
            if !reply.token.is_empty() {
                inner.jwt = reply.token.clone();
            }
        }

        Ok(vec![reply])
    }

    /// Drive the authenticator to completion, starting from `seed`
    /// (§4.6). `Initial()` is just `authenticate(Message::empty(id))`.
    pub fn authenticate(&self, seed: Message) -> Result<(), Error> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.secret = sha256(inner.psk.as_bytes());
            inner.authenticated = false;
        }
        let psk = self.inner.lock().unwrap().psk.clone();
        let bootstrap = jwt::mint(&psk, self.agent_id)?;
        self.inner.lock().unwrap().jwt = bootstrap;

        let mut current = seed;
        loop {
            let (out, done) = {
                let mut inner = self.inner.lock().unwrap();
                inner.authenticator.step(&current)?
            };
            debug!("auth step: inbound={:?} outbound={:?} done={done}", current.payload, out.payload);
            if out.payload.is_empty() {
                return Ok(());
            }
            if done {
                let mut inner = self.inner.lock().unwrap();
                inner.authenticated = true;
                if let Ok(secret) = inner.authenticator.secret() {
                    if !secret.is_empty() {
                        inner.secret = secret;
                    }
                }
                info!("authenticator {} reached authenticated state", inner.authenticator.name());
            }
            let mut replies = self.send(out)?;
            if done {
                return Ok(());
            }
            current = replies
                .pop()
                .ok_or_else(|| Error::BadResponse("authenticate: server returned no message".into()))?;
        }
    }

    pub fn initial(&self) -> Result<(), Error> {
        self.authenticate(Message::empty(self.agent_id))
    }

    /// Live reconfiguration under the mutex (§4.8).
    pub fn set(&self, key: &str, value: SettingValue) -> Result<(), Error> {
        trace!("set({key})");
        match key {
            "addr" => {
                let text = as_text(&value)?;
                let urls: Vec<String> = text
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if urls.is_empty() {
                    return Err(Error::Config("addr: empty url list".into()));
                }
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.urls = urls;
                    inner.current_url = 0;
                }
                self.rebuild_transport(false)
            }
            "ja3" => {
                let text = as_text(&value)?;
                {
                    self.inner.lock().unwrap().ja3 = text;
                }
                self.rebuild_transport(false)
            }
            "parrot" => {
                let text = as_text(&value)?;
                {
                    self.inner.lock().unwrap().parrot = text;
                }
                self.rebuild_transport(false)
            }
            "jwt" => {
                self.inner.lock().unwrap().jwt = as_text(&value)?;
                Ok(())
            }
            "paddingmax" => {
                let text = as_text(&value)?;
                let n: u64 = text
                    .trim()
                    .parse()
                    .map_err(|e| Error::Config(format!("paddingmax: {e}")))?;
                self.inner.lock().unwrap().padding_max = n;
                Ok(())
            }
            "secret" => {
                let bytes = match value {
                    SettingValue::Bytes(b) => b,
                    SettingValue::Text(s) => s.into_bytes(),
                };
                self.inner.lock().unwrap().secret = bytes;
                Ok(())
            }
            other => Err(Error::UnknownSetting(other.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Result<String, Error> {
        trace!("get({key})");
        let inner = self.inner.lock().unwrap();
        match key {
            "ja3" => Ok(inner.ja3.clone()),
            "paddingmax" => Ok(inner.padding_max.to_string()),
            "parrot" => Ok(inner.parrot.clone()),
            "protocol" => Ok(inner.protocol.to_string()),
            other => Err(Error::UnknownSetting(other.to_string())),
        }
    }
}
