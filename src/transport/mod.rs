//! The transport factory (`spec.md` §4.3).
//!
//! `RoundTripper` is the capability boundary: everything above this
//! module only ever sends a pre-built request body to a URL and gets a
//! status code, headers and a body back. The factory's job is to pick
//! the concrete engine (ureq, reqwest or quinn+h3) from the protocol
//! string plus the JA3/parrot override, in the precedence order the
//! spec lays out, and to build its TLS configuration once so every
//! engine shares the same cert-validation and cipher-suite policy.

mod http1;
mod http2;
mod http3;
mod utls;

use crate::config::Protocol;
use crate::error::TransportError;
use std::sync::Arc;
use std::time::Duration;

pub use http3::looks_like_protocol_rejection;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A single outbound POST: the only operation every engine must support.
pub trait RoundTripper: Sync + Send {
    fn round_trip(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Response, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct TransportSettings {
    pub protocol: Protocol,
    pub proxy: String,
    pub user_agent: String,
    pub ja3: String,
    pub parrot: String,
}

/// Build the round-tripper named by `settings`. JA3 wins over parrot,
/// and either one wins over the plain protocol dispatch (§4.3).
pub fn build(settings: &TransportSettings) -> Result<Arc<dyn RoundTripper>, TransportError> {
    if !settings.ja3.is_empty() || !settings.parrot.is_empty() {
        return utls::build(settings);
    }

    match settings.protocol {
        Protocol::Http3 => http3::build(settings),
        Protocol::H2 => http2::build(settings, true),
        Protocol::H2c => http2::build(settings, false),
        Protocol::Https => http1::build(settings, true),
        Protocol::Http => http1::build(settings, false),
    }
}

pub(crate) fn proxy_for(settings: &TransportSettings) -> Option<String> {
    if !settings.proxy.is_empty() {
        return Some(settings.proxy.clone());
    }
    std::env::var("HTTPS_PROXY")
        .or_else(|_| std::env::var("https_proxy"))
        .or_else(|_| std::env::var("HTTP_PROXY"))
        .or_else(|_| std::env::var("http_proxy"))
        .ok()
        .filter(|v| !v.is_empty())
}
