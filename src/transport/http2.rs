//! HTTP/2 engine (TLS and h2c prior-knowledge cleartext), built on
//! `reqwest`'s blocking client.

use super::{proxy_for, RoundTripper, Response, TransportSettings, REQUEST_TIMEOUT};
use crate::error::TransportError;
use std::sync::Arc;

pub struct Http2Transport {
    client: reqwest::blocking::Client,
}

impl RoundTripper for Http2Transport {
    fn round_trip(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Response, TransportError> {
        let mut req = self.client.post(url);
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req
            .body(body)
            .send()
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = resp
            .bytes()
            .map_err(|e| TransportError::Io(e.to_string()))?
            .to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

pub fn build(
    settings: &TransportSettings,
    tls: bool,
) -> Result<Arc<dyn RoundTripper>, TransportError> {
    let mut builder = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(if settings.user_agent.is_empty() {
            "agentlink"
        } else {
            settings.user_agent.as_str()
        });

    builder = if tls {
        builder
            .use_preconfigured_tls(super::utls::base_tls_config())
            .http2_prior_knowledge()
    } else {
        builder.http2_prior_knowledge()
    };

    if let Some(proxy) = proxy_for(settings) {
        let proxy =
            reqwest::Proxy::all(proxy).map_err(|e| TransportError::Build(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    let client = builder
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))?;
    Ok(Arc::new(Http2Transport { client }))
}
