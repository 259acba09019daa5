//! HTTP/1.1 engine (plain and TLS), built on `ureq`.

use super::{proxy_for, RoundTripper, Response, TransportSettings, REQUEST_TIMEOUT};
use crate::error::TransportError;
use std::io::Read;
use std::sync::Arc;

const MAX_IDLE_CONNECTIONS: usize = 10;

pub struct Http1Transport {
    agent: ureq::Agent,
}

impl RoundTripper for Http1Transport {
    fn round_trip(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Response, TransportError> {
        let mut req = self.agent.post(url);
        for (k, v) in headers {
            req = req.set(k, v);
        }
        let result = req.send_bytes(&body);
        let resp = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(t)) => return Err(TransportError::Io(t.to_string())),
        };

        let status = resp.status();
        let headers = resp
            .headers_names()
            .into_iter()
            .filter_map(|name| resp.header(&name).map(|v| (name, v.to_string())))
            .collect();
        let mut body = Vec::new();
        resp.into_reader()
            .read_to_end(&mut body)
            .map_err(|e| TransportError::Io(e.to_string()))?;

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
    let mut builder = ureq::AgentBuilder::new()
        .timeout(REQUEST_TIMEOUT)
        .max_idle_connections(MAX_IDLE_CONNECTIONS)
        .max_idle_connections_per_host(MAX_IDLE_CONNECTIONS);

    if tls {
        builder = builder.tls_config(Arc::new(super::utls::base_tls_config()));
    }

    if let Some(proxy) = proxy_for(settings) {
        let proxy = ureq::Proxy::new(&proxy).map_err(|e| TransportError::Build(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    Ok(Arc::new(Http1Transport {
        agent: builder.build(),
    }))
}
