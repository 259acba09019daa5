//! HTTP/3 engine, built on `quinn` + `h3`/`h3-quinn`.
//!
//! `RoundTripper` is a synchronous, blocking trait; quinn and h3 are
//! not. This engine owns a small single-threaded tokio runtime purely
//! as a bridge — every call blocks on it, matching the "the caller
//! already decided this round-trip should block" contract the rest of
//! the transport layer relies on.

use super::{proxy_for, RoundTripper, Response, TransportSettings, REQUEST_TIMEOUT};
use crate::error::TransportError;
use bytes::{Buf, Bytes};
use quinn::{ClientConfig as QuinnClientConfig, Endpoint, TransportConfig};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

/// Substrings that identify a peer that has stopped speaking HTTP/3 and
/// needs the transport rebuilt on a fallback protocol.
const PROTOCOL_REJECTION_MARKERS: [&str; 3] = [
    "application error 0x0",
    "handshake did not complete in time",
    "no recent network activity",
];

pub fn looks_like_protocol_rejection(err: &str) -> bool {
    let lower = err.to_ascii_lowercase();
    PROTOCOL_REJECTION_MARKERS.iter().any(|m| lower.contains(m))
}

pub struct Http3Transport {
    runtime: tokio::runtime::Runtime,
    endpoint: Endpoint,
}

impl RoundTripper for Http3Transport {
    fn round_trip(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Response, TransportError> {
        let url = url.to_string();
        let headers = headers.to_vec();
        let endpoint = self.endpoint.clone();
        self.runtime
            .block_on(async move { do_round_trip(endpoint, &url, &headers, body).await })
    }
}

async fn do_round_trip(
    endpoint: Endpoint,
    url: &str,
    headers: &[(String, String)],
    body: Vec<u8>,
) -> Result<Response, TransportError> {
    let parsed = url::Url::parse(url).map_err(|e| TransportError::BadProtocol(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::BadProtocol("url has no host".into()))?
        .to_string();
    let port = parsed.port().unwrap_or(443);
    let addr = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Io(e.to_string()))?
        .next()
        .ok_or_else(|| TransportError::Io(format!("could not resolve {host}")))?;

    let connecting = endpoint
        .connect(addr, &host)
        .map_err(|e| TransportError::Io(e.to_string()))?;
    let connection = tokio::time::timeout(REQUEST_TIMEOUT, connecting)
        .await
        .map_err(|_| TransportError::Io("quic handshake timed out".into()))?
        .map_err(|e| TransportError::Io(e.to_string()))?;

    let quinn_conn = h3_quinn::Connection::new(connection);
    let (mut driver, mut send_request) = h3::client::new(quinn_conn)
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;

    let mut req = http::Request::builder().method("POST").uri(url);
    for (k, v) in headers {
        req = req.header(k.as_str(), v.as_str());
    }
    let req = req
        .body(())
        .map_err(|e| TransportError::Build(e.to_string()))?;

    let mut stream = send_request
        .send_request(req)
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    stream
        .send_data(Bytes::from(body))
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    stream
        .finish()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;

    let resp = stream
        .recv_response()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    let status = resp.status().as_u16();
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

    let mut body = Vec::new();
    while let Some(chunk) = stream
        .recv_data()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?
    {
        body.extend_from_slice(chunk.chunk());
    }

    tokio::spawn(async move {
        let _ = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
    });

    Ok(Response {
        status,
        headers,
        body,
    })
}

pub fn build(settings: &TransportSettings) -> Result<Arc<dyn RoundTripper>, TransportError> {
    if proxy_for(settings).is_some() {
        return Err(TransportError::Build(
            "http3 transport does not support proxying".into(),
        ));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))?;

    let mut tls_config = super::utls::base_tls_config();
    tls_config.alpn_protocols = vec![b"h3".to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
        .map_err(|e| TransportError::Build(e.to_string()))?;
    let mut client_config = QuinnClientConfig::new(Arc::new(quic_crypto));

    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(
        REQUEST_TIMEOUT.try_into().expect("30s fits in a VarInt"),
    ));
    transport.keep_alive_interval(Some(Duration::from_secs(30)));
    client_config.transport_config(Arc::new(transport));

    let mut endpoint = Endpoint::client("0.0.0.0:0".parse().unwrap())
        .map_err(|e| TransportError::Build(e.to_string()))?;
    endpoint.set_default_client_config(client_config);

    Ok(Arc::new(Http3Transport { runtime, endpoint }))
}
