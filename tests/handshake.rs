//! End-to-end scenarios against a real mock controller (`spec.md` §8
//! scenarios 1 and 2), using `rouille` to stand in for the controller
//! side of the wire protocol.

use agentlink::message::Payload;
use agentlink::transform::{self, TransformStage};
use agentlink::{Client, Config, Message};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

fn spawn_mock_controller<H>(handler: H) -> String
where
    H: Fn(&rouille::Request) -> rouille::Response + Send + Sync + 'static,
{
    let server = rouille::Server::new("127.0.0.1:0", handler).expect("bind mock controller");
    let addr = server.server_addr();
    thread::spawn(move || loop {
        server.poll();
        thread::sleep(Duration::from_millis(5));
    });
    format!("http://{addr}")
}

fn base_config(url: String, psk: &str) -> Config {
    Config {
        agent_id: Uuid::new_v4(),
        protocol: "http".into(),
        host: String::new(),
        headers: String::new(),
        url: vec![url],
        proxy: String::new(),
        user_agent: "agentlink-tests".into(),
        parrot: String::new(),
        psk: psk.into(),
        ja3: String::new(),
        padding: String::new(),
        auth_package: "none".into(),
        transformers: "jwe".into(),
    }
}

fn read_body(request: &rouille::Request) -> Vec<u8> {
    let mut body = Vec::new();
    request
        .data()
        .expect("request has a body")
        .read_to_end(&mut body)
        .unwrap();
    body
}

/// Scenario 1: `Initial()` succeeds, then a heartbeat `Send` round-trips
/// a real POST whose Bearer token decrypts under `SHA-256(PSK)`.
#[test]
fn handshake_then_heartbeat_round_trips_through_a_real_http_server() {
    init_logging();
    let psk = "integration-test-psk";
    let pipeline = vec![TransformStage::parse("jwe").unwrap()];
    let key = Sha256::digest(psk.as_bytes()).to_vec();

    let base = spawn_mock_controller(move |request| {
        let body = read_body(request);
        let incoming = transform::deconstruct(&pipeline, body, &key).expect("valid jwe frame");
        let reply = Message::new(incoming.id, Payload::Command(b"ack".to_vec()));
        let wire = transform::construct(&pipeline, reply, &key).unwrap();
        rouille::Response::from_data("application/octet-stream; charset=utf-8", wire)
    });

    let client = Client::new(&base_config(base, psk)).unwrap();
    client.initial().unwrap();

    let id = client.agent_id();
    let replies = client
        .send(Message::new(id, Payload::Command(b"heartbeat".to_vec())))
        .unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].payload, Payload::Command(b"ack".to_vec()));
}

/// Scenario 2: a 401 response is recovered locally — the send returns
/// no messages and the client's JWT is replaced, after which the next
/// Send succeeds.
#[test]
fn status_401_reminds_jwt_then_next_send_succeeds() {
    init_logging();
    let psk = "integration-test-psk";
    let pipeline = vec![TransformStage::parse("jwe").unwrap()];
    let key = Sha256::digest(psk.as_bytes()).to_vec();
    let calls = Arc::new(AtomicUsize::new(0));

    let base = {
        let calls = Arc::clone(&calls);
        let pipeline = pipeline.clone();
        let key = key.clone();
        spawn_mock_controller(move |request| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return rouille::Response::empty_400().with_status_code(401);
            }
            let body = read_body(request);
            let incoming = transform::deconstruct(&pipeline, body, &key).expect("valid jwe frame");
            let reply = Message::new(incoming.id, Payload::Command(b"ack".to_vec()));
            let wire = transform::construct(&pipeline, reply, &key).unwrap();
            rouille::Response::from_data("application/octet-stream; charset=utf-8", wire)
        })
    };

    let client = Client::new(&base_config(base, psk)).unwrap();
    let id = client.agent_id();

    let first = client.send(Message::empty(id)).unwrap();
    assert!(first.is_empty());

    let second = client.send(Message::empty(id)).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
