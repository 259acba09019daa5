//! Scenario 3 (`spec.md` §8): a full OPAQUE registration + login against
//! a real (in-process) server side of the PAKE, driven end to end
//! through `Client::initial`, plus the registration-race case where the
//! controller asks for `ReRegister` before the client's own
//! registration has completed.

use agentlink::message::{OpaqueStep, Payload};
use agentlink::transform::{self, TransformStage};
use agentlink::{Client, Config, Message};
use opaque_ke::{
    CipherSuite, CredentialFinalization, CredentialRequest, RegistrationRequest,
    RegistrationUpload, ServerLogin, ServerLoginStartParameters, ServerRegistration, ServerSetup,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

// Mirrors the private cipher suite declared in `src/auth/opaque.rs` —
// the server side of a PAKE exchange needs the same type parameters as
// the client, and this crate does not expose its internal one.
struct ServerCipherSuite;
impl CipherSuite for ServerCipherSuite {
    type OprfCs = opaque_ke::Ristretto255;
    type KeGroup = opaque_ke::Ristretto255;
    type KeyExchange = opaque_ke::key_exchange::tripledh::TripleDh;
    type Ksf = opaque_ke::ksf::Identity;
}

#[derive(Default)]
struct ServerState {
    setup: Option<ServerSetup<ServerCipherSuite>>,
    password_file: Option<ServerRegistration<ServerCipherSuite>>,
    pending_login: Option<ServerLogin<ServerCipherSuite>>,
    /// Available the moment `ServerLogin::start` runs — a SIGMA-style
    /// AKE derives both sides' session key before the client's
    /// confirmation message arrives. The client adopts this same key as
    /// its outer pipeline secret before sending `AuthComplete`, so the
    /// mock has to be ready to decode that last frame under it instead
    /// of the bootstrap key.
    session_key: Option<Vec<u8>>,
}

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
        auth_package: "opaque".into(),
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

/// Answer one OPAQUE step as the server, given the wire-decoded
/// inbound `Message` and the bootstrap key used to frame replies
/// before the session secret exists.
fn server_step(state: &Mutex<ServerState>, agent_id: Uuid, inbound: &Message) -> Message {
    let mut state = state.lock().unwrap();
    let credential_id = agent_id.as_bytes().to_vec();

    match &inbound.payload {
        Payload::Opaque(OpaqueStep::RegInit(bytes)) => {
            let setup = state
                .setup
                .get_or_insert_with(|| ServerSetup::<ServerCipherSuite>::new(&mut OsRng));
            let request = RegistrationRequest::<ServerCipherSuite>::deserialize(bytes).unwrap();
            let result =
                ServerRegistration::<ServerCipherSuite>::start(setup, request, &credential_id)
                    .unwrap();
            Message::new(
                agent_id,
                Payload::Opaque(OpaqueStep::RegInit(result.message.serialize().to_vec())),
            )
        }
        Payload::Opaque(OpaqueStep::RegComplete(bytes)) => {
            let upload = RegistrationUpload::<ServerCipherSuite>::deserialize(bytes).unwrap();
            state.password_file = Some(ServerRegistration::finish(upload));
            Message::new(agent_id, Payload::Opaque(OpaqueStep::RegComplete(Vec::new())))
        }
        Payload::Opaque(OpaqueStep::AuthInit(bytes)) => {
            let setup = state.setup.as_ref().expect("registered before login");
            let password_file = state.password_file.clone();
            let request = CredentialRequest::<ServerCipherSuite>::deserialize(bytes).unwrap();
            let result = ServerLogin::start(
                &mut OsRng,
                setup,
                password_file,
                request,
                &credential_id,
                ServerLoginStartParameters::default(),
            )
            .unwrap();
            state.session_key = Some(result.session_key.to_vec());
            state.pending_login = Some(result.state);
            Message::new(
                agent_id,
                Payload::Opaque(OpaqueStep::AuthInit(result.message.serialize().to_vec())),
            )
        }
        Payload::Opaque(OpaqueStep::AuthComplete(bytes)) => {
            let login = state.pending_login.take().expect("login started");
            let finalization = CredentialFinalization::<ServerCipherSuite>::deserialize(bytes).unwrap();
            let _ = login.finish(finalization).unwrap();
            Message::new(agent_id, Payload::Opaque(OpaqueStep::AuthComplete(Vec::new())))
        }
        other => panic!("unexpected handshake payload from agent: {other:?}"),
    }
}

#[test]
fn opaque_handshake_completes_against_a_real_server_side() {
    init_logging();
    let psk = "opaque-integration-psk";
    let pipeline = vec![TransformStage::parse("jwe").unwrap()];
    let bootstrap_key = Sha256::digest(psk.as_bytes()).to_vec();
    let state: Arc<Mutex<ServerState>> = Arc::new(Mutex::new(ServerState::default()));

    let base = {
        let state = Arc::clone(&state);
        let pipeline = pipeline.clone();
        let bootstrap = bootstrap_key.clone();
        spawn_mock_controller(move |request| {
            let body = read_body(request);
            // The client adopts the freshly-derived session key as its
            // outer pipeline secret as soon as the handshake is done,
            // *before* sending the final AuthComplete frame, so that one
            // request decodes only under the session key. Echo whichever
            // key actually worked back as the reply's key — that always
            // matches what the client expects to decode its own reply
            // with on this same round trip.
            let session_key = state.lock().unwrap().session_key.clone();
            let (incoming, used_key) = match transform::deconstruct(&pipeline, body.clone(), &bootstrap) {
                Ok(m) => (m, bootstrap.clone()),
                Err(_) => match &session_key {
                    Some(k) => (
                        transform::deconstruct(&pipeline, body, k)
                            .expect("decodable under bootstrap or session key"),
                        k.clone(),
                    ),
                    None => panic!("frame decodes under neither the bootstrap nor a session key"),
                },
            };
            let reply = server_step(&state, incoming.id, &incoming);
            let wire = transform::construct(&pipeline, reply, &used_key).unwrap();
            rouille::Response::from_data("application/octet-stream; charset=utf-8", wire)
        })
    };

    let client = Client::new(&base_config(base, psk)).unwrap();
    client.initial().unwrap();
    assert!(client.authenticated());
}

/// Scenario 3: the controller asks for `ReRegister` before the client's
/// registration has actually finished. The client must exit the
/// handshake loop cleanly rather than wipe state mid-flight.
#[test]
fn registration_race_exits_cleanly_instead_of_looping() {
    init_logging();
    let psk = "opaque-race-psk";
    let pipeline = vec![TransformStage::parse("jwe").unwrap()];
    let bootstrap_key = Sha256::digest(psk.as_bytes()).to_vec();

    let base = {
        let pipeline = pipeline.clone();
        let key = bootstrap_key.clone();
        spawn_mock_controller(move |request| {
            let body = read_body(request);
            let incoming = match transform::deconstruct(&pipeline, body, &key) {
                Ok(m) => m,
                Err(_) => return rouille::Response::empty_400(),
            };
            // Regardless of what the agent sent for its first message,
            // answer with a race: "start over" before registration could
            // possibly have completed.
            let reply = Message::new(incoming.id, Payload::Opaque(OpaqueStep::ReRegister));
            let wire = transform::construct(&pipeline, reply, &key).unwrap();
            rouille::Response::from_data("application/octet-stream; charset=utf-8", wire)
        })
    };

    let client = Client::new(&base_config(base, psk)).unwrap();
    client.initial().unwrap();
    assert!(!client.authenticated());
}
