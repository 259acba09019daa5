//! Transform pipeline, transport selection, and auth handshake for an
//! HTTP-family agent-to-controller messaging client.
//!
//! Wiring, leaves first: [`message`] and [`config`] define the data this
//! crate moves around; [`transform`] and [`transport`] turn a
//! [`message::Message`] into bytes on the wire and back, over whichever
//! protocol [`config::Protocol`] names; [`jwt`] mints the bootstrap
//! bearer token and [`auth`] drives the post-bootstrap handshake;
//! [`client`] ties all of the above into one mutex-guarded session, and
//! [`registry`] is how the rest of a host process reaches it.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod jwt;
pub mod message;
pub mod registry;
pub mod transform;
pub mod transport;

pub use client::{Client, SettingValue};
pub use config::Config;
pub use error::Error;
pub use message::Message;
