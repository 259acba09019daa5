//! Process-wide client registry (`spec.md` §4.8, Component G).
//!
//! A single process-wide `lazy_static!` `Mutex` slot holding
//! `Option<Arc<Client>>`. The client is written once, at construction,
//! and read thereafter by whatever external subsystem needs to reach
//! the active session without having it threaded through as an
//! argument.

use crate::client::Client;
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref ACTIVE: Mutex<Option<Arc<Client>>> = Mutex::new(None);
}

pub fn set_active(client: Arc<Client>) {
    *ACTIVE.lock().unwrap() = Some(client);
}

pub fn active() -> Option<Arc<Client>> {
    ACTIVE.lock().unwrap().clone()
}
