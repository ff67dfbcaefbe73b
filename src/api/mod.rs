//! Submitter-facing HTTP API.

pub mod auth;
pub mod models;
pub mod rest;

use crate::scheduler::Scheduler;
use std::sync::Arc;

pub use rest::{router, serve};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub keys: Arc<auth::AuthKeys>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, jwt_secret: &str) -> Self {
        Self {
            scheduler,
            keys: Arc::new(auth::AuthKeys::new(jwt_secret)),
        }
    }
}
