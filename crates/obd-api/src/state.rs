//! Application state for the gateway API

use std::sync::Arc;

use obd_session::Session;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    session: Arc<Session>,
}

impl AppState {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
