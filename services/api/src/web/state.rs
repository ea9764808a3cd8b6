//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request session.

use crate::config::Config;
use lms_core::policy::Actor;
use lms_core::ports::{DatabaseService, DocumentStore, MailService};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub documents: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn MailService>,
    pub config: Arc<Config>,
}

//=========================================================================================
// Session (Specific to One Authenticated Request)
//=========================================================================================

/// Inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct Session {
    /// The auth session id from the `session` cookie.
    pub id: String,
    pub actor: Actor,
}
