//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::notify::NotificationQueue;
use forum_core::listing::ListingConfig;
use forum_core::ports::{ForumStore, TokenVerifier};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ForumStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub notifications: NotificationQueue,
    pub config: Arc<Config>,
    pub listing: ListingConfig,
}
