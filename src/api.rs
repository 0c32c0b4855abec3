//! HTTP API: the chat service's webhook plus a health probe

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState<S, T> {
    pub runtime: Arc<RuntimeManager<S, T>>,
    /// Bot token expected as the last webhook path segment
    pub webhook_token: Arc<str>,
}

impl<S, T> AppState<S, T> {
    pub fn new(runtime: Arc<RuntimeManager<S, T>>, webhook_token: &str) -> Self {
        Self {
            runtime,
            webhook_token: Arc::from(webhook_token),
        }
    }
}

impl<S, T> Clone for AppState<S, T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            webhook_token: self.webhook_token.clone(),
        }
    }
}
