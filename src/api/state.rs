//! API shared state

use std::sync::Arc;

use crate::registry::ResourceRegistry;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ResourceRegistry>,

    /// Bearer token required on every route but health, if set
    pub auth_token: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth_token = (!token.is_empty()).then(|| Arc::from(token));
        self
    }
}
