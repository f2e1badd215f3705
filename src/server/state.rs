use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::discovery::DiscoveryService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub discovery: Arc<DiscoveryService>,
    pub api_key: Arc<str>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(discovery: DiscoveryService, api_key: impl Into<String>) -> Self {
        Self {
            discovery: Arc::new(discovery),
            api_key: Arc::from(api_key.into()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Share a server-wide shutdown token with request handlers
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Token for one request, cancelled when the server shuts down
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Check a presented API key. An empty configured key matches nothing.
    pub fn accepts_key(&self, presented: Option<&str>) -> bool {
        !self.api_key.is_empty() && presented == Some(self.api_key.as_ref())
    }
}
