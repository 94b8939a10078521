use crate::service::Service;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Top-level application state shared across all handlers.
///
/// Holds no fetched data: every request performs its own fetch.
pub struct AppState {
    pub start_time: Instant,
    pub service: Service,
    /// Cancelled on shutdown; each request fetches under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: Service, shutdown: CancellationToken) -> Self {
        Self {
            start_time: Instant::now(),
            service,
            shutdown,
        }
    }

    /// Token for one request's fetches. It is cancelled on shutdown, or
    /// when the returned guard drops with the handler future.
    pub fn request_token(&self) -> (CancellationToken, DropGuard) {
        let token = self.shutdown.child_token();
        (token.clone(), token.drop_guard())
    }
}
