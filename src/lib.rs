//! Read-only viewer for ServerQuery-speaking voice servers.
//!
//! Each request opens a short-lived query session, pulls the flat channel and
//! client lists, and turns them into a channel tree. Several configured
//! servers can be summarized at once; unreachable ones are reported inline.

pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod query;
pub mod service;
pub mod state;
pub mod status;
pub mod tree;

pub use config::{Config, ServerConfig};
pub use error::{ConfigError, FetchError, FetchResult, RequestError};
pub use provider::{DummyProvider, OverviewProvider, ServerQueryProvider};
pub use service::Service;
pub use state::AppState;
