//! Overview lookups and the multi-server summary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, ServerConfig};
use crate::error::{FetchResult, RequestError};
use crate::models::{ServerInfo, ServerOverview, ServersOverview};
use crate::provider::{DummyProvider, OverviewProvider, ServerQueryProvider};
use crate::query::DEFAULT_VIRTUAL_SERVER;
use crate::tree::{count_channels, count_clients};

pub struct Service {
    default_provider: Arc<dyn OverviewProvider>,
    servers: BTreeMap<String, ServerConfig>,
    query_timeout: Duration,
}

impl Service {
    pub fn new(
        default_provider: Arc<dyn OverviewProvider>,
        servers: BTreeMap<String, ServerConfig>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            default_provider,
            servers,
            query_timeout,
        }
    }

    /// The default server is live when configured, demo data otherwise.
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.query_timeout();
        let default_provider: Arc<dyn OverviewProvider> = match config
            .default_server
            .as_deref()
            .and_then(|name| config.server(name))
        {
            Some(server) => Arc::new(ServerQueryProvider::from_config(server, timeout)),
            None => Arc::new(DummyProvider::new()),
        };
        Self::new(default_provider, config.servers.clone(), timeout)
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub async fn overview(&self, cancel: &CancellationToken) -> FetchResult<ServerOverview> {
        self.default_provider.fetch_overview(cancel).await
    }

    pub async fn overview_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<ServerOverview> {
        let server = self
            .servers
            .get(name)
            .ok_or_else(|| RequestError::UnknownServer(name.to_string()))?;
        ServerQueryProvider::from_config(server, self.query_timeout)
            .fetch_overview(cancel)
            .await
    }

    /// Fetch an arbitrary, unconfigured server. An empty port means the default.
    pub async fn overview_by_address(
        &self,
        host: &str,
        port: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<ServerOverview> {
        let host = host.trim();
        if host.is_empty() {
            return Err(RequestError::EmptyHost.into());
        }
        let port = parse_port(port)?;
        ServerQueryProvider::new(host, port, DEFAULT_VIRTUAL_SERVER)
            .with_timeout(self.query_timeout)
            .fetch_overview(cancel)
            .await
    }

    pub async fn aggregate(&self, cancel: &CancellationToken) -> ServersOverview {
        aggregate(&self.servers, self.query_timeout, cancel).await
    }
}

/// Parse a caller-supplied port. Empty text yields 0, meaning the default port.
pub fn parse_port(text: &str) -> Result<u16, RequestError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    let port: i64 = text
        .parse()
        .map_err(|_| RequestError::InvalidPort(text.to_string()))?;
    match u16::try_from(port) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(RequestError::PortOutOfRange),
    }
}

/// Summarize every configured server. Never fails: unreachable servers are
/// reported inline.
pub async fn aggregate(
    servers: &BTreeMap<String, ServerConfig>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ServersOverview {
    let providers = servers
        .iter()
        .map(|(name, server)| {
            let provider: Box<dyn OverviewProvider> =
                Box::new(ServerQueryProvider::from_config(server, timeout));
            (name.clone(), provider)
        })
        .collect();
    aggregate_providers(providers, cancel).await
}

/// Fetch all providers concurrently and summarize each result.
pub async fn aggregate_providers(
    providers: Vec<(String, Box<dyn OverviewProvider>)>,
    cancel: &CancellationToken,
) -> ServersOverview {
    let fetches = providers.into_iter().map(|(name, provider)| async move {
        let result = provider.fetch_overview(cancel).await;
        if let Err(e) = &result {
            tracing::warn!(code = e.error_code(), "Server {} unavailable: {}", name, e);
        }
        summarize(name, result)
    });

    // Tags the interleaved per-server log lines of one pass.
    let span = tracing::info_span!("aggregate", pass = %Uuid::new_v4());
    let servers = join_all(fetches).instrument(span).await;
    let overview = ServersOverview {
        servers,
        fetched_at: Utc::now(),
    };
    tracing::info!(
        "Aggregated {} servers ({} online)",
        overview.servers.len(),
        overview.online_count()
    );
    overview
}

pub fn summarize(name: String, result: FetchResult<ServerOverview>) -> ServerInfo {
    match result {
        Ok(overview) => ServerInfo {
            name,
            clients_online: count_clients(&overview.channels),
            total_channels: count_channels(&overview.channels),
            server_name: Some(overview.server_name),
            online: true,
            error: String::new(),
        },
        Err(e) => ServerInfo {
            name,
            server_name: None,
            online: false,
            clients_online: 0,
            total_channels: 0,
            error: e.to_string(),
        },
    }
}
