//! Sources of server overviews.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::error::{FetchError, FetchResult};
use crate::models::{Channel, Client, ServerOverview};
use crate::query::{QueryClient, DEFAULT_QUERY_PORT, DEFAULT_TIMEOUT, DEFAULT_VIRTUAL_SERVER};
use crate::tree::{build_tree, ROOT_PARENT_ID};

/// Anything that can produce a fresh overview of one server.
#[async_trait]
pub trait OverviewProvider: Send + Sync {
    async fn fetch_overview(&self, cancel: &CancellationToken) -> FetchResult<ServerOverview>;
}

/// Static demo data, used when no default server is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyProvider;

impl DummyProvider {
    pub fn new() -> Self {
        Self
    }
}

fn demo_client(id: u64, nickname: &str, is_muted: bool, is_deaf: bool) -> Client {
    Client {
        id,
        nickname: nickname.to_string(),
        is_muted,
        is_deaf,
    }
}

fn demo_channel(
    id: u64,
    name: &str,
    parent_id: u64,
    clients: Vec<Client>,
    children: Vec<Channel>,
) -> Channel {
    Channel {
        id,
        name: name.to_string(),
        parent_id,
        clients,
        children,
    }
}

#[async_trait]
impl OverviewProvider for DummyProvider {
    async fn fetch_overview(&self, _cancel: &CancellationToken) -> FetchResult<ServerOverview> {
        let squad = demo_channel(
            3,
            "Squad A",
            2,
            vec![
                demo_client(104, "Diana", false, true),
                demo_client(105, "Eve", true, true),
            ],
            vec![],
        );

        Ok(ServerOverview {
            server_name: "My TeamSpeak Server".to_string(),
            channels: vec![
                demo_channel(
                    1,
                    "Lobby",
                    ROOT_PARENT_ID,
                    vec![
                        demo_client(101, "Alice", false, false),
                        demo_client(102, "Bob", true, false),
                    ],
                    vec![],
                ),
                demo_channel(
                    2,
                    "Gaming",
                    ROOT_PARENT_ID,
                    vec![demo_client(103, "Charlie", false, false)],
                    vec![squad],
                ),
                demo_channel(4, "AFK", ROOT_PARENT_ID, vec![], vec![]),
            ],
            fetched_at: Utc::now(),
        })
    }
}

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// Live provider talking to one ServerQuery endpoint.
#[derive(Clone)]
pub struct ServerQueryProvider {
    host: String,
    port: u16,
    sid: u32,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl ServerQueryProvider {
    /// Port 0 and sid 0 select the protocol defaults.
    pub fn new(host: impl Into<String>, port: u16, sid: u32) -> Self {
        Self {
            host: host.into(),
            port: if port == 0 { DEFAULT_QUERY_PORT } else { port },
            sid: if sid == 0 { DEFAULT_VIRTUAL_SERVER } else { sid },
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(server: &ServerConfig, timeout: Duration) -> Self {
        let mut provider = Self::new(&server.host, server.port, server.sid).with_timeout(timeout);
        if let Some(username) = server.username.as_deref().filter(|u| !u.is_empty()) {
            provider = provider.with_credentials(
                username,
                server.password.as_deref().unwrap_or_default(),
            );
        }
        provider
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn sid(&self) -> u32 {
        self.sid
    }

    async fn query(&self, client: &mut QueryClient) -> FetchResult<ServerOverview> {
        if let Some(creds) = &self.credentials {
            client.login(&creds.username, &creds.password).await?;
        }
        client.select_virtual_server(self.sid).await?;

        let server_name = client.fetch_server_name().await?;
        let channels = client.fetch_channels().await?;
        let clients = client.fetch_clients().await?;
        tracing::debug!(
            "Fetched {} channels and {} clients from {}",
            channels.len(),
            clients.len(),
            server_name
        );

        Ok(ServerOverview {
            server_name,
            channels: build_tree(&channels, &clients, ROOT_PARENT_ID),
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl OverviewProvider for ServerQueryProvider {
    async fn fetch_overview(&self, cancel: &CancellationToken) -> FetchResult<ServerOverview> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let addr = self.address();
        let span = tracing::info_span!("fetch_overview", addr = %addr, sid = self.sid);
        async {
            let mut client = QueryClient::connect(&addr, self.timeout, cancel.clone()).await?;
            let result = self.query(&mut client).await;
            client.close().await;
            result
        }
        .instrument(span)
        .await
    }
}
