use chrono::{DateTime, Utc};
use serde::Serialize;

// --- Wire records (flat, as reported by the query interface) ---

/// Client type the query interface uses for its own connections.
pub const CLIENT_TYPE_QUERY: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: u64,
    pub name: String,
    pub parent_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: u64,
    pub nickname: String,
    pub channel_id: u64,
    pub client_type: u32,
    /// `None` when the server did not report voice flags.
    pub input_muted: Option<bool>,
    pub output_muted: Option<bool>,
}

impl ClientRecord {
    pub fn is_query_client(&self) -> bool {
        self.client_type == CLIENT_TYPE_QUERY
    }
}

// --- Overview models ---

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: u64,
    pub nickname: String,
    pub is_muted: bool,
    /// Output muted: the client cannot hear the channel.
    pub is_deaf: bool,
}

impl From<&ClientRecord> for Client {
    fn from(record: &ClientRecord) -> Self {
        Self {
            id: record.id,
            nickname: record.nickname.clone(),
            is_muted: record.input_muted.unwrap_or(false),
            is_deaf: record.output_muted.unwrap_or(false),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub name: String,
    pub parent_id: u64,
    pub clients: Vec<Client>,
    pub children: Vec<Channel>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ServerOverview {
    pub server_name: String,
    pub channels: Vec<Channel>,
    pub fetched_at: DateTime<Utc>,
}

// --- Multi-server summary ---

#[derive(Debug, Serialize, Clone)]
pub struct ServerInfo {
    /// Name from the local configuration.
    pub name: String,
    /// Name reported by the server itself; absent when unreachable.
    pub server_name: Option<String>,
    pub online: bool,
    pub clients_online: usize,
    pub total_channels: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ServersOverview {
    pub servers: Vec<ServerInfo>,
    pub fetched_at: DateTime<Utc>,
}

impl ServersOverview {
    pub fn online_count(&self) -> usize {
        self.servers.iter().filter(|s| s.online).count()
    }
}

// --- HTTP-only models ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub configured_servers: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
