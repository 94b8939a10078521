//! Short-lived ServerQuery session used for a single overview fetch.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{
    self, is_notification, parse_records, parse_status, CodecError, FieldError, QueryCodec, Record,
    Status,
};
use crate::error::{FetchError, FetchResult};
use crate::models::{ChannelRecord, ClientRecord};

/// Standard ServerQuery port.
pub const DEFAULT_QUERY_PORT: u16 = 10011;
/// First virtual server.
pub const DEFAULT_VIRTUAL_SERVER: u32 = 1;
/// Ceiling for connecting and for each command exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const BANNER: &str = "TS3";
const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Failure inside a session, before it is attributed to a stage.
#[derive(Debug, Error)]
enum SessionError {
    #[error("request cancelled")]
    Cancelled,
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("connection closed by server")]
    Closed,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{0}")]
    Status(Status),
    #[error("{0}")]
    Field(#[from] FieldError),
}

impl SessionError {
    fn into_fetch(self, stage: impl FnOnce(String) -> FetchError) -> FetchError {
        match self {
            Self::Cancelled => FetchError::Cancelled,
            Self::Codec(e @ (CodecError::LineTooLong { .. } | CodecError::InvalidUtf8(_))) => {
                FetchError::Protocol(e.to_string())
            }
            other => stage(other.to_string()),
        }
    }
}

/// Race `fut` against cancellation and the timeout.
async fn bounded<F: Future>(
    cancel: &CancellationToken,
    limit: Duration,
    fut: F,
) -> Result<F::Output, SessionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        res = tokio::time::timeout(limit, fut) => res.map_err(|_| SessionError::TimedOut(limit)),
    }
}

pub struct QueryClient {
    framed: Framed<TcpStream, QueryCodec>,
    addr: String,
    timeout: Duration,
    cancel: CancellationToken,
}

impl QueryClient {
    /// Connect and consume the greeting. Nothing touches the network if
    /// `cancel` is already set.
    pub async fn connect(
        addr: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> FetchResult<Self> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let connect_err = |reason: String| FetchError::Connect {
            addr: addr.to_string(),
            reason,
        };

        let stream = bounded(&cancel, timeout, TcpStream::connect(addr))
            .await
            .map_err(|e| e.into_fetch(connect_err))?
            .map_err(|e| connect_err(e.to_string()))?;

        let mut client = Self {
            framed: Framed::new(stream, QueryCodec::new()),
            addr: addr.to_string(),
            timeout,
            cancel,
        };

        let cancel = client.cancel.clone();
        let banner = bounded(&cancel, timeout, client.read_greeting())
            .await
            .and_then(|greeting| greeting)
            .map_err(|e| e.into_fetch(connect_err))?;
        if banner != BANNER {
            return Err(connect_err(format!(
                "unexpected greeting {banner:?}, not a ServerQuery interface"
            )));
        }

        tracing::debug!("Connected to ServerQuery at {}", client.addr);
        Ok(client)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> FetchResult<()> {
        let cmd = format!(
            "login client_login_name={} client_login_password={}",
            codec::escape(username),
            codec::escape(password)
        );
        self.execute(cmd).await.map_err(|e| {
            e.into_fetch(|reason| {
                FetchError::Context(format!("failed to log in as {username}: {reason}"))
            })
        })?;
        Ok(())
    }

    pub async fn select_virtual_server(&mut self, sid: u32) -> FetchResult<()> {
        self.execute(format!("use sid={sid}")).await.map_err(|e| {
            e.into_fetch(|reason| {
                FetchError::Context(format!("failed to select virtual server {sid}: {reason}"))
            })
        })?;
        Ok(())
    }

    pub async fn fetch_server_name(&mut self) -> FetchResult<String> {
        const QUERY: &str = "server info";
        let records = self
            .execute("serverinfo".to_string())
            .await
            .map_err(|e| e.into_fetch(|r| FetchError::query(QUERY, r)))?;
        records
            .first()
            .and_then(|r| r.get("virtualserver_name"))
            .cloned()
            .ok_or_else(|| FetchError::query(QUERY, FieldError::Missing("virtualserver_name")))
    }

    pub async fn fetch_channels(&mut self) -> FetchResult<Vec<ChannelRecord>> {
        const QUERY: &str = "channel list";
        self.execute("channellist".to_string())
            .await
            .and_then(|records| collect_records(&records, codec::channel_record))
            .map_err(|e| e.into_fetch(|r| FetchError::query(QUERY, r)))
    }

    /// Online clients including voice flags.
    pub async fn fetch_clients(&mut self) -> FetchResult<Vec<ClientRecord>> {
        const QUERY: &str = "client list";
        self.execute("clientlist -voice".to_string())
            .await
            .and_then(|records| collect_records(&records, codec::client_record))
            .map_err(|e| e.into_fetch(|r| FetchError::query(QUERY, r)))
    }

    /// Say goodbye and drop the socket. Failures here are only logged.
    pub async fn close(mut self) {
        let quit = tokio::time::timeout(QUIT_TIMEOUT, self.framed.send("quit".to_string())).await;
        if let Ok(Err(e)) = quit {
            tracing::debug!("Sending quit to {} failed: {}", self.addr, e);
        }
        let mut stream = self.framed.into_inner();
        if let Err(e) = stream.shutdown().await {
            tracing::debug!("Closing connection to {} failed: {}", self.addr, e);
        }
    }

    /// Send one command and collect its data records up to the status line.
    /// The timeout covers the whole exchange, not each line.
    async fn execute(&mut self, command: String) -> Result<Vec<Record>, SessionError> {
        // Only the verb is logged; parameters may carry credentials.
        let verb = command.split(' ').next().unwrap_or_default().to_string();
        tracing::trace!("-> {}", verb);

        let cancel = self.cancel.clone();
        bounded(&cancel, self.timeout, self.exchange(command, &verb)).await?
    }

    async fn exchange(&mut self, command: String, verb: &str) -> Result<Vec<Record>, SessionError> {
        self.framed.send(command).await?;

        let mut records = Vec::new();
        loop {
            let line = self.read_line().await?;
            if is_notification(&line) {
                continue;
            }
            if let Some(status) = parse_status(&line) {
                tracing::trace!("<- {} {}", verb, status);
                if status.is_ok() || status.is_empty_result() {
                    return Ok(records);
                }
                return Err(SessionError::Status(status));
            }
            records.extend(parse_records(&line));
        }
    }

    /// Banner line followed by the welcome text, which is discarded.
    async fn read_greeting(&mut self) -> Result<String, SessionError> {
        let banner = self.read_line().await?;
        if banner == BANNER {
            self.read_line().await?;
        }
        Ok(banner)
    }

    async fn read_line(&mut self) -> Result<String, SessionError> {
        match self.framed.next().await {
            Some(line) => Ok(line?),
            None => Err(SessionError::Closed),
        }
    }
}

fn collect_records<T>(
    records: &[Record],
    convert: fn(&Record) -> Result<T, FieldError>,
) -> Result<Vec<T>, SessionError> {
    records
        .iter()
        .map(|r| convert(r).map_err(SessionError::from))
        .collect()
}
