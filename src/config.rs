//! Configuration loading.
//!
//! The file is TOML, located via `TS_CONFIG_FILE` (default `config.toml`).
//! A missing file is not an error: the viewer starts with defaults and
//! serves demo data.
//!
//! ```toml
//! http_addr = "0.0.0.0:8080"
//! log_level = "info"
//! default_server = "main"
//!
//! [servers.main]
//! host = "ts.example.com"
//! port = 10011
//! username = "serveradmin"
//! password = "secret"
//! sid = 1
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::query::{DEFAULT_QUERY_PORT, DEFAULT_VIRTUAL_SERVER};

const DEFAULT_CONFIG_FILE: &str = "config.toml";

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_query_port() -> u16 {
    DEFAULT_QUERY_PORT
}

fn default_sid() -> u32 {
    DEFAULT_VIRTUAL_SERVER
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-connection ceiling for ServerQuery sessions.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Server shown on the overview route; demo data when unset.
    pub default_server: Option<String>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

/// One remote ServerQuery endpoint.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_query_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Virtual server id.
    #[serde(default = "default_sid")]
    pub sid: u32,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sid", &self.sid)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            log_level: default_log_level(),
            query_timeout_secs: default_query_timeout_secs(),
            default_server: None,
            servers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from `TS_CONFIG_FILE`, then apply `HTTP_ADDR` / `LOG_LEVEL`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("TS_CONFIG_FILE")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let mut config = Self::load_from(&path)?;
        if let Some(addr) = env_override("HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(level) = env_override("LOG_LEVEL") {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file. A missing file yields the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.query_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(name) = &self.default_server {
            if !self.servers.contains_key(name) {
                return Err(ConfigError::UnknownDefaultServer(name.clone()));
            }
        }
        Ok(())
    }

    /// Listen address. Accepts the `:8080` shorthand for all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = match self.http_addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.http_addr.clone(),
        };
        addr.parse()
            .map_err(|_| ConfigError::HttpAddr(self.http_addr.clone()))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }
}

/// Summary without credentials.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "http_addr={}, log_level={}, servers={}",
            self.http_addr,
            self.log_level,
            self.servers.len()
        )
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
        assert!(config.servers.is_empty());
        assert!(config.default_server.is_none());
    }

    #[test]
    fn server_entries_get_protocol_defaults() {
        let config = Config::parse(
            r#"
            default_server = "main"

            [servers.main]
            host = "ts.example.com"
            username = "serveradmin"
            password = "hunter2"

            [servers.backup]
            host = "10.0.0.2"
            port = 10022
            sid = 4
            "#,
        )
        .unwrap();

        let main = config.server("main").unwrap();
        assert_eq!(main.port, 10011);
        assert_eq!(main.sid, 1);
        assert_eq!(main.username.as_deref(), Some("serveradmin"));

        let backup = config.server("backup").unwrap();
        assert_eq!(backup.port, 10022);
        assert_eq!(backup.sid, 4);
        assert!(backup.username.is_none());
    }

    #[test]
    fn out_of_range_port_fails_to_parse() {
        let err = Config::parse(
            r#"
            [servers.bad]
            host = "localhost"
            port = 70000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn default_server_must_exist() {
        let err = Config::parse(r#"default_server = "missing""#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDefaultServer(name) if name == "missing"));
    }

    #[test]
    fn zero_query_timeout_is_rejected() {
        let err = Config::parse("query_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout));

        let config = Config::parse("query_timeout_secs = 3").unwrap();
        assert_eq!(config.query_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn http_addr_shorthand() {
        let config = Config::parse(r#"http_addr = ":9090""#).unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 9090);

        assert!(matches!(
            Config::parse(r#"http_addr = "not an address""#),
            Err(ConfigError::HttpAddr(_))
        ));
    }

    #[test]
    fn credentials_stay_out_of_output() {
        let config = Config::parse(
            r#"
            [servers.main]
            host = "ts.example.com"
            password = "hunter2"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.to_string(),
            "http_addr=0.0.0.0:8080, log_level=info, servers=1"
        );
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from("/nonexistent/ts-viewer/config.toml").unwrap();
        assert!(config.servers.is_empty());
    }
}
