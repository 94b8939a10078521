//! Scripted ServerQuery endpoint for integration tests.
//!
//! Binds to an ephemeral port on 127.0.0.1, answers the handful of commands
//! the viewer sends, and records every command it receives.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const OK: &str = "error id=0 msg=ok";
const DRIP_LINES: usize = 50;
const DRIP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Script {
    pub banner: String,
    pub server_name: String,
    pub sid: u32,
    /// Escaped login name and password the server accepts.
    pub credentials: Option<(String, String)>,
    /// Raw `channellist` data line; empty means an empty result set.
    pub channels: String,
    /// Raw `clientlist -voice` data line.
    pub clients: String,
    /// Command verb that is read but never answered.
    pub stall_on: Option<String>,
    /// Command verb answered only after a slow trickle of notify lines.
    pub drip_on: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            banner: "TS3".to_string(),
            server_name: r"Test\sServer".to_string(),
            sid: 1,
            credentials: None,
            channels: [
                r"cid=1 pid=0 channel_order=0 channel_name=Lobby total_clients=3",
                r"cid=2 pid=0 channel_order=1 channel_name=Gaming total_clients=0",
                r"cid=3 pid=2 channel_order=0 channel_name=Squad\sA total_clients=0",
            ]
            .join("|"),
            clients: [
                r"clid=101 cid=1 client_database_id=3 client_nickname=Alice client_type=0 client_input_muted=0 client_output_muted=0",
                r"clid=102 cid=1 client_database_id=4 client_nickname=Bob client_type=0 client_input_muted=1 client_output_muted=0",
                r"clid=1 cid=1 client_database_id=1 client_nickname=serveradmin\sfrom\s127.0.0.1:51234 client_type=1 client_input_muted=0 client_output_muted=0",
            ]
            .join("|"),
            stall_on: None,
            drip_on: None,
        }
    }
}

pub struct FakeQueryServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeQueryServer {
    pub async fn spawn(script: Script) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let accepted = accepted.clone();
            let commands = commands.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let script = script.clone();
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        let _ = serve(stream, script, commands).await;
                    });
                }
            })
        };

        Ok(Self {
            addr,
            accepted,
            commands,
            task,
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Poll until `command` has been received, giving up after a second.
    pub async fn saw_command(&self, command: &str) -> bool {
        for _ in 0..100 {
            if self.commands().iter().any(|c| c == command) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for FakeQueryServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn serve(
    stream: TcpStream,
    script: Script,
    commands: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let greeting = format!(
        "{}\n\rWelcome to the TeamSpeak 3 ServerQuery interface, type \"help\" for a list of commands.\n\r",
        script.banner
    );
    write.write_all(greeting.as_bytes()).await?;

    while let Some(line) = lines.next_line().await? {
        commands.lock().unwrap().push(line.clone());
        let verb = line.split(' ').next().unwrap_or_default();

        if script.stall_on.as_deref() == Some(verb) {
            continue;
        }
        if script.drip_on.as_deref() == Some(verb) {
            for i in 0..DRIP_LINES {
                let notify = format!("notifytextmessage targetmode=3 msg=tick{i} invokerid=0\n\r");
                write.write_all(notify.as_bytes()).await?;
                tokio::time::sleep(DRIP_INTERVAL).await;
            }
        }

        let reply = match verb {
            "login" => match &script.credentials {
                Some((user, pass))
                    if line
                        == format!(
                            "login client_login_name={user} client_login_password={pass}"
                        ) =>
                {
                    OK.to_string()
                }
                _ => r"error id=520 msg=invalid\sloginname\sor\spassword".to_string(),
            },
            "use" => {
                if line == format!("use sid={}", script.sid) {
                    OK.to_string()
                } else {
                    r"error id=1024 msg=invalid\sserverID".to_string()
                }
            }
            "serverinfo" => format!(
                "virtualserver_name={} virtualserver_port=9987 virtualserver_maxclients=32\n\r{OK}",
                script.server_name
            ),
            "channellist" => data_reply(&script.channels),
            "clientlist" => format!(
                "notifycliententerview cfid=0 ctid=1 reasonid=0 clid=9\n\r{}",
                data_reply(&script.clients)
            ),
            "quit" => {
                write.write_all(format!("{OK}\n\r").as_bytes()).await?;
                break;
            }
            _ => r"error id=256 msg=command\snot\sfound".to_string(),
        };
        write.write_all(format!("{reply}\n\r").as_bytes()).await?;
    }
    Ok(())
}

fn data_reply(data: &str) -> String {
    if data.is_empty() {
        r"error id=1281 msg=database\sempty\sresult\sset".to_string()
    } else {
        format!("{data}\n\r{OK}")
    }
}
