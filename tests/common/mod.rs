//! Shared utilities for integration tests: a scripted chat backend and a
//! bridge bound to an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_bridge::config::BridgeConfig;
use chat_bridge::http::{AppState, HttpServer};
use chat_bridge::lifecycle::Shutdown;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// What the mock backend does in response to one inbound line.
pub enum Reply {
    Line(String),
    /// Bytes written verbatim, newline appended.
    Raw(Vec<u8>),
    After(Duration, String),
    Hangup,
}

/// How open connections are torn down from the server side.
#[derive(Clone, Copy)]
enum Teardown {
    /// Orderly close: the bridge sees EOF.
    Close,
    /// Zero linger, so the bridge sees a connection reset.
    Reset,
}

#[allow(deprecated)]
fn reset(stream: TcpStream) {
    let _ = stream.set_linger(Some(Duration::ZERO));
    drop(stream);
}

pub fn line(s: impl Into<String>) -> Reply {
    Reply::Line(s.into())
}

/// `type` value of a pipe-delimited line.
pub fn kind_of(line: &str) -> &str {
    field(line, "type").unwrap_or("")
}

/// First field with `key` in a pipe-delimited line.
pub fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split('|')
        .filter_map(|part| part.split_once(':'))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Accept every login and acknowledge every other command with its type.
pub fn accept_all(line: &str) -> Vec<Reply> {
    match kind_of(line) {
        "login" => vec![Reply::Line("type:login_success".into())],
        "logout" => vec![],
        kind => vec![Reply::Line(format!("type:ack|of:{}", kind))],
    }
}

type Script = dyn Fn(&str) -> Vec<Reply> + Send + Sync;

/// Line-oriented mock of the chat server.
pub struct ChatBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    hangup: broadcast::Sender<Teardown>,
}

impl ChatBackend {
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&str) -> Vec<Reply> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (hangup, _) = broadcast::channel(4);
        let script: Arc<Script> = Arc::new(script);

        let backend = Self {
            addr,
            connections: connections.clone(),
            received: received.clone(),
            hangup: hangup.clone(),
        };

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let received = received.clone();
                let mut hangup = hangup.subscribe();

                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    loop {
                        let next = tokio::select! {
                            teardown = hangup.recv() => Err(teardown),
                            next = lines.next_line() => Ok(next),
                        };
                        let next = match next {
                            Ok(next) => next,
                            Err(Ok(Teardown::Reset)) => {
                                let read = lines.into_inner().into_inner();
                                if let Ok(stream) = read.reunite(write) {
                                    reset(stream);
                                }
                                return;
                            }
                            Err(_) => return,
                        };
                        let Ok(Some(line)) = next else { return };
                        received.lock().unwrap().push(line.clone());

                        for reply in (*script)(&line) {
                            let mut out = match reply {
                                Reply::Line(out) => out.into_bytes(),
                                Reply::Raw(bytes) => bytes,
                                Reply::After(delay, out) => {
                                    tokio::time::sleep(delay).await;
                                    out.into_bytes()
                                }
                                Reply::Hangup => return,
                            };
                            out.push(b'\n');
                            if write.write_all(&out).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });

        backend
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every line received, across connections, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        let _ = self.hangup.send(Teardown::Close);
    }

    /// Abort every open connection with a TCP reset.
    pub fn reset_connections(&self) {
        let _ = self.hangup.send(Teardown::Reset);
    }
}

/// A running bridge pointed at a mock backend.
pub struct Bridge {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl Bridge {
    pub async fn start(backend_addr: SocketAddr) -> Self {
        Self::start_with(backend_addr, |_| {}).await
    }

    pub async fn start_with(
        backend_addr: SocketAddr,
        tweak: impl FnOnce(&mut BridgeConfig),
    ) -> Self {
        let mut config = BridgeConfig::default();
        config.backend.address = backend_addr.to_string();
        config.backend.connect_timeout_secs = 2;
        tweak(&mut config);

        let state = AppState::new(config);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server = HttpServer::with_state(state.clone());
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, rx).await;
        });

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr,
            state,
            client,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a JSON body, returning status and parsed response body.
    pub async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap())
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap())
    }

    pub async fn login(&self, username: &str) -> (u16, Value) {
        self.post("/api/login", serde_json::json!({ "username": username })).await
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
