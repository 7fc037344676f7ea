//! `DefaultRelayPool`: a `RelayPool` backed by `tokio-tungstenite`.
//!
//! One WebSocket connection is kept open per relay and shared across all
//! `fetch_till_eose` calls against it (several pagination workers, or
//! several per-author buckets, commonly land on the same relay at once).
//! A single reader task demultiplexes incoming frames to the subscription
//! they're addressed to by `sub_id`; `NOTICE` has no `sub_id` in NIP-01 and
//! is broadcast to every subscription open on that connection.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hashbrown::HashMap;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::FetchError;
use crate::logging::{debug, warn};
use crate::pool::{normalize_relay_url, EnsureRelaysOpts, EventStream, FetchTillEoseOpts, RelayPool};
use crate::types::{Event, Filter};
use crate::verify::{validate_schema, DefaultVerifier, Verifier};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type SubMap = Arc<StdMutex<HashMap<String, mpsc::UnboundedSender<Incoming>>>>;

enum Incoming {
    Event(Event),
    Eose,
    Notice(String),
    SubClosed(String),
    ConnectionLost,
}

struct Connection {
    write: Arc<AsyncMutex<WsSink>>,
    subscriptions: SubMap,
    reader: tokio::task::JoinHandle<()>,
}

impl Connection {
    async fn close(self) {
        self.reader.abort();
        let mut write = self.write.lock().await;
        let _ = write.send(WsMessage::Close(None)).await;
    }
}

/// Default transport for [`crate::NostrFetcher`]. Construct via
/// [`DefaultRelayPool::new`], or swap in a test double via
/// [`crate::NostrFetcher::with_custom_pool`].
pub struct DefaultRelayPool {
    connections: RwLock<HashMap<String, Connection>>,
}

impl DefaultRelayPool {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    async fn connect_one(&self, url: &str, connect_timeout: Duration) -> bool {
        let normalized = match normalize_relay_url(url) {
            Ok(u) => u,
            Err(_) => return false,
        };

        if self.connections.read().await.contains_key(&normalized) {
            return true;
        }

        let attempt = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(&normalized)).await;
        let (stream, _response) = match attempt {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(relay = %normalized, error = %e, "failed to connect");
                return false;
            }
            Err(_) => {
                warn!(relay = %normalized, "connect timed out");
                return false;
            }
        };

        let (write, read) = stream.split();
        let subscriptions: SubMap = Arc::new(StdMutex::new(HashMap::new()));
        let reader = tokio::spawn(run_reader(read, subscriptions.clone()));

        self.connections.write().await.insert(
            normalized,
            Connection {
                write: Arc::new(AsyncMutex::new(write)),
                subscriptions,
                reader,
            },
        );
        true
    }
}

impl Default for DefaultRelayPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayPool for DefaultRelayPool {
    async fn ensure_relays(&self, urls: &[String], opts: EnsureRelaysOpts) -> Vec<String> {
        let mut connected = Vec::with_capacity(urls.len());
        for url in urls {
            if self.connect_one(url, opts.connect_timeout).await {
                if let Ok(normalized) = normalize_relay_url(url) {
                    connected.push(normalized);
                }
            }
        }
        connected
    }

    async fn fetch_till_eose(&self, url: &str, filter: Filter, opts: FetchTillEoseOpts) -> EventStream {
        let normalized = match normalize_relay_url(url) {
            Ok(u) => u,
            Err(e) => return futures_util::stream::once(async { Err(e) }).boxed(),
        };

        let connections = self.connections.read().await;
        let Some(conn) = connections.get(&normalized) else {
            return futures_util::stream::once(async move {
                Err(FetchError::RelayNotConnected(normalized))
            })
            .boxed();
        };

        let (tx, rx) = mpsc::unbounded_channel();
        conn.subscriptions.lock().unwrap().insert(opts.sub_id.clone(), tx);

        let req = serde_json::json!(["REQ", opts.sub_id, filter]).to_string();
        let write = conn.write.clone();
        let subscriptions = conn.subscriptions.clone();
        drop(connections);

        {
            let mut w = write.lock().await;
            if w.send(WsMessage::Text(req)).await.is_err() {
                subscriptions.lock().unwrap().remove(&opts.sub_id);
                return futures_util::stream::once(async move {
                    Err(FetchError::RelayDisconnected(normalized))
                })
                .boxed();
            }
        }

        build_stream(rx, write, subscriptions, normalized, opts)
    }

    async fn shutdown(&self) {
        let mut connections = self.connections.write().await;
        for (_, conn) in connections.drain() {
            conn.close().await;
        }
    }
}

struct StreamState {
    rx: mpsc::UnboundedReceiver<Incoming>,
    write: Arc<AsyncMutex<WsSink>>,
    subscriptions: SubMap,
    url: String,
    sub_id: String,
    abort_signal: tokio_util::sync::CancellationToken,
    no_progress_timeout: Duration,
    skip_verification: bool,
    finished: bool,
}

async fn finish(state: &StreamState) {
    state.subscriptions.lock().unwrap().remove(&state.sub_id);
    let close = serde_json::json!(["CLOSE", state.sub_id]).to_string();
    let mut write = state.write.lock().await;
    let _ = write.send(WsMessage::Text(close)).await;
}

fn build_stream(
    rx: mpsc::UnboundedReceiver<Incoming>,
    write: Arc<AsyncMutex<WsSink>>,
    subscriptions: SubMap,
    url: String,
    opts: FetchTillEoseOpts,
) -> EventStream {
    let state = StreamState {
        rx,
        write,
        subscriptions,
        url,
        sub_id: opts.sub_id,
        abort_signal: opts.abort_signal,
        no_progress_timeout: opts.abort_sub_before_eose_timeout,
        skip_verification: opts.skip_verification,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            tokio::select! {
                _ = state.abort_signal.cancelled() => {
                    finish(&state).await;
                    state.finished = true;
                    return None;
                }
                res = tokio::time::timeout(state.no_progress_timeout, state.rx.recv()) => {
                    match res {
                        Err(_elapsed) => {
                            warn!(relay = %state.url, sub = %state.sub_id, "no-progress timeout, closing subscription");
                            finish(&state).await;
                            state.finished = true;
                            return None;
                        }
                        Ok(None) => {
                            state.finished = true;
                            return Some((Err(FetchError::RelayDisconnected(state.url.clone())), state));
                        }
                        Ok(Some(Incoming::Eose)) => {
                            finish(&state).await;
                            state.finished = true;
                            return None;
                        }
                        Ok(Some(Incoming::Notice(msg))) => {
                            debug!(relay = %state.url, sub = %state.sub_id, notice = %msg, "relay NOTICE, ending subscription");
                            finish(&state).await;
                            state.finished = true;
                            return None;
                        }
                        Ok(Some(Incoming::SubClosed(reason))) => {
                            debug!(relay = %state.url, sub = %state.sub_id, %reason, "relay sent CLOSED");
                            state.subscriptions.lock().unwrap().remove(&state.sub_id);
                            state.finished = true;
                            return None;
                        }
                        Ok(Some(Incoming::ConnectionLost)) => {
                            state.finished = true;
                            return Some((Err(FetchError::RelayDisconnected(state.url.clone())), state));
                        }
                        Ok(Some(Incoming::Event(event))) => {
                            if !validate_schema(&event) {
                                warn!(relay = %state.url, "dropping schema-invalid event from relay");
                                continue;
                            }
                            if !state.skip_verification && !DefaultVerifier.verify(&event) {
                                warn!(relay = %state.url, "dropping event with invalid signature from relay");
                                continue;
                            }
                            return Some((Ok(event), state));
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

fn dispatch(subscriptions: &SubMap, sub_id: &str, msg: Incoming) {
    let subs = subscriptions.lock().unwrap();
    if let Some(tx) = subs.get(sub_id) {
        let _ = tx.send(msg);
    }
}

fn broadcast(subscriptions: &SubMap, make: impl Fn() -> Incoming) {
    let subs = subscriptions.lock().unwrap();
    for tx in subs.values() {
        let _ = tx.send(make());
    }
}

async fn run_reader(mut read: SplitStream<WsStream>, subscriptions: SubMap) {
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(WsMessage::Text(t)) => t,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let arr = match parsed.as_array() {
            Some(a) if !a.is_empty() => a,
            _ => continue,
        };
        let kind = arr[0].as_str().unwrap_or_default();

        match kind {
            "EVENT" if arr.len() >= 3 => {
                let sub_id = arr[1].as_str().unwrap_or_default();
                match serde_json::from_value::<Event>(arr[2].clone()) {
                    Ok(event) => dispatch(&subscriptions, sub_id, Incoming::Event(event)),
                    Err(e) => warn!(error = %e, "relay sent malformed EVENT"),
                }
            }
            "EOSE" if arr.len() >= 2 => {
                let sub_id = arr[1].as_str().unwrap_or_default();
                dispatch(&subscriptions, sub_id, Incoming::Eose);
            }
            "NOTICE" if arr.len() >= 2 => {
                let message = arr[1].as_str().unwrap_or_default().to_string();
                broadcast(&subscriptions, || Incoming::Notice(message.clone()));
            }
            "CLOSED" if arr.len() >= 2 => {
                let sub_id = arr[1].as_str().unwrap_or_default();
                let reason = arr.get(2).and_then(Value::as_str).unwrap_or_default().to_string();
                dispatch(&subscriptions, sub_id, Incoming::SubClosed(reason));
            }
            _ => {}
        }
    }
    broadcast(&subscriptions, || Incoming::ConnectionLost);
}
