use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use toolmesh_core_types::{ToolContent, ToolDescriptor};

use crate::api::ToolTransport;
use crate::error::{TransportError, TransportErrorKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Persistent-connection RPC adapter. Requests are framed as
/// `{id, method, params}` envelopes and matched to `{id, result|error}`
/// responses by id; the reader loop fails all in-flight requests when the
/// connection drops. The connection is re-established lazily on the next
/// request.
pub struct WsTransport {
    endpoint: String,
    deadline: Duration,
    state: Arc<OnceCell<Mutex<Option<Arc<WsRuntime>>>>>,
}

struct WsCommand {
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, TransportError>>,
}

struct WsRuntime {
    command_tx: mpsc::Sender<WsCommand>,
    loop_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new(endpoint: impl Into<String>, deadline: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            deadline,
            state: Arc::new(OnceCell::new()),
        }
    }

    async fn runtime(&self) -> Result<Arc<WsRuntime>, TransportError> {
        let cell = self.state.get_or_init(|| async { Mutex::new(None) }).await;
        let mut guard = cell.lock().await;

        if let Some(rt) = guard.as_ref() {
            if rt.is_alive() {
                return Ok(rt.clone());
            }
        }

        let runtime = Arc::new(WsRuntime::connect(&self.endpoint, self.deadline).await?);
        *guard = Some(runtime.clone());
        Ok(runtime)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let runtime = self.runtime().await?;
        let (resp_tx, resp_rx) = oneshot::channel();
        let command = WsCommand {
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        runtime.command_tx.send(command).await.map_err(|_| {
            TransportError::new(TransportErrorKind::Io).with_hint("command channel closed")
        })?;

        match tokio::time::timeout(self.deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::new(TransportErrorKind::Io)
                .with_hint("response channel closed")),
            Err(_) => Err(TransportError::new(TransportErrorKind::Timeout)
                .with_hint(format!("{method} exceeded {:?}", self.deadline))),
        }
    }
}

impl WsRuntime {
    async fn connect(endpoint: &str, deadline: Duration) -> Result<Self, TransportError> {
        let (stream, _) = connect_async(endpoint).await.map_err(|err| {
            TransportError::new(TransportErrorKind::Connect).with_hint(err.to_string())
        })?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();
        let loop_task = tokio::spawn(async move {
            if let Err(err) = run_loop(stream, command_rx, deadline).await {
                warn!(target: "transport", %err, "websocket loop terminated with error");
            }
            loop_alive.store(false, Ordering::Relaxed);
        });

        info!(target: "transport", url = %endpoint, "websocket connection established");

        Ok(Self {
            command_tx,
            loop_task,
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

impl Drop for WsRuntime {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
    }
}

struct Inflight {
    responder: oneshot::Sender<Result<Value, TransportError>>,
    expires_at: Instant,
}

async fn run_loop(
    mut stream: WsStream,
    mut command_rx: mpsc::Receiver<WsCommand>,
    deadline: Duration,
) -> Result<(), TransportError> {
    let mut inflight: HashMap<u64, Inflight> = HashMap::new();
    let mut next_id: u64 = 1;
    // Periodic sweep so requests the server never answers do not pin a
    // map entry until the connection drops.
    let mut sweep = tokio::time::interval(deadline);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    drain_inflight(&mut inflight, "transport dropped");
                    return Ok(());
                };
                let id = next_id;
                next_id += 1;
                let envelope = json!({
                    "id": id,
                    "method": command.method,
                    "params": command.params,
                });
                match stream.send(Message::Text(envelope.to_string())).await {
                    Ok(()) => {
                        inflight.insert(id, Inflight {
                            responder: command.responder,
                            expires_at: Instant::now() + deadline,
                        });
                    }
                    Err(err) => {
                        let send_err = TransportError::new(TransportErrorKind::Io)
                            .with_hint(err.to_string());
                        let _ = command.responder.send(Err(send_err.clone()));
                        drain_inflight(&mut inflight, "websocket send failed");
                        return Err(send_err);
                    }
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_response(&text, &mut inflight);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        drain_inflight(&mut inflight, "websocket connection closed");
                        return Ok(());
                    }
                    Some(Err(err)) => {
                        let io_err = TransportError::new(TransportErrorKind::Io)
                            .with_hint(err.to_string());
                        drain_inflight(&mut inflight, "websocket read failed");
                        return Err(io_err);
                    }
                }
            }
            _ = sweep.tick() => {
                expire_overdue(&mut inflight, Instant::now());
            }
        }
    }
}

fn handle_response(text: &str, inflight: &mut HashMap<u64, Inflight>) {
    let Ok(envelope) = serde_json::from_str::<Value>(text) else {
        debug!(target: "transport", "dropping unparseable websocket frame");
        return;
    };
    let Some(id) = envelope.get("id").and_then(Value::as_u64) else {
        // Server push without a correlation id; nothing waits on it.
        return;
    };
    let Some(entry) = inflight.remove(&id) else {
        debug!(target: "transport", id, "response for unknown request id");
        return;
    };

    let result = if let Some(error) = envelope.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified backend error");
        Err(TransportError::new(TransportErrorKind::Remote).with_hint(message.to_string()))
    } else {
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    };
    let _ = entry.responder.send(result);
}

fn expire_overdue(inflight: &mut HashMap<u64, Inflight>, now: Instant) {
    let overdue: Vec<u64> = inflight
        .iter()
        .filter(|(_, entry)| entry.expires_at <= now)
        .map(|(id, _)| *id)
        .collect();
    for id in overdue {
        if let Some(entry) = inflight.remove(&id) {
            debug!(target: "transport", id, "expiring request past its deadline");
            let _ = entry.responder.send(Err(TransportError::new(TransportErrorKind::Timeout)
                .with_hint("no response before the deadline")));
        }
    }
}

fn drain_inflight(inflight: &mut HashMap<u64, Inflight>, reason: &str) {
    for (_, entry) in inflight.drain() {
        let _ = entry.responder.send(Err(
            TransportError::new(TransportErrorKind::Io).with_hint(reason)
        ));
    }
}

#[async_trait]
impl ToolTransport for WsTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or(result);
        serde_json::from_value(tools).map_err(|err| {
            TransportError::new(TransportErrorKind::Protocol).with_hint(err.to_string())
        })
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolContent, TransportError> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": args }))
            .await?;
        serde_json::from_value(result).map_err(|err| {
            TransportError::new(TransportErrorKind::Protocol).with_hint(err.to_string())
        })
    }
}
