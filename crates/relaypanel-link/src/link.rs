//! Multiplexed WebSocket link to one agent

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relaypanel_proto::{reply_id, AgentCommand, AgentRequest};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::endpoint::AgentEndpoint;
use crate::error::{LinkError, LinkResult};
use crate::pending::{CallOutcome, PendingCalls};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Shared handle to the control channel of one agent.
///
/// Clones share the same connection, pump task and pending call table.
#[derive(Clone)]
pub struct AgentLink {
    inner: Arc<LinkInner>,
}

struct LinkInner {
    endpoint: AgentEndpoint,
    url: String,
    config: LinkConfig,
    pending: PendingCalls,
    /// Write half; `None` while disconnected or reconnecting
    writer: tokio::sync::Mutex<Option<WsSink>>,
    /// The single inbound pump, which also drives reconnection
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Serializes `connect` so two callers never start two pumps
    connect_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    connected: AtomicBool,
    /// Number of successful dials over the link's lifetime
    connections: AtomicU64,
}

impl std::fmt::Debug for AgentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLink")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl AgentLink {
    /// Create an unconnected link
    pub fn new(endpoint: AgentEndpoint, config: LinkConfig) -> Self {
        let url = endpoint.url(&config.path);
        Self {
            inner: Arc::new(LinkInner {
                endpoint,
                url,
                config,
                pending: PendingCalls::new(),
                writer: tokio::sync::Mutex::new(None),
                pump: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                closed: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                connections: AtomicU64::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &AgentEndpoint {
        &self.inner.endpoint
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// Whether a write half is currently installed
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Successful dials so far, including reconnects
    pub fn connection_count(&self) -> u64 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether [`AgentLink::close`] has run. A closed link never reconnects.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dial the agent and start the inbound pump.
    ///
    /// A no-op while a pump is alive, including while it is reconnecting.
    /// Fails with [`LinkError::Closed`] once the link has been closed.
    pub async fn connect(&self) -> LinkResult<()> {
        let _guard = self.inner.connect_lock.lock().await;

        if self.is_closed() {
            return Err(LinkError::Closed(self.inner.url.clone()));
        }
        if self.pump_alive() {
            return Ok(());
        }

        let source = self.inner.dial().await?;

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run_pump(source).await });
        let mut pump = self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner);
        *pump = Some(handle);

        Ok(())
    }

    fn pump_alive(&self) -> bool {
        self.inner
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Send a command and wait for its reply with the configured deadline
    pub async fn call(&self, command: AgentCommand) -> LinkResult<Value> {
        self.call_with_timeout(command, self.inner.config.call_timeout)
            .await
    }

    /// Send a command and wait up to `timeout` for the matching reply.
    ///
    /// Safe to use concurrently; each call gets its own id and reply slot.
    pub async fn call_with_timeout(
        &self,
        command: AgentCommand,
        timeout: Duration,
    ) -> LinkResult<Value> {
        if self.is_closed() {
            return Err(LinkError::Closed(self.inner.url.clone()));
        }

        let call_id = Uuid::new_v4().to_string();
        let method = command.method();
        let payload = AgentRequest::new(call_id.clone(), command).to_json()?;

        // Registered before transmitting so a fast reply always finds its slot.
        let pending = self.inner.pending.register(&call_id);
        self.inner.send(payload).await?;

        debug!(url = %self.inner.url, %call_id, method, "sent agent call");

        match pending.wait(timeout).await {
            CallOutcome::Completed(reply) => {
                trace!(%call_id, method, "agent replied");
                Ok(reply)
            }
            CallOutcome::TimedOut => {
                warn!(url = %self.inner.url, %call_id, method, ?timeout, "agent call timed out");
                Err(LinkError::Timeout {
                    method,
                    call_id,
                    timeout,
                })
            }
            CallOutcome::Abandoned => Err(LinkError::Closed(self.inner.url.clone())),
        }
    }

    /// Tear the link down for good. Outstanding calls are released with
    /// [`LinkError::Closed`], later calls and connects fail the same way.
    pub async fn close(&self) {
        let _guard = self.inner.connect_lock.lock().await;
        self.inner.closed.store(true, Ordering::SeqCst);

        let pump = self
            .inner
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = pump {
            handle.abort();
        }

        let writer = self.inner.writer.lock().await.take();
        if let Some(mut sink) = writer {
            let _ = sink.close().await;
        }
        self.inner.connected.store(false, Ordering::SeqCst);

        let released = self.inner.pending.clear();
        info!(url = %self.inner.url, released, "closed agent link");
    }
}

impl LinkInner {
    /// Open a connection, install its write half and return the read half
    async fn dial(&self) -> LinkResult<WsSource> {
        let request = self.endpoint.handshake_request(&self.config.path)?;

        let timeout = self.config.connect_timeout;
        let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| {
                LinkError::unreachable(&self.url, format!("handshake timed out after {:?}", timeout))
            })?
            .map_err(|e| LinkError::unreachable(&self.url, e))?;

        if self.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed(self.url.clone()));
        }

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        self.connections.fetch_add(1, Ordering::SeqCst);

        info!(url = %self.url, node_id = self.endpoint.node_id, "connected to agent");
        Ok(source)
    }

    async fn send(&self, payload: String) -> LinkResult<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| LinkError::unreachable(&self.url, "not connected"))?;

        sink.send(Message::Text(payload))
            .await
            .map_err(|e| LinkError::unreachable(&self.url, e))
    }

    /// Inbound pump: deliver replies until the connection drops, then redial
    /// with a fixed backoff until the agent is back. Runs until the link is closed.
    async fn run_pump(self: Arc<Self>, mut source: WsSource) {
        loop {
            self.deliver_until_lost(&mut source).await;

            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            self.connected.store(false, Ordering::SeqCst);
            self.writer.lock().await.take();
            warn!(
                url = %self.url,
                pending = self.pending.len(),
                "lost connection to agent, reconnecting"
            );

            match self.redial().await {
                Some(next) => source = next,
                None => break,
            }
        }

        debug!(url = %self.url, "agent pump stopped");
    }

    async fn redial(&self) -> Option<WsSource> {
        let mut attempt: u64 = 0;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            attempt += 1;
            match self.dial().await {
                Ok(source) => {
                    info!(url = %self.url, attempt, "reconnected to agent");
                    return Some(source);
                }
                Err(e) => {
                    warn!(
                        url = %self.url,
                        attempt,
                        error = %e,
                        "reconnect failed, retrying in {}s",
                        self.config.reconnect_backoff.as_secs_f64()
                    );
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                }
            }
        }
    }

    async fn deliver_until_lost(&self, source: &mut WsSource) {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => self.deliver(text.as_bytes()),
                Ok(Message::Binary(data)) => self.deliver(&data),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    trace!(url = %self.url, "keep-alive frame");
                }
                Ok(Message::Close(frame)) => {
                    debug!(url = %self.url, ?frame, "agent closed the connection");
                    return;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(url = %self.url, error = %e, "agent read failed");
                    return;
                }
            }
        }
    }

    fn deliver(&self, raw: &[u8]) {
        let message: Value = match serde_json::from_slice(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(url = %self.url, error = %e, "unparsable agent message");
                return;
            }
        };

        let Some(call_id) = reply_id(&message).map(str::to_owned) else {
            trace!(url = %self.url, "agent message without id");
            return;
        };

        if !self.pending.resolve(&call_id, message) {
            debug!(url = %self.url, %call_id, "dropping reply for unknown call");
        }
    }
}
