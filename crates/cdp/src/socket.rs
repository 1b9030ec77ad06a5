//! Socket orchestrator - the core communication layer
//!
//! Design decisions:
//! 1. One reader task per socket; it is the only code that resolves
//!    pending commands, so concurrent senders share nothing but the
//!    registries.
//! 2. Correlation strictly by id - responses may arrive in any order.
//! 3. Writes serialized behind one sink lock; concurrent senders never
//!    interleave bytes on the wire.
//! 4. Event handlers run in their own tasks. A handler that blocks must not
//!    stall the read loop, which is the only path that unblocks senders.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::command::{Command, CommandRegistry};
use crate::error::{CdpError, Result};
use crate::handler::{EventHandler, HandlerRegistry};
use crate::protocol::{Envelope, Event, Message, Request, RequestId, Response, TARGET_CRASHED};
use crate::transport::{MessageSink, MessageStream, Transport, WebSocket};

/// Connection lifecycle. `Connecting` and `Stopping` are transitional;
/// commands are accepted only while `Listening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Listening = 2,
    Stopping = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Listening,
            3 => ConnectionState::Stopping,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Multiplexes one duplex JSON connection: commands out, correlated
/// responses and fanned-out events back in. One connection per socket;
/// after a disconnect, create a new socket.
pub struct Socket {
    url: String,

    /// Monotonic request id counter, per socket. u64 will not wrap within
    /// any realistic session lifetime.
    next_id: AtomicU64,

    /// Commands in flight, waiting for their responses.
    commands: Arc<CommandRegistry>,

    /// Event subscribers keyed by method name.
    handlers: Arc<HandlerRegistry>,

    /// Unopened transport; consumed by `connect`.
    transport: Mutex<Option<Box<dyn Transport>>>,

    /// Write half. The lock serializes concurrent senders onto the wire;
    /// shared with the reader so its exit path can tear the half down.
    sink: Arc<Mutex<Option<Box<dyn MessageSink>>>>,

    state: Arc<AtomicU8>,

    /// Dropping this sender asks the reader to exit after the message it is
    /// currently processing.
    shutdown: Mutex<Option<mpsc::Sender<()>>>,

    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Socket {
    /// Socket over a websocket transport. Does not connect yet.
    pub fn new(url: &str) -> Result<Arc<Self>> {
        let transport = WebSocket::new(url)?;
        Ok(Self::with_transport(Box::new(transport), url))
    }

    /// Socket over any transport (tests use a channel-backed mock).
    pub fn with_transport(transport: Box<dyn Transport>, url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            next_id: AtomicU64::new(1),
            commands: Arc::new(CommandRegistry::new()),
            handlers: Arc::new(HandlerRegistry::new()),
            transport: Mutex::new(Some(transport)),
            sink: Arc::new(Mutex::new(None)),
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected as u8)),
            shutdown: Mutex::new(None),
            reader: Mutex::new(None),
        })
    }

    /// Connect and start listening in one call.
    pub async fn open(url: &str) -> Result<Arc<Self>> {
        let socket = Self::new(url)?;
        socket.connect().await?;
        Ok(socket)
    }

    /// Open the transport and spawn the reader. A connect failure leaves
    /// the socket `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                ConnectionState::Disconnected as u8,
                ConnectionState::Connecting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(CdpError::Transport("socket already connected".into()));
        }

        let transport = match self.transport.lock().await.take() {
            Some(t) => t,
            None => {
                self.state
                    .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
                return Err(CdpError::Transport(
                    "connection already consumed; create a new socket".into(),
                ));
            }
        };

        let (sink, stream) = match transport.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                self.state
                    .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
                return Err(e);
            }
        };

        *self.sink.lock().await = Some(sink);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown.lock().await = Some(shutdown_tx);

        // Listening before the reader spawns: the loop exit path stores
        // Disconnected and must never be overwritten afterwards.
        self.state
            .store(ConnectionState::Listening as u8, Ordering::SeqCst);
        let reader = Reader {
            commands: Arc::clone(&self.commands),
            handlers: Arc::clone(&self.handlers),
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
        };
        let task = tokio::spawn(reader.run(stream, shutdown_rx));
        *self.reader.lock().await = Some(task);

        tracing::info!("connected to {}", self.url);
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Send a command and block until its response arrives. No timeout:
    /// if the connection drops while waiting, the caller resolves with
    /// `ConnectionLost`.
    pub async fn send_command(&self, command: Command) -> Result<Value> {
        let (_, rx) = self.submit(command).await?;
        let response = rx.await.map_err(|_| CdpError::ConnectionLost)?;
        Self::unpack(response)
    }

    /// `send_command` with a per-command deadline. On expiry the pending
    /// entry is removed and the caller resolves with `Timeout`; a response
    /// racing the deadline may still win.
    pub async fn send_command_with_timeout(
        &self,
        command: Command,
        deadline: Duration,
    ) -> Result<Value> {
        let (id, rx) = self.submit(command).await?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => Self::unpack(response),
            Ok(Err(_)) => Err(CdpError::ConnectionLost),
            Err(_) => {
                self.commands.take(id);
                Err(CdpError::Timeout)
            }
        }
    }

    /// Convenience wrapper over `send_command`.
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        let mut command = Command::new(method);
        if let Some(params) = params {
            command = command.with_params(params);
        }
        self.send_command(command).await
    }

    /// Subscribe a handler to its event method. Registering the identical
    /// handler value twice is a warned no-op; returns whether it was added.
    pub fn add_event_handler(&self, handler: EventHandler) -> bool {
        self.handlers.add(handler)
    }

    /// Remove the first registration matching this handler's identity.
    /// Removing a handler that was never registered is a no-op.
    pub fn remove_event_handler(&self, handler: &EventHandler) -> bool {
        self.handlers.remove(handler)
    }

    /// Ask the reader to exit once it finishes the current message.
    pub async fn stop(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Listening as u8,
            ConnectionState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.shutdown.lock().await.take();
    }

    /// Stop, wait for the reader to finish, close the transport.
    pub async fn disconnect(&self) -> Result<()> {
        self.stop().await;
        let reader = self.reader.lock().await.take();
        if let Some(task) = reader {
            let _ = task.await;
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await?;
        }
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
        tracing::info!("disconnected from {}", self.url);
        Ok(())
    }

    /// Assign the id, register the completion slot, then write the frame.
    /// Registration strictly precedes the write so a reply can never arrive
    /// for an id the registry does not know.
    async fn submit(&self, command: Command) -> Result<(RequestId, oneshot::Receiver<Response>)> {
        if self.state() != ConnectionState::Listening {
            return Err(CdpError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            id,
            method: command.method,
            params: command.params,
            session_id: command.session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.commands.insert(id, tx);

        // Re-check after registering: the reader stores Disconnected before
        // it drains the registry, so seeing Listening here means the drain
        // has not started yet and will cover this entry. Without this, an
        // entry inserted between the reader's exit and its drain would
        // never resolve.
        if self.state() != ConnectionState::Listening {
            self.commands.take(id);
            return Err(CdpError::ConnectionLost);
        }

        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                self.commands.take(id);
                return Err(e.into());
            }
        };

        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            self.commands.take(id);
            return Err(CdpError::NotConnected);
        };
        if let Err(e) = sink.send_text(text).await {
            self.commands.take(id);
            return Err(e);
        }

        tracing::debug!(id, method = %request.method, "command sent");
        Ok((id, rx))
    }

    fn unpack(response: Response) -> Result<Value> {
        if let Some(error) = response.error {
            if error.code != 0 {
                return Err(error.into());
            }
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// The reader side of a socket: the only code that touches the read half of
/// the transport and the only code that resolves pending commands.
struct Reader {
    commands: Arc<CommandRegistry>,
    handlers: Arc<HandlerRegistry>,
    state: Arc<AtomicU8>,
    sink: Arc<Mutex<Option<Box<dyn MessageSink>>>>,
}

impl Reader {
    /// Exits on transport failure, stream end, or stop; then releases every
    /// caller still blocked on a pending command.
    async fn run(self, mut stream: Box<dyn MessageStream>, mut shutdown: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                msg = stream.next_text() => match msg {
                    Some(Ok(text)) => self.route(&text),
                    Some(Err(e)) => {
                        tracing::error!("transport read failed: {}", e);
                        break;
                    }
                    None => {
                        tracing::info!("connection closed by peer");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::debug!("stop requested");
                    break;
                }
            }
        }

        // Disconnected must be visible before the drain: a sender that
        // registered after seeing Listening relies on the drain covering it.
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.commands.fail_all();
    }

    /// Classify one inbound frame and dispatch it. Malformed frames are
    /// logged and dropped; the loop keeps running.
    fn route(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("dropping malformed frame: {}", e);
                return;
            }
        };
        match envelope.classify() {
            Some(Message::Response(response)) => self.handle_response(response),
            Some(Message::Event(event)) => self.handle_event(event),
            None => tracing::warn!("dropping frame with neither id nor method"),
        }
    }

    /// Resolve the one caller waiting on this id. The registry take is an
    /// atomic get-then-delete, so a duplicate id finds nothing and cannot
    /// re-signal a disposed command.
    fn handle_response(&self, response: Response) {
        match self.commands.take(response.id) {
            // The receiver may already be gone (timed-out caller).
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::warn!("response for unknown request id {}", response.id),
        }
    }

    /// Fan the event out, one task per handler. At-most-once delivery, no
    /// backpressure; completion order across handlers is unspecified.
    fn handle_event(&self, event: Event) {
        if event.method == TARGET_CRASHED {
            tracing::error!("target crashed: {:?}", event.params);
        }
        let Some(handlers) = self.handlers.get(&event.method) else {
            tracing::debug!("no handlers for {}", event.method);
            return;
        };
        for handler in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                handler.invoke(event);
            });
        }
    }
}
