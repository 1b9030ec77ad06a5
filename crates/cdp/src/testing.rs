//! Channel-backed transport for driving the socket in tests.
//!
//! The "remote" side of the pair reads the frames the socket writes and
//! pushes inbound frames, standing in for the browser. Dropping the remote
//! ends the inbound stream, which the socket sees as a lost connection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{CdpError, Result};
use crate::transport::{MessageSink, MessageStream, Transport};

/// Computes an inbound frame from an outbound one, delivered before the
/// write returns. Used to race a response against `send_command`'s own
/// registration path.
pub(crate) type InstantReply = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub(crate) struct MockTransport {
    sent_tx: mpsc::UnboundedSender<String>,
    inbound_rx: mpsc::UnboundedReceiver<String>,
    instant_reply: Option<(InstantReply, mpsc::UnboundedSender<String>)>,
    // Keeps the write channel open when no remote half exists.
    keep_sent: Option<mpsc::UnboundedReceiver<String>>,
}

/// The browser side of a mock connection.
pub(crate) struct MockRemote {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
}

impl MockTransport {
    pub(crate) fn new() -> (Self, MockRemote) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                sent_tx,
                inbound_rx,
                instant_reply: None,
                keep_sent: None,
            },
            MockRemote {
                sent: sent_rx,
                inbound: inbound_tx,
            },
        )
    }

    /// Answer every written frame through `reply` before the write returns.
    pub(crate) fn instant(reply: InstantReply) -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sent_tx,
            inbound_rx,
            instant_reply: Some((reply, inbound_tx)),
            keep_sent: Some(sent_rx),
        }
    }
}

impl MockRemote {
    /// Next frame the socket wrote, parsed.
    pub(crate) async fn next_request(&mut self) -> Value {
        let text = self.sent.recv().await.expect("socket closed its write half");
        serde_json::from_str(&text).expect("socket wrote invalid JSON")
    }

    pub(crate) fn push(&self, frame: Value) {
        self.inbound
            .send(frame.to_string())
            .expect("socket reader is gone");
    }

    pub(crate) fn push_text(&self, text: &str) {
        self.inbound
            .send(text.to_string())
            .expect("socket reader is gone");
    }

    pub(crate) fn respond(&self, id: u64, result: Value) {
        self.push(serde_json::json!({"id": id, "result": result}));
    }

    /// Drop the read half while keeping the write half alive: the socket's
    /// reader sees the stream end, but frames written afterwards still
    /// succeed. Hold the returned receiver for as long as writes should work.
    pub(crate) fn close_read(self) -> mpsc::UnboundedReceiver<String> {
        self.sent
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(self: Box<Self>) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>)> {
        Ok((
            Box::new(MockSink {
                sent: self.sent_tx,
                instant_reply: self.instant_reply,
                _keep_sent: self.keep_sent,
            }),
            Box::new(MockStream {
                inbound: self.inbound_rx,
            }),
        ))
    }
}

/// Transport whose connect always fails.
pub(crate) struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn connect(self: Box<Self>) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>)> {
        Err(CdpError::Transport("mock connect refused".into()))
    }
}

struct MockSink {
    sent: mpsc::UnboundedSender<String>,
    instant_reply: Option<(InstantReply, mpsc::UnboundedSender<String>)>,
    _keep_sent: Option<mpsc::UnboundedReceiver<String>>,
}

#[async_trait]
impl MessageSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if let Some((reply, inbound)) = &self.instant_reply {
            if let Some(frame) = reply(&text) {
                let _ = inbound.send(frame);
            }
        }
        self.sent
            .send(text)
            .map_err(|_| CdpError::Transport("mock remote gone".into()))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl MessageStream for MockStream {
    async fn next_text(&mut self) -> Option<Result<String>> {
        self.inbound.recv().await.map(Ok)
    }
}
