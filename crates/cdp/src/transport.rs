//! Transport seam - the duplex message channel under the socket.
//!
//! The socket never touches a websocket directly. A `Transport` opens the
//! connection and splits it into a write half and a read half, so the single
//! reader task can own the stream while senders share the sink behind a
//! mutex. Tests swap in a channel-backed transport; production uses the
//! tungstenite websocket.

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Result;

/// Write half: whole JSON messages out, serialized by the socket's sink lock.
#[async_trait]
pub trait MessageSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Read half: blocks for one whole inbound message. `None` means the
/// connection is gone; an `Err` item is fatal to the read loop.
#[async_trait]
pub trait MessageStream: Send {
    async fn next_text(&mut self) -> Option<Result<String>>;
}

/// Connection factory consumed on connect.
#[async_trait]
pub trait Transport: Send {
    async fn connect(self: Box<Self>) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>)>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket transport to a DevTools endpoint.
pub struct WebSocket {
    url: Url,
}

impl WebSocket {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
        })
    }
}

#[async_trait]
impl Transport for WebSocket {
    async fn connect(self: Box<Self>) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>)> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(WebSocketSink { sink }),
            Box::new(WebSocketReader { stream }),
        ))
    }
}

struct WebSocketSink {
    sink: WsSink,
}

#[async_trait]
impl MessageSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

struct WebSocketReader {
    stream: WsStream,
}

#[async_trait]
impl MessageStream for WebSocketReader {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                // Pings are answered by tungstenite on the write path;
                // binary and pong frames carry nothing for us.
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(e.into())),
            }
        }
    }
}
