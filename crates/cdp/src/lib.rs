//! Chrome DevTools Protocol socket multiplexer.
//!
//! One websocket, many concurrent callers: commands go out with unique ids
//! and block on their correlated responses; unsolicited events fan out to
//! registered handlers. A single reader task classifies every inbound frame
//! and is the only code that resolves pending commands.
//!
//! Protocol-domain wrappers (Page, DOM, Network, ...) sit on top of four
//! operations: [`Socket::send_command`], [`Socket::add_event_handler`],
//! [`Socket::remove_event_handler`], and the connection lifecycle.

pub mod command;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod socket;
pub mod transport;

#[cfg(test)]
mod testing;

pub use command::Command;
pub use error::{CdpError, Result};
pub use handler::{EventCallback, EventHandler};
pub use protocol::{Event, RemoteError, Request, RequestId, Response, SessionId};
pub use session::Session;
pub use socket::{ConnectionState, Socket};
pub use transport::{MessageSink, MessageStream, Transport, WebSocket};
