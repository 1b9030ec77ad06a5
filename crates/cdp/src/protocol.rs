//! CDP Wire Types
//!
//! The protocol is JSON over one duplex connection. Every inbound frame is
//! one of two shapes: a response to a command we sent (positive `id`) or an
//! unsolicited event (`method`, no positive `id`). The shape tag, not arrival
//! order, decides routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing, per socket
pub type RequestId = u64;

/// Session ID for flat-mode targets
pub type SessionId = String;

/// Event that Chrome raises when a target dies. Logged louder than other
/// events but otherwise delivered like any of them.
pub const TARGET_CRASHED: &str = "Inspector.targetCrashed";

/// Command frame sent to the browser
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Response frame correlated back to a request by id
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Error object the remote attaches to a failed command.
/// Code 0 (or absent) means no error.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Event frame from the browser (no request id)
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Classified inbound message
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Event(Event),
}

/// Raw inbound frame before classification. CDP never issues id 0, so a
/// frame with id 0 (or none) and a method is an event.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    id: RequestId,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<SessionId>,
}

impl Envelope {
    /// Positive id wins over method: a frame carrying both is a response.
    /// Returns None for frames that are neither (malformed).
    pub(crate) fn classify(self) -> Option<Message> {
        if self.id > 0 {
            return Some(Message::Response(Response {
                id: self.id,
                result: self.result,
                error: self.error,
            }));
        }
        self.method.map(|method| {
            Message::Event(Event {
                method,
                params: self.params,
                session_id: self.session_id,
            })
        })
    }
}
