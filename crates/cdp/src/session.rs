//! Flat-mode session bound to one browser target.
//!
//! The representative domain wrapper: it builds commands with a
//! domain-qualified method string, tags them with its session id, and
//! decodes typed results. All sessions multiplex the same socket.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::command::Command;
use crate::error::Result;
use crate::protocol::SessionId;
use crate::socket::Socket;

#[derive(Debug, Deserialize)]
struct AttachReply {
    #[serde(rename = "sessionId")]
    session_id: SessionId,
}

/// A session attached to one target over a shared socket.
#[derive(Clone)]
pub struct Session {
    socket: Arc<Socket>,
    pub target_id: String,
    pub session_id: SessionId,
}

impl Session {
    /// Attach to a target in flat mode and bind a session to it.
    pub async fn attach(socket: Arc<Socket>, target_id: impl Into<String>) -> Result<Self> {
        let target_id = target_id.into();
        let result = socket
            .send(
                "Target.attachToTarget",
                Some(json!({"targetId": target_id, "flatten": true})),
            )
            .await?;
        let reply: AttachReply = serde_json::from_value(result)?;

        Ok(Self {
            socket,
            target_id,
            session_id: reply.session_id,
        })
    }

    /// Send a command within this session's context.
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        let mut command = Command::new(method).with_session(self.session_id.clone());
        if let Some(params) = params {
            command = command.with_params(params);
        }
        self.socket.send_command(command).await
    }

    pub async fn navigate(&self, url: impl Into<String>) -> Result<Value> {
        self.send("Page.navigate", Some(json!({"url": url.into()})))
            .await
    }

    pub async fn evaluate(&self, expression: impl Into<String>) -> Result<Value> {
        self.send(
            "Runtime.evaluate",
            Some(json!({
                "expression": expression.into(),
                "returnByValue": true,
            })),
        )
        .await
    }
}
