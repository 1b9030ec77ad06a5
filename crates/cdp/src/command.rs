//! Command - one outstanding request/response exchange
//!
//! Callers build a `Command` and hand it to the socket. The id and the
//! completion signal stay internal: `send_command` assigns the id, parks a
//! oneshot sender in the registry and awaits the receiver. Resolution comes
//! exclusively from the read loop, which is why concurrent senders need no
//! per-command lock.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::protocol::{RequestId, Response, SessionId};

/// A command about to be sent: method, parameters, optional session binding.
#[derive(Debug, Clone)]
pub struct Command {
    pub method: String,
    pub params: Option<Value>,
    pub session_id: Option<SessionId>,
}

impl Command {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
            session_id: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Pending commands waiting for responses, keyed by request id.
///
/// `take` is an atomic get-then-delete, so a response resolves its command
/// exactly once - a duplicate id finds nothing. Dropping a sender releases
/// its blocked caller with a channel-closed error, which the socket maps to
/// `ConnectionLost`.
#[derive(Default)]
pub(crate) struct CommandRegistry {
    pending: DashMap<RequestId, oneshot::Sender<Response>>,
}

impl CommandRegistry {
    pub(crate) fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Register before the request frame is written; a reply must never be
    /// able to arrive for an id the registry does not know.
    pub(crate) fn insert(&self, id: RequestId, tx: oneshot::Sender<Response>) {
        self.pending.insert(id, tx);
    }

    /// Remove and return the pending entry. A missing id is a normal
    /// condition (already resolved, timed out, or never issued).
    pub(crate) fn take(&self, id: RequestId) -> Option<oneshot::Sender<Response>> {
        self.pending.remove(&id).map(|(_, tx)| tx)
    }

    /// Drain every pending entry, releasing all blocked callers. The senders
    /// are dropped unsent; receivers observe closure.
    pub(crate) fn fail_all(&self) {
        let drained = self.pending.len();
        self.pending.clear();
        if drained > 0 {
            tracing::warn!("released {} commands pending at shutdown", drained);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_resolves_exactly_once() {
        let registry = CommandRegistry::new();
        let (tx, mut rx) = oneshot::channel();
        registry.insert(4, tx);

        let first = registry.take(4);
        assert!(first.is_some());
        // Second take with the same id finds nothing.
        assert!(registry.take(4).is_none());

        first
            .unwrap()
            .send(Response {
                id: 4,
                result: Some(serde_json::json!({"ok": true})),
                error: None,
            })
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().id, 4);
    }

    #[tokio::test]
    async fn fail_all_releases_blocked_receivers() {
        let registry = CommandRegistry::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        registry.insert(1, tx1);
        registry.insert(2, tx2);

        registry.fail_all();
        assert_eq!(registry.pending(), 0);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[test]
    fn command_builder() {
        let cmd = Command::new("Page.navigate")
            .with_params(serde_json::json!({"url": "https://example.com"}))
            .with_session("sess-1");
        assert_eq!(cmd.method, "Page.navigate");
        assert_eq!(cmd.session_id.as_deref(), Some("sess-1"));
        assert_eq!(cmd.params.unwrap()["url"], "https://example.com");
    }
}
