//! Event handlers and their registry
//!
//! A handler is a named callback: one event method, one closure. Handlers
//! are identity-comparable (pointer equality on the shared callback), so the
//! registry can refuse the same handler twice and remove exactly the one a
//! caller registered. Handlers live until removed - their lifetime has
//! nothing to do with any command.

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;

use crate::protocol::Event;

/// Event subscriber callback
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// A callback bound to one event method name.
#[derive(Clone)]
pub struct EventHandler {
    method: String,
    callback: EventCallback,
}

impl EventHandler {
    pub fn new(method: impl Into<String>, callback: EventCallback) -> Self {
        Self {
            method: method.into(),
            callback,
        }
    }

    /// Handler that decodes the event params into `T` before invoking the
    /// typed callback. Undecodable payloads are logged and dropped; event
    /// subscribers have no error channel.
    pub fn typed<T, F>(method: impl Into<String>, callback: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let method = method.into();
        let name = method.clone();
        Self::new(
            method,
            Arc::new(move |event: Event| {
                let params = event.params.unwrap_or(serde_json::Value::Null);
                match serde_json::from_value::<T>(params) {
                    Ok(decoded) => callback(decoded),
                    Err(e) => tracing::warn!("dropping undecodable {} event: {}", name, e),
                }
            }),
        )
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn invoke(&self, event: Event) {
        (self.callback)(event);
    }

    /// Same registered value: same method, same callback allocation.
    fn is_same(&self, other: &EventHandler) -> bool {
        self.method == other.method && Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Handlers keyed by event method name.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: DashMap<String, Vec<EventHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Append under the method key. Registering the identical handler value
    /// twice is a warned no-op, not an error.
    pub(crate) fn add(&self, handler: EventHandler) -> bool {
        let mut entry = self
            .handlers
            .entry(handler.method().to_string())
            .or_default();
        if entry.iter().any(|h| h.is_same(&handler)) {
            tracing::warn!("handler already registered for {}", handler.method());
            return false;
        }
        entry.push(handler);
        true
    }

    /// Delete the first identity match. Removing a handler that was never
    /// registered is a no-op.
    pub(crate) fn remove(&self, handler: &EventHandler) -> bool {
        let Some(mut entry) = self.handlers.get_mut(handler.method()) else {
            return false;
        };
        let Some(pos) = entry.iter().position(|h| h.is_same(handler)) else {
            return false;
        };
        entry.remove(pos);
        true
    }

    /// Snapshot of the handlers for a method, cloned out so dispatch never
    /// holds the map lock while callbacks run.
    pub(crate) fn get(&self, method: &str) -> Option<Vec<EventHandler>> {
        let entry = self.handlers.get(method)?;
        if entry.is_empty() {
            return None;
        }
        Some(entry.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn count(&self, method: &str) -> usize {
        self.handlers.get(method).map_or(0, |e| e.len())
    }
}
