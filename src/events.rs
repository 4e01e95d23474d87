//! Named events with ordered subscriber lists.

use crate::error::{PlotError, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// What a handler receives. Bubbled events reach the parent with the same context.
#[derive(Clone, Debug, PartialEq)]
pub struct EventContext {
    pub source_id: String,
    pub target: String,
    pub data: Value,
}

pub type EventHandler = Arc<dyn Fn(&EventContext) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Data plus the bubble flag. `emit(name, true)` bubbles with no data,
/// `emit(name, json!(..))` sends data locally, `emit(name, (data, true))` does both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventPayload {
    pub data: Value,
    pub bubble: bool,
}

impl From<bool> for EventPayload {
    fn from(bubble: bool) -> Self {
        Self {
            data: Value::Null,
            bubble,
        }
    }
}

impl From<Value> for EventPayload {
    fn from(data: Value) -> Self {
        Self { data, bubble: false }
    }
}

impl From<(Value, bool)> for EventPayload {
    fn from((data, bubble): (Value, bool)) -> Self {
        Self { data, bubble }
    }
}

impl From<()> for EventPayload {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Listeners {
    by_event: IndexMap<String, Vec<(ListenerId, EventHandler)>>,
}

/// Subscription lists for one component. Clones share the same lists.
#[derive(Clone)]
pub struct EventHub {
    source_id: String,
    listeners: Arc<Mutex<Listeners>>,
    parent: Option<Box<EventHub>>,
}

impl EventHub {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            parent: None,
        }
    }

    /// A hub whose bubbled events are forwarded to `parent`.
    pub fn child(source_id: impl Into<String>, parent: &EventHub) -> Self {
        Self {
            parent: Some(Box::new(parent.clone())),
            ..Self::new(source_id)
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Result<ListenerId>
    where
        F: Fn(&EventContext) + Send + Sync + 'static,
    {
        if event.is_empty() {
            return Err(PlotError::InvalidEventName(event.to_string()));
        }
        let id = ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .by_event
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Removes one listener, or every listener for the event when `id` is `None`.
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> Result<()> {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.by_event.get_mut(event) else {
            return Err(PlotError::UnknownEvent(event.to_string()));
        };
        match id {
            None => list.clear(),
            Some(id) => {
                let idx = list
                    .iter()
                    .position(|(existing, _)| *existing == id)
                    .ok_or(PlotError::ListenerNotRegistered)?;
                list.remove(idx);
            }
        }
        Ok(())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .by_event
            .get(event)
            .map_or(0, Vec::len)
    }

    fn dispatch(&self, event: &str, context: &EventContext) {
        // Snapshot so handlers may subscribe or emit without deadlocking.
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .by_event
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(context);
        }
    }

    pub fn emit(&self, event: &str, payload: impl Into<EventPayload>) -> Result<()> {
        if event.is_empty() {
            return Err(PlotError::InvalidEventName(event.to_string()));
        }
        let payload = payload.into();
        let context = EventContext {
            source_id: self.source_id.clone(),
            target: self.source_id.clone(),
            data: payload.data,
        };
        trace!(event, source = %context.source_id, bubble = payload.bubble, "emit");
        self.dispatch(event, &context);
        if payload.bubble {
            if let Some(parent) = &self.parent {
                parent.dispatch(event, &context);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_off_unknown_listener() {
        let hub = EventHub::new("plot");
        let id = hub.on("element_clicked", |_| {}).unwrap();
        hub.off("element_clicked", Some(id)).unwrap();
        assert!(matches!(
            hub.off("element_clicked", Some(id)),
            Err(PlotError::ListenerNotRegistered)
        ));
        assert!(matches!(hub.off("nope", None), Err(PlotError::UnknownEvent(_))));
    }

    #[test]
    fn test_handlers_can_emit_reentrantly() {
        let hub = EventHub::new("plot");
        let inner = hub.clone();
        hub.on("outer", move |_| {
            let _ = inner.emit("inner", json!(1));
        })
        .unwrap();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        hub.on("inner", move |_| *counter.lock() += 1).unwrap();
        hub.emit("outer", ()).unwrap();
        assert_eq!(*seen.lock(), 1);
    }
}
