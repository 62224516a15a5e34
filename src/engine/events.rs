//! Typed publish/subscribe channel
//!
//! Handlers run synchronously, in subscription order, on the thread that
//! publishes. The subscriber list is copied before dispatch so a handler may
//! subscribe or publish without deadlocking the bus.

use log::trace;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MapInitialized,
    MapDestroyed,
    MapDisplayed,
    ListDisplayed,
    ResultCountChanged,
    BorderLayerAttached,
}

/// Events produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MapEvent {
    MapInitialized { map_id: String, generation: u64 },
    MapDestroyed { map_id: String },
    MapDisplayed { map_id: String },
    ListDisplayed,
    ResultCountChanged { map_id: String, count: usize },
    BorderLayerAttached { map_id: String, layer_id: String },
}

impl MapEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::MapInitialized { .. } => EventKind::MapInitialized,
            MapEvent::MapDestroyed { .. } => EventKind::MapDestroyed,
            MapEvent::MapDisplayed { .. } => EventKind::MapDisplayed,
            MapEvent::ListDisplayed => EventKind::ListDisplayed,
            MapEvent::ResultCountChanged { .. } => EventKind::ResultCountChanged,
            MapEvent::BorderLayerAttached { .. } => EventKind::BorderLayerAttached,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&MapEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
}

#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for handlers in inner.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(sub, _)| *sub != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    pub fn publish(&self, event: MapEvent) {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .handlers
                .get(&event.kind())
                .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        trace!("publishing {:?} to {} handler(s)", event, handlers.len());
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("kinds", &inner.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
