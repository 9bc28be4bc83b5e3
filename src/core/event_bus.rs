//! Pub/Sub event bus for playback notifications
//!
//! - Subscribers register per event type and are called synchronously on emit
//! - Every emitted event is also queued; the host loop drains it with poll()
//!
//! Callback order is FIFO within one event type. No ordering is guaranteed
//! across different types.

use log::warn;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Queue length at which the oldest half is dropped
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

pub type BoxedEvent = Box<dyn Event>;

/// State shared by the bus and every emitter handle
#[derive(Default)]
struct Shared {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl Shared {
    fn dispatch<E: Event + Clone>(&self, event: E) {
        // Clone the callback list so a callback may subscribe without deadlocking
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();
        for cb in &callbacks {
            cb(&event);
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("Event queue full ({} events), dropping oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(Box::new(event));
    }
}

/// Event bus owned by the host application.
///
/// Cloning shares the same subscribers and queue.
#[derive(Clone, Default)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```ignore
    /// bus.subscribe::<FrameChangedEvent, _>(|e| {
    ///     println!("frame {} / {}", e.index + 1, e.total_frames);
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke subscribers, then queue for poll()
    pub fn emit<E: Event + Clone>(&self, event: E) {
        self.shared.dispatch(event);
    }

    /// Take every event queued since the last poll
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Handle for components that only emit
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn unsubscribe_all<E: Event>(&self) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .is_some_and(|v| !v.is_empty())
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Cloneable emit-only handle
#[derive(Clone)]
pub struct EventEmitter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field(
                "subscriber_types",
                &self.shared.subscribers.read().map(|s| s.len()).unwrap_or(0),
            )
            .field("queue_len", &self.shared.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl EventEmitter {
    pub fn emit<E: Event + Clone>(&self, event: E) {
        self.shared.dispatch(event);
    }
}

/// Emitter held by a sequence; a no-op until a bus is attached
#[derive(Clone, Default, Debug)]
pub struct SequenceEventEmitter {
    inner: Option<EventEmitter>,
}

impl SequenceEventEmitter {
    /// No-op emitter
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn from_emitter(emitter: EventEmitter) -> Self {
        Self { inner: Some(emitter) }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    pub fn emit<E: Event + Clone>(&self, event: E) {
        if let Some(emitter) = &self.inner {
            emitter.emit(event);
        }
    }
}

/// Downcast a queued event to its concrete type.
///
/// Derefs to `dyn Event` first: calling `as_any()` on the `Box` itself would
/// hit the blanket impl for `Box<dyn Event>` and the downcast would fail.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
