//! Cross-thread event delivery to a single consumer
//!
//! Producers hold cheap [`EventPoster`] clones and may post from any thread,
//! inside or outside a Tokio runtime. The one [`EventBridge`] lives on the
//! consumer thread and hands out everything posted so far in arrival order.
//!
//! Order is preserved per producer as long as each producer posts from a single
//! thread or task; events from different producers interleave arbitrarily.

use tokio::sync::mpsc;

use crate::events::Event;

/// Sending half of the bridge. Clone one per producer.
#[derive(Debug, Clone)]
pub struct EventPoster {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventPoster {
    /// Post an event. Never blocks and never fails: if the consumer is gone the
    /// event is dropped.
    pub fn post(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event bridge closed, dropping event");
        }
    }

    /// `true` once the consuming [`EventBridge`] has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the bridge, owned by the consumer thread
#[derive(Debug)]
pub struct EventBridge {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Create a poster for a new producer
    pub fn poster(&self) -> EventPoster {
        EventPoster {
            tx: self.tx.clone(),
        }
    }

    /// Take every event queued so far, oldest first. Never blocks.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait until at least one event is queued, then return it.
    ///
    /// For consumers that run their loop on a runtime instead of polling.
    /// The bridge keeps a sender of its own, so this never returns `None`
    /// while the bridge is alive; the `Option` mirrors the channel API.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Number of events waiting to be drained
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
