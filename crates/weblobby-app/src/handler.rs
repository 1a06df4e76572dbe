//! The consumer-side seam between [`Lobby`](crate::Lobby) and a UI layer.

use weblobby_core::Event;

/// Receives events on the consumer thread.
///
/// [`Lobby::pump`](crate::Lobby::pump) calls `handle_event` once per event, in
/// the order the events were posted, after the lobby's own bookkeeping for
/// that event. Stale process exits are not delivered.
#[cfg_attr(test, mockall::automock)]
pub trait EventHandler {
    fn handle_event(&mut self, event: &Event);

    /// Called once when the lobby shuts down.
    fn on_shutdown(&mut self) {}
}

/// Collects events, mostly useful in tests and scripts.
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<Event>,
}

impl EventHandler for EventLog {
    fn handle_event(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}
