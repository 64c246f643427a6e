//! Room events and their fixed set of subscribers

use crate::render::DiceTheme;
use crate::types::{CursorPos, Peer, PeerId, RollRecord};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a UI needs to re-render
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Connected { room: String },
    PeerJoined { peer_id: PeerId },
    PeerLeft { peer_id: PeerId },
    PeerUpdated { peer: Peer },
    PoolChanged { size: usize, summary: String },
    /// Animation for this record should start
    RollStarted { record: RollRecord, theme: DiceTheme },
    /// Record appended to history
    RollCompleted { record: RollRecord },
    EmojiReceived { peer_id: PeerId, emoji: String },
    CursorMoved { peer_id: PeerId, pos: CursorPos },
    Disconnected,
}

pub trait Subscriber {
    fn on_event(&mut self, event: &RoomEvent);
}

impl Subscriber for mpsc::UnboundedSender<RoomEvent> {
    fn on_event(&mut self, event: &RoomEvent) {
        // Receiver gone means the UI shut down first
        let _ = self.send(event.clone());
    }
}

/// Keeps every event it sees; handy in tests and the harness
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<RoomEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RoomEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<RoomEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, pred: impl Fn(&RoomEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl Subscriber for Recorder {
    fn on_event(&mut self, event: &RoomEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Dispatches to subscribers registered at construction
pub struct EventRouter {
    subscribers: Vec<Box<dyn Subscriber + Send>>,
}

impl EventRouter {
    pub fn new(subscribers: Vec<Box<dyn Subscriber + Send>>) -> Self {
        Self { subscribers }
    }

    pub fn dispatch(&mut self, event: RoomEvent) {
        for subscriber in &mut self.subscribers {
            subscriber.on_event(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_reaches_every_subscriber() {
        let recorder = Recorder::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut router = EventRouter::new(vec![Box::new(recorder.clone()), Box::new(tx)]);

        router.dispatch(RoomEvent::Disconnected);

        assert_eq!(recorder.events(), vec![RoomEvent::Disconnected]);
        assert_eq!(rx.try_recv().unwrap(), RoomEvent::Disconnected);
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut router = EventRouter::new(vec![Box::new(tx)]);
        router.dispatch(RoomEvent::Disconnected);
        assert_eq!(router.len(), 1);
    }
}
