//! Envelope stamping and inbound filtering
//!
//! Outbound: every message is stamped with the local peer id and an optional
//! target. Sends are fire-and-forget; failures are logged and counted.
//!
//! Inbound: self-originated envelopes and envelopes addressed to somebody
//! else are dropped before the payload is even decoded.

use crate::error::{MessageError, TransportError};
use crate::message::{Envelope, Message};
use crate::transport::Transport;
use crate::types::PeerId;
use tracing::{debug, warn};

/// Outbound counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendStats {
    pub sent: u64,
    pub failures: u64,
}

/// Verdict on one inbound envelope
#[derive(Debug)]
pub enum Inbound {
    Accepted { from: PeerId, message: Message },
    SelfEcho,
    NotAddressed,
    Malformed(MessageError),
}

pub struct Broadcaster {
    self_id: PeerId,
    transport: Box<dyn Transport>,
    stats: SendStats,
}

impl Broadcaster {
    pub fn new(self_id: PeerId, transport: Box<dyn Transport>) -> Self {
        Self {
            self_id,
            transport,
            stats: SendStats::default(),
        }
    }

    /// Broadcast to the whole room
    pub fn send(&mut self, message: &Message) {
        self.dispatch(None, message);
    }

    /// Send to one peer. The envelope still travels on the shared medium.
    pub fn send_to(&mut self, target: &str, message: &Message) {
        self.dispatch(Some(target.to_string()), message);
    }

    fn dispatch(&mut self, target: Option<PeerId>, message: &Message) {
        let channel = message.channel();
        let result = Envelope::new(self.self_id.clone(), target, message)
            .map_err(TransportError::from)
            .and_then(|envelope| self.transport.send(envelope));

        match result {
            Ok(()) => {
                self.stats.sent += 1;
                debug!("Broadcast: Sent {}", channel);
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!("Broadcast: Failed to send {}: {}", channel, e);
            }
        }
    }

    /// Filter and decode one inbound envelope
    pub fn receive(&self, envelope: Envelope) -> Inbound {
        if envelope.peer_id == self.self_id {
            return Inbound::SelfEcho;
        }
        if let Some(target) = &envelope.target_peer_id {
            if *target != self.self_id {
                return Inbound::NotAddressed;
            }
        }
        match envelope.message() {
            Ok(message) => Inbound::Accepted {
                from: envelope.peer_id,
                message,
            },
            Err(e) => Inbound::Malformed(e),
        }
    }

    pub fn stats(&self) -> SendStats {
        self.stats
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use serde_json::json;

    struct Broken;

    impl Transport for Broken {
        fn send(&self, _envelope: Envelope) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn envelope(
        from: &str,
        target: Option<&str>,
        channel: &str,
        payload: serde_json::Value,
    ) -> Envelope {
        Envelope {
            peer_id: from.to_string(),
            target_peer_id: target.map(str::to_string),
            channel: channel.to_string(),
            payload,
        }
    }

    #[test]
    fn test_send_stamps_sender_and_target() {
        let hub = MemoryHub::new();
        hub.join("b");
        let mut b = Broadcaster::new("a".to_string(), Box::new(hub.join("a")));

        b.send_to("b", &Message::PoolSyncRequest);
        let routed = hub.take_in_flight();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].envelope.peer_id, "a");
        assert_eq!(routed[0].envelope.target_peer_id.as_deref(), Some("b"));
        assert_eq!(b.stats().sent, 1);
    }

    #[test]
    fn test_send_failure_counted_not_propagated() {
        let mut b = Broadcaster::new("a".to_string(), Box::new(Broken));
        b.send(&Message::Emoji("🎉".to_string()));
        assert_eq!(b.stats(), SendStats { sent: 0, failures: 1 });
    }

    #[test]
    fn test_filters() {
        let b = Broadcaster::new("me".to_string(), Box::new(crate::transport::LocalOnly));

        let echo = envelope("me", None, "emoji", json!("🔥"));
        assert!(matches!(b.receive(echo), Inbound::SelfEcho));

        let foreign = envelope("x", Some("y"), "emoji", json!("🔥"));
        assert!(matches!(b.receive(foreign), Inbound::NotAddressed));

        let garbage = envelope("x", None, "pool:remove", json!(42));
        assert!(matches!(b.receive(garbage), Inbound::Malformed(_)));

        let ours = envelope("x", Some("me"), "emoji", json!("🔥"));
        match b.receive(ours) {
            Inbound::Accepted { from, message } => {
                assert_eq!(from, "x");
                assert_eq!(message, Message::Emoji("🔥".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_self_echo_dropped_before_decode() {
        let b = Broadcaster::new("me".to_string(), Box::new(crate::transport::LocalOnly));
        let echo = envelope("me", None, "no-such-channel", json!(null));
        assert!(matches!(b.receive(echo), Inbound::SelfEcho));
    }
}
