//! Transports for dice room envelopes
//!
//! The send side is the [`Transport`] trait: a non-blocking, best-effort
//! enqueue. The receive side is a stream of [`TransportEvent`]s that the
//! host feeds into the session.

use crate::discovery::PeerBook;
use crate::error::TransportError;
use crate::message::Envelope;
use crate::types::PeerId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Default UDP port for dice room peers
pub const DEFAULT_PORT: u16 = 9990;

/// Maximum datagram size (64KB is plenty for JSON)
const MAX_MSG_SIZE: usize = 65536;

/// Outbound half of a transport
pub trait Transport: Send + Sync {
    /// Enqueue an envelope for delivery. Never blocks.
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Inbound traffic handed to the session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Envelope(Envelope),
    /// Full set of connected peer ids
    Presence(Vec<PeerId>),
}

/// Transport used when networking is unavailable. Sends go nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

impl Transport for LocalOnly {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        debug!("Local: Dropping {} (no network)", envelope.channel);
        Ok(())
    }
}

/// JSON-over-UDP transport addressed through the discovery peer book
pub struct UdpTransport {
    outgoing: mpsc::UnboundedSender<Envelope>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind `0.0.0.0:port` and start the send and receive loops
    pub async fn bind(
        port: u16,
        peers: PeerBook,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(receive_loop(socket.clone(), events));
        tokio::spawn(send_loop(socket, peers, outgoing_rx));

        Ok(Self { outgoing, local_addr })
    }

    /// Get the local address this transport is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for UdpTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.outgoing.send(envelope).map_err(|_| TransportError::Closed)
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, events: mpsc::Sender<TransportEvent>) {
    let mut buf = vec![0u8; MAX_MSG_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match Envelope::from_bytes(&buf[..len]) {
                Ok(envelope) => {
                    debug!("UDP: Received {} from {}", envelope.channel, src);
                    if events.send(TransportEvent::Envelope(envelope)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("UDP: Failed to parse datagram from {}: {}", src, e);
                }
            },
            Err(e) => {
                error!("UDP: Receive error: {}", e);
            }
        }
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    peers: PeerBook,
    mut outgoing: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = outgoing.recv().await {
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("UDP: Failed to encode {}: {}", envelope.channel, e);
                continue;
            }
        };

        let addrs: Vec<SocketAddr> = {
            let book = peers.read().await;
            match envelope.target_peer_id.as_ref().and_then(|t| book.get(t)) {
                Some(target) => vec![target.addr],
                None => book.values().map(|p| p.addr).collect(),
            }
        };

        for addr in addrs {
            debug!("UDP: Sending {} to {}", envelope.channel, addr);
            if let Err(e) = socket.send_to(&bytes, addr).await {
                warn!("UDP: Failed to send to {}: {}", addr, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PeerInfo;
    use crate::message::Message;
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};
    use tokio::sync::RwLock;

    fn book_with(peer_id: &str, addr: SocketAddr) -> PeerBook {
        let mut map = HashMap::new();
        map.insert(
            peer_id.to_string(),
            PeerInfo {
                peer_id: peer_id.to_string(),
                name: peer_id.to_string(),
                addr,
                last_seen: SystemTime::now(),
            },
        );
        Arc::new(RwLock::new(map))
    }

    #[test]
    fn test_local_only_accepts_everything() {
        let env = Envelope::new("a".to_string(), None, &Message::PoolSyncRequest).unwrap();
        assert!(LocalOnly.send(env).is_ok());
    }

    #[tokio::test]
    async fn test_udp_delivers_to_book() {
        let (rx_events, mut rx) = mpsc::channel(16);
        let receiver = UdpTransport::bind(0, Arc::new(RwLock::new(HashMap::new())), rx_events)
            .await
            .unwrap();
        let target: SocketAddr =
            format!("127.0.0.1:{}", receiver.local_addr().port()).parse().unwrap();

        let (tx_events, _tx_rx) = mpsc::channel(16);
        let sender = UdpTransport::bind(0, book_with("b", target), tx_events).await.unwrap();

        let env = Envelope::new(
            "a".to_string(),
            None,
            &Message::PoolClear {
                peer_id: "a".to_string(),
            },
        )
        .unwrap();
        sender.send(env.clone()).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, TransportEvent::Envelope(env));
    }
}
