//! mDNS discovery for dice room peers
//!
//! Each session advertises itself under its peer id with the room name in
//! the TXT record. Only services in the same room make it into the peer
//! book, and every change produces a full presence snapshot.

use crate::error::TransportError;
use crate::transport::TransportEvent;
use crate::types::PeerId;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// mDNS service type for dice room peers
pub const SERVICE_TYPE: &str = "_diceroom._udp.local.";

const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where a discovered peer can be reached
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub name: String,
    pub addr: SocketAddr,
    pub last_seen: SystemTime,
}

/// Address book shared between discovery and the UDP transport
pub type PeerBook = Arc<RwLock<HashMap<PeerId, PeerInfo>>>;

/// Discovery service for peers in one room
pub struct Discovery {
    peer_id: PeerId,
    name: String,
    room: String,
    daemon: ServiceDaemon,
    peers: PeerBook,
}

impl Discovery {
    pub fn new(peer_id: PeerId, name: String, room: String) -> Result<Self, TransportError> {
        let daemon = ServiceDaemon::new()?;

        Ok(Self {
            peer_id,
            name,
            room,
            daemon,
            peers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Get shared reference to the peer book
    pub fn peers(&self) -> PeerBook {
        self.peers.clone()
    }

    /// Announce this session, reachable on UDP `port`
    pub fn announce(&self, port: u16) -> Result<(), TransportError> {
        let host = format!("{}.local.", self.peer_id);

        let mut properties = HashMap::new();
        properties.insert("room".to_string(), self.room.clone());
        properties.insert("name".to_string(), self.name.clone());
        properties.insert("version".to_string(), PROTOCOL_VERSION.to_string());

        let service_info =
            ServiceInfo::new(SERVICE_TYPE, &self.peer_id, &host, (), port, properties)?
                .enable_addr_auto();

        self.daemon.register(service_info)?;
        info!("mDNS: Announcing {} in room \"{}\"", self.peer_id, self.room);
        Ok(())
    }

    /// Start browsing; presence snapshots are pushed into `events`
    pub fn browse(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let receiver = self.daemon.browse(SERVICE_TYPE)?;
        let peers = self.peers.clone();
        let my_id = self.peer_id.clone();
        let room = self.room.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv_async().await {
                    Ok(event) => {
                        if !Self::handle_event(&my_id, &room, &peers, event).await {
                            continue;
                        }
                        let snapshot: Vec<PeerId> = peers.read().await.keys().cloned().collect();
                        if events.send(TransportEvent::Presence(snapshot)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("mDNS: Browse error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Update the peer book. Returns whether the presence set may have changed.
    async fn handle_event(my_id: &str, room: &str, peers: &PeerBook, event: ServiceEvent) -> bool {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                let peer_id = info.get_fullname().split('.').next().unwrap_or("").to_string();
                if peer_id.is_empty() || peer_id == my_id {
                    return false;
                }

                let properties = info.get_properties();
                let their_room = properties.get("room").map(|v| v.val_str().to_string());
                if their_room.as_deref() != Some(room) {
                    debug!("mDNS: Ignoring {} from another room", peer_id);
                    return false;
                }

                let name = properties
                    .get("name")
                    .map(|v| v.val_str().to_string())
                    .unwrap_or_else(|| peer_id.clone());

                let addr = info
                    .get_addresses()
                    .iter()
                    .find(|a| matches!(a, IpAddr::V4(_)))
                    .copied()
                    .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

                let peer_info = PeerInfo {
                    peer_id: peer_id.clone(),
                    name,
                    addr: SocketAddr::new(addr, info.get_port()),
                    last_seen: SystemTime::now(),
                };

                info!(
                    "mDNS: Discovered \"{}\" ({}) at {}",
                    peer_id, peer_info.name, peer_info.addr
                );
                peers.write().await.insert(peer_id, peer_info);
                true
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                let peer_id = fullname.split('.').next().unwrap_or("").to_string();
                if peers.write().await.remove(&peer_id).is_some() {
                    debug!("mDNS: Peer \"{}\" removed", peer_id);
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// Shutdown the discovery service
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.daemon.shutdown()?;
        Ok(())
    }
}
