//! The connection manager (spec §4.2): admits inbound and outbound
//! streams, deduplicates concurrent dials to the same normalized address,
//! and owns the active-link set.
//!
//! Each [`Link`] is backed by one reader task (decoding frames off the
//! stream) and one writer task (the single serializer for that stream —
//! spec §5: "a single stream is a serial writer"). Multiple producers
//! (gossip, relay forwarding, the command surface) all send into the same
//! unbounded channel rather than touching the socket directly.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::frame::{decode_line, Frame, FrameError, LineDecoder};
use crate::types::{Direction, Nickname, PeerAddress};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("link to {0} is gone")]
    LinkGone(PeerAddress),
    #[error("duplicate admission for {0}")]
    DuplicateAdmission(PeerAddress),
}

/// An event surfaced by a link's reader task.
#[derive(Debug)]
pub enum LinkEvent {
    /// A frame decoded off the wire. Parse failures are reported alongside
    /// the offending raw line so the dispatcher can log and drop.
    Frame(PeerAddress, Result<Frame, FrameError>),
    /// The link's stream ended (EOF or I/O error); it has already been
    /// torn down by the time this arrives.
    Disconnected(PeerAddress),
}

/// A live, admitted link to one directly-reachable peer.
pub struct Link {
    pub remote_address: PeerAddress,
    pub remote_device_name: String,
    pub direction: Direction,
    outbound: mpsc::UnboundedSender<String>,
}

impl Link {
    /// Queues a fully-encoded frame (including trailing `\n`) for this
    /// link's writer task. Best-effort: if the writer task has already
    /// exited, the send silently fails — the reader task will have
    /// already reported or will shortly report the disconnect.
    pub fn send_frame(&self, wire: String) {
        let _ = self.outbound.send(wire);
    }
}

/// Owns the three shared tables the connection manager is responsible
/// for: the admission lock, the active links, and remote nicknames.
pub struct ConnectionManager {
    connected_addresses: DashSet<PeerAddress>,
    active_connections: DashMap<PeerAddress, Link>,
    remote_nicknames: DashMap<PeerAddress, Nickname>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager {
            connected_addresses: DashSet::new(),
            active_connections: DashMap::new(),
            remote_nicknames: DashMap::new(),
        }
    }

    /// Admits a fresh stream for `address`, spawning its reader and writer
    /// tasks on success. Returns `Err(ConnectionError::DuplicateAdmission)`
    /// (and drops `stream` by letting it go out of scope) if another
    /// admission for the same address won the race — the two-step commit
    /// from spec §4.2.
    pub fn admit(
        self: &Arc<Self>,
        address: PeerAddress,
        remote_device_name: String,
        direction: Direction,
        stream: TcpStream,
        events_tx: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<(), ConnectionError> {
        if !self.connected_addresses.insert(address.clone()) {
            debug!(%address, "duplicate admission, dropping new stream");
            return Err(ConnectionError::DuplicateAdmission(address));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let link = Link {
            remote_address: address.clone(),
            remote_device_name,
            direction,
            outbound: outbound_tx,
        };
        self.active_connections.insert(address.clone(), link);

        let (read_half, write_half) = stream.into_split();
        spawn_writer(write_half, outbound_rx);
        spawn_reader(Arc::clone(self), address, read_half, events_tx);
        Ok(())
    }

    /// Tears down a link: removes it from both tables and drops its
    /// remembered nickname (spec §4.2 teardown).
    pub fn remove(&self, address: &PeerAddress) -> Option<Link> {
        self.connected_addresses.remove(address);
        self.remote_nicknames.remove(address);
        self.active_connections.remove(address).map(|(_, link)| link)
    }

    pub fn is_connected(&self, address: &PeerAddress) -> bool {
        self.connected_addresses.contains(address)
    }

    pub fn link_count(&self) -> usize {
        self.active_connections.len()
    }

    pub fn set_nickname(&self, address: PeerAddress, nick: Nickname) {
        self.remote_nicknames.insert(address, nick);
    }

    pub fn nickname_of(&self, address: &PeerAddress) -> Option<Nickname> {
        self.remote_nicknames.get(address).map(|n| n.clone())
    }

    /// Display name for a peer: its announced nickname if any, else the
    /// transport-reported device name (§3 remote nickname table).
    pub fn display_name_of(&self, address: &PeerAddress) -> String {
        if let Some(nick) = self.nickname_of(address) {
            return nick.as_str().to_string();
        }
        self.active_connections
            .get(address)
            .map(|l| l.remote_device_name.clone())
            .unwrap_or_else(|| address.to_string())
    }

    /// Sends a pre-encoded frame to every active link except `except`
    /// (the "forward to all-but-source" policy used by relay and the MSG
    /// upgrade path). Pass `None` to send to every link.
    pub fn send_to_all_except(&self, except: Option<&PeerAddress>, wire: &str) {
        for entry in self.active_connections.iter() {
            if Some(entry.key()) == except {
                continue;
            }
            entry.value().send_frame(wire.to_string());
        }
    }

    pub fn send_to(&self, address: &PeerAddress, wire: String) -> Result<(), ConnectionError> {
        match self.active_connections.get(address) {
            Some(link) => {
                link.send_frame(wire);
                Ok(())
            }
            None => Err(ConnectionError::LinkGone(address.clone())),
        }
    }

    /// Test-only helper: marks an address as directly connected without
    /// spinning up a real stream, so gossip tests can exercise the
    /// "shadow known peers on direct connection" rule in isolation.
    #[cfg(test)]
    pub fn admit_test_only(&self, address: PeerAddress) {
        self.connected_addresses.insert(address);
    }

    /// Snapshot of `(address, display_name, direction)` for every direct
    /// link, used by `/peers` and by gossip.
    ///
    /// Resolves the display name inline from the nickname table rather
    /// than calling `display_name_of` (which would re-enter
    /// `active_connections` while this iterator already holds a shard
    /// lock on it).
    pub fn direct_peers(&self) -> Vec<(PeerAddress, String, Direction)> {
        self.active_connections
            .iter()
            .map(|e| {
                let display_name = self
                    .nickname_of(e.key())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| e.value().remote_device_name.clone());
                (e.key().clone(), display_name, e.value().direction)
            })
            .collect()
    }
}

fn spawn_writer(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    tokio::spawn(async move {
        while let Some(wire) = outbound_rx.recv().await {
            if let Err(e) = write_half.write_all(wire.as_bytes()).await {
                warn!(error = %e, "link write failed, closing writer task");
                break;
            }
        }
    });
}

fn spawn_reader(
    manager: Arc<ConnectionManager>,
    address: PeerAddress,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
) {
    tokio::spawn(async move {
        let mut decoder = LineDecoder::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(%address, error = %e, "link read failed");
                    break;
                }
            };
            let chunk = match std::str::from_utf8(&buf[..n]) {
                Ok(s) => s,
                Err(_) => {
                    warn!(%address, "link sent non-UTF-8 bytes, closing");
                    break;
                }
            };
            for line in decoder.push(chunk) {
                let decoded = decode_line(&line);
                let frame_result = match decoded {
                    Ok(Some(frame)) => Some(Ok(frame)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                };
                if let Some(result) = frame_result {
                    if events_tx.send(LinkEvent::Frame(address.clone(), result)).is_err() {
                        break;
                    }
                }
            }
        }

        manager.remove(&address);
        let _ = events_tx.send(LinkEvent::Disconnected(address));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_is_single_entry_per_address() {
        let mgr = ConnectionManager::new();
        let addr = PeerAddress::normalize("AABBCC");
        assert!(mgr.connected_addresses.insert(addr.clone()));
        // Second attempt at the same admission lock must fail — this is
        // the core of the two-step commit dedup guarantee.
        assert!(!mgr.connected_addresses.insert(addr));
    }

    #[tokio::test]
    async fn admission_race_leaves_exactly_one_link() {
        let mgr = Arc::new(ConnectionManager::new());
        let addr = PeerAddress::normalize("AABBCC");

        let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let accept_task = tokio::spawn(async move {
            let (s1, _) = server.accept().await.unwrap();
            let (s2, _) = server.accept().await.unwrap();
            (s1, s2)
        });

        let c1 = TcpStream::connect(server_addr).await.unwrap();
        let c2 = TcpStream::connect(server_addr).await.unwrap();
        let (_s1, _s2) = accept_task.await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let admitted_first = mgr.admit(addr.clone(), "peer".to_string(), Direction::Outbound, c1, tx.clone());
        let admitted_second = mgr.admit(addr.clone(), "peer".to_string(), Direction::Outbound, c2, tx);

        assert!(admitted_first.is_ok());
        assert!(matches!(admitted_second, Err(ConnectionError::DuplicateAdmission(_))));
        assert_eq!(mgr.link_count(), 1);
    }

    #[test]
    fn teardown_clears_both_tables_and_nickname() {
        let mgr = ConnectionManager::new();
        let addr = PeerAddress::normalize("AABBCC");
        mgr.connected_addresses.insert(addr.clone());
        mgr.set_nickname(addr.clone(), Nickname::new("Alice"));
        mgr.remove(&addr);
        assert!(!mgr.is_connected(&addr));
        assert!(mgr.nickname_of(&addr).is_none());
    }

    #[test]
    fn display_name_falls_back_to_device_name() {
        let mgr = ConnectionManager::new();
        let addr = PeerAddress::normalize("AABBCC");
        assert_eq!(mgr.display_name_of(&addr), addr.to_string());
    }
}
