//! Peer-discovery gossip (spec §4.5): periodic `PEERS` broadcasts and the
//! known-peers table tracking nodes reachable only indirectly.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

use crate::connection::ConnectionManager;
use crate::types::{Nickname, PeerAddress};

pub const GOSSIP_INTERVAL: Duration = Duration::from_secs(30);
pub const GOSSIP_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// One entry of `_known_peers`: a node reachable through some direct
/// neighbor but not directly linked to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshPeer {
    pub nickname: String,
    pub via_address: PeerAddress,
    pub via_nickname: String,
    pub last_seen: DateTime<Utc>,
    pub is_direct: bool,
}

/// The `_known_peers` table.
#[derive(Default)]
pub struct GossipTable {
    known_peers: DashMap<PeerAddress, MeshPeer>,
}

impl GossipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one `(nickname, address)` entry from a received `PEERS`
    /// frame (spec §4.5 receipt rules). `source` is the direct neighbor
    /// the `PEERS` frame arrived from.
    pub fn apply_entry(
        &self,
        local_address: &PeerAddress,
        connections: &ConnectionManager,
        addr: &PeerAddress,
        nickname: &str,
        source_address: &PeerAddress,
        source_display_name: &str,
        now: DateTime<Utc>,
    ) {
        if addr == local_address {
            return;
        }
        if connections.is_connected(addr) {
            return;
        }
        self.known_peers.insert(
            addr.clone(),
            MeshPeer {
                nickname: nickname.to_string(),
                via_address: source_address.clone(),
                via_nickname: source_display_name.to_string(),
                last_seen: now,
                is_direct: false,
            },
        );
    }

    /// Removes any known-peer entry that has become a direct link — the
    /// invariant from spec §3 enforced on the next gossip tick.
    pub fn shadow_direct_connections(&self, connections: &ConnectionManager) {
        self.known_peers
            .retain(|addr, _| !connections.is_connected(addr));
    }

    pub fn entries(&self) -> Vec<(PeerAddress, MeshPeer)> {
        self.known_peers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn contains(&self, addr: &PeerAddress) -> bool {
        self.known_peers.contains_key(addr)
    }
}

/// Builds the union of local identity, direct peers, and known mesh peers
/// that makes up one outbound `PEERS:` broadcast (spec §4.5).
pub fn build_gossip_entries(
    local_nickname: &Nickname,
    local_address: &PeerAddress,
    connections: &ConnectionManager,
    known_peers: &GossipTable,
) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    entries.push((local_nickname.as_str().to_string(), local_address.to_string()));

    for (addr, display_name, _direction) in connections.direct_peers() {
        entries.push((display_name, addr.to_string()));
    }

    for (addr, peer) in known_peers.entries() {
        entries.push((peer.nickname, addr.to_string()));
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PeerAddress {
        PeerAddress::normalize(s)
    }

    #[test]
    fn ignores_local_address() {
        let table = GossipTable::new();
        let conns = ConnectionManager::new();
        let local = addr("AA");
        table.apply_entry(&local, &conns, &local, "Me", &addr("BB"), "B", Utc::now());
        assert!(table.entries().is_empty());
    }

    #[test]
    fn ignores_directly_connected_address() {
        let table = GossipTable::new();
        let conns = ConnectionManager::new();
        let bb = addr("BB");
        conns.admit_test_only(bb.clone());
        table.apply_entry(&addr("AA"), &conns, &bb, "Bob", &addr("CC"), "C", Utc::now());
        assert!(table.entries().is_empty());
    }

    #[test]
    fn upserts_indirect_peer() {
        let table = GossipTable::new();
        let conns = ConnectionManager::new();
        let local = addr("AA");
        let cc = addr("CC");
        table.apply_entry(&local, &conns, &cc, "Carol", &addr("BB"), "Bob", Utc::now());
        let entries = table.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, cc);
        assert_eq!(entries[0].1.nickname, "Carol");
        assert_eq!(entries[0].1.via_nickname, "Bob");
    }

    #[test]
    fn applying_same_entry_twice_is_idempotent() {
        let table = GossipTable::new();
        let conns = ConnectionManager::new();
        let local = addr("AA");
        let cc = addr("CC");
        let now = Utc::now();
        table.apply_entry(&local, &conns, &cc, "Carol", &addr("BB"), "Bob", now);
        table.apply_entry(&local, &conns, &cc, "Carol", &addr("BB"), "Bob", now);
        assert_eq!(table.entries().len(), 1);
    }

    #[test]
    fn direct_connection_shadows_existing_known_peer() {
        let table = GossipTable::new();
        let conns = ConnectionManager::new();
        let local = addr("AA");
        let cc = addr("CC");
        table.apply_entry(&local, &conns, &cc, "Carol", &addr("BB"), "Bob", Utc::now());
        assert!(table.contains(&cc));
        conns.admit_test_only(cc.clone());
        table.shadow_direct_connections(&conns);
        assert!(!table.contains(&cc));
    }
}
