//! The mesh relay engine (spec §4.4): loop-free forwarding of `RELAY`
//! frames via message-id memoization and hop-count decay.
//!
//! Each message carries a globally-unique id; a node forwards it at most
//! once because the first insertion into the seen-id table is the only
//! gate. Hop count bounds total traversal independently of how long ids
//! are remembered — the 5-minute TTL only frees memory.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::frame::Frame;
use crate::types::PeerAddress;

pub const MAX_HOP_COUNT: u32 = 7;
const SEEN_ID_TTL: ChronoDuration = ChronoDuration::minutes(5);

/// Why a `RELAY` frame's parse guards rejected it — a typed reason instead
/// of a bare log string, so callers (and tests) can match on it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("message {0} already seen")]
    AlreadySeen(String),
    #[error("unparseable hop count: {0}")]
    MalformedHopCount(String),
    #[error("hop count expired")]
    HopExpired,
    #[error("self-origin frame")]
    SelfOrigin,
}

/// What became of one `RELAY` frame as it passed through the engine.
#[derive(Debug, Default)]
pub struct RelayDecision {
    /// Set if this frame should be rendered locally.
    pub deliver: Option<DeliverInfo>,
    /// Set if this frame should be re-emitted to every link but the one
    /// it arrived on.
    pub forward: Option<Frame>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DeliverInfo {
    pub from_nick: String,
    pub content: String,
    /// True when the frame arrived from a node other than its original
    /// sender — i.e. it took at least one mesh hop to reach us.
    pub via_mesh: bool,
}

/// The `_seen_message_ids` table: message id → first-seen timestamp.
pub struct RelayEngine {
    seen_ids: DashMap<String, DateTime<Utc>>,
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayEngine {
    pub fn new() -> Self {
        RelayEngine {
            seen_ids: DashMap::new(),
        }
    }

    /// Evicts seen-id entries older than the 5-minute TTL. Lazy: run
    /// whenever the relay handler runs, per spec §4.4 step 3.
    fn gc(&self, now: DateTime<Utc>) {
        self.seen_ids.retain(|_, ts| now - *ts < SEEN_ID_TTL);
    }

    /// Processes one `RELAY` frame arriving on `arrived_on`. `now` is
    /// injected so tests can control TTL behavior deterministically.
    pub fn handle(
        &self,
        now: DateTime<Utc>,
        local_address: &PeerAddress,
        arrived_on: &PeerAddress,
        msg_id: &str,
        from_addr: &str,
        from_nick: &str,
        to_addr: &str,
        hop_count: &str,
        content: &str,
    ) -> RelayDecision {
        // Loop guard: first sighting wins the gate, regardless of any
        // later guard rejecting the frame for forwarding/delivery.
        let first_sighting = self.seen_ids.insert(msg_id.to_string(), now).is_none();
        if !first_sighting {
            let reason = RelayError::AlreadySeen(msg_id.to_string());
            debug!(%msg_id, error = %reason, "relay: dropping");
            return RelayDecision::default();
        }

        self.gc(now);

        let Ok(hop) = hop_count.parse::<i64>() else {
            let reason = RelayError::MalformedHopCount(hop_count.to_string());
            debug!(%msg_id, error = %reason, "relay: dropping");
            return RelayDecision::default();
        };
        if hop <= 0 {
            let reason = RelayError::HopExpired;
            debug!(%msg_id, hop, error = %reason, "relay: dropping");
            return RelayDecision::default();
        }

        if from_addr == local_address.as_str() {
            let reason = RelayError::SelfOrigin;
            debug!(%msg_id, error = %reason, "relay: dropping");
            return RelayDecision::default();
        }

        let is_for_us = to_addr == "*" || to_addr == local_address.as_str();
        let deliver = if is_for_us {
            Some(DeliverInfo {
                from_nick: from_nick.to_string(),
                content: content.to_string(),
                via_mesh: arrived_on.as_str() != from_addr,
            })
        } else {
            None
        };

        let new_hop = hop - 1;
        let forward = if new_hop > 0 {
            Some(Frame::Relay {
                msg_id: msg_id.to_string(),
                from_addr: from_addr.to_string(),
                from_nick: from_nick.to_string(),
                to_addr: to_addr.to_string(),
                hop_count: new_hop.to_string(),
                content: content.to_string(),
            })
        } else {
            None
        };

        RelayDecision { deliver, forward }
    }

    #[cfg(test)]
    fn seen_count(&self) -> usize {
        self.seen_ids.len()
    }
}
