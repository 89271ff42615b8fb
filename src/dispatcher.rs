//! The message dispatcher (spec §4.3): routes each decoded frame arriving
//! on a link to its handler, turning protocol events into [`AppEvent`]s
//! the UI layer can render.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::app::AppEvent;
use crate::connection::ConnectionManager;
use crate::frame::{encode, Frame};
use crate::gossip::GossipTable;
use crate::relay::{RelayEngine, MAX_HOP_COUNT};
use crate::transfer::TransferTable;
use crate::types::{MessageId, Nickname, PeerAddress};

const TYPING_AUTO_CLEAR: Duration = Duration::from_secs(3);

/// Shared references the dispatcher needs to process one frame. Built
/// fresh (cheap `Arc` clones) per call from the node's owned state.
pub struct DispatchContext<'a> {
    pub local_address: &'a PeerAddress,
    pub local_nickname: &'a Nickname,
    pub connections: &'a ConnectionManager,
    pub relay: &'a RelayEngine,
    pub gossip: &'a GossipTable,
    pub transfers: &'a TransferTable,
    pub downloads_dir: &'a PathBuf,
}

/// Handles one frame that arrived on `from_link`, pushing any resulting
/// UI-facing events onto `events_tx`.
pub fn handle_frame(
    ctx: &DispatchContext<'_>,
    from_link: &PeerAddress,
    frame: Frame,
    events_tx: &mpsc::UnboundedSender<AppEvent>,
) {
    match frame {
        Frame::Msg(content) => handle_msg(ctx, from_link, content, events_tx),
        Frame::Relay {
            msg_id,
            from_addr,
            from_nick,
            to_addr,
            hop_count,
            content,
        } => handle_relay(ctx, from_link, &msg_id, &from_addr, &from_nick, &to_addr, &hop_count, &content, events_tx),
        Frame::Peers(entries) => handle_peers(ctx, from_link, entries),
        Frame::Typing(on) => handle_typing(from_link.clone(), on, events_tx),
        Frame::Nick(name) => handle_nick(ctx, from_link, name, events_tx),
        Frame::FileStart {
            filename,
            orig_size,
            comp_size,
            total_chunks,
            checksum,
        } => handle_file_start(ctx, from_link, filename, orig_size, comp_size, total_chunks, checksum, events_tx),
        Frame::FileChunk { index, data_b64 } => handle_file_chunk(ctx, from_link, index, data_b64, events_tx),
        Frame::FileEnd { .. } => handle_file_end(ctx, from_link, events_tx),
        Frame::Raw(text) => {
            let display = ctx.connections.display_name_of(from_link);
            let _ = events_tx.send(AppEvent::Transcript(format!("[{display}]: {text}")));
        }
    }
}

fn handle_msg(
    ctx: &DispatchContext<'_>,
    from_link: &PeerAddress,
    content: String,
    events_tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let display = ctx.connections.display_name_of(from_link);
    let _ = events_tx.send(AppEvent::Transcript(format!("[{display}]: {content}")));

    let relay = Frame::Relay {
        msg_id: MessageId::generate().to_string(),
        from_addr: from_link.to_string(),
        from_nick: display,
        to_addr: "*".to_string(),
        hop_count: (MAX_HOP_COUNT - 1).to_string(),
        content,
    };
    ctx.connections.send_to_all_except(Some(from_link), &encode(&relay));
}

#[allow(clippy::too_many_arguments)]
fn handle_relay(
    ctx: &DispatchContext<'_>,
    from_link: &PeerAddress,
    msg_id: &str,
    from_addr: &str,
    from_nick: &str,
    to_addr: &str,
    hop_count: &str,
    content: &str,
    events_tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let decision = ctx.relay.handle(
        Utc::now(),
        ctx.local_address,
        from_link,
        msg_id,
        from_addr,
        from_nick,
        to_addr,
        hop_count,
        content,
    );

    if let Some(deliver) = decision.deliver {
        let via_tag = if deliver.via_mesh { " [via mesh]" } else { "" };
        let _ = events_tx.send(AppEvent::Transcript(format!(
            "[{}]{via_tag}: {}",
            deliver.from_nick, deliver.content
        )));
    }

    if let Some(forward) = decision.forward {
        ctx.connections.send_to_all_except(Some(from_link), &encode(&forward));
    }
}

fn handle_peers(ctx: &DispatchContext<'_>, from_link: &PeerAddress, entries: Vec<(String, String)>) {
    let now = Utc::now();
    let source_display = ctx.connections.display_name_of(from_link);
    for (nick, raw_addr) in entries {
        let addr = PeerAddress::normalize(&raw_addr);
        ctx.gossip
            .apply_entry(ctx.local_address, ctx.connections, &addr, &nick, from_link, &source_display, now);
    }
}

fn handle_typing(peer: PeerAddress, on: bool, events_tx: &mpsc::UnboundedSender<AppEvent>) {
    let _ = events_tx.send(AppEvent::TypingChanged { peer: peer.clone(), typing: on });
    if on {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TYPING_AUTO_CLEAR).await;
            let _ = tx.send(AppEvent::TypingChanged { peer, typing: false });
        });
    }
}

fn handle_nick(
    ctx: &DispatchContext<'_>,
    from_link: &PeerAddress,
    name: String,
    events_tx: &mpsc::UnboundedSender<AppEvent>,
) {
    ctx.connections.set_nickname(from_link.clone(), Nickname::new(name.as_str()));
    let _ = events_tx.send(AppEvent::Transcript(format!("[SYSTEM] {from_link} is now known as {name}")));
    let _ = events_tx.send(AppEvent::PeerListChanged);
}

#[allow(clippy::too_many_arguments)]
fn handle_file_start(
    ctx: &DispatchContext<'_>,
    from_link: &PeerAddress,
    filename: String,
    orig_size: String,
    comp_size: String,
    total_chunks: String,
    checksum: String,
    events_tx: &mpsc::UnboundedSender<AppEvent>,
) {
    if let Err(e) = ctx
        .transfers
        .start(from_link.clone(), &filename, &orig_size, &comp_size, &total_chunks, &checksum)
    {
        warn!(peer = %from_link, error = %e, "malformed FSTART");
        let _ = events_tx.send(AppEvent::Transcript("[ERROR] File assembly failed".to_string()));
        return;
    }
    let _ = events_tx.send(AppEvent::Transcript(format!(
        "[SYSTEM] receiving {filename} from {}",
        ctx.connections.display_name_of(from_link)
    )));
}

fn handle_file_chunk(
    ctx: &DispatchContext<'_>,
    from_link: &PeerAddress,
    index: String,
    data_b64: String,
    events_tx: &mpsc::UnboundedSender<AppEvent>,
) {
    match ctx.transfers.store_chunk(from_link, &index, &data_b64) {
        Ok(Some((done, total))) => {
            if done % 10 == 0 || done == total {
                let _ = events_tx.send(AppEvent::TransferProgress(crate::transfer::TransferProgress {
                    peer: from_link.clone(),
                    chunks_done: done,
                    total_chunks: total,
                }));
            }
        }
        Ok(None) => {
            // No in-progress transfer for this peer — dropped silently
            // per spec §4.6.
        }
        Err(e) => {
            warn!(peer = %from_link, error = %e, "malformed FCHUNK");
        }
    }
}

fn handle_file_end(ctx: &DispatchContext<'_>, from_link: &PeerAddress, events_tx: &mpsc::UnboundedSender<AppEvent>) {
    match ctx.transfers.finish(from_link, ctx.downloads_dir) {
        Ok(path) => {
            let _ = events_tx.send(AppEvent::Transcript(format!(
                "[SYSTEM] saved {}",
                path.display()
            )));
        }
        Err(e) => {
            warn!(peer = %from_link, error = %e, "file assembly failed");
            let _ = events_tx.send(AppEvent::Transcript("[ERROR] File assembly failed".to_string()));
            ctx.transfers.drop_transfer(from_link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx_fixture<'a>(
        local_address: &'a PeerAddress,
        local_nickname: &'a Nickname,
        connections: &'a ConnectionManager,
        relay: &'a RelayEngine,
        gossip: &'a GossipTable,
        transfers: &'a TransferTable,
        downloads_dir: &'a PathBuf,
    ) -> DispatchContext<'a> {
        DispatchContext {
            local_address,
            local_nickname,
            connections,
            relay,
            gossip,
            transfers,
            downloads_dir,
        }
    }

    #[test]
    fn msg_is_rendered_and_reissued_as_relay_with_hop_six() {
        let local_address = PeerAddress::normalize("BB");
        let local_nickname = Nickname::new("B");
        let connections = ConnectionManager::new();
        let relay = RelayEngine::new();
        let gossip = GossipTable::new();
        let transfers = TransferTable::new();
        let downloads_dir = PathBuf::from("/tmp");
        let ctx = ctx_fixture(&local_address, &local_nickname, &connections, &relay, &gossip, &transfers, &downloads_dir);

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_frame(&ctx, &PeerAddress::normalize("AA"), Frame::Msg("hello".to_string()), &tx);

        let event = rx.try_recv().unwrap();
        match event {
            AppEvent::Transcript(line) => assert!(line.contains("hello")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn peers_frame_populates_gossip_table() {
        let local_address = PeerAddress::normalize("AA");
        let local_nickname = Nickname::new("A");
        let connections = ConnectionManager::new();
        let relay = RelayEngine::new();
        let gossip = GossipTable::new();
        let transfers = TransferTable::new();
        let downloads_dir = PathBuf::from("/tmp");
        let ctx = ctx_fixture(&local_address, &local_nickname, &connections, &relay, &gossip, &transfers, &downloads_dir);

        let (tx, _rx) = mpsc::unbounded_channel();
        handle_frame(
            &ctx,
            &PeerAddress::normalize("BB"),
            Frame::Peers(vec![("Carol".to_string(), "CC".to_string())]),
            &tx,
        );

        assert!(gossip.contains(&PeerAddress::normalize("CC")));
    }
}
