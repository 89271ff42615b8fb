//! Shared harness for the end-to-end mesh scenarios below: each
//! [`TestNode`] is a real `TcpTransport` bound to loopback, wired up with
//! the same accept-loop/dispatch-loop shape `main.rs` runs, minus the TUI.
//! Frames that reach a node's dispatcher turn into transcript lines on an
//! `UnboundedReceiver<String>` tests can poll with a timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use offgrid::app::AppEvent;
use offgrid::connection::{ConnectionManager, LinkEvent};
use offgrid::dispatcher::{self, DispatchContext};
use offgrid::frame::{encode, Frame};
use offgrid::gossip::GossipTable;
use offgrid::relay::RelayEngine;
use offgrid::transfer::TransferTable;
use offgrid::transport::{TcpTransport, Transport};
use offgrid::types::{Direction, Nickname, PeerAddress};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// How long a test waits for a transcript line or a file to land before
/// concluding the frame never arrived.
pub const WAIT: Duration = Duration::from_secs(3);

pub struct TestNode {
    pub address: PeerAddress,
    pub nickname: Nickname,
    pub connections: Arc<ConnectionManager>,
    pub downloads_dir: TempDir,
    link_events_tx: mpsc::UnboundedSender<LinkEvent>,
    transcript_rx: mpsc::UnboundedReceiver<String>,
}

impl TestNode {
    /// Binds a fresh loopback listener and starts its accept loop and
    /// dispatch loop, exactly the shape `main()` wires up per node.
    pub async fn spawn(nickname: &str) -> Self {
        let transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind loopback transport");
        let address = PeerAddress::normalize(transport.local_addr());
        let nickname = Nickname::new(nickname);

        let connections = Arc::new(ConnectionManager::new());
        let relay = RelayEngine::new();
        let gossip = GossipTable::new();
        let transfers = TransferTable::new();
        let downloads_dir = TempDir::new().expect("tempdir");

        let (link_events_tx, link_events_rx) = mpsc::unbounded_channel::<LinkEvent>();
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel::<String>();

        spawn_accept_loop(Arc::clone(&connections), transport, link_events_tx.clone());
        spawn_dispatch_loop(
            Arc::clone(&connections),
            relay,
            gossip,
            transfers,
            downloads_dir.path().to_path_buf(),
            address.clone(),
            nickname.clone(),
            link_events_rx,
            transcript_tx,
        );

        TestNode {
            address,
            nickname,
            connections,
            downloads_dir,
            link_events_tx,
            transcript_rx,
        }
    }

    /// Dials `other`, admitting the resulting stream onto this node's
    /// shared link-event channel (the same channel the accept loop feeds).
    pub async fn dial(&self, other: &TestNode) {
        let dial_addr = other.address.to_string();
        let stream = tokio::net::TcpStream::connect(&dial_addr).await.expect("connect");
        let peer_addr = stream.peer_addr().map(|a| a.to_string()).unwrap_or(dial_addr);
        let peer = PeerAddress::normalize(&peer_addr);
        self.connections
            .admit(
                peer.clone(),
                format!("peer-{peer_addr}"),
                Direction::Outbound,
                stream,
                self.link_events_tx.clone(),
            )
            .expect("admit outbound link");
        let _ = self.connections.send_to(&peer, encode(&Frame::Nick(self.nickname.as_str().to_string())));
        // Give the peer's accept loop a moment to admit its side before
        // the caller starts sending.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Broadcasts a chat line to every direct peer, the way
    /// `Command::Text` does from the TUI's input box.
    pub fn send_text(&self, text: &str) {
        self.connections.send_to_all_except(None, &encode(&Frame::Msg(text.to_string())));
    }

    /// Broadcasts a nickname change, the way `Command::Nick` does.
    pub fn announce_nickname(&self, name: &str) {
        self.connections.send_to_all_except(None, &encode(&Frame::Nick(name.to_string())));
    }

    pub async fn send_file(&self, filename: &str, contents: &[u8]) {
        let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
        offgrid::transfer::send_file(&self.connections, filename, contents, &progress_tx)
            .await
            .expect("send_file");
    }

    /// Waits up to [`WAIT`] for the next transcript line.
    pub async fn recv_transcript_line(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.transcript_rx.recv()).await.ok().flatten()
    }

    /// Drains whatever transcript lines have already arrived without
    /// blocking.
    pub fn drain_transcript(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.transcript_rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}

fn spawn_accept_loop(connections: Arc<ConnectionManager>, transport: TcpTransport, events_tx: mpsc::UnboundedSender<LinkEvent>) {
    tokio::spawn(async move {
        loop {
            match transport.accept().await {
                Ok(accepted) => {
                    let address = PeerAddress::normalize(&accepted.remote_address);
                    let _ = connections.admit(
                        address,
                        accepted.remote_device_name,
                        Direction::Inbound,
                        accepted.stream,
                        events_tx.clone(),
                    );
                }
                Err(_) => break,
            }
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn spawn_dispatch_loop(
    connections: Arc<ConnectionManager>,
    relay: RelayEngine,
    gossip: GossipTable,
    transfers: TransferTable,
    downloads_dir: PathBuf,
    local_address: PeerAddress,
    local_nickname: Nickname,
    mut link_events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    transcript_tx: mpsc::UnboundedSender<String>,
) {
    tokio::spawn(async move {
        let (app_events_tx, mut app_events_rx) = mpsc::unbounded_channel::<AppEvent>();
        loop {
            tokio::select! {
                Some(event) = link_events_rx.recv() => {
                    match event {
                        LinkEvent::Frame(from, Ok(frame)) => {
                            let ctx = DispatchContext {
                                local_address: &local_address,
                                local_nickname: &local_nickname,
                                connections: &connections,
                                relay: &relay,
                                gossip: &gossip,
                                transfers: &transfers,
                                downloads_dir: &downloads_dir,
                            };
                            dispatcher::handle_frame(&ctx, &from, frame, &app_events_tx);
                        }
                        LinkEvent::Frame(_, Err(_)) => {}
                        LinkEvent::Disconnected(addr) => {
                            let _ = transcript_tx.send(format!("[LINK] Disconnected: {addr}"));
                        }
                    }
                }
                Some(event) = app_events_rx.recv() => {
                    if let AppEvent::Transcript(line) = event {
                        let _ = transcript_tx.send(line);
                    }
                }
                else => break,
            }
        }
    });
}
