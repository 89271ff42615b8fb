//! OffGrid — a serverless mesh chat node: simultaneously a server
//! (accepting inbound links) and a client (dialing outbound links),
//! forwarding messages hop-by-hop across the mesh.

use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::EventStream,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use offgrid::app::{self, Action, AppState};
use offgrid::commands::{self, Command};
use offgrid::config::NodeConfig;
use offgrid::connection::{ConnectionManager, LinkEvent};
use offgrid::dispatcher::{self, DispatchContext};
use offgrid::event;
use offgrid::frame::{encode, Frame};
use offgrid::gossip::{build_gossip_entries, GossipTable, GOSSIP_INITIAL_DELAY, GOSSIP_INTERVAL};
use offgrid::relay::RelayEngine;
use offgrid::transfer::{self, TransferTable};
use offgrid::transport::{TcpTransport, Transport};
use offgrid::types::{Direction, Nickname, PeerAddress};
use offgrid::ui;

/// OffGrid mesh chat node.
#[derive(Parser, Debug)]
#[command(name = "offgrid", about = "Serverless mesh chat over paired device streams")]
struct Cli {
    /// Overrides the persisted nickname for this run.
    #[arg(long)]
    nick: Option<String>,

    /// Address to listen on for inbound links, e.g. 127.0.0.1:4000.
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Dial an outbound link at startup.
    #[arg(long)]
    dial: Option<String>,

    /// Path to the config file (defaults to the platform config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the downloads directory for received files.
    #[arg(long)]
    downloads: Option<PathBuf>,
}

/// Initializes the tracing subscriber: an `EnvFilter` from `OFFGRID_LOG`
/// (defaulting to `info`) and a file layer at `<data_dir>/offgrid.log`.
///
/// No stderr layer — this binary runs its TUI in raw mode/the alternate
/// screen for its entire lifetime, and writing log lines to stderr would
/// corrupt that screen the same way the teacher's TUI binary avoids it.
/// File logging is best-effort: if the data directory can't be created
/// or the log file can't be opened, the node still starts, just without
/// logs.
fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_env("OFFGRID_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = NodeConfig::data_dir()
        .and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            let log_path = dir.join("offgrid.log");
            std::fs::OpenOptions::new().create(true).append(true).open(log_path).ok()
        })
        .map(|file| fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false));

    tracing_subscriber::registry().with(env_filter).with(file_layer).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(p) => p.clone(),
        None => NodeConfig::config_file_path().context("resolving config path")?,
    };
    let mut config = NodeConfig::load_from(&config_path)
        .context("loading config")?
        .unwrap_or_else(NodeConfig::new_first_run);
    if let Some(nick) = &cli.nick {
        config.local_nickname = nick.clone();
    }
    if let Some(downloads) = &cli.downloads {
        config.downloads_dir = Some(downloads.clone());
    }
    config.save_to(&config_path).context("saving config")?;

    let transport = TcpTransport::bind(cli.listen.as_str())
        .await
        .context("no transport available: failed to bind listener")?;

    // The cached `local_address` is the node's stable protocol identity,
    // distinct from whatever ephemeral port this run's bind happened to
    // land on. First run (or a config predating this field) adopts the
    // freshly bound address and persists it; later runs keep using the
    // cached one even though `--listen 127.0.0.1:0` hands out a new port
    // every time.
    let local_address = match &config.local_address {
        Some(cached) => PeerAddress::normalize(cached),
        None => {
            let fresh = PeerAddress::normalize(transport.local_addr());
            config.local_address = Some(fresh.to_string());
            config.save_to(&config_path).context("saving config")?;
            fresh
        }
    };
    info!(address = %local_address, bound_to = %transport.local_addr(), "listening");

    let connections = Arc::new(ConnectionManager::new());
    let relay = RelayEngine::new();
    let gossip = GossipTable::new();
    let transfers = TransferTable::new();
    let downloads_dir = config.downloads_dir();

    let (link_events_tx, mut link_events_rx) = mpsc::unbounded_channel::<LinkEvent>();
    let (app_events_tx, mut app_events_rx) = mpsc::unbounded_channel::<app::AppEvent>();

    let local_nickname = Nickname::new(config.local_nickname.as_str());
    spawn_accept_loop(
        Arc::clone(&connections),
        transport,
        link_events_tx.clone(),
        local_nickname.clone(),
        app_events_tx.clone(),
    );

    if let Some(dial_addr) = &cli.dial {
        dial_peer(
            &connections,
            dial_addr,
            link_events_tx.clone(),
            local_nickname.clone(),
            app_events_tx.clone(),
        )
        .await;
    }

    run_tui(RunContext {
        connections,
        relay,
        gossip,
        transfers,
        downloads_dir,
        local_address,
        local_nickname,
        link_events_rx: &mut link_events_rx,
        app_events_tx,
        app_events_rx: &mut app_events_rx,
    })
    .await
}

fn spawn_accept_loop(
    connections: Arc<ConnectionManager>,
    transport: TcpTransport,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    local_nickname: Nickname,
    app_events_tx: mpsc::UnboundedSender<app::AppEvent>,
) {
    tokio::spawn(async move {
        loop {
            match transport.accept().await {
                Ok(accepted) => {
                    let address = PeerAddress::normalize(&accepted.remote_address);
                    match connections.admit(
                        address.clone(),
                        accepted.remote_device_name,
                        Direction::Inbound,
                        accepted.stream,
                        events_tx.clone(),
                    ) {
                        Ok(()) => {
                            let _ = connections.send_to(&address, encode(&Frame::Nick(local_nickname.as_str().to_string())));
                            info!(%address, "inbound link admitted");
                        }
                        Err(e) => {
                            debug!(%address, error = %e, "duplicate admission");
                            let _ = app_events_tx.send(app::AppEvent::Transcript(
                                "[LINK] Duplicate connection".to_string(),
                            ));
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    });
}

async fn dial_peer(
    connections: &Arc<ConnectionManager>,
    addr: &str,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    local_nickname: Nickname,
    app_events_tx: mpsc::UnboundedSender<app::AppEvent>,
) {
    match tokio::time::timeout(Duration::from_secs(5), tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| addr.to_string());
            let address = PeerAddress::normalize(&peer);
            match connections.admit(address.clone(), format!("peer-{peer}"), Direction::Outbound, stream, events_tx) {
                Ok(()) => {
                    let _ = connections.send_to(&address, encode(&Frame::Nick(local_nickname.as_str().to_string())));
                    info!(%address, "outbound link admitted");
                }
                Err(e) => {
                    debug!(%address, error = %e, "duplicate admission");
                    let _ = app_events_tx.send(app::AppEvent::Transcript("[LINK] Duplicate connection".to_string()));
                }
            }
        }
        Ok(Err(e)) => warn!(error = %e, "dial failed"),
        Err(_) => warn!(%addr, "dial timed out"),
    }
}

struct RunContext<'a> {
    connections: Arc<ConnectionManager>,
    relay: RelayEngine,
    gossip: GossipTable,
    transfers: TransferTable,
    downloads_dir: PathBuf,
    local_address: PeerAddress,
    local_nickname: Nickname,
    link_events_rx: &'a mut mpsc::UnboundedReceiver<LinkEvent>,
    app_events_tx: mpsc::UnboundedSender<app::AppEvent>,
    app_events_rx: &'a mut mpsc::UnboundedReceiver<app::AppEvent>,
}

async fn run_tui(mut ctx: RunContext<'_>) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
        original_hook(info);
    }));

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut app = AppState::new(ctx.local_nickname.as_str().to_string(), ctx.local_address.to_string());
    app.status = "ready".to_string();

    let mut event_stream = EventStream::new();
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let mut gossip_tick = tokio::time::interval(GOSSIP_INITIAL_DELAY);
    let mut gossip_started = false;

    loop {
        terminal.draw(|frame| ui::layout::render(frame, &mut app))?;

        tokio::select! {
            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(evt)) => {
                        if let Some(action) = event::handle_event(&evt, &app) {
                            handle_terminal_action(&mut ctx, &mut app, action).await;
                        }
                    }
                    Some(Err(_)) => {}
                    None => break,
                }
            }

            Some(link_event) = ctx.link_events_rx.recv() => {
                handle_link_event(&ctx, &mut app, link_event);
            }

            Some(app_event) = ctx.app_events_rx.recv() => {
                app.handle_action(Action::Event(app_event));
            }

            _ = gossip_tick.tick() => {
                if !gossip_started {
                    gossip_started = true;
                    gossip_tick = tokio::time::interval(GOSSIP_INTERVAL);
                }
                run_gossip_tick(&ctx);
            }

            _ = tick.tick() => {
                refresh_peer_snapshot(&ctx, &mut app);
            }
        }

        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn refresh_peer_snapshot(ctx: &RunContext<'_>, app: &mut AppState) {
    app.direct_peers = ctx.connections.direct_peers();
    app.mesh_peers = ctx.gossip.entries();
    app.link_count = ctx.connections.link_count();
}

fn run_gossip_tick(ctx: &RunContext<'_>) {
    ctx.gossip.shadow_direct_connections(&ctx.connections);
    let entries = build_gossip_entries(&ctx.local_nickname, &ctx.local_address, &ctx.connections, &ctx.gossip);
    let wire = encode(&Frame::Peers(entries));
    ctx.connections.send_to_all_except(None, &wire);
}

fn handle_link_event(ctx: &RunContext<'_>, app: &mut AppState, event: LinkEvent) {
    match event {
        LinkEvent::Frame(from, Ok(frame)) => {
            let dctx = DispatchContext {
                local_address: &ctx.local_address,
                local_nickname: &ctx.local_nickname,
                connections: &ctx.connections,
                relay: &ctx.relay,
                gossip: &ctx.gossip,
                transfers: &ctx.transfers,
                downloads_dir: &ctx.downloads_dir,
            };
            dispatcher::handle_frame(&dctx, &from, frame, &ctx.app_events_tx);
        }
        LinkEvent::Frame(from, Err(e)) => {
            warn!(peer = %from, error = %e, "protocol error");
            app.transcript.push(format!("[ERROR] Relay parse error: {e}"));
        }
        LinkEvent::Disconnected(addr) => {
            app.transcript.push(format!("[LINK] Disconnected: {addr}"));
            app.link_count = ctx.connections.link_count();
        }
    }
}

async fn handle_terminal_action(ctx: &mut RunContext<'_>, app: &mut AppState, action: Action) {
    match action {
        Action::SubmitInput => {
            let line = app.take_input();
            if line.trim().is_empty() {
                return;
            }
            handle_submitted_line(ctx, app, line).await;
        }
        Action::DialSelectedDevice => {
            // No paired-device directory exists over loopback TCP (spec
            // §6 enumerate_paired_devices is external); nothing to dial.
        }
        other => app.handle_action(other),
    }
}

async fn handle_submitted_line(ctx: &mut RunContext<'_>, app: &mut AppState, line: String) {
    match commands::parse(&line) {
        Command::Clear => app.clear_transcript(),
        Command::Nick(name) => {
            ctx.local_nickname = Nickname::new(name.as_str());
            app.local_nickname = name.clone();
            ctx.connections.send_to_all_except(None, &encode(&Frame::Nick(name)));
            run_gossip_tick(ctx);
        }
        Command::SendFile(path) => {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    let filename = std::path::Path::new(&path)
                        .file_name()
                        .map(|f| f.to_string_lossy().to_string())
                        .unwrap_or(path.clone());
                    let connections = Arc::clone(&ctx.connections);
                    let tx = ctx.app_events_tx.clone();
                    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
                    tokio::spawn(async move {
                        while let Some(p) = progress_rx.recv().await {
                            let _ = tx.send(app::AppEvent::TransferProgress(p));
                        }
                    });
                    let tx2 = ctx.app_events_tx.clone();
                    tokio::spawn(async move {
                        match transfer::send_file(&connections, &filename, &bytes, &progress_tx).await {
                            Ok(_) => {
                                let _ = tx2.send(app::AppEvent::Transcript(format!("[SYSTEM] sent {filename}")));
                            }
                            Err(e) => {
                                let _ = tx2.send(app::AppEvent::Transcript(format!("[ERROR] send failed: {e}")));
                            }
                        }
                    });
                }
                Err(e) => {
                    app.transcript.push(format!("[ERROR] could not read {path}: {e}"));
                }
            }
        }
        Command::Peers => {
            for line in commands::format_peers(&ctx.connections, &ctx.gossip, &ctx.local_address) {
                app.transcript.push(line);
            }
        }
        Command::Unknown(_) => app.transcript.push(commands::HELP_LINE.to_string()),
        Command::Text(text) => {
            app.transcript.push(format!("[{}]: {text}", app.local_nickname));
            ctx.connections.send_to_all_except(None, &encode(&Frame::Msg(text)));
        }
    }
}
