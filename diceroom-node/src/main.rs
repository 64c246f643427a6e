//! Dice Room Node
//!
//! Terminal peer for a shared dice room: stage dice, roll the pool and watch
//! other players' rolls, reactions and settings.

mod commands;

use clap::Parser;
use commands::Command;
use diceroom_core::room::{create_room_id, room_from_fragment};
use diceroom_core::{
    is_valid_color, new_peer_id, unix_millis, DiceSettings, Discovery, JsonFileStore, LocalOnly,
    LogRenderer, PreferenceStore, Preferences, RollPlayer, RollRecord, RoomConfig, RoomError,
    RoomEvent, RoomSession, SettingsError, Transport, TransportEvent, UdpTransport,
};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Shared dice room peer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Player name (remembered between runs)
    #[arg(short, long)]
    name: Option<String>,

    /// Room to join, with or without a leading '#'
    #[arg(short, long, default_value = "")]
    room: String,

    /// UDP port to listen on
    #[arg(short, long, default_value = "9990")]
    port: u16,

    /// Player color as #rgb or #rrggbb (remembered between runs)
    #[arg(short, long)]
    color: Option<String>,

    /// Preferences file
    #[arg(long, default_value = ".diceroom/prefs.json")]
    prefs: PathBuf,

    /// Run without networking
    #[arg(long)]
    local_only: bool,

    /// Length of the headless roll animation in milliseconds
    #[arg(long, default_value = "1500")]
    animation_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Bind UDP and start mDNS presence for the room
async fn start_network(
    session_id: &str,
    name: &str,
    config: &RoomConfig,
    events: mpsc::Sender<TransportEvent>,
) -> Result<(UdpTransport, Option<Discovery>), RoomError> {
    if !config.transport.use_mdns {
        let transport =
            UdpTransport::bind(config.transport.port, Default::default(), events).await?;
        return Ok((transport, None));
    }

    let discovery = Discovery::new(session_id.to_string(), name.to_string(), config.room.clone())?;
    let transport =
        UdpTransport::bind(config.transport.port, discovery.peers(), events.clone()).await?;
    info!("Listening on {}", transport.local_addr());

    discovery.announce(transport.local_addr().port())?;
    discovery.browse(events)?;
    Ok((transport, Some(discovery)))
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn format_roll(record: &RollRecord) -> String {
    let mut parts = Vec::new();
    for roll in record.results_by_peer.values() {
        let values: Vec<String> =
            roll.results.iter().map(|r| format!("d{}={}", r.sides, r.value)).collect();
        parts.push(format!("{} [{}] = {}", roll.player_name, values.join(" "), roll.total));
    }
    let kind = if record.is_group_roll { "group roll" } else { "roll" };
    format!(
        "{} {}: {} | total {}",
        format_time(record.timestamp),
        kind,
        parts.join(", "),
        record.overall_total
    )
}

/// Terminal stand-in for the UI layer
fn show_event(session: &RoomSession, event: &RoomEvent) {
    match event {
        RoomEvent::Connected { room } => println!("* Joined room #{}", room),
        RoomEvent::PeerJoined { peer_id } => println!("* {} joined", peer_id),
        RoomEvent::PeerLeft { peer_id } => println!("* {} left", peer_id),
        RoomEvent::PeerUpdated { peer } if peer.id != *session.self_id() => {
            println!("* {} is now \"{}\" ({})", peer.id, peer.name, peer.color)
        }
        RoomEvent::PeerUpdated { .. } => {}
        RoomEvent::PoolChanged { size, summary } => {
            if *size == 0 {
                println!("* Pool is empty");
            } else {
                println!("* Pool: {}", summary);
            }
        }
        RoomEvent::RollStarted { .. } => {}
        RoomEvent::RollCompleted { record } => println!("* {}", format_roll(record)),
        RoomEvent::EmojiReceived { peer_id, emoji } => {
            let name = session
                .directory()
                .get(peer_id)
                .map(|p| p.name.as_str())
                .unwrap_or(peer_id.as_str());
            println!("* {} {}", name, emoji);
        }
        RoomEvent::CursorMoved { .. } => {}
        RoomEvent::Disconnected => println!("* Disconnected"),
    }
}

fn save_prefs(store: &mut JsonFileStore, prefs: &Preferences) {
    if let Err(e) = store.save(prefs) {
        warn!("Prefs: Failed to save {}: {}", store.path().display(), e);
    }
}

/// Apply one command. Returns false when the node should exit.
fn handle_command(
    session: &mut RoomSession,
    store: &mut JsonFileStore,
    prefs: &mut Preferences,
    cmd: Command,
) -> Result<bool, RoomError> {
    match cmd {
        Command::Add(sides) => {
            let die = session.add_die(sides)?;
            println!("Staged d{} ({})", sides, die.id);
        }
        Command::Remove(die_id) => {
            if !session.remove_die(&die_id) {
                println!("No die {} in the pool", die_id);
            }
        }
        Command::Clear => {
            session.clear_dice();
        }
        Command::Roll => {
            if session.roll_pool().is_none() {
                println!("Pool is empty");
            }
        }
        Command::Quick(sides) => {
            session.quick_roll(sides)?;
        }
        Command::Emoji(emoji) => session.send_emoji(&emoji)?,
        Command::Name(name) => {
            session.set_name(&name)?;
            prefs.name = Some(session.local_peer().name.clone());
            store.save(prefs)?;
        }
        Command::Color(color) => {
            session.set_color(&color)?;
            prefs.color = color;
            store.save(prefs)?;
        }
        Command::Material(material) => {
            session.set_dice_settings(DiceSettings {
                material: Some(material.clone()),
                ..Default::default()
            })?;
            prefs.material = material;
            store.save(prefs)?;
        }
        Command::Texture(texture) => {
            session.set_dice_settings(DiceSettings {
                texture: Some(texture.clone()),
                ..Default::default()
            })?;
            prefs.texture = texture;
            store.save(prefs)?;
        }
        Command::Label(label) => {
            session.set_dice_settings(DiceSettings {
                label_color: Some(label.clone()),
                ..Default::default()
            })?;
            prefs.label_color = label;
            store.save(prefs)?;
        }
        Command::Cursor(x, y) => {
            session.move_cursor(x, y)?;
        }
        Command::Peers => {
            for peer in session.directory().sorted_for_display() {
                let me = if peer.id == *session.self_id() { " (you)" } else { "" };
                println!("  {} {}{} [{}]", peer.color, peer.name, me, peer.id);
            }
        }
        Command::Pool => {
            if session.pool().is_empty() {
                println!("  (empty)");
            }
            for die in session.pool().dice() {
                println!("  d{:<3} {} ({})", die.sides, die.player_name, die.id);
            }
        }
        Command::History => {
            if session.history().is_empty() {
                println!("  (no rolls yet)");
            }
            for record in session.history().iter() {
                println!("  {}", format_roll(record));
            }
        }
        Command::NewRoom(name) => {
            let id = create_room_id(&name, unix_millis())?;
            println!("New room: #{} (restart with --room {})", id, id);
        }
        Command::Help => print!("{}", commands::HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Reject flag values that other peers would refuse
fn check_flags(args: &Args) -> Result<(), RoomError> {
    if let Some(name) = &args.name {
        if name.trim().is_empty() {
            return Err(SettingsError::EmptyName.into());
        }
    }
    if let Some(color) = &args.color {
        if !is_valid_color(color) {
            return Err(SettingsError::InvalidColor(color.clone()).into());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    check_flags(&args)?;

    // Preferences, overridden by flags
    let mut store = JsonFileStore::new(args.prefs.clone());
    let mut prefs = store.load().unwrap_or_else(|e| {
        warn!("Prefs: Failed to load {}: {}", args.prefs.display(), e);
        Preferences::default()
    });
    if let Some(name) = &args.name {
        prefs.name = Some(name.clone());
    }
    if let Some(color) = &args.color {
        prefs.color = color.clone();
    }
    save_prefs(&mut store, &prefs);

    let mut config = RoomConfig::new(room_from_fragment(&args.room))
        .with_port(args.port)
        .with_animation(Duration::from_millis(args.animation_ms));
    if args.local_only {
        config = config.without_mdns();
    }

    let session_id = new_peer_id();
    let local = prefs.local_peer(&session_id);
    info!("Dice room node \"{}\" ({}) starting", local.name, session_id);

    // Network, falling back to local-only play
    let (transport_tx, mut transport_rx) = mpsc::channel::<TransportEvent>(256);
    let mut discovery = None;
    let transport: Box<dyn Transport> = if args.local_only {
        Box::new(LocalOnly)
    } else {
        match start_network(&session_id, &local.name, &config, transport_tx).await {
            Ok((udp, mdns)) => {
                discovery = mdns;
                Box::new(udp)
            }
            Err(e) => {
                warn!("Transport: {}. Continuing without network features", e);
                Box::new(LocalOnly)
            }
        }
    };

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<RoomEvent>();
    let (mut player, mut render_rx) = RollPlayer::new(LogRenderer::new(config.animation));
    let sync_delay = config.sync_delay;

    let mut session = RoomSession::new(config, local, transport, vec![Box::new(ui_tx)]);
    session.init();

    // Stdin handler
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(16);
    std::thread::spawn(move || {
        print!("\n{}\n", commands::HELP);

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match commands::parse(&line) {
                Ok(Some(cmd)) => {
                    if cmd_tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            }
        }
    });

    let sync_timer = tokio::time::sleep(sync_delay);
    tokio::pin!(sync_timer);
    let mut synced = false;

    // Main event loop
    loop {
        tokio::select! {
            Some(event) = transport_rx.recv() => {
                session.handle_transport_event(event);
            }

            Some(cmd) = cmd_rx.recv() => {
                match handle_command(&mut session, &mut store, &mut prefs, cmd) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("{}", e),
                }
            }

            Some(event) = ui_rx.recv() => {
                if let RoomEvent::RollStarted { record, theme } = &event {
                    player.play(record, theme.clone());
                }
                show_event(&session, &event);
            }

            Some(outcome) = render_rx.recv() => {
                session.finish_roll(&outcome.roll_id, outcome.result);
            }

            () = &mut sync_timer, if !synced => {
                synced = true;
                session.request_sync();
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    player.abort();
    session.teardown();
    while let Ok(event) = ui_rx.try_recv() {
        show_event(&session, &event);
    }
    if let Some(discovery) = discovery {
        if let Err(e) = discovery.shutdown() {
            warn!("mDNS: Shutdown failed: {}", e);
        }
    }
    // Let the send loop flush the final pool:clear
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
