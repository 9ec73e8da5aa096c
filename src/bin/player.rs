//! Radio Player Application
//!
//! Plays one internet-radio stream, exposes the web control surface and keeps
//! the clean-shutdown record up to date.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_core::{
    config::AppConfig,
    constants::*,
    engine::{ChannelSink, HttpStreamEngine},
    focus::GrantingFocusHost,
    player::{PlayerBuilder, PlayerEvent},
    store::FileStore,
    ui::WebServer,
    StreamSource,
};

#[derive(Parser, Debug)]
#[command(name = "radio-player", version, about = "Internet radio player")]
struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, env = "RADIO_CONFIG")]
    config: Option<PathBuf>,

    /// Stream URI, overriding the configuration
    #[arg(short, long)]
    uri: Option<String>,

    /// Start playing as soon as the player is up
    #[arg(long)]
    autoplay: bool,

    /// Maximum session length in hours (0 = unlimited)
    #[arg(long)]
    session_hours: Option<u32>,

    /// Do not start the web UI
    #[arg(long)]
    no_ui: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting Radio Player");

    // Load or create config
    let mut config = match args.config.clone().or_else(AppConfig::default_path) {
        Some(path) => {
            tracing::info!("Using configuration {}", path.display());
            AppConfig::load_or_create(&path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => {
            tracing::warn!("No configuration directory; using defaults");
            AppConfig::default()
        }
    };

    if let Some(uri) = args.uri {
        config.stream.uri = StreamSource::new(uri);
    }
    if args.autoplay {
        config.playback.auto_play_on_start = true;
    }
    if let Some(hours) = args.session_hours {
        config.playback.session_limit_hours = hours;
    }
    if args.no_ui {
        config.ui.enabled = false;
    }
    config.validate()?;

    let state_path = config.storage.state_file_path()?;
    let store = Arc::new(FileStore::open(&state_path)?);
    tracing::info!("Playback state kept in {}", state_path.display());

    // Encoded chunks go to a decoder thread; decoding itself happens elsewhere
    let (sink, chunk_rx) = ChannelSink::new(SINK_CHANNEL_CAPACITY);
    let sink = Arc::new(sink);
    let bytes_drained = Arc::new(AtomicU64::new(0));
    let drained = bytes_drained.clone();
    std::thread::Builder::new()
        .name("stream-drain".into())
        .spawn(move || {
            while let Ok(chunk) = chunk_rx.recv() {
                drained.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
        })
        .context("spawning drain thread")?;

    let engine = HttpStreamEngine::new(&config.stream, sink.clone())?;

    let player = PlayerBuilder::new(engine)
        .config(&config)
        .focus_host(Arc::new(GrantingFocusHost))
        .store(store)
        .spawn()?;
    let handle = player.handle();

    // Console observer
    let mut events = handle.subscribe("console");
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PlayerEvent::StateChanged(change) => {
                    tracing::info!("Player is {}", change.state)
                }
                PlayerEvent::Progress(progress) => {
                    tracing::debug!("{} / {}", progress.elapsed, progress.remaining)
                }
                PlayerEvent::Metadata(metadata) => {
                    tracing::info!(
                        "Now streaming {}",
                        metadata.name.as_deref().unwrap_or("unknown station")
                    )
                }
                PlayerEvent::FocusDenied { .. } => tracing::warn!("Audio focus denied"),
                PlayerEvent::TransportError { reason, .. } => {
                    tracing::error!("Stream failed: {}", reason)
                }
            }
        }
    });

    if config.ui.enabled {
        let web_server = WebServer::new(config.ui.clone(), handle.clone(), config.stream.uri.as_str());
        let _web_handle = web_server.start_background();
        tracing::info!(
            "Web UI available at http://{}:{}",
            config.ui.bind_address,
            config.ui.http_port
        );
    }

    // Periodic stats until Ctrl-C
    let mut stats = tokio::time::interval(Duration::from_secs(5));
    stats.tick().await;
    loop {
        tokio::select! {
            _ = stats.tick() => {
                let sink_stats = sink.stats();
                tracing::info!(
                    "State {}: {} chunks forwarded, {} dropped ({:.1}% drop), {} bytes drained",
                    handle.state(),
                    sink_stats.chunks_forwarded,
                    sink_stats.chunks_dropped,
                    sink_stats.drop_rate() * 100.0,
                    bytes_drained.load(Ordering::Relaxed)
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    player.shutdown().await;
    Ok(())
}
