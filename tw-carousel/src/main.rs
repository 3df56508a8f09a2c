//! tw-carousel - terminal track carousel
//!
//! Minimal line-driven viewer over the carousel store: `n`/enter for next,
//! `p` for previous, `drag <from> <to>` to simulate a swipe, `q` to quit.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tw_common::config::load_config;
use tw_common::human_time::describe_play;

use tw_carousel::{
    Applied, CarouselSettings, CarouselStore, Direction, FrameDriver, HttpImageLoader,
    HttpTrackSource, IntervalFrames, JsonMarkerStore, MarkerStore, MemoryMarkerStore,
};

/// Command-line arguments for tw-carousel
#[derive(Parser, Debug)]
#[command(name = "tw-carousel")]
#[command(about = "Terminal viewer for the trackwall carousel")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// tw-server base URL
    #[arg(short, long, env = "TW_SERVER_URL")]
    server_url: Option<String>,

    /// Disable the periodic head refresh
    #[arg(long)]
    no_refresh: bool,

    /// Keep the fetch marker in memory instead of the cache dir
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tw_carousel=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let server_url = args
        .server_url
        .unwrap_or_else(|| config.carousel.server_url.clone());
    let mut settings = CarouselSettings::from_config(&config.carousel);
    if args.no_refresh {
        settings.refresh_interval = None;
    }

    let marker_path = config
        .carousel
        .marker_path
        .clone()
        .or_else(JsonMarkerStore::default_path);
    let markers: Arc<dyn MarkerStore> = match marker_path {
        Some(path) if !args.ephemeral => Arc::new(JsonMarkerStore::new(path)),
        _ => Arc::new(MemoryMarkerStore::default()),
    };

    let source = HttpTrackSource::new(&server_url).context("Failed to build HTTP client")?;
    let images = HttpImageLoader::new().context("Failed to build HTTP client")?;

    info!(server = %server_url, "Starting tw-carousel");

    let mut store = CarouselStore::new(Arc::new(source), Arc::new(images), markers, settings);
    store.load().await;
    render(&store);

    let mut frames = IntervalFrames::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                if !handle_command(&mut store, line.trim()) {
                    break;
                }
                render(&store);
            }
            applied = store.next_event() => {
                if matches!(applied, Some(Applied::Appended(_) | Applied::Replaced | Applied::ReachedEnd)) {
                    render(&store);
                }
            }
            _ = frames.next_frame(), if store.is_animating() => {
                render_palette(&store);
            }
        }
    }

    Ok(())
}

/// Returns false to quit
fn handle_command(store: &mut CarouselStore, command: &str) -> bool {
    match command.split_whitespace().collect::<Vec<_>>().as_slice() {
        [] | ["n"] => store.advance(Direction::Next),
        ["p"] => store.advance(Direction::Previous),
        ["q"] => return false,
        ["drag", from, to] => match (from.parse::<f32>(), to.parse::<f32>()) {
            (Ok(from), Ok(to)) => {
                store.drag_start(from);
                if store.drag_end(to).is_none() {
                    println!("(drag too short)");
                }
            }
            _ => println!("usage: drag <from-x> <to-x>"),
        },
        _ => println!("commands: n, p, drag <from-x> <to-x>, q"),
    }
    true
}

fn render(store: &CarouselStore) {
    let Some(track) = store.current() else {
        println!("(no tracks)");
        return;
    };

    let more = if store.reached_end() { "" } else { "+" };
    let when = describe_play(track.played_at(), track.is_now_playing, Utc::now());
    let art = match store.image_for(store.cursor()) {
        Some(bytes) => format!("{} bytes of art", bytes.len()),
        None => "art pending".to_string(),
    };

    println!(
        "\n[{}/{}{}] {} - {}  {}  ({})",
        store.cursor() + 1,
        store.tracks().len(),
        more,
        track.name,
        track.artist,
        when,
        art
    );
    render_palette(store);
}

fn render_palette(store: &CarouselStore) {
    let palette = store
        .palette()
        .iter()
        .map(|color| color.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    print!("\r  {}  {:>3.0}%", palette, store.crossfade() * 100.0);
    let _ = std::io::stdout().flush();
}
