// cloudpipe - search SoundCloud, pick a track, play it in the terminal
// Startup questions run in cooked mode; after that the keyboard belongs to the player

use anyhow::{Context, Result};
use clap::Parser;
use cloudpipe::{
    ui::{prompt, Console, CrosstermKeys, KeyEventSource, RawModeGuard},
    AudioPipeline, Config, HttpFetcher, Outcome, OutputDevice, PlaybackController, PlayerSettings,
    RodioBackend, SoundCloudClient, TrackCatalog,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cloudpipe")]
#[command(about = "A terminal streaming player for SoundCloud")]
#[command(version)]
struct Args {
    /// Mirror logs to stderr instead of silencing it
    #[arg(long)]
    dev: bool,

    /// Search query; skips the query prompt
    #[arg(short, long)]
    query: Option<String>,

    /// 1-based track to start from; skips the selection prompt
    #[arg(short, long)]
    track: Option<usize>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(dev: bool) -> Result<WorkerGuard> {
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cloudpipe.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cloudpipe=debug"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    if dev {
        eprintln!("🔧 Dev mode: logging to stderr + logs/cloudpipe.log");
    }
    Ok(guard)
}

/// Decoder and audio host chatter goes straight to fd 2 and would wreck the
/// raw-mode screen.
fn redirect_stderr_to_null() -> Result<()> {
    unsafe {
        let null_fd = libc::open(
            b"/dev/null\0".as_ptr() as *const libc::c_char,
            libc::O_WRONLY,
        );
        if null_fd == -1 {
            return Err(anyhow::anyhow!("Failed to open /dev/null"));
        }

        if libc::dup2(null_fd, libc::STDERR_FILENO) == -1 {
            libc::close(null_fd);
            return Err(anyhow::anyhow!("Failed to redirect stderr"));
        }
        libc::close(null_fd);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match init_logging(args.dev) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {}", e);
            None
        }
    };

    if !args.dev {
        if let Err(e) = redirect_stderr_to_null() {
            debug!("Keeping stderr: {}", e);
        }
    }

    match run(args).await {
        Ok(outcome) => {
            info!("Exiting after {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Fatal: {:#}", e);
            let _ = Console::stdout().error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<Outcome> {
    dotenvy::dotenv().ok();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env();

    let mut console = Console::stdout();
    console.header()?;

    let catalog = SoundCloudClient::new(config.client_id()?, &config.soundcloud);
    let mut rng = rand::thread_rng();

    let input = match args.query {
        Some(query) => query,
        None => prompt::read_line("🔎 Search (Enter for random): ")?,
    };
    let (query, random) = prompt::pick_query(&input, &config.search.random_keywords, &mut rng)?;
    if random {
        console.status(&format!("🎲 Random search: {}", query))?;
    }

    let tracks = catalog
        .search(&query)
        .await
        .with_context(|| format!("search for \"{}\" failed", query))?;
    console.track_list(&tracks)?;

    let selection = match args.track {
        Some(n) => n.to_string(),
        None => prompt::read_line("\nPick a track number (Enter for random): ")?,
    };
    let start = prompt::pick_track(&selection, tracks.len(), &mut rng)?;
    info!("Starting at track {} of {} for '{}'", start + 1, tracks.len(), query);

    let device = OutputDevice::new(RodioBackend::spawn()?, config.playback.buffer_window());
    let pipeline = AudioPipeline::new(HttpFetcher::new(), device.clone());

    let raw_mode = RawModeGuard::enable()?;
    let cancel = CancellationToken::new();
    let (keys, _listener) = KeyEventSource::new(CrosstermKeys).start(cancel.clone())?;

    let mut controller = PlaybackController::new(
        tracks,
        start,
        pipeline,
        catalog,
        keys,
        console,
        PlayerSettings::from(&config),
    );
    let outcome = controller.run().await;

    // the reader thread may be parked in a blocking read; it dies with the process
    cancel.cancel();
    device.shutdown();
    drop(raw_mode);

    outcome
}
