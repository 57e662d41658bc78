use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use handscribe::{
    create_router, AppState, AudioBackendFactory, AudioSource, Config, FileStore, Phase,
    RecordingSession, SettingsStore, SocketIoTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long `record` waits for the transcription after stopping
const RESULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "handscribe", version, about = "Voice to handwriting recorder")]
struct Cli {
    /// Config file, without extension
    #[arg(long, default_value = "config/handscribe")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local HTTP control API
    Serve {
        /// Replay a WAV file instead of using the microphone
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Record once, print the transcription and optionally save outputs
    Record {
        /// Stop after this many seconds (Ctrl-C stops early; the session cap still applies)
        #[arg(long)]
        seconds: Option<u64>,
        /// Write the captured audio as WAV
        #[arg(long)]
        save: Option<PathBuf>,
        /// Write the handwriting SVG
        #[arg(long)]
        svg: Option<PathBuf>,
        /// Replay a WAV file instead of using the microphone
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Inspect or change the backend endpoint
    Endpoint {
        #[command(subcommand)]
        action: EndpointAction,
    },
}

#[derive(Subcommand)]
enum EndpointAction {
    Show,
    Set { url: String },
    Clear,
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    let settings_path = cfg.settings_path()?;
    let settings = Arc::new(SettingsStore::new(
        Box::new(FileStore::new(&settings_path)),
        cfg.ping_timeout(),
    ));
    settings
        .load()
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    match cli.command {
        Command::Serve { input } => serve(&cfg, settings, input).await,
        Command::Record {
            seconds,
            save,
            svg,
            input,
        } => record(&cfg, settings, seconds, save, svg, input).await,
        Command::Endpoint { action } => endpoint(settings, action).await,
    }
}

fn build_session(
    cfg: &Config,
    settings: Arc<SettingsStore>,
    input: Option<PathBuf>,
) -> RecordingSession {
    let source = match input {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };
    info!("Audio source: {:?}", source);

    RecordingSession::new(
        cfg.session(),
        settings,
        Arc::new(SocketIoTransport::new(cfg.transport())),
        AudioBackendFactory::provider(source),
    )
}

async fn serve(cfg: &Config, settings: Arc<SettingsStore>, input: Option<PathBuf>) -> Result<()> {
    let session = build_session(cfg, settings, input);
    session.sync_endpoint().await;

    let app = create_router(AppState::new(session.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("{} listening on http://{}", cfg.service.name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    session.shutdown().await;
    Ok(())
}

async fn record(
    cfg: &Config,
    settings: Arc<SettingsStore>,
    seconds: Option<u64>,
    save: Option<PathBuf>,
    svg: Option<PathBuf>,
    input: Option<PathBuf>,
) -> Result<()> {
    let session = build_session(cfg, settings, input);
    session.start().await?;

    let mut state = session.subscribe();
    let capped = state.wait_for(|s| s.phase != Phase::Recording);
    match seconds {
        Some(secs) => {
            info!("Recording for {}s", secs);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
                _ = capped => {}
            }
        }
        None => {
            info!("Recording; press Ctrl-C to stop");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = capped => {}
            }
        }
    }

    session.stop().await?;

    if let Some(path) = &save {
        let samples = session.save_recording(path)?;
        info!("Saved {} samples to {}", samples, path.display());
    }

    let outcome = tokio::time::timeout(RESULT_TIMEOUT, session.wait_for_outcome()).await;
    session.shutdown().await;

    let snapshot = match outcome {
        Ok(snapshot) => snapshot,
        Err(_) => bail!("Timed out waiting for transcription"),
    };

    match (snapshot.phase, snapshot.result) {
        (Phase::Complete, Some(result)) => {
            println!("{}", result.text);
            if let Some(path) = &svg {
                std::fs::write(path, &result.svg)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote handwriting to {}", path.display());
            }
            Ok(())
        }
        _ => bail!(
            "{}",
            snapshot
                .last_error
                .unwrap_or_else(|| "Recording failed".to_string())
        ),
    }
}

async fn endpoint(settings: Arc<SettingsStore>, action: EndpointAction) -> Result<()> {
    match action {
        EndpointAction::Show => match settings.url() {
            Some(url) => println!("{}", url),
            None => println!("(not configured)"),
        },
        EndpointAction::Set { url } => {
            let url = url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("URL must start with http:// or https://");
            }
            settings.set_url(url)?;
            println!("Backend URL set to {}", url);
        }
        EndpointAction::Clear => {
            settings.clear()?;
            println!("Backend URL cleared");
        }
        EndpointAction::Ping => {
            if !settings.is_configured() {
                bail!("Backend URL is not configured");
            }
            if settings.check_liveness().await {
                println!("Backend is reachable");
            } else {
                warn!("Backend did not answer /ping");
                bail!("Backend is not reachable");
            }
        }
    }
    Ok(())
}
