use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use contextlink::app::ChatShell;
use contextlink::chat::{ChatStore, EffectRunner};
use contextlink::settings::SettingsStore;
use contextlink_api::{ChatBackend, HttpBackend, MemoryBackend};
use tokio::io::BufReader;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "contextlink", version, about = "Terminal client for the ContextLink chat backend")]
struct Args {
    /// Settings file to load instead of the per-user default.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend base URL, overriding the settings file.
    #[arg(long)]
    base_url: Option<String>,
    /// Use the in-process backend instead of a server.
    #[arg(long)]
    offline: bool,
    /// Log level written to stderr (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let settings = Arc::new(match &args.config {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::load(),
    });
    let current = settings.settings();

    let log_level = args.log_level.as_deref().unwrap_or(&current.log_level);
    let level = log_level.parse::<Level>().unwrap_or(Level::INFO);
    // Logs go to stderr so they never interleave with the rendered chat.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let backend: Arc<dyn ChatBackend> = if args.offline {
        tracing::info!("using in-process backend");
        Arc::new(MemoryBackend::with_default_catalog())
    } else {
        let base_url = args.base_url.as_deref().unwrap_or(&current.api_base_url);
        match HttpBackend::new(base_url) {
            Ok(backend) => {
                tracing::info!(base_url, "using HTTP backend");
                Arc::new(backend)
            }
            Err(error) => {
                tracing::error!(stage = error.stage(), "{error}");
                return ExitCode::FAILURE;
            }
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    let store = ChatStore::new(current.default_model.clone());
    let shell = ChatShell::new(store, EffectRunner::new(backend), tokio::io::stdout())
        .with_settings(Arc::clone(&settings))
        .with_colors(std::io::stdout().is_terminal());

    match runtime.block_on(shell.run(BufReader::new(tokio::io::stdin()))) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}
