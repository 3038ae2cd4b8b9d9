use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use costbook_ingest::cli::commands::{handle_ingest, handle_status};
use costbook_ingest::cli::output::get_formatter;
use costbook_ingest::cli::{Cli, Commands};
use costbook_ingest::models::OutputFormat;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = cli.format.unwrap_or_default();

    let outcome = tokio::select! {
        result = run_command(&cli, format) => result,
        _ = shutdown_signal() => {
            Err(anyhow::anyhow!("interrupted; batches already upserted are kept"))
        }
    };

    if let Err(e) = outcome {
        let message = get_formatter(format).format_error(&e.to_string());
        eprintln!("{}", message.trim_end());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn run_command(cli: &Cli, format: OutputFormat) -> Result<()> {
    let config_path = cli.config.as_deref();
    let overrides = cli.overrides();

    match &cli.command {
        Some(Commands::Status) => handle_status(config_path, overrides, format).await,
        Some(Commands::Ingest(_)) | None => {
            handle_ingest(cli.ingest_args(), config_path, overrides, format, cli.verbose).await
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
