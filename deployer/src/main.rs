//! deployctl - Entry Point
//!
//! Builds an application image, publishes it to the registry and provisions
//! the stack that runs it.

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use tracing::{debug, warn};

use deployctl::commands::{handle_command, Cli, Context};
use deployctl::errors::ErrorKind;
use deployctl::filesys::file::File;
use deployctl::logs::{init_logging, LogOptions};
use deployctl::storage::settings::Settings;

/// Exit code after an interrupt, as a shell would report SIGINT
const INTERRUPTED: u8 = 130;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error[{}]: {:#}", ErrorKind::ConfigError, e);
            return ExitCode::from(ErrorKind::ConfigError.exit_code());
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli.log_level.unwrap_or(settings.log_level),
        json_format: cli.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let context = Context::new(settings, cli.region);
    debug!("Running in region {}", context.region);

    tokio::select! {
        result = handle_command(cli.command, &context) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                e.report();
                ExitCode::from(e.exit_code())
            }
        },
        _ = await_shutdown_signal() => {
            warn!("Interrupted; steps already completed are left in place");
            ExitCode::from(INTERRUPTED)
        }
    }
}

async fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let file = File::new(&cli.config);
    let settings = Settings::load(&file)
        .await
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    Ok(settings)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                warn!("SIGTERM received, stopping...");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl+C received, stopping...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        warn!("Ctrl+C received, stopping...");
    }
}
