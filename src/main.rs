use std::io;
use std::process::ExitCode;

use anyhow::Context;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dspl_validate::{Cli, ConfigManager, ValidationConfig, Validator};

/// Exit status for configuration and setup failures
const EXIT_CONFIG_ERROR: u8 = 2;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(atty::is(atty::Stream::Stderr)),
        )
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = ConfigManager::load_config(cli)
        .await
        .context("failed to load configuration")?;
    let validator = Validator::new(ValidationConfig::from(&config));

    let stdout = io::stdout();
    let mut sink = stdout.lock();
    match validator.run(&cli.path, &mut sink) {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            debug!(stage = ?err.stage(), "exiting with failure");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}
