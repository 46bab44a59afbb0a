//! Mirror Sync - Main entry point
//!
//! One invocation performs one complete run; scheduling is left to cron,
//! a systemd timer or an HTTP hook.

use anyhow::Result;
use clap::Parser;
use mirror_sync::{config::Config, events::StdoutSink, orchestrator, utils, MirrorError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Shared secret authorizing this run
    #[arg(short, long, env = "MIRROR_SYNC_RUN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Only run the retention sweep
    #[arg(long)]
    sweep_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = args.config {
        Config::from_file(&config_path)?
    } else {
        let mut config = Config::default();
        config.apply_env();
        config
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting mirror-sync v{} (root: {})",
        env!("CARGO_PKG_VERSION"),
        config.mirror.root.display()
    );

    let orchestrator = Orchestrator::from_config(config)?;
    let mut events = StdoutSink;
    let token = args.token.as_deref();

    let code = if args.sweep_only {
        let result = orchestrator.sweep_only(token, &mut events);
        report_failure(&result);
        orchestrator::exit_code(&result)
    } else {
        let result = orchestrator.run(token, &mut events).await;
        report_failure(&result);
        orchestrator::exit_code(&result)
    };

    Ok(ExitCode::from(code))
}

fn report_failure<T>(result: &mirror_sync::Result<T>) {
    match result {
        Ok(_) => {}
        // Plain-text refusal for the invoking shim, nothing else is written.
        Err(MirrorError::Authorization) => println!("{}", MirrorError::Authorization),
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            println!("--- Error: ending session: {e}");
        }
    }
}
