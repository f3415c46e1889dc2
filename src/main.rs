mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_capture, run_reap, run_worker};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Run {
            input,
            stores,
            overrides,
        } => run_worker(args.config, args.verbose, input, stores, overrides).await,
        Commands::Capture {
            url,
            pid,
            crg_id,
            pane_count,
            stores,
            overrides,
        } => {
            run_capture(
                args.config,
                args.verbose,
                url,
                pid,
                crg_id,
                pane_count,
                stores,
                overrides,
            )
            .await
        }
        Commands::Reap {
            max_lifetime_secs,
            parent,
        } => run_reap(args.config, max_lifetime_secs, parent).await,
    }
}

/// Logs go to stderr; stdout carries command output only.
/// RUST_LOG wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info,adshot=debug,adshot_lib=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
