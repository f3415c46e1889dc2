use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use adshot_lib::services::{LineMessageSource, MessageSource};
use adshot_lib::types::CaptureRequest;
use adshot_lib::{Admission, AdmissionController, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::build_pipeline;
use crate::cli::{ConfigOverrides, StoreArgs};
use crate::formatting::{render_error, EXIT_FAILURE};
use crate::settings::{format_effective_config, load_config};

const EXIT_INTERRUPTED: u8 = 130;

/// Run the worker: consume messages until the input ends or a shutdown
/// signal arrives, then wait for admitted work to finish.
pub async fn run_worker(
    config_path: Option<PathBuf>,
    verbose: bool,
    input: Option<PathBuf>,
    stores: StoreArgs,
    overrides: ConfigOverrides,
) -> ExitCode {
    let config = match load_config(config_path.as_deref(), &overrides) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err),
    };
    if verbose {
        info!("{}", format_effective_config(&config, config_path.as_deref()));
    }

    let pipeline = match build_pipeline(&config, &stores).await {
        Ok(pipeline) => pipeline,
        Err(err) => return render_error(err),
    };
    let sessions = pipeline.sessions().clone();

    let mut source: Box<dyn MessageSource> = match &input {
        Some(path) => match LineMessageSource::open(path).await {
            Ok(source) => Box::new(source),
            Err(err) => return render_error(err),
        },
        None => Box::new(LineMessageSource::stdin()),
    };

    let gate = AdmissionController::with_drain_delay(
        pipeline,
        config.max_concurrent_sessions,
        config.overflow_drain_delay,
    );
    let reaper_shutdown = CancellationToken::new();
    let reaper = sessions.start_reaper(
        config.reap_interval,
        config.session_max_lifetime,
        reaper_shutdown.clone(),
    );
    info!(
        max_concurrent = config.max_concurrent_sessions,
        input = input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string()),
        "worker started"
    );

    let consumed = tokio::select! {
        outcome = consume(source.as_mut(), &gate) => Some(outcome),
        _ = shutdown_signal() => None,
    };
    let mut exit = ExitCode::SUCCESS;
    match consumed {
        Some(Ok(submitted)) => info!(submitted, "input exhausted, waiting for captures"),
        Some(Err(e)) => {
            error!(error = %e, "reading capture messages failed");
            exit = ExitCode::from(EXIT_FAILURE);
        }
        None => {
            let stats = gate.stats();
            info!(
                active = stats.active,
                queued = stats.queued,
                "shutdown requested, waiting for captures"
            );
        }
    }

    let drained = tokio::select! {
        _ = gate.wait_idle() => true,
        _ = shutdown_signal() => false,
    };
    reaper_shutdown.cancel();
    if let Err(e) = reaper.await {
        debug!(error = %e, "reaper task ended abnormally");
    }

    if !drained {
        let stats = gate.stats();
        warn!(
            active = stats.active,
            queued = stats.queued,
            "forced shutdown, killing browsers"
        );
        sessions.reap(Duration::ZERO).await;
        return ExitCode::from(EXIT_INTERRUPTED);
    }
    info!("worker stopped");
    exit
}

async fn consume(source: &mut dyn MessageSource, gate: &AdmissionController) -> Result<usize> {
    let mut submitted = 0;
    while let Some(message) = source.next_message().await? {
        let request = CaptureRequest::from(message);
        let placement_id = request.placement_id.clone();
        let creative_group_id = request.creative_group_id.clone();
        match gate.submit(request) {
            Admission::Started => debug!(%placement_id, %creative_group_id, "capture started"),
            Admission::Queued { position } => {
                debug!(%placement_id, %creative_group_id, position, "capture queued")
            }
        }
        submitted += 1;
    }
    Ok(submitted)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("received Ctrl+C"),
        _ = terminate => warn!("received SIGTERM"),
    }
}
