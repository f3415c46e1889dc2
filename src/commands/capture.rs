use std::path::PathBuf;
use std::process::ExitCode;

use adshot_lib::types::CaptureRequest;
use adshot_lib::CaptureError;
use tracing::info;

use super::build_pipeline;
use crate::cli::{ConfigOverrides, StoreArgs};
use crate::formatting::{render_error, write_json};
use crate::settings::{format_effective_config, load_config};

/// Run the capture command: one request, synchronously, no admission queue.
#[allow(clippy::too_many_arguments)]
pub async fn run_capture(
    config_path: Option<PathBuf>,
    verbose: bool,
    url: String,
    pid: String,
    crg_id: String,
    pane_count: Option<u32>,
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

    let request = CaptureRequest {
        pane_count_hint: pane_count,
        ..CaptureRequest::new(pid, crg_id, url)
    };
    let record = match pipeline.capture(&request).await {
        Ok(record) => record,
        Err(err) => return render_error(err),
    };

    if let Err(err) = write_json(&record) {
        return render_error(CaptureError::from(err));
    }
    ExitCode::SUCCESS
}
