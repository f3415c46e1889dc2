use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use adshot_lib::browser::ProcfsInspector;
use serde::Serialize;

use super::session_manager;
use crate::cli::ConfigOverrides;
use crate::formatting::{render_error, write_json};
use crate::settings::load_config;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReapOutput {
    parent_pid: u32,
    max_lifetime_secs: u64,
    inspected: usize,
    terminated: Vec<u32>,
}

/// Run a single reaper sweep outside the worker loop.
pub async fn run_reap(
    config_path: Option<PathBuf>,
    max_lifetime_secs: Option<u64>,
    parent: Option<u32>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref(), &ConfigOverrides::default()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err),
    };
    let max_lifetime = max_lifetime_secs
        .map(Duration::from_secs)
        .unwrap_or(config.session_max_lifetime);
    let parent_pid = parent.unwrap_or_else(std::process::id);

    let manager = session_manager(&config, Arc::new(ProcfsInspector::for_parent(parent_pid)));
    let report = manager.reap(max_lifetime).await;

    let output = ReapOutput {
        parent_pid,
        max_lifetime_secs: max_lifetime.as_secs(),
        inspected: report.inspected,
        terminated: report.terminated,
    };
    if let Err(err) = write_json(&output) {
        return render_error(err.into());
    }
    ExitCode::SUCCESS
}
