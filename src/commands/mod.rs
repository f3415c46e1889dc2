mod capture;
mod reap;
mod run;

pub use capture::run_capture;
pub use reap::run_reap;
pub use run::run_worker;

use std::sync::Arc;

use adshot_lib::browser::{
    BrowserSessionManager, ChromiumLauncher, ProcessInspector, ProcfsInspector, SessionOptions,
};
use adshot_lib::services::{HttpUploader, PlacementCatalog, RecordStore};
use adshot_lib::{CapturePipeline, Config, PipelineSettings, Result};

use crate::cli::StoreArgs;

pub(crate) fn session_manager(
    config: &Config,
    inspector: Arc<dyn ProcessInspector>,
) -> Arc<BrowserSessionManager> {
    Arc::new(BrowserSessionManager::new(
        Arc::new(ChromiumLauncher::new(config.browser.clone())),
        inspector,
        SessionOptions {
            viewport: config.viewport,
            user_agent: config.user_agent.clone(),
            navigation_timeout: config.navigation_timeout,
        },
        config.close_timeout,
    ))
}

/// Wire the file-backed collaborators into a pipeline.
pub(crate) async fn build_pipeline(
    config: &Config,
    stores: &StoreArgs,
) -> Result<Arc<CapturePipeline>> {
    let catalog = PlacementCatalog::load(&stores.catalog)?;
    let records = Arc::new(RecordStore::open(&stores.records).await?);
    let uploader = HttpUploader::from_settings(&config.upload)?;
    let sessions = session_manager(config, Arc::new(ProcfsInspector::new()));

    Ok(Arc::new(CapturePipeline::new(
        sessions,
        Arc::new(catalog),
        records.clone(),
        Arc::new(uploader),
        records,
        PipelineSettings::from(config),
    )))
}
