//! Headless browser sessions for screenshot capture.
//!
//! # Module Structure
//!
//! - [`page`] - the [`PageHandle`] seam the locator and pipeline drive
//! - [`session`] - session launch, release, forced close and the reaper loop
//! - [`reaper`] - OS process inspection behind [`ProcessInspector`]
//! - [`chromium`] - Chromium over the DevTools protocol
//!
//! # Example
//!
//! ```no_run
//! use adshot_lib::browser::{
//!     BrowserSessionManager, ChromiumLauncher, ProcfsInspector, SessionOptions,
//! };
//! use adshot_lib::Config;
//! use std::sync::Arc;
//!
//! # async fn example() -> adshot_lib::Result<()> {
//! let config = Config::default();
//! let manager = BrowserSessionManager::new(
//!     Arc::new(ChromiumLauncher::new(config.browser.clone())),
//!     Arc::new(ProcfsInspector::new()),
//!     SessionOptions {
//!         viewport: config.viewport,
//!         user_agent: config.user_agent.clone(),
//!         navigation_timeout: config.navigation_timeout,
//!     },
//!     config.close_timeout,
//! );
//! let session = manager.acquire().await?;
//! session.page().goto("https://example.com").await?;
//! manager.release(session).await;
//! # Ok(())
//! # }
//! ```

pub mod chromium;
pub mod page;
pub mod reaper;
mod scripts;
pub mod session;

pub use chromium::{find_chrome, ChromiumLauncher};
pub use page::{FrameId, ImageState, PageHandle};
pub use reaper::{ProcessInspector, ProcfsInspector, ReapReport};
pub use session::{
    BrowserSession, BrowserSessionManager, LaunchedBrowser, SessionLauncher, SessionOptions,
};
