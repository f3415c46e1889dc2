//! Ad screenshot worker library.
//!
//! Captures proof-of-placement screenshots of ads as they render inside live
//! publisher pages: a headless browser loads the page, the ad element is found
//! (iframe tag, native images or a multi-pane widget), and a viewport-sized
//! clip around it is screenshotted, uploaded and recorded.
//!
//! # Module Overview
//!
//! - [`admission`] - bounded concurrency with a FIFO overflow queue
//! - [`browser`] - browser sessions, Chromium over CDP and the lifetime reaper
//! - [`locator`] - finding the ad element on a loaded page
//! - [`clip`] - the screenshot rectangle around a located element
//! - [`pipeline`] - one capture request end to end
//! - [`services`] - message source, placement catalog, uploader, record store
//! - [`config`] - configuration file and environment overrides
//! - [`types`] - requests, geometry and persisted records
//!
//! # Example
//!
//! ```no_run
//! use adshot_lib::{clip_rectangle, Viewport};
//! use adshot_lib::types::ElementRect;
//!
//! let ad = ElementRect::new(40.0, 900.0, 300.0, 250.0);
//! let clip = clip_rectangle(&ad, Viewport::new(1024, 768));
//! assert!(clip.contains(&ad));
//! ```

pub mod admission;
pub mod browser;
pub mod clip;
pub mod config;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod services;
pub mod types;
pub mod viewport;

pub use admission::{Admission, AdmissionController, GateStats, RequestProcessor};
pub use browser::{BrowserSessionManager, ChromiumLauncher, PageHandle, ProcfsInspector};
pub use clip::clip_rectangle;
pub use config::{Config, ConfigError};
pub use error::{CaptureError, ErrorCategory, ErrorPayload, LocatePhase, Result};
pub use locator::{ElementLocator, PollPolicy};
pub use pipeline::{normalize_url, CapturePipeline, PipelineSettings};
pub use viewport::Viewport;
