//! Collaborators the capture pipeline talks to.
//!
//! The pipeline only sees the traits below. The binary wires in the
//! file-backed implementations:
//! - [`source::LineMessageSource`] - capture messages, one per line
//! - [`catalog::PlacementCatalog`] - placement and creative-group lookup
//! - [`store::RecordStore`] - screenshot records and the duplicate check
//! - [`upload::HttpUploader`] - image upload over HTTP

pub mod catalog;
pub mod source;
pub mod store;
pub mod upload;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::types::{CaptureMessage, CaptureRequest, ResolvedPlacement, ScreenshotRecord};
use crate::Result;

pub use catalog::PlacementCatalog;
pub use source::LineMessageSource;
pub use store::RecordStore;
pub use upload::{HttpUploader, UploadMetadata};

/// Delivers capture messages one at a time. Acknowledgement is the caller's concern.
#[async_trait]
pub trait MessageSource: Send {
    /// `Ok(None)` once the source is exhausted.
    async fn next_message(&mut self) -> Result<Option<CaptureMessage>>;
}

#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Placement kind and parent entities. Unknown ids are `ResolutionFailed`.
    async fn resolve(&self, request: &CaptureRequest) -> Result<ResolvedPlacement>;
}

#[async_trait]
pub trait ThrottleCheck: Send + Sync {
    /// Whether a capture for this pair was stored within `window`.
    async fn captured_recently(
        &self,
        placement_id: &str,
        creative_group_id: &str,
        window: Duration,
    ) -> Result<bool>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload a local image and return its public URL.
    async fn upload(
        &self,
        file_path: &Path,
        object_name: &str,
        metadata: &UploadMetadata,
    ) -> Result<String>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, record: &ScreenshotRecord) -> Result<()>;
}
