use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::types::{ClipRectangle, ElementRect};
use crate::Result;

/// Opaque frame handle, unique within one page.
pub type FrameId = String;

/// Load state of one image element plus its rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageState {
    pub complete: bool,
    pub natural_width: f64,
    pub rect: ElementRect,
}

impl ImageState {
    pub fn is_loaded(&self) -> bool {
        self.complete && self.natural_width > 0.0
    }
}

/// The navigable page of one browser session.
///
/// Rectangles are in page coordinates of the document that holds the element.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load to settle.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn main_frame(&self) -> Result<FrameId>;

    /// Direct child frames, in document order.
    async fn child_frames(&self, frame: &FrameId) -> Result<Vec<FrameId>>;

    /// Rectangles of every element matching `selector` in the frame's document.
    async fn query_rects(&self, frame: &FrameId, selector: &str) -> Result<Vec<ElementRect>>;

    /// Rectangle of the `<iframe>` element hosting `frame`, in its parent's document.
    async fn frame_owner_rect(&self, frame: &FrameId) -> Result<Option<ElementRect>>;

    async fn image_states(&self, frame: &FrameId, selector: &str) -> Result<Vec<ImageState>>;

    /// Click the first match, if any. Returns whether something was clicked.
    async fn click(&self, frame: &FrameId, selector: &str) -> Result<bool>;

    /// Write a PNG of the given page region.
    async fn screenshot(&self, clip: &ClipRectangle, path: &Path) -> Result<()>;

    /// Graceful browser shutdown.
    async fn close(&self) -> Result<()>;

    async fn query_rect(&self, frame: &FrameId, selector: &str) -> Result<Option<ElementRect>> {
        Ok(self.query_rects(frame, selector).await?.into_iter().next())
    }
}
