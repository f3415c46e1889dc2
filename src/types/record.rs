use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::geometry::ClipRectangle;
use super::request::{CaptureRequest, PlacementKind};

/// A screenshot written to local disk, waiting for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub file_path: PathBuf,
    /// Object name used for upload (file stem).
    pub file_name: String,
    pub clip_rectangle: ClipRectangle,
    pub target_kind: PlacementKind,
}

/// Parent entities of a placement / creative group, copied onto the stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertiser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
}

/// What the entity resolver knows about a request's placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlacement {
    pub kind: PlacementKind,
    pub expected_pane_count: Option<u32>,
    pub metadata: PlacementMetadata,
}

/// Persisted result of a successful capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRecord {
    /// Capture time, unix milliseconds.
    pub tstamp: u64,
    #[serde(rename = "h")]
    pub height: u32,
    #[serde(rename = "w")]
    pub width: u32,
    pub url: String,
    pub image_url: String,
    pub placement: String,
    #[serde(rename = "creativegroup")]
    pub creative_group: String,
    #[serde(flatten)]
    pub metadata: PlacementMetadata,
}

impl ScreenshotRecord {
    pub fn new(
        request: &CaptureRequest,
        placement: &ResolvedPlacement,
        image_url: String,
        clip: &ClipRectangle,
        tstamp: u64,
    ) -> Self {
        Self {
            tstamp,
            height: clip.height.round() as u32,
            width: clip.width.round() as u32,
            url: request.website_url.clone(),
            image_url,
            placement: request.placement_id.clone(),
            creative_group: request.creative_group_id.clone(),
            metadata: placement.metadata.clone(),
        }
    }
}
