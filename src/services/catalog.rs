//! TOML-backed placement catalog.
//!
//! ```toml
//! [placements.p1]
//! kind = "multiPaneNative"
//! pane_count = 3
//! publisher = "pub-1"
//! site = "site-1"
//! page = "page-1"
//!
//! [creative_groups.c1]
//! advertiser = "adv-1"
//! campaign = "camp-1"
//! campaign_name = "Spring sale"
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::EntityResolver;
use crate::types::{CaptureRequest, PlacementKind, PlacementMetadata, ResolvedPlacement};
use crate::{CaptureError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlacementEntry {
    #[serde(default)]
    pub kind: PlacementKind,
    pub pane_count: Option<u32>,
    pub publisher: Option<String>,
    pub site: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreativeGroupEntry {
    pub advertiser: Option<String>,
    pub campaign: Option<String>,
    pub campaign_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlacementCatalog {
    #[serde(default)]
    pub placements: HashMap<String, PlacementEntry>,
    #[serde(default)]
    pub creative_groups: HashMap<String, CreativeGroupEntry>,
}

impl PlacementCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw).map_err(|e| {
            CaptureError::Config(format!("Invalid placement catalog {}: {e}", path.display()))
        })
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[async_trait]
impl EntityResolver for PlacementCatalog {
    async fn resolve(&self, request: &CaptureRequest) -> Result<ResolvedPlacement> {
        let placement = self.placements.get(&request.placement_id).ok_or_else(|| {
            CaptureError::ResolutionFailed(format!(
                "Placement {} not found",
                request.placement_id
            ))
        })?;
        let group = self
            .creative_groups
            .get(&request.creative_group_id)
            .ok_or_else(|| {
                CaptureError::ResolutionFailed(format!(
                    "Creative group {} not found",
                    request.creative_group_id
                ))
            })?;

        Ok(ResolvedPlacement {
            kind: placement.kind,
            expected_pane_count: placement.pane_count,
            metadata: PlacementMetadata {
                advertiser: group.advertiser.clone(),
                publisher: placement.publisher.clone(),
                page: placement.page.clone(),
                site: placement.site.clone(),
                campaign: group.campaign.clone(),
                campaign_name: group.campaign_name.clone(),
            },
        })
    }
}
