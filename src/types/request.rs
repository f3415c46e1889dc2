//! Capture requests and the messages they are parsed from.
//!
//! Messages arrive in one of two shapes:
//! - a JSON object: `{"websiteUrl": "...", "pid": "...", "crgId": "...", "paneCount": 3}`
//! - the compact backlog string: `websiteUrl:http://site.com,pid:123,crgId:456`

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::locator::selectors;

/// How a placement renders its advertisement on the publisher page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlacementKind {
    /// Impression tag served through an iframe (possibly nested).
    #[default]
    Iframe,
    /// A single native-ad image injected into the page.
    Native,
    /// A widget holding several native-ad panes that load asynchronously.
    MultiPaneNative,
}

impl std::fmt::Display for PlacementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlacementKind::Iframe => "iframe",
            PlacementKind::Native => "native",
            PlacementKind::MultiPaneNative => "multiPaneNative",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageParseError {
    #[error("Empty capture message")]
    Empty,
    #[error("Invalid JSON capture message: {0}")]
    Json(String),
    #[error("Capture message is missing field '{0}'")]
    MissingField(&'static str),
}

/// Wire shape of an inbound capture message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMessage {
    pub website_url: String,
    #[serde(alias = "placementId")]
    pub pid: String,
    #[serde(alias = "creativeGroupId", alias = "crgid")]
    pub crg_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_count: Option<u32>,
}

impl CaptureMessage {
    /// Render the message in the compact backlog format.
    pub fn to_backlog_string(&self) -> String {
        format!(
            "websiteUrl:{},pid:{},crgId:{}",
            self.website_url, self.pid, self.crg_id
        )
    }

    fn parse_backlog(s: &str) -> Result<Self, MessageParseError> {
        // The URL itself may contain commas, so the ids are split off the tail.
        let (head, crg_id) = s
            .rsplit_once(",crgId:")
            .or_else(|| s.rsplit_once(",crgid:"))
            .ok_or(MessageParseError::MissingField("crgId"))?;
        let (url_part, pid) = head
            .rsplit_once(",pid:")
            .ok_or(MessageParseError::MissingField("pid"))?;
        let website_url = url_part
            .strip_prefix("websiteUrl:")
            .ok_or(MessageParseError::MissingField("websiteUrl"))?;

        let message = CaptureMessage {
            website_url: website_url.trim().to_string(),
            pid: pid.trim().to_string(),
            crg_id: crg_id.trim().to_string(),
            pane_count: None,
        };
        message.check_fields()?;
        Ok(message)
    }

    fn check_fields(&self) -> Result<(), MessageParseError> {
        if self.website_url.is_empty() {
            return Err(MessageParseError::MissingField("websiteUrl"));
        }
        if self.pid.is_empty() {
            return Err(MessageParseError::MissingField("pid"));
        }
        if self.crg_id.is_empty() {
            return Err(MessageParseError::MissingField("crgId"));
        }
        Ok(())
    }
}

impl FromStr for CaptureMessage {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MessageParseError::Empty);
        }
        if trimmed.starts_with('{') {
            let message: CaptureMessage = serde_json::from_str(trimmed)
                .map_err(|e| MessageParseError::Json(e.to_string()))?;
            message.check_fields()?;
            return Ok(message);
        }
        Self::parse_backlog(trimmed)
    }
}

/// An accepted unit of work. Immutable once submitted to the admission controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub placement_id: String,
    pub creative_group_id: String,
    pub website_url: String,
    /// Pane count hint carried on the message; the resolved placement wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_count_hint: Option<u32>,
}

impl CaptureRequest {
    pub fn new(
        placement_id: impl Into<String>,
        creative_group_id: impl Into<String>,
        website_url: impl Into<String>,
    ) -> Self {
        Self {
            placement_id: placement_id.into(),
            creative_group_id: creative_group_id.into(),
            website_url: website_url.into(),
            pane_count_hint: None,
        }
    }
}

impl From<CaptureMessage> for CaptureRequest {
    fn from(message: CaptureMessage) -> Self {
        Self {
            placement_id: message.pid,
            creative_group_id: message.crg_id,
            website_url: message.website_url,
            pane_count_hint: message.pane_count,
        }
    }
}

/// What the element locator has to find on the loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateTarget {
    /// Iframe matched by selector, searched once across the frame tree.
    SingleIframe(String),
    /// Iframe matched by selector at any nesting depth, searched until it appears.
    NestedIframe(String),
    /// `count` native-ad images, all fully loaded.
    NativeImage(u32),
    /// Multi-pane widget: wrapper, identifying link inside it, and loaded images.
    MultiPaneNative {
        wrapper_selector: String,
        link_selector: String,
        image_count: u32,
    },
}

impl LocateTarget {
    /// Derive the locate strategy for a request from its resolved placement kind.
    pub fn for_request(
        request: &CaptureRequest,
        kind: PlacementKind,
        expected_pane_count: Option<u32>,
    ) -> Self {
        match kind {
            PlacementKind::Iframe => LocateTarget::NestedIframe(selectors::iframe_selector(
                &request.placement_id,
                &request.creative_group_id,
            )),
            PlacementKind::Native => LocateTarget::NativeImage(1),
            PlacementKind::MultiPaneNative => LocateTarget::MultiPaneNative {
                wrapper_selector: selectors::PANE_WRAPPER_SELECTOR.to_string(),
                link_selector: selectors::pane_link_selector(
                    &request.placement_id,
                    &request.creative_group_id,
                ),
                image_count: expected_pane_count
                    .or(request.pane_count_hint)
                    .unwrap_or(1)
                    .max(1),
            },
        }
    }

    /// Search the frame tree once instead of polling for a late iframe.
    pub fn single_pass(self) -> Self {
        match self {
            LocateTarget::NestedIframe(selector) => LocateTarget::SingleIframe(selector),
            other => other,
        }
    }

    pub fn kind(&self) -> PlacementKind {
        match self {
            LocateTarget::SingleIframe(_) | LocateTarget::NestedIframe(_) => PlacementKind::Iframe,
            LocateTarget::NativeImage(_) => PlacementKind::Native,
            LocateTarget::MultiPaneNative { .. } => PlacementKind::MultiPaneNative,
        }
    }
}
