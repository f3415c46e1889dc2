//! Per-request capture pipeline.
//!
//! duplicate check → resolve placement → launch session → navigate →
//! dismiss overlay → locate → clip → screenshot → release session →
//! upload → persist record → delete local file.
//!
//! Navigation and element location share one deadline
//! (`navigation_timeout`). When it fires the session is force-closed.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::admission::RequestProcessor;
use crate::browser::{BrowserSessionManager, PageHandle};
use crate::clip::clip_rectangle;
use crate::locator::{ElementLocator, PollPolicy};
use crate::services::store::unix_millis;
use crate::services::{EntityResolver, MetadataStore, ThrottleCheck, UploadMetadata, Uploader};
use crate::types::{
    CaptureRequest, CaptureResult, ElementRect, LocateTarget, ResolvedPlacement, ScreenshotRecord,
};
use crate::{CaptureError, Config, Result, Viewport};

/// Prefix scheme-less URLs with `http://` and validate.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    Ok(Url::parse(&candidate)?)
}

/// `<uuid-v4>-<unix-millis>`, used as both file stem and object name.
pub fn screenshot_file_name() -> String {
    format!("{}-{}", Uuid::new_v4(), unix_millis())
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub clip: Viewport,
    pub navigation_timeout: Duration,
    pub screenshot_dir: PathBuf,
    pub freshness_window: Duration,
    pub single_pass_iframes: bool,
    pub poll: PollPolicy,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            clip: config.clip,
            navigation_timeout: config.navigation_timeout,
            screenshot_dir: config.screenshot_dir.clone(),
            freshness_window: config.screenshot_expiration(),
            single_pass_iframes: config.single_pass_iframes,
            poll: PollPolicy::from(config),
        }
    }
}

pub struct CapturePipeline {
    sessions: Arc<BrowserSessionManager>,
    locator: ElementLocator,
    resolver: Arc<dyn EntityResolver>,
    throttle: Arc<dyn ThrottleCheck>,
    uploader: Arc<dyn Uploader>,
    store: Arc<dyn MetadataStore>,
    settings: PipelineSettings,
}

impl CapturePipeline {
    pub fn new(
        sessions: Arc<BrowserSessionManager>,
        resolver: Arc<dyn EntityResolver>,
        throttle: Arc<dyn ThrottleCheck>,
        uploader: Arc<dyn Uploader>,
        store: Arc<dyn MetadataStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sessions,
            locator: ElementLocator::new(settings.poll),
            resolver,
            throttle,
            uploader,
            store,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<BrowserSessionManager> {
        &self.sessions
    }

    /// Run one request end to end and return the stored record.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<ScreenshotRecord> {
        info!(
            placement_id = %request.placement_id,
            creative_group_id = %request.creative_group_id,
            website_url = %request.website_url,
            "starting capture"
        );

        if self
            .throttle
            .captured_recently(
                &request.placement_id,
                &request.creative_group_id,
                self.settings.freshness_window,
            )
            .await?
        {
            return Err(CaptureError::Throttled {
                placement_id: request.placement_id.clone(),
                creative_group_id: request.creative_group_id.clone(),
            });
        }

        let placement = self.resolver.resolve(request).await?;
        let url = normalize_url(&request.website_url)?;
        let request = CaptureRequest {
            website_url: url.to_string(),
            ..request.clone()
        };

        let mut target =
            LocateTarget::for_request(&request, placement.kind, placement.expected_pane_count);
        if self.settings.single_pass_iframes {
            target = target.single_pass();
        }

        let captured = self.capture_screenshot(&url, &target).await?;
        let outcome = self.publish(&request, &placement, &captured).await;
        if let Err(e) = tokio::fs::remove_file(&captured.file_path).await {
            debug!(path = %captured.file_path.display(), error = %e, "screenshot cleanup failed");
        }
        outcome
    }

    /// Launch a session, find the target and write the clipped screenshot.
    pub async fn capture_screenshot(
        &self,
        url: &Url,
        target: &LocateTarget,
    ) -> Result<CaptureResult> {
        let session = self.sessions.acquire().await?;
        let deadline = CancellationToken::new();
        let timer = {
            let deadline = deadline.clone();
            let budget = self.settings.navigation_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                deadline.cancel();
            })
        };

        let located = self
            .navigate_and_locate(session.page(), url, target, &deadline)
            .await;
        timer.abort();

        let outcome = match located {
            Ok(rect) => self.screenshot(session.page(), &rect, target).await,
            Err(e) => Err(e),
        };

        if deadline.is_cancelled() {
            warn!(
                url = %url,
                timeout = ?self.settings.navigation_timeout,
                "request deadline elapsed, force-closing browser"
            );
            self.sessions.force_close(session).await;
        } else {
            self.sessions.release(session).await;
        }
        outcome
    }

    async fn navigate_and_locate(
        &self,
        page: &dyn PageHandle,
        url: &Url,
        target: &LocateTarget,
        deadline: &CancellationToken,
    ) -> Result<ElementRect> {
        tokio::select! {
            _ = deadline.cancelled() => {
                return Err(CaptureError::Cancelled("navigation".to_string()));
            }
            loaded = page.goto(url.as_str()) => loaded?,
        }
        debug!(url = %url, "page loaded");

        tokio::select! {
            _ = deadline.cancelled() => {
                return Err(CaptureError::Cancelled("overlay check".to_string()));
            }
            dismissed = self.locator.dismiss_overlays(page) => {
                if let Err(e) = dismissed {
                    debug!(error = %e, "overlay check failed");
                }
            }
        }

        tokio::select! {
            _ = deadline.cancelled() => Err(CaptureError::Cancelled("element search".to_string())),
            located = self.locator.locate(page, target, deadline) => located,
        }
    }

    async fn screenshot(
        &self,
        page: &dyn PageHandle,
        rect: &ElementRect,
        target: &LocateTarget,
    ) -> Result<CaptureResult> {
        let clip = clip_rectangle(rect, self.settings.clip);
        if !self.settings.clip.fits(rect) {
            warn!(
                width = rect.width,
                height = rect.height,
                clip = %self.settings.clip,
                "ad is larger than the output image; its top-left edge is cropped"
            );
        }

        let file_name = screenshot_file_name();
        let file_path = self.settings.screenshot_dir.join(format!("{file_name}.png"));
        tokio::fs::create_dir_all(&self.settings.screenshot_dir).await?;

        if let Err(e) = page.screenshot(&clip, &file_path).await {
            remove_quietly(&file_path).await;
            return Err(e);
        }
        debug!(path = %file_path.display(), ?clip, "screenshot written");

        Ok(CaptureResult {
            file_path,
            file_name,
            clip_rectangle: clip,
            target_kind: target.kind(),
        })
    }

    async fn publish(
        &self,
        request: &CaptureRequest,
        placement: &ResolvedPlacement,
        captured: &CaptureResult,
    ) -> Result<ScreenshotRecord> {
        let clip = &captured.clip_rectangle;
        let metadata = UploadMetadata {
            h: clip.height.round() as u32,
            w: clip.width.round() as u32,
            placement: request.placement_id.clone(),
            creativegroup: request.creative_group_id.clone(),
            url: request.website_url.clone(),
        };
        let image_url = self
            .uploader
            .upload(&captured.file_path, &captured.file_name, &metadata)
            .await?;
        info!(
            placement_id = %request.placement_id,
            creative_group_id = %request.creative_group_id,
            image_url = %image_url,
            "screenshot uploaded"
        );

        let record = ScreenshotRecord::new(request, placement, image_url, clip, unix_millis());
        if let Err(e) = self.store.save(&record).await {
            error!(
                placement_id = %request.placement_id,
                creative_group_id = %request.creative_group_id,
                error = %e,
                "failed to persist screenshot record"
            );
        }
        Ok(record)
    }
}

async fn remove_quietly(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let _ = tokio::fs::remove_file(path).await;
    }
}

#[async_trait]
impl RequestProcessor for CapturePipeline {
    async fn process(&self, request: CaptureRequest) -> Result<()> {
        self.capture(&request).await.map(|_| ())
    }
}
