//! Finding the advertisement on a loaded page.
//!
//! Each [`LocateTarget`] runs its own search:
//! - iframe targets walk the frame tree depth-first and report the rectangle
//!   of the outermost ancestor iframe under the top document
//! - native images poll until the expected images have finished loading
//! - multi-pane widgets poll three phases in turn: wrapper, link, images
//!
//! Every poll loop has a fixed attempt budget and stops early when the
//! request deadline token is cancelled.

pub mod selectors;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::browser::{FrameId, ImageState, PageHandle};
use crate::error::LocatePhase;
use crate::types::{ElementRect, LocateTarget};
use crate::{CaptureError, Config, Result};

/// Attempt budget shared by every poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            retries: 20,
            interval: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for PollPolicy {
    fn from(config: &Config) -> Self {
        Self {
            retries: config.poll_retry_count.max(1),
            interval: config.poll_interval,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElementLocator {
    policy: PollPolicy,
}

impl ElementLocator {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Click the known pop-up close button if the page shows one.
    pub async fn dismiss_overlays(&self, page: &dyn PageHandle) -> Result<bool> {
        let main = page.main_frame().await?;
        let clicked = page.click(&main, selectors::OVERLAY_CLOSE_SELECTOR).await?;
        if clicked {
            debug!(selector = selectors::OVERLAY_CLOSE_SELECTOR, "dismissed overlay");
        }
        Ok(clicked)
    }

    /// Page-coordinate rectangle of the target, or `ElementNotFound`.
    pub async fn locate(
        &self,
        page: &dyn PageHandle,
        target: &LocateTarget,
        deadline: &CancellationToken,
    ) -> Result<ElementRect> {
        match target {
            LocateTarget::SingleIframe(selector) => {
                if deadline.is_cancelled() {
                    return Err(CaptureError::Cancelled("iframe search".to_string()));
                }
                find_iframe(page, selector, deadline)
                    .await?
                    .ok_or_else(|| {
                        CaptureError::not_found(
                            LocatePhase::Iframe,
                            format!("no frame contains {selector}"),
                        )
                    })
            }
            LocateTarget::NestedIframe(selector) => self
                .poll(deadline, LocatePhase::Iframe, || {
                    find_iframe(page, selector, deadline)
                })
                .await?
                .ok_or_else(|| self.exhausted(LocatePhase::Iframe, selector)),
            LocateTarget::NativeImage(count) => {
                let count = (*count).max(1) as usize;
                self.poll(deadline, LocatePhase::NativeImages, || async move {
                    let main = page.main_frame().await?;
                    let images = page
                        .image_states(&main, selectors::NATIVE_IMAGE_SELECTOR)
                        .await?;
                    Ok::<_, CaptureError>(loaded_bounds(&images, count))
                })
                .await?
                .ok_or_else(|| {
                    self.exhausted(
                        LocatePhase::NativeImages,
                        &format!("{count} x {}", selectors::NATIVE_IMAGE_SELECTOR),
                    )
                })
            }
            LocateTarget::MultiPaneNative {
                wrapper_selector,
                link_selector,
                image_count,
            } => {
                self.locate_panes(
                    page,
                    wrapper_selector,
                    link_selector,
                    (*image_count).max(1) as usize,
                    deadline,
                )
                .await
            }
        }
    }

    async fn locate_panes(
        &self,
        page: &dyn PageHandle,
        wrapper_selector: &str,
        link_selector: &str,
        image_count: usize,
        deadline: &CancellationToken,
    ) -> Result<ElementRect> {
        let (wrapper, first_rect) = self
            .poll(deadline, LocatePhase::PaneWrapper, || async move {
                let main = page.main_frame().await?;
                for candidate in selectors::alternatives(wrapper_selector) {
                    if let Some(rect) = page.query_rect(&main, candidate).await? {
                        return Ok(Some((candidate, rect)));
                    }
                }
                Ok::<_, CaptureError>(None)
            })
            .await?
            .ok_or_else(|| self.exhausted(LocatePhase::PaneWrapper, wrapper_selector))?;
        trace!(wrapper, "pane wrapper found");

        let scoped_link = selectors::within(wrapper, link_selector);
        let scoped_link = scoped_link.as_str();
        self.poll(deadline, LocatePhase::PaneLink, || async move {
            let main = page.main_frame().await?;
            Ok::<_, CaptureError>(page.query_rect(&main, scoped_link).await?.map(|_| ()))
        })
        .await?
        .ok_or_else(|| self.exhausted(LocatePhase::PaneLink, scoped_link))?;

        let scoped_images = selectors::within(wrapper, selectors::NATIVE_IMAGE_SELECTOR);
        let scoped_images = scoped_images.as_str();
        self.poll(deadline, LocatePhase::PaneImages, || async move {
            let main = page.main_frame().await?;
            let images = page.image_states(&main, scoped_images).await?;
            Ok::<_, CaptureError>(loaded_bounds(&images, image_count).map(|_| ()))
        })
        .await?
        .ok_or_else(|| {
            self.exhausted(
                LocatePhase::PaneImages,
                &format!("{image_count} x {scoped_images}"),
            )
        })?;

        // Loaded images can change the wrapper's layout; measure again.
        let remeasure = async {
            let main = page.main_frame().await?;
            page.query_rect(&main, wrapper).await
        };
        Ok(until_deadline(deadline, "pane wrapper", remeasure)
            .await?
            .unwrap_or(first_rect))
    }

    /// Run `attempt` until it yields a value, the budget runs out (`Ok(None)`)
    /// or the deadline fires (`Cancelled`). Attempt errors count as misses.
    async fn poll<T, F, Fut>(
        &self,
        deadline: &CancellationToken,
        phase: LocatePhase,
        mut attempt: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let retries = self.policy.retries.max(1);
        for n in 1..=retries {
            if deadline.is_cancelled() {
                return Err(CaptureError::Cancelled(format!("{phase} polling")));
            }
            match until_deadline(deadline, &format!("{phase} polling"), attempt()).await {
                Ok(Some(found)) => {
                    trace!(%phase, attempt = n, "poll satisfied");
                    return Ok(Some(found));
                }
                Ok(None) => {}
                Err(CaptureError::Cancelled(what)) => return Err(CaptureError::Cancelled(what)),
                Err(e) => debug!(%phase, attempt = n, error = %e, "poll attempt failed"),
            }
            if n < retries {
                tokio::select! {
                    _ = deadline.cancelled() => {
                        return Err(CaptureError::Cancelled(format!("{phase} polling")));
                    }
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
        }
        Ok(None)
    }

    fn exhausted(&self, phase: LocatePhase, what: &str) -> CaptureError {
        CaptureError::not_found(
            phase,
            format!("{what} after {} attempts", self.policy.retries.max(1)),
        )
    }
}

/// Await `fut` unless the deadline fires first.
async fn until_deadline<T>(
    deadline: &CancellationToken,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = deadline.cancelled() => Err(CaptureError::Cancelled(what.to_string())),
        outcome = fut => outcome,
    }
}

/// Bounds of the first `count` images once all of them have loaded.
fn loaded_bounds(images: &[ImageState], count: usize) -> Option<ElementRect> {
    if images.len() < count {
        return None;
    }
    let wanted = &images[..count];
    if !wanted.iter().all(ImageState::is_loaded) {
        return None;
    }
    wanted
        .iter()
        .map(|image| image.rect)
        .reduce(|acc, rect| acc.union(&rect))
}

/// One depth-first pass over the frame tree.
///
/// Returns the element's own rectangle when it sits in the top document,
/// otherwise the rectangle of the top-level iframe that (transitively) holds it.
async fn find_iframe(
    page: &dyn PageHandle,
    selector: &str,
    deadline: &CancellationToken,
) -> Result<Option<ElementRect>> {
    const WHAT: &str = "iframe search";
    let root = until_deadline(deadline, WHAT, page.main_frame()).await?;
    let mut parents: HashMap<FrameId, FrameId> = HashMap::new();
    let mut stack = vec![root.clone()];

    while let Some(frame) = stack.pop() {
        let found = until_deadline(deadline, WHAT, page.query_rect(&frame, selector)).await?;
        if let Some(rect) = found {
            if frame == root {
                return Ok(Some(rect));
            }
            let outermost = outermost_ancestor(&parents, &root, frame);
            trace!(frame = %outermost, "match nested under top-level frame");
            return until_deadline(deadline, WHAT, page.frame_owner_rect(&outermost)).await;
        }

        let children = until_deadline(deadline, WHAT, page.child_frames(&frame)).await?;
        // Reversed so the first child in document order is searched first.
        for child in children.into_iter().rev() {
            parents.insert(child.clone(), frame.clone());
            stack.push(child);
        }
    }
    Ok(None)
}

fn outermost_ancestor(
    parents: &HashMap<FrameId, FrameId>,
    root: &FrameId,
    mut frame: FrameId,
) -> FrameId {
    while let Some(parent) = parents.get(&frame) {
        if parent == root {
            break;
        }
        frame = parent.clone();
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClipRectangle;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory page: a frame tree plus per-frame selector results.
    #[derive(Default)]
    struct FakePage {
        children: HashMap<String, Vec<String>>,
        rects: HashMap<(String, String), Vec<ElementRect>>,
        owners: HashMap<String, ElementRect>,
        images: Mutex<Vec<Vec<ImageState>>>,
        image_polls: AtomicU32,
        link_appears_after: u32,
        link_polls: AtomicU32,
    }

    impl FakePage {
        fn frame(mut self, parent: &str, child: &str) -> Self {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(child.to_string());
            self
        }

        fn rect(mut self, frame: &str, selector: &str, rect: ElementRect) -> Self {
            self.rects
                .entry((frame.to_string(), selector.to_string()))
                .or_default()
                .push(rect);
            self
        }

        fn owner(mut self, frame: &str, rect: ElementRect) -> Self {
            self.owners.insert(frame.to_string(), rect);
            self
        }

        /// Image states returned on successive polls; the last one repeats.
        fn images(self, sequence: Vec<Vec<ImageState>>) -> Self {
            *self.images.lock().unwrap() = sequence;
            self
        }
    }

    #[async_trait]
    impl PageHandle for FakePage {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn main_frame(&self) -> Result<FrameId> {
            Ok("main".to_string())
        }
        async fn child_frames(&self, frame: &FrameId) -> Result<Vec<FrameId>> {
            Ok(self.children.get(frame).cloned().unwrap_or_default())
        }
        async fn query_rects(&self, frame: &FrameId, selector: &str) -> Result<Vec<ElementRect>> {
            if selector.ends_with(LINK) {
                let n = self.link_polls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= self.link_appears_after {
                    return Ok(Vec::new());
                }
            }
            Ok(self
                .rects
                .get(&(frame.clone(), selector.to_string()))
                .cloned()
                .unwrap_or_default())
        }
        async fn frame_owner_rect(&self, frame: &FrameId) -> Result<Option<ElementRect>> {
            Ok(self.owners.get(frame).copied())
        }
        async fn image_states(&self, _frame: &FrameId, _selector: &str) -> Result<Vec<ImageState>> {
            let n = self.image_polls.fetch_add(1, Ordering::SeqCst) as usize;
            let sequence = self.images.lock().unwrap();
            Ok(sequence
                .get(n)
                .or_else(|| sequence.last())
                .cloned()
                .unwrap_or_default())
        }
        async fn click(&self, _frame: &FrameId, selector: &str) -> Result<bool> {
            Ok(selector == selectors::OVERLAY_CLOSE_SELECTOR)
        }
        async fn screenshot(&self, _clip: &ClipRectangle, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    const TAG: &str = r#"iframe[src*="crgid=c1"][src*="pid=p1"]"#;
    const LINK: &str = r#"a[href*="pid=p1"][href*="crgid=c1"]"#;

    fn fast() -> ElementLocator {
        ElementLocator::new(PollPolicy {
            retries: 5,
            interval: Duration::from_millis(100),
        })
    }

    fn image(loaded: bool, rect: ElementRect) -> ImageState {
        ImageState {
            complete: true,
            natural_width: if loaded { 300.0 } else { 0.0 },
            rect,
        }
    }

    #[tokio::test]
    async fn iframe_in_top_document_reports_own_rect() {
        let rect = ElementRect::new(50.0, 60.0, 300.0, 250.0);
        let page = FakePage::default().rect("main", TAG, rect);

        let found = fast()
            .locate(
                &page,
                &LocateTarget::SingleIframe(TAG.to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(found, rect);
    }

    #[tokio::test]
    async fn nested_match_reports_outermost_iframe() {
        let outer = ElementRect::new(400.0, 100.0, 728.0, 90.0);
        let page = FakePage::default()
            .frame("main", "header")
            .frame("main", "ad-outer")
            .frame("ad-outer", "ad-inner")
            .rect("ad-inner", TAG, ElementRect::new(0.0, 0.0, 728.0, 90.0))
            .owner("header", ElementRect::new(0.0, 0.0, 1024.0, 80.0))
            .owner("ad-outer", outer)
            .owner("ad-inner", ElementRect::new(5.0, 5.0, 728.0, 90.0));

        let found = fast()
            .locate(
                &page,
                &LocateTarget::SingleIframe(TAG.to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(found, outer);
    }

    #[tokio::test]
    async fn first_match_in_document_order_wins() {
        let first = ElementRect::new(10.0, 10.0, 300.0, 250.0);
        let page = FakePage::default()
            .frame("main", "a")
            .frame("main", "b")
            .frame("a", "a1")
            .rect("a1", TAG, ElementRect::new(0.0, 0.0, 1.0, 1.0))
            .rect("b", TAG, ElementRect::new(0.0, 0.0, 1.0, 1.0))
            .owner("a", first)
            .owner("b", ElementRect::new(900.0, 0.0, 300.0, 250.0));

        let found = fast()
            .locate(
                &page,
                &LocateTarget::NestedIframe(TAG.to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(found, first);
    }

    #[tokio::test]
    async fn missing_iframe_is_not_found() {
        let page = FakePage::default().frame("main", "a");
        let err = fast()
            .locate(
                &page,
                &LocateTarget::SingleIframe(TAG.to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::ElementNotFound {
                phase: LocatePhase::Iframe,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_natural_width_exhausts_full_budget() {
        let rect = ElementRect::new(0.0, 0.0, 300.0, 250.0);
        let page = FakePage::default().images(vec![vec![image(false, rect)]]);

        let err = fast()
            .locate(&page, &LocateTarget::NativeImage(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CaptureError::ElementNotFound {
                phase: LocatePhase::NativeImages,
                ..
            }
        ));
        assert_eq!(page.image_polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn native_image_found_once_loaded() {
        let rect = ElementRect::new(120.0, 40.0, 300.0, 250.0);
        let page = FakePage::default().images(vec![
            vec![],
            vec![image(false, rect)],
            vec![image(true, rect)],
        ]);

        let found = fast()
            .locate(&page, &LocateTarget::NativeImage(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, rect);
        assert_eq!(page.image_polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn several_native_images_report_union() {
        let a = ElementRect::new(100.0, 0.0, 200.0, 100.0);
        let b = ElementRect::new(100.0, 220.0, 200.0, 150.0);
        let page = FakePage::default().images(vec![vec![image(true, a), image(true, b)]]);

        let found = fast()
            .locate(&page, &LocateTarget::NativeImage(2), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, ElementRect::new(100.0, 0.0, 420.0, 150.0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_deadline_stops_polling() {
        let rect = ElementRect::new(0.0, 0.0, 300.0, 250.0);
        let page = FakePage::default().images(vec![vec![image(false, rect)]]);
        let deadline = CancellationToken::new();
        let locator = ElementLocator::new(PollPolicy {
            retries: 1000,
            interval: Duration::from_secs(1),
        });

        let timer = deadline.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            timer.cancel();
        });

        let err = locator
            .locate(&page, &LocateTarget::NativeImage(1), &deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled(_)));
        assert!(page.image_polls.load(Ordering::SeqCst) <= 4);
    }

    /// Page whose element queries never answer.
    struct StuckPage;

    #[async_trait]
    impl PageHandle for StuckPage {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn main_frame(&self) -> Result<FrameId> {
            Ok("main".to_string())
        }
        async fn child_frames(&self, _frame: &FrameId) -> Result<Vec<FrameId>> {
            std::future::pending().await
        }
        async fn query_rects(&self, _frame: &FrameId, _selector: &str) -> Result<Vec<ElementRect>> {
            std::future::pending().await
        }
        async fn frame_owner_rect(&self, _frame: &FrameId) -> Result<Option<ElementRect>> {
            std::future::pending().await
        }
        async fn image_states(&self, _frame: &FrameId, _selector: &str) -> Result<Vec<ImageState>> {
            std::future::pending().await
        }
        async fn click(&self, _frame: &FrameId, _selector: &str) -> Result<bool> {
            std::future::pending().await
        }
        async fn screenshot(&self, _clip: &ClipRectangle, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_page_queries_end_at_the_deadline() {
        let targets = [
            LocateTarget::SingleIframe(TAG.to_string()),
            LocateTarget::NestedIframe(TAG.to_string()),
            LocateTarget::NativeImage(1),
            pane_target(2),
        ];
        for target in targets {
            let deadline = CancellationToken::new();
            let timer = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                timer.cancel();
            });

            let outcome = tokio::time::timeout(
                Duration::from_secs(3),
                fast().locate(&StuckPage, &target, &deadline),
            )
            .await
            .unwrap_or_else(|_| panic!("{target:?} outlived its deadline"));
            assert!(
                matches!(outcome, Err(CaptureError::Cancelled(_))),
                "{target:?} returned {outcome:?}"
            );
        }
    }

    fn pane_target(count: u32) -> LocateTarget {
        LocateTarget::MultiPaneNative {
            wrapper_selector: selectors::PANE_WRAPPER_SELECTOR.to_string(),
            link_selector: LINK.to_string(),
            image_count: count,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn multi_pane_runs_all_phases() {
        let wrapper = ElementRect::new(900.0, 0.0, 1000.0, 300.0);
        let pane = ElementRect::new(910.0, 10.0, 300.0, 250.0);
        let page = FakePage {
            link_appears_after: 2,
            ..FakePage::default()
        }
        .rect("main", "div.cliques-widget", wrapper)
        .rect("main", &format!("div.cliques-widget {LINK}"), pane)
        .images(vec![
            vec![image(true, pane)],
            vec![image(true, pane), image(true, pane), image(true, pane)],
        ]);

        let found = fast()
            .locate(&page, &pane_target(3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, wrapper);
        assert_eq!(page.link_polls.load(Ordering::SeqCst), 3);
        assert_eq!(page.image_polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn multi_pane_reports_failing_phase() {
        let wrapper = ElementRect::new(900.0, 0.0, 1000.0, 300.0);
        let page = FakePage::default().rect("main", "div#cliques-widget", wrapper);

        let err = fast()
            .locate(&page, &pane_target(2), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            CaptureError::ElementNotFound { phase, detail } => {
                assert_eq!(phase, LocatePhase::PaneLink);
                assert!(detail.starts_with("div#cliques-widget a[href"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_wrapper_fails_first_phase() {
        let page = FakePage::default();
        let err = fast()
            .locate(&page, &pane_target(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::ElementNotFound {
                phase: LocatePhase::PaneWrapper,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn overlay_is_dismissed() {
        assert!(fast().dismiss_overlays(&FakePage::default()).await.unwrap());
    }

    #[test]
    fn outermost_ancestor_stops_below_root() {
        let root = "main".to_string();
        let parents: HashMap<FrameId, FrameId> = [
            ("a".to_string(), "main".to_string()),
            ("b".to_string(), "a".to_string()),
            ("c".to_string(), "b".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(outermost_ancestor(&parents, &root, "c".to_string()), "a");
        assert_eq!(outermost_ancestor(&parents, &root, "a".to_string()), "a");
    }
}
