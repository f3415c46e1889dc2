//! Chromium sessions over the DevTools protocol.
//!
//! Each session is its own Chromium process with a throwaway profile. The
//! process is spawned here rather than by `chromiumoxide` so its pid is known
//! to the reaper.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::{
    EnableParams as DomEnableParams, GetFrameOwnerParams, ResolveNodeParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, FrameId as CdpFrameId, FrameTree, GetFrameTreeParams,
    Viewport as CdpViewport,
};
use chromiumoxide::cdp::js_protocol::runtime::{CallFunctionOnParams, EvaluateParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::HandlerConfig;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::page::{FrameId, ImageState, PageHandle};
use super::scripts;
use super::session::{LaunchedBrowser, SessionLauncher, SessionOptions};
use crate::config::BrowserSettings;
use crate::types::{ClipRectangle, ElementRect};
use crate::{CaptureError, Result};

const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "headless_shell",
];

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

fn cdp(err: CdpError) -> CaptureError {
    CaptureError::browser(err)
}

/// Locate a Chromium binary on `PATH`.
pub fn find_chrome() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        CHROME_CANDIDATES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn chrome_binary(&self) -> Result<PathBuf> {
        self.settings
            .chrome_path
            .clone()
            .or_else(find_chrome)
            .ok_or_else(|| {
                CaptureError::SessionLaunch(
                    "no Chromium binary found; set browser.chrome_path or ADSHOT_CHROME_PATH"
                        .to_string(),
                )
            })
    }

    fn args(&self, options: &SessionOptions, profile: &Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", profile.display()),
            format!(
                "--window-size={},{}",
                options.viewport.width, options.viewport.height
            ),
            format!("--user-agent={}", options.user_agent),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--hide-scrollbars".to_string(),
            "--mute-audio".to_string(),
            // Keep cross-origin ad frames in-process so the frame tree sees them.
            "--disable-features=IsolateOrigins,site-per-process".to_string(),
        ];
        if self.settings.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }
}

/// DevTools commands share the navigation budget instead of the library default.
fn handler_config(options: &SessionOptions) -> HandlerConfig {
    HandlerConfig {
        request_timeout: options.navigation_timeout,
        ..HandlerConfig::default()
    }
}

async fn read_ws_endpoint(lines: &mut Lines<BufReader<ChildStderr>>) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        trace!(line = %line, "chromium stderr");
        if let Some(ws) = line.trim().strip_prefix(DEVTOOLS_PREFIX) {
            return Ok(ws.trim().to_string());
        }
    }
    Err(CaptureError::SessionLaunch(
        "browser exited before announcing its DevTools endpoint".to_string(),
    ))
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self, options: &SessionOptions) -> Result<LaunchedBrowser> {
        let chrome = self.chrome_binary()?;
        let profile = tempfile::Builder::new()
            .prefix("adshot-profile-")
            .tempdir()?;

        let mut child = Command::new(&chrome)
            .args(self.args(options, profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CaptureError::SessionLaunch(format!("failed to start {}: {e}", chrome.display()))
            })?;
        let pid = child.id();

        let stderr = child.stderr.take().ok_or_else(|| {
            CaptureError::SessionLaunch("browser stderr was not captured".to_string())
        })?;
        let mut lines = BufReader::new(stderr).lines();
        let ws = match timeout(self.settings.launch_timeout, read_ws_endpoint(&mut lines)).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(CaptureError::SessionLaunch(format!(
                    "browser did not start within {:?}",
                    self.settings.launch_timeout
                )));
            }
        };
        // Keep draining so a full pipe never blocks the browser.
        let stderr_task = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(line = %line, "chromium stderr");
            }
        });

        let (browser, mut handler) =
            Browser::connect_with_config(ws.clone(), handler_config(options))
                .await
                .map_err(|e| CaptureError::SessionLaunch(format!("connect to {ws}: {e}")))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools handler error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| CaptureError::SessionLaunch(format!("open page: {e}")))?;
        page.execute(DomEnableParams::default()).await.map_err(cdp)?;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(options.viewport.width))
            .height(i64::from(options.viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(CaptureError::SessionLaunch)?;
        page.execute(metrics).await.map_err(cdp)?;

        debug!(pid = ?pid, ws = %ws, "chromium session ready");
        Ok(LaunchedBrowser {
            process_id: pid,
            page: Box::new(ChromiumPage {
                page,
                browser: Mutex::new(browser),
                child: Mutex::new(Some(child)),
                tasks: vec![handler_task, stderr_task],
                _profile: profile,
            }),
        })
    }
}

pub struct ChromiumPage {
    page: Page,
    browser: Mutex<Browser>,
    child: Mutex<Option<Child>>,
    tasks: Vec<JoinHandle<()>>,
    _profile: TempDir,
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl ChromiumPage {
    async fn frame_tree(&self) -> Result<FrameTree> {
        let response = self
            .page
            .execute(GetFrameTreeParams::default())
            .await
            .map_err(cdp)?;
        Ok(response.result.frame_tree)
    }

    /// Evaluate an expression in a frame's main world.
    ///
    /// `None` when the frame has no live execution context (detached or mid-navigation).
    async fn eval_in<T: DeserializeOwned>(
        &self,
        frame: &FrameId,
        expression: String,
    ) -> Result<Option<T>> {
        let context = self
            .page
            .frame_execution_context(CdpFrameId::new(frame.clone()))
            .await
            .map_err(cdp)?;
        let Some(context) = context else {
            return Ok(None);
        };
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(context)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(CaptureError::Browser)?;
        let value = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(cdp)?
            .into_value::<T>()?;
        Ok(Some(value))
    }
}

fn find_subtree<'a>(tree: &'a FrameTree, frame: &str) -> Option<&'a FrameTree> {
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        if node.frame.id.inner() == frame {
            return Some(node);
        }
        if let Some(children) = &node.child_frames {
            stack.extend(children.iter());
        }
    }
    None
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| CaptureError::NavigationFailed(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn main_frame(&self) -> Result<FrameId> {
        Ok(self.frame_tree().await?.frame.id.inner().clone())
    }

    async fn child_frames(&self, frame: &FrameId) -> Result<Vec<FrameId>> {
        let tree = self.frame_tree().await?;
        let children = find_subtree(&tree, frame)
            .and_then(|node| node.child_frames.as_ref())
            .map(|children| {
                children
                    .iter()
                    .map(|child| child.frame.id.inner().clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(children)
    }

    async fn query_rects(&self, frame: &FrameId, selector: &str) -> Result<Vec<ElementRect>> {
        Ok(self
            .eval_in(frame, scripts::query_rects(selector))
            .await?
            .unwrap_or_default())
    }

    async fn frame_owner_rect(&self, frame: &FrameId) -> Result<Option<ElementRect>> {
        let owner = self
            .page
            .execute(GetFrameOwnerParams::new(CdpFrameId::new(frame.clone())))
            .await
            .map_err(cdp)?;
        let resolved = self
            .page
            .execute(
                ResolveNodeParams::builder()
                    .backend_node_id(owner.result.backend_node_id)
                    .build(),
            )
            .await
            .map_err(cdp)?;
        let Some(object_id) = resolved.result.object.object_id.clone() else {
            return Ok(None);
        };
        let call = CallFunctionOnParams::builder()
            .function_declaration(scripts::OWNER_RECT_FN)
            .object_id(object_id)
            .return_by_value(true)
            .build()
            .map_err(CaptureError::Browser)?;
        let response = self.page.execute(call).await.map_err(cdp)?;
        match response.result.result.value.clone() {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn image_states(&self, frame: &FrameId, selector: &str) -> Result<Vec<ImageState>> {
        Ok(self
            .eval_in(frame, scripts::image_states(selector))
            .await?
            .unwrap_or_default())
    }

    async fn click(&self, frame: &FrameId, selector: &str) -> Result<bool> {
        Ok(self
            .eval_in(frame, scripts::click(selector))
            .await?
            .unwrap_or(false))
    }

    async fn screenshot(&self, clip: &ClipRectangle, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(CdpViewport {
                x: clip.left,
                y: clip.top,
                width: clip.width,
                height: clip.height,
                scale: 1.0,
            })
            .capture_beyond_viewport(true)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(cdp)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let closed = self.browser.lock().await.close().await;
        let mut child = self.child.lock().await;
        if let Some(child) = child.as_mut() {
            if closed.is_err() {
                let _ = child.start_kill();
            }
            child.wait().await?;
        }
        *child = None;
        if let Err(e) = closed {
            warn!(error = %e, "browser did not accept close");
            return Err(cdp(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Viewport;
    use std::time::Duration;

    #[test]
    fn launch_args_carry_viewport_and_agent() {
        let launcher = ChromiumLauncher::new(BrowserSettings::default());
        let options = SessionOptions {
            viewport: Viewport::new(1280, 800),
            user_agent: "adshot-test".to_string(),
            navigation_timeout: Duration::from_secs(30),
        };
        let args = launcher.args(&options, Path::new("/tmp/profile"));

        assert!(args.contains(&"--window-size=1280,800".to_string()));
        assert!(args.contains(&"--user-agent=adshot-test".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn headful_launch_omits_headless_flag() {
        let launcher = ChromiumLauncher::new(BrowserSettings {
            headless: false,
            extra_args: vec!["--lang=en-US".to_string()],
            ..BrowserSettings::default()
        });
        let options = SessionOptions {
            viewport: Viewport::default(),
            user_agent: "ua".to_string(),
            navigation_timeout: Duration::from_secs(30),
        };
        let args = launcher.args(&options, Path::new("/tmp/p"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(args.contains(&"--lang=en-US".to_string()));
    }

    #[test]
    fn devtools_requests_time_out_with_navigation() {
        let options = SessionOptions {
            viewport: Viewport::default(),
            user_agent: "ua".to_string(),
            navigation_timeout: Duration::from_secs(7),
        };
        let config = handler_config(&options);
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert!(config.ignore_https_errors);
    }

    #[test]
    fn missing_binary_is_a_launch_error() {
        let launcher = ChromiumLauncher::new(BrowserSettings {
            chrome_path: Some(PathBuf::from("/nonexistent/chrome")),
            ..BrowserSettings::default()
        });
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let options = SessionOptions {
            viewport: Viewport::default(),
            user_agent: "ua".to_string(),
            navigation_timeout: Duration::from_secs(30),
        };
        let err = match rt.block_on(launcher.launch(&options)) {
            Ok(_) => panic!("launch should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, CaptureError::SessionLaunch(_)));
    }
}
