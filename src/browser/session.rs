//! Browser session lifecycle: launch, graceful release, forced close and reaping.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::page::PageHandle;
use super::reaper::{ProcessInspector, ReapReport};
use crate::{Result, Viewport};

/// Settings applied to every launched session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub viewport: Viewport,
    pub user_agent: String,
    pub navigation_timeout: Duration,
}

/// A freshly launched browser, before the manager takes ownership.
pub struct LaunchedBrowser {
    /// OS pid of the browser process, when the launcher knows it.
    pub process_id: Option<u32>,
    pub page: Box<dyn PageHandle>,
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, options: &SessionOptions) -> Result<LaunchedBrowser>;
}

/// One live browser plus its page. Owned by exactly one request.
pub struct BrowserSession {
    id: u64,
    process_id: Option<u32>,
    created_at: Instant,
    page: Box<dyn PageHandle>,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("id", &self.id)
            .field("process_id", &self.process_id)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

impl BrowserSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn page(&self) -> &dyn PageHandle {
        self.page.as_ref()
    }
}

pub struct BrowserSessionManager {
    launcher: Arc<dyn SessionLauncher>,
    inspector: Arc<dyn ProcessInspector>,
    options: SessionOptions,
    close_timeout: Duration,
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Option<u32>>>,
}

impl BrowserSessionManager {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        inspector: Arc<dyn ProcessInspector>,
        options: SessionOptions,
        close_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            inspector,
            options,
            close_timeout,
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Sessions acquired and not yet released.
    pub fn live_sessions(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    /// Launch a new browser with the configured viewport and user agent.
    pub async fn acquire(&self) -> Result<BrowserSession> {
        let launched = self.launcher.launch(&self.options).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut live) = self.live.lock() {
            live.insert(id, launched.process_id);
        }
        debug!(session = id, pid = ?launched.process_id, "browser session acquired");
        Ok(BrowserSession {
            id,
            process_id: launched.process_id,
            created_at: Instant::now(),
            page: launched.page,
        })
    }

    /// Close gracefully. A close that fails or hangs past the close timeout
    /// is followed by killing the session's process.
    pub async fn release(&self, session: BrowserSession) {
        self.forget(session.id);
        match timeout(self.close_timeout, session.page.close()).await {
            Ok(Ok(())) => {
                debug!(session = session.id, "browser session closed");
            }
            Ok(Err(e)) => {
                warn!(session = session.id, error = %e, "browser close failed");
                self.kill_process(session.process_id).await;
            }
            Err(_) => {
                warn!(
                    session = session.id,
                    timeout = ?self.close_timeout,
                    "browser close timed out"
                );
                self.kill_process(session.process_id).await;
            }
        }
    }

    /// Kill without waiting for a graceful exit. Used once the request deadline fired.
    pub async fn force_close(&self, session: BrowserSession) {
        self.forget(session.id);
        if session.process_id.is_some() {
            self.kill_process(session.process_id).await;
        }
        // Drops the CDP connection; the browser is already gone or going.
        let _ = timeout(Duration::from_millis(500), session.page.close()).await;
        debug!(session = session.id, "browser session force-closed");
    }

    /// Kill every owned browser process older than `max_lifetime`.
    ///
    /// Never fails: inspection errors are logged and retried on the next sweep.
    pub async fn reap(&self, max_lifetime: Duration) -> ReapReport {
        let pids = match self.inspector.list_owned_process_ids().await {
            Ok(pids) => pids,
            Err(e) => {
                debug!(error = %e, "cannot enumerate browser processes");
                return ReapReport::default();
            }
        };

        let mut report = ReapReport {
            inspected: pids.len(),
            terminated: Vec::new(),
        };
        for pid in pids {
            let elapsed = match self.inspector.elapsed(pid).await {
                Ok(Some(elapsed)) => elapsed,
                Ok(None) => continue,
                Err(e) => {
                    debug!(pid, error = %e, "cannot read browser process age");
                    continue;
                }
            };
            if elapsed <= max_lifetime {
                continue;
            }
            match self.inspector.terminate(pid).await {
                Ok(()) => {
                    warn!(
                        pid,
                        elapsed_secs = elapsed.as_secs(),
                        max_lifetime_secs = max_lifetime.as_secs(),
                        "killed browser process past its lifetime"
                    );
                    report.terminated.push(pid);
                }
                Err(e) => debug!(pid, error = %e, "failed to kill browser process"),
            }
        }
        report
    }

    /// Run [`reap`](Self::reap) every `interval` until `shutdown` is cancelled.
    pub fn start_reaper(
        self: &Arc<Self>,
        interval: Duration,
        max_lifetime: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                max_lifetime_secs = max_lifetime.as_secs(),
                "session reaper started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let report = manager.reap(max_lifetime).await;
                if !report.terminated.is_empty() {
                    info!(
                        inspected = report.inspected,
                        terminated = report.terminated.len(),
                        "reaper sweep finished"
                    );
                }
            }
            debug!("session reaper stopped");
        })
    }

    fn forget(&self, id: u64) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&id);
        }
    }

    async fn kill_process(&self, pid: Option<u32>) {
        let Some(pid) = pid else {
            warn!("browser process id unknown; left to the reaper's enumeration");
            return;
        };
        if let Err(e) = self.inspector.terminate(pid).await {
            warn!(pid, error = %e, "failed to kill browser process");
        }
    }
}
