//! OS process inspection for the session reaper.
//!
//! [`ProcessInspector`] is the seam tests fake. [`ProcfsInspector`] is the
//! Linux implementation: it treats every direct child of this worker whose
//! command name looks like a Chromium build as an owned browser process.

use async_trait::async_trait;
use std::time::Duration;

use crate::{CaptureError, Result};

#[async_trait]
pub trait ProcessInspector: Send + Sync {
    /// Live browser processes started by this worker.
    async fn list_owned_process_ids(&self) -> Result<Vec<u32>>;

    /// Wall-clock time since the process started, `None` once it has exited.
    async fn elapsed(&self, pid: u32) -> Result<Option<Duration>>;

    /// Force-terminate. A process that already exited is not an error.
    async fn terminate(&self, pid: u32) -> Result<()>;
}

/// Outcome of one reaper sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub inspected: usize,
    pub terminated: Vec<u32>,
}

const BROWSER_COMMAND_MARKERS: &[&str] = &["chrom", "headless_shell"];

#[derive(Debug, Clone)]
pub struct ProcfsInspector {
    parent_pid: u32,
}

impl Default for ProcfsInspector {
    fn default() -> Self {
        Self {
            parent_pid: std::process::id(),
        }
    }
}

impl ProcfsInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect children of another process instead of this one.
    pub fn for_parent(parent_pid: u32) -> Self {
        Self { parent_pid }
    }
}

/// Fields of `/proc/<pid>/stat` the reaper needs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProcStat {
    comm: String,
    state: char,
    ppid: u32,
    start_ticks: u64,
}

impl ProcStat {
    fn parse(raw: &str) -> Option<Self> {
        // comm is parenthesised and may itself contain spaces or ')'.
        let open = raw.find('(')?;
        let close = raw.rfind(')')?;
        let comm = raw.get(open + 1..close)?.to_string();
        let mut rest = raw.get(close + 1..)?.split_whitespace();

        let state = rest.next()?.chars().next()?;
        let ppid = rest.next()?.parse().ok()?;
        // starttime is field 22; state was field 3.
        let start_ticks = rest.nth(22 - 3 - 2)?.parse().ok()?;

        Some(Self {
            comm,
            state,
            ppid,
            start_ticks,
        })
    }

    fn is_running(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }

    fn is_browser(&self) -> bool {
        BROWSER_COMMAND_MARKERS
            .iter()
            .any(|marker| self.comm.to_ascii_lowercase().contains(marker))
    }
}

async fn read_stat(pid: u32) -> Option<ProcStat> {
    let raw = tokio::fs::read_to_string(format!("/proc/{pid}/stat"))
        .await
        .ok()?;
    ProcStat::parse(&raw)
}

async fn uptime() -> Result<f64> {
    let raw = tokio::fs::read_to_string("/proc/uptime").await?;
    raw.split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CaptureError::browser(format!("Unexpected /proc/uptime contents: {raw}")))
}

fn clock_ticks_per_second() -> f64 {
    #[cfg(unix)]
    {
        use nix::unistd::{sysconf, SysconfVar};
        if let Ok(Some(ticks)) = sysconf(SysconfVar::CLK_TCK) {
            if ticks > 0 {
                return ticks as f64;
            }
        }
    }
    100.0
}

#[async_trait]
impl ProcessInspector for ProcfsInspector {
    async fn list_owned_process_ids(&self) -> Result<Vec<u32>> {
        let mut entries = tokio::fs::read_dir("/proc").await?;
        let mut pids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            if let Some(stat) = read_stat(pid).await {
                if stat.ppid == self.parent_pid && stat.is_running() && stat.is_browser() {
                    pids.push(pid);
                }
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    async fn elapsed(&self, pid: u32) -> Result<Option<Duration>> {
        let Some(stat) = read_stat(pid).await else {
            return Ok(None);
        };
        if !stat.is_running() {
            return Ok(None);
        }
        let started = stat.start_ticks as f64 / clock_ticks_per_second();
        let elapsed = (uptime().await? - started).max(0.0);
        Ok(Some(Duration::from_secs_f64(elapsed)))
    }

    async fn terminate(&self, pid: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(CaptureError::browser(format!(
                    "Failed to kill browser process {pid}: {e}"
                ))),
            }
        }

        #[cfg(not(unix))]
        {
            Err(CaptureError::browser(format!(
                "Cannot terminate process {pid} on this platform"
            )))
        }
    }
}
