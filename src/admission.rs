//! Admission control for capture requests.
//!
//! At most `max_concurrent` requests run at once. A request arriving while
//! every slot is busy waits in a FIFO overflow queue; each completion frees a
//! slot and hands it to the oldest queued request. Claiming a slot and
//! queueing happen under one lock, as do releasing a slot and draining.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::types::CaptureRequest;
use crate::Result;

/// The per-request work the controller schedules.
#[async_trait]
pub trait RequestProcessor: Send + Sync + 'static {
    async fn process(&self, request: CaptureRequest) -> Result<()>;
}

/// What happened to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    /// Queued behind `position - 1` other requests.
    Queued { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
}

#[derive(Default)]
struct GateState {
    active: usize,
    queue: VecDeque<CaptureRequest>,
}

struct Inner {
    processor: Arc<dyn RequestProcessor>,
    max_concurrent: usize,
    drain_delay: Duration,
    state: Mutex<GateState>,
    idle: Notify,
}

#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    pub fn new(processor: Arc<dyn RequestProcessor>, max_concurrent: usize) -> Self {
        Self::with_drain_delay(processor, max_concurrent, Duration::ZERO)
    }

    /// `drain_delay` is waited before a queued request starts in a freed slot.
    pub fn with_drain_delay(
        processor: Arc<dyn RequestProcessor>,
        max_concurrent: usize,
        drain_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                processor,
                max_concurrent: max_concurrent.max(1),
                drain_delay,
                state: Mutex::new(GateState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Start the request now if a slot is free, otherwise queue it. Never blocks.
    pub fn submit(&self, request: CaptureRequest) -> Admission {
        let mut state = self.lock();
        if state.active < self.inner.max_concurrent {
            state.active += 1;
            drop(state);
            self.spawn(request, false);
            Admission::Started
        } else {
            debug!(
                placement_id = %request.placement_id,
                creative_group_id = %request.creative_group_id,
                queued = state.queue.len() + 1,
                "all sessions busy, request queued"
            );
            state.queue.push_back(request);
            Admission::Queued {
                position: state.queue.len(),
            }
        }
    }

    pub fn stats(&self) -> GateStats {
        let state = self.lock();
        GateStats {
            active: state.active,
            queued: state.queue.len(),
            max_concurrent: self.inner.max_concurrent,
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.active == 0 && state.queue.is_empty()
    }

    /// Resolve once nothing is running or queued.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // A poisoned gate still holds consistent counters; every mutation
        // completes before the guard drops.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Free one slot and claim slots for as many queued requests as fit.
    fn release_slot(&self) -> Vec<CaptureRequest> {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        let mut drained = Vec::new();
        while state.active < self.inner.max_concurrent {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            state.active += 1;
            drained.push(next);
        }
        if state.active == 0 && state.queue.is_empty() {
            self.inner.idle.notify_waiters();
        }
        drained
    }

    fn spawn(&self, request: CaptureRequest, from_queue: bool) {
        let this = self.clone();
        tokio::spawn(async move {
            if from_queue && !this.inner.drain_delay.is_zero() {
                tokio::time::sleep(this.inner.drain_delay).await;
            }
            this.run(request).await;
            for next in this.release_slot() {
                this.spawn(next, true);
            }
        });
    }

    async fn run(&self, request: CaptureRequest) {
        let started = Instant::now();
        let placement_id = request.placement_id.clone();
        let creative_group_id = request.creative_group_id.clone();
        let website_url = request.website_url.clone();

        // Inner task so a panicking processor still releases its slot.
        let processor = Arc::clone(&self.inner.processor);
        let outcome = tokio::spawn(async move { processor.process(request).await }).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(())) => info!(
                %placement_id,
                %creative_group_id,
                %website_url,
                elapsed_ms,
                "capture finished"
            ),
            Ok(Err(e)) if e.is_expected() => warn!(
                %placement_id,
                %creative_group_id,
                %website_url,
                "{e}"
            ),
            Ok(Err(e)) => error!(
                %placement_id,
                %creative_group_id,
                %website_url,
                category = ?e.category(),
                elapsed_ms,
                "capture failed: {e}"
            ),
            Err(join) => error!(
                %placement_id,
                %creative_group_id,
                %website_url,
                "capture task aborted: {join}"
            ),
        }
    }
}
