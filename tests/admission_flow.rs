use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use adshot_lib::types::CaptureRequest;
use adshot_lib::{Admission, AdmissionController, GateStats, RequestProcessor, Result};

/// Holds every request until the test hands out a permit.
struct Held {
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    permits: Semaphore,
}

impl Held {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            permits: Semaphore::new(0),
        })
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn finish_one(&self) {
        self.permits.add_permits(1);
    }
}

#[async_trait]
impl RequestProcessor for Held {
    async fn process(&self, request: CaptureRequest) -> Result<()> {
        self.started.lock().unwrap().push(request.placement_id);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        self.permits.acquire().await.unwrap().forget();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn request(pid: &str) -> CaptureRequest {
    CaptureRequest::new(pid, "crg", "http://publisher.example")
}

async fn until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn third_request_waits_for_a_free_slot() {
    let held = Held::new();
    let gate = AdmissionController::new(held.clone(), 2);

    assert_eq!(gate.submit(request("p1")), Admission::Started);
    assert_eq!(gate.submit(request("p2")), Admission::Started);
    assert_eq!(gate.submit(request("p3")), Admission::Queued { position: 1 });

    until(|| held.started().len() == 2).await;
    assert_eq!(
        gate.stats(),
        GateStats {
            active: 2,
            queued: 1,
            max_concurrent: 2
        }
    );
    // Nothing frees up, so p3 must not start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(held.started().len(), 2);

    held.finish_one();
    until(|| held.started().len() == 3).await;
    assert_eq!(held.started()[2], "p3");
    assert_eq!(gate.stats().queued, 0);

    held.finish_one();
    held.finish_one();
    tokio::time::timeout(Duration::from_secs(5), gate.wait_idle())
        .await
        .unwrap();
    assert_eq!(held.peak.load(Ordering::SeqCst), 2);
    assert!(gate.is_idle());
}

#[tokio::test]
async fn queued_requests_start_in_arrival_order() {
    let held = Held::new();
    let gate = AdmissionController::new(held.clone(), 1);

    let pids = ["p1", "p2", "p3", "p4", "p5"];
    for (i, pid) in pids.iter().enumerate() {
        let admission = gate.submit(request(pid));
        if i == 0 {
            assert_eq!(admission, Admission::Started);
        } else {
            assert_eq!(admission, Admission::Queued { position: i });
        }
    }

    for n in 1..=pids.len() {
        until(|| held.started().len() == n).await;
        held.finish_one();
    }
    tokio::time::timeout(Duration::from_secs(5), gate.wait_idle())
        .await
        .unwrap();

    assert_eq!(held.started(), pids);
    assert_eq!(held.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn active_never_exceeds_the_ceiling_under_bursts() {
    let held = Held::new();
    let gate = AdmissionController::new(held.clone(), 3);

    for i in 0..20 {
        gate.submit(request(&format!("p{i}")));
        assert!(gate.stats().active <= 3);
    }
    for _ in 0..20 {
        held.finish_one();
        assert!(gate.stats().active <= 3);
    }
    tokio::time::timeout(Duration::from_secs(5), gate.wait_idle())
        .await
        .unwrap();

    assert_eq!(held.started().len(), 20);
    assert!(held.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn drain_delay_defers_queued_starts() {
    let held = Held::new();
    let gate =
        AdmissionController::with_drain_delay(held.clone(), 1, Duration::from_millis(100));

    gate.submit(request("p1"));
    gate.submit(request("p2"));
    until(|| held.started().len() == 1).await;

    held.finish_one();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(held.started().len(), 1);

    until(|| held.started().len() == 2).await;
    held.finish_one();
    tokio::time::timeout(Duration::from_secs(5), gate.wait_idle())
        .await
        .unwrap();
}
