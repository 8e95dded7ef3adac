// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Serialized execution lanes.
//!
//! A lane is a single tokio task draining a FIFO of jobs. Jobs on the same
//! lane run one at a time, in submission order.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Job = BoxFuture<'static, ()>;

/// A single-concurrency execution context.
#[derive(Clone)]
pub struct SerialLane {
    name: &'static str,
    tx: mpsc::UnboundedSender<Job>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl SerialLane {
    /// Spawn the lane worker. Must be called inside a tokio runtime.
    pub fn spawn(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!("Job panicked on {} lane", name);
                }
            }
            debug!("{} lane drained", name);
        });

        Self {
            name,
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a job. Returns `false` once the lane has been shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // An aborted worker keeps its receiver until the runtime drops it.
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(job.boxed()).is_ok()
    }

    /// Stop the worker, dropping the running job and everything queued.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(worker) = self.worker.lock().take() {
            debug!("Shutting down {} lane", self.name);
            worker.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|w| !w.is_finished())
            .unwrap_or(false)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The lane every consumer callback is delivered on.
///
/// Callbacks posted here never run concurrently with each other.
#[derive(Clone)]
pub struct CallbackLane {
    lane: SerialLane,
}

impl CallbackLane {
    pub fn spawn() -> Self {
        Self {
            lane: SerialLane::spawn("callback"),
        }
    }

    /// Post a callback. Returns `false` if the lane is gone.
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.lane.submit(async move { callback() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let lane = SerialLane::spawn("test");
        let (tx, mut rx) = mpsc::unbounded_channel();

        // The first job is the slowest; it must still finish first.
        for (i, delay) in [30u64, 10, 0].into_iter().enumerate() {
            let tx = tx.clone();
            assert!(lane.submit(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let _ = tx.send(i);
            }));
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_jobs_never_overlap() {
        let lane = SerialLane::spawn("test");
        let active = Arc::new(Mutex::new(0u32));
        let peak = Arc::new(Mutex::new(0u32));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for _ in 0..5 {
            let active = active.clone();
            let peak = peak.clone();
            let done_tx = done_tx.clone();
            lane.submit(async move {
                {
                    let mut a = active.lock();
                    *a += 1;
                    let mut p = peak.lock();
                    *p = (*p).max(*a);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                *active.lock() -= 1;
                let _ = done_tx.send(());
            });
        }

        for _ in 0..5 {
            done_rx.recv().await.unwrap();
        }
        assert_eq!(*peak.lock(), 1);
    }

    #[tokio::test]
    async fn test_submit_fails_after_shutdown() {
        let lane = SerialLane::spawn("test");
        assert!(lane.is_running());
        lane.shutdown();
        assert!(!lane.is_running());

        assert!(!lane.submit(async {}), "{} lane accepted a job after shutdown", lane.name());

        // Clones share the closed flag.
        let clone = lane.clone();
        assert!(!clone.submit(async {}));
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_kill_lane() {
        let lane = CallbackLane::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();

        lane.post(|| panic!("consumer bug"));
        lane.post(move || {
            let _ = tx.send("still alive");
        });

        assert_eq!(rx.recv().await, Some("still alive"));
    }
}
