// SPDX-License-Identifier: GPL-3.0-only

//! Serial work queue owning all capture pipeline mutation
//!
//! Jobs run one at a time, in submission order, on a dedicated thread so that
//! blocking pipeline calls never land on the caller's thread. The queue can be
//! suspended (while waiting for the camera permission prompt) and resumed;
//! suspension takes effect before the next job starts.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    jobs: VecDeque<Job>,
    suspend_count: usize,
    busy: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when a job is added, the queue resumes or shuts down
    work_ready: Condvar,
    /// Signalled when the worker finishes a job and nothing is pending
    idle: Condvar,
}

/// Dedicated serial queue
pub struct SessionQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    name: String,
}

impl SessionQueue {
    /// Spawn the worker thread
    pub fn new(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                suspend_count: 0,
                busy: false,
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_name, &worker_shared))?;

        info!(name = %name, "Session queue started");

        Ok(Self {
            shared,
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
            name: name.to_string(),
        })
    }

    /// Enqueue a job
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        if state.shutdown {
            debug!(name = %self.name, "Queue shut down, dropping job");
            return;
        }
        state.jobs.push_back(Box::new(job));
        self.shared.work_ready.notify_one();
    }

    /// Hold back further jobs until a matching [`resume`](Self::resume)
    pub fn suspend(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.suspend_count += 1;
        debug!(name = %self.name, count = state.suspend_count, "Queue suspended");
    }

    pub fn resume(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.suspend_count == 0 {
            warn!(name = %self.name, "Resuming a queue that is not suspended");
            return;
        }
        state.suspend_count -= 1;
        debug!(name = %self.name, count = state.suspend_count, "Queue resumed");
        if state.suspend_count == 0 {
            self.shared.work_ready.notify_one();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.state.lock().unwrap().suspend_count > 0
    }

    /// Whether the calling thread is the queue's worker
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Block until no job is running and none is pending
    ///
    /// Jobs enqueued by running jobs are waited for too. While the queue is
    /// suspended with pending work this blocks until it is resumed. Returns
    /// immediately when called from the worker itself.
    pub fn wait_until_idle(&self) {
        if self.is_current() {
            return;
        }
        let mut state = self.shared.state.lock().unwrap();
        while !state.shutdown && (state.busy || !state.jobs.is_empty()) {
            state = self.shared.idle.wait(state).unwrap();
        }
    }

    /// Stop accepting jobs, let pending ones finish and join the worker
    ///
    /// Pending jobs of a suspended queue are dropped.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            self.shared.work_ready.notify_all();
        }

        if self.is_current() {
            return;
        }
        if let Some(handle) = self.worker.lock().unwrap().take()
            && handle.join().is_err()
        {
            error!(name = %self.name, "Session queue worker panicked");
        }
    }
}

impl Drop for SessionQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("SessionQueue")
            .field("name", &self.name)
            .field("pending", &state.jobs.len())
            .field("suspended", &(state.suspend_count > 0))
            .finish()
    }
}

fn run_worker(name: &str, shared: &Shared) {
    debug!(name = %name, "Session queue worker started");

    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.suspend_count == 0
                    && let Some(job) = state.jobs.pop_front()
                {
                    state.busy = true;
                    break job;
                }
                if state.shutdown {
                    if !state.jobs.is_empty() {
                        warn!(
                            name = %name,
                            dropped = state.jobs.len(),
                            "Dropping jobs of suspended queue"
                        );
                        state.jobs.clear();
                    }
                    shared.idle.notify_all();
                    info!(name = %name, "Session queue worker exiting");
                    return;
                }
                state = shared.work_ready.wait(state).unwrap();
            }
        };

        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(name = %name, "Session queue job panicked");
        }

        let mut state = shared.state.lock().unwrap();
        state.busy = false;
        if state.jobs.is_empty() || state.suspend_count > 0 {
            shared.idle.notify_all();
        }
    }
}
