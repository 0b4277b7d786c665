// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker dispatch: schedules deferred `progress` calls for writers.
//!
//! The contract is deliberately small: `enqueue` hands a progress unit to
//! a pool thread, FIFO across enqueues, and may drop when saturated (the
//! heartbeat/acknack round recovers from a dropped unit). The shipped
//! implementation is a fixed-capacity queue drained by a few dedicated
//! threads that nap when idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;

use crate::config::{WORKER_IDLE_SLEEP_MS, WORKER_QUEUE_LENGTH, WORKER_STACKSIZE, WORKER_THREADS};
use crate::error::{Error, Result};

/// A unit of send progress a pool thread can drive.
pub trait ProgressUnit: Send + Sync {
    /// Perform one round of send progress.
    fn progress(self: Arc<Self>);
}

/// Scheduler for deferred progress work.
pub trait WorkerDispatch: Send + Sync {
    /// Schedule `unit.progress()` on a pool thread.
    ///
    /// Returns false when the queue is saturated and the unit was dropped.
    fn enqueue(&self, unit: Arc<dyn ProgressUnit>) -> bool;
}

/// Fixed-capacity thread-pool dispatch.
pub struct ThreadPoolDispatch {
    queue: Arc<ArrayQueue<Arc<dyn ProgressUnit>>>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolDispatch {
    /// Pool with the crate-wide thread count and queue length.
    pub fn new() -> Result<Self> {
        Self::with_threads(WORKER_THREADS)
    }

    /// Pool with an explicit worker thread count.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let queue: Arc<ArrayQueue<Arc<dyn ProgressUnit>>> =
            Arc::new(ArrayQueue::new(WORKER_QUEUE_LENGTH));
        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Vec::with_capacity(threads);

        for idx in 0..threads {
            let queue = Arc::clone(&queue);
            let worker_running = Arc::clone(&running);
            let spawned = thread::Builder::new()
                .name(format!("rtps-worker-{}", idx))
                .stack_size(WORKER_STACKSIZE)
                .spawn(move || worker_loop(&queue, &worker_running));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Unwind the threads already started; no partial pool
                    // survives a failed construction.
                    running.store(false, Ordering::Release);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::ThreadSpawn(e));
                }
            }
        }

        Ok(Self {
            queue,
            running,
            workers,
        })
    }

    /// Units currently waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

fn worker_loop(queue: &ArrayQueue<Arc<dyn ProgressUnit>>, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        match queue.pop() {
            Some(unit) => unit.progress(),
            None => thread::sleep(Duration::from_millis(WORKER_IDLE_SLEEP_MS)),
        }
    }
}

impl WorkerDispatch for ThreadPoolDispatch {
    fn enqueue(&self, unit: Arc<dyn ProgressUnit>) -> bool {
        if self.queue.push(unit).is_err() {
            log::warn!("[ThreadPoolDispatch::enqueue] queue saturated, unit dropped");
            return false;
        }
        true
    }
}

impl Drop for ThreadPoolDispatch {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
