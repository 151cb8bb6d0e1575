// src/worker/thread_pool.rs

//! Built-in thread-based worker pool.
//!
//! A fixed set of worker threads pulls jobs off a shared queue. Suited
//! to pure-computation task bodies; workloads that need process
//! isolation plug in their own [`WorkerPool`] implementation.
//!
//! Interruption is cooperative: a job interrupted before a worker picks
//! it up is never executed and reports a crash result instead. A job
//! already executing runs to completion — threads cannot be killed — so
//! long-running bodies that want prompt cancellation should implement it
//! internally.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::debug;

use crate::errors::{DagrunError, Result};

use super::{JobHandle, JobResult, JobStatus, WorkerJob, WorkerPool};

struct QueuedJob {
    job: WorkerJob,
    result_tx: mpsc::Sender<JobResult>,
    interrupted: Arc<AtomicBool>,
}

pub struct ThreadWorkerPool {
    job_tx: Option<mpsc::Sender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadWorkerPool {
    /// Spawn a pool with `workers` worker threads.
    pub fn new(workers: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<QueuedJob>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..workers.max(1))
            .map(|i| {
                let job_rx = Arc::clone(&job_rx);
                std::thread::Builder::new()
                    .name(format!("dagrun-worker-{i}"))
                    .spawn(move || worker_loop(&job_rx))
                    .unwrap_or_else(|e| panic!("failed to spawn worker thread: {e}"))
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            workers,
        }
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn submit(&mut self, job: WorkerJob) -> Result<Box<dyn JobHandle>> {
        let job_tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("worker pool is shut down"))?;

        let (result_tx, result_rx) = mpsc::channel();
        let interrupted = Arc::new(AtomicBool::new(false));

        debug!(task = %job.task(), "submitting job to thread pool");
        job_tx
            .send(QueuedJob {
                job,
                result_tx,
                interrupted: Arc::clone(&interrupted),
            })
            .map_err(|_| anyhow::anyhow!("worker pool queue closed"))?;

        Ok(Box::new(ThreadJobHandle {
            result_rx,
            interrupted,
        }))
    }

    fn shutdown(&mut self) {
        // Dropping the sender closes the queue; workers drain and exit.
        self.job_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(job_rx: &Arc<Mutex<mpsc::Receiver<QueuedJob>>>) {
    loop {
        let queued = {
            let rx = job_rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv()
        };
        let Ok(queued) = queued else {
            break;
        };

        let result = if queued.interrupted.load(Ordering::SeqCst) {
            debug!(task = %queued.job.task(), "job interrupted before execution");
            Err(DagrunError::WorkerCrash(
                "job interrupted before execution".to_string(),
            ))
        } else {
            catch_unwind(AssertUnwindSafe(|| queued.job.execute()))
                .unwrap_or_else(|payload| Err(DagrunError::WorkerCrash(panic_message(&payload))))
        };

        // The receiving handle may already be gone; nothing to do then.
        let _ = queued.result_tx.send(result);
    }
}

struct ThreadJobHandle {
    result_rx: mpsc::Receiver<JobResult>,
    interrupted: Arc<AtomicBool>,
}

impl JobHandle for ThreadJobHandle {
    fn poll(&mut self) -> JobStatus {
        match self.result_rx.try_recv() {
            Ok(result) => JobStatus::Done(result),
            Err(TryRecvError::Empty) => JobStatus::Pending,
            Err(TryRecvError::Disconnected) => JobStatus::Done(Err(DagrunError::WorkerCrash(
                "worker thread exited without reporting a result".to_string(),
            ))),
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
