use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::utils::{CertificateError, Result};

enum JobEvent<T> {
    Started(usize),
    Finished(usize, Result<T>),
}

/// Bounded pool for blocking recognizer calls.
///
/// Every call gets `timeout` from the moment it starts running. A call that
/// overruns yields `RecognitionTimeout` for its slot and keeps its thread until
/// it returns. Jobs still queued when no call has started or finished for a
/// whole `timeout` are timed out as well and skipped once a thread frees up.
pub struct WorkerPool {
    pool: ThreadPool,
    timeout: Duration,
    busy: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(workers: Option<usize>, timeout: Duration) -> Result<Self> {
        let threads = workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            });
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("recognizer-{}", i))
            .build()
            .map_err(|e| CertificateError::Config(format!("Failed to build worker pool: {}", e)))?;
        debug!("Recognition pool with {} threads, {:?} per call", threads, timeout);
        Ok(WorkerPool {
            pool,
            timeout,
            busy: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Calls currently executing, including ones whose batch already gave up on them.
    pub fn busy_calls(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Run every job on the pool. Results keep submission order.
    pub fn run_all<T, F>(&self, jobs: Vec<F>) -> Vec<Result<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let count = jobs.len();
        let (tx, rx) = mpsc::channel();
        let abandoned = Arc::new(AtomicBool::new(false));
        for (index, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            let abandoned = Arc::clone(&abandoned);
            let busy = Arc::clone(&self.busy);
            self.pool.spawn(move || {
                if abandoned.load(Ordering::SeqCst) || tx.send(JobEvent::Started(index)).is_err() {
                    return;
                }
                busy.fetch_add(1, Ordering::SeqCst);
                let result = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                    Err(CertificateError::Recognition("recognizer panicked".to_string()))
                });
                busy.fetch_sub(1, Ordering::SeqCst);
                // The receiver is gone once the batch stopped waiting.
                let _ = tx.send(JobEvent::Finished(index, result));
            });
        }
        drop(tx);

        let timeout_ms = self.timeout.as_millis() as u64;
        let mut slots: Vec<Option<Result<T>>> = (0..count).map(|_| None).collect();
        let mut started: Vec<Option<Instant>> = vec![None; count];
        let mut pending = count;
        let mut timed_out = 0;
        let mut last_progress = Instant::now();

        while pending > 0 {
            let now = Instant::now();
            for index in 0..count {
                let overrun = started[index].map_or(false, |at| now >= at + self.timeout);
                if slots[index].is_none() && overrun {
                    slots[index] = Some(Err(CertificateError::RecognitionTimeout(timeout_ms)));
                    pending -= 1;
                    timed_out += 1;
                }
            }

            let queued = (0..count).any(|i| slots[i].is_none() && started[i].is_none());
            let queue_deadline = last_progress + self.timeout;
            if queued && now >= queue_deadline {
                abandoned.store(true, Ordering::SeqCst);
                for index in 0..count {
                    if slots[index].is_none() && started[index].is_none() {
                        slots[index] = Some(Err(CertificateError::RecognitionTimeout(timeout_ms)));
                        pending -= 1;
                        timed_out += 1;
                    }
                }
            }
            if pending == 0 {
                break;
            }

            let running_deadline = (0..count)
                .filter(|&i| slots[i].is_none())
                .filter_map(|i| started[i].map(|at| at + self.timeout))
                .min();
            let deadline = match running_deadline {
                Some(at) if queued => at.min(queue_deadline),
                Some(at) => at,
                None => queue_deadline,
            };

            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(JobEvent::Started(index)) => {
                    let at = Instant::now();
                    started[index] = Some(at);
                    last_progress = at;
                }
                Ok(JobEvent::Finished(index, result)) => {
                    last_progress = Instant::now();
                    if slots[index].is_none() {
                        slots[index] = Some(result);
                        pending -= 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        abandoned.store(true, Ordering::SeqCst);

        if timed_out > 0 {
            warn!(
                "{} of {} recognizer jobs timed out after {} ms, {} call(s) still running",
                timed_out,
                count,
                timeout_ms,
                self.busy_calls()
            );
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(CertificateError::RecognitionTimeout(timeout_ms))))
            .collect()
    }
}
