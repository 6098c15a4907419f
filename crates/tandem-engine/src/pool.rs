//! Fixed-size thread pool used to step independent worlds in parallel.
//!
//! Workers pull boxed jobs from one crossbeam channel. A panicking job is
//! caught on the worker, counted, and reported to whoever waits on its
//! result; the worker keeps serving the queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};

use crate::error::PoolError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Jobs queued or executing, with a condvar signalled when it reaches zero.
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// A pool of named worker threads.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    outstanding: Arc<Outstanding>,
    panics: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one) named `tandem-worker-N`.
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let outstanding = Arc::new(Outstanding {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });
        let panics = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let receiver = receiver.clone();
            let outstanding = Arc::clone(&outstanding);
            let panics = Arc::clone(&panics);
            let handle = thread::Builder::new()
                .name(format!("tandem-worker-{i}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            panics.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                worker = i,
                                message = %panic_message(payload.as_ref()),
                                "worker job panicked"
                            );
                        }
                        outstanding.done();
                    }
                })
                .map_err(|e| PoolError::Spawn {
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }
        tracing::debug!(threads = workers.len(), "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
            outstanding,
            panics,
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Jobs that panicked since the pool was created.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Queue `job` for execution on any worker.
    pub fn add_work<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolError::Closed)?;
        self.outstanding.add();
        sender.send(Box::new(job)).map_err(|_| {
            self.outstanding.done();
            PoolError::Closed
        })
    }

    /// Block until every queued job has finished, or `timeout` elapses.
    ///
    /// `None` waits indefinitely. Returns `true` if the queue drained.
    pub fn wait_for_results(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut count = self.outstanding.count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if self.outstanding.idle.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => self.outstanding.idle.wait(&mut count),
            }
        }
        true
    }

    /// Apply `f` to every item in parallel, returning results in input order.
    ///
    /// Every item is processed even if some panic; the first panic (by
    /// input position) is returned as [`PoolError::JobPanicked`].
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let count = items.len();
        let (tx, rx) = crossbeam_channel::bounded::<(usize, Result<R, String>)>(count);
        for (index, item) in items.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let tx = tx.clone();
            self.add_work(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| f(item)))
                    .map_err(|payload| panic_message(payload.as_ref()));
                let _ = tx.send((index, result));
            })?;
        }
        drop(tx);

        let mut slots: Vec<Option<Result<R, String>>> = (0..count).map(|_| None).collect();
        for (index, result) in rx.iter() {
            slots[index] = Some(result);
        }
        let mut out = Vec::with_capacity(count);
        for slot in slots {
            match slot {
                Some(Ok(value)) => out.push(value),
                Some(Err(message)) => return Err(PoolError::JobPanicked { message }),
                None => return Err(PoolError::Closed),
            }
        }
        Ok(out)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .field("outstanding", &*self.outstanding.count.lock())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
