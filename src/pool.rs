//! Fixed-size pool of background workers draining the work queue.
//!
//! Workers hold no file state. Each one loops: take an item, run it, and hand
//! the completion back if the item carries a responder. Only workers touch the
//! backing store, so backing-store concurrency never exceeds the pool size.

use crate::error::{Error, Result};
use crate::work::{WorkItem, WorkQueue};
use crossbeam::channel::Receiver;
use std::thread::{self, JoinHandle};

/// A set of identical workers sharing one [`WorkQueue`].
#[derive(Debug)]
pub struct WorkerPool {
    queue: WorkQueue,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `worker_count` workers on a fresh queue.
    ///
    /// # Errors
    ///
    /// Returns an error if `worker_count` is zero or a thread cannot be spawned.
    pub fn start(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::invalid_argument("worker pool needs at least one worker"));
        }

        let (queue, receiver) = WorkQueue::open();
        let mut pool = Self { queue, handles: Vec::with_capacity(worker_count) };

        for id in 0..worker_count {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("smoothfs-worker-{}", id))
                .spawn(move || worker_loop(id, receiver));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    // Dropping the pool closes the queue and joins what was started
                    drop(pool);
                    return Err(Error::Io(e));
                }
            }
        }

        log::info!("Started worker pool with {} workers", worker_count);
        Ok(pool)
    }

    /// Handle for submitting work
    pub fn queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    /// Number of running workers
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Close the queue and wait for every worker to finish its in-flight item.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.queue.close();

        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(Error::internal(format!("{} worker(s) panicked", panicked)));
        }

        log::info!("Worker pool shut down");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            self.queue.close();
            return;
        }
        if let Err(e) = self.stop() {
            log::warn!("Error shutting down worker pool during drop: {}", e);
        }
    }
}

fn worker_loop(id: usize, receiver: Receiver<WorkItem>) {
    log::debug!("Worker {} started", id);

    // recv fails once the queue is closed and drained
    while let Ok(item) = receiver.recv() {
        log::trace!("Worker {} processing {:?}", id, item);
        let completion = item.process();

        if let (Some(responder), Some(completion)) = (item.responder(), completion) {
            match responder.deliver(completion) {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    log::debug!("Worker {}: caller stopped waiting for {}", id, item.kind());
                }
                Err(e) => log::warn!(
                    "Worker {}: dropping completion after {:?}: {}",
                    id,
                    responder.window(),
                    e
                ),
            }
        }
    }

    log::debug!("Worker {} exiting", id);
}
