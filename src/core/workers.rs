//! Background load worker for asynchronous frame imports
//!
//! A small pool of named threads fed through a crossbeam channel. A
//! sequence uses exactly one thread so at most one decode runs at a time.
//!
//! Epoch mechanism skips stale requests: every job carries the epoch it was
//! issued in, and is dropped at execution time if the shared epoch moved on
//! (request superseded or timed out).

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{error, trace};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Epoch-gated worker pool.
///
/// # Example
/// ```ignore
/// let epoch = Arc::new(AtomicU64::new(0));
/// let workers = Workers::new(1, Arc::clone(&epoch))?;
///
/// workers.execute_with_epoch(epoch.load(Ordering::Relaxed), move || {
///     let _ = tx.send(source.import(index));
/// });
/// ```
pub struct Workers {
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    current_epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers sharing `epoch` with the coordinator.
    pub fn new(num_threads: usize, epoch: Arc<AtomicU64>) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads.max(1) {
            let receiver: Receiver<Job> = receiver.clone();
            let shutdown = Arc::clone(&shutdown);

            let handle = thread::Builder::new()
                .name(format!("volplay-loader-{}", worker_id))
                .spawn(move || {
                    trace!("Loader {} started", worker_id);

                    // Ends when the sender is dropped and the queue is drained
                    for job in receiver.iter() {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        // A panicking decode drops its result sender; the
                        // coordinator sees a disconnected channel.
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("Loader {}: job panicked", worker_id);
                        }
                    }

                    trace!("Loader {} stopped", worker_id);
                })?;

            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", handles.len());

        Ok(Self {
            sender: Some(sender),
            handles,
            current_epoch: epoch,
            shutdown,
        })
    }

    /// Get current epoch
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Queue a job that only runs if `epoch` is still current when a
    /// worker picks it up.
    ///
    /// Returns false if the pool is shut down.
    pub fn execute_with_epoch<F>(&self, epoch: u64, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let current_epoch = Arc::clone(&self.current_epoch);

        let wrapped = move || {
            if current_epoch.load(Ordering::Relaxed) == epoch {
                f();
            } else {
                trace!("Skipping stale job (epoch {})", epoch);
            }
        };

        match &self.sender {
            Some(sender) => sender.send(Box::new(wrapped)).is_ok(),
            None => false,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);
        // Disconnect the queue so idle workers leave their loop
        self.sender.take();

        // A worker may be stuck in a long decode; don't hang the caller on it
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_job_runs_with_current_epoch() {
        let epoch = Arc::new(AtomicU64::new(3));
        let workers = Workers::new(1, Arc::clone(&epoch)).unwrap();
        let (tx, rx) = bounded(1);

        assert!(workers.execute_with_epoch(3, move || {
            tx.send(42).unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
    }

    #[test]
    fn test_stale_job_is_skipped() {
        let epoch = Arc::new(AtomicU64::new(1));
        let workers = Workers::new(1, Arc::clone(&epoch)).unwrap();

        // Block the single worker so the second job waits in the queue
        let (gate_tx, gate_rx) = bounded::<()>(0);
        workers.execute_with_epoch(1, move || {
            let _ = gate_rx.recv();
        });

        let (tx, rx) = bounded::<i32>(1);
        workers.execute_with_epoch(1, move || {
            tx.send(1).unwrap();
        });

        epoch.store(2, Ordering::SeqCst);
        let _ = gate_tx.send(());

        // Job skipped: its sender is dropped without sending
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let epoch = Arc::new(AtomicU64::new(0));
        let workers = Workers::new(1, Arc::clone(&epoch)).unwrap();

        workers.execute_with_epoch(0, || panic!("decode blew up"));

        let (tx, rx) = bounded(1);
        workers.execute_with_epoch(0, move || {
            tx.send("alive").unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("alive"));
    }
}
