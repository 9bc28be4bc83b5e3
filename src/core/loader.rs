//! Load coordinator: cache-aware synchronous and background frame loads
//!
//! **Why**: Decoding a volume can take seconds. The coordinator decides
//! whether a request is served from the cache, decoded inline (sync), or
//! handed to the single load worker (async) and polled on later ticks.
//!
//! **Used by**: VolumeSequence (every frame request funnels through here)
//!
//! # Request Flow
//!
//! 1. Validate index (`InvalidIndex` otherwise)
//! 2. Cache hit → `CacheHit`, no loading flag, no source access
//! 3. Same index already in flight → `AlreadyLoading` (requests coalesce)
//! 4. Miss → sync: decode now; async: bump epoch, queue on worker, `Pending`
//!
//! # Async Completion
//!
//! `poll()` is called once per tick. It drains the completion channel
//! without blocking and checks the wall time since the job was queued
//! against the timeout, read from the injected [`Clock`]. On timeout the
//! epoch is bumped and the receiver dropped, so a late result is discarded.

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use log::{debug, info, trace};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::clock::{Clock, SystemClock};
use crate::core::frame_cache::FrameCache;
use crate::core::workers::Workers;
use crate::entities::{FrameError, FrameSource, VolumeFrame};

/// Default bound on a background load
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame request failures. None of these are fatal to playback.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("frame index {index} out of range (0..{total})")]
    InvalidIndex { index: usize, total: usize },

    #[error("failed to decode frame {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: FrameError,
    },

    #[error("loading frame {index} timed out after {timeout:?}")]
    Timeout { index: usize, timeout: Duration },

    #[error("no frame sink attached, frame {index} cached but not displayed")]
    SinkNotReady { index: usize },
}

impl LoadError {
    /// Frame index the error refers to
    pub fn index(&self) -> usize {
        match self {
            LoadError::InvalidIndex { index, .. }
            | LoadError::Decode { index, .. }
            | LoadError::Timeout { index, .. }
            | LoadError::SinkNotReady { index } => *index,
        }
    }
}

/// Where the decode runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Decode on the calling tick (blocks it)
    #[default]
    Sync,
    /// Decode on the load worker, poll for completion
    Async,
}

/// One frame request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub index: usize,
    pub mode: LoadMode,
    pub switch_on_completion: bool,
}

impl LoadRequest {
    pub fn new(index: usize, mode: LoadMode, switch_on_completion: bool) -> Self {
        Self {
            index,
            mode,
            switch_on_completion,
        }
    }
}

/// Immediate result of `request`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Slot already populated, source not touched
    CacheHit,
    /// Decoded inline and inserted
    Loaded,
    /// Queued on the worker; completion arrives via `poll`
    Pending,
    /// Same index already in flight
    AlreadyLoading,
}

/// Finished background load reported by `poll`
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub request: LoadRequest,
    /// On success the frame is already in the cache
    pub result: Result<(), LoadError>,
}

/// In-flight background load
struct PendingLoad {
    request: LoadRequest,
    epoch: u64,
    started: Instant,
    receiver: Receiver<Result<VolumeFrame, FrameError>>,
}

/// Orchestrates frame loads for one sequence
pub struct LoadCoordinator {
    source: Arc<dyn FrameSource>,
    total_frames: usize,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    /// Bumped whenever a pending load is abandoned
    epoch: Arc<AtomicU64>,
    /// Spawned on first async request
    workers: Option<Workers>,
    pending: Option<PendingLoad>,
}

impl LoadCoordinator {
    pub fn new(source: Arc<dyn FrameSource>, total_frames: usize, timeout: Duration) -> Self {
        Self::with_clock(source, total_frames, timeout, Arc::new(SystemClock))
    }

    /// Same as `new`, timing background loads against `clock`
    pub fn with_clock(
        source: Arc<dyn FrameSource>,
        total_frames: usize,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            total_frames,
            timeout,
            clock,
            epoch: Arc::new(AtomicU64::new(0)),
            workers: None,
            pending: None,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// True while a background load is outstanding
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Index of the outstanding background load
    pub fn loading_index(&self) -> Option<usize> {
        self.pending.as_ref().map(|p| p.request.index)
    }

    /// Request outstanding and marked for display on completion
    pub fn pending_request(&self) -> Option<LoadRequest> {
        self.pending.as_ref().map(|p| p.request)
    }

    /// Issue a frame request.
    ///
    /// Sync decode failures come back as `Err`; async failures are reported
    /// later by `poll`.
    pub fn request(&mut self, cache: &mut FrameCache, request: LoadRequest) -> Result<LoadOutcome, LoadError> {
        let index = request.index;
        if index >= self.total_frames {
            return Err(LoadError::InvalidIndex {
                index,
                total: self.total_frames,
            });
        }

        // Hit must not touch the loading flag
        if cache.lookup(index) {
            trace!("Frame {} cache hit", index);
            // A user jump to a cached frame wins over an older display request
            if request.switch_on_completion {
                if let Some(pending) = self.pending.as_mut() {
                    pending.request.switch_on_completion = false;
                }
            }
            return Ok(LoadOutcome::CacheHit);
        }

        if let Some(pending) = self.pending.as_mut() {
            if pending.request.index == index {
                pending.request.switch_on_completion |= request.switch_on_completion;
                debug!("Frame {} already loading, request coalesced", index);
                return Ok(LoadOutcome::AlreadyLoading);
            }
        }
        self.abandon_pending("superseded");

        match request.mode {
            LoadMode::Sync => self.load_sync(cache, index),
            LoadMode::Async => self.load_async(request),
        }
    }

    fn load_sync(&mut self, cache: &mut FrameCache, index: usize) -> Result<LoadOutcome, LoadError> {
        debug!("Sync import of frame {}", index);
        let frame = self
            .source
            .import(index)
            .map_err(|source| LoadError::Decode { index, source })?;
        cache.insert(index, frame);
        Ok(LoadOutcome::Loaded)
    }

    fn load_async(&mut self, request: LoadRequest) -> Result<LoadOutcome, LoadError> {
        let index = request.index;
        if self.workers.is_none() {
            let workers = Workers::new(1, Arc::clone(&self.epoch)).map_err(|e| LoadError::Decode {
                index,
                source: FrameError::WorkerLost(e.to_string()),
            })?;
            self.workers = Some(workers);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let (tx, rx) = bounded(1);
        let source = Arc::clone(&self.source);
        let queued = self.workers.as_ref().is_some_and(|workers| {
            workers.execute_with_epoch(epoch, move || {
                // Receiver gone means the request was abandoned; nothing to do
                let _ = tx.send(source.import(index));
            })
        });
        if !queued {
            return Err(LoadError::Decode {
                index,
                source: FrameError::WorkerLost("worker pool shut down".to_string()),
            });
        }

        debug!("Async import of frame {} queued (epoch {})", index, epoch);
        self.pending = Some(PendingLoad {
            request,
            epoch,
            started: self.clock.now(),
            receiver: rx,
        });
        Ok(LoadOutcome::Pending)
    }

    /// Poll the outstanding background load once. Never blocks.
    ///
    /// The timeout runs on wall time from the clock, whatever the host's tick
    /// rate. A result that is ready wins over a timeout on the same tick.
    pub fn poll(&mut self, cache: &mut FrameCache) -> Option<Completion> {
        let pending = self.pending.as_ref()?;
        let request = pending.request;

        let result = match pending.receiver.try_recv() {
            Ok(Ok(frame)) => {
                cache.insert(request.index, frame);
                Ok(())
            }
            Ok(Err(source)) => Err(LoadError::Decode {
                index: request.index,
                source,
            }),
            Err(TryRecvError::Disconnected) => Err(LoadError::Decode {
                index: request.index,
                source: FrameError::WorkerLost("load job ended without a result".to_string()),
            }),
            Err(TryRecvError::Empty) => {
                let waited = self.clock.now().saturating_duration_since(pending.started);
                if waited < self.timeout {
                    return None;
                }
                debug!("Import of frame {} timed out after {:?}", request.index, self.timeout);
                self.abandon_pending("timed out");
                return Some(Completion {
                    request,
                    result: Err(LoadError::Timeout {
                        index: request.index,
                        timeout: self.timeout,
                    }),
                });
            }
        };

        self.pending = None;
        Some(Completion { request, result })
    }

    /// Drop the outstanding load if it is a background fill (no display intent)
    pub fn cancel_background(&mut self) {
        if self.pending.as_ref().is_some_and(|p| !p.request.switch_on_completion) {
            self.abandon_pending("cancelled");
        }
    }

    /// Forget the pending load; its worker result (if any) is discarded
    fn abandon_pending(&mut self, reason: &str) {
        if let Some(pending) = self.pending.take() {
            // Skip the job if not started yet; late results hit a dropped receiver
            let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            info!(
                "Frame {} load {} (epoch {} -> {})",
                pending.request.index, reason, pending.epoch, next
            );
        }
    }
}
