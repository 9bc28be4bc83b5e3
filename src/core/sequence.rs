//! Volume sequence controller: cache + load coordinator + playback clock
//!
//! **Why**: One owner for everything that decides which frame is visible.
//! All mutation goes through methods on [`VolumeSequence`]; the host calls
//! `update(dt)` once per tick and the controls below in between.
//!
//! **Used by**: the `volplay` binary, hosts embedding the engine
//!
//! # Frame Switch
//!
//! `switch_to` is the only place `current_frame` changes. It requires a
//! populated cache slot, pins the slot against eviction, notifies every
//! sink, then emits `FrameChangedEvent`.
//!
//! # Tick Order
//!
//! 1. Poll the outstanding background load (may switch frames)
//! 2. Advance the playback clock (gated on "not loading")
//! 3. Issue the next preload request if idle

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::core::clock::{Clock, SystemClock};
use crate::core::event_bus::SequenceEventEmitter;
use crate::core::events::{
    CacheClearedEvent, FrameChangedEvent, FrameLoadFailedEvent, LoadingChangedEvent, PlayStateChangedEvent,
};
use crate::core::frame_cache::{CachePolicy, CacheStats, FrameCache};
use crate::core::loader::{
    Completion, DEFAULT_LOAD_TIMEOUT, LoadCoordinator, LoadError, LoadMode, LoadOutcome, LoadRequest,
};
use crate::core::player::{PlaybackState, Player, Tick};
use crate::entities::{FrameSink, FrameSource, VolumeFrame};

/// Construction parameters for a sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceOptions {
    pub total_frames: usize,
    pub seconds_per_frame: f32,
    pub loop_enabled: bool,
    pub load_mode: LoadMode,
    pub load_timeout: Duration,
    pub cache_policy: CachePolicy,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            total_frames: 0,
            seconds_per_frame: 1.0,
            loop_enabled: true,
            load_mode: LoadMode::Sync,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            cache_policy: CachePolicy::KeepAll,
        }
    }
}

impl SequenceOptions {
    pub fn with_frames(total_frames: usize) -> Self {
        Self {
            total_frames,
            ..Self::default()
        }
    }
}

/// Time-varying volume: owns the frame cache and drives the visible frame
pub struct VolumeSequence {
    cache: FrameCache,
    loader: LoadCoordinator,
    player: Player,
    load_mode: LoadMode,
    current_frame: usize,
    /// Set by the first successful switch; cleared with the cache
    has_displayed: bool,
    sinks: Vec<Box<dyn FrameSink>>,
    events: SequenceEventEmitter,
    last_error: Option<LoadError>,
    /// Frame requested by the clock, awaiting display
    advance_target: Option<usize>,
    /// Next slot the preloader looks at
    preload_cursor: Option<usize>,
    /// Last state announced via PlayStateChangedEvent
    reported_state: PlaybackState,
}

impl VolumeSequence {
    pub fn new(source: Arc<dyn FrameSource>, options: SequenceOptions) -> Self {
        Self::with_clock(source, options, Arc::new(SystemClock))
    }

    /// Same as `new`, with background load timeouts read from `clock`
    pub fn with_clock(source: Arc<dyn FrameSource>, options: SequenceOptions, clock: Arc<dyn Clock>) -> Self {
        info!(
            "VolumeSequence: {} frames, {:.1} s/frame, loop={}, mode={:?}, policy={:?}",
            options.total_frames,
            options.seconds_per_frame,
            options.loop_enabled,
            options.load_mode,
            options.cache_policy
        );
        Self {
            cache: FrameCache::new(options.total_frames, options.cache_policy),
            loader: LoadCoordinator::with_clock(source, options.total_frames, options.load_timeout, clock),
            player: Player::new(options.seconds_per_frame, options.loop_enabled),
            load_mode: options.load_mode,
            current_frame: 0,
            has_displayed: false,
            sinks: Vec::new(),
            events: SequenceEventEmitter::dummy(),
            last_error: None,
            advance_target: None,
            preload_cursor: None,
            reported_state: PlaybackState::Stopped,
        }
    }

    // ========== Wiring ==========

    pub fn add_sink<S: FrameSink + 'static>(&mut self, sink: S) {
        self.sinks.push(Box::new(sink));
    }

    pub fn set_event_emitter(&mut self, events: SequenceEventEmitter) {
        self.events = events;
    }

    /// Load frame 0 for display and optionally start playing
    pub fn initialize(&mut self, autoplay: bool) {
        info!("Initializing sequence ({} frames)", self.total_frames());
        // Failure is recorded in last_error; playback can still start
        let _ = self.request_frame(0, true);
        if autoplay {
            self.play();
        }
    }

    // ========== Frame Requests ==========

    /// Request a frame with the configured load mode
    pub fn request_frame(&mut self, index: usize, switch_on_completion: bool) -> Result<LoadOutcome, LoadError> {
        self.request_frame_with(index, self.load_mode, switch_on_completion)
    }

    /// Request a frame with an explicit load mode.
    ///
    /// On a cache hit with `switch_on_completion` the frame is displayed
    /// immediately. A sync miss displays on success; an async miss displays
    /// on a later `update`.
    pub fn request_frame_with(
        &mut self,
        index: usize,
        mode: LoadMode,
        switch_on_completion: bool,
    ) -> Result<LoadOutcome, LoadError> {
        let request = LoadRequest::new(index, mode, switch_on_completion);
        let outcome = match self.loader.request(&mut self.cache, request) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_failure(e.clone());
                return Err(e);
            }
        };

        match outcome {
            LoadOutcome::CacheHit | LoadOutcome::Loaded => {
                if switch_on_completion {
                    self.switch_to(index);
                }
            }
            LoadOutcome::Pending => {
                self.events.emit(LoadingChangedEvent {
                    loading: true,
                    index: Some(index),
                });
            }
            LoadOutcome::AlreadyLoading => {}
        }
        Ok(outcome)
    }

    /// Make a cached frame the visible one. Returns false if the slot is empty.
    pub fn switch_to(&mut self, index: usize) -> bool {
        let Some(frame) = self.cache.get(index) else {
            warn!("switch_to({}) on empty slot ignored", index);
            return false;
        };

        self.current_frame = index;
        self.has_displayed = true;
        self.last_error = None;
        // Any switch supersedes a clock advance still in flight
        self.advance_target = None;

        if self.sinks.is_empty() {
            let e = LoadError::SinkNotReady { index };
            warn!("{}", e);
            self.last_error = Some(e);
        }
        for sink in &mut self.sinks {
            sink.on_frame_changed(index, frame);
        }
        debug!("Switched to frame {} ({})", index, frame.name());

        self.cache.pin(Some(index));
        self.events.emit(FrameChangedEvent {
            index,
            total_frames: self.cache.capacity(),
        });
        true
    }

    // ========== Tick ==========

    /// Advance the controller by one host tick of length `dt`
    pub fn update(&mut self, dt: Duration) {
        if let Some(completion) = self.loader.poll(&mut self.cache) {
            self.on_load_completed(completion);
        }

        let total = self.total_frames();
        let loading = self.loader.is_loading();
        if let Tick::Advance(next) = self.player.tick(dt, self.current_frame, total, loading) {
            self.advance_to(next);
        }

        self.preload_step();
        self.report_state();
    }

    fn advance_to(&mut self, next: usize) {
        debug!("Advancing from frame {} to {}", self.current_frame, next);
        self.advance_target = Some(next);
        if self.request_frame(next, true).is_err() {
            self.advance_target = None;
            self.player.on_advance_failed(next);
        }
    }

    fn on_load_completed(&mut self, completion: Completion) {
        let Completion { request, result } = completion;
        self.events.emit(LoadingChangedEvent {
            loading: false,
            index: Some(request.index),
        });

        if !request.switch_on_completion {
            self.finish_preload_request(request.index);
        }

        match result {
            Ok(()) => {
                if request.switch_on_completion {
                    self.switch_to(request.index);
                }
            }
            Err(e) => {
                self.record_failure(e);
                if self.advance_target == Some(request.index) {
                    self.advance_target = None;
                    self.player.on_advance_failed(request.index);
                }
            }
        }
    }

    fn record_failure(&mut self, e: LoadError) {
        error!("{}", e);
        self.events.emit(FrameLoadFailedEvent {
            index: e.index(),
            error: e.to_string(),
        });
        self.last_error = Some(e);
    }

    fn report_state(&mut self) {
        let state = self.player.state();
        if state != self.reported_state {
            self.reported_state = state;
            self.events.emit(PlayStateChangedEvent { state });
        }
    }

    // ========== Preload ==========

    /// Load every empty slot in order, one request at a time, without
    /// changing the visible frame. Runs across `update` calls.
    pub fn preload_all(&mut self) {
        info!("Preloading all frames...");
        self.preload_cursor = Some(0);
    }

    pub fn is_preloading(&self) -> bool {
        self.preload_cursor.is_some()
    }

    fn preload_step(&mut self) {
        let Some(cursor) = self.preload_cursor else {
            return;
        };
        if self.loader.is_loading() {
            return;
        }

        let Some(index) = self.cache.first_empty_from(cursor) else {
            self.preload_cursor = None;
            info!("All frames preloaded ({} cached)", self.cache.len());
            return;
        };
        self.preload_cursor = Some(index);

        match self.request_frame(index, false) {
            Ok(LoadOutcome::Pending) | Ok(LoadOutcome::AlreadyLoading) => {}
            // Sync result (or failure) is final, move on
            Ok(_) | Err(_) => self.finish_preload_request(index),
        }
    }

    fn finish_preload_request(&mut self, index: usize) {
        if self.preload_cursor == Some(index) {
            self.preload_cursor = Some(index + 1);
        }
    }

    // ========== Cache Control ==========

    /// Release every cached frame and cancel a running preload
    pub fn clear_cache(&mut self) {
        self.preload_cursor = None;
        self.loader.cancel_background();
        let released = self.cache.len();
        self.cache.clear_all();
        self.cache.pin(None);
        self.has_displayed = false;
        info!("Cache cleared ({} frames released)", released);
        self.events.emit(CacheClearedEvent {
            frames_released: released,
        });
    }

    /// Release one cached frame
    pub fn clear_frame(&mut self, index: usize) -> Result<(), LoadError> {
        self.check_index(index)?;
        self.cache.clear(index);
        if index == self.current_frame {
            self.cache.pin(None);
            self.has_displayed = false;
        }
        Ok(())
    }

    pub fn set_cache_policy(&mut self, policy: CachePolicy) {
        self.cache.set_policy(policy);
    }

    // ========== Playback Controls ==========

    pub fn play(&mut self) {
        self.player.play();
        self.report_state();
    }

    pub fn pause(&mut self) {
        self.player.pause();
        self.report_state();
    }

    /// Stop and rewind to frame 0 (displayed once loaded)
    pub fn stop(&mut self) {
        self.player.stop();
        self.advance_target = None;
        self.report_state();
        let _ = self.request_frame(0, true);
    }

    pub fn toggle_play(&mut self) -> PlaybackState {
        let state = self.player.toggle();
        self.report_state();
        state
    }

    pub fn next_frame(&mut self) -> Result<LoadOutcome, LoadError> {
        let total = self.non_empty_total()?;
        self.request_frame((self.current_frame + 1) % total, true)
    }

    pub fn previous_frame(&mut self) -> Result<LoadOutcome, LoadError> {
        let total = self.non_empty_total()?;
        self.request_frame((self.current_frame + total - 1) % total, true)
    }

    /// Seek to an exact index; out of range is rejected, not clamped
    pub fn go_to_frame(&mut self, index: usize) -> Result<LoadOutcome, LoadError> {
        self.request_frame(index, true)
    }

    /// Seek by timeline position in [0, 1]
    pub fn seek_normalized(&mut self, position: f32) -> Result<LoadOutcome, LoadError> {
        let total = self.non_empty_total()?;
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        let index = (position * (total - 1) as f32).round() as usize;
        self.go_to_frame(index.min(total - 1))
    }

    /// Jump to the start of the d-th tenth of the sequence (digit keys 0-9)
    pub fn jump_to_decile(&mut self, decile: usize) -> Result<LoadOutcome, LoadError> {
        self.go_to_frame(decile * self.total_frames() / 10)
    }

    pub fn set_speed(&mut self, seconds_per_frame: f32) {
        self.player.set_seconds_per_frame(seconds_per_frame);
    }

    pub fn speed_up(&mut self) -> f32 {
        self.player.speed_up()
    }

    pub fn slow_down(&mut self) -> f32 {
        self.player.slow_down()
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.player.toggle_loop()
    }

    pub fn set_load_mode(&mut self, mode: LoadMode) {
        self.load_mode = mode;
    }

    pub fn set_load_timeout(&mut self, timeout: Duration) {
        self.loader.set_timeout(timeout);
    }

    // ========== Queries ==========

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn total_frames(&self) -> usize {
        self.cache.capacity()
    }

    pub fn state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn load_mode(&self) -> LoadMode {
        self.load_mode
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn loading_index(&self) -> Option<usize> {
        self.loader.loading_index()
    }

    pub fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Frame currently on display, if still cached
    pub fn current_volume(&self) -> Option<&VolumeFrame> {
        if self.has_displayed {
            self.cache.get(self.current_frame)
        } else {
            None
        }
    }

    /// Playback position in [0, 1]
    pub fn normalized_progress(&self) -> f32 {
        let total = self.total_frames();
        if total <= 1 {
            0.0
        } else {
            self.current_frame as f32 / (total - 1) as f32
        }
    }

    /// One-line status: frame, state and speed
    pub fn status_line(&self) -> String {
        let status = if self.is_loading() {
            "Loading...".to_string()
        } else {
            self.state().to_string()
        };
        format!(
            "Frame: {} / {} | Status: {} | Speed: {:.1} fps",
            self.current_frame + 1,
            self.total_frames(),
            status,
            self.player.fps()
        )
    }

    fn check_index(&self, index: usize) -> Result<(), LoadError> {
        let total = self.total_frames();
        if index < total {
            Ok(())
        } else {
            Err(LoadError::InvalidIndex { index, total })
        }
    }

    fn non_empty_total(&self) -> Result<usize, LoadError> {
        match self.total_frames() {
            0 => Err(LoadError::InvalidIndex { index: 0, total: 0 }),
            total => Ok(total),
        }
    }
}
