//! Playback clock with tick-driven frame advance
//!
//! **Why**: The displayed frame must advance at a steady interval, but only
//! once the previous frame is actually on screen. The clock owns the
//! play/pause/stop state and the advance accumulator; it never touches the
//! cache or the source, it only proposes the next index.
//!
//! **Used by**: VolumeSequence::update (one `tick` per host tick)
//!
//! # Timing Model
//!
//! Interval-based: each frame is shown for `seconds_per_frame`. Time is fed
//! in by the host as `dt`, never read from the wall clock. While a load is
//! outstanding the accumulator is frozen, so slow decodes delay playback
//! instead of skipping frames.
//!
//! # End Of Sequence
//!
//! - loop on: last frame → 0
//! - loop off: stay on the last frame and pause

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Fastest allowed interval
pub const MIN_SECONDS_PER_FRAME: f32 = 0.1;
/// Slowest allowed interval
pub const MAX_SECONDS_PER_FRAME: f32 = 5.0;
/// Step for speed_up/slow_down
pub const SPEED_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Paused,
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "■ Stopped"),
            PlaybackState::Paused => write!(f, "⏸ Paused"),
            PlaybackState::Playing => write!(f, "▶ Playing"),
        }
    }
}

/// What one tick decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing to do this tick
    Idle,
    /// Request this frame for display
    Advance(usize),
    /// Last frame reached without loop; clock paused itself
    Ended,
}

/// Playback state machine (does NOT own frames or the cache)
#[derive(Debug, Clone)]
pub struct Player {
    state: PlaybackState,
    /// Time accumulated toward the next advance
    elapsed: Duration,
    seconds_per_frame: f32,
    loop_enabled: bool,
    /// Next advance target after a failed frame (loop mode only)
    resume_at: Option<usize>,
}

impl Default for Player {
    fn default() -> Self {
        Self::new(1.0, true)
    }
}

impl Player {
    pub fn new(seconds_per_frame: f32, loop_enabled: bool) -> Self {
        Self {
            state: PlaybackState::Stopped,
            elapsed: Duration::ZERO,
            seconds_per_frame: clamp_interval(seconds_per_frame),
            loop_enabled,
            resume_at: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn seconds_per_frame(&self) -> f32 {
        self.seconds_per_frame
    }

    /// Frames per second equivalent of the interval
    pub fn fps(&self) -> f32 {
        1.0 / self.seconds_per_frame
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
        if !enabled {
            self.resume_at = None;
        }
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.set_loop_enabled(!self.loop_enabled);
        info!("Loop {}", if self.loop_enabled { "enabled" } else { "disabled" });
        self.loop_enabled
    }

    /// Start playing from the current frame. Accumulator restarts.
    pub fn play(&mut self) {
        self.elapsed = Duration::ZERO;
        if self.state != PlaybackState::Playing {
            self.state = PlaybackState::Playing;
            info!("Playback started");
        }
    }

    /// Freeze at the current frame
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            info!("Playback paused");
        }
    }

    /// Stop; the caller rewinds the displayed frame to 0
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.elapsed = Duration::ZERO;
        self.resume_at = None;
        info!("Playback stopped");
    }

    /// Play if not playing, pause otherwise. Returns new state.
    pub fn toggle(&mut self) -> PlaybackState {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
        self.state
    }

    /// Set the per-frame interval, clamped to the allowed range
    pub fn set_seconds_per_frame(&mut self, seconds: f32) {
        let clamped = clamp_interval(seconds);
        if clamped != seconds {
            debug!("Interval {} s clamped to {} s", seconds, clamped);
        }
        self.seconds_per_frame = clamped;
    }

    /// Shorter interval
    pub fn speed_up(&mut self) -> f32 {
        self.set_seconds_per_frame(self.seconds_per_frame - SPEED_STEP);
        self.seconds_per_frame
    }

    /// Longer interval
    pub fn slow_down(&mut self) -> f32 {
        self.set_seconds_per_frame(self.seconds_per_frame + SPEED_STEP);
        self.seconds_per_frame
    }

    /// Advance the clock by `dt`.
    ///
    /// No-op unless playing, and frozen while `loading`.
    pub fn tick(&mut self, dt: Duration, current: usize, total_frames: usize, loading: bool) -> Tick {
        if self.state != PlaybackState::Playing || loading || total_frames == 0 {
            return Tick::Idle;
        }

        self.elapsed += dt;
        if self.elapsed.as_secs_f32() < self.seconds_per_frame {
            return Tick::Idle;
        }
        self.elapsed = Duration::ZERO;

        if let Some(target) = self.resume_at.take() {
            trace!("Resuming past failed frame at {}", target);
            return Tick::Advance(target % total_frames);
        }

        let next = current + 1;
        if next < total_frames {
            Tick::Advance(next)
        } else if self.loop_enabled {
            trace!("Frame loop: {} -> 0", current);
            Tick::Advance(0)
        } else {
            info!("Reached last frame {}, pausing", current);
            self.state = PlaybackState::Paused;
            Tick::Ended
        }
    }

    /// An advance to `failed` could not be displayed.
    ///
    /// Without loop the clock pauses on the current frame. With loop the
    /// next advance continues after the failed frame.
    pub fn on_advance_failed(&mut self, failed: usize) {
        if self.loop_enabled {
            self.resume_at = Some(failed + 1);
        } else if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            info!("Playback paused at failed frame {}", failed);
        }
    }
}

fn clamp_interval(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.clamp(MIN_SECONDS_PER_FRAME, MAX_SECONDS_PER_FRAME)
    } else {
        MAX_SECONDS_PER_FRAME
    }
}
