//! Abstract traits for the collaborators of the playback engine.
//!
//! `core` drives frames through these interfaces without knowing where the
//! data comes from (raw files, synthetic volumes) or where it goes
//! (GPU texture upload, logging, test recorders).

use std::sync::Arc;

use super::frame::{FrameError, VolumeFrame};

/// Produces decoded frames by index.
///
/// Must be a pure function of the index: the same index always yields the
/// same volume. May be slow (disk I/O + parsing); the load coordinator
/// decides whether to call it inline or on the load worker.
pub trait FrameSource: Send + Sync {
    /// Import and fully decode one frame.
    fn import(&self, index: usize) -> Result<VolumeFrame, FrameError>;
}

/// Blanket impl: Arc<T> is a source if T is
impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn import(&self, index: usize) -> Result<VolumeFrame, FrameError> {
        (**self).import(index)
    }
}

/// Receives "display frame X" notifications.
///
/// The frame reference is only valid for the duration of the call; sinks
/// copy what they need (e.g. upload to a texture) and never retain it.
/// Runs on the tick thread, so implementations must not block for long.
pub trait FrameSink {
    fn on_frame_changed(&mut self, index: usize, frame: &VolumeFrame);
}

impl<F: FnMut(usize, &VolumeFrame)> FrameSink for F {
    fn on_frame_changed(&mut self, index: usize, frame: &VolumeFrame) {
        self(index, frame)
    }
}
