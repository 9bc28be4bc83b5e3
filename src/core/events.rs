//! Events emitted by a volume sequence

use crate::core::player::PlaybackState;

/// Displayed frame changed (sinks already notified)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameChangedEvent {
    pub index: usize,
    pub total_frames: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayStateChangedEvent {
    pub state: PlaybackState,
}

/// A frame request failed (decode error, timeout, invalid index)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameLoadFailedEvent {
    pub index: usize,
    pub error: String,
}

/// Loading started or finished
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadingChangedEvent {
    pub loading: bool,
    pub index: Option<usize>,
}

/// Cache emptied by clear_cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheClearedEvent {
    pub frames_released: usize,
}
