//! volplay - time-varying volume frame cache and playback controller
//!
//! Re-exports all modules for use by binary targets.

// Core engine (cache, loader, player, events, workers)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;

// Re-export commonly used types from core
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, SequenceEventEmitter, downcast_event};
pub use core::frame_cache::{CachePolicy, FrameCache};
pub use core::loader::{LoadError, LoadMode, LoadOutcome};
pub use core::player::PlaybackState;
pub use core::sequence::{SequenceOptions, VolumeSequence};

// Re-export entities
pub use entities::{FrameError, FrameSink, FrameSource, RawVolumeSource, VolumeFrame};
