//! Core engine modules - cache, loader, player, events, workers
//!
//! These modules form the playback engine, independent of any host UI.

pub mod cache_man;
pub mod clock;
pub mod event_bus;
pub mod events;
pub mod frame_cache;
pub mod loader;
pub mod player;
pub mod sequence;
pub mod workers;

// Re-exports for convenience
pub use cache_man::MemoryBudget;
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_bus::{EventBus, EventEmitter, SequenceEventEmitter};
pub use frame_cache::{CachePolicy, CacheStats, FrameCache};
pub use loader::{LoadCoordinator, LoadError, LoadMode, LoadOutcome, LoadRequest};
pub use player::{PlaybackState, Player};
pub use sequence::{SequenceOptions, VolumeSequence};
pub use workers::Workers;
