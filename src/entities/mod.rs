//! Entities module - data types shared by the playback engine
//!
//! - `frame`: decoded volume frames and their metadata
//! - `source`: raw-file frame source with `.ini` descriptors
//! - `traits`: source/sink interfaces the engine is written against

pub mod frame;
pub mod source;
pub mod traits;

pub use frame::{Endianness, FrameError, VolumeDims, VolumeFrame, VoxelFormat};
pub use source::{RawVolumeSource, VolumeDescriptor, resolve_data_dir};
pub use traits::{FrameSink, FrameSource};
