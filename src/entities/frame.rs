//! Decoded volume frames and frame loading errors
//!
//! A `VolumeFrame` is one timestep of a volumetric dataset: a dense voxel
//! buffer plus the metadata needed to interpret it (dimensions, voxel format,
//! byte order). Frames are produced by a `FrameSource` and owned by the
//! `FrameCache` slot that holds them.
//!
//! # Memory Layout
//!
//! Voxels are stored x-fastest, then y, then z (`index = x + y*dx + z*dx*dy`),
//! matching the raw files written by the preprocessing tools.

use std::path::PathBuf;
use thiserror::Error;

/// Numeric format of a single voxel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoxelFormat {
    #[default]
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
}

impl VoxelFormat {
    /// Size of one voxel in bytes
    pub fn bytes_per_voxel(self) -> usize {
        match self {
            VoxelFormat::Uint8 | VoxelFormat::Int8 => 1,
            VoxelFormat::Uint16 | VoxelFormat::Int16 => 2,
            VoxelFormat::Uint32 | VoxelFormat::Int32 | VoxelFormat::Float32 => 4,
        }
    }

    /// Parse a format name as written in `.ini` descriptors.
    ///
    /// Accepts `uint8`, `int8`, `uint16`, `int16`, `uint32`, `int32`,
    /// `float32` and a bare `float` (32-bit). Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "uint8" | "u8" => Some(VoxelFormat::Uint8),
            "int8" | "i8" => Some(VoxelFormat::Int8),
            "uint16" | "u16" => Some(VoxelFormat::Uint16),
            "int16" | "i16" => Some(VoxelFormat::Int16),
            "uint32" | "u32" => Some(VoxelFormat::Uint32),
            "int32" | "i32" => Some(VoxelFormat::Int32),
            "float32" | "float" | "f32" => Some(VoxelFormat::Float32),
            _ => None,
        }
    }
}

/// Byte order of multi-byte voxels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "little" | "littleendian" | "le" => Some(Endianness::Little),
            "big" | "bigendian" | "be" => Some(Endianness::Big),
            _ => None,
        }
    }
}

/// Volume dimensions in voxels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDims {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl VolumeDims {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Voxel count of dimensions already validated by `byte_len`
    pub fn voxel_count(&self) -> usize {
        self.x * self.y * self.z
    }

    /// Payload size in bytes, or None if it does not fit in `usize`
    pub fn byte_len(&self, format: VoxelFormat) -> Option<usize> {
        self.x
            .checked_mul(self.y)?
            .checked_mul(self.z)?
            .checked_mul(format.bytes_per_voxel())
    }
}

impl std::fmt::Display for VolumeDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Frame loading errors (all recoverable, reported per request)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    #[error("data file not found: {0}")]
    MissingData(PathBuf),

    #[error("metadata file not found for {0}")]
    MissingMetadata(PathBuf),

    #[error("invalid metadata in {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("volume {dims} of {format:?} is too large to address")]
    Oversized { dims: VolumeDims, format: VoxelFormat },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("load worker unavailable: {0}")]
    WorkerLost(String),
}

/// One decoded timestep of a volumetric dataset
#[derive(Debug, Clone)]
pub struct VolumeFrame {
    data: Vec<u8>,
    dims: VolumeDims,
    format: VoxelFormat,
    endianness: Endianness,
    name: String,
}

impl VolumeFrame {
    /// Wrap a fully decoded voxel buffer.
    ///
    /// The buffer length must equal `dims.byte_len(format)`; partially
    /// decoded frames are rejected.
    pub fn new(
        data: Vec<u8>,
        dims: VolumeDims,
        format: VoxelFormat,
        endianness: Endianness,
    ) -> Result<Self, FrameError> {
        let expected = dims.byte_len(format).ok_or(FrameError::Oversized { dims, format })?;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            dims,
            format,
            endianness,
            name: String::new(),
        })
    }

    /// Set a human-readable name (e.g. "WaterMass_Frame_3")
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> VolumeDims {
        self.dims
    }

    pub fn format(&self) -> VoxelFormat {
        self.format
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Raw voxel bytes in file byte order
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Memory held by the voxel buffer in bytes
    pub fn mem(&self) -> usize {
        self.data.len()
    }

    /// Decode a single voxel as f32, or None if out of bounds
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        if x >= self.dims.x || y >= self.dims.y || z >= self.dims.z {
            return None;
        }
        let idx = x + y * self.dims.x + z * self.dims.x * self.dims.y;
        Some(self.decode_at(idx))
    }

    /// Decode the whole buffer to f32 values (x fastest)
    pub fn to_f32(&self) -> Vec<f32> {
        (0..self.dims.voxel_count()).map(|i| self.decode_at(i)).collect()
    }

    /// Minimum and maximum voxel value, or None for an empty volume
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let count = self.dims.voxel_count();
        if count == 0 {
            return None;
        }
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for i in 0..count {
            let v = self.decode_at(i);
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }

    fn decode_at(&self, idx: usize) -> f32 {
        let size = self.format.bytes_per_voxel();
        let b = &self.data[idx * size..(idx + 1) * size];
        let big = self.endianness == Endianness::Big;
        match self.format {
            VoxelFormat::Uint8 => b[0] as f32,
            VoxelFormat::Int8 => b[0] as i8 as f32,
            VoxelFormat::Uint16 => {
                let raw = [b[0], b[1]];
                (if big { u16::from_be_bytes(raw) } else { u16::from_le_bytes(raw) }) as f32
            }
            VoxelFormat::Int16 => {
                let raw = [b[0], b[1]];
                (if big { i16::from_be_bytes(raw) } else { i16::from_le_bytes(raw) }) as f32
            }
            VoxelFormat::Uint32 => {
                let raw = [b[0], b[1], b[2], b[3]];
                (if big { u32::from_be_bytes(raw) } else { u32::from_le_bytes(raw) }) as f32
            }
            VoxelFormat::Int32 => {
                let raw = [b[0], b[1], b[2], b[3]];
                (if big { i32::from_be_bytes(raw) } else { i32::from_le_bytes(raw) }) as f32
            }
            VoxelFormat::Float32 => {
                let raw = [b[0], b[1], b[2], b[3]];
                if big { f32::from_be_bytes(raw) } else { f32::from_le_bytes(raw) }
            }
        }
    }
}
