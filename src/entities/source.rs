//! Raw volume frame source with `.ini` side-channel descriptors
//!
//! Each timestep is a headerless binary file named from a pattern
//! (`water_mass_highlighted_t{0}.raw` → `water_mass_highlighted_t7.raw`).
//! Next to it sits a descriptor `<file>.ini` (or `<stem>.ini`):
//!
//! ```text
//! dimx:120
//! dimy:80
//! dimz:40
//! skip:0
//! format:uint8
//! endianness:little
//! ```
//!
//! Lines are `key:value` or `key=value`; keys are case-insensitive; blank
//! lines and `#` comments are ignored. Everything except the dimensions is
//! optional.

use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::frame::{Endianness, FrameError, VolumeDims, VolumeFrame, VoxelFormat};
use super::traits::FrameSource;

/// Per-frame layout descriptor parsed from an `.ini` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub dims: VolumeDims,
    pub format: VoxelFormat,
    pub endianness: Endianness,
    /// Header bytes to skip before voxel data
    pub skip: usize,
}

impl VolumeDescriptor {
    /// Parse descriptor text. `path` is only used for error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self, FrameError> {
        let invalid = |reason: String| FrameError::InvalidMetadata {
            path: path.to_path_buf(),
            reason,
        };

        let mut params: HashMap<String, String> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':').or_else(|| line.split_once('=')) else {
                continue;
            };
            params.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        let dim = |key: &str| -> Result<usize, FrameError> {
            let raw = params
                .get(key)
                .ok_or_else(|| invalid(format!("missing '{}'", key)))?;
            match raw.parse::<usize>() {
                Ok(v) if v > 0 => Ok(v),
                _ => Err(invalid(format!("bad '{}': {}", key, raw))),
            }
        };
        let dims = VolumeDims::new(dim("dimx")?, dim("dimy")?, dim("dimz")?);

        let format = match params.get("format") {
            Some(raw) => VoxelFormat::parse(raw).ok_or_else(|| invalid(format!("unknown format: {}", raw)))?,
            None => VoxelFormat::default(),
        };
        if dims.byte_len(format).is_none() {
            return Err(invalid(format!("volume {} of {:?} is too large", dims, format)));
        }

        let endianness = match params.get("endianness") {
            Some(raw) => Endianness::parse(raw).ok_or_else(|| invalid(format!("unknown endianness: {}", raw)))?,
            None => Endianness::default(),
        };

        let skip = match params.get("skip").or_else(|| params.get("bytestoskip")) {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| invalid(format!("bad 'skip': {}", raw)))?,
            None => 0,
        };

        Ok(Self {
            dims,
            format,
            endianness,
            skip,
        })
    }

    /// Read and parse a descriptor file
    pub fn from_file(path: &Path) -> Result<Self, FrameError> {
        let text = fs::read_to_string(path).map_err(|_| FrameError::MissingMetadata(path.to_path_buf()))?;
        Self::parse(&text, path)
    }

    /// Expected voxel payload size in bytes (excluding header), None on overflow
    pub fn payload_len(&self) -> Option<usize> {
        self.dims.byte_len(self.format)
    }
}

/// Frame source reading `<data_dir>/<pattern with index>` raw volumes
#[derive(Debug, Clone)]
pub struct RawVolumeSource {
    data_dir: PathBuf,
    file_pattern: String,
}

impl RawVolumeSource {
    /// `file_pattern` must contain `{0}` or `{}` where the frame index goes.
    pub fn new(data_dir: impl Into<PathBuf>, file_pattern: impl Into<String>) -> Self {
        let file_pattern = file_pattern.into();
        if !file_pattern.contains("{0}") && !file_pattern.contains("{}") {
            warn!("File pattern '{}' has no index placeholder, every frame maps to the same file", file_pattern);
        }
        Self {
            data_dir: data_dir.into(),
            file_pattern,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Data file path for a frame index
    pub fn frame_path(&self, index: usize) -> PathBuf {
        let idx = index.to_string();
        let name = self.file_pattern.replace("{0}", &idx).replace("{}", &idx);
        self.data_dir.join(name)
    }

    /// Descriptor path: `<file>.ini`, falling back to `<stem>.ini`
    fn metadata_path(data_path: &Path) -> Option<PathBuf> {
        let mut appended = data_path.as_os_str().to_owned();
        appended.push(".ini");
        let appended = PathBuf::from(appended);
        if appended.is_file() {
            return Some(appended);
        }
        let replaced = data_path.with_extension("ini");
        replaced.is_file().then_some(replaced)
    }

    /// Count consecutive frames present on disk starting at index 0
    pub fn count_frames(&self, limit: usize) -> usize {
        (0..limit).take_while(|&i| self.frame_path(i).is_file()).count()
    }
}

impl FrameSource for RawVolumeSource {
    fn import(&self, index: usize) -> Result<VolumeFrame, FrameError> {
        let path = self.frame_path(index);
        if !path.is_file() {
            return Err(FrameError::MissingData(path));
        }

        let ini = Self::metadata_path(&path).ok_or_else(|| FrameError::MissingMetadata(path.clone()))?;
        let desc = VolumeDescriptor::from_file(&ini)?;
        debug!(
            "Importing frame {}: {} {:?} {:?} skip={} ({})",
            index,
            desc.dims,
            desc.format,
            desc.endianness,
            desc.skip,
            path.display()
        );

        let mut bytes = fs::read(&path).map_err(|e| FrameError::Io(format!("{}: {}", path.display(), e)))?;
        let needed = desc.payload_len().ok_or_else(|| FrameError::InvalidMetadata {
            path: ini.clone(),
            reason: format!("volume {} of {:?} is too large", desc.dims, desc.format),
        })?;
        let available = bytes.len().saturating_sub(desc.skip);
        if available < needed {
            return Err(FrameError::SizeMismatch {
                expected: needed,
                actual: available,
            });
        }

        // Drop the header in place, keep exactly the voxel payload
        bytes.drain(..desc.skip);
        bytes.truncate(needed);

        Ok(VolumeFrame::new(bytes, desc.dims, desc.format, desc.endianness)?
            .with_name(format!("WaterMass_Frame_{}", index)))
    }
}

/// Pick the data folder: configured path if it exists, else the first
/// existing candidate under `search_roots`, else the configured path as-is.
pub fn resolve_data_dir(configured: &Path, search_roots: &[PathBuf]) -> PathBuf {
    if configured.is_dir() {
        return configured.to_path_buf();
    }
    if configured.is_relative() {
        for root in search_roots {
            let candidate = root.join(configured);
            if candidate.is_dir() {
                debug!("Resolved data folder: {}", candidate.display());
                return candidate;
            }
        }
    }
    warn!("Data folder not found, using as configured: {}", configured.display());
    configured.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LoadError, SequenceOptions, VolumeSequence};
    use std::sync::Arc;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("volplay_source_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_descriptor_parse() {
        let text = "# water mass\nDimX: 4\ndimy=3\ndimz:2\nformat: uint16\nendianness: big\nbytesToSkip: 6\n";
        let desc = VolumeDescriptor::parse(text, Path::new("t.ini")).unwrap();
        assert_eq!(desc.dims, VolumeDims::new(4, 3, 2));
        assert_eq!(desc.format, VoxelFormat::Uint16);
        assert_eq!(desc.endianness, Endianness::Big);
        assert_eq!(desc.skip, 6);
        assert_eq!(desc.payload_len(), Some(48));
    }

    #[test]
    fn test_descriptor_defaults_and_errors() {
        let desc = VolumeDescriptor::parse("dimx:1\ndimy:1\ndimz:1", Path::new("t.ini")).unwrap();
        assert_eq!(desc.format, VoxelFormat::Uint8);
        assert_eq!(desc.endianness, Endianness::Little);
        assert_eq!(desc.skip, 0);

        let err = VolumeDescriptor::parse("dimx:1\ndimy:0\ndimz:1", Path::new("t.ini")).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMetadata { .. }));

        let err = VolumeDescriptor::parse("dimx:1\ndimy:1", Path::new("t.ini")).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMetadata { .. }));
    }

    #[test]
    fn test_import_with_header_and_fallback_ini() {
        let dir = temp_dir("import");
        // t0.raw + t0.raw.ini
        fs::write(dir.join("t0.raw"), [9u8, 9, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        fs::write(dir.join("t0.raw.ini"), "dimx:2\ndimy:2\ndimz:2\nskip:2\n").unwrap();
        // t1.raw + t1.ini
        fs::write(dir.join("t1.raw"), [0u8; 8]).unwrap();
        fs::write(dir.join("t1.ini"), "dimx:2\ndimy:2\ndimz:2\n").unwrap();

        let source = RawVolumeSource::new(&dir, "t{0}.raw");
        let frame = source.import(0).unwrap();
        assert_eq!(frame.bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.name(), "WaterMass_Frame_0");
        assert!(source.import(1).is_ok());
        assert_eq!(source.count_frames(10), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_import_errors() {
        let dir = temp_dir("errors");
        let source = RawVolumeSource::new(&dir, "t{}.raw");

        assert!(matches!(source.import(0), Err(FrameError::MissingData(_))));

        fs::write(dir.join("t0.raw"), [0u8; 4]).unwrap();
        assert!(matches!(source.import(0), Err(FrameError::MissingMetadata(_))));

        fs::write(dir.join("t0.raw.ini"), "dimx:2\ndimy:2\ndimz:2\n").unwrap();
        assert_eq!(
            source.import(0).unwrap_err(),
            FrameError::SizeMismatch { expected: 8, actual: 4 }
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_overflowing_dims_are_invalid_metadata() {
        let text = "dimx:100000000\ndimy:100000000\ndimz:100000000\n";
        let err = VolumeDescriptor::parse(text, Path::new("t.ini")).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMetadata { .. }));

        // Fits as uint8 voxels, overflows once scaled to 4-byte floats
        let text = format!("dimx:{}\ndimy:1\ndimz:1\nformat:float32\n", usize::MAX / 2);
        let err = VolumeDescriptor::parse(&text, Path::new("t.ini")).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMetadata { .. }));

        let dir = temp_dir("oversized");
        fs::write(dir.join("t0.raw"), [0u8; 8]).unwrap();
        fs::write(dir.join("t0.raw.ini"), "dimx:100000000\ndimy:100000000\ndimz:100000000\n").unwrap();
        let source = RawVolumeSource::new(&dir, "t{}.raw");
        assert!(matches!(source.import(0), Err(FrameError::InvalidMetadata { .. })));

        // Sync request on the tick thread reports a decode error
        let mut seq = VolumeSequence::new(Arc::new(source), SequenceOptions::with_frames(1));
        let err = seq.request_frame(0, true).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Decode {
                index: 0,
                source: FrameError::InvalidMetadata { .. }
            }
        ));
        assert!(seq.current_volume().is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_resolve_data_dir() {
        let root = temp_dir("resolve");
        fs::create_dir_all(root.join("WaterMass")).unwrap();

        let resolved = resolve_data_dir(Path::new("WaterMass"), &[PathBuf::from("/nonexistent"), root.clone()]);
        assert_eq!(resolved, root.join("WaterMass"));

        let missing = resolve_data_dir(Path::new("Nope"), &[root.clone()]);
        assert_eq!(missing, PathBuf::from("Nope"));

        let _ = fs::remove_dir_all(&root);
    }
}
