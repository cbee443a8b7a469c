//! Loading of bundled and live JSON assets.
//!
//! Bundled assets (pose recording, mock calibration) are parsed once at
//! startup. Live files are read on every request through [`read_json_capped`],
//! which bounds how much a single read may pull from disk.

use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::BridgeError;
use crate::types::{CalibrationData, FrameSequence, PoseFrame};

/// Upper bound for bundled assets. Pose recordings can be large.
pub const MAX_BUNDLED_BYTES: u64 = 256 * 1024 * 1024;

/// Upper bound for a live calibration file read.
pub const MAX_LIVE_BYTES: u64 = 4 * 1024 * 1024;

/// Read and parse a JSON file, refusing files larger than `limit` bytes.
///
/// A missing file maps to [`BridgeError::AssetMissing`] so callers can treat
/// absence differently from corruption.
pub fn read_json_capped<T: DeserializeOwned>(path: &Path, limit: u64) -> Result<T, BridgeError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BridgeError::AssetMissing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(BridgeError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut buf = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|source| BridgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if buf.len() as u64 > limit {
        return Err(BridgeError::TooLarge {
            path: path.to_path_buf(),
            limit,
        });
    }

    serde_json::from_slice(&buf).map_err(|source| BridgeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the bundled pose recording. The file must hold a non-empty JSON array.
pub fn load_frame_sequence(path: &Path) -> Result<FrameSequence, BridgeError> {
    let frames: Vec<PoseFrame> = read_json_capped(path, MAX_BUNDLED_BYTES)?;
    FrameSequence::new(frames)
}

/// Load the bundled mock calibration record.
pub fn load_mock_calibration(path: &Path) -> Result<CalibrationData, BridgeError> {
    read_json_capped(path, MAX_BUNDLED_BYTES)
}
