//! Core value types shared by the detector, calibration provider and streamer.

use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Where pose and calibration data come from.
///
/// `Live` means the native runtime artifact is installed; `Mock` means the
/// bundled recordings are served instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Live,
    Mock,
}

impl SourceMode {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Mock => f.write_str("mock"),
        }
    }
}

/// One pose sample. The payload is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseFrame(pub serde_json::Value);

/// Camera extrinsics record. The payload is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationData(pub serde_json::Value);

/// Immutable, non-empty, ordered pose recording.
///
/// Cloning is cheap: frames are shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Arc<[PoseFrame]>,
}

impl FrameSequence {
    pub fn new(frames: Vec<PoseFrame>) -> Result<Self, BridgeError> {
        if frames.is_empty() {
            return Err(BridgeError::EmptySequence);
        }
        Ok(Self {
            frames: frames.into(),
        })
    }

    pub fn frame_count(&self) -> NonZeroUsize {
        // Constructor guarantees at least one frame.
        NonZeroUsize::new(self.frames.len()).unwrap_or(NonZeroUsize::MIN)
    }

    /// Frame under `cursor`. The cursor always wraps within bounds.
    pub fn frame_at(&self, cursor: &StreamCursor) -> &PoseFrame {
        &self.frames[cursor.index() % self.frames.len()]
    }

    /// A fresh cursor positioned at the first frame.
    pub fn cursor(&self) -> StreamCursor {
        StreamCursor::new(self.frame_count())
    }
}

/// Cyclic position within a [`FrameSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    index: usize,
    len: NonZeroUsize,
}

impl StreamCursor {
    pub fn new(len: NonZeroUsize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Step to the next frame, wrapping to 0 after the last one.
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.len.get();
    }
}
