//! Source detection: is the native runtime installed?
//!
//! The verdict is never cached. Callers ask again whenever they need it.

use std::path::{Path, PathBuf};

use crate::types::SourceMode;

/// Decides the current [`SourceMode`]. Injectable so tests can pin a mode.
pub trait SourceDetector: Send + Sync {
    fn detect(&self) -> SourceMode;

    fn is_live_runtime_present(&self) -> bool {
        self.detect().is_live()
    }
}

impl<T: SourceDetector + ?Sized> SourceDetector for &T {
    fn detect(&self) -> SourceMode {
        (**self).detect()
    }
}

/// Probes for the runtime artifact on disk. Existence only, no content read.
#[derive(Debug, Clone)]
pub struct ArtifactDetector {
    artifact: PathBuf,
}

impl ArtifactDetector {
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }
}

impl SourceDetector for ArtifactDetector {
    fn detect(&self) -> SourceMode {
        if self.artifact.exists() {
            SourceMode::Live
        } else {
            SourceMode::Mock
        }
    }
}

/// Always reports the same mode.
#[derive(Debug, Clone, Copy)]
pub struct FixedDetector(pub SourceMode);

impl SourceDetector for FixedDetector {
    fn detect(&self) -> SourceMode {
        self.0
    }
}
