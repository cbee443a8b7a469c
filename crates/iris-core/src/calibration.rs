//! Calibration (extrinsics) provider.
//!
//! Every request re-runs source detection, then either hands back the bundled
//! mock record or reads the per-user live file fresh from disk. Nothing is
//! cached and no error crosses this boundary: absence and corruption both
//! come back as "no calibration".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::assets::{self, MAX_LIVE_BYTES};
use crate::error::BridgeError;
use crate::source::SourceDetector;
use crate::types::{CalibrationData, SourceMode};

/// Outcome of a single calibration lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationLookup {
    /// No runtime installed; bundled record.
    Mock(CalibrationData),
    /// Runtime installed and its calibration file parsed.
    Live(CalibrationData),
    /// Runtime installed but no calibration written yet.
    NotCalibrated,
    /// Runtime installed but its calibration file could not be used.
    Invalid,
}

impl CalibrationLookup {
    pub fn into_data(self) -> Option<CalibrationData> {
        match self {
            Self::Mock(data) | Self::Live(data) => Some(data),
            Self::NotCalibrated | Self::Invalid => None,
        }
    }
}

pub struct CalibrationProvider {
    detector: Arc<dyn SourceDetector>,
    mock: CalibrationData,
    live_path: Option<PathBuf>,
    max_live_bytes: u64,
}

impl CalibrationProvider {
    /// `live_path` is `None` when no per-user location could be resolved;
    /// live mode then always reports "not calibrated".
    pub fn new(
        detector: Arc<dyn SourceDetector>,
        mock: CalibrationData,
        live_path: Option<PathBuf>,
    ) -> Self {
        Self {
            detector,
            mock,
            live_path,
            max_live_bytes: MAX_LIVE_BYTES,
        }
    }

    /// Parse the bundled mock record from `mock_path`. Failure here disables
    /// the calibration feature; the caller decides what that means.
    pub fn from_assets(
        detector: Arc<dyn SourceDetector>,
        mock_path: &Path,
        live_path: Option<PathBuf>,
    ) -> Result<Self, BridgeError> {
        let mock = assets::load_mock_calibration(mock_path)?;
        debug!(path = %mock_path.display(), "mock calibration loaded");
        Ok(Self::new(detector, mock, live_path))
    }

    #[must_use]
    pub fn with_max_live_bytes(mut self, limit: u64) -> Self {
        self.max_live_bytes = limit;
        self
    }

    pub fn mock(&self) -> &CalibrationData {
        &self.mock
    }

    pub fn live_path(&self) -> Option<&Path> {
        self.live_path.as_deref()
    }

    pub fn lookup(&self) -> CalibrationLookup {
        match self.detector.detect() {
            SourceMode::Mock => {
                debug!("mock mode, returning bundled calibration");
                CalibrationLookup::Mock(self.mock.clone())
            }
            SourceMode::Live => self.read_live(),
        }
    }

    /// Calibration for the current source, or `None` if there is none to give.
    pub fn get_calibration(&self) -> Option<CalibrationData> {
        self.lookup().into_data()
    }

    fn read_live(&self) -> CalibrationLookup {
        let Some(path) = self.live_path.as_deref() else {
            warn!("live runtime present but no per-user calibration location is known");
            return CalibrationLookup::NotCalibrated;
        };

        match assets::read_json_capped::<CalibrationData>(path, self.max_live_bytes) {
            Ok(data) => {
                debug!(path = %path.display(), "live calibration loaded");
                CalibrationLookup::Live(data)
            }
            Err(BridgeError::AssetMissing(_)) => {
                warn!(path = %path.display(), "live calibration file not found");
                CalibrationLookup::NotCalibrated
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read live calibration");
                CalibrationLookup::Invalid
            }
        }
    }
}

impl std::fmt::Debug for CalibrationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationProvider")
            .field("live_path", &self.live_path)
            .field("max_live_bytes", &self.max_live_bytes)
            .finish_non_exhaustive()
    }
}
