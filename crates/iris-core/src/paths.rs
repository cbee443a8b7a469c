//! Well-known filesystem locations for the runtime artifact and assets.

use std::path::{Path, PathBuf};

/// Directory, relative to the application directory, where the native
/// runtime bundle is installed.
pub const RUNTIME_BUNDLE_DIR: &str = "iris_runtime_bundle";

/// Runtime executable whose presence switches the bridge to live mode.
pub const RUNTIME_ARTIFACT_NAME: &str = "exe file";

/// Bundled pose recording replayed in mock mode.
pub const POSE_FRAMES_FILE: &str = "position 2.json";

/// Bundled calibration served in mock mode.
pub const MOCK_CALIBRATION_FILE: &str = "mockExtrinsics.json";

/// Default runtime artifact: `<app_dir>/iris_runtime_bundle/exe file`.
pub fn runtime_artifact_in(app_dir: &Path) -> PathBuf {
    app_dir.join(RUNTIME_BUNDLE_DIR).join(RUNTIME_ARTIFACT_NAME)
}

/// Per-user live calibration file written by the native runtime:
/// `<home>/AppData/Local/IRIS/extrinsics 1.json`.
pub fn live_calibration_in(home: &Path) -> PathBuf {
    home.join("AppData")
        .join("Local")
        .join("IRIS")
        .join("extrinsics 1.json")
}

/// Live calibration path for the current user, if a home directory is known.
pub fn default_live_calibration() -> Option<PathBuf> {
    home_dir().map(|home| live_calibration_in(&home))
}

/// Get the user's home directory (`HOME`, falling back to `USERPROFILE`).
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
