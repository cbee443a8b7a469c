//! iris-core: source selection and mock pose streaming for the IRIS bridge.
//!
//! Decides whether pose and calibration data come from the installed native
//! runtime or from bundled recordings, serves calibration on demand and
//! replays the bundled pose recording to the active UI consumer. No sockets
//! and no CLI here; `iris-runtime` wires these pieces into a process.

pub mod assets;
pub mod calibration;
pub mod consumer;
pub mod error;
pub mod link;
pub mod paths;
pub mod source;
pub mod streamer;
pub mod types;
pub mod update;

pub use calibration::{CalibrationLookup, CalibrationProvider};
pub use consumer::{
    ActiveConsumerLookup, ChannelConsumer, ConsumerId, ConsumerRegistry, PoseConsumer,
};
pub use error::{BridgeError, DeliveryError};
pub use link::{LinkOpener, OpenReply, open_external};
pub use source::{ArtifactDetector, FixedDetector, SourceDetector};
pub use streamer::{DEFAULT_FPS, DisabledReason, FrameReplay, FrameStreamer, StreamStatus};
pub use types::{CalibrationData, FrameSequence, PoseFrame, SourceMode, StreamCursor};
pub use update::{UpdateEvent, UpdateInstaller, UpdateNotifier, UpdateState};
