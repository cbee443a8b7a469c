//! Mock pose streamer.
//!
//! When no live runtime is installed at startup, the bundled recording is
//! replayed at a fixed rate to whichever consumer is active. Whether to
//! stream is decided once; a runtime installed later does not stop a running
//! stream, and one that is absent later does not start it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::assets::load_frame_sequence;
use crate::consumer::ActiveConsumerLookup;
use crate::error::BridgeError;
use crate::types::{FrameSequence, SourceMode, StreamCursor};

/// Replay rate of the bundled recording.
pub const DEFAULT_FPS: u32 = 30;

/// Tick period for `fps` frames per second (`fps` of 0 is treated as 1).
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
}

/// Why the streamer is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    LiveRuntime,
    AssetMissing,
    AssetInvalid,
    EmptySequence,
}

impl DisabledReason {
    fn from_load_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::AssetMissing(_) => Self::AssetMissing,
            BridgeError::EmptySequence => Self::EmptySequence,
            _ => Self::AssetInvalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamStatus {
    /// Never started.
    Disabled { reason: DisabledReason },
    Running {
        frames: usize,
        fps: u32,
        started_at: DateTime<Utc>,
    },
    /// Started, then stopped.
    Stopped,
}

/// Per-tick replay state. Synchronous so ticks can be driven directly.
#[derive(Debug, Clone)]
pub struct FrameReplay {
    frames: FrameSequence,
    cursor: StreamCursor,
}

impl FrameReplay {
    pub fn new(frames: FrameSequence) -> Self {
        let cursor = frames.cursor();
        Self { frames, cursor }
    }

    /// Index of the frame the next tick will offer.
    pub fn position(&self) -> usize {
        self.cursor.index()
    }

    /// Offer the current frame to the active consumer, then advance.
    ///
    /// The cursor advances whether or not anyone received the frame, so tick
    /// `i` always offers frame `i mod N`. Returns whether a frame was
    /// delivered.
    pub fn tick(&mut self, lookup: &dyn ActiveConsumerLookup) -> bool {
        let delivered = match lookup.active() {
            Some(consumer) => match consumer.deliver(self.frames.frame_at(&self.cursor)) {
                Ok(()) => true,
                Err(e) => {
                    trace!(frame = self.cursor.index(), error = %e, "frame dropped");
                    false
                }
            },
            None => false,
        };
        self.cursor.advance();
        delivered
    }
}

struct StreamTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the periodic replay task. Dropping the streamer stops it.
pub struct FrameStreamer {
    status: StreamStatus,
    task: Option<StreamTask>,
}

impl FrameStreamer {
    /// Startup decision: stream the recording at `frames_path` unless a live
    /// runtime is present or the recording cannot be used.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        mode: SourceMode,
        frames_path: &Path,
        lookup: Arc<dyn ActiveConsumerLookup>,
        fps: u32,
    ) -> Self {
        if mode.is_live() {
            info!("live runtime present, mock pose stream not started");
            return Self::disabled(DisabledReason::LiveRuntime);
        }

        match load_frame_sequence(frames_path) {
            Ok(frames) => Self::spawn(frames, lookup, fps),
            Err(e) => {
                warn!(path = %frames_path.display(), error = %e, "skipping mock pose stream");
                Self::disabled(DisabledReason::from_load_error(&e))
            }
        }
    }

    pub fn disabled(reason: DisabledReason) -> Self {
        Self {
            status: StreamStatus::Disabled { reason },
            task: None,
        }
    }

    /// Start replaying `frames` immediately. The first frame goes out one
    /// period after this call.
    pub fn spawn(frames: FrameSequence, lookup: Arc<dyn ActiveConsumerLookup>, fps: u32) -> Self {
        let fps = fps.max(1);
        let period = frame_period(fps);
        let count = frames.frame_count().get();
        info!(frames = count, fps, "starting mock pose stream");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut replay = FrameReplay::new(frames);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        replay.tick(&*lookup);
                    }
                }
            }
            debug!("mock pose stream task exited");
        });

        Self {
            status: StreamStatus::Running {
                frames: count,
                fps,
                started_at: Utc::now(),
            },
            task: Some(StreamTask { cancel, handle }),
        }
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Cancel the replay task and release its timer.
    ///
    /// Returns `true` if a running stream was stopped; stopping a stream
    /// that is already stopped or never started does nothing.
    pub fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };
        task.cancel.cancel();
        task.handle.abort();
        self.status = StreamStatus::Stopped;
        info!("mock pose stream stopped");
        true
    }
}

impl Drop for FrameStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStreamer")
            .field("status", &self.status)
            .field("running", &self.task.is_some())
            .finish()
    }
}
