//! Broker: wires source detection, calibration, the mock pose stream and the
//! UDS server into one process, and runs until shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use iris_core::paths::{self, MOCK_CALIBRATION_FILE, POSE_FRAMES_FILE};
use iris_core::{
    ArtifactDetector, CalibrationProvider, ConsumerRegistry, FrameStreamer, LinkOpener,
    SourceDetector, SourceMode, UpdateInstaller, UpdateNotifier,
};

use crate::cli::DaemonOpts;
use crate::installer::CommandInstaller;
use crate::opener::SystemOpener;
use crate::server;

/// Resolved broker configuration (CLI flags and env already applied).
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub runtime_artifact: PathBuf,
    pub assets_dir: PathBuf,
    pub live_calibration: Option<PathBuf>,
    pub fps: u32,
    pub install_command: Option<String>,
    pub keep_alive: bool,
}

impl BrokerConfig {
    pub fn from_opts(opts: DaemonOpts) -> anyhow::Result<Self> {
        let app_dir = match opts.app_dir {
            Some(dir) => dir,
            None => default_app_dir()?,
        };
        Ok(Self {
            runtime_artifact: opts
                .runtime_artifact
                .unwrap_or_else(|| paths::runtime_artifact_in(&app_dir)),
            assets_dir: opts.assets_dir.unwrap_or_else(|| app_dir.join("assets")),
            live_calibration: opts.live_calibration.or_else(paths::default_live_calibration),
            fps: opts.fps,
            install_command: opts.install_command,
            keep_alive: opts.keep_alive,
        })
    }

    pub fn frames_path(&self) -> PathBuf {
        self.assets_dir.join(POSE_FRAMES_FILE)
    }

    pub fn mock_calibration_path(&self) -> PathBuf {
        self.assets_dir.join(MOCK_CALIBRATION_FILE)
    }
}

/// Directory of the running executable.
fn default_app_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("executable path has no parent directory"))
}

/// Shared broker state.
///
/// Calibration, registry and opener are lock-free for readers; only the
/// streamer handle and the update notifier sit behind async mutexes.
pub struct BrokerState {
    pub detector: Arc<dyn SourceDetector>,
    /// Mode decided at startup. Governs the stream only.
    pub startup_mode: SourceMode,
    /// `None` when the bundled mock calibration could not be loaded.
    pub calibration: Option<Arc<CalibrationProvider>>,
    pub registry: Arc<ConsumerRegistry>,
    pub streamer: Mutex<FrameStreamer>,
    pub updates: Mutex<UpdateNotifier<Box<dyn UpdateInstaller>>>,
    pub opener: Arc<dyn LinkOpener>,
}

impl BrokerState {
    /// Build all components and make the startup stream decision.
    /// Must be called from within the tokio runtime.
    pub fn new(
        config: &BrokerConfig,
        detector: Arc<dyn SourceDetector>,
        installer: Box<dyn UpdateInstaller>,
        opener: Arc<dyn LinkOpener>,
    ) -> Self {
        let startup_mode = detector.detect();
        tracing::info!(
            mode = %startup_mode,
            artifact = %config.runtime_artifact.display(),
            "source mode at startup"
        );

        let calibration = match CalibrationProvider::from_assets(
            Arc::clone(&detector),
            &config.mock_calibration_path(),
            config.live_calibration.clone(),
        ) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::error!(error = %e, "bundled mock calibration unavailable, calibration requests disabled");
                None
            }
        };

        let registry = Arc::new(ConsumerRegistry::new());
        let streamer = FrameStreamer::start(
            startup_mode,
            &config.frames_path(),
            registry.clone(),
            config.fps,
        );

        Self {
            detector,
            startup_mode,
            calibration,
            registry,
            streamer: Mutex::new(streamer),
            updates: Mutex::new(UpdateNotifier::new(installer)),
            opener,
        }
    }
}

/// Run the broker: starts the UDS server and mock stream, waits for shutdown.
pub async fn run_broker(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = BrokerConfig::from_opts(opts)?;
    tracing::debug!(?config, "broker config");

    let shutdown = CancellationToken::new();
    let detector = Arc::new(ArtifactDetector::new(&config.runtime_artifact));
    let installer = Box::new(CommandInstaller::new(
        config.install_command.clone(),
        shutdown.clone(),
    ));
    let state = Arc::new(BrokerState::new(
        &config,
        detector,
        installer,
        Arc::new(SystemOpener::for_platform()),
    ));

    // Start UDS server
    let server_state = Arc::clone(&state);
    let server_socket = socket_path.to_string();
    let server_cancel = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state, server_cancel).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    let watcher = tokio::spawn(watch_consumers(
        Arc::clone(&state),
        config.keep_alive,
        shutdown.clone(),
    ));

    tokio::select! {
        () = shutdown_signal() => {}
        () = shutdown.cancelled() => {
            tracing::info!("shutdown requested");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    shutdown.cancel();
    watcher.abort();
    state.streamer.lock().await.stop();

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("broker stopped");
    Ok(())
}

/// Stop the stream whenever the last UI consumer disconnects, and quit
/// unless `keep_alive` is set.
pub(crate) async fn watch_consumers(
    state: Arc<BrokerState>,
    keep_alive: bool,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = state.registry.wait_all_closed() => {}
        }

        state.streamer.lock().await.stop();
        if !keep_alive {
            tracing::info!("all UI consumers closed, quitting");
            shutdown.cancel();
            return;
        }
    }
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use iris_core::{BridgeError, ChannelConsumer, FixedDetector, StreamStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct NoopInstaller(pub Arc<AtomicUsize>);

    impl UpdateInstaller for NoopInstaller {
        fn quit_and_install(&self) -> Result<(), BridgeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) struct NoopOpener;

    impl LinkOpener for NoopOpener {
        fn open(&self, _url: &str) -> Result<(), BridgeError> {
            Ok(())
        }
    }

    /// Config pointing at a temp app dir with both bundled assets present.
    pub(crate) fn config_with_assets(dir: &Path) -> BrokerConfig {
        let assets_dir = dir.join("assets");
        std::fs::create_dir_all(&assets_dir).expect("assets dir");
        std::fs::write(
            assets_dir.join(POSE_FRAMES_FILE),
            r#"[{"id":"A"},{"id":"B"},{"id":"C"}]"#,
        )
        .expect("frames");
        std::fs::write(
            assets_dir.join(MOCK_CALIBRATION_FILE),
            r#"{"cameras":[{"id":"mock-cam"}]}"#,
        )
        .expect("mock calibration");
        BrokerConfig {
            runtime_artifact: paths::runtime_artifact_in(dir),
            assets_dir,
            live_calibration: Some(dir.join("extrinsics 1.json")),
            fps: 30,
            install_command: None,
            keep_alive: false,
        }
    }

    pub(crate) fn state_with(config: &BrokerConfig, mode: SourceMode) -> Arc<BrokerState> {
        Arc::new(BrokerState::new(
            config,
            Arc::new(FixedDetector(mode)),
            Box::new(NoopInstaller(Arc::new(AtomicUsize::new(0)))),
            Arc::new(NoopOpener),
        ))
    }

    #[test]
    fn config_defaults_follow_app_dir() {
        let opts = DaemonOpts {
            app_dir: Some(PathBuf::from("/opt/iris")),
            assets_dir: None,
            runtime_artifact: None,
            live_calibration: Some(PathBuf::from("/tmp/extrinsics 1.json")),
            fps: 30,
            install_command: None,
            keep_alive: false,
        };
        let config = BrokerConfig::from_opts(opts).expect("config");
        assert_eq!(
            config.runtime_artifact,
            PathBuf::from("/opt/iris/iris_runtime_bundle/exe file")
        );
        assert_eq!(config.frames_path(), PathBuf::from("/opt/iris/assets/position 2.json"));
        assert_eq!(
            config.mock_calibration_path(),
            PathBuf::from("/opt/iris/assets/mockExtrinsics.json")
        );
    }

    #[tokio::test]
    async fn mock_startup_streams_and_serves_calibration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        let state = state_with(&config, SourceMode::Mock);

        assert!(state.streamer.lock().await.is_running());
        let provider = state.calibration.as_ref().expect("calibration enabled");
        assert!(provider.get_calibration().is_some());
    }

    #[tokio::test]
    async fn live_startup_disables_stream() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        let state = state_with(&config, SourceMode::Live);

        assert!(!state.streamer.lock().await.is_running());
        // Live mode with no calibration file yet.
        let provider = state.calibration.as_ref().expect("calibration enabled");
        assert_eq!(provider.get_calibration(), None);
    }

    #[tokio::test]
    async fn missing_mock_calibration_disables_only_that_feature() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        std::fs::remove_file(config.mock_calibration_path()).expect("remove");

        let state = state_with(&config, SourceMode::Mock);
        assert!(state.calibration.is_none());
        assert!(state.streamer.lock().await.is_running());
    }

    #[tokio::test]
    async fn last_consumer_leaving_stops_stream_and_quits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        let state = state_with(&config, SourceMode::Mock);
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_consumers(Arc::clone(&state), false, shutdown.clone()));

        let (consumer, _rx) = ChannelConsumer::channel(4);
        let id = state.registry.register(Arc::new(consumer));
        state.registry.unregister(id);

        tokio::time::timeout(std::time::Duration::from_secs(2), shutdown.cancelled())
            .await
            .expect("shutdown requested");
        watcher.await.expect("join");
        assert_eq!(state.streamer.lock().await.status(), &StreamStatus::Stopped);
    }

    #[tokio::test]
    async fn keep_alive_stops_stream_but_keeps_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        let state = state_with(&config, SourceMode::Mock);
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_consumers(Arc::clone(&state), true, shutdown.clone()));

        let (consumer, _rx) = ChannelConsumer::channel(4);
        let id = state.registry.register(Arc::new(consumer));
        state.registry.unregister(id);

        let stopped = async {
            loop {
                if !state.streamer.lock().await.is_running() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(2), stopped)
            .await
            .expect("stream stopped");
        assert!(!shutdown.is_cancelled());

        shutdown.cancel();
        watcher.await.expect("join");
    }
}
