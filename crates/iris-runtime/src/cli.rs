//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "iris", about = "IRIS sensor bridge", version)]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/iris/irisd.sock or /tmp/iris-$USER/irisd.sock)
    #[arg(long, short = 's', global = true, env = "IRIS_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the broker (calibration server + mock pose stream)
    Daemon(DaemonOpts),
    /// Print the current calibration record (or null)
    Extrinsics,
    /// Show source mode and pose stream status
    Status,
    /// Subscribe to the pose stream and print frames
    Watch(WatchOpts),
    /// Ask the broker to open a link in the system browser
    Open(OpenOpts),
}

#[derive(clap::Args, Debug, Clone)]
pub struct DaemonOpts {
    /// Application directory that holds `iris_runtime_bundle/` (default: executable's directory)
    #[arg(long, env = "IRIS_APP_DIR")]
    pub app_dir: Option<PathBuf>,

    /// Bundled assets directory (default: <app-dir>/assets)
    #[arg(long, env = "IRIS_ASSETS_DIR")]
    pub assets_dir: Option<PathBuf>,

    /// Runtime artifact whose presence selects live mode
    /// (default: <app-dir>/iris_runtime_bundle/exe file)
    #[arg(long, env = "IRIS_RUNTIME_ARTIFACT")]
    pub runtime_artifact: Option<PathBuf>,

    /// Live calibration file (default: $HOME/AppData/Local/IRIS/extrinsics 1.json)
    #[arg(long, env = "IRIS_LIVE_CALIBRATION")]
    pub live_calibration: Option<PathBuf>,

    /// Mock pose stream rate in frames per second
    #[arg(
        long,
        env = "IRIS_FPS",
        default_value_t = iris_core::DEFAULT_FPS,
        value_parser = clap::value_parser!(u32).range(1..=240)
    )]
    pub fps: u32,

    /// Shell command run when a downloaded update is ready to install
    #[arg(long, env = "IRIS_INSTALL_COMMAND")]
    pub install_command: Option<String>,

    /// Keep running after every UI consumer has disconnected
    #[arg(
        long,
        env = "IRIS_KEEP_ALIVE",
        default_value_t = cfg!(target_os = "macos"),
        action = clap::ArgAction::Set
    )]
    pub keep_alive: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WatchOpts {
    /// Exit after this many frames
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct OpenOpts {
    /// URL to open
    pub url: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/iris/irisd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/iris-{user}/irisd.sock")
}
