//! Software-update lifecycle notifier.
//!
//! An external update checker produces [`UpdateEvent`]s. This module only
//! tracks the resulting [`UpdateState`], logs every transition and, when an
//! update has been downloaded, asks the installer to quit and install once.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    Available,
    NotAvailable,
    Downloading,
    Downloaded,
    /// Non-terminal: the next check cycle starts over.
    Errored,
}

/// Events reported by the external update checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UpdateEvent {
    CheckingForUpdate,
    UpdateAvailable {
        version: String,
    },
    UpdateNotAvailable,
    Error {
        message: String,
    },
    DownloadProgress {
        bytes_per_second: u64,
        percent: f64,
        transferred: u64,
        total: u64,
    },
    UpdateDownloaded {
        #[serde(default)]
        version: Option<String>,
    },
}

impl UpdateEvent {
    /// State the notifier moves to on this event.
    pub fn target_state(&self) -> UpdateState {
        match self {
            Self::CheckingForUpdate => UpdateState::Checking,
            Self::UpdateAvailable { .. } => UpdateState::Available,
            Self::UpdateNotAvailable => UpdateState::NotAvailable,
            Self::Error { .. } => UpdateState::Errored,
            Self::DownloadProgress { .. } => UpdateState::Downloading,
            Self::UpdateDownloaded { .. } => UpdateState::Downloaded,
        }
    }
}

/// Performs the install-and-restart step once an update is downloaded.
pub trait UpdateInstaller: Send + Sync {
    fn quit_and_install(&self) -> Result<(), BridgeError>;
}

impl<T: UpdateInstaller + ?Sized> UpdateInstaller for Box<T> {
    fn quit_and_install(&self) -> Result<(), BridgeError> {
        (**self).quit_and_install()
    }
}

/// Human-readable progress line for a download-progress event.
pub fn progress_message(bytes_per_second: u64, percent: f64, transferred: u64, total: u64) -> String {
    format!("Download speed: {bytes_per_second} - Downloaded {percent}% ({transferred}/{total})")
}

pub struct UpdateNotifier<I> {
    state: UpdateState,
    installer: I,
    install_issued: bool,
}

impl<I: UpdateInstaller> UpdateNotifier<I> {
    pub fn new(installer: I) -> Self {
        Self {
            state: UpdateState::Idle,
            installer,
            install_issued: false,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn install_issued(&self) -> bool {
        self.install_issued
    }

    /// Apply one event and return the new state.
    ///
    /// Once the install has been issued the process is on its way out and
    /// later events are ignored.
    pub fn handle(&mut self, event: &UpdateEvent) -> UpdateState {
        if self.install_issued {
            debug!(?event, "install already issued, ignoring update event");
            return self.state;
        }

        match event {
            UpdateEvent::CheckingForUpdate => info!("checking for update"),
            UpdateEvent::UpdateAvailable { version } => info!(%version, "update available"),
            UpdateEvent::UpdateNotAvailable => info!("update not available"),
            UpdateEvent::Error { message } => error!(%message, "update check failed"),
            UpdateEvent::DownloadProgress {
                bytes_per_second,
                percent,
                transferred,
                total,
            } => info!(
                "{}",
                progress_message(*bytes_per_second, *percent, *transferred, *total)
            ),
            UpdateEvent::UpdateDownloaded { version } => {
                info!(version = ?version, "update downloaded, installing now");
            }
        }

        let previous = self.state;
        self.state = event.target_state();
        if previous != self.state {
            debug!(from = ?previous, to = ?self.state, "update state changed");
        }

        if self.state == UpdateState::Downloaded {
            match self.installer.quit_and_install() {
                Ok(()) => self.install_issued = true,
                Err(e) => {
                    error!(error = %e, "quit-and-install failed");
                    self.state = UpdateState::Errored;
                }
            }
        }

        self.state
    }
}

impl<I> std::fmt::Debug for UpdateNotifier<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateNotifier")
            .field("state", &self.state)
            .field("install_issued", &self.install_issued)
            .finish_non_exhaustive()
    }
}
