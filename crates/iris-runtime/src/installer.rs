//! Update installer used by the broker: run the install command, then quit.

use std::process::{Command, Stdio};

use iris_core::{BridgeError, UpdateInstaller};
use tokio_util::sync::CancellationToken;

/// Runs an optional shell command that applies the downloaded update, then
/// cancels `shutdown` so the broker exits and the new version can start.
pub struct CommandInstaller {
    command: Option<String>,
    shutdown: CancellationToken,
}

impl CommandInstaller {
    pub fn new(command: Option<String>, shutdown: CancellationToken) -> Self {
        Self { command, shutdown }
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

impl UpdateInstaller for CommandInstaller {
    fn quit_and_install(&self) -> Result<(), BridgeError> {
        match &self.command {
            Some(command) => {
                // The installer may outlive the broker; reap it if it doesn't.
                let mut child = shell_command(command)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| BridgeError::Installer(format!("{command}: {e}")))?;
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
                tracing::info!(%command, "update installer launched");
            }
            None => {
                tracing::warn!("no install command configured, quitting so the update applies on next launch");
            }
        }
        self.shutdown.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_command_requests_shutdown() {
        let shutdown = CancellationToken::new();
        let installer = CommandInstaller::new(None, shutdown.clone());
        installer.quit_and_install().expect("ok");
        assert!(shutdown.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn with_command_spawns_and_requests_shutdown() {
        let shutdown = CancellationToken::new();
        let installer = CommandInstaller::new(Some("true".into()), shutdown.clone());
        installer.quit_and_install().expect("ok");
        assert!(shutdown.is_cancelled());
    }
}
