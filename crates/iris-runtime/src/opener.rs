//! System link opener: hands URLs to the platform's default handler.

use std::process::{Command, Stdio};

use iris_core::{BridgeError, LinkOpener};

/// Spawns the platform opener (`open`, `xdg-open`, `cmd /C start`).
pub struct SystemOpener {
    program: String,
    leading_args: Vec<String>,
}

impl SystemOpener {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("open", Vec::new())
        } else if cfg!(windows) {
            Self::new("cmd", vec!["/C".into(), "start".into(), String::new()])
        } else {
            Self::new("xdg-open", Vec::new())
        }
    }
}

impl LinkOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<(), BridgeError> {
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::Opener(format!("{}: {e}", self.program)))?;

        // Reap in the background; the opener usually exits immediately.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}
