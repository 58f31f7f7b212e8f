//! Starting a shared server in the background
//!
//! The launcher only fires the process off. Whether it came up is decided
//! by polling its identity endpoint, never by holding on to the child.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

const SERVER_BINARY: &str = "handoff-server";

/// `DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP`: no console, no Ctrl+C from ours
#[cfg_attr(not(windows), allow(dead_code))]
const WINDOWS_DETACH_FLAGS: u32 = 0x0000_0008 | 0x0000_0200;

/// Something that can start a handoff server listening on a port
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    /// Start a server on `port` and return without waiting for it
    async fn launch(&self, port: u16) -> Result<()>;
}

/// Launches the `handoff-server` binary as a detached process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: PathBuf,
    idle_ttl: Duration,
}

impl ProcessLauncher {
    pub fn new(binary: PathBuf, idle_ttl: Duration) -> Self {
        Self { binary, idle_ttl }
    }

    /// Use `binary` if given, else the server next to the current
    /// executable, else whatever `PATH` resolves
    pub fn locate(binary: Option<PathBuf>, idle_ttl: Duration) -> Self {
        let binary = binary.unwrap_or_else(default_server_binary);
        Self::new(binary, idle_ttl)
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }
}

fn default_server_binary() -> PathBuf {
    let file_name = format!("{}{}", SERVER_BINARY, std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(SERVER_BINARY))
}

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(&self, port: u16) -> Result<()> {
        debug!(
            "Launching server: {} --port {} --ttl-ms {}",
            self.binary.display(),
            port,
            self.idle_ttl.as_millis()
        );

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg("--port")
            .arg(port.to_string())
            .arg("--ttl-ms")
            .arg(self.idle_ttl.as_millis().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        // Own process group, so signals aimed at our group leave it alone
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        command.creation_flags(WINDOWS_DETACH_FLAGS);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary.display()))?;

        info!(
            "Started background handoff server on port {} (pid {:?})",
            port,
            child.id()
        );
        Ok(())
    }
}
