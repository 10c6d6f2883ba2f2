use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::PkglabError;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The registry daemon's lifecycle state, per §4.D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Catalog-persisted identity of a running registry: enough to re-attach to
/// it from a later process without re-spawning, and to verify liveness with
/// a signal-0 probe. Carries its own `state` so a failed `up` still leaves
/// something observable in the catalog (§4.D), rather than just an error
/// that evaporates at the CLI boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHandle {
    pub pid: u32,
    pub port: u16,
    pub state: RegistryState,
}

impl RegistryHandle {
    pub fn base_url(&self) -> url::Url {
        url::Url::parse(&format!("http://127.0.0.1:{}", self.port)).expect("valid url")
    }
}

/// Capability object for starting, stopping, and health-checking the local
/// registry daemon, per §4.D and §9's design note (kept swappable so tests
/// substitute an in-process stub instead of spawning a real daemon).
#[async_trait]
pub trait RegistryControl: std::fmt::Debug + Send + Sync {
    /// Starts the daemon if not already running, or confirms liveness of an
    /// existing handle. Returns `Err` only when no attempt could be made at
    /// all (e.g. the spawn itself failed); once a process exists, the
    /// outcome is reported via the returned handle's `state` —
    /// [`RegistryState::Running`] on success, [`RegistryState::Failed`] if
    /// the health probe never succeeded — so callers can persist it either
    /// way.
    async fn up(&self, existing: Option<&RegistryHandle>) -> Result<RegistryHandle, PkglabError>;

    /// Stops the daemon named by `handle`: SIGTERM, wait, then SIGKILL on
    /// timeout.
    async fn down(&self, handle: &RegistryHandle) -> Result<(), PkglabError>;

    /// A single health probe, without waiting or retrying.
    async fn health(&self, handle: &RegistryHandle) -> bool;
}

/// Spawns and supervises a local Verdaccio instance (the de facto
/// local npm-registry-in-a-box; §9's decided registry daemon choice),
/// configured to store its storage under `config_dir`.
#[derive(Debug)]
pub struct VerdaccioRegistry {
    config_dir: Utf8PathBuf,
    port: u16,
}

impl VerdaccioRegistry {
    pub fn new(config_dir: Utf8PathBuf, port: u16) -> Self {
        Self { config_dir, port }
    }

    fn config_path(&self) -> Utf8PathBuf {
        self.config_dir.join("config.yaml")
    }

    fn write_config(&self) -> Result<(), PkglabError> {
        fs_err::create_dir_all(&self.config_dir).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        let storage = self.config_dir.join("storage");
        let config = format!(
            "storage: {storage}\n\
             auth:\n  htpasswd:\n    file: {}\n\
             uplinks: {{}}\n\
             packages:\n  '**':\n    access: $all\n    publish: $all\n    proxy: []\n\
             listen: 127.0.0.1:{port}\n\
             logs: {{ type: stdout, format: pretty, level: warn }}\n",
            self.config_dir.join("htpasswd"),
            port = self.port,
        );
        fs_err::write(self.config_path(), config).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))
    }
}

#[async_trait]
impl RegistryControl for VerdaccioRegistry {
    #[instrument(skip(self))]
    async fn up(&self, existing: Option<&RegistryHandle>) -> Result<RegistryHandle, PkglabError> {
        if let Some(handle) = existing
            && process_is_alive(handle.pid)
        {
            if self.health(handle).await {
                debug!(pid = handle.pid, "registry already running");
                return Ok(RegistryHandle { state: RegistryState::Running, ..handle.clone() });
            }
            warn!(pid = handle.pid, "registry process alive but unhealthy, restarting");
        }

        self.write_config()?;
        let child = tokio::process::Command::new("npx")
            .args(["--yes", "verdaccio", "--config", self.config_path().as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| PkglabError::RegistryDown(format!("failed to spawn verdaccio: {e}")))?;
        let pid = child.id().ok_or_else(|| {
            PkglabError::RegistryDown("verdaccio exited immediately after spawn".to_string())
        })?;
        // Detach: pkglab only supervises this process across `up`/`down`
        // calls (§5), never across SIGINT of the CLI itself.
        std::mem::drop(child);

        let mut handle = RegistryHandle { pid, port: self.port, state: RegistryState::Starting };
        match self.wait_until_healthy(&handle).await {
            Ok(()) => {
                handle.state = RegistryState::Running;
                info!(pid, port = self.port, "registry running");
            }
            Err(e) => {
                handle.state = RegistryState::Failed;
                warn!(pid, port = self.port, "registry did not become healthy: {e}");
            }
        }
        Ok(handle)
    }

    #[instrument(skip(self))]
    async fn down(&self, handle: &RegistryHandle) -> Result<(), PkglabError> {
        if !process_is_alive(handle.pid) {
            return Ok(());
        }
        send_signal(handle.pid, libc::SIGTERM);
        let deadline = Instant::now() + STOP_GRACE_PERIOD;
        while Instant::now() < deadline {
            if !process_is_alive(handle.pid) {
                return Ok(());
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
        warn!(pid = handle.pid, "registry did not stop within grace period, sending SIGKILL");
        send_signal(handle.pid, libc::SIGKILL);
        Ok(())
    }

    async fn health(&self, handle: &RegistryHandle) -> bool {
        let url = format!("{}/-/ping", handle.base_url());
        reqwest::get(&url).await.is_ok_and(|r| r.status().is_success())
    }
}

impl VerdaccioRegistry {
    async fn wait_until_healthy(&self, handle: &RegistryHandle) -> Result<(), PkglabError> {
        let deadline = Instant::now() + HEALTH_TIMEOUT;
        loop {
            if self.health(handle).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PkglabError::RegistryDown(format!(
                    "registry on port {} did not become healthy within {:?}",
                    self.port, HEALTH_TIMEOUT
                )));
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }
}

fn process_is_alive(pid: u32) -> bool {
    // signal 0 performs no-op delivery; a success return means the process
    // exists and is signalable by us, per §4.D.
    #[allow(clippy::cast_possible_wrap)]
    let pid = pid as i32;
    unsafe { libc::kill(pid, 0) == 0 }
}

fn send_signal(pid: u32, signal: i32) {
    #[allow(clippy::cast_possible_wrap)]
    let pid = pid as i32;
    unsafe {
        libc::kill(pid, signal);
    }
}

#[cfg(test)]
pub mod stub {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{PkglabError, RegistryControl, RegistryHandle, RegistryState, async_trait};

    /// An in-process stub satisfying [`RegistryControl`] without spawning
    /// anything, for tests that only need `up`/`down` bookkeeping to behave
    /// correctly (§9 design note).
    #[derive(Debug, Default)]
    pub struct StubRegistry {
        running: AtomicBool,
    }

    #[async_trait]
    impl RegistryControl for StubRegistry {
        async fn up(&self, existing: Option<&RegistryHandle>) -> Result<RegistryHandle, PkglabError> {
            self.running.store(true, Ordering::SeqCst);
            Ok(RegistryHandle {
                state: RegistryState::Running,
                ..existing.cloned().unwrap_or(RegistryHandle { pid: 1, port: 4873, state: RegistryState::Stopped })
            })
        }

        async fn down(&self, _handle: &RegistryHandle) -> Result<(), PkglabError> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn health(&self, _handle: &RegistryHandle) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }
}
