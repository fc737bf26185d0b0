//! Handoff to the external volume tool
//!
//! The tool is configured through its env file and started as an
//! independent child process. The runner behind [`ExternalProcess`] owns the
//! child and enforces its lifetime, so the launch flow only launches and, if
//! it wants to, terminates.

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::VolumeBotConfig;
use crate::errors::{LaunchError, LaunchResult};
use crate::persistence::{KeyFile, KeyStore};

/// Env key the volume tool reads its target mint from
pub const TOKEN_MINT_KEY: &str = "TOKEN_MINT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// The runner stops the process once this much time has passed
    pub lifetime: Duration,
}

/// Opaque handle to a launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(pub u64);

#[async_trait]
pub trait ExternalProcess: Send + Sync {
    /// Start the process and return without waiting for it
    async fn launch(&self, spec: &ProcessSpec) -> LaunchResult<ProcessHandle>;

    /// Stop the process; a process that already exited is not an error
    async fn terminate(&self, handle: ProcessHandle) -> LaunchResult<()>;
}

/// Runs child processes with `tokio::process`
///
/// Each child gets a supervisor task that kills it when its lifetime runs
/// out or [`ExternalProcess::terminate`] is called.
#[derive(Default)]
pub struct TokioProcessRunner {
    next_id: AtomicU64,
    stops: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until every launched process has exited or been stopped
    pub async fn join_all(&self) {
        let supervisors = std::mem::take(&mut *self.supervisors.lock());
        for supervisor in supervisors {
            if let Err(e) = supervisor.await {
                warn!(error = %e, "Process supervisor panicked");
            }
        }
    }
}

async fn supervise(mut child: Child, program: String, lifetime: Duration, stop: oneshot::Receiver<()>) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => info!(program = %program, code = ?status.code(), "External process exited"),
            Err(e) => warn!(program = %program, error = %e, "Waiting for external process failed"),
        },
        _ = tokio::time::sleep(lifetime) => {
            warn!(program = %program, lifetime_secs = lifetime.as_secs(), "Process lifetime reached, terminating");
            kill(&mut child, &program).await;
        }
        // Fires on terminate() and when the runner is dropped
        _ = stop => kill(&mut child, &program).await,
    }
}

async fn kill(child: &mut Child, program: &str) {
    match child.kill().await {
        Ok(()) => info!(program, "External process terminated"),
        Err(e) => warn!(program, error = %e, "Killing external process failed"),
    }
}

#[async_trait]
impl ExternalProcess for TokioProcessRunner {
    async fn launch(&self, spec: &ProcessSpec) -> LaunchResult<ProcessHandle> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LaunchError::Handoff(format!(
                    "spawning {} in {}: {}",
                    spec.program,
                    spec.working_dir.display(),
                    e
                ))
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            pid = ?child.id(),
            program = %spec.program,
            lifetime_secs = spec.lifetime.as_secs(),
            "External process started"
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stops.lock().insert(id, stop_tx);
        let supervisor = tokio::spawn(supervise(child, spec.program.clone(), spec.lifetime, stop_rx));
        self.supervisors.lock().push(supervisor);
        Ok(ProcessHandle(id))
    }

    async fn terminate(&self, handle: ProcessHandle) -> LaunchResult<()> {
        let stop = self.stops.lock().remove(&handle.0);
        if let Some(stop) = stop {
            // An exited process has dropped its receiver already
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Point `key` at `value` in a dotenv file, appending the line if missing
pub async fn update_env_file(path: &Path, key: &str, value: &str) -> LaunchResult<()> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(LaunchError::Handoff(format!(
                "reading {}: {}",
                path.display(),
                e
            )))
        }
    };

    let prefix = format!("{}=", key);
    let entry = format!("{}{}", prefix, value);
    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if line.starts_with(&prefix) {
                found = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push(entry);
    }

    tokio::fs::write(path, lines.join("\n"))
        .await
        .map_err(|e| LaunchError::Handoff(format!("writing {}: {}", path.display(), e)))
}

pub struct VolumeBotHandoff {
    runner: Arc<dyn ExternalProcess>,
    config: VolumeBotConfig,
}

impl VolumeBotHandoff {
    pub fn new(runner: Arc<dyn ExternalProcess>, config: VolumeBotConfig) -> Self {
        Self { runner, config }
    }

    fn spec(&self, args: &[String]) -> ProcessSpec {
        ProcessSpec {
            program: self.config.program.clone(),
            args: args.to_vec(),
            working_dir: PathBuf::from(&self.config.working_dir),
            lifetime: Duration::from_secs(self.config.lifetime_secs),
        }
    }

    /// Point the tool at `mint` and start it
    ///
    /// Returns as soon as the tool is running; `None` when the handoff is
    /// disabled.
    pub async fn run(&self, mint: &Pubkey) -> LaunchResult<Option<ProcessHandle>> {
        if !self.config.enabled {
            info!("Volume tool handoff disabled");
            return Ok(None);
        }
        let env_path = Path::new(&self.config.working_dir).join(&self.config.env_file);
        update_env_file(&env_path, TOKEN_MINT_KEY, &mint.to_string()).await?;
        info!(mint = %mint, env = %env_path.display(), "Volume tool configured");

        self.runner.launch(&self.spec(&self.config.args)).await.map(Some)
    }

    /// Start the tool on the most recently persisted mint
    pub async fn run_latest(&self, store: &dyn KeyStore) -> LaunchResult<Option<ProcessHandle>> {
        let latest = store
            .latest(KeyFile::MintAddress)
            .await?
            .ok_or_else(|| LaunchError::Handoff("no launched mint has been persisted".to_string()))?;
        let mint: Pubkey = latest
            .parse()
            .map_err(|e| LaunchError::Handoff(format!("persisted mint {}: {}", latest, e)))?;
        self.run(&mint).await
    }

    /// Start the tool's own gather command
    pub async fn run_gather(&self) -> LaunchResult<Option<ProcessHandle>> {
        if !self.config.enabled {
            return Ok(None);
        }
        self.runner.launch(&self.spec(&self.config.gather_args)).await.map(Some)
    }
}
