//! Deployment management - launching the site and tearing it down
//!
//! A self-hosted deployment builds the application with `cargo build`, then
//! starts the built binary directly from the application directory, waits
//! for the readiness line on stdout and hands back a [`DeploymentHandle`].
//! The handle owns the server process itself (not a cargo wrapper), so
//! [`DeploymentHandle::shutdown`] and `Drop` reach the listening process on
//! every platform.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::address::loopback_uri;
use crate::error::{InteropError, InteropResult};

/// Prefix of the line the site writes to stdout once it is listening.
/// Must match `interop_site::READY_PREFIX`.
pub const READY_PREFIX: &str = "Now listening on: ";

/// Lines of server output retained for diagnostics
const MAX_LOG_LINES: usize = 2000;

/// How long shutdown waits for the output forwarders to reach end-of-stream
const FORWARDER_DRAIN: Duration = Duration::from_millis(500);

/// How the application is hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    /// The application is its own server process
    SelfHosted,
}

/// Build profile the application is compiled and run under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetRuntime {
    #[default]
    Debug,
    Release,
}

/// CPU architecture the deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X64,
    Arm64,
}

impl Architecture {
    /// Architecture of the running host, if it is one we know
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Architecture::X64),
            "aarch64" => Some(Architecture::Arm64),
            _ => None,
        }
    }
}

/// What to deploy. Consumed by [`Deployer::deploy`].
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    /// Directory containing the application's `Cargo.toml`; also its content root
    pub application_path: PathBuf,
    pub server_kind: ServerKind,
    pub target_runtime: TargetRuntime,
    pub architecture: Architecture,
}

impl DeploymentSpec {
    /// Self-hosted debug build for the host architecture
    pub fn self_hosted(application_path: impl Into<PathBuf>) -> Self {
        Self {
            application_path: application_path.into(),
            server_kind: ServerKind::SelfHosted,
            target_runtime: TargetRuntime::Debug,
            architecture: Architecture::host().unwrap_or(Architecture::X64),
        }
    }
}

/// Configuration for the deployer
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// Cargo executable used to build the application
    pub cargo: PathBuf,

    /// Target directory for the application build (None = cargo's default)
    pub target_dir: Option<PathBuf>,

    /// How long to wait for the build plus the readiness line
    pub startup_timeout: Duration,

    /// Time between SIGTERM and SIGKILL on shutdown
    pub shutdown_grace: Duration,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            cargo: std::env::var_os("CARGO")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cargo")),
            target_dir: None,
            startup_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Output captured from a deployed process, shared with its forwarding tasks
#[derive(Debug, Clone, Default)]
pub struct DeploymentLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl DeploymentLog {
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == MAX_LOG_LINES {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Snapshot of the retained lines
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

/// Launches deployments
#[derive(Debug, Clone, Default)]
pub struct Deployer {
    config: DeployerConfig,
    live: Arc<AtomicUsize>,
}

impl Deployer {
    pub fn new(config: DeployerConfig) -> Self {
        Self {
            config,
            live: Arc::default(),
        }
    }

    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    /// Deployments started by this deployer that have not been shut down
    pub fn live_deployments(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Start the application on an ephemeral port and wait until it is ready.
    pub async fn deploy(&self, spec: DeploymentSpec) -> InteropResult<DeploymentHandle> {
        if Architecture::host() != Some(spec.architecture) {
            return Err(InteropError::DeploymentFailed {
                reason: format!(
                    "{:?} deployment cannot run on a {} host",
                    spec.architecture,
                    std::env::consts::ARCH
                ),
                log: Vec::new(),
            });
        }

        match spec.server_kind {
            ServerKind::SelfHosted => self.deploy_self_hosted(spec).await,
        }
    }

    async fn deploy_self_hosted(&self, spec: DeploymentSpec) -> InteropResult<DeploymentHandle> {
        info!(
            "Deploying {} ({:?}, {:?})",
            spec.application_path.display(),
            spec.target_runtime,
            spec.architecture
        );

        let deadline = Instant::now() + self.config.startup_timeout;
        let log = DeploymentLog::default();

        let executable =
            match tokio::time::timeout_at(deadline.into(), self.build(&spec, &log)).await {
                Ok(Ok(executable)) => executable,
                Ok(Err(reason)) => {
                    return Err(InteropError::DeploymentFailed {
                        reason,
                        log: log.lines(),
                    })
                }
                Err(_) => {
                    return Err(InteropError::DeploymentFailed {
                        reason: format!(
                            "timed out after {:?} waiting for the build",
                            self.config.startup_timeout
                        ),
                        log: log.lines(),
                    })
                }
            };

        let mut cmd = Command::new(&executable);
        // Port 0 on the wildcard address; the site reports what it got.
        cmd.arg("--bind")
            .arg("[::]:0")
            .current_dir(&spec.application_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| InteropError::DeploymentFailed {
            reason: format!("failed to start {}: {}", executable.display(), e),
            log: log.lines(),
        })?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let mut forwarders = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_stdout(stdout, log.clone(), ready_tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, log.clone())));
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        let mut process = DeployedProcess {
            pid: child.id(),
            child: Some(child),
            forwarders,
            log,
            shutdown_grace: self.config.shutdown_grace,
            live: Arc::clone(&self.live),
        };

        let bound = match tokio::time::timeout_at(deadline.into(), ready_rx).await {
            Ok(Ok(Ok(bound))) => bound,
            Ok(Ok(Err(reason))) => return Err(process.fail(reason).await),
            Ok(Err(_)) => {
                let status = process.wait_exit(Duration::from_secs(5)).await;
                process.drain_forwarders(Duration::from_secs(2)).await;
                return Err(process
                    .fail(format!(
                        "process exited before signaling readiness ({})",
                        status
                    ))
                    .await);
            }
            Err(_) => {
                return Err(process
                    .fail(format!(
                        "timed out after {:?} waiting for readiness",
                        self.config.startup_timeout
                    ))
                    .await)
            }
        };

        let base_uri = loopback_uri(&bound);
        info!("Deployment ready at {} (bound {})", base_uri, bound);

        Ok(DeploymentHandle { base_uri, process })
    }

    /// Build the application and return the path of its binary.
    ///
    /// Cargo's JSON messages on stdout name the built executable; its
    /// rendered diagnostics on stderr go to the deployment log.
    async fn build(&self, spec: &DeploymentSpec, log: &DeploymentLog) -> Result<PathBuf, String> {
        let manifest = spec.application_path.join("Cargo.toml");

        let mut cmd = Command::new(&self.config.cargo);
        cmd.arg("build")
            .arg("--message-format=json-render-diagnostics")
            .arg("--manifest-path")
            .arg(&manifest);
        if spec.target_runtime == TargetRuntime::Release {
            cmd.arg("--release");
        }
        if let Some(target_dir) = &self.config.target_dir {
            cmd.env("CARGO_TARGET_DIR", target_dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Building {}", manifest.display());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.config.cargo.display(), e))?;

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_lines(stderr, log.clone())));

        let mut executable = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<BuildMessage>(&line) {
                    Ok(message) => {
                        if let Some(path) = message.binary() {
                            executable = Some(path);
                        }
                    }
                    Err(_) => log.push(line),
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for build: {}", e))?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if !status.success() {
            return Err(format!("build of {} failed ({})", manifest.display(), status));
        }
        let executable = executable
            .ok_or_else(|| format!("build of {} produced no binary", manifest.display()))?;
        debug!("Built {}", executable.display());
        Ok(executable)
    }
}

/// One line of `cargo build --message-format=json` output
#[derive(Debug, Deserialize)]
struct BuildMessage {
    reason: String,
    #[serde(default)]
    target: Option<BuildTarget>,
    #[serde(default)]
    executable: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct BuildTarget {
    kind: Vec<String>,
}

impl BuildMessage {
    /// Path of a built binary target, if this message announces one
    fn binary(self) -> Option<PathBuf> {
        if self.reason != "compiler-artifact" {
            return None;
        }
        let is_bin = self
            .target
            .as_ref()
            .is_some_and(|t| t.kind.iter().any(|k| k == "bin"));
        if is_bin {
            self.executable
        } else {
            None
        }
    }
}

/// A running deployment. Owns the process; shuts it down on drop.
#[derive(Debug)]
pub struct DeploymentHandle {
    base_uri: Url,
    process: DeployedProcess,
}

impl DeploymentHandle {
    /// Loopback-reachable base URI of the deployment
    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// OS process id of the server process
    pub fn pid(&self) -> Option<u32> {
        self.process.pid
    }

    /// Output captured from the build and the server so far
    pub fn log(&self) -> &DeploymentLog {
        &self.process.log
    }

    /// Whether the deployed process is still running
    pub fn is_running(&mut self) -> bool {
        match self.process.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Terminate the deployment. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.process.shutdown().await;
    }
}

struct DeployedProcess {
    pid: Option<u32>,
    child: Option<Child>,
    forwarders: Vec<JoinHandle<()>>,
    log: DeploymentLog,
    shutdown_grace: Duration,
    live: Arc<AtomicUsize>,
}

impl DeployedProcess {
    async fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.live.fetch_sub(1, Ordering::SeqCst);

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Deployment already exited ({})", status);
                // Anything it left behind in its group goes too.
                #[cfg(unix)]
                signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
            }
            _ => {
                info!("Stopping deployment (pid: {:?})", self.pid);
                self.terminate(&mut child).await;
            }
        }

        self.drain_forwarders(FORWARDER_DRAIN).await;
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            // Graceful first: the site drains connections on SIGTERM.
            if signal_group(self.pid, Signal::SIGTERM)
                && wait_reaped(child, self.shutdown_grace).await
            {
                return;
            }
            signal_group(self.pid, Signal::SIGKILL);
        }

        if let Err(e) = child.start_kill() {
            debug!("start_kill: {}", e);
        }
        if !wait_reaped(child, Duration::from_secs(5)).await {
            warn!("Deployment (pid: {:?}) did not exit after kill", self.pid);
        }
    }

    /// Teardown for a handle dropped without `shutdown`: no grace period,
    /// and the reap blocks because `Drop` cannot await.
    fn kill_now(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.live.fetch_sub(1, Ordering::SeqCst);
        warn!("Deployment (pid: {:?}) dropped while running, killing", self.pid);

        #[cfg(unix)]
        signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
        if let Err(e) = child.start_kill() {
            debug!("start_kill: {}", e);
        }
        if !wait_reaped_blocking(&mut child, Duration::from_secs(5)) {
            warn!("Deployment (pid: {:?}) did not exit after kill", self.pid);
        }

        self.abort_forwarders();
    }

    fn abort_forwarders(&mut self) {
        for task in self.forwarders.drain(..) {
            task.abort();
        }
    }

    /// Shut down and turn the captured log into a deployment failure
    async fn fail(&mut self, reason: String) -> InteropError {
        self.shutdown().await;
        InteropError::DeploymentFailed {
            reason,
            log: self.log.lines(),
        }
    }

    /// Let the forwarding tasks reach end-of-stream so trailing output is
    /// logged; whatever is still running after `limit` is aborted.
    async fn drain_forwarders(&mut self, limit: Duration) {
        let deadline = tokio::time::Instant::now() + limit;
        let tasks: Vec<_> = self.forwarders.drain(..).collect();
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                abort.abort();
            }
        }
    }

    async fn wait_exit(&mut self, limit: Duration) -> String {
        let Some(child) = self.child.as_mut() else {
            return "not running".to_string();
        };
        match tokio::time::timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("wait failed: {}", e),
            Err(_) => "stdout closed, process still running".to_string(),
        }
    }
}

impl Drop for DeployedProcess {
    fn drop(&mut self) {
        self.kill_now();
    }
}

impl std::fmt::Debug for DeployedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployedProcess")
            .field("pid", &self.pid)
            .field("running", &self.child.is_some())
            .finish()
    }
}

/// Parse the readiness line; `None` for any other output line.
pub fn parse_ready_line(line: &str) -> Option<Result<Url, String>> {
    let rest = line.trim().strip_prefix(READY_PREFIX)?;
    Some(Url::parse(rest.trim()).map_err(|e| format!("bad readiness address '{}': {}", rest, e)))
}

async fn forward_stdout(
    stdout: impl AsyncRead + Unpin,
    log: DeploymentLog,
    ready_tx: oneshot::Sender<Result<Url, String>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut lines = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "interop_site", "{}", line);
        if let Some(ready) = parse_ready_line(&line) {
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(ready);
            }
        }
        log.push(line);
    }
}

async fn forward_lines(reader: impl AsyncRead + Unpin, log: DeploymentLog) {
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "interop_site", "{}", line);
        log.push(line);
    }
}

/// Signal the deployment's process group; true if the signal was delivered.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return false;
    };
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => true,
        Err(e) => {
            debug!("killpg({}, {:?}): {}", pid, signal, e);
            false
        }
    }
}

/// Wait for the child to be reaped, up to `limit`.
async fn wait_reaped(child: &mut Child, limit: Duration) -> bool {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("Failed to wait for deployment: {}", e);
            false
        }
        Err(_) => false,
    }
}

/// Poll until the child is reaped or `limit` passes.
fn wait_reaped_blocking(child: &mut Child, limit: Duration) -> bool {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if start.elapsed() < limit => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Ok(None) => return false,
            Err(e) => {
                warn!("Failed to poll deployment: {}", e);
                return false;
            }
        }
    }
}
