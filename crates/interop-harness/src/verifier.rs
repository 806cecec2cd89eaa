//! Headless Chrome as the independent HTTP/2 client
//!
//! Chrome is launched once per test case with `--dump-dom`, so everything it
//! rendered ends up on stdout. The virtual time budget bounds how long it
//! waits for network activity; no timeout is layered on top of it here.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use crate::error::{InteropError, InteropResult};

/// Flags forcing headless operation, tolerating the self-signed localhost
/// certificate and dumping the final DOM to stdout.
pub const CHROME_FLAGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--allow-insecure-localhost",
    "--enable-logging",
    "--dump-dom",
    "--virtual-time-budget=10000",
];

/// A single verifier launch: executable plus its full argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierInvocation {
    pub executable_path: PathBuf,
    pub arguments: Vec<String>,
}

impl VerifierInvocation {
    /// Compose the Chrome command line for `base_uri` followed by `request_suffix`.
    pub fn new(executable_path: impl Into<PathBuf>, base_uri: &Url, request_suffix: &str) -> Self {
        let mut arguments: Vec<String> = CHROME_FLAGS.iter().map(|f| f.to_string()).collect();
        arguments.push(format!("{}{}", base_uri, request_suffix));

        Self {
            executable_path: executable_path.into(),
            arguments,
        }
    }

    /// The URL Chrome is pointed at
    pub fn target(&self) -> Option<&str> {
        self.arguments.last().map(String::as_str)
    }

    /// Launch the verifier and capture its output.
    pub async fn run(&self) -> InteropResult<CapturedOutput> {
        run(&self.executable_path, &self.arguments).await
    }
}

impl fmt::Display for VerifierInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.executable_path.display())?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What the verifier printed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Standard output (the dumped DOM)
    pub text: String,

    /// Standard error (Chrome's own logging)
    pub diagnostics: String,

    /// Exit code; None when the process was ended by a signal
    pub exit_code: Option<i32>,
}

/// Spawn `executable` with `arguments`, read stdout and stderr to the end,
/// then wait for it to exit.
///
/// The exit code is reported but not judged: success is decided by the
/// captured text alone.
pub async fn run(executable: &Path, arguments: &[String]) -> InteropResult<CapturedOutput> {
    info!("Starting verifier: {} {}", executable.display(), arguments.join(" "));

    let mut child = Command::new(executable)
        .args(arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| InteropError::VerifierLaunchFailed {
            path: executable.to_path_buf(),
            source,
        })?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain both pipes together so a verbose stderr cannot stall stdout.
    let (text, diagnostics) = tokio::try_join!(
        read_all(stdout.as_mut()),
        read_all(stderr.as_mut())
    )?;

    let status = child.wait().await?;
    debug!(
        "Verifier exited ({}), {} bytes stdout, {} bytes stderr",
        status,
        text.len(),
        diagnostics.len()
    );

    Ok(CapturedOutput {
        text,
        diagnostics,
        exit_code: status.code(),
    })
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: Option<&mut R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
