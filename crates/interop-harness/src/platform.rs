//! Verifier location per host platform
//!
//! Resolution is a pure function of the OS identity: nothing here touches
//! the filesystem. A missing binary shows up later as a launch failure.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::{InteropError, InteropResult};

/// Fallback when `ProgramFiles(x86)` is not set in the environment
const DEFAULT_PROGRAM_FILES_X86: &str = r"C:\Program Files (x86)";

/// Platforms with a known verifier location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    /// Platform of the running host
    pub fn current() -> InteropResult<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (as in `std::env::consts::OS`) to a platform
    pub fn from_os(os: &str) -> InteropResult<Self> {
        match os {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            other => Err(InteropError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Absolute path of the headless Chrome executable on this platform
    pub fn verifier_path(&self) -> PathBuf {
        match self {
            Platform::Windows => {
                let program_files = std::env::var_os("ProgramFiles(x86)")
                    .unwrap_or_else(|| OsString::from(DEFAULT_PROGRAM_FILES_X86));
                windows_chrome_path(program_files)
            }
            Platform::Linux => PathBuf::from("/usr/bin/google-chrome"),
        }
    }
}

fn windows_chrome_path(program_files_x86: impl Into<PathBuf>) -> PathBuf {
    program_files_x86
        .into()
        .join("Google")
        .join("Chrome")
        .join("Application")
        .join("chrome.exe")
}

/// Resolve the verifier executable for the current host.
pub fn resolve_verifier_path() -> InteropResult<PathBuf> {
    Ok(Platform::current()?.verifier_path())
}
