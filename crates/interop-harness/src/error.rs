//! Error types for the interop harness

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InteropError {
    #[error("Unsupported platform '{0}': no known verifier location")]
    UnsupportedPlatform(String),

    #[error("Cannot find project root: no workspace Cargo.toml above {}", .0.display())]
    ProjectRootNotFound(PathBuf),

    #[error("Deployment failed: {reason}{}", format_log(.log))]
    DeploymentFailed { reason: String, log: Vec<String> },

    #[error("Failed to launch verifier {}: {source}", .path.display())]
    VerifierLaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Expected marker '{expected}' not found in captured output:\n{output}")]
    AssertionFailed { expected: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InteropError {
    /// Pre-flight errors abort a whole run; everything else fails one case.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            InteropError::UnsupportedPlatform(_) | InteropError::ProjectRootNotFound(_)
        )
    }
}

fn format_log(log: &[String]) -> String {
    if log.is_empty() {
        String::new()
    } else {
        format!("\ndeployment log:\n{}", log.join("\n"))
    }
}

pub type InteropResult<T> = Result<T, InteropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_failed_includes_log() {
        let err = InteropError::DeploymentFailed {
            reason: "process exited before signaling readiness".to_string(),
            log: vec!["error: could not compile".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("exited before signaling readiness"));
        assert!(msg.contains("deployment log:\nerror: could not compile"));
    }

    #[test]
    fn test_preflight_classification() {
        assert!(InteropError::UnsupportedPlatform("macos".into()).is_preflight());
        assert!(InteropError::ProjectRootNotFound(PathBuf::from("/")).is_preflight());
        assert!(!InteropError::AssertionFailed {
            expected: "x".into(),
            output: String::new()
        }
        .is_preflight());
    }
}
