//! HTTP/2 interop harness
//!
//! Verifies that the interop site negotiates HTTP/2 (ALPN) with a real,
//! independently implemented client: headless Chrome.
//! - Deploys the site as a subprocess on an ephemeral port
//! - Resolves Chrome's location for the host platform
//! - Runs Chrome against the deployment and captures the dumped DOM
//! - Checks the DOM for the expected `Interop {protocol} {method}` marker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  find_project_root() -> root           (pre-flight)         │
//! │  resolve_verifier_path() -> chrome     (pre-flight)         │
//! │  per Scenario:                                              │
//! │    Deployer::deploy(spec) -> DeploymentHandle (build + run) │
//! │    VerifierInvocation::run() -> CapturedOutput              │
//! │    assert_contains(output, marker)                          │
//! │    DeploymentHandle::shutdown()        (every exit path)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod address;
pub mod assertion;
pub mod deployment;
pub mod error;
pub mod platform;
pub mod runner;
pub mod scenario;
pub mod verifier;
pub mod workspace;

pub use deployment::{Deployer, DeployerConfig, DeploymentHandle, DeploymentSpec};
pub use error::{InteropError, InteropResult};
pub use runner::{RunnerConfig, ScenarioFailure, ScenarioRunner};
pub use scenario::Scenario;
