//! Scenario runner: deploy, verify, assert, tear down

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::assertion::assert_contains;
use crate::deployment::{Deployer, DeployerConfig, DeploymentHandle, DeploymentSpec, TargetRuntime};
use crate::error::{InteropError, InteropResult};
use crate::platform::resolve_verifier_path;
use crate::scenario::{Scenario, TestCase};
use crate::verifier::{CapturedOutput, VerifierInvocation};
use crate::workspace::{find_project_root_from_cwd, site_application_path};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub output: Option<CapturedOutput>,

    /// Build and server output, kept for failed scenarios
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployment_log: Vec<String>,
}

/// Why a scenario failed, with the evidence gathered before it did
#[derive(Debug)]
pub struct ScenarioFailure {
    pub error: InteropError,

    /// Verifier output, when the verifier ran
    pub output: Option<CapturedOutput>,

    /// Build and server output up to shutdown
    pub deployment_log: Vec<String>,
}

impl From<InteropError> for ScenarioFailure {
    fn from(error: InteropError) -> Self {
        let deployment_log = match &error {
            InteropError::DeploymentFailed { log, .. } => log.clone(),
            _ => Vec::new(),
        };
        Self {
            error,
            output: None,
            deployment_log,
        }
    }
}

impl fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ScenarioFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioOutcome>,
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub deployer: DeployerConfig,

    /// Project root (None = search upward from the working directory)
    pub project_root: Option<PathBuf>,

    /// Verifier executable (None = platform default)
    pub verifier_path: Option<PathBuf>,

    pub target_runtime: TargetRuntime,

    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            deployer: DeployerConfig::default(),
            project_root: None,
            verifier_path: None,
            target_runtime: TargetRuntime::Debug,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Runs interop scenarios, each against a fresh deployment
#[derive(Debug)]
pub struct ScenarioRunner {
    deployer: Deployer,
    project_root: PathBuf,
    verifier_path: PathBuf,
    target_runtime: TargetRuntime,
    output_dir: PathBuf,
}

impl ScenarioRunner {
    /// Resolve the project root and verifier. Failures here are pre-flight
    /// errors: nothing can run without them.
    pub fn new(config: RunnerConfig) -> InteropResult<Self> {
        let project_root = match config.project_root {
            Some(root) => root,
            None => find_project_root_from_cwd()?,
        };
        let verifier_path = match config.verifier_path {
            Some(path) => path,
            None => resolve_verifier_path()?,
        };

        let mut deployer_config = config.deployer;
        if deployer_config.target_dir.is_none() {
            // Separate from the workspace target dir, which an outer build may hold locked.
            deployer_config.target_dir = Some(project_root.join("target").join("interop-deploy"));
        }

        debug!(
            "Runner: root={}, verifier={}",
            project_root.display(),
            verifier_path.display()
        );

        Ok(Self {
            deployer: Deployer::new(deployer_config),
            project_root,
            verifier_path,
            target_runtime: config.target_runtime,
            output_dir: config.output_dir,
        })
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    pub fn project_root(&self) -> &PathBuf {
        &self.project_root
    }

    pub fn verifier_path(&self) -> &PathBuf {
        &self.verifier_path
    }

    /// Deployment of the interop site for one scenario
    pub fn deployment_spec(&self) -> DeploymentSpec {
        DeploymentSpec {
            target_runtime: self.target_runtime,
            ..DeploymentSpec::self_hosted(site_application_path(&self.project_root))
        }
    }

    /// Deploy the site, point the verifier at it and check for the marker.
    /// The deployment is shut down on every path out of here.
    pub async fn execute(&self, scenario: Scenario) -> Result<CapturedOutput, ScenarioFailure> {
        let mut deployment = self.deployer.deploy(self.deployment_spec()).await?;

        let result = self.verify(&deployment, scenario.test_case()).await;
        deployment.shutdown().await;

        result.map_err(|mut failure| {
            warn!("{} failed: {}", scenario, failure);
            failure.deployment_log = deployment.log().lines();
            for line in &failure.deployment_log {
                warn!(target: "interop_site", "{}", line);
            }
            failure
        })
    }

    async fn verify(
        &self,
        deployment: &DeploymentHandle,
        case: TestCase,
    ) -> Result<CapturedOutput, ScenarioFailure> {
        let invocation =
            VerifierInvocation::new(&self.verifier_path, deployment.base_uri(), case.request_suffix);
        let output = invocation.run().await?;

        match assert_contains(&output.text, case.expected_marker) {
            Ok(()) => Ok(output),
            Err(error) => Err(ScenarioFailure {
                error,
                output: Some(output),
                deployment_log: Vec::new(),
            }),
        }
    }

    /// Run one scenario, folding any failure into the outcome
    pub async fn run_scenario(&self, scenario: Scenario) -> ScenarioOutcome {
        let start = Instant::now();
        let result = self.execute(scenario).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => ScenarioOutcome {
                scenario,
                name: scenario.name().to_string(),
                success: true,
                duration_ms,
                error: None,
                output: Some(output),
                deployment_log: Vec::new(),
            },
            Err(failure) => ScenarioOutcome {
                scenario,
                name: scenario.name().to_string(),
                success: false,
                duration_ms,
                error: Some(failure.error.to_string()),
                output: failure.output,
                deployment_log: failure.deployment_log,
            },
        }
    }

    /// Run scenarios one after another; a failing scenario does not stop the rest
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for &scenario in scenarios {
            let outcome = self.run_scenario(scenario).await;
            if outcome.success {
                passed += 1;
                info!("✓ {} ({} ms)", outcome.name, outcome.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    outcome.name,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(outcome);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Interop results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Write results to `<output_dir>/interop-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> InteropResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("interop-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
