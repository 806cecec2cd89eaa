//! Interop runner entry point
//!
//! Runs the scenario table outside of `cargo test` and writes a JSON report.
//! Exit codes: 0 all passed, 1 a scenario failed, 2 the run could not start.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use interop_harness::deployment::TargetRuntime;
use interop_harness::{DeployerConfig, InteropResult, RunnerConfig, Scenario, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "interop-runner")]
#[command(about = "HTTP/2 interop checks against headless Chrome")]
struct Args {
    /// Scenarios to run (default: all)
    #[arg(short, long, value_enum)]
    scenario: Vec<Scenario>,

    /// Chrome executable (default: platform location)
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Project root (default: nearest workspace above the working directory)
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Build and run the site with the release profile
    #[arg(long)]
    release: bool,

    /// Seconds to wait for the site to report readiness (includes build time)
    #[arg(long, default_value = "300")]
    startup_timeout: u64,

    /// Target directory for the site build
    #[arg(long)]
    target_dir: Option<PathBuf>,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> InteropResult<bool> {
    let config = RunnerConfig {
        deployer: DeployerConfig {
            target_dir: args.target_dir,
            startup_timeout: Duration::from_secs(args.startup_timeout),
            ..Default::default()
        },
        project_root: args.project_root,
        verifier_path: args.chrome,
        target_runtime: if args.release {
            TargetRuntime::Release
        } else {
            TargetRuntime::Debug
        },
        output_dir: args.output,
    };

    let runner = ScenarioRunner::new(config)?;

    let scenarios = if args.scenario.is_empty() {
        Scenario::ALL.to_vec()
    } else {
        args.scenario
    };

    let results = runner.run_all(&scenarios).await;
    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
