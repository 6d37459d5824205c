//! nb-curator - curate a reproducible notebook environment
//!
//! Workflow, each step opt-in via flags:
//!
//! - `--clone-repos`: clone the notebook repositories named in the spec
//! - `--init-env`: create the target micromamba environment and register
//!   its Jupyter kernel
//! - `--compile`: discover notebooks, merge their requirements, and
//!   resolve them into a pinned lock set
//! - `--install`: install the lock set into the target environment
//! - `--test-notebooks [REGEXES]`: execute the selected notebooks
//!   headlessly under a timeout and report per-notebook outcomes
//!
//! Exit code is 0 iff every requested step succeeded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use curator_core::{
    ConstraintCompiler, CuratorError, NotebookDiscoverer, NotebookRef, RequirementsCollector,
};
use curator_env::{CurationSpec, EnvironmentManager, RepositoryManager, UvSolver};
use curator_runner::{
    NotebookSelector, OrchestratorConfig, PapermillBackend, TestOrchestrator,
};

#[derive(Parser)]
#[command(name = "nb-curator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and test a reproducible environment for a curated notebook set", long_about = None)]
struct Cli {
    /// Path to the YAML curation spec.
    spec_file: PathBuf,

    /// Directory holding notebook repository clones (overrides the spec).
    #[arg(long)]
    repos_dir: Option<PathBuf>,

    /// Directory for compiled specs, lock files, and reports.
    #[arg(long, default_value = "./output")]
    output_dir: PathBuf,

    /// Path to the micromamba binary.
    #[arg(long, default_value = "micromamba")]
    micromamba_path: String,

    /// Clone any missing notebook repositories before discovery.
    #[arg(long)]
    clone_repos: bool,

    /// Delete the repository clones after the run.
    #[arg(long)]
    delete_repos: bool,

    /// Create the target environment (named after the spec's kernel)
    /// and register its Jupyter kernel.
    #[arg(long)]
    init_env: bool,

    /// Delete the target environment after the run.
    #[arg(long)]
    delete_env: bool,

    /// Compile notebook requirements into a pinned lock set.
    #[arg(short, long)]
    compile: bool,

    /// Install the resolved lock set into the target environment.
    #[arg(short, long)]
    install: bool,

    /// Test notebooks matching the comma-separated regexes (all
    /// notebooks when the value is omitted).
    #[arg(short, long, num_args = 0..=1, default_missing_value = ".*", value_name = "REGEXES")]
    test_notebooks: Option<String>,

    /// Shorthand for --compile --install --test-notebooks.
    #[arg(long)]
    curate: bool,

    /// Number of parallel jobs for notebook testing (overrides the spec).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Timeout in seconds for each notebook test (overrides the spec).
    #[arg(long)]
    timeout: Option<u64>,

    /// Abort compilation on any requirements parse failure instead of
    /// warning and continuing.
    #[arg(long)]
    strict: bool,

    /// Write the test report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable DEBUG log output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let mut spec = CurationSpec::load(&cli.spec_file)?;
    if let Some(repos_dir) = &cli.repos_dir {
        spec.repos_dir = repos_dir.clone();
    }
    if let Some(jobs) = cli.jobs {
        spec.jobs = jobs;
    }
    if let Some(timeout) = cli.timeout {
        spec.timeout_seconds = timeout;
    }

    let do_compile = cli.compile || cli.curate;
    let do_install = cli.install || cli.curate;
    let test_selector = if cli.curate && cli.test_notebooks.is_none() {
        Some(".*".to_string())
    } else {
        cli.test_notebooks.clone()
    };

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("cannot create output dir {}", cli.output_dir.display()))?;

    let env_name = spec.header.kernel_name.clone();
    let environment = EnvironmentManager::new(cli.micromamba_path.clone());
    let repos = RepositoryManager::new(spec.repos_dir.clone());

    if cli.clone_repos {
        repos.ensure_clones(&spec.header.repositories).await?;
    }

    if cli.init_env {
        environment
            .create(&env_name, &spec.header.python_version)
            .await?;
        environment
            .register_kernel(&env_name, Some(&spec.header.image_name))
            .await?;
    }

    let config = spec.to_curator_config(cli.strict);
    let notebooks = NotebookDiscoverer::new(&config)?.discover(&config.notebook_dirs)?;
    info!(count = notebooks.len(), "discovered notebooks");

    if do_compile {
        compile_step(&cli, &mut spec, &notebooks).await?;
    }

    if do_install {
        let lock_file = cli
            .output_dir
            .join(format!("{}-compiled.txt", spec.moniker()));
        if !lock_file.is_file() {
            bail!(
                "no lock file at {}; run --compile first",
                lock_file.display()
            );
        }
        environment.install(&env_name, &lock_file).await?;
    }

    let mut tests_passed = true;
    if let Some(selector) = &test_selector {
        tests_passed = test_step(&cli, &mut spec, &notebooks, selector).await?;
    }

    if cli.delete_repos {
        repos.cleanup().await?;
    }
    if cli.delete_env {
        environment.unregister_kernel(&env_name).await?;
        environment.delete(&env_name).await?;
    }

    if !tests_passed {
        bail!("notebook tests failed");
    }
    Ok(())
}

/// Collect requirements, merge them, resolve with uv, and persist the
/// revised spec.
async fn compile_step(cli: &Cli, spec: &mut CurationSpec, notebooks: &[NotebookRef]) -> Result<()> {
    let config = spec.to_curator_config(cli.strict);
    let collected =
        RequirementsCollector::new().collect(notebooks, &spec.resolved_notebook_dirs())?;

    for failure in &collected.failures {
        warn!(%failure, "malformed requirement skipped");
    }
    if config.strict && !collected.failures.is_empty() {
        bail!(
            "{} requirements parse failure(s) in strict mode",
            collected.failures.len()
        );
    }

    let compiled = match ConstraintCompiler::new().compile(&collected.fragments) {
        Ok(compiled) => compiled,
        Err(CuratorError::Compilation(conflicts)) => {
            for conflict in &conflicts {
                error!(%conflict, "constraint conflict");
            }
            bail!("{} unresolvable constraint conflict(s)", conflicts.len());
        }
        Err(e) => return Err(e.into()),
    };

    let solver = UvSolver::new(spec.header.python_version.clone());
    let lock_lines = solver
        .resolve(&compiled, &cli.output_dir, &spec.moniker())
        .await?;

    spec.record_compiled(&compiled, lock_lines);
    let spec_out = cli.output_dir.join(
        cli.spec_file
            .file_name()
            .context("spec file has no filename")?,
    );
    spec.save(&spec_out)?;
    Ok(())
}

/// Run the selected notebooks and report outcomes. Returns overall
/// pass/fail.
async fn test_step(
    cli: &Cli,
    spec: &mut CurationSpec,
    notebooks: &[NotebookRef],
    selector: &str,
) -> Result<bool> {
    let orchestrator = TestOrchestrator::new(
        Arc::new(PapermillBackend::new()),
        OrchestratorConfig {
            jobs: spec.jobs,
            timeout: Duration::from_secs(spec.timeout_seconds),
            kernel: spec.header.kernel_name.clone(),
            max_failures: None,
        },
    );
    let selector = NotebookSelector::new(Some(selector))?;
    let report = orchestrator.run(notebooks, &selector).await?;

    println!("{}", report.summary());

    if let Some(report_path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(report_path, json)
            .with_context(|| format!("cannot write report to {}", report_path.display()))?;
        info!(report = %report_path.display(), "test report written");
    }

    spec.out.tested_notebooks = report.ordered().map(|r| r.notebook.clone()).collect();
    let spec_out = cli.output_dir.join(
        cli.spec_file
            .file_name()
            .context("spec file has no filename")?,
    );
    spec.save(&spec_out)?;

    Ok(report.success())
}
