//! curator-runner - Headless notebook test orchestration
//!
//! Executes every selected notebook as an isolated process under a
//! per-job timeout, at most N at a time:
//! - Job start order follows discovery order
//! - A timed-out job's process is force-killed without touching siblings
//! - Results land in a map keyed by notebook identity, so the report is
//!   reproducible regardless of completion order

pub mod backend;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod selector;

// Re-export key types
pub use backend::{ExecutionBackend, ExecutionOutput, PapermillBackend};
pub use error::{RunnerError, RunnerResult};
pub use job::{JobOutcome, TestJob, TestReport, TestResult};
pub use orchestrator::{OrchestratorConfig, TestOrchestrator};
pub use selector::NotebookSelector;
