//! curator-env - External collaborators for nb-curator
//!
//! Thin process/file glue around the core engine:
//! - YAML spec store (curation spec load/validate/persist)
//! - `uv pip compile` invocation for dependency resolution
//! - micromamba target-environment lifecycle and kernel registration
//! - notebook repository clones

pub mod environ;
pub mod error;
pub mod repos;
pub mod solver;
pub mod spec_store;

// Re-export key types
pub use environ::EnvironmentManager;
pub use error::{EnvError, EnvResult};
pub use repos::RepositoryManager;
pub use solver::UvSolver;
pub use spec_store::{CurationSpec, SpecHeader, SpecOutputs};
