//! curator-core - Notebook discovery and constraint compilation
//!
//! The engine behind nb-curator:
//! - Classifies filesystem paths against include/exclude patterns,
//!   structurally rejecting editor checkpoint artifacts
//! - Walks notebook repositories and produces the canonical notebook set
//! - Collects per-notebook `requirements.txt` fragments
//! - Merges all fragments into one conflict-checked specification for an
//!   external resolver

pub mod compiler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod matcher;
pub mod notebook;
pub mod requirements;

// Re-export key types
pub use compiler::{CompiledSpec, ConstraintCompiler, ConstraintConflict};
pub use config::CuratorConfig;
pub use discovery::{discover_notebooks, NotebookDiscoverer};
pub use error::{CuratorError, CuratorResult};
pub use matcher::PatternMatcher;
pub use notebook::NotebookRef;
pub use requirements::{
    CollectedRequirements, CompareOp, ConstraintFragment, ParseFailure, Requirement,
    RequirementsCollector, Version, VersionSpecifier,
};
