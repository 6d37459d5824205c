//! Secondary notebook selection over the discovered set.

use curator_core::NotebookRef;
use regex::Regex;
use tracing::info;

use crate::error::{RunnerError, RunnerResult};

/// Comma-separated regex selector applied to logical notebook names.
///
/// An empty selector keeps everything. A selector that matches zero of
/// the discovered notebooks is a hard error rather than a vacuously
/// "successful" empty run.
#[derive(Debug)]
pub struct NotebookSelector {
    patterns: Vec<Regex>,
    raw: String,
}

impl NotebookSelector {
    /// Compile a comma-separated list of regexes. `None` selects all.
    pub fn new(selector: Option<&str>) -> RunnerResult<Self> {
        let raw = selector.unwrap_or("").trim().to_string();
        let mut patterns = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let re = Regex::new(part).map_err(|e| RunnerError::Selector {
                pattern: part.to_string(),
                source: e,
            })?;
            patterns.push(re);
        }
        Ok(Self { patterns, raw })
    }

    /// Apply the selector, preserving discovery order.
    pub fn select(&self, notebooks: &[NotebookRef]) -> RunnerResult<Vec<NotebookRef>> {
        if self.patterns.is_empty() {
            return Ok(notebooks.to_vec());
        }

        let selected: Vec<NotebookRef> = notebooks
            .iter()
            .filter(|nb| self.patterns.iter().any(|re| re.is_match(&nb.logical_name)))
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(RunnerError::EmptySelection {
                selector: self.raw.clone(),
                available: notebooks.len(),
            });
        }

        info!(
            selected = selected.len(),
            available = notebooks.len(),
            "notebook selection applied"
        );
        Ok(selected)
    }
}
