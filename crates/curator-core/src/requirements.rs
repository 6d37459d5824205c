//! Per-notebook requirements collection.
//!
//! Each notebook directory may carry a conventional `requirements.txt`;
//! one file parses into one [`ConstraintFragment`] attributed to the
//! first notebook discovered in that directory. Malformed lines and
//! unreadable files are collected as [`ParseFailure`]s and never abort
//! collection of the other fragments; the caller decides whether any
//! failure is fatal.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CuratorResult;
use crate::notebook::NotebookRef;

/// Conventional constraints filename colocated with notebooks.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Version comparison operator in a constraint expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `~=` (compatible release)
    Compatible,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Compatible => "~=",
        }
    }
}

/// A parsed version: numeric release segments plus any trailing
/// pre-release/local suffix. Comparison is by release segments with
/// missing segments treated as zero; a bare release sorts after the same
/// release with a suffix (`1.0rc1 < 1.0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub release: Vec<u64>,
    pub suffix: String,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Version {}

impl Version {
    pub fn parse(text: &str) -> Option<Self> {
        let mut release = Vec::new();
        let mut suffix = String::new();
        for (i, segment) in text.split('.').enumerate() {
            if suffix.is_empty() {
                if let Ok(n) = segment.parse::<u64>() {
                    release.push(n);
                    continue;
                }
                // Split a segment like "0rc1" into numeric prefix + rest.
                let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !digits.is_empty() {
                    release.push(digits.parse().ok()?);
                    suffix = segment[digits.len()..].to_string();
                    continue;
                }
                if i == 0 {
                    return None;
                }
                suffix = segment.to_string();
            } else {
                suffix.push('.');
                suffix.push_str(segment);
            }
        }
        if release.is_empty() {
            return None;
        }
        Some(Self { release, suffix })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        // Same release: a suffix marks a pre-release, which sorts first.
        match (self.suffix.is_empty(), other.suffix.is_empty()) {
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            _ => self.suffix.cmp(&other.suffix),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}{}", release.join("."), self.suffix)
    }
}

/// One `(operator, version)` pair, e.g. `>=1.24`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionSpecifier {
    pub op: CompareOp,
    pub version: Version,
}

impl std::fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// One requirement line: a package name plus its specifier list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Normalized (lowercased, `_` folded to `-`) package name.
    pub name: String,
    /// Specifiers, possibly empty (any version).
    pub specifiers: Vec<VersionSpecifier>,
}

impl Requirement {
    /// Parse a single requirement line, already stripped of comments.
    ///
    /// Extras (`pkg[extra]`) are kept on the name; environment markers
    /// after `;` are ignored — both are the external solver's business.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.split(';').next().unwrap_or(line).trim();
        let split_at = line
            .find(|c: char| "<>=!~".contains(c))
            .unwrap_or(line.len());
        let (name_part, spec_part) = line.split_at(split_at);
        let name_part = name_part.trim();
        if name_part.is_empty() {
            return Err(format!("missing package name in {line:?}"));
        }
        if !name_part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.[]".contains(c))
        {
            return Err(format!("invalid package name {name_part:?}"));
        }

        let mut specifiers = Vec::new();
        if !spec_part.trim().is_empty() {
            for clause in spec_part.split(',') {
                specifiers.push(parse_specifier(clause.trim())?);
            }
        }

        Ok(Self {
            name: normalize_name(name_part),
            specifiers,
        })
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let specs: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        write!(f, "{}{}", self.name, specs.join(","))
    }
}

/// Normalize a package name per pip conventions: case-insensitive,
/// `_` and `-` equivalent. Extras are dropped from the merge key.
pub fn normalize_name(name: &str) -> String {
    let base = name.split('[').next().unwrap_or(name);
    base.to_ascii_lowercase().replace('_', "-")
}

fn parse_specifier(clause: &str) -> Result<VersionSpecifier, String> {
    let (op, rest) = if let Some(rest) = clause.strip_prefix("==") {
        (CompareOp::Eq, rest)
    } else if let Some(rest) = clause.strip_prefix("!=") {
        (CompareOp::Ne, rest)
    } else if let Some(rest) = clause.strip_prefix("<=") {
        (CompareOp::Le, rest)
    } else if let Some(rest) = clause.strip_prefix(">=") {
        (CompareOp::Ge, rest)
    } else if let Some(rest) = clause.strip_prefix("~=") {
        (CompareOp::Compatible, rest)
    } else if let Some(rest) = clause.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else if let Some(rest) = clause.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else {
        return Err(format!("unrecognized version operator in {clause:?}"));
    };
    let version = Version::parse(rest.trim())
        .ok_or_else(|| format!("unparseable version {:?} in {clause:?}", rest.trim()))?;
    Ok(VersionSpecifier { op, version })
}

/// One file's worth of constraints, attributed to a single notebook
/// (or to no notebook, for a repository-level global fragment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintFragment {
    /// The constraints file this fragment was parsed from.
    pub source: PathBuf,
    /// Logical name of the owning notebook, `None` for global fragments.
    pub notebook: Option<String>,
    /// Requirements in file order.
    pub requirements: Vec<Requirement>,
}

impl ConstraintFragment {
    /// Human-readable attribution for conflict reports.
    pub fn attribution(&self) -> String {
        match &self.notebook {
            Some(nb) => nb.clone(),
            None => self.source.display().to_string(),
        }
    }
}

/// A malformed line in a constraints file, or a file that could not be
/// read at all (`line_number` 0). Non-fatal: recorded and skipped so one
/// bad file cannot block the whole compile step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseFailure {
    pub source: PathBuf,
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} ({:?})",
            self.source.display(),
            self.line_number,
            self.reason,
            self.line
        )
    }
}

/// Everything collection produced: parsed fragments plus the failures
/// encountered along the way.
#[derive(Debug, Default)]
pub struct CollectedRequirements {
    pub fragments: Vec<ConstraintFragment>,
    pub failures: Vec<ParseFailure>,
}

/// Collects constraint fragments colocated with discovered notebooks.
#[derive(Debug, Default)]
pub struct RequirementsCollector;

impl RequirementsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Collect fragments for `notebooks` plus optional global fragments
    /// at each of `roots`.
    ///
    /// Absence of a constraints file is not an error. Each directory
    /// contributes at most one fragment, attributed to the first
    /// notebook discovered in it.
    pub fn collect(
        &self,
        notebooks: &[NotebookRef],
        roots: &[PathBuf],
    ) -> CuratorResult<CollectedRequirements> {
        let mut collected = CollectedRequirements::default();
        let mut seen_dirs: BTreeSet<PathBuf> = BTreeSet::new();

        for root in roots {
            let req_file = root.join(REQUIREMENTS_FILE);
            if req_file.is_file() && seen_dirs.insert(root.clone()) {
                self.parse_file(&req_file, None, &mut collected);
            }
        }

        for notebook in notebooks {
            let dir = match notebook.path.parent() {
                Some(dir) => dir.to_path_buf(),
                None => continue,
            };
            if !seen_dirs.insert(dir.clone()) {
                continue;
            }
            let req_file = dir.join(REQUIREMENTS_FILE);
            if req_file.is_file() {
                self.parse_file(&req_file, Some(notebook.logical_name.clone()), &mut collected);
            }
        }

        info!(
            fragments = collected.fragments.len(),
            parse_failures = collected.failures.len(),
            "requirements collection complete"
        );
        Ok(collected)
    }

    fn parse_file(
        &self,
        source: &Path,
        notebook: Option<String>,
        collected: &mut CollectedRequirements,
    ) {
        debug!(file = %source.display(), "parsing requirements file");
        // An unreadable file is a failure of that fragment alone, not of
        // the whole collection.
        let content = match fs::read_to_string(source) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %source.display(), error = %e, "unreadable requirements file");
                collected.failures.push(ParseFailure {
                    source: source.to_path_buf(),
                    line_number: 0,
                    line: String::new(),
                    reason: format!("unreadable file: {e}"),
                });
                return;
            }
        };

        let mut requirements = Vec::new();
        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('-') {
                // pip directives (-r, --index-url, ...) are solver input,
                // not package constraints.
                debug!(file = %source.display(), line, "skipping pip directive");
                continue;
            }
            match Requirement::parse(line) {
                Ok(req) => requirements.push(req),
                Err(reason) => {
                    warn!(file = %source.display(), line = idx + 1, %reason, "bad requirement line");
                    collected.failures.push(ParseFailure {
                        source: source.to_path_buf(),
                        line_number: idx + 1,
                        line: line.to_string(),
                        reason,
                    });
                }
            }
        }

        collected.fragments.push(ConstraintFragment {
            source: source.to_path_buf(),
            notebook,
            requirements,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_plain_requirement() {
        let req = Requirement::parse("numpy").unwrap();
        assert_eq!(req.name, "numpy");
        assert!(req.specifiers.is_empty());
    }

    #[test]
    fn test_parse_pinned_requirement() {
        let req = Requirement::parse("numpy==1.24").unwrap();
        assert_eq!(req.name, "numpy");
        assert_eq!(req.specifiers.len(), 1);
        assert_eq!(req.specifiers[0].op, CompareOp::Eq);
        assert_eq!(req.specifiers[0].version, Version::parse("1.24").unwrap());
    }

    #[test]
    fn test_parse_multi_clause_requirement() {
        let req = Requirement::parse("astropy>=5.0,<6").unwrap();
        assert_eq!(req.specifiers.len(), 2);
        assert_eq!(req.specifiers[0].op, CompareOp::Ge);
        assert_eq!(req.specifiers[1].op, CompareOp::Lt);
    }

    #[test]
    fn test_parse_normalizes_names() {
        assert_eq!(Requirement::parse("Jupyter_Client").unwrap().name, "jupyter-client");
        assert_eq!(Requirement::parse("requests[socks]>=2").unwrap().name, "requests");
    }

    #[test]
    fn test_parse_ignores_environment_markers() {
        let req = Requirement::parse("tomli>=1.1; python_version < \"3.11\"").unwrap();
        assert_eq!(req.name, "tomli");
        assert_eq!(req.specifiers.len(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Requirement::parse("===wat").is_err());
        assert!(Requirement::parse("numpy==not.a.version").is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("1.24") < v("1.26"));
        assert!(v("1.9") < v("1.10"));
        assert!(v("2") == v("2.0.0"));
        assert!(v("1.0rc1") < v("1.0"));
    }

    #[test]
    fn test_collect_finds_colocated_file() {
        let dir = tempdir().unwrap();
        let nb_dir = dir.path().join("spectra");
        std::fs::create_dir_all(&nb_dir).unwrap();
        std::fs::write(nb_dir.join("fit.ipynb"), b"{}").unwrap();
        std::fs::write(nb_dir.join(REQUIREMENTS_FILE), "numpy>=1.20\nastropy\n").unwrap();

        let nb = NotebookRef::new(nb_dir.join("fit.ipynb"), dir.path());
        let collected = RequirementsCollector::new().collect(&[nb], &[]).unwrap();

        assert_eq!(collected.fragments.len(), 1);
        assert!(collected.failures.is_empty());
        let frag = &collected.fragments[0];
        assert_eq!(frag.notebook.as_deref(), Some("spectra/fit.ipynb"));
        assert_eq!(frag.requirements.len(), 2);
    }

    #[test]
    fn test_collect_absent_file_is_fine() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("solo.ipynb"), b"{}").unwrap();
        let nb = NotebookRef::new(dir.path().join("solo.ipynb"), dir.path());
        let collected = RequirementsCollector::new().collect(&[nb], &[]).unwrap();
        assert!(collected.fragments.is_empty());
        assert!(collected.failures.is_empty());
    }

    #[test]
    fn test_bad_line_does_not_block_other_fragments() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("a.ipynb"), b"{}").unwrap();
        std::fs::write(b.join("b.ipynb"), b"{}").unwrap();
        std::fs::write(a.join(REQUIREMENTS_FILE), "numpy==oops??\nscipy\n").unwrap();
        std::fs::write(b.join(REQUIREMENTS_FILE), "pandas>=2\n").unwrap();

        let nbs = vec![
            NotebookRef::new(a.join("a.ipynb"), dir.path()),
            NotebookRef::new(b.join("b.ipynb"), dir.path()),
        ];
        let collected = RequirementsCollector::new().collect(&nbs, &[]).unwrap();

        assert_eq!(collected.fragments.len(), 2);
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].line_number, 1);
        // The good line in the bad file still parsed.
        assert_eq!(collected.fragments[0].requirements.len(), 1);
        assert_eq!(collected.fragments[0].requirements[0].name, "scipy");
    }

    #[test]
    fn test_unreadable_file_does_not_block_other_fragments() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("a.ipynb"), b"{}").unwrap();
        std::fs::write(b.join("b.ipynb"), b"{}").unwrap();
        // Not valid UTF-8: reading this file as text fails outright.
        std::fs::write(a.join(REQUIREMENTS_FILE), [0xff, 0xfe, 0xfa]).unwrap();
        std::fs::write(b.join(REQUIREMENTS_FILE), "pandas>=2\n").unwrap();

        let nbs = vec![
            NotebookRef::new(a.join("a.ipynb"), dir.path()),
            NotebookRef::new(b.join("b.ipynb"), dir.path()),
        ];
        let collected = RequirementsCollector::new().collect(&nbs, &[]).unwrap();

        assert_eq!(collected.fragments.len(), 1);
        assert_eq!(collected.fragments[0].requirements[0].name, "pandas");
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].line_number, 0);
        assert!(collected.failures[0].reason.contains("unreadable"));
    }

    #[test]
    fn test_global_fragment_has_no_owner() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(REQUIREMENTS_FILE), "jupyter\n").unwrap();
        let collected = RequirementsCollector::new()
            .collect(&[], &[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(collected.fragments.len(), 1);
        assert!(collected.fragments[0].notebook.is_none());
    }

    #[test]
    fn test_one_fragment_per_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("x.ipynb"), b"{}").unwrap();
        std::fs::write(dir.path().join("y.ipynb"), b"{}").unwrap();
        std::fs::write(dir.path().join(REQUIREMENTS_FILE), "numpy\n").unwrap();

        let nbs = vec![
            NotebookRef::new(dir.path().join("x.ipynb"), dir.path()),
            NotebookRef::new(dir.path().join("y.ipynb"), dir.path()),
        ];
        let collected = RequirementsCollector::new().collect(&nbs, &[]).unwrap();
        assert_eq!(collected.fragments.len(), 1);
    }
}
