//! Constraint aggregation and conflict detection.
//!
//! The compiler merges every collected [`ConstraintFragment`] into one
//! [`CompiledSpec`]: the deduplicated package → constraint mapping handed
//! to the external resolver. It does not solve transitive dependencies;
//! its job is to intersect the direct constraints and surface every pair
//! of fragments that can never be satisfied together, naming both
//! contributing notebooks, instead of letting one silently win.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{CuratorError, CuratorResult};
use crate::requirements::{CompareOp, ConstraintFragment, Version, VersionSpecifier};

/// Two fragments whose constraints on one package can never both hold.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintConflict {
    /// Normalized package name.
    pub package: String,
    /// Attribution (notebook logical name or file path) of one side.
    pub left_owner: String,
    /// The offending constraint from that side.
    pub left_constraint: String,
    /// Attribution of the other side.
    pub right_owner: String,
    /// The offending constraint from the other side.
    pub right_constraint: String,
}

impl std::fmt::Display for ConstraintConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} from {} conflicts with {} from {}",
            self.package,
            self.left_constraint,
            self.left_owner,
            self.right_constraint,
            self.right_owner
        )
    }
}

/// The merged, conflict-free union of all fragments, in resolver input
/// form. Each package appears exactly once; the mapping and its digest
/// are deterministic for a given fragment set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledSpec {
    /// Package name → merged constraint expression (may be empty: any
    /// version).
    pub packages: BTreeMap<String, String>,

    /// SHA-256 over the requirement lines, for change detection on the
    /// persisted spec.
    pub digest: String,
}

impl CompiledSpec {
    /// Render as `requirements.in` lines for the external solver.
    pub fn requirement_lines(&self) -> Vec<String> {
        self.packages
            .iter()
            .map(|(name, expr)| format!("{name}{expr}"))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Merges fragments and reports unsatisfiable constraint pairs.
#[derive(Debug, Default)]
pub struct ConstraintCompiler;

/// One fragment's contribution to a single package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Contribution {
    owner: String,
    expression: String,
    specifiers: Vec<VersionSpecifier>,
}

impl ConstraintCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile `fragments` into a [`CompiledSpec`].
    ///
    /// Any unsatisfiable constraint pair fails the whole compile step
    /// with [`CuratorError::Compilation`] carrying every conflict found,
    /// not just the first.
    pub fn compile(&self, fragments: &[ConstraintFragment]) -> CuratorResult<CompiledSpec> {
        let (spec, conflicts) = self.merge(fragments);
        if conflicts.is_empty() {
            info!(packages = spec.packages.len(), digest = %spec.digest, "constraints compiled");
            Ok(spec)
        } else {
            for conflict in &conflicts {
                warn!(%conflict, "unresolvable constraint");
            }
            Err(CuratorError::Compilation(conflicts))
        }
    }

    /// Merge `fragments`, returning the mapping of satisfiable packages
    /// alongside every detected conflict. Conflicting packages are left
    /// out of the mapping.
    ///
    /// The result is independent of fragment order: contributions are
    /// grouped per package and sorted before merging.
    pub fn merge(
        &self,
        fragments: &[ConstraintFragment],
    ) -> (CompiledSpec, Vec<ConstraintConflict>) {
        let mut by_package: BTreeMap<String, Vec<Contribution>> = BTreeMap::new();
        for fragment in fragments {
            let owner = fragment.attribution();
            for req in &fragment.requirements {
                let expression = req
                    .specifiers
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                by_package
                    .entry(req.name.clone())
                    .or_default()
                    .push(Contribution {
                        owner: owner.clone(),
                        expression,
                        specifiers: req.specifiers.clone(),
                    });
            }
        }

        let mut packages = BTreeMap::new();
        let mut conflicts: BTreeSet<ConstraintConflict> = BTreeSet::new();

        for (package, mut contributions) in by_package {
            contributions.sort();
            contributions.dedup();

            let package_conflicts = find_conflicts(&package, &contributions);
            if package_conflicts.is_empty() {
                packages.insert(package, merged_expression(&contributions));
            } else {
                conflicts.extend(package_conflicts);
            }
        }

        let digest = spec_digest(&packages);
        (CompiledSpec { packages, digest }, conflicts.into_iter().collect())
    }
}

/// Intersection of all contributions, expressed as the deduplicated
/// union of their specifier clauses (comma-joined specifiers already
/// mean "all of these" in requirements syntax).
fn merged_expression(contributions: &[Contribution]) -> String {
    let clauses: BTreeSet<String> = contributions
        .iter()
        .flat_map(|c| c.specifiers.iter().map(|s| s.to_string()))
        .collect();
    clauses.into_iter().collect::<Vec<_>>().join(",")
}

fn spec_digest(packages: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (name, expr) in packages {
        hasher.update(name.as_bytes());
        hasher.update(expr.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// Pairwise unsatisfiability check across contributions from different
/// fragments.
fn find_conflicts(package: &str, contributions: &[Contribution]) -> Vec<ConstraintConflict> {
    let mut found = BTreeSet::new();
    for (i, left) in contributions.iter().enumerate() {
        for right in &contributions[i + 1..] {
            for a in &left.specifiers {
                for b in &right.specifiers {
                    if incompatible(a, b) {
                        found.insert(conflict_entry(package, left, a, right, b));
                    }
                }
            }
        }
    }
    found.into_iter().collect()
}

fn conflict_entry(
    package: &str,
    left: &Contribution,
    a: &VersionSpecifier,
    right: &Contribution,
    b: &VersionSpecifier,
) -> ConstraintConflict {
    // Normalize side order so the report is stable under input
    // permutation.
    let lhs = (left.owner.clone(), format!("{package}{a}"));
    let rhs = (right.owner.clone(), format!("{package}{b}"));
    let ((lo, lc), (ro, rc)) = if lhs <= rhs { (lhs, rhs) } else { (rhs, lhs) };
    ConstraintConflict {
        package: package.to_string(),
        left_owner: lo,
        left_constraint: lc,
        right_owner: ro,
        right_constraint: rc,
    }
}

/// Simple bound form a specifier expands to for satisfiability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound<'a> {
    Exactly(&'a Version),
    Not(&'a Version),
    AtLeast(&'a Version),
    Above(&'a Version),
    AtMost(&'a Version),
    Below(&'a Version),
}

fn expand(spec: &VersionSpecifier) -> (Vec<Bound<'_>>, Option<Version>) {
    match spec.op {
        CompareOp::Eq => (vec![Bound::Exactly(&spec.version)], None),
        CompareOp::Ne => (vec![Bound::Not(&spec.version)], None),
        CompareOp::Ge => (vec![Bound::AtLeast(&spec.version)], None),
        CompareOp::Gt => (vec![Bound::Above(&spec.version)], None),
        CompareOp::Le => (vec![Bound::AtMost(&spec.version)], None),
        CompareOp::Lt => (vec![Bound::Below(&spec.version)], None),
        // ~=X.Y.Z means >=X.Y.Z plus an upper bound at the next release
        // of the second-to-last segment.
        CompareOp::Compatible => {
            (vec![Bound::AtLeast(&spec.version)], compatible_upper(&spec.version))
        }
    }
}

fn compatible_upper(version: &Version) -> Option<Version> {
    if version.release.is_empty() {
        return None;
    }
    let mut release = version.release.clone();
    if release.len() > 1 {
        release.pop();
    }
    if let Some(last) = release.last_mut() {
        *last += 1;
    }
    Some(Version {
        release,
        suffix: String::new(),
    })
}

/// Whether two specifiers from different fragments can never both hold.
fn incompatible(a: &VersionSpecifier, b: &VersionSpecifier) -> bool {
    let (bounds_a, upper_a) = expand(a);
    let (bounds_b, upper_b) = expand(b);

    let mut all_a = bounds_a;
    if let Some(u) = &upper_a {
        all_a.push(Bound::Below(u));
    }
    let mut all_b = bounds_b;
    if let Some(u) = &upper_b {
        all_b.push(Bound::Below(u));
    }

    for x in &all_a {
        for y in &all_b {
            if bounds_clash(*x, *y) {
                return true;
            }
        }
    }
    false
}

fn bounds_clash(x: Bound<'_>, y: Bound<'_>) -> bool {
    use Bound::*;
    match (x, y) {
        (Exactly(a), Exactly(b)) => a != b,
        (Exactly(a), Not(b)) | (Not(b), Exactly(a)) => a == b,
        (Exactly(a), AtLeast(b)) | (AtLeast(b), Exactly(a)) => a < b,
        (Exactly(a), Above(b)) | (Above(b), Exactly(a)) => a <= b,
        (Exactly(a), AtMost(b)) | (AtMost(b), Exactly(a)) => a > b,
        (Exactly(a), Below(b)) | (Below(b), Exactly(a)) => a >= b,
        (AtLeast(a), AtMost(b)) | (AtMost(b), AtLeast(a)) => a > b,
        (AtLeast(a), Below(b)) | (Below(b), AtLeast(a)) => a >= b,
        (Above(a), AtMost(b)) | (AtMost(b), Above(a)) => a >= b,
        (Above(a), Below(b)) | (Below(b), Above(a)) => a >= b,
        // Same-direction bounds and != against ranges always intersect.
        _ => false,
    }
}
