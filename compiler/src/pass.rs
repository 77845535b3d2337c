// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the 4 resolution passes (model ingest is outside the
// runner), their dependency edges, and the artifacts they produce.
// Used by the pipeline runner to compute minimal pass subsets for a
// given terminal artifact.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each resolution pass (ingest excluded, handled before
/// the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    BuildIndex,
    ResolveAliases,
    BuildHierarchy,
    NormalizeBindings,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the resolution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Index,       // ModelIndex
    Aliases,     // AliasMap
    Hierarchy,   // HierarchyInfo
    Descriptors, // Vec<ConnectorDescriptor>
    Unresolved,  // Vec<UnresolvedBinding>
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a resolution pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::BuildIndex => PassDescriptor {
            name: "build_index",
            inputs: &[],
            outputs: &[ArtifactId::Index],
            invariants: "definition table closed, exposure sets complete",
        },
        PassId::ResolveAliases => PassDescriptor {
            name: "resolve_aliases",
            inputs: &[PassId::BuildIndex],
            outputs: &[ArtifactId::Aliases],
            invariants: "every declared alias has an entry, mapped or unmapped",
        },
        PassId::BuildHierarchy => PassDescriptor {
            name: "build_hierarchy",
            inputs: &[PassId::BuildIndex],
            outputs: &[ArtifactId::Hierarchy],
            invariants: "root set non-empty, parent paths form a forest",
        },
        PassId::NormalizeBindings => PassDescriptor {
            name: "normalize_bindings",
            inputs: &[PassId::BuildIndex, PassId::ResolveAliases],
            outputs: &[ArtifactId::Descriptors, ArtifactId::Unresolved],
            invariants: "descriptors deduplicated, all failures recorded",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All 4 pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 4] = [
    PassId::BuildIndex,
    PassId::ResolveAliases,
    PassId::BuildHierarchy,
    PassId::NormalizeBindings,
];

/// Compute the minimal ordered set of passes needed to produce
/// `terminal`. Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
