// hierarchy.rs — Composition hierarchy discovery
//
// Fourth resolution pass, independent of alias and binding resolution.
// Computes the composition graph between composite definitions,
// collapses cycles via Tarjan's strongly-connected-components
// algorithm, selects the root definitions, and assigns every instance
// site a parent path. Mutual and self composition are legal in the
// language, so the traversal must terminate on cyclic graphs.
//
// Preconditions: `index` was built from `model`.
// Postconditions: parent paths form a forest: no instance is its own
//                 ancestor and every site reachable from a root has a
//                 path; root order and path assignment are
//                 deterministic for an unchanged model.
// Failure modes: `NoCompositeRoot` when the model has no composite
//                definition at all.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::diag::FatalError;
use crate::index::ModelIndex;
use crate::ir::{ComponentDefinition, Model};

// ── Public types ────────────────────────────────────────────────────────────

/// Root definitions plus the total instance-site → parent-path map.
/// Sites are keyed `Owner::instance`; owner definition names are unique
/// and instance names are unique per configuration, so the key is
/// model-global.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyInfo {
    pub roots: Vec<String>,
    paths: BTreeMap<String, String>,
}

impl HierarchyInfo {
    pub fn is_root(&self, definition: &str) -> bool {
        self.roots.iter().any(|r| r == definition)
    }

    /// Full dotted instantiation path of an instance site.
    pub fn parent_path(&self, owner: &str, instance: &str) -> Option<&str> {
        self.paths.get(&site_key(owner, instance)).map(String::as_str)
    }

    /// All (site key, path) entries, in site-key order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &str)> {
        self.paths.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for HierarchyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "roots: {}", self.roots.join(", "))?;
        let mut ordered: Vec<&str> = self.paths.values().map(String::as_str).collect();
        ordered.sort_unstable();
        for path in ordered {
            writeln!(f, "  {}", path)?;
        }
        Ok(())
    }
}

fn site_key(owner: &str, instance: &str) -> String {
    format!("{}::{}", owner, instance)
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Discover roots and assign parent paths.
pub fn build_hierarchy(model: &Model, index: &ModelIndex) -> Result<HierarchyInfo, FatalError> {
    // Composition graph nodes: composite definitions, in sorted name
    // order so SCC numbering and every tie-break is deterministic.
    let composed: Vec<&ComponentDefinition> = {
        let mut defs: Vec<&ComponentDefinition> = model
            .definitions
            .iter()
            .filter(|d| d.is_composite())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    };
    if composed.is_empty() {
        return Err(FatalError::NoCompositeRoot);
    }

    let node_of: BTreeMap<&str, usize> = composed
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.as_str(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); composed.len()];
    for (from, def) in composed.iter().enumerate() {
        let config = def.configuration.as_ref().expect("composed defs have one");
        let mut targets = BTreeSet::new();
        for inst in &config.instances {
            if let Some(&to) = node_of.get(inst.definition.as_str()) {
                targets.insert(to);
            }
        }
        adjacency[from] = targets.into_iter().collect();
    }

    let sccs = tarjan_sccs(&adjacency);
    let roots = select_roots(&composed, &sccs, &adjacency);

    let mut paths = BTreeMap::new();
    for root in &roots {
        let def = index
            .definition(model, root)
            .expect("root came from the definition table");
        let mut on_path = vec![def.name.as_str()];
        assign_paths(model, index, def, root, &mut on_path, &mut paths);
    }

    Ok(HierarchyInfo { roots, paths })
}

// ── Root selection ──────────────────────────────────────────────────────────

/// The root set over the SCC condensation: SCCs that reach every other
/// SCC supply it jointly; otherwise every zero-indegree SCC does
/// (independent top-level systems).
fn select_roots(
    composed: &[&ComponentDefinition],
    sccs: &[Vec<usize>],
    adjacency: &[Vec<usize>],
) -> Vec<String> {
    let mut scc_of = vec![0usize; composed.len()];
    for (id, members) in sccs.iter().enumerate() {
        for &node in members {
            scc_of[node] = id;
        }
    }

    let mut scc_adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); sccs.len()];
    let mut indegree = vec![0usize; sccs.len()];
    for (from, targets) in adjacency.iter().enumerate() {
        for &to in targets {
            let (sf, st) = (scc_of[from], scc_of[to]);
            if sf != st && scc_adj[sf].insert(st) {
                indegree[st] += 1;
            }
        }
    }

    let full_reachers: Vec<usize> = (0..sccs.len())
        .filter(|&s| reachable_count(s, &scc_adj) == sccs.len())
        .collect();

    let root_sccs: Vec<usize> = if !full_reachers.is_empty() {
        full_reachers
    } else {
        (0..sccs.len()).filter(|&s| indegree[s] == 0).collect()
    };

    let mut roots: Vec<String> = root_sccs
        .iter()
        .flat_map(|&s| sccs[s].iter().map(|&n| composed[n].name.clone()))
        .collect();
    roots.sort_unstable();
    roots.dedup();
    roots
}

fn reachable_count(start: usize, adj: &[BTreeSet<usize>]) -> usize {
    let mut seen = vec![false; adj.len()];
    let mut stack = vec![start];
    let mut count = 0;
    while let Some(node) = stack.pop() {
        if seen[node] {
            continue;
        }
        seen[node] = true;
        count += 1;
        stack.extend(adj[node].iter().copied());
    }
    count
}

// ── Tarjan's algorithm ──────────────────────────────────────────────────────

struct TarjanState<'a> {
    adjacency: &'a [Vec<usize>],
    counter: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
    sccs: Vec<Vec<usize>>,
}

/// Strongly connected components of a directed graph given as
/// adjacency lists. Components come out in Tarjan's completion order;
/// members are sorted for stable downstream iteration.
fn tarjan_sccs(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut state = TarjanState {
        adjacency,
        counter: 0,
        index: vec![None; n],
        lowlink: vec![0; n],
        stack: Vec::new(),
        on_stack: vec![false; n],
        sccs: Vec::new(),
    };
    for v in 0..n {
        if state.index[v].is_none() {
            strongconnect(v, &mut state);
        }
    }
    state.sccs
}

fn strongconnect(v: usize, state: &mut TarjanState) {
    state.index[v] = Some(state.counter);
    state.lowlink[v] = state.counter;
    state.counter += 1;
    state.stack.push(v);
    state.on_stack[v] = true;

    for i in 0..state.adjacency[v].len() {
        let w = state.adjacency[v][i];
        match state.index[w] {
            None => {
                strongconnect(w, state);
                state.lowlink[v] = state.lowlink[v].min(state.lowlink[w]);
            }
            Some(w_index) if state.on_stack[w] => {
                state.lowlink[v] = state.lowlink[v].min(w_index);
            }
            Some(_) => {}
        }
    }

    if state.lowlink[v] == state.index[v].expect("just assigned") {
        let mut members = Vec::new();
        loop {
            let w = state.stack.pop().expect("stack holds the component");
            state.on_stack[w] = false;
            members.push(w);
            if w == v {
                break;
            }
        }
        members.sort_unstable();
        state.sccs.push(members);
    }
}

// ── Path assignment ─────────────────────────────────────────────────────────

/// Depth-first path assignment over explicit instance sites only. A
/// definition already on the current descent path is not re-entered,
/// which cuts composition cycles. A site whose key is already assigned
/// keeps its first path, and its subtree is already covered.
fn assign_paths<'m>(
    model: &'m Model,
    index: &ModelIndex,
    def: &'m ComponentDefinition,
    prefix: &str,
    on_path: &mut Vec<&'m str>,
    paths: &mut BTreeMap<String, String>,
) {
    let Some(config) = &def.configuration else {
        return;
    };
    for inst in &config.instances {
        let key = site_key(&def.name, &inst.name);
        if paths.contains_key(&key) {
            continue;
        }
        let path = format!("{}.{}", prefix, inst.name);
        paths.insert(key, path.clone());

        if let Some(target) = index.definition(model, &inst.definition) {
            if target.is_composite() && !on_path.contains(&target.name.as_str()) {
                on_path.push(&target.name);
                assign_paths(model, index, target, &path, on_path, paths);
                on_path.pop();
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;
    use crate::ir::{Configuration, InstanceDecl, PortSignature, Span};

    fn port(name: &str) -> PortSignature {
        PortSignature {
            name: name.to_string(),
            direction: Default::default(),
            port_type: String::new(),
            span: Span::default(),
        }
    }

    fn leaf(name: &str) -> ComponentDefinition {
        ComponentDefinition {
            name: name.to_string(),
            ports: vec![port("p")],
            configuration: None,
            span: Span::default(),
        }
    }

    fn instance(name: &str, definition: &str) -> InstanceDecl {
        InstanceDecl {
            name: name.to_string(),
            definition: definition.to_string(),
            aliases: Vec::new(),
            ports: Vec::new(),
            span: Span::default(),
        }
    }

    fn composite(name: &str, instances: Vec<InstanceDecl>) -> ComponentDefinition {
        ComponentDefinition {
            name: name.to_string(),
            ports: Vec::new(),
            configuration: Some(Configuration {
                instances,
                ..Default::default()
            }),
            span: Span::default(),
        }
    }

    fn hierarchy(model: &Model) -> Result<HierarchyInfo, FatalError> {
        let index = build_index(model).unwrap().index;
        build_hierarchy(model, &index)
    }

    #[test]
    fn single_composite_root() {
        let model = Model {
            definitions: vec![
                leaf("Sub1"),
                leaf("Sub2"),
                composite("TopCFD", vec![instance("s1", "Sub1"), instance("s2", "Sub2")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(info.roots, vec!["TopCFD"]);
        assert_eq!(info.parent_path("TopCFD", "s1"), Some("TopCFD.s1"));
        assert_eq!(info.parent_path("TopCFD", "s2"), Some("TopCFD.s2"));
    }

    #[test]
    fn nested_paths_extend_recursively() {
        let model = Model {
            definitions: vec![
                leaf("Leaf"),
                composite("Mid", vec![instance("inner", "Leaf")]),
                composite("Top", vec![instance("m", "Mid")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(info.roots, vec!["Top"]);
        assert_eq!(info.parent_path("Top", "m"), Some("Top.m"));
        assert_eq!(info.parent_path("Mid", "inner"), Some("Top.m.inner"));
    }

    #[test]
    fn mutual_composition_terminates_with_roots() {
        let model = Model {
            definitions: vec![
                composite("A", vec![instance("b", "B")]),
                composite("B", vec![instance("a", "A")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        // The two-member SCC reaches everything, so both are roots.
        assert_eq!(info.roots, vec!["A", "B"]);
        assert_eq!(info.parent_path("A", "b"), Some("A.b"));
        assert_eq!(info.parent_path("B", "a"), Some("A.b.a"));
    }

    #[test]
    fn self_composition_terminates() {
        let model = Model {
            definitions: vec![composite("Rec", vec![instance("child", "Rec")])],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(info.roots, vec!["Rec"]);
        assert_eq!(info.parent_path("Rec", "child"), Some("Rec.child"));
    }

    #[test]
    fn independent_systems_yield_multiple_roots() {
        let model = Model {
            definitions: vec![
                leaf("LeafA"),
                leaf("LeafB"),
                composite("SysOne", vec![instance("a", "LeafA")]),
                composite("SysTwo", vec![instance("b", "LeafB")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(info.roots, vec!["SysOne", "SysTwo"]);
    }

    #[test]
    fn shared_subsystem_is_not_a_root() {
        let model = Model {
            definitions: vec![
                leaf("Leaf"),
                composite("Shared", vec![instance("l", "Leaf")]),
                composite("Main", vec![instance("s", "Shared")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(info.roots, vec!["Main"]);
        assert_eq!(info.parent_path("Shared", "l"), Some("Main.s.l"));
    }

    #[test]
    fn no_composite_definition_is_fatal() {
        let model = Model {
            definitions: vec![leaf("OnlyLeaf")],
            ..Default::default()
        };
        assert!(matches!(
            hierarchy(&model),
            Err(FatalError::NoCompositeRoot)
        ));
    }

    #[test]
    fn repeated_instantiation_keeps_first_path() {
        let model = Model {
            definitions: vec![
                leaf("Leaf"),
                composite("Mid", vec![instance("inner", "Leaf")]),
                composite("Top", vec![instance("m1", "Mid"), instance("m2", "Mid")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(info.parent_path("Top", "m1"), Some("Top.m1"));
        assert_eq!(info.parent_path("Top", "m2"), Some("Top.m2"));
        // The shared definition's site resolves under the first site
        // encountered in deterministic traversal order.
        assert_eq!(info.parent_path("Mid", "inner"), Some("Top.m1.inner"));
    }

    #[test]
    fn display_lists_roots_and_paths() {
        let model = Model {
            definitions: vec![
                leaf("Sub1"),
                composite("Top", vec![instance("s1", "Sub1")]),
            ],
            ..Default::default()
        };
        let info = hierarchy(&model).unwrap();
        assert_eq!(format!("{info}"), "roots: Top\n  Top.s1\n");
    }
}
