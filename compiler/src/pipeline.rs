// pipeline.rs — Resolution state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a
// given terminal PassId. Passes whose artifacts are already populated
// are skipped, so the runner is idempotent across calls with different
// terminals on one state.
//
// Preconditions: the model is canonical IR (ingest already ran).
// Postconditions: artifacts for all required passes are populated, or
//                 has_error is set, or a fatal error was returned.
// Failure modes: structural fatals from index/hierarchy construction;
//                any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete after each pass for immediate
//               display; verbose timing lines on stderr.

use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::alias::AliasMap;
use crate::binding::{ConnectorDescriptor, UnresolvedBinding};
use crate::diag::{DiagLevel, Diagnostic, FatalError};
use crate::hierarchy::HierarchyInfo;
use crate::index::ModelIndex;
use crate::ir::Model;
use crate::pass::{descriptor, required_passes, PassId};
use crate::report;

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds the model, all pass artifacts, and accumulated diagnostics.
pub struct ResolutionState {
    pub model: Model,
    pub index: Option<ModelIndex>,
    pub aliases: Option<AliasMap>,
    pub hierarchy: Option<HierarchyInfo>,
    pub descriptors: Option<Vec<ConnectorDescriptor>>,
    pub unresolved: Option<Vec<UnresolvedBinding>>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl ResolutionState {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            index: None,
            aliases: None,
            hierarchy: None,
            descriptors: None,
            unresolved: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for hermetic runs and cache-key use.
///
/// `model_hash`: SHA-256 of the model's canonical compact JSON.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    #[serde(serialize_with = "serialize_hash_hex")]
    pub model_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the model hash (64 characters).
    pub fn model_hash_hex(&self) -> String {
        bytes_to_hex(&self.model_hash)
    }

    /// Serialize provenance as a JSON string for external build info.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"model_hash\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.model_hash_hex(),
            self.compiler_version,
        )
    }
}

fn serialize_hash_hex<S: Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&bytes_to_hex(hash))
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Compute provenance from the model's canonical JSON.
pub fn compute_provenance(model: &Model) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(model.canonical_json().as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);

    Provenance {
        model_hash: hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Helper: check diagnostics for errors ───────────────────────────────────

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, verbose, error check.
/// Returns true when error diagnostics were found.
fn finish_pass(
    state: &mut ResolutionState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> bool {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "adlc: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if is_err {
        state.has_error = true;
    }
    is_err
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose →
/// error check. Structural fatals abort immediately.
pub fn run_pipeline(
    state: &mut ResolutionState,
    terminal: PassId,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), FatalError> {
    for &pass_id in &required_passes(terminal) {
        match pass_id {
            PassId::BuildIndex => {
                if state.index.is_some() {
                    continue;
                }
                let t = Instant::now();
                let result = crate::index::build_index(&state.model)?;
                let elapsed = t.elapsed();
                state.index = Some(result.index);
                if finish_pass(
                    state,
                    pass_id,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                ) {
                    return Ok(());
                }
            }
            PassId::ResolveAliases => {
                if state.aliases.is_some() {
                    continue;
                }
                let t = Instant::now();
                let result = crate::alias::build_alias_map(
                    &state.model,
                    state.index.as_ref().unwrap(),
                );
                let elapsed = t.elapsed();
                state.aliases = Some(result.aliases);
                if finish_pass(
                    state,
                    pass_id,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                ) {
                    return Ok(());
                }
            }
            PassId::BuildHierarchy => {
                if state.hierarchy.is_some() {
                    continue;
                }
                let t = Instant::now();
                let hierarchy = crate::hierarchy::build_hierarchy(
                    &state.model,
                    state.index.as_ref().unwrap(),
                )?;
                let elapsed = t.elapsed();
                state.hierarchy = Some(hierarchy);
                if finish_pass(
                    state,
                    pass_id,
                    Vec::new(),
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                ) {
                    return Ok(());
                }
            }
            PassId::NormalizeBindings => {
                if state.descriptors.is_some() {
                    continue;
                }
                let t = Instant::now();
                let result = crate::binding::normalize(
                    &state.model,
                    state.index.as_ref().unwrap(),
                    state.aliases.as_ref().unwrap(),
                );
                let elapsed = t.elapsed();
                state.descriptors = Some(result.descriptors);
                state.unresolved = Some(result.unresolved);
                if finish_pass(
                    state,
                    pass_id,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                ) {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

// ── Top-level convenience ──────────────────────────────────────────────────

/// Everything the excluded emitter consumes. Keyed deterministically:
/// repeated runs on an unchanged model serialize byte-identically.
#[derive(Debug, Serialize)]
pub struct ResolvedModel {
    pub descriptors: Vec<ConnectorDescriptor>,
    pub hierarchy: HierarchyInfo,
    pub provenance: Provenance,
}

impl ResolvedModel {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("resolved model serialization cannot fail")
    }
}

/// Run the whole resolution pass over one model: index, aliases,
/// hierarchy, binding normalization, and the fail-closed report gate.
/// Never produces partial output: any unresolved binding turns the
/// entire run into one aggregated fatal error.
pub fn resolve_model(model: Model) -> Result<ResolvedModel, FatalError> {
    let mut state = ResolutionState::new(model);
    state.provenance = Some(compute_provenance(&state.model));

    run_pipeline(&mut state, PassId::NormalizeBindings, false, |_, _| {})?;
    run_pipeline(&mut state, PassId::BuildHierarchy, false, |_, _| {})?;

    let unresolved = state.unresolved.take().unwrap_or_default();
    report::report(&unresolved, state.index.as_ref().unwrap())?;

    Ok(ResolvedModel {
        descriptors: state.descriptors.take().unwrap_or_default(),
        hierarchy: state.hierarchy.take().expect("hierarchy pass ran"),
        provenance: state.provenance.take().expect("provenance computed above"),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        ComponentDefinition, Configuration, ConnectorUse, InstanceDecl, PortSignature, Span,
    };

    fn port(name: &str, port_type: &str) -> PortSignature {
        PortSignature {
            name: name.to_string(),
            direction: Default::default(),
            port_type: port_type.to_string(),
            span: Span::default(),
        }
    }

    fn leaf(name: &str, ports: Vec<PortSignature>) -> ComponentDefinition {
        ComponentDefinition {
            name: name.to_string(),
            ports,
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

    fn scenario_model() -> Model {
        Model {
            definitions: vec![
                leaf("Sensor", vec![port("reading", "Temp")]),
                leaf("Controller", vec![port("cmd", "Command")]),
                ComponentDefinition {
                    name: "Top".to_string(),
                    ports: Vec::new(),
                    configuration: Some(Configuration {
                        instances: vec![
                            instance("sensor", "Sensor"),
                            instance("controller", "Controller"),
                        ],
                        connectors: vec![ConnectorUse {
                            name: "link".to_string(),
                            definition: None,
                            owner: None,
                            left: "reading".to_string(),
                            right: "cmd".to_string(),
                            span: Span::default(),
                        }],
                        ..Default::default()
                    }),
                    span: Span::default(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn resolve_model_end_to_end() {
        let resolved = resolve_model(scenario_model()).unwrap();
        assert_eq!(resolved.descriptors.len(), 1);
        assert_eq!(resolved.hierarchy.roots, vec!["Top"]);
        assert_eq!(
            resolved.hierarchy.parent_path("Top", "sensor"),
            Some("Top.sensor")
        );
    }

    #[test]
    fn runner_skips_already_populated_passes() {
        let mut state = ResolutionState::new(scenario_model());
        let mut runs = Vec::new();
        run_pipeline(&mut state, PassId::NormalizeBindings, false, |p, _| {
            runs.push(p)
        })
        .unwrap();
        run_pipeline(&mut state, PassId::BuildHierarchy, false, |p, _| {
            runs.push(p)
        })
        .unwrap();
        assert_eq!(
            runs,
            vec![
                PassId::BuildIndex,
                PassId::ResolveAliases,
                PassId::NormalizeBindings,
                PassId::BuildHierarchy,
            ]
        );
    }

    #[test]
    fn provenance_is_stable_and_input_sensitive() {
        let a = compute_provenance(&scenario_model());
        let b = compute_provenance(&scenario_model());
        assert_eq!(a.model_hash, b.model_hash);
        assert_eq!(a.model_hash_hex().len(), 64);

        let mut changed = scenario_model();
        changed.definitions[0].name = "Sensor2".to_string();
        changed.definitions[2]
            .configuration
            .as_mut()
            .unwrap()
            .instances[0]
            .definition = "Sensor2".to_string();
        let c = compute_provenance(&changed);
        assert_ne!(a.model_hash, c.model_hash);
    }

    #[test]
    fn repeated_runs_serialize_identically() {
        let first = resolve_model(scenario_model()).unwrap().to_json();
        let second = resolve_model(scenario_model()).unwrap().to_json();
        assert_eq!(first, second);
    }

    #[test]
    fn unresolved_bindings_fail_the_whole_run() {
        let mut model = scenario_model();
        model.definitions[2]
            .configuration
            .as_mut()
            .unwrap()
            .connectors
            .push(ConnectorUse {
                name: "broken".to_string(),
                definition: None,
                owner: None,
                left: "ghost".to_string(),
                right: "cmd".to_string(),
                span: Span::default(),
            });
        let err = resolve_model(model).unwrap_err();
        match err {
            FatalError::UnresolvedBindings { entries, report } => {
                assert_eq!(entries.len(), 1);
                assert!(report.contains("connector 'broken'"));
                assert!(report.contains("'ghost' is unknown"));
            }
            other => panic!("expected UnresolvedBindings, got {other:?}"),
        }
    }

    #[test]
    fn no_composite_root_is_fatal() {
        let model = Model {
            definitions: vec![leaf("OnlyLeaf", vec![port("p", "T")])],
            ..Default::default()
        };
        assert!(matches!(
            resolve_model(model),
            Err(FatalError::NoCompositeRoot)
        ));
    }
}
