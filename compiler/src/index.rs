// index.rs — Model index construction
//
// First resolution pass. Builds the lookup tables every later pass
// consumes: definitions by name, the flat instance table with owning
// definitions, and the per-instance port exposure index (declared
// ports, delegation outer names, instance-local port uses).
//
// Preconditions: `model` is a canonical IR from the ingest adapter.
// Postconditions: every instance entry references an existing
//                 definition; exposure sets are complete and immutable.
// Failure modes: `MissingDefinition` when an instance or typed
//                connector use references an absent definition.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};

use crate::diag::{codes, DiagLevel, Diagnostic, FatalError};
use crate::id::{IdAllocator, InstId};
use crate::ir::{ComponentDefinition, ConnectorUse, Model, Span};

// ── Public types ────────────────────────────────────────────────────────────

/// One instance site in the model. `owner` names the composite
/// definition whose configuration declares the instance.
#[derive(Debug, Clone)]
pub struct InstanceEntry {
    pub id: InstId,
    pub name: String,
    pub definition: String,
    pub owner: Option<String>,
    pub span: Span,
}

/// Lookup tables over one model. Keyed with `BTreeMap` throughout so
/// iteration order, and every downstream tie-break, is deterministic.
#[derive(Debug, Default)]
pub struct ModelIndex {
    /// Definition name → position in `model.definitions`.
    pub definitions: BTreeMap<String, usize>,
    /// Connector definition name → position in `model.connector_definitions`.
    pub connector_definitions: BTreeMap<String, usize>,
    /// All instance sites, in model order.
    pub instances: Vec<InstanceEntry>,
    /// Instance name → positions in `instances`.
    by_name: BTreeMap<String, Vec<usize>>,
    /// Flattened port exposure per instance (parallel to `instances`):
    /// port name → declared type name (empty when undeterminable).
    exposure: Vec<BTreeMap<String, String>>,
}

impl ModelIndex {
    /// Look up a component definition by name.
    pub fn definition<'m>(
        &self,
        model: &'m Model,
        name: &str,
    ) -> Option<&'m ComponentDefinition> {
        self.definitions.get(name).map(|&i| &model.definitions[i])
    }

    /// All instance sites carrying this name.
    pub fn instances_named(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Instance sites whose enclosing scope matches. `None` selects
    /// sites outside any configuration.
    pub fn in_scope(&self, scope: Option<&str>) -> Vec<usize> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, e)| e.owner.as_deref() == scope)
            .map(|(i, _)| i)
            .collect()
    }

    /// The flattened exposure set of an instance site.
    pub fn exposure(&self, inst: usize) -> &BTreeMap<String, String> {
        &self.exposure[inst]
    }

    pub fn exposes(&self, inst: usize, port: &str) -> bool {
        self.exposure[inst].contains_key(port)
    }

    /// Declared type of an exposed port, when the frontend recorded one.
    pub fn port_type(&self, inst: usize, port: &str) -> Option<&str> {
        self.exposure[inst]
            .get(port)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// Result of index construction.
#[derive(Debug)]
pub struct IndexResult {
    pub index: ModelIndex,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Build the model index. Fails fast on a missing definition; nothing
/// downstream is meaningful without a closed definition table.
pub fn build_index(model: &Model) -> Result<IndexResult, FatalError> {
    let mut index = ModelIndex::default();
    let mut diagnostics = Vec::new();
    let mut ids = IdAllocator::new();

    for (i, def) in model.definitions.iter().enumerate() {
        index.definitions.insert(def.name.clone(), i);
    }
    for (i, cd) in model.connector_definitions.iter().enumerate() {
        index.connector_definitions.insert(cd.name.clone(), i);
    }

    // Instance table, with per-configuration duplicate detection.
    for def in &model.definitions {
        let Some(config) = &def.configuration else {
            continue;
        };
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for inst in &config.instances {
            if !index.definitions.contains_key(&inst.definition) {
                return Err(FatalError::MissingDefinition {
                    instance: inst.name.clone(),
                    definition: inst.definition.clone(),
                });
            }
            if !seen.insert(&inst.name) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        inst.span,
                        format!(
                            "duplicate instance '{}' in configuration of '{}'",
                            inst.name, def.name
                        ),
                    )
                    .with_code(codes::W0101),
                );
            }
            let pos = index.instances.len();
            index.instances.push(InstanceEntry {
                id: ids.alloc_inst(),
                name: inst.name.clone(),
                definition: inst.definition.clone(),
                owner: Some(def.name.clone()),
                span: inst.span,
            });
            index.by_name.entry(inst.name.clone()).or_default().push(pos);
        }
    }

    // Typed connector uses must reference an existing connector definition.
    for site in all_connector_uses(model) {
        if let Some(def_name) = &site.definition {
            if !index.connector_definitions.contains_key(def_name) {
                return Err(FatalError::MissingDefinition {
                    instance: site.name.clone(),
                    definition: def_name.clone(),
                });
            }
        }
    }

    // Exposure: declared ports, delegation outer names, instance-local
    // port uses. A named port is never dropped, even untyped.
    for pos in 0..index.instances.len() {
        let entry = &index.instances[pos];
        let mut exposed = BTreeMap::new();

        if let Some(def) = index.definition(model, &entry.definition) {
            for port in &def.ports {
                exposed.insert(port.name.clone(), port.port_type.clone());
            }
            if let Some(config) = &def.configuration {
                for delegation in &config.delegations {
                    let inner_type = delegated_port_type(model, &index, def, &delegation.inner);
                    exposed
                        .entry(delegation.outer.clone())
                        .or_insert(inner_type.unwrap_or_default());
                }
            }
        }

        let owner_def = entry.owner.clone();
        if let Some(decl) = find_instance_decl(model, owner_def.as_deref(), &entry.name) {
            for port in &decl.ports {
                exposed.insert(port.name.clone(), port.port_type.clone());
            }
        }

        index.exposure.push(exposed);
    }

    Ok(IndexResult { index, diagnostics })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Every connector use in the model: standalone, nested, and those in
/// connector definitions' own binding lists.
pub fn all_connector_uses(model: &Model) -> impl Iterator<Item = &ConnectorUse> {
    let nested = model
        .definitions
        .iter()
        .filter_map(|d| d.configuration.as_ref())
        .flat_map(|c| c.connectors.iter());
    let in_defs = model.connector_definitions.iter().flat_map(|cd| cd.bindings.iter());
    model.connectors.iter().chain(nested).chain(in_defs)
}

fn find_instance_decl<'m>(
    model: &'m Model,
    owner: Option<&str>,
    name: &str,
) -> Option<&'m crate::ir::InstanceDecl> {
    let owner = owner?;
    model
        .definitions
        .iter()
        .find(|d| d.name == owner)?
        .configuration
        .as_ref()?
        .instances
        .iter()
        .find(|i| i.name == name)
}

/// Best-effort type of a delegation's inner port, for the exposure
/// index. The inner token is `instance.port` within the delegating
/// definition's configuration; anything else yields no type.
fn delegated_port_type(
    model: &Model,
    index: &ModelIndex,
    def: &ComponentDefinition,
    inner: &str,
) -> Option<String> {
    let (inst_name, port_name) = inner.rsplit_once('.')?;
    let config = def.configuration.as_ref()?;
    let inst = config.instances.iter().find(|i| i.name == inst_name)?;
    let inner_def = index.definition(model, &inst.definition)?;
    inner_def
        .ports
        .iter()
        .find(|p| p.name == port_name)
        .map(|p| p.port_type.clone())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Configuration, Delegation, InstanceDecl, PortSignature};

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

    fn composite(name: &str, config: Configuration) -> ComponentDefinition {
        ComponentDefinition {
            name: name.to_string(),
            ports: Vec::new(),
            configuration: Some(config),
            span: Span::default(),
        }
    }

    fn two_level_model() -> Model {
        Model {
            definitions: vec![
                leaf("Sensor", vec![port("reading", "Temp")]),
                leaf("Controller", vec![port("cmd", "Command")]),
                composite(
                    "Top",
                    Configuration {
                        instances: vec![instance("s", "Sensor"), instance("c", "Controller")],
                        ..Default::default()
                    },
                ),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn instances_collected_in_model_order() {
        let result = build_index(&two_level_model()).unwrap();
        let names: Vec<_> = result.index.instances.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["s", "c"]);
        assert_eq!(result.index.instances[0].owner.as_deref(), Some("Top"));
    }

    #[test]
    fn declared_ports_exposed() {
        let result = build_index(&two_level_model()).unwrap();
        assert!(result.index.exposes(0, "reading"));
        assert_eq!(result.index.port_type(0, "reading"), Some("Temp"));
        assert!(!result.index.exposes(0, "cmd"));
    }

    #[test]
    fn delegation_outer_name_exposed_on_instances() {
        let mut model = two_level_model();
        // Mid wraps a Sensor and re-exposes its reading as `out`.
        model.definitions.push(composite(
            "Mid",
            Configuration {
                instances: vec![instance("inner", "Sensor")],
                delegations: vec![Delegation {
                    inner: "inner.reading".to_string(),
                    outer: "out".to_string(),
                    span: Span::default(),
                }],
                ..Default::default()
            },
        ));
        model.definitions.push(composite(
            "Wrap",
            Configuration {
                instances: vec![instance("m", "Mid")],
                ..Default::default()
            },
        ));
        let result = build_index(&model).unwrap();
        let m = result
            .index
            .instances
            .iter()
            .position(|e| e.name == "m")
            .unwrap();
        assert!(result.index.exposes(m, "out"));
        assert_eq!(result.index.port_type(m, "out"), Some("Temp"));
    }

    #[test]
    fn missing_definition_is_fatal() {
        let mut model = two_level_model();
        model.definitions[2]
            .configuration
            .as_mut()
            .unwrap()
            .instances
            .push(instance("ghost", "Phantom"));
        let err = build_index(&model).unwrap_err();
        match err {
            FatalError::MissingDefinition {
                instance,
                definition,
            } => {
                assert_eq!(instance, "ghost");
                assert_eq!(definition, "Phantom");
            }
            other => panic!("expected MissingDefinition, got {other:?}"),
        }
    }

    #[test]
    fn missing_connector_definition_is_fatal() {
        let mut model = two_level_model();
        model.connectors.push(ConnectorUse {
            name: "link".to_string(),
            definition: Some("NoSuchLink".to_string()),
            owner: None,
            left: "reading".to_string(),
            right: "cmd".to_string(),
            span: Span::default(),
        });
        assert!(matches!(
            build_index(&model),
            Err(FatalError::MissingDefinition { .. })
        ));
    }

    #[test]
    fn duplicate_instance_warns() {
        let mut model = two_level_model();
        model.definitions[2]
            .configuration
            .as_mut()
            .unwrap()
            .instances
            .push(instance("s", "Sensor"));
        let result = build_index(&model).unwrap();
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("duplicate instance 's'"));
    }

    #[test]
    fn instance_local_ports_exposed() {
        let mut model = two_level_model();
        model.definitions[2]
            .configuration
            .as_mut()
            .unwrap()
            .instances[0]
            .ports
            .push(port("probe", "Debug"));
        let result = build_index(&model).unwrap();
        assert!(result.index.exposes(0, "probe"));
    }
}
