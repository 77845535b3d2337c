// alias.rs — Per-instance port alias resolution
//
// Second resolution pass. Maps each locally declared `alias : TypeName`
// to a canonical port of the instance's definition when the type match
// is unambiguous. Ambiguous aliases are stored present-but-unmapped;
// the scope resolver may still disambiguate them later with extra
// context, and the alias token stays usable as a literal port name.
//
// Preconditions: `index` was built from `model`.
// Postconditions: every declared alias has an entry, mapped or not.
// Failure modes: none; ambiguity is deferred, never errored here.
// Side effects: none.

use std::collections::BTreeMap;

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::index::ModelIndex;
use crate::ir::Model;

// ── Public types ────────────────────────────────────────────────────────────

/// Alias tables, parallel to the index's instance table. An entry of
/// `None` means the alias is declared but has no canonical mapping.
#[derive(Debug, Default)]
pub struct AliasMap {
    entries: Vec<BTreeMap<String, Option<String>>>,
}

impl AliasMap {
    pub fn declares(&self, inst: usize, alias: &str) -> bool {
        self.entries
            .get(inst)
            .is_some_and(|m| m.contains_key(alias))
    }

    /// The canonical port an alias maps to, when the mapping succeeded.
    pub fn canonical(&self, inst: usize, alias: &str) -> Option<&str> {
        self.entries
            .get(inst)
            .and_then(|m| m.get(alias))
            .and_then(|p| p.as_deref())
    }
}

/// Result of alias resolution.
#[derive(Debug)]
pub struct AliasResult {
    pub aliases: AliasMap,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve every per-instance alias declaration in the model.
pub fn build_alias_map(model: &Model, index: &ModelIndex) -> AliasResult {
    let mut aliases = AliasMap::default();
    let mut diagnostics = Vec::new();

    for entry in &index.instances {
        let mut table = BTreeMap::new();

        let decl = entry.owner.as_deref().and_then(|owner| {
            index
                .definition(model, owner)?
                .configuration
                .as_ref()?
                .instances
                .iter()
                .find(|i| i.name == entry.name)
        });

        if let Some(decl) = decl {
            let def_ports = index
                .definition(model, &entry.definition)
                .map(|d| d.ports.as_slice())
                .unwrap_or(&[]);

            for alias in &decl.aliases {
                let matches: Vec<&str> = def_ports
                    .iter()
                    .filter(|p| type_name_matches(&p.port_type, &alias.type_name))
                    .map(|p| p.name.as_str())
                    .collect();

                let canonical = match matches.as_slice() {
                    [only] => Some(only.to_string()),
                    // Sole-port fallback: a one-port definition leaves no
                    // room for ambiguity regardless of the declared type.
                    [] if def_ports.len() == 1 => Some(def_ports[0].name.clone()),
                    _ => None,
                };

                if canonical.is_none() {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagLevel::Warning,
                            alias.span,
                            format!(
                                "alias '{}' on instance '{}' has no unambiguous port of type '{}'",
                                alias.alias, entry.name, alias.type_name
                            ),
                        )
                        .with_code(codes::W0102),
                    );
                }
                table.insert(alias.alias.clone(), canonical);
            }
        }

        aliases.entries.push(table);
    }

    AliasResult {
        aliases,
        diagnostics,
    }
}

// ── Type-name matching heuristic ────────────────────────────────────────────

/// Heuristic type-name comparison used for alias mapping and role-based
/// disambiguation: exact match, or equality of the final segment after
/// stripping `::` and `.` qualifiers. Never a full compatibility check.
pub(crate) fn type_name_matches(declared: &str, wanted: &str) -> bool {
    if declared.is_empty() || wanted.is_empty() {
        return false;
    }
    declared == wanted || strip_qualifiers(declared) == strip_qualifiers(wanted)
}

fn strip_qualifiers(name: &str) -> &str {
    let name = name.rsplit("::").next().unwrap_or(name);
    name.rsplit('.').next().unwrap_or(name)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;
    use crate::ir::{
        AliasDecl, ComponentDefinition, Configuration, InstanceDecl, PortSignature, Span,
    };

    fn port(name: &str, port_type: &str) -> PortSignature {
        PortSignature {
            name: name.to_string(),
            direction: Default::default(),
            port_type: port_type.to_string(),
            span: Span::default(),
        }
    }

    fn model_with_alias(ports: Vec<PortSignature>, alias: &str, type_name: &str) -> Model {
        Model {
            definitions: vec![
                ComponentDefinition {
                    name: "Leaf".to_string(),
                    ports,
                    configuration: None,
                    span: Span::default(),
                },
                ComponentDefinition {
                    name: "Top".to_string(),
                    ports: Vec::new(),
                    configuration: Some(Configuration {
                        instances: vec![InstanceDecl {
                            name: "x".to_string(),
                            definition: "Leaf".to_string(),
                            aliases: vec![AliasDecl {
                                alias: alias.to_string(),
                                type_name: type_name.to_string(),
                                span: Span::default(),
                            }],
                            ports: Vec::new(),
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

    fn aliases_for(model: &Model) -> AliasResult {
        let index = build_index(model).unwrap().index;
        build_alias_map(model, &index)
    }

    #[test]
    fn exact_type_match_maps() {
        let model = model_with_alias(
            vec![port("status", "State"), port("cmd", "Command")],
            "st",
            "State",
        );
        let result = aliases_for(&model);
        assert_eq!(result.aliases.canonical(0, "st"), Some("status"));
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn qualified_suffix_match_maps() {
        let model = model_with_alias(
            vec![port("status", "core::State"), port("cmd", "Command")],
            "st",
            "State",
        );
        let result = aliases_for(&model);
        assert_eq!(result.aliases.canonical(0, "st"), Some("status"));
    }

    #[test]
    fn sole_port_fallback_maps() {
        let model = model_with_alias(vec![port("status", "State")], "st", "NoSuchType");
        let result = aliases_for(&model);
        assert_eq!(result.aliases.canonical(0, "st"), Some("status"));
    }

    #[test]
    fn ambiguous_type_match_is_deferred_not_errored() {
        let model = model_with_alias(
            vec![port("a", "State"), port("b", "State")],
            "st",
            "State",
        );
        let result = aliases_for(&model);
        assert!(result.aliases.declares(0, "st"));
        assert_eq!(result.aliases.canonical(0, "st"), None);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].level, DiagLevel::Warning);
    }

    #[test]
    fn unknown_type_on_multi_port_definition_is_unmapped() {
        let model = model_with_alias(
            vec![port("a", "State"), port("b", "Command")],
            "st",
            "Nothing",
        );
        let result = aliases_for(&model);
        assert!(result.aliases.declares(0, "st"));
        assert_eq!(result.aliases.canonical(0, "st"), None);
    }

    #[test]
    fn type_matching_rules() {
        assert!(type_name_matches("State", "State"));
        assert!(type_name_matches("core::State", "State"));
        assert!(type_name_matches("pkg.State", "other::State"));
        assert!(!type_name_matches("State", "Command"));
        assert!(!type_name_matches("", "State"));
    }
}
