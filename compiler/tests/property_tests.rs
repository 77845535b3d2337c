// Property-based tests for resolution invariants.
//
// Three categories:
// 1. Determinism: repeated runs over one model are byte-identical
// 2. Hierarchy: parent paths form a forest anchored at the root set
// 3. Fail-closed: injected unresolvable endpoints always abort the run
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use adlc::diag::FatalError;
use adlc::ir::{
    ComponentDefinition, Configuration, ConnectorUse, InstanceDecl, Model, PortSignature, Span,
};
use adlc::pipeline::{compute_provenance, resolve_model};
use proptest::prelude::*;

// ── Model generator ─────────────────────────────────────────────────────────

/// A closed synthetic model: `leaves` leaf definitions with distinct
/// typed ports, one composite instantiating each once, and a ring of
/// fully qualified bindings (always resolvable by construction).
fn synthetic_model(leaves: usize, ports_per: usize) -> Model {
    let mut definitions = Vec::new();
    for i in 0..leaves {
        let ports = (0..ports_per)
            .map(|j| PortSignature {
                name: format!("p{i}_{j}"),
                direction: Default::default(),
                port_type: format!("T{j}"),
                span: Span::default(),
            })
            .collect();
        definitions.push(ComponentDefinition {
            name: format!("L{i}"),
            ports,
            configuration: None,
            span: Span::default(),
        });
    }

    let instances = (0..leaves)
        .map(|i| InstanceDecl {
            name: format!("c{i}"),
            definition: format!("L{i}"),
            aliases: Vec::new(),
            ports: Vec::new(),
            span: Span::default(),
        })
        .collect();
    let connectors = (0..leaves)
        .map(|i| {
            let next = (i + 1) % leaves;
            ConnectorUse {
                name: format!("w{i}"),
                definition: None,
                owner: None,
                left: format!("c{i}.p{i}_0"),
                right: format!("c{next}.p{next}_0"),
                span: Span::default(),
            }
        })
        .collect();

    definitions.push(ComponentDefinition {
        name: "Sys".to_string(),
        ports: Vec::new(),
        configuration: Some(Configuration {
            instances,
            connectors,
            ..Default::default()
        }),
        span: Span::default(),
    });

    Model {
        definitions,
        ..Default::default()
    }
}

fn arb_model() -> impl Strategy<Value = Model> {
    (2usize..6, 1usize..4).prop_map(|(leaves, ports_per)| synthetic_model(leaves, ports_per))
}

// ── 1. Determinism ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn repeated_runs_are_byte_identical(model in arb_model()) {
        let first = resolve_model(model.clone()).expect("synthetic model resolves");
        let second = resolve_model(model.clone()).expect("synthetic model resolves");
        prop_assert_eq!(first.to_json(), second.to_json());

        let pa = compute_provenance(&model);
        let pb = compute_provenance(&model);
        prop_assert_eq!(pa.model_hash, pb.model_hash);
    }

    // ── 2. Hierarchy forest invariants ──────────────────────────────────

    #[test]
    fn parent_paths_form_a_forest(model in arb_model()) {
        let instance_count = model.definitions.iter()
            .filter_map(|d| d.configuration.as_ref())
            .map(|c| c.instances.len())
            .sum::<usize>();

        let resolved = resolve_model(model).expect("synthetic model resolves");
        let hierarchy = &resolved.hierarchy;

        prop_assert_eq!(hierarchy.roots.clone(), vec!["Sys".to_string()]);
        let paths: Vec<(&str, &str)> = hierarchy.paths().collect();
        prop_assert_eq!(paths.len(), instance_count, "total over every instance site");

        for (_, path) in paths {
            let head = path.split('.').next().unwrap();
            prop_assert!(
                hierarchy.is_root(head),
                "path {} must be anchored at a root", path
            );
        }
    }

    // ── 3. Qualified endpoints and fail-closed behavior ─────────────────

    #[test]
    fn qualified_ring_always_resolves(model in arb_model()) {
        let connector_count = model.definitions.iter()
            .filter_map(|d| d.configuration.as_ref())
            .map(|c| c.connectors.len())
            .sum::<usize>();
        let resolved = resolve_model(model).expect("synthetic model resolves");
        prop_assert_eq!(resolved.descriptors.len(), connector_count);
    }

    #[test]
    fn injected_unknown_endpoint_fails_the_run(model in arb_model()) {
        let mut broken = model;
        broken
            .definitions
            .last_mut()
            .unwrap()
            .configuration
            .as_mut()
            .unwrap()
            .connectors
            .push(ConnectorUse {
                name: "bad".to_string(),
                definition: None,
                owner: None,
                left: "no_such_port_anywhere".to_string(),
                right: "c0.p0_0".to_string(),
                span: Span::default(),
            });

        match resolve_model(broken) {
            Err(FatalError::UnresolvedBindings { entries, .. }) => {
                prop_assert!(!entries.is_empty());
                prop_assert!(entries.iter().any(|e| e.connector == "bad"));
            }
            Err(other) => prop_assert!(false, "unexpected fatal error: {}", other),
            Ok(_) => prop_assert!(false, "unresolvable binding must fail the run"),
        }
    }
}
