// dot.rs — Graphviz DOT output for resolved models
//
// Renders the composition graph between composite definitions (cycles
// visible as back edges) and the resolved connector topology, suitable
// for `dot` or other Graphviz layout engines.
//
// Preconditions: inputs come from a completed resolution pass.
// Postconditions: returns a valid, deterministic DOT string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::binding::ConnectorDescriptor;
use crate::index::ModelIndex;
use crate::ir::Model;

/// Emit the composition graph as a Graphviz DOT string. Composite
/// definitions are boxes, leaves are ellipses; an edge per explicit
/// instance site, labelled with the instance name.
pub fn composition_dot(model: &Model, index: &ModelIndex) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph composition {{").unwrap();
    writeln!(buf, "    rankdir=TB;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();

    let mut names: Vec<&str> = index.definitions.keys().map(String::as_str).collect();
    names.sort_unstable();
    for name in &names {
        let shape = match index.definition(model, name) {
            Some(def) if def.is_composite() => "box",
            _ => "ellipse",
        };
        writeln!(buf, "    {} [label=\"{}\", shape={}];", sanitize(name), name, shape).unwrap();
    }

    writeln!(buf).unwrap();
    for entry in &index.instances {
        if let Some(owner) = &entry.owner {
            writeln!(
                buf,
                "    {} -> {} [label=\"{}\"];",
                sanitize(owner),
                sanitize(&entry.definition),
                entry.name,
            )
            .unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

/// Emit resolved connectivity: one node per participant instance, one
/// labelled edge per descriptor binding.
pub fn descriptor_dot(descriptors: &[ConnectorDescriptor]) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph connectors {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10, shape=box];").unwrap();

    let mut instances: Vec<&str> = descriptors
        .iter()
        .flat_map(|d| d.participants.iter().map(|p| p.instance.as_str()))
        .collect();
    instances.sort_unstable();
    instances.dedup();
    for instance in &instances {
        writeln!(buf, "    {} [label=\"{}\"];", sanitize(instance), instance).unwrap();
    }

    writeln!(buf).unwrap();
    for descriptor in descriptors {
        for binding in &descriptor.bindings {
            writeln!(
                buf,
                "    {} -> {} [label=\"{}: {} - {}\"];",
                sanitize(&binding.left.instance),
                sanitize(&binding.right.instance),
                descriptor.name,
                binding.left.port,
                binding.right.port,
            )
            .unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────
