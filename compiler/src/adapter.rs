// adapter.rs — Raw model ingestion and binding-shape normalization
//
// External frontends encode binding endpoints in heterogeneous shapes:
// explicit `left`/`right` fields, nested binding lists, or nothing but
// a source span. This adapter collapses every shape into the canonical
// `ConnectorUse` at IR-construction time, so downstream passes see one
// shape only. Field naming is tolerant (serde aliases), but a named
// port or endpoint is never silently dropped: a shape that yields no
// token pair is an ingest error.
//
// Preconditions: `text` is the frontend's JSON encoding of one model.
// Postconditions: the returned `Model` contains only canonical sites.
// Failure modes: malformed JSON, or a connector use with no extractable
//                endpoint pair.
// Side effects: none.

use serde::Deserialize;
use thiserror::Error;

use crate::ir::{
    AliasDecl, ComponentDefinition, Configuration, ConnectorDefinition, ConnectorUse, Delegation,
    Direction, FlowSpec, InstanceDecl, Model, PortSignature, RoleBinding, Span,
};

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connector '{connector}': no endpoint pair found in any known shape")]
    EndpointShape { connector: String },
}

// ── Public entry points ─────────────────────────────────────────────────────

/// Deserialize and normalize a frontend model from JSON.
pub fn from_json(text: &str) -> Result<Model, IngestError> {
    let raw: RawModel = serde_json::from_str(text)?;
    raw.into_model()
}

impl Model {
    /// Convenience wrapper around [`from_json`].
    pub fn from_json(text: &str) -> Result<Model, IngestError> {
        from_json(text)
    }
}

// ── Raw shapes ──────────────────────────────────────────────────────────────

/// The frontend's model encoding, prior to shape normalization.
#[derive(Debug, Default, Deserialize)]
pub struct RawModel {
    #[serde(default, alias = "components")]
    definitions: Vec<RawDefinition>,
    #[serde(default, alias = "connector_types")]
    connector_definitions: Vec<RawConnectorDefinition>,
    #[serde(default, alias = "bindings")]
    connectors: Vec<RawConnectorUse>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    name: String,
    #[serde(default, alias = "signatures")]
    ports: Vec<RawPortSignature>,
    #[serde(default, alias = "config", alias = "composite")]
    configuration: Option<RawConfiguration>,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfiguration {
    #[serde(default, alias = "subcomponents", alias = "parts")]
    instances: Vec<RawInstance>,
    #[serde(default, alias = "connector_uses", alias = "uses")]
    connectors: Vec<RawConnectorUse>,
    #[serde(default, alias = "delegates")]
    delegations: Vec<RawDelegation>,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    name: String,
    #[serde(alias = "type", alias = "component")]
    definition: String,
    #[serde(default, alias = "local_aliases")]
    aliases: Vec<RawAlias>,
    #[serde(default, alias = "port_uses")]
    ports: Vec<RawPortSignature>,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
struct RawAlias {
    alias: String,
    #[serde(alias = "type")]
    type_name: String,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
struct RawPortSignature {
    name: String,
    #[serde(default)]
    direction: Direction,
    #[serde(default, alias = "type", alias = "type_name")]
    port_type: String,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
struct RawConnectorDefinition {
    name: String,
    #[serde(default, alias = "participants")]
    roles: Vec<RoleBinding>,
    #[serde(default)]
    flows: Vec<FlowSpec>,
    #[serde(default)]
    bindings: Vec<RawConnectorUse>,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
struct RawDelegation {
    #[serde(alias = "from", alias = "inner_port")]
    inner: String,
    #[serde(alias = "to", alias = "outer_port")]
    outer: String,
    #[serde(default)]
    span: Span,
}

/// A connector use in any of the frontend shapes. At most one of the
/// endpoint shapes is populated; normalization picks the first that
/// yields a pair, in the documented precedence order.
#[derive(Debug, Deserialize)]
struct RawConnectorUse {
    #[serde(alias = "connector")]
    name: String,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default, alias = "from", alias = "src")]
    left: Option<String>,
    #[serde(default, alias = "to", alias = "dst")]
    right: Option<String>,
    #[serde(default, alias = "endpoints", alias = "pairs")]
    bindings: Vec<RawEndpointPair>,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
struct RawEndpointPair {
    #[serde(alias = "from", alias = "src")]
    left: String,
    #[serde(alias = "to", alias = "dst")]
    right: String,
    #[serde(default)]
    span: Span,
}

// ── Normalization ───────────────────────────────────────────────────────────

impl RawModel {
    /// Normalize every raw shape into the canonical `Model`.
    pub fn into_model(self) -> Result<Model, IngestError> {
        let source = self.source;

        let mut definitions = Vec::with_capacity(self.definitions.len());
        for def in self.definitions {
            definitions.push(normalize_definition(def, source.as_deref())?);
        }

        let mut connector_definitions = Vec::with_capacity(self.connector_definitions.len());
        for cd in self.connector_definitions {
            let mut bindings = Vec::new();
            for b in cd.bindings {
                bindings.extend(normalize_use(b, source.as_deref())?);
            }
            connector_definitions.push(ConnectorDefinition {
                name: cd.name,
                roles: cd.roles,
                flows: cd.flows,
                bindings,
                span: cd.span,
            });
        }

        let mut connectors = Vec::new();
        for c in self.connectors {
            connectors.extend(normalize_use(c, source.as_deref())?);
        }

        Ok(Model {
            definitions,
            connector_definitions,
            connectors,
            source,
        })
    }
}

fn normalize_definition(
    def: RawDefinition,
    source: Option<&str>,
) -> Result<ComponentDefinition, IngestError> {
    let configuration = match def.configuration {
        Some(cfg) => {
            let mut connectors = Vec::new();
            for c in cfg.connectors {
                connectors.extend(normalize_use(c, source)?);
            }
            Some(Configuration {
                instances: cfg.instances.into_iter().map(normalize_instance).collect(),
                connectors,
                delegations: cfg
                    .delegations
                    .into_iter()
                    .map(|d| Delegation {
                        inner: d.inner,
                        outer: d.outer,
                        span: d.span,
                    })
                    .collect(),
                span: cfg.span,
            })
        }
        None => None,
    };

    Ok(ComponentDefinition {
        name: def.name,
        ports: def.ports.into_iter().map(normalize_port).collect(),
        configuration,
        span: def.span,
    })
}

fn normalize_instance(inst: RawInstance) -> InstanceDecl {
    InstanceDecl {
        name: inst.name,
        definition: inst.definition,
        aliases: inst
            .aliases
            .into_iter()
            .map(|a| AliasDecl {
                alias: a.alias,
                type_name: a.type_name,
                span: a.span,
            })
            .collect(),
        ports: inst.ports.into_iter().map(normalize_port).collect(),
        span: inst.span,
    }
}

fn normalize_port(port: RawPortSignature) -> PortSignature {
    PortSignature {
        name: port.name,
        direction: port.direction,
        port_type: port.port_type,
        span: port.span,
    }
}

/// Collapse one raw connector use into canonical sites. Precedence:
/// explicit pair fields, then the nested binding list (one site per
/// pair), then a textual re-scan of the originating source span.
fn normalize_use(
    raw: RawConnectorUse,
    source: Option<&str>,
) -> Result<Vec<ConnectorUse>, IngestError> {
    if let (Some(left), Some(right)) = (&raw.left, &raw.right) {
        return Ok(vec![ConnectorUse {
            name: raw.name,
            definition: raw.definition,
            owner: raw.owner,
            left: left.clone(),
            right: right.clone(),
            span: raw.span,
        }]);
    }

    if !raw.bindings.is_empty() {
        return Ok(raw
            .bindings
            .into_iter()
            .map(|pair| ConnectorUse {
                name: raw.name.clone(),
                definition: raw.definition.clone(),
                owner: raw.owner.clone(),
                left: pair.left,
                right: pair.right,
                span: if pair.span == Span::default() {
                    raw.span
                } else {
                    pair.span
                },
            })
            .collect());
    }

    if let Some((left, right)) = source.and_then(|text| rescan_endpoints(text, raw.span, &raw.name))
    {
        return Ok(vec![ConnectorUse {
            name: raw.name,
            definition: raw.definition,
            owner: raw.owner,
            left,
            right,
            span: raw.span,
        }]);
    }

    Err(IngestError::EndpointShape {
        connector: raw.name,
    })
}

// ── Source span re-scan ─────────────────────────────────────────────────────

/// Last-resort extraction of an endpoint pair from the source text
/// covered by a connector use's span. Scans for identifier-path tokens
/// and takes the first two that are not the connector's own name or a
/// declaration keyword. Purely textual, with no grammar knowledge beyond
/// token shape.
fn rescan_endpoints(text: &str, span: Span, connector_name: &str) -> Option<(String, String)> {
    if span.end <= span.start || span.end > text.len() {
        return None;
    }
    let window = text.get(span.start..span.end)?;

    let mut tokens = Vec::new();
    let bytes = window.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
            {
                i += 1;
            }
            // Trim a trailing '.' left by sentence-like punctuation.
            let mut end = i;
            while end > start && bytes[end - 1] == b'.' {
                end -= 1;
            }
            tokens.push(&window[start..end]);
        } else {
            i += 1;
        }
    }

    const KEYWORDS: [&str; 7] = ["connector", "binding", "bind", "between", "and", "from", "to"];
    let mut endpoints = tokens
        .into_iter()
        .filter(|t| !t.is_empty() && *t != connector_name && !KEYWORDS.contains(t));

    let left = endpoints.next()?;
    let right = endpoints.next()?;
    Some((left.to_string(), right.to_string()))
}

// ── Tests ───────────────────────────────────────────────────────────────────
