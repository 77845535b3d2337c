// ir.rs — Canonical IR for ADL architecture models
//
// The intermediate representation handed over by the external parser,
// after the ingest adapter has normalized heterogeneous raw shapes.
// Every binding site carries exactly one (left, right) token pair;
// downstream passes never see any other endpoint shape.
//
// Preconditions: produced by `adapter::RawModel::into_model` or built
//                programmatically by a frontend.
// Postconditions: each node's span covers the source range of the
//                 construct (zero when the frontend supplied none).
// Failure modes: none (data-only module).
// Side effects: none.

use serde::{Deserialize, Serialize};

// ── Span ──

/// Byte-offset span into the originating model source.
///
/// Frontends that do not track source text leave spans at zero; all
/// span use downstream is diagnostic-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

// ── Root ──

/// A complete architecture model: definitions plus standalone connector
/// uses that live outside any composite configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub definitions: Vec<ComponentDefinition>,
    #[serde(default)]
    pub connector_definitions: Vec<ConnectorDefinition>,
    /// Connector uses declared at model scope, outside any configuration.
    #[serde(default)]
    pub connectors: Vec<ConnectorUse>,
    /// Raw model source, kept only for diagnostic excerpts. The ingest
    /// adapter consumes it for span re-scans before this point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Model {
    /// Compact canonical JSON of the model, used for provenance hashing.
    /// Field and element order is fully determined by the IR itself, so
    /// equal models produce byte-identical output.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("model serialization cannot fail")
    }
}

// ── Component definitions ──

/// A reusable component type: atomic (leaf) when `configuration` is
/// absent, composite when it owns a nested configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
    #[serde(default)]
    pub span: Span,
}

impl ComponentDefinition {
    pub fn is_composite(&self) -> bool {
        self.configuration.is_some()
    }
}

/// The nested body of a composite definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub instances: Vec<InstanceDecl>,
    #[serde(default)]
    pub connectors: Vec<ConnectorUse>,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    #[serde(default)]
    pub span: Span,
}

/// A named instantiation of a definition within a configuration.
/// Instance names are unique within their enclosing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDecl {
    pub name: String,
    pub definition: String,
    /// Locally-scoped port aliases (`alias : TypeName`).
    #[serde(default)]
    pub aliases: Vec<AliasDecl>,
    /// Port uses attached directly to the instance by the frontend.
    /// Rare, but indexed into the exposure set like declared ports.
    #[serde(default)]
    pub ports: Vec<PortSignature>,
    #[serde(default)]
    pub span: Span,
}

/// A per-instance local rename of a port, declared by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDecl {
    pub alias: String,
    pub type_name: String,
    #[serde(default)]
    pub span: Span,
}

// ── Ports ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[default]
    InOut,
}

/// A declared port: name, direction, declared type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSignature {
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub port_type: String,
    #[serde(default)]
    pub span: Span,
}

// ── Connectors ──

/// A connector type: participant roles plus optional ordered flow
/// descriptors. Flows are used purely for type-based disambiguation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDefinition {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<RoleBinding>,
    #[serde(default)]
    pub flows: Vec<FlowSpec>,
    /// Bindings declared inside the connector definition's own
    /// participant list. Resolved with the local role scope active.
    #[serde(default)]
    pub bindings: Vec<ConnectorUse>,
    #[serde(default)]
    pub span: Span,
}

/// A participant role: role name plus the port type it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role: String,
    #[serde(default)]
    pub port_type: String,
}

/// An ordered flow descriptor between two roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub from: String,
    pub to: String,
}

/// A connector instantiation with its raw endpoint token pair.
/// Endpoints are bare names or dotted paths, resolved later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorUse {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// Explicit owner instance token, when the frontend recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub span: Span,
}

/// Re-exposure of a nested instance's port (`inner`, a raw token) as a
/// port named `outer` on the enclosing definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub inner: String,
    pub outer: String,
    #[serde(default)]
    pub span: Span,
}
