// binding.rs — Connector binding normalization
//
// Third resolution pass. Walks every connector use (standalone, nested
// in a composite configuration, or declared inside a connector
// definition's participant list) plus every delegation, drives the
// scope resolver per side, and assembles deduplicated connector
// descriptors. Sides that stay unresolved are recorded with full
// context; processing never stops at the first failure, so one run
// reports every problem in the model.
//
// Preconditions: `index` and `aliases` were built from `model`.
// Postconditions: descriptor output is sorted by (name, definition,
//                 owner) and stable across runs on an unchanged model.
// Failure modes: none here; unresolved sides are data for the
//                reporter, which decides fatality.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::alias::{type_name_matches, AliasMap};
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::id::{ConnId, IdAllocator};
use crate::index::ModelIndex;
use crate::ir::{ConnectorDefinition, ConnectorUse, Model, RoleBinding, Span};
use crate::scope::{resolve, Resolution, ResolveContext, Unresolved};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// A resolved endpoint of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub instance: String,
    pub port: String,
}

/// One original binding with both sides resolved, kept on the
/// descriptor for the emitter's annotations.
#[derive(Debug, Clone, Serialize)]
pub struct BindingAnnotation {
    pub left_token: String,
    pub right_token: String,
    pub left: Participant,
    pub right: Participant,
}

/// A fully resolved connector. Unique per (name, definition, owner).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorDescriptor {
    pub id: ConnId,
    pub name: String,
    pub definition: Option<String>,
    pub owner: Option<String>,
    pub participants: Vec<Participant>,
    pub bindings: Vec<BindingAnnotation>,
    #[serde(skip)]
    explicit_owner: bool,
}

impl fmt::Display for ConnectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connector '{}'", self.name)?;
        if let Some(def) = &self.definition {
            write!(f, " : {}", def)?;
        }
        if let Some(owner) = &self.owner {
            write!(f, " in {}", owner)?;
        }
        write!(f, " [")?;
        for (i, p) in self.participants.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}.{}", p.instance, p.port)?;
        }
        write!(f, "]")
    }
}

/// An endpoint that stayed unresolved, with everything the reporter
/// needs to build one report line.
#[derive(Debug, Clone)]
pub struct UnresolvedBinding {
    pub connector: String,
    pub side: Side,
    pub token: String,
    pub reason: Unresolved,
    pub owner: Option<String>,
    pub span: Span,
}

/// Result of binding normalization.
#[derive(Debug)]
pub struct NormalizeResult {
    pub descriptors: Vec<ConnectorDescriptor>,
    pub unresolved: Vec<UnresolvedBinding>,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Normalize every binding site in the model into descriptors.
pub fn normalize(model: &Model, index: &ModelIndex, aliases: &AliasMap) -> NormalizeResult {
    let mut norm = Normalizer {
        model,
        index,
        aliases,
        descriptors: BTreeMap::new(),
        unresolved: Vec::new(),
        diagnostics: Vec::new(),
    };

    for site in norm.collect_sites() {
        norm.normalize_site(&site);
    }
    norm.check_delegations();
    norm.finish()
}

// ── Site enumeration ────────────────────────────────────────────────────────

/// One binding site with its resolution context.
struct Site<'m> {
    use_: &'m ConnectorUse,
    /// Enclosing composite definition, for scope-level strategies.
    scope: Option<&'m str>,
    /// Participant roles, for sites inside a connector definition.
    roles: Option<&'m [RoleBinding]>,
    /// Owner label when the site has no explicit owner token.
    implicit_owner: Option<&'m str>,
}

type DescriptorKey = (String, String, String);

struct Normalizer<'m> {
    model: &'m Model,
    index: &'m ModelIndex,
    aliases: &'m AliasMap,
    descriptors: BTreeMap<DescriptorKey, ConnectorDescriptor>,
    unresolved: Vec<UnresolvedBinding>,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> Normalizer<'m> {
    fn collect_sites(&self) -> Vec<Site<'m>> {
        let model: &'m Model = self.model;
        let mut sites = Vec::new();

        for use_ in &model.connectors {
            sites.push(Site {
                use_,
                scope: None,
                roles: None,
                implicit_owner: None,
            });
        }

        for def in &model.definitions {
            let Some(config) = &def.configuration else {
                continue;
            };
            for use_ in &config.connectors {
                sites.push(Site {
                    use_,
                    scope: Some(&def.name),
                    roles: None,
                    implicit_owner: Some(&def.name),
                });
            }
        }

        for cd in &model.connector_definitions {
            for use_ in &cd.bindings {
                sites.push(Site {
                    use_,
                    scope: None,
                    roles: Some(&cd.roles),
                    implicit_owner: Some(&cd.name),
                });
            }
        }

        sites
    }

    // ── Per-site resolution ─────────────────────────────────────────────

    fn normalize_site(&mut self, site: &Site<'m>) {
        let use_ = site.use_;
        let hint = use_.owner.as_deref();

        let mut left = self.resolve_side(&use_.left, site, hint);
        let mut right = self.resolve_side(&use_.right, site, hint);

        // Paired endpoints are usually co-located: retry a failed side
        // with the resolved side's owner as an additional hint.
        if left.is_ok() && right.is_err() {
            let co_owner = left.as_ref().map(|l| l.instance.clone()).unwrap_or_default();
            if let Ok(retry) = self.resolve_side(&use_.right, site, Some(&co_owner)) {
                right = Ok(retry);
            }
        } else if right.is_ok() && left.is_err() {
            let co_owner = right.as_ref().map(|r| r.instance.clone()).unwrap_or_default();
            if let Ok(retry) = self.resolve_side(&use_.left, site, Some(&co_owner)) {
                left = Ok(retry);
            }
        }

        // Typed connectors: re-qualify remaining ambiguity against the
        // role's expected port type.
        if let Some(cd) = self.connector_definition(site) {
            let fix = |side_result: &Result<Resolution, Unresolved>, side: Side| match side_result {
                Err(Unresolved::Ambiguous { candidates }) => self.requalify(candidates, cd, side),
                _ => None,
            };
            if let Some(p) = fix(&left, Side::Left) {
                left = Ok(p);
            }
            if let Some(p) = fix(&right, Side::Right) {
                right = Ok(p);
            }
        }

        let owner = use_
            .owner
            .clone()
            .or_else(|| site.implicit_owner.map(str::to_string));

        match (left, right) {
            (Ok(l), Ok(r)) => self.record_descriptor(site, l, r),
            (l, r) => {
                if let Err(reason) = l {
                    self.record_unresolved(use_, Side::Left, reason, owner.clone());
                }
                if let Err(reason) = r {
                    self.record_unresolved(use_, Side::Right, reason, owner);
                }
            }
        }
    }

    fn resolve_side(
        &self,
        token: &str,
        site: &Site<'m>,
        hint: Option<&str>,
    ) -> Result<Resolution, Unresolved> {
        let ctx = ResolveContext {
            model: self.model,
            index: self.index,
            aliases: self.aliases,
            scope: site.scope,
            owner_hint: hint,
            roles: site.roles,
        };
        resolve(token, &ctx)
    }

    fn connector_definition(&self, site: &Site<'m>) -> Option<&'m ConnectorDefinition> {
        let name = site.use_.definition.as_deref()?;
        let pos = *self.index.connector_definitions.get(name)?;
        Some(&self.model.connector_definitions[pos])
    }

    /// Filter same-name ambiguity candidates against the port type the
    /// connector's role expects for this side. The first flow descriptor
    /// names the roles; without flows, roles pair positionally.
    fn requalify(
        &self,
        candidates: &[crate::scope::Candidate],
        cd: &ConnectorDefinition,
        side: Side,
    ) -> Option<Resolution> {
        let role_name = if let Some(flow) = cd.flows.first() {
            match side {
                Side::Left => flow.from.as_str(),
                Side::Right => flow.to.as_str(),
            }
        } else {
            match side {
                Side::Left => cd.roles.first()?.role.as_str(),
                Side::Right => cd.roles.get(1)?.role.as_str(),
            }
        };
        let expected = &cd.roles.iter().find(|r| r.role == role_name)?.port_type;

        let mut survivors = Vec::new();
        for cand in candidates {
            for &s in self.index.instances_named(&cand.instance) {
                let matches = self
                    .index
                    .port_type(s, &cand.port)
                    .is_some_and(|t| type_name_matches(t, expected));
                if matches {
                    survivors.push((s, cand.clone()));
                    break;
                }
            }
        }

        match survivors.as_slice() {
            [(s, cand)] => Some(Resolution {
                site: *s,
                instance: cand.instance.clone(),
                port: cand.port.clone(),
                strategy: crate::scope::StrategyKind::RoleScope,
            }),
            _ => None,
        }
    }

    // ── Descriptor assembly ─────────────────────────────────────────────

    fn record_descriptor(&mut self, site: &Site<'m>, left: Resolution, right: Resolution) {
        let use_ = site.use_;
        let owner = use_
            .owner
            .clone()
            .or_else(|| site.implicit_owner.map(str::to_string));
        let key = (
            use_.name.clone(),
            use_.definition.clone().unwrap_or_default(),
            owner.clone().unwrap_or_default(),
        );

        let entry = self
            .descriptors
            .entry(key)
            .or_insert_with(|| ConnectorDescriptor {
                id: ConnId(0), // assigned after final sort
                name: use_.name.clone(),
                definition: use_.definition.clone(),
                owner,
                participants: Vec::new(),
                bindings: Vec::new(),
                explicit_owner: use_.owner.is_some(),
            });
        entry.explicit_owner |= use_.owner.is_some();

        let lp = Participant {
            instance: left.instance,
            port: left.port,
        };
        let rp = Participant {
            instance: right.instance,
            port: right.port,
        };
        for p in [&lp, &rp] {
            if !entry.participants.contains(p) {
                entry.participants.push(p.clone());
            }
        }
        entry.bindings.push(BindingAnnotation {
            left_token: use_.left.clone(),
            right_token: use_.right.clone(),
            left: lp,
            right: rp,
        });
    }

    fn record_unresolved(
        &mut self,
        use_: &ConnectorUse,
        side: Side,
        reason: Unresolved,
        owner: Option<String>,
    ) {
        self.unresolved.push(UnresolvedBinding {
            connector: use_.name.clone(),
            side,
            token: match side {
                Side::Left => use_.left.clone(),
                Side::Right => use_.right.clone(),
            },
            reason,
            owner,
            span: use_.span,
        });
    }

    // ── Delegations ─────────────────────────────────────────────────────

    /// Delegation inner tokens resolve through the same chain, scoped to
    /// the delegating definition. The outer name is exposure (already in
    /// the index), so only the inner side can fail.
    fn check_delegations(&mut self) {
        for def in &self.model.definitions {
            let Some(config) = &def.configuration else {
                continue;
            };
            for delegation in &config.delegations {
                let ctx = ResolveContext {
                    model: self.model,
                    index: self.index,
                    aliases: self.aliases,
                    scope: Some(&def.name),
                    owner_hint: None,
                    roles: None,
                };
                if let Err(reason) = resolve(&delegation.inner, &ctx) {
                    self.unresolved.push(UnresolvedBinding {
                        connector: format!("delegation {}.{}", def.name, delegation.outer),
                        side: Side::Left,
                        token: delegation.inner.clone(),
                        reason,
                        owner: Some(def.name.clone()),
                        span: delegation.span,
                    });
                }
            }
        }
    }

    // ── Finalization ────────────────────────────────────────────────────

    fn finish(mut self) -> NormalizeResult {
        // Collapse an ownerless descriptor into a structurally identical
        // one that names an owner; the specific entry wins.
        let keys: Vec<DescriptorKey> = self.descriptors.keys().cloned().collect();
        for bare_key in keys {
            if !bare_key.2.is_empty() {
                continue;
            }
            let bare_participants = self.descriptors[&bare_key].participants.clone();
            let shadowed = self.descriptors.iter().any(|(other_key, other)| {
                other_key.0 == bare_key.0
                    && other_key.1 == bare_key.1
                    && !other_key.2.is_empty()
                    && other.explicit_owner
                    && other.participants == bare_participants
            });
            if shadowed {
                let dropped = self.descriptors.remove(&bare_key).expect("key just seen");
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        Span::default(),
                        format!(
                            "ownerless connector '{}' collapsed into its owner-specific duplicate",
                            dropped.name
                        ),
                    )
                    .with_code(codes::W0201),
                );
            }
        }

        // BTreeMap iteration is already (name, definition, owner) order;
        // assign descriptor ids in that final order.
        let mut ids = IdAllocator::new();
        let descriptors: Vec<ConnectorDescriptor> = self
            .descriptors
            .into_values()
            .map(|mut d| {
                d.id = ids.alloc_conn();
                d
            })
            .collect();

        NormalizeResult {
            descriptors,
            unresolved: self.unresolved,
            diagnostics: self.diagnostics,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
