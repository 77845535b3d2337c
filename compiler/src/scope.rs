// scope.rs — Scoped endpoint resolution
//
// The core algorithm: maps one raw endpoint token to a concrete
// (instance, port) pair through a fixed chain of resolution strategies,
// first success wins. Each strategy is a tagged variant implementing
// `attempt`, so levels stay independently testable and the documented
// order is explicit in one place.
//
// Chain order: qualified path, same-scope alias, same-scope exposure,
// local role scope, global alias fallback, global exposure fallback.
// An owner hint (the binding's declared owner, or the opposite side's
// resolved owner on retry) refines the two same-scope levels: when the
// hint instance itself declares the alias or exposes the port, it wins
// before the scope-wide rule runs.
//
// Preconditions: `index` and `aliases` were built from `model`.
// Postconditions: a returned resolution's port is in the owner's
//                 exposure set.
// Failure modes: none; unresolved outcomes are returned, not thrown,
//                so the caller can aggregate across the whole model.
// Side effects: none (pure function of its inputs).

use crate::alias::{type_name_matches, AliasMap};
use crate::index::ModelIndex;
use crate::ir::{Model, RoleBinding};

// ── Public types ────────────────────────────────────────────────────────────

/// A successfully resolved endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Position of the owner site in the index's instance table.
    pub site: usize,
    pub instance: String,
    pub port: String,
    pub strategy: StrategyKind,
}

/// One candidate owner/port pair, reported on ambiguity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub instance: String,
    pub port: String,
}

/// Why a token failed to resolve. `Ambiguous` carries the candidates of
/// the first chain level that saw two or more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    Ambiguous { candidates: Vec<Candidate> },
    Unknown,
}

/// The resolution strategy chain, in documented evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    QualifiedPath,
    ScopeAlias,
    ScopeExposure,
    RoleScope,
    GlobalAlias,
    GlobalExposure,
}

pub const CHAIN: [StrategyKind; 6] = [
    StrategyKind::QualifiedPath,
    StrategyKind::ScopeAlias,
    StrategyKind::ScopeExposure,
    StrategyKind::RoleScope,
    StrategyKind::GlobalAlias,
    StrategyKind::GlobalExposure,
];

/// Everything one resolution call may consult.
pub struct ResolveContext<'a> {
    pub model: &'a Model,
    pub index: &'a ModelIndex,
    pub aliases: &'a AliasMap,
    /// Enclosing composite definition, for the same-scope levels.
    pub scope: Option<&'a str>,
    /// Instance the binding belongs to, when known.
    pub owner_hint: Option<&'a str>,
    /// Participant roles, only for bindings inside a connector
    /// definition's own participant list.
    pub roles: Option<&'a [RoleBinding]>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve one endpoint token. Deterministic: an unchanged token in an
/// unchanged scope always yields the same outcome.
pub fn resolve(token: &str, ctx: &ResolveContext) -> Result<Resolution, Unresolved> {
    let mut ambiguity: Option<Vec<Candidate>> = None;
    for strategy in CHAIN {
        if let Some(resolution) = strategy.attempt(token, ctx, &mut ambiguity) {
            return Ok(resolution);
        }
    }
    match ambiguity {
        Some(candidates) => Err(Unresolved::Ambiguous { candidates }),
        None => Err(Unresolved::Unknown),
    }
}

// ── Strategy implementations ────────────────────────────────────────────────

impl StrategyKind {
    /// Try to resolve `token` at this chain level. Levels that see two
    /// or more viable candidates without a tie-break record them in
    /// `ambiguity` (first such level wins the record) and decline.
    pub fn attempt(
        self,
        token: &str,
        ctx: &ResolveContext,
        ambiguity: &mut Option<Vec<Candidate>>,
    ) -> Option<Resolution> {
        match self {
            StrategyKind::QualifiedPath => attempt_qualified(token, ctx, ambiguity),
            StrategyKind::ScopeAlias => attempt_alias(token, ctx, ctx.index.in_scope(ctx.scope)),
            StrategyKind::ScopeExposure => attempt_exposure(
                token,
                ctx,
                ctx.index.in_scope(ctx.scope),
                StrategyKind::ScopeExposure,
                ambiguity,
            ),
            StrategyKind::RoleScope => attempt_role_scope(token, ctx, ambiguity),
            StrategyKind::GlobalAlias => attempt_global_alias(token, ctx, ambiguity),
            StrategyKind::GlobalExposure => attempt_exposure(
                token,
                ctx,
                all_sites(ctx),
                StrategyKind::GlobalExposure,
                ambiguity,
            ),
        }
    }
}

fn all_sites(ctx: &ResolveContext) -> Vec<usize> {
    (0..ctx.index.instances.len()).collect()
}

fn resolution(ctx: &ResolveContext, site: usize, port: String, strategy: StrategyKind) -> Resolution {
    Resolution {
        site,
        instance: ctx.index.instances[site].name.clone(),
        port,
        strategy,
    }
}

fn candidate(ctx: &ResolveContext, site: usize, port: &str) -> Candidate {
    Candidate {
        instance: ctx.index.instances[site].name.clone(),
        port: port.to_string(),
    }
}

fn record_ambiguity(ambiguity: &mut Option<Vec<Candidate>>, candidates: Vec<Candidate>) {
    if ambiguity.is_none() && candidates.len() >= 2 {
        *ambiguity = Some(candidates);
    }
}

/// The site an owner hint names, when it names exactly one. A site in
/// the enclosing scope is preferred over same-named sites elsewhere.
fn hint_site(ctx: &ResolveContext) -> Option<usize> {
    let hint = ctx.owner_hint?;
    let sites = ctx.index.instances_named(hint);
    sites
        .iter()
        .copied()
        .find(|&s| ctx.index.instances[s].owner.as_deref() == ctx.scope)
        .or_else(|| match sites {
            [only] => Some(*only),
            _ => None,
        })
}

// ── Level 1: qualified path ─────────────────────────────────────────────────

/// Progressively shorter prefixes of a dotted token are tried as owner
/// paths, longest first; the first prefix whose remainder is an exposed
/// port of the named instance wins.
fn attempt_qualified(
    token: &str,
    ctx: &ResolveContext,
    ambiguity: &mut Option<Vec<Candidate>>,
) -> Option<Resolution> {
    if !token.contains('.') {
        return None;
    }
    let segments: Vec<&str> = token.split('.').collect();

    for cut in (1..segments.len()).rev() {
        let owner_name = segments[cut - 1];
        let port = segments[cut..].join(".");

        let exposing: Vec<usize> = ctx
            .index
            .instances_named(owner_name)
            .iter()
            .copied()
            .filter(|&s| ctx.index.exposes(s, &port))
            .collect();

        match exposing.as_slice() {
            [] => continue,
            [only] => return Some(resolution(ctx, *only, port, StrategyKind::QualifiedPath)),
            many => {
                let in_scope: Vec<usize> = many
                    .iter()
                    .copied()
                    .filter(|&s| ctx.index.instances[s].owner.as_deref() == ctx.scope)
                    .collect();
                if let [only] = in_scope.as_slice() {
                    return Some(resolution(ctx, *only, port, StrategyKind::QualifiedPath));
                }
                record_ambiguity(
                    ambiguity,
                    many.iter().map(|&s| candidate(ctx, s, &port)).collect(),
                );
            }
        }
    }
    None
}

// ── Levels 2 and 5: alias lookup ────────────────────────────────────────────

/// Same-scope alias resolution with the documented tie-break: the hint
/// instance first, then a declarer with a canonical mapping, then the
/// lexicographically first declarer. The winner still has to expose the
/// port it stands for, otherwise the level declines and later levels
/// see the token as a literal name.
fn attempt_alias(token: &str, ctx: &ResolveContext, pool: Vec<usize>) -> Option<Resolution> {
    let declarers: Vec<usize> = pool
        .into_iter()
        .filter(|&s| ctx.aliases.declares(s, token))
        .collect();
    if declarers.is_empty() {
        return None;
    }

    let winner = match (hint_site(ctx), declarers.as_slice()) {
        (Some(h), ds) if ds.contains(&h) => h,
        (_, [only]) => *only,
        (_, ds) => {
            let mapped: Vec<usize> = ds
                .iter()
                .copied()
                .filter(|&s| ctx.aliases.canonical(s, token).is_some())
                .collect();
            let pick_from = if mapped.is_empty() { ds } else { mapped.as_slice() };
            pick_from
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    ctx.index.instances[a]
                        .name
                        .cmp(&ctx.index.instances[b].name)
                })
                .expect("non-empty declarer set")
        }
    };

    let port = ctx
        .aliases
        .canonical(winner, token)
        .unwrap_or(token)
        .to_string();
    if ctx.index.exposes(winner, &port) {
        Some(resolution(ctx, winner, port, StrategyKind::ScopeAlias))
    } else {
        None
    }
}

fn attempt_global_alias(
    token: &str,
    ctx: &ResolveContext,
    ambiguity: &mut Option<Vec<Candidate>>,
) -> Option<Resolution> {
    let declarers: Vec<usize> = all_sites(ctx)
        .into_iter()
        .filter(|&s| ctx.aliases.declares(s, token))
        .collect();
    match declarers.as_slice() {
        [] => None,
        [only] => {
            let port = ctx
                .aliases
                .canonical(*only, token)
                .unwrap_or(token)
                .to_string();
            if ctx.index.exposes(*only, &port) {
                Some(resolution(ctx, *only, port, StrategyKind::GlobalAlias))
            } else {
                None
            }
        }
        many => {
            record_ambiguity(
                ambiguity,
                many.iter()
                    .map(|&s| {
                        let port = ctx.aliases.canonical(s, token).unwrap_or(token);
                        candidate(ctx, s, port)
                    })
                    .collect(),
            );
            None
        }
    }
}

// ── Levels 3 and 6: exposure lookup ─────────────────────────────────────────

fn attempt_exposure(
    token: &str,
    ctx: &ResolveContext,
    pool: Vec<usize>,
    strategy: StrategyKind,
    ambiguity: &mut Option<Vec<Candidate>>,
) -> Option<Resolution> {
    if let Some(h) = hint_site(ctx) {
        if pool.contains(&h) && ctx.index.exposes(h, token) {
            return Some(resolution(ctx, h, token.to_string(), strategy));
        }
    }

    let owners: Vec<usize> = pool
        .iter()
        .copied()
        .filter(|&s| ctx.index.exposes(s, token))
        .collect();
    match owners.as_slice() {
        [] => None,
        [only] => Some(resolution(ctx, *only, token.to_string(), strategy)),
        many => {
            record_ambiguity(
                ambiguity,
                many.iter().map(|&s| candidate(ctx, s, token)).collect(),
            );
            None
        }
    }
}

// ── Level 4: local role scope ───────────────────────────────────────────────

/// Only active for bindings inside a connector definition's own
/// participant list. A token naming a role resolves when exactly one
/// in-scope port matches the role's expected type; otherwise the token
/// must name exactly one in-scope port of a role-compatible type.
fn attempt_role_scope(
    token: &str,
    ctx: &ResolveContext,
    ambiguity: &mut Option<Vec<Candidate>>,
) -> Option<Resolution> {
    let roles = ctx.roles.filter(|r| !r.is_empty())?;
    let pool = if ctx.scope.is_some() {
        ctx.index.in_scope(ctx.scope)
    } else {
        all_sites(ctx)
    };

    let matches: Vec<(usize, String)> = if let Some(role) = roles.iter().find(|r| r.role == token) {
        ports_matching(ctx, &pool, |_, port_type| {
            type_name_matches(port_type, &role.port_type)
        })
    } else {
        ports_matching(ctx, &pool, |name, port_type| {
            name == token && roles.iter().any(|r| type_name_matches(port_type, &r.port_type))
        })
    };

    match matches.as_slice() {
        [] => None,
        [(site, port)] => Some(resolution(ctx, *site, port.clone(), StrategyKind::RoleScope)),
        many => {
            record_ambiguity(
                ambiguity,
                many.iter().map(|(s, p)| candidate(ctx, *s, p)).collect(),
            );
            None
        }
    }
}

fn ports_matching(
    ctx: &ResolveContext,
    pool: &[usize],
    mut accept: impl FnMut(&str, &str) -> bool,
) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for &site in pool {
        for (name, port_type) in ctx.index.exposure(site) {
            if accept(name, port_type) {
                out.push((site, name.clone()));
            }
        }
    }
    out
}

// ── Tests ───────────────────────────────────────────────────────────────────
