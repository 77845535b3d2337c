// report.rs — Aggregated unresolved-binding reporting
//
// Final gate of the pipeline. Collects every unresolved binding from
// the normalizer into one fatal, suggestion-annotated report, so a
// single run surfaces every problem in the model. No-op when nothing
// is unresolved; generation is all-or-nothing, so the caller must not
// produce any output artifact once the error is raised.
//
// Preconditions: `index` is the exposure index the failures came from.
// Postconditions: the rendered report names every entry exactly once,
//                 numbered, with up to 10 candidate ports per side.
// Failure modes: `UnresolvedBindings` whenever the input is non-empty.
// Side effects: none.

use std::fmt::Write as _;

use crate::binding::UnresolvedBinding;
use crate::diag::FatalError;
use crate::index::ModelIndex;
use crate::scope::Unresolved;

const MAX_CANDIDATES: usize = 10;

// ── Public entry points ─────────────────────────────────────────────────────

/// Raise the aggregated fatal error, or do nothing when every binding
/// resolved.
pub fn report(unresolved: &[UnresolvedBinding], index: &ModelIndex) -> Result<(), FatalError> {
    if unresolved.is_empty() {
        return Ok(());
    }
    Err(FatalError::UnresolvedBindings {
        entries: unresolved.to_vec(),
        report: render(unresolved, index),
    })
}

/// Render the consolidated report: one numbered line per unresolved
/// binding with its reason and candidate ports.
pub fn render(unresolved: &[UnresolvedBinding], index: &ModelIndex) -> String {
    let mut out = String::new();
    if unresolved.len() == 1 {
        out.push_str("resolution failed: 1 unresolved binding\n");
    } else {
        let _ = writeln!(out, "resolution failed: {} unresolved bindings", unresolved.len());
    }

    for (i, entry) in unresolved.iter().enumerate() {
        let _ = write!(
            out,
            "  {}) connector '{}'{}: {} endpoint '{}' ",
            i + 1,
            entry.connector,
            entry
                .owner
                .as_deref()
                .map(|o| format!(" (in {})", o))
                .unwrap_or_default(),
            entry.side,
            entry.token,
        );
        match &entry.reason {
            Unresolved::Ambiguous { candidates } => {
                let shown: Vec<String> = candidates
                    .iter()
                    .take(MAX_CANDIDATES)
                    .map(|c| format!("{}.{}", c.instance, c.port))
                    .collect();
                let _ = write!(
                    out,
                    "is ambiguous ({} candidates): {}",
                    candidates.len(),
                    shown.join(", ")
                );
                if candidates.len() > MAX_CANDIDATES {
                    out.push_str(", ...");
                }
            }
            Unresolved::Unknown => {
                out.push_str("is unknown");
                let suggestions = close_ports(&entry.token, index);
                if !suggestions.is_empty() {
                    let _ = write!(out, "; close matches: {}", suggestions.join(", "));
                }
            }
        }
        out.push('\n');
    }
    out
}

// ── Suggestion scan ─────────────────────────────────────────────────────────

/// Ports anywhere in the model whose name is the token or close to it,
/// as `instance.port` strings, capped at `MAX_CANDIDATES`.
fn close_ports(token: &str, index: &ModelIndex) -> Vec<String> {
    let bare = token.rsplit('.').next().unwrap_or(token);
    let mut out = Vec::new();
    for (site, entry) in index.instances.iter().enumerate() {
        for port in index.exposure(site).keys() {
            if close_match(port, bare) {
                out.push(format!("{}.{}", entry.name, port));
                if out.len() == MAX_CANDIDATES {
                    return out;
                }
            }
        }
    }
    out
}

fn close_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if b.len() >= 3 && (a.contains(b) || b.contains(a)) {
        return true;
    }
    let limit = if a.len().max(b.len()) > 4 { 2 } else { 1 };
    edit_distance(a, b) <= limit
}

/// Plain Levenshtein distance; inputs are short port names.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

// ── Tests ───────────────────────────────────────────────────────────────────
