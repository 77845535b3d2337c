// diag.rs — Unified diagnostics model and fatal error interface
//
// Provides the shared diagnostic types used across all resolution
// passes, plus the structured fatal error the pipeline surfaces to its
// caller (the emitter must never run once one is raised).
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use thiserror::Error;

use crate::binding::UnresolvedBinding;
use crate::ir::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0102`, `W0301`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different
/// semantic meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable code table. Warnings use `W`, errors `E`.
pub mod codes {
    use super::DiagCode;

    /// Duplicate instance name inside one configuration.
    pub const W0101: DiagCode = DiagCode("W0101");
    /// Alias declared but left unmapped (no unambiguous type match).
    pub const W0102: DiagCode = DiagCode("W0102");
    /// Ownerless descriptor collapsed into its owner-specific duplicate.
    pub const W0201: DiagCode = DiagCode("W0201");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A non-fatal finding emitted by any resolution pass. Warnings never
/// gate output; error-level diagnostics stop the pipeline after their
/// pass completes.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code or hint.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

// ── Fatal errors ─────────────────────────────────────────────────────────

/// The resolution pass's failure interface. Structural failures abort
/// immediately; unresolved bindings are aggregated over the whole model
/// and raised once, carrying the rendered report.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("instance '{instance}' references missing definition '{definition}'")]
    MissingDefinition { instance: String, definition: String },

    #[error("model has no composite definition to instantiate")]
    NoCompositeRoot,

    #[error("{report}")]
    UnresolvedBindings {
        entries: Vec<UnresolvedBinding>,
        report: String,
    },
}

// ── Tests ────────────────────────────────────────────────────────────────
