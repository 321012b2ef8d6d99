// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all build phases.
// Graphs are built through an embedded API rather than parsed from text,
// so diagnostics carry structural context (unit and array names) instead
// of source spans.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0200`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable diagnostic codes, one constant per distinct failure.
pub mod codes {
    use super::DiagCode;

    /// A declared width exceeds the 64-bit word the runtime evaluates in.
    pub const WIDTH_UNSUPPORTED: DiagCode = DiagCode("E0100");
    /// An array write's value type does not match the element type.
    pub const ARRAY_WRITE_TYPE: DiagCode = DiagCode("E0101");
    /// An async call targets a binding that leaves some port unbound.
    pub const BIND_INCOMPLETE: DiagCode = DiagCode("E0102");
    /// The combinational units form a dependency cycle.
    pub const COMB_CYCLE: DiagCode = DiagCode("E0103");
    /// A bound value is produced in another unit and never exposed.
    pub const UNEXPOSED_VALUE: DiagCode = DiagCode("E0104");
    /// An array initializer file could not be loaded.
    pub const INIT_FILE: DiagCode = DiagCode("E0105");
    /// A combinational unit contains an operation that can stall.
    pub const COMB_STALL_OP: DiagCode = DiagCode("E0106");
    /// A port is popped or peeked outside its owning unit.
    pub const FOREIGN_PORT_OP: DiagCode = DiagCode("E0107");
    /// A bound argument's type does not match its port.
    pub const PORT_ARG_TYPE: DiagCode = DiagCode("E0108");
    /// A value defined in a conditional block is used where the block may
    /// not have run.
    pub const VALUE_ESCAPES_BLOCK: DiagCode = DiagCode("E0109");
    /// A triggered flag probed from a sequential unit.
    pub const SEQ_TRIGGER_PROBE: DiagCode = DiagCode("E0110");

    /// A sequential unit that nothing ever activates.
    pub const UNIT_NEVER_ACTIVATED: DiagCode = DiagCode("W0200");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A build diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub message: String,
    pub hint: Option<String>,
    /// Names of the graph entities involved (units, arrays, ports).
    pub context: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or context.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            message: message.into(),
            hint: None,
            context: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message)
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

    /// Attach the name of an involved graph entity.
    pub fn with_context(mut self, name: impl Into<String>) -> Self {
        self.context.push(name.into());
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
        if !self.context.is_empty() {
            write!(f, "\n  in: {}", self.context.join(", "))?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True when any diagnostic in the slice is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}
