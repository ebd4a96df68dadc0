//! Shared diagnostic plumbing used by every compiler stage.
//!
//! Each stage collects its own error type (`LexError`, `ParseError`,
//! `SemError`, `CodegenError`) but all of them can be rendered through the
//! same `Diagnostic`/`DiagnosticSink` pair so `main.rs` has one formatting
//! path for the whole pipeline.

use std::fmt;

/// A 1-indexed line/column pair into the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A single diagnostic: a span, a stable code, and a message.
///
/// The code is stable across releases so tooling (and the scenario tests in
/// `tests/`) can match on it rather than scraping message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub code: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn new(span: Span, code: &'static str, message: impl Into<String>) -> Self {
        Diagnostic {
            span,
            code,
            message: message.into(),
        }
    }

    /// Render as `<path>:<line>:<col>: <code>: <message>` per the external
    /// error-reporting contract.
    pub fn render(&self, path: &str) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            path, self.span.line, self.span.col, self.code, self.message
        )
    }
}

/// An append-only, order-preserving collector of diagnostics for one stage.
///
/// "Append-only" and "preserve insertion order" are the invariants the
/// concurrency model requires of the diagnostic sink even though the
/// compiler itself is single-threaded: nothing is allowed to reorder or
/// retract a diagnostic once pushed.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, span: Span, code: &'static str, message: impl Into<String>) {
        self.push(Diagnostic::new(span, code, message));
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl IntoIterator for DiagnosticSink {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}
