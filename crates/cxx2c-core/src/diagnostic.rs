//! Diagnostic messages emitted during transpilation.

use crate::span::{Span, line_col};

/// A diagnostic message (error, warning, or info) with source location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[salsa::accumulator]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub severity: DiagnosticSeverity,
    pub phase: CompilationPhase,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, phase: CompilationPhase, span: Span, message: String) -> Self {
        Diagnostic {
            message,
            span,
            severity: DiagnosticSeverity::Error,
            phase,
            kind,
        }
    }

    /// Internal invariant failures are surfaced distinctly from user errors:
    /// they indicate a gap in the transpiler, not a mistake in the input.
    pub fn is_internal(&self) -> bool {
        self.kind == DiagnosticKind::UnsupportedConstruct
    }

    /// Render the diagnostic against the source text it was produced from.
    pub fn render(&self, path: &str, text: &str) -> String {
        let (line, col) = line_col(text, self.span.start);
        let tag = if self.is_internal() {
            "internal error".to_string()
        } else {
            format!("{}[{}]", self.severity, self.kind)
        };
        format!("{tag}: {path}:{line}:{col}: {}", self.message)
    }
}

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

/// What went wrong, in user-facing terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    SyntaxError,
    UnresolvedName,
    DuplicateDeclaration,
    AmbiguousCall,
    NonConstantEvaluation,
    EvaluationLimitExceeded,
    TemplateArgument,
    UseAfterMove,
    UnsupportedConstruct,
}

/// Compilation phase where a diagnostic was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompilationPhase {
    Parsing,
    NameResolution,
    ConstEvaluation,
    Monomorphization,
    OwnershipLowering,
    Emission,
}

impl std::fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Info => write!(f, "info"),
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::SyntaxError => "SyntaxError",
            DiagnosticKind::UnresolvedName => "UnresolvedNameError",
            DiagnosticKind::DuplicateDeclaration => "DuplicateDeclarationError",
            DiagnosticKind::AmbiguousCall => "AmbiguousCallError",
            DiagnosticKind::NonConstantEvaluation => "NonConstantEvaluationError",
            DiagnosticKind::EvaluationLimitExceeded => "EvaluationLimitExceeded",
            DiagnosticKind::TemplateArgument => "TemplateArgumentError",
            DiagnosticKind::UseAfterMove => "UseAfterMoveError",
            DiagnosticKind::UnsupportedConstruct => "UnsupportedConstructError",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_location_and_kind() {
        let diag = Diagnostic::error(
            DiagnosticKind::SyntaxError,
            CompilationPhase::Parsing,
            Span::new(7, 8),
            "expected `;`".to_string(),
        );
        let rendered = diag.render("main.cpp", "int x;\nint y\n");
        assert_eq!(rendered, "error[SyntaxError]: main.cpp:2:1: expected `;`");
    }

    #[test]
    fn internal_errors_render_distinctly() {
        let diag = Diagnostic::error(
            DiagnosticKind::UnsupportedConstruct,
            CompilationPhase::Emission,
            Span::new(0, 0),
            "unlowered node".to_string(),
        );
        assert!(diag.is_internal());
        assert!(diag.render("a.cpp", "x").starts_with("internal error:"));
    }
}
