//! Shared transpiler utilities: spans, diagnostics, and the Salsa database.
pub mod database;
pub mod diagnostic;
pub mod span;

pub use database::{CompilerDatabaseImpl, Db, SourceFile};
pub use diagnostic::{CompilationPhase, Diagnostic, DiagnosticKind, DiagnosticSeverity};
pub use span::{Span, Spanned, line_col};
