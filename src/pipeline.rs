//! Compilation pipeline for cxx2c.
//!
//! Each stage is a Salsa tracked query, independently cacheable:
//!
//! ```text
//! SourceFile
//!     │
//!     ▼
//! stage_parse ─► TranslationUnit (AST)
//!     │
//!     ▼
//! stage_hir ─► HirUnit (resolved, constexpr-folded, monomorphized)
//!     │
//!     ▼
//! stage_emit ─► C source text (ownership lowered, cleanups inserted)
//! ```
//!
//! Stages run strictly in this order within one unit; each consumes the
//! complete output of its predecessor. Independent units share nothing, so a
//! caller may compile them on separate databases in parallel.
//!
//! Diagnostics are collected with Salsa accumulators: each stage emits via
//! `Diagnostic { .. }.accumulate(db)` and the pipeline gathers everything at
//! the end. No C text is handed out for a unit once any error was recorded.

use cxx2c_core::{Diagnostic, DiagnosticSeverity, SourceFile};

/// Stage 1: parse source text into an AST.
pub use cxx2c_ast::parse_translation_unit as stage_parse;

/// Stage 2: resolve names, evaluate constexpr code, monomorphize templates.
pub use cxx2c_hir::lower_to_hir as stage_hir;

/// Stage 3: lower ownership/RAII and render C text.
pub use cxx2c_cgen::emit_unit as stage_emit;

/// Result of the full pipeline for one translation unit.
pub struct CompilationResult {
    /// The generated C source; None when the unit had errors.
    pub c_source: Option<String>,
    /// Diagnostics collected from all stages.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilationResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }
}

/// Run the full pipeline on a source file and collect its diagnostics.
pub fn compile_with_diagnostics(
    db: &dyn salsa::Database,
    source: SourceFile,
) -> CompilationResult {
    let c_source = cxx2c_cgen::emit_unit(db, source);
    let diagnostics = cxx2c_cgen::unit_diagnostics(db, source);
    let failed = diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error);
    CompilationResult {
        c_source: if failed { None } else { c_source },
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxx2c_core::CompilerDatabaseImpl;
    use salsa::Database;

    fn compile(source: &str) -> CompilationResult {
        CompilerDatabaseImpl::default().attach(|db| {
            let file = SourceFile::from_text(db, "test.cpp", source.to_string());
            compile_with_diagnostics(db, file)
        })
    }

    #[test]
    fn minimal_program_produces_c() {
        let result = compile("int main() {\n    return 0;\n}\n");
        assert!(!result.has_errors(), "diagnostics: {:?}", result.diagnostics);
        let text = result.c_source.expect("C output");
        assert!(text.contains("int main(void)"));
        assert!(text.contains("return 0;"));
    }

    #[test]
    fn syntax_error_suppresses_output() {
        let result = compile("int main( {\n    return 0;\n}\n");
        assert!(result.has_errors());
        assert!(result.c_source.is_none());
    }

    #[test]
    fn resolution_error_suppresses_output() {
        let result = compile("int main() {\n    return missing;\n}\n");
        assert!(result.has_errors());
        assert!(result.c_source.is_none());
    }
}
