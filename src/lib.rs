//! cxx2c: a source-to-source transpiler from a practical C++ subset to C.
pub mod pipeline;

pub use cxx2c_core::{
    CompilerDatabaseImpl, Db, Diagnostic, DiagnosticKind, DiagnosticSeverity, SourceFile,
};
pub use pipeline::{CompilationResult, compile_with_diagnostics};
