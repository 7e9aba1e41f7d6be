//! Ownership/RAII lowering onto a C-level AST and the C emitter.
pub mod c_ast;
pub mod emit;
pub mod error;
pub mod lower;
pub mod ownership;
pub mod queries;

pub use emit::emit_program;
pub use error::EmitError;
pub use queries::{emit_unit, unit_diagnostics};
