//! Semantic analysis and lowering to a template-free HIR: symbol tables,
//! constexpr evaluation, and template monomorphization.
pub mod consteval;
pub mod hir;
pub mod lower;
pub mod mono;
pub mod queries;
pub mod symbols;
pub mod types;

pub use consteval::{ConstEvaluator, ConstValue, EvalError};
pub use hir::*;
pub use queries::lower_to_hir;
pub use types::{Subst, Ty, TyArg};
