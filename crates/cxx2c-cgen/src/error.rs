//! Error handling for C emission.

use derive_more::{Display, Error};

/// Result type for emitter operations.
pub type Result<T> = std::result::Result<T, EmitError>;

/// Errors that can occur while rendering C source.
///
/// These are internal invariant violations: every reachable construct is
/// lowered before emission, so hitting one means the transpiler itself has a
/// gap, not that the user made a mistake.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum EmitError {
    #[display("unsupported construct reached the emitter: {_0}")]
    UnsupportedConstruct(#[error(not(source))] String),
}
