//! Runtime error types.

use thiserror::Error;

/// Boxed error returned by host handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A word module could not be linked into the running core.
///
/// No rollback happens: table growth performed before the failure stays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load module ({length} bytes at 0x{offset:x}): {reason}")]
pub struct LoadError {
    pub offset: u32,
    pub length: u32,
    pub reason: String,
}

impl LoadError {
    pub(crate) fn new(offset: u32, length: u32, reason: impl ToString) -> Self {
        Self {
            offset,
            length,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Compiling, instantiating or calling into the core failed.
    #[error(transparent)]
    Wasm(#[from] wasmi::Error),

    /// The host imports could not be registered.
    #[error("failed to link host imports: {0}")]
    Link(String),

    #[error("the core does not export `{0}`")]
    MissingExport(&'static str),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// `SCALL` named a function nothing is bound to.
    #[error("unbound SCALL: {0}")]
    UnboundCall(String),

    /// A string or buffer lies outside linear memory.
    #[error("memory access out of bounds: {0}")]
    Memory(String),
}

/// Runtime result type alias.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
