//! Shared types for wafo.
//!
//! This crate defines the byte-packing helpers, the dictionary record layout
//! and the source bookkeeping shared by the expression evaluator, the
//! dictionary linker and the runtime.

pub mod dictionary;
mod error;
pub mod pack;
mod span;

pub use dictionary::{DictionaryEntry, Flags, StringElement, MAX_NAME_LEN};
pub use error::PackError;
pub use span::{SourceFile, Span};

/// Result type used by the packing helpers.
pub type Result<T> = std::result::Result<T, PackError>;
