//! Annotation expressions for the dictionary source.
//!
//! Annotations such as `(; = body(DUP) + 4 ;)` keep a literal field in sync
//! with a computed address or index. This crate turns the annotation text into
//! an [`Expr`] tree and evaluates it against an [`Environment`].
//!
//! ```text
//! annotation text → Lexer → Parser → Expr → evaluate(env) → Value
//! ```

pub mod ast;
mod error;
pub mod eval;
pub mod lexer;
mod parser;
pub mod token;

pub use ast::{BinOp, Expr, ExprKind};
pub use error::{ExprError, ExprResult};
pub use eval::{evaluate, Environment, Value};
pub use parser::{parse, parse_annotation};
