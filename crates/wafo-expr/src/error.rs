//! Expression error types.

use thiserror::Error;
use wafo_types::Span;

/// Errors raised while parsing or evaluating an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// The annotation text is not a well-formed expression.
    #[error("syntax error at {span}: {message}")]
    Syntax { message: String, span: Span },

    /// An identifier that is not a declared constant.
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// `body` or `index` of a word that is not in the dictionary.
    #[error("dictionary entry not found: {0}")]
    UnknownEntry(String),

    /// `str` of a literal that is not in the string area.
    #[error("string not found: {0:?}")]
    UnknownString(String),

    #[error("`{func}` expects {expected} argument(s), got {got}")]
    Arity {
        func: String,
        expected: usize,
        got: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,
}

impl ExprError {
    pub(crate) fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    /// `true` if the annotation could not be parsed at all.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

/// Expression result type alias.
pub type ExprResult<T> = Result<T, ExprError>;
