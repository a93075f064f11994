//! Linker error types.

use thiserror::Error;
use wafo_expr::ExprError;

/// Errors that abort a link before any output is produced.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The source does not have the expected shape: a malformed data
    /// record, an over-long name, a bad definition or a missing base
    /// constant.
    #[error("format error{}: {message}", line_suffix(*.line))]
    Format {
        line: Option<u32>,
        message: String,
    },

    /// An annotation refers to something that does not exist, or cannot be
    /// evaluated.
    #[error("cannot resolve `{expr}` ({context}): {source}")]
    Resolution {
        context: String,
        expr: String,
        #[source]
        source: ExprError,
    },

    /// Check mode found a literal that disagrees with its annotation.
    #[error("{context}: expected {expected}, found {found}")]
    Consistency {
        context: String,
        expected: String,
        found: String,
    },
}

fn line_suffix(line: Option<u32>) -> String {
    line.map(|n| format!(" on line {n}")).unwrap_or_default()
}

impl LinkError {
    pub(crate) fn format(line: impl Into<Option<u32>>, message: impl Into<String>) -> Self {
        Self::Format {
            line: line.into(),
            message: message.into(),
        }
    }

    /// Map an expression error: unparseable annotations are format errors,
    /// everything else failed to resolve.
    pub(crate) fn from_expr(
        source: ExprError,
        expr: &str,
        context: impl Into<String>,
        line: u32,
    ) -> Self {
        if source.is_syntax() {
            Self::format(line, format!("bad annotation `{expr}`: {source}"))
        } else {
            Self::Resolution {
                context: context.into(),
                expr: expr.to_string(),
                source,
            }
        }
    }
}

/// Linker result type alias.
pub type LinkResult<T> = Result<T, LinkError>;
