use thiserror::Error;

/// Errors raised while decoding packed or escaped data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    /// A `\` escape that is neither two hex digits nor a known character escape.
    #[error("invalid escape `\\{escape}` at byte {at}")]
    InvalidEscape { escape: String, at: usize },

    /// The text ended in the middle of an escape sequence.
    #[error("unterminated escape at byte {0}")]
    UnterminatedEscape(usize),

    /// More bytes than fit in a 32-bit cell.
    #[error("packed value is {0} bytes wide, expected at most 4")]
    TooWide(usize),
}
