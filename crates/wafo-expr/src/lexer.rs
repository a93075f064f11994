//! Annotation lexer — converts expression text to a token stream.
//!
//! Identifiers may contain `!` so that definition names such as
//! `!nextTableIndex` can be referenced. Strings accept both quote styles and
//! the escapes `\\`, `\"`, `\'`, `\n`, `\t`, `\r`.

use wafo_types::Span;

use crate::error::{ExprError, ExprResult};
use crate::token::{Token, TokenKind};

/// The annotation lexer.
pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
        }
    }

    /// Lex the whole text. The stream always ends with [`TokenKind::Eof`].
    pub fn lex(mut self) -> ExprResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    // ── Character-level helpers ──────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos as u32)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    // ── Scanning ─────────────────────────────────────────────────────────

    fn scan(&mut self) -> ExprResult<Token> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.advance() else {
            return Ok(Token::new(TokenKind::Eof, Span::point(start as u32)));
        };
        let kind = match ch {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b'"' | b'\'' => return self.scan_string(ch, start),
            b'0'..=b'9' => return self.scan_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'!' => return Ok(self.scan_identifier(start)),
            other => {
                return Err(ExprError::syntax(
                    format!("unexpected character '{}'", other as char),
                    self.span_from(start),
                ))
            }
        };
        Ok(Token::new(kind, self.span_from(start)))
    }

    fn scan_number(&mut self, start: usize) -> ExprResult<Token> {
        let radix = if self.source[start] == b'0' && matches!(self.peek(), Some(b'x' | b'X')) {
            self.pos += 1;
            16
        } else {
            10
        };
        let digits_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let digits = if radix == 16 {
            &self.source[digits_start..self.pos]
        } else {
            &self.source[start..self.pos]
        };
        let text = std::str::from_utf8(digits).unwrap_or_default();
        match i64::from_str_radix(text, radix) {
            Ok(n) => Ok(Token::new(TokenKind::Int(n), self.span_from(start))),
            Err(_) => Err(ExprError::syntax(
                format!(
                    "invalid number literal '{}'",
                    String::from_utf8_lossy(&self.source[start..self.pos])
                ),
                self.span_from(start),
            )),
        }
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'!')
        {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        Token::new(TokenKind::Ident(name), self.span_from(start))
    }

    fn scan_string(&mut self, quote: u8, start: usize) -> ExprResult<Token> {
        let mut value = Vec::new();
        loop {
            match self.advance() {
                None => {
                    return Err(ExprError::syntax(
                        "unterminated string literal",
                        self.span_from(start),
                    ))
                }
                Some(c) if c == quote => break,
                Some(b'\\') => {
                    let escaped = match self.advance() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(c @ (b'\\' | b'"' | b'\'')) => c,
                        _ => {
                            return Err(ExprError::syntax(
                                "invalid escape in string literal",
                                self.span_from(start),
                            ))
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
        Ok(Token::new(
            TokenKind::Str {
                value: String::from_utf8_lossy(&value).into_owned(),
                single: quote == b'\'',
            },
            self.span_from(start),
        ))
    }
}
