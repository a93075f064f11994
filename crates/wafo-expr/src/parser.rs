//! Recursive-descent parser with operator precedence.
//!
//! Precedence (lowest → highest):
//! 3. `+`, `-`
//! 2. `*`, `/`, `%`
//! 1. unary `-`
//! 0. literals, identifiers, calls, parenthesised expressions

use wafo_types::Span;

use crate::ast::{BinOp, Expr, ExprKind};
use crate::error::{ExprError, ExprResult};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Functions whose arguments name dictionary words rather than values.
const WORD_FUNCTIONS: &[&str] = &["body", "index"];

/// Parse a complete expression.
pub fn parse(source: &str) -> ExprResult<Expr> {
    let tokens = Lexer::new(source).lex()?;
    let mut parser = Parser::new(tokens, source);
    let expr = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse the text of a `(; = ... ;)` annotation.
///
/// On top of [`parse`], two shorthands are accepted:
/// - a lone character literal `'c'` means `ord('c')`;
/// - `body(...)` / `index(...)` around text that does not parse as an
///   expression takes that text verbatim as the word name, so that names
///   like `1+` or `0=` need no quoting.
pub fn parse_annotation(text: &str) -> ExprResult<Expr> {
    let text = text.trim();
    match parse(text) {
        Ok(expr) => {
            if text.starts_with('\'') && matches!(expr.kind, ExprKind::Str(_)) {
                let span = expr.span;
                return Ok(Expr::new(
                    ExprKind::Call {
                        name: "ord".into(),
                        args: vec![expr],
                    },
                    span,
                ));
            }
            Ok(expr)
        }
        Err(err) => raw_word_call(text).ok_or(err),
    }
}

fn raw_word_call(text: &str) -> Option<Expr> {
    WORD_FUNCTIONS.iter().find_map(|&name| {
        let inner = text
            .strip_prefix(name)?
            .strip_prefix('(')?
            .strip_suffix(')')?;
        if inner.is_empty() || inner.starts_with(['"', '\'']) {
            return None;
        }
        let span = Span::new(0, text.len() as u32);
        let word_span = Span::new(name.len() as u32 + 1, text.len() as u32 - 1);
        Some(Expr::new(
            ExprKind::Call {
                name: name.to_string(),
                args: vec![Expr::new(ExprKind::Word(inner.to_string()), word_span)],
            },
            span,
        ))
    })
}

struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'src str,
}

impl<'src> Parser<'src> {
    fn new(tokens: Vec<Token>, source: &'src str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
        }
    }

    // ── Token cursor ─────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ExprResult<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected '{kind}'")))
        }
    }

    fn expect_eof(&self) -> ExprResult<()> {
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("expected end of expression"))
        }
    }

    fn unexpected(&self, context: &str) -> ExprError {
        let token = self.peek();
        ExprError::syntax(format!("{context}, got '{}'", token.kind), token.span)
    }

    fn text(&self, span: Span) -> &'src str {
        &self.source[span.start as usize..span.end as usize]
    }

    // ── Precedence chain ─────────────────────────────────────────────────

    fn parse_expression(&mut self) -> ExprResult<Expr> {
        self.parse_add()
    }

    /// `AddExpr = MulExpr { ("+" | "-") MulExpr }`
    fn parse_add(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    /// `MulExpr = UnaryExpr { ("*" | "/" | "%") UnaryExpr }`
    fn parse_mul(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    /// `UnaryExpr = [ "-" ] UnaryExpr | Primary`
    fn parse_unary(&mut self) -> ExprResult<Expr> {
        let start = self.peek().span;
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(ExprKind::Neg(Box::new(operand)), span));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(n), token.span))
            }
            TokenKind::Str { value, .. } => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(value), token.span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.peek().kind == TokenKind::LParen {
                    self.parse_call(name, token.span)
                } else {
                    Ok(Expr::new(ExprKind::Ident(name), token.span))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let close = self.expect(&TokenKind::RParen)?;
                Ok(Expr::new(inner.kind, token.span.merge(close.span)))
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    /// `Call = Ident "(" [ Expr { "," Expr } ] ")"`
    fn parse_call(&mut self, name: String, start: Span) -> ExprResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(&TokenKind::RParen)?;

        if WORD_FUNCTIONS.contains(&name.as_str()) {
            args = args
                .into_iter()
                .map(|arg| match arg.kind {
                    ExprKind::Str(_) => arg,
                    _ => Expr::new(ExprKind::Word(self.text(arg.span).to_string()), arg.span),
                })
                .collect();
        }

        Ok(Expr::new(
            ExprKind::Call { name, args },
            start.merge(close.span),
        ))
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}
