//! Integration tests for annotation expressions.
//!
//! Covers the annotation shorthands used throughout the dictionary source,
//! evaluation against a small in-memory environment, and error reporting.

use std::collections::HashMap;

use wafo_expr::{evaluate, parse, parse_annotation, Environment, ExprError, ExprKind, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct TestEnv {
    constants: HashMap<String, i64>,
    words: HashMap<String, (i64, i64)>,
    strings: HashMap<String, i64>,
}

impl TestEnv {
    fn new() -> Self {
        let mut env = Self::default();
        env.constants.insert("DATA_SPACE_BASE".into(), 0x200);
        env.constants.insert("!nextTableIndex".into(), 0x42);
        env.words.insert("1+".into(), (0x310, 0x1a));
        env.words.insert("DUP".into(), (0x2c8, 0x11));
        env.words.insert("0=".into(), (0x300, 0x19));
        env.strings.insert("redefined ".into(), 0x205);
        env
    }
}

impl Environment for TestEnv {
    fn constant(&self, name: &str) -> Option<i64> {
        self.constants.get(name).copied()
    }
    fn body(&self, word: &str) -> Option<i64> {
        self.words.get(word).map(|(body, _)| *body)
    }
    fn index(&self, word: &str) -> Option<i64> {
        self.words.get(word).map(|(_, index)| *index)
    }
    fn string_address(&self, text: &str) -> Option<i64> {
        self.strings.get(text).copied()
    }
}

fn eval(text: &str) -> Result<Value, ExprError> {
    evaluate(&parse_annotation(text)?, &TestEnv::new())
}

fn eval_int(text: &str) -> i64 {
    match eval(text) {
        Ok(Value::Int(n)) => n,
        other => panic!("expected integer for {text:?}, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Annotation shorthands
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_body_with_operator_characters() {
    assert_eq!(eval_int("body(1+)"), 0x310);
    assert_eq!(eval_int("body(0=)"), 0x300);
}

#[test]
fn test_body_with_plain_name() {
    assert_eq!(eval_int("body(DUP)"), 0x2c8);
    assert_eq!(eval_int("body(\"DUP\") + 4"), 0x2cc);
}

#[test]
fn test_index_bare_and_quoted() {
    assert_eq!(eval_int("index(DUP)"), 0x11);
    assert_eq!(eval_int("index(\"1+\")"), 0x1a);
    assert_eq!(eval_int("index(1+)"), 0x1a);
}

#[test]
fn test_char_literal_means_ord() {
    assert_eq!(eval_int("'0'"), 48);
    assert_eq!(eval_int(" ' ' "), 32);
}

#[test]
fn test_quoted_char_inside_expression_stays_string() {
    assert_eq!(eval("'a' + 'b'").unwrap(), Value::Str("ab".into()));
}

// ══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_constants_and_arithmetic() {
    assert_eq!(eval_int("DATA_SPACE_BASE + 4 * 2"), 0x208);
    assert_eq!(eval_int("!nextTableIndex - 1"), 0x41);
    assert_eq!(eval_int("-(3 - 10) % 4"), 3);
}

#[test]
fn test_string_builtins() {
    assert_eq!(eval_int("str(\"redefined \")"), 0x205);
    assert_eq!(eval_int("len(\"redefined \")"), 10);
    assert_eq!(eval_int("ord(\"A\")"), 65);
}

#[test]
fn test_pack_produces_escaped_cell() {
    assert_eq!(
        eval("pack(body(DUP))").unwrap(),
        Value::Str("\\c8\\02\\00\\00".into())
    );
    assert_eq!(eval("pack(-1)").unwrap(), Value::Str("\\ff\\ff\\ff\\ff".into()));
}

#[test]
fn test_value_display() {
    assert_eq!(Value::Int(5).to_string(), "5");
    assert_eq!(Value::Str("\\01".into()).to_string(), "\"\\01\"");
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unknown_symbol_is_fatal() {
    assert_eq!(eval("UNDEFINED").unwrap_err(), ExprError::UnknownSymbol("UNDEFINED".into()));
}

#[test]
fn test_unknown_entry() {
    assert_eq!(eval("body(SWAP)").unwrap_err(), ExprError::UnknownEntry("SWAP".into()));
    assert_eq!(eval("index(2DROP)").unwrap_err(), ExprError::UnknownEntry("2DROP".into()));
}

#[test]
fn test_division_by_zero() {
    assert_eq!(eval("DATA_SPACE_BASE / (2 - 2)").unwrap_err(), ExprError::DivisionByZero);
}

#[test]
fn test_syntax_error_carries_span() {
    match parse("1 + * 2").unwrap_err() {
        ExprError::Syntax { span, .. } => assert_eq!(span.start, 4),
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_parse_tree_shape() {
    let expr = parse("str(\"x\")").unwrap();
    assert!(matches!(expr.kind, ExprKind::Call { ref name, ref args } if name == "str" && args.len() == 1));
}
