//! Tree-walking evaluator.

use std::fmt;

use wafo_types::pack::pack_escaped;

use crate::ast::{BinOp, Expr, ExprKind};
use crate::error::{ExprError, ExprResult};

/// Result of evaluating an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    /// Byte text as it appears inside a WAT string literal. `pack` produces
    /// the escaped form (`\01\00\00\00`).
    Str(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Symbols an expression can refer to.
///
/// Every lookup returns `None` when the name is unknown; the evaluator turns
/// that into the matching [`ExprError`].
pub trait Environment {
    /// Value of a named constant.
    fn constant(&self, name: &str) -> Option<i64>;
    /// Address of the first cell after a word's header.
    fn body(&self, word: &str) -> Option<i64>;
    /// Call table slot of a word.
    fn index(&self, word: &str) -> Option<i64>;
    /// Address of a counted string in the string area.
    fn string_address(&self, text: &str) -> Option<i64>;
}

/// Evaluate an expression against `env`.
pub fn evaluate(expr: &Expr, env: &dyn Environment) -> ExprResult<Value> {
    Evaluator { env }.eval(expr)
}

struct Evaluator<'env> {
    env: &'env dyn Environment,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> ExprResult<Value> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Str(s) | ExprKind::Word(s) => Ok(Value::Str(s.clone())),
            ExprKind::Ident(name) => self
                .env
                .constant(name)
                .map(Value::Int)
                .ok_or_else(|| ExprError::UnknownSymbol(name.clone())),
            ExprKind::Neg(inner) => {
                let n = self.eval_int(inner, "operand of unary '-'")?;
                n.checked_neg().map(Value::Int).ok_or(ExprError::Overflow)
            }
            ExprKind::Binary { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(l, *op, r)
            }
            ExprKind::Call { name, args } => self.call(name, args),
        }
    }

    fn eval_int(&self, expr: &Expr, context: &str) -> ExprResult<i64> {
        match self.eval(expr)? {
            Value::Int(n) => Ok(n),
            other => Err(ExprError::TypeMismatch(format!(
                "{context} must be an integer, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_str(&self, expr: &Expr, context: &str) -> ExprResult<String> {
        match self.eval(expr)? {
            Value::Str(s) => Ok(s),
            other => Err(ExprError::TypeMismatch(format!(
                "{context} must be a string, got {}",
                other.type_name()
            ))),
        }
    }

    fn call(&self, name: &str, args: &[Expr]) -> ExprResult<Value> {
        let arg = match args {
            [arg] => arg,
            _ => {
                return Err(ExprError::Arity {
                    func: name.to_string(),
                    expected: 1,
                    got: args.len(),
                })
            }
        };
        let context = format!("argument of `{name}`");
        match name {
            "body" => {
                let word = self.eval_str(arg, &context)?;
                self.env
                    .body(&word)
                    .map(Value::Int)
                    .ok_or(ExprError::UnknownEntry(word))
            }
            "index" => {
                let word = self.eval_str(arg, &context)?;
                self.env
                    .index(&word)
                    .map(Value::Int)
                    .ok_or(ExprError::UnknownEntry(word))
            }
            "str" => {
                let text = self.eval_str(arg, &context)?;
                self.env
                    .string_address(&text)
                    .map(Value::Int)
                    .ok_or(ExprError::UnknownString(text))
            }
            "len" => {
                let text = self.eval_str(arg, &context)?;
                Ok(Value::Int(text.len() as i64))
            }
            "ord" => {
                let text = self.eval_str(arg, &context)?;
                text.chars()
                    .next()
                    .map(|c| Value::Int(i64::from(u32::from(c))))
                    .ok_or_else(|| ExprError::TypeMismatch("`ord` of an empty string".into()))
            }
            "pack" => {
                let n = self.eval_int(arg, &context)?;
                Ok(Value::Str(pack_escaped(n)))
            }
            _ => Err(ExprError::UnknownFunction(name.to_string())),
        }
    }
}

fn binary(left: Value, op: BinOp, right: Value) -> ExprResult<Value> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => {
            let result = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Div | BinOp::Mod if r == 0 => return Err(ExprError::DivisionByZero),
                BinOp::Div => l.checked_div(r),
                BinOp::Mod => l.checked_rem(r),
            };
            result.map(Value::Int).ok_or(ExprError::Overflow)
        }
        (Value::Str(l), Value::Str(r)) if op == BinOp::Add => Ok(Value::Str(l + &r)),
        (l, r) => Err(ExprError::TypeMismatch(format!(
            "cannot apply '{op}' to {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}
