//! Compile-time conditional compilation.
//!
//! A condition folds only when it mentions `defined(..)` and is built from
//! nothing but `defined(..)`, `true`, `false`, `!`, `&&`, `||` and
//! parentheses. Anything else in the condition keeps it a run-time check.

use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, Expr, ExprKind, Statement, UnaryOp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the flag lookup primitive
pub const DEFINED: &str = "defined";

/// Value of a compile-time flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// `true` / `false`
    Bool(bool),
    /// Numeric flag
    Number(f64),
    /// String flag
    String(String),
}

impl FlagValue {
    /// Host truthiness of the value
    pub fn truthy(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Number(n) => *n != 0.0 && !n.is_nan(),
            FlagValue::String(s) => !s.is_empty(),
        }
    }

    /// The value as a literal node
    pub fn to_expr(&self) -> Expr {
        match self {
            FlagValue::Bool(b) => boolean(*b),
            FlagValue::Number(n) => num(*n),
            FlagValue::String(s) => string(s.clone()),
        }
    }

    /// Parse a command-line value: `true`/`false`, a number, or any other text
    pub fn parse(text: &str) -> Self {
        match text {
            "true" => FlagValue::Bool(true),
            "false" => FlagValue::Bool(false),
            _ => match text.parse::<f64>() {
                Ok(n) => FlagValue::Number(n),
                Err(_) => FlagValue::String(text.to_string()),
            },
        }
    }
}

/// Flag name of a `defined(NAME)` call
pub fn defined_flag(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Call { callee, args, .. } if callee.as_identifier() == Some(DEFINED) => {
            match args.first().map(|a| &a.kind) {
                Some(ExprKind::Identifier(name)) | Some(ExprKind::String(name)) => Some(name.as_str()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn mentions_defined(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Paren(inner) => mentions_defined(inner),
        ExprKind::Unary { operand, .. } => mentions_defined(operand),
        ExprKind::Binary { left, right, .. } => mentions_defined(left) || mentions_defined(right),
        _ => defined_flag(expr).is_some(),
    }
}

fn only_primitives(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Paren(inner) => only_primitives(inner),
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => only_primitives(operand),
        ExprKind::Binary {
            op: BinaryOp::And | BinaryOp::Or,
            left,
            right,
        } => only_primitives(left) && only_primitives(right),
        ExprKind::Bool(_) => true,
        _ => defined_flag(expr).is_some(),
    }
}

/// Result of evaluating a foldable condition
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Selected outcome
    pub value: bool,
    /// `defined(..)` calls naming flags that are not configured
    pub unknown: Vec<Expr>,
}

/// Evaluates conditions against the configured flags
pub struct ConditionalFolder<'a> {
    flags: &'a BTreeMap<String, FlagValue>,
    file: &'a str,
}

impl<'a> ConditionalFolder<'a> {
    /// Create a folder over a flag table
    pub fn new(flags: &'a BTreeMap<String, FlagValue>, file: &'a str) -> Self {
        Self { flags, file }
    }

    /// Value of one flag; `__LINE__` and `__FILE__` are always defined
    pub fn lookup(&self, name: &str, line: u32) -> Option<FlagValue> {
        match name {
            "__LINE__" | "___LINE__" => Some(FlagValue::Number(line as f64)),
            "__FILE__" | "___FILE__" => Some(FlagValue::String(self.file.to_string())),
            _ => self.flags.get(name).cloned(),
        }
    }

    /// Whether `condition` can be decided at compile time
    pub fn is_foldable(&self, condition: &Expr) -> bool {
        mentions_defined(condition) && only_primitives(condition)
    }

    /// Decide a foldable condition
    ///
    /// Returns `None` when the condition is not foldable. An unknown flag
    /// counts as true, matching how an unresolved operand behaves at run time.
    pub fn evaluate(&self, condition: &Expr) -> Option<Evaluation> {
        if !self.is_foldable(condition) {
            return None;
        }
        let mut unknown = Vec::new();
        let value = self.compute(condition, &mut unknown);
        Some(Evaluation { value, unknown })
    }

    fn compute(&self, expr: &Expr, unknown: &mut Vec<Expr>) -> bool {
        match &expr.kind {
            ExprKind::Paren(inner) => self.compute(inner, unknown),
            ExprKind::Unary { operand, .. } => !self.compute(operand, unknown),
            ExprKind::Binary { op, left, right } => {
                let l = self.compute(left, unknown);
                let r = self.compute(right, unknown);
                match op {
                    BinaryOp::And => l && r,
                    _ => l || r,
                }
            }
            ExprKind::Bool(b) => *b,
            _ => match defined_flag(expr) {
                Some(name) => match self.lookup(name, expr.span.line) {
                    Some(value) => value.truthy(),
                    None => {
                        unknown.push(expr.clone());
                        true
                    }
                },
                None => true,
            },
        }
    }
}

/// Statements a selected branch contributes to the enclosing list
pub fn splice(branch: Statement) -> Vec<Statement> {
    match branch {
        Statement::Block(list) => list,
        other => vec![other],
    }
}

/// A statement list collapsed to one statement
pub fn collapse(mut list: Vec<Statement>) -> Statement {
    match list.len() {
        0 => Statement::Empty,
        1 => list.pop().unwrap_or(Statement::Empty),
        _ => Statement::Block(list),
    }
}
