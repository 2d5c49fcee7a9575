//! Constant folding on expression trees.
//!
//! - Literal folding: arithmetic on two number literals, or two big-integer
//!   literals whose result stays a safe integer, becomes a single literal
//! - Identity simplification: `x + 0`, `x - 0`, `x * 1`, `x / 1`, and `x * 0`
//!   for side-effect free `x`
//!
//! Number arithmetic follows host semantics: bitwise operators work on 32-bit
//! integers and division by zero is left for run time.

use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, Expr, ExprKind};

/// Largest integer a host number holds exactly
pub const MAX_SAFE_INTEGER: i128 = 9_007_199_254_740_991;

/// Host `ToInt32`
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
}

/// Host `ToUint32`
pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

/// Evaluate `a op b` on two host numbers
pub fn eval_numbers(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b != 0.0 => a / b,
        BinaryOp::Mod if b != 0.0 => a % b,
        BinaryOp::Exp => a.powf(b),
        BinaryOp::Shl => to_int32(a).wrapping_shl(to_uint32(b) & 31) as f64,
        BinaryOp::Shr => (to_int32(a) >> (to_uint32(b) & 31)) as f64,
        BinaryOp::UShr => (to_uint32(a) >> (to_uint32(b) & 31)) as f64,
        BinaryOp::BitAnd => (to_int32(a) & to_int32(b)) as f64,
        BinaryOp::BitOr => (to_int32(a) | to_int32(b)) as f64,
        BinaryOp::BitXor => (to_int32(a) ^ to_int32(b)) as f64,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Evaluate `a op b` on two big integers, refusing results outside the safe range
pub fn eval_bigints(op: BinaryOp, a: i128, b: i128) -> Option<i128> {
    let value = match op {
        BinaryOp::Add => a.checked_add(b)?,
        BinaryOp::Sub => a.checked_sub(b)?,
        BinaryOp::Mul => a.checked_mul(b)?,
        BinaryOp::Div if b != 0 => a / b,
        BinaryOp::Mod if b != 0 => a % b,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl if (0..64).contains(&b) => a.checked_shl(b as u32)?,
        BinaryOp::Shr if (0..64).contains(&b) => a >> b,
        _ => return None,
    };
    (value.abs() <= MAX_SAFE_INTEGER).then_some(value)
}

/// Fold two literal operands, otherwise build the plain binary node
pub fn fold_literals(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        if let Some(v) = eval_numbers(op, a, b) {
            return num(v);
        }
    }
    if let (Some(a), Some(b)) = (left.as_bigint(), right.as_bigint()) {
        if let Some(v) = eval_bigints(op, a, b) {
            return bigint(v);
        }
    }
    binary(op, left, right)
}

/// Literal folding plus identity simplification; operands must be numeric
pub fn fold_binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let is_zero = |e: &Expr| e.as_number() == Some(0.0) || e.as_bigint() == Some(0);
    let is_one = |e: &Expr| e.as_number() == Some(1.0) || e.as_bigint() == Some(1);

    match op {
        BinaryOp::Add if is_zero(&right) && !left.is_literal() => return left,
        BinaryOp::Add if is_zero(&left) && !right.is_literal() => return right,
        BinaryOp::Sub if is_zero(&right) && !left.is_literal() => return left,
        BinaryOp::Mul | BinaryOp::Div if is_one(&right) && !left.is_literal() => return left,
        BinaryOp::Mul if is_one(&left) && !right.is_literal() => return right,
        BinaryOp::Mul if is_zero(&right) && is_pure(&left) && !left.is_literal() => return right,
        BinaryOp::Mul if is_zero(&left) && is_pure(&right) && !right.is_literal() => return left,
        _ => {}
    }
    fold_literals(op, left, right)
}

/// Whether evaluating `expr` twice, or not at all, is unobservable
pub fn is_pure(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Identifier(_)
        | ExprKind::Number(_)
        | ExprKind::BigInt(_)
        | ExprKind::String(_)
        | ExprKind::Bool(_)
        | ExprKind::Null => true,
        ExprKind::Paren(inner) => is_pure(inner),
        ExprKind::Binary { left, right, .. } => is_pure(left) && is_pure(right),
        ExprKind::Unary { operand, .. } => is_pure(operand),
        _ => false,
    }
}

/// Fold literal arithmetic bottom-up through a whole expression
pub fn fold_expr(expr: Expr) -> Expr {
    let Expr { id, span, kind } = expr;
    match kind {
        ExprKind::Binary { op, left, right } => {
            let left = fold_expr(*left);
            let right = fold_expr(*right);
            let folded = fold_literals(op, left, right);
            if matches!(folded.kind, ExprKind::Binary { .. }) {
                Expr::new(id, span, folded.kind)
            } else {
                folded.at(span)
            }
        }
        ExprKind::Paren(inner) => {
            let inner = fold_expr(*inner);
            if inner.is_literal() && !matches!(inner.precedence(), crate::syntax::Precedence::Unary) {
                inner
            } else {
                Expr::new(id, span, ExprKind::Paren(Box::new(inner)))
            }
        }
        other => Expr::new(id, span, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_folding() {
        assert_eq!(fold_literals(BinaryOp::Add, int(2), int(3)), int(5));
        assert_eq!(fold_literals(BinaryOp::Shl, int(1), int(4)), int(16));
        assert_eq!(fold_literals(BinaryOp::UShr, int(-1), int(0)), num(4294967295.0));
        assert_eq!(fold_literals(BinaryOp::BitAnd, int(0x1ff), int(0xff)), int(0xff));
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let e = fold_literals(BinaryOp::Div, int(1), int(0));
        assert!(matches!(e.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_bigint_folding_stays_safe() {
        assert_eq!(fold_literals(BinaryOp::Mul, bigint(4), bigint(8)), bigint(32));
        let big = fold_literals(BinaryOp::Mul, bigint(MAX_SAFE_INTEGER), bigint(2));
        assert!(matches!(big.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_identities() {
        assert_eq!(fold_binary(BinaryOp::Add, ident("x"), int(0)), ident("x"));
        assert_eq!(fold_binary(BinaryOp::Mul, ident("x"), int(1)), ident("x"));
        assert_eq!(fold_binary(BinaryOp::Div, ident("x"), bigint(1)), ident("x"));
        assert_eq!(fold_binary(BinaryOp::Mul, ident("x"), int(0)), int(0));
        let call = call_named("f", vec![]);
        let kept = fold_binary(BinaryOp::Mul, call, int(0));
        assert!(matches!(kept.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_fold_expr_nested() {
        let e = binary(
            BinaryOp::Add,
            ident("a"),
            paren(binary(BinaryOp::Mul, int(4), int(8))),
        );
        assert_eq!(fold_expr(e).to_string(), "a + 32");
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(4294967296.0 + 5.0), 5);
        assert_eq!(to_int32(2147483648.0), -2147483648);
        assert_eq!(to_int32(f64::NAN), 0);
    }
}
