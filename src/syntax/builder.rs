//! Constructors for synthesized expression nodes.
//!
//! Every node built here is detached: it carries [`NodeId::DETACHED`] and the
//! type oracle has no entry for it.

use super::ast::*;

pub fn ident(name: impl Into<String>) -> Expr {
    Expr::detached(ExprKind::Identifier(name.into()))
}

pub fn num(value: f64) -> Expr {
    Expr::detached(ExprKind::Number(value))
}

/// Integer number literal
pub fn int(value: i64) -> Expr {
    num(value as f64)
}

pub fn bigint(value: i128) -> Expr {
    Expr::detached(ExprKind::BigInt(value))
}

pub fn string(value: impl Into<String>) -> Expr {
    Expr::detached(ExprKind::String(value.into()))
}

pub fn boolean(value: bool) -> Expr {
    Expr::detached(ExprKind::Bool(value))
}

pub fn paren(expr: Expr) -> Expr {
    match expr.kind {
        ExprKind::Paren(_) => expr,
        _ => Expr::detached(ExprKind::Paren(Box::new(expr))),
    }
}

pub fn property(object: Expr, name: impl Into<String>) -> Expr {
    Expr::detached(ExprKind::Property {
        object: Box::new(object),
        name: name.into(),
    })
}

pub fn index(object: Expr, index: Expr) -> Expr {
    Expr::detached(ExprKind::Index {
        object: Box::new(object),
        index: Box::new(index),
    })
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::detached(ExprKind::Call {
        callee: Box::new(callee),
        type_args: Vec::new(),
        args,
    })
}

/// `name(args)`
pub fn call_named(name: &str, args: Vec<Expr>) -> Expr {
    call(ident(name), args)
}

/// `object.method(args)`
pub fn method(object: Expr, name: &str, args: Vec<Expr>) -> Expr {
    call(property(object, name), args)
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::detached(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn assign(op: AssignOp, target: Expr, value: Expr) -> Expr {
    Expr::detached(ExprKind::Assign {
        op,
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::detached(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

/// `!!expr`
pub fn not_not(expr: Expr) -> Expr {
    unary(UnaryOp::Not, unary(UnaryOp::Not, expr))
}

pub fn conditional(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::detached(ExprKind::Conditional {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

/// Comma sequence; a single element is returned as is
pub fn comma(mut list: Vec<Expr>) -> Expr {
    if list.len() == 1 {
        if let Some(only) = list.pop() {
            return only;
        }
    }
    Expr::detached(ExprKind::Comma(list))
}

pub fn object(properties: Vec<(String, Expr)>) -> Expr {
    Expr::detached(ExprKind::Object(
        properties
            .into_iter()
            .map(|(key, value)| ObjectProperty { key, value })
            .collect(),
    ))
}

/// `left + right`, merging literal offsets so `a + 2 + 3` becomes `a + 5`
pub fn plus(left: Expr, right: Expr) -> Expr {
    let rn = right.as_number();
    let rb = right.as_bigint();
    if rn == Some(0.0) || rb == Some(0) {
        return left;
    }
    if let (Some(l), Some(r)) = (left.as_number(), rn) {
        return num(l + r);
    }
    if let (Some(l), Some(r)) = (left.as_bigint(), rb) {
        return bigint(l + r);
    }
    if let ExprKind::Binary {
        op: BinaryOp::Add,
        left: base,
        right: offset,
    } = &left.kind
    {
        if let (Some(l), Some(r)) = (offset.as_number(), rn) {
            return binary(BinaryOp::Add, (**base).clone(), num(l + r));
        }
        if let (Some(l), Some(r)) = (offset.as_bigint(), rb) {
            return binary(BinaryOp::Add, (**base).clone(), bigint(l + r));
        }
    }
    binary(BinaryOp::Add, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_merges_literal_offsets() {
        let e = plus(plus(ident("a"), int(2)), int(3));
        assert_eq!(e, binary(BinaryOp::Add, ident("a"), int(5)));
    }

    #[test]
    fn test_plus_drops_zero() {
        assert_eq!(plus(ident("p"), int(0)), ident("p"));
        assert_eq!(plus(ident("p"), bigint(0)), ident("p"));
    }

    #[test]
    fn test_plus_merges_bigint_offsets() {
        let e = plus(plus(ident("a"), bigint(80)), bigint(16));
        assert_eq!(e, binary(BinaryOp::Add, ident("a"), bigint(96)));
    }

    #[test]
    fn test_comma_single() {
        assert_eq!(comma(vec![ident("x")]), ident("x"));
    }
}
