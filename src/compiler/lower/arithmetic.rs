//! Binary operators: pointer offsets, pointer difference and `size` mixing.

use super::{LoweringContext, Lowered, Lowerer};
use crate::compiler::diagnostics::DiagnosticCode;
use crate::compiler::fold::{fold_binary, fold_literals};
use crate::compiler::memory_model::ScalarKind;
use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, Expr, ExprKind};
use crate::types::{categories_equal, PointerDescriptor, TypeCategory};

impl<'a> Lowerer<'a> {
    pub(super) fn lower_binary(&mut self, expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> Expr {
        match self.binary_parts(expr, op, left, right) {
            Ok(e) => e.at(expr.span),
            Err(_) => expr.clone(),
        }
    }

    fn binary_parts(&mut self, expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> Lowered<Expr> {
        let left_category = self.category(left);
        let right_category = self.category(right);
        match (left_category.as_pointer(), right_category.as_pointer()) {
            (Some(a), Some(b)) if op.is_arithmetic() => {
                self.pointer_difference(expr, op, left, right, a, b)
            }
            (Some(desc), None) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
                Ok(self.offset_pointer(op, left, right, desc))
            }
            (None, Some(desc)) if op == BinaryOp::Add => Ok(self.offset_pointer(op, right, left, desc)),
            (Some(_), None) if op.is_arithmetic() && self.session.width().is_64() => {
                let op = if op == BinaryOp::UShr { BinaryOp::Shr } else { op };
                let l = self.lower_expr(left, LoweringContext::value());
                let r = self.boxed(right);
                Ok(binary(op, l, r))
            }
            _ if left_category == TypeCategory::Size || right_category == TypeCategory::Size => {
                self.size_binary(op, left, right)
            }
            _ => {
                let l = self.lower_expr(left, LoweringContext::value());
                let r = self.lower_expr(right, LoweringContext::value());
                if self.foldable(op, (left, &l), (right, &r)) {
                    let folded = fold_binary(op, l, r);
                    if let ExprKind::Binary { .. } = folded.kind {
                        return Ok(Expr::new(expr.id, expr.span, folded.kind));
                    }
                    return Ok(folded);
                }
                Ok(Expr::new(
                    expr.id,
                    expr.span,
                    ExprKind::Binary {
                        op,
                        left: Box::new(l),
                        right: Box::new(r),
                    },
                ))
            }
        }
    }

    /// Whether literal folding and identities may rewrite `left op right`
    ///
    /// `+` needs two operands known to be numeric so string concatenation is
    /// never touched. The other operators coerce to numbers anyway and only
    /// skip string literals.
    fn foldable(&self, op: BinaryOp, left: (&Expr, &Expr), right: (&Expr, &Expr)) -> bool {
        if !op.is_arithmetic() {
            return false;
        }
        let numeric = |(original, lowered): (&Expr, &Expr)| {
            lowered.as_number().is_some()
                || lowered.as_bigint().is_some()
                || matches!(
                    self.value_kind(original),
                    Some(kind) if !matches!(
                        kind,
                        ScalarKind::Bool | ScalarKind::AtomicBool | ScalarKind::Void | ScalarKind::Null
                    )
                )
        };
        if op == BinaryOp::Add {
            return numeric(left) && numeric(right);
        }
        !matches!(left.1.kind, ExprKind::String(_)) && !matches!(right.1.kind, ExprKind::String(_))
    }

    /// `p ± n`, with `n` scaled by the pointee size
    fn offset_pointer(&mut self, op: BinaryOp, pointer: &Expr, offset: &Expr, desc: PointerDescriptor) -> Expr {
        let base = self.lower_expr(pointer, LoweringContext::value());
        let step = self.step(desc);
        let scaled = self.scale(offset, step);
        fold_literals(op, base, scaled)
    }

    /// `p - q` in elements; every other arithmetic operator is rejected
    fn pointer_difference(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        a: PointerDescriptor,
        b: PointerDescriptor,
    ) -> Lowered<Expr> {
        if op != BinaryOp::Sub {
            return Err(self.report(
                expr.span,
                format!("`{}` cannot be applied to two pointers", op),
                DiagnosticCode::PointerPointerOperation,
            ));
        }
        let step = self.step(a);
        if !categories_equal(&TypeCategory::Pointer(a), &TypeCategory::Pointer(b)) || step != self.step(b) {
            return Err(self.report(
                expr.span,
                format!("`{}` and `{}` point to different types", left, right),
                DiagnosticCode::PointerPointerOperation,
            ));
        }
        let l = self.lower_expr(left, LoweringContext::value());
        let r = self.lower_expr(right, LoweringContext::value());
        let diff = binary(BinaryOp::Sub, l, r);
        if step == 1 {
            return Ok(diff);
        }
        // element counts are signed plain numbers in both widths
        let wide = self.session.width().is_64();
        Ok(match (step.is_power_of_two(), wide) {
            (true, true) => call_named(
                "Number",
                vec![binary(
                    BinaryOp::Shr,
                    paren(diff),
                    bigint(step.trailing_zeros() as i128),
                )],
            ),
            (true, false) => binary(BinaryOp::Shr, paren(diff), int(step.trailing_zeros() as i64)),
            (false, true) => call_named(
                "Number",
                vec![binary(BinaryOp::Div, paren(diff), bigint(step as i128))],
            ),
            (false, false) => binary(BinaryOp::Div, paren(diff), int(step as i64)),
        })
    }

    /// Arithmetic with a `size` operand; the other side must be a size or a literal
    fn size_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Lowered<Expr> {
        for operand in [left, right] {
            if !self.size_compatible(operand) {
                return Err(self.report(
                    operand.span,
                    format!("`{}` mixes a plain number with size", operand),
                    DiagnosticCode::SizeMixing,
                ));
            }
        }
        let l = self.lower_expr(left, LoweringContext::value());
        let r = self.lower_expr(right, LoweringContext::value());
        let l = self.box_literal(ScalarKind::Size, l);
        let r = self.box_literal(ScalarKind::Size, r);
        if op.is_arithmetic() {
            Ok(fold_binary(op, l, r))
        } else {
            Ok(binary(op, l, r))
        }
    }

    /// A lowered operand as a host big integer
    pub(super) fn boxed(&mut self, expr: &Expr) -> Expr {
        let lowered = self.lower_expr(expr, LoweringContext::value());
        if let Some(n) = lowered.as_number() {
            if n.fract() == 0.0 {
                return bigint(n as i128);
            }
        }
        if lowered.as_bigint().is_some() || self.is_bigint_valued(expr) {
            lowered
        } else {
            call_named("BigInt", vec![lowered])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{lower, lower_with, wide};
    use super::*;
    use crate::compiler::fold::eval_numbers;
    use crate::types::{TypeId, TypeTable};

    fn pointer_to(t: &mut TypeTable, scalar: &str) -> TypeId {
        let s = t.scalar(scalar);
        t.pointer(s)
    }

    #[test]
    fn test_pointer_offset() {
        let mut t = TypeTable::new();
        let ptr = pointer_to(&mut t, "uint32");
        let i32t = t.scalar("int32");
        let p = t.ident("p", ptr);
        let i = t.ident("i", i32t);

        let lit = binary(BinaryOp::Add, p.clone(), int(1));
        assert_eq!(lower(&t, &lit).0, "p + 4");
        assert_eq!(lower_with(&t, wide(), &lit).0, "p + 4n");

        let var = binary(BinaryOp::Sub, p.clone(), i.clone());
        assert_eq!(lower(&t, &var).0, "p - (i * 4)");
        assert_eq!(lower_with(&t, wide(), &var).0, "p - (BigInt(i) * 4n)");

        let flipped = binary(BinaryOp::Add, int(2), p);
        assert_eq!(lower(&t, &flipped).0, "p + 8");
    }

    #[test]
    fn test_pointer_difference() {
        let mut t = TypeTable::new();
        let words = pointer_to(&mut t, "uint32");
        let bytes = pointer_to(&mut t, "uint8");
        let u8t = t.scalar("uint8");
        let (_, rgb) = t.declare_struct("Rgb", vec![("r", u8t), ("g", u8t), ("b", u8t)]);
        let rgbs = t.pointer(rgb);

        let p = t.ident("p", words);
        let q = t.ident("q", words);
        let words_diff = binary(BinaryOp::Sub, p.clone(), q.clone());
        assert_eq!(lower(&t, &words_diff).0, "(p - q) >> 2");
        assert_eq!(lower_with(&t, wide(), &words_diff).0, "Number((p - q) >> 2n)");

        let a = t.ident("a", bytes);
        let b = t.ident("b", bytes);
        assert_eq!(lower(&t, &binary(BinaryOp::Sub, a.clone(), b)).0, "a - b");

        let x = t.ident("x", rgbs);
        let y = t.ident("y", rgbs);
        let rgb_diff = binary(BinaryOp::Sub, x, y);
        assert_eq!(lower(&t, &rgb_diff).0, "(x - y) / 3");
        assert_eq!(lower_with(&t, wide(), &rgb_diff).0, "Number((x - y) / 3n)");

        let (text, diagnostics) = lower(&t, &binary(BinaryOp::Sub, p.clone(), a));
        assert_eq!(text, "p - a");
        assert_eq!(diagnostics[0].code, DiagnosticCode::PointerPointerOperation);

        let (_, diagnostics) = lower(&t, &binary(BinaryOp::Add, p.clone(), q.clone()));
        assert_eq!(diagnostics[0].code, DiagnosticCode::PointerPointerOperation);

        let (_, diagnostics) = lower(&t, &binary(BinaryOp::StrictEq, p, q));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_pointer_difference_keeps_sign() {
        let mut t = TypeTable::new();
        let words = pointer_to(&mut t, "uint32");
        let p = t.ident("p", words);
        let q = t.ident("q", words);
        let text = lower(&t, &binary(BinaryOp::Sub, p, q)).0;
        assert!(!text.contains(">>>"), "{}", text);
        // q eight bytes past p is two elements behind
        let shifted = eval_numbers(BinaryOp::Shr, -8.0, 2.0);
        assert_eq!(shifted, Some(-2.0));
    }

    #[test]
    fn test_wide_pointer_operands_are_boxed() {
        let mut t = TypeTable::new();
        let ptr = pointer_to(&mut t, "uint8");
        let i32t = t.scalar("int32");
        let p = t.ident("p", ptr);
        let n = t.ident("n", i32t);
        let shift = binary(BinaryOp::UShr, p.clone(), int(3));
        assert_eq!(lower_with(&t, wide(), &shift).0, "p >> 3n");
        assert_eq!(lower(&t, &shift).0, "p >>> 3");
        let rem = binary(BinaryOp::Mod, p, n);
        assert_eq!(lower_with(&t, wide(), &rem).0, "p % BigInt(n)");
    }

    #[test]
    fn test_size_mixing() {
        let mut t = TypeTable::new();
        let size = t.scalar("size");
        let i32t = t.scalar("int32");
        let s = t.ident("s", size);
        let n = t.ident("n", i32t);
        let lit = binary(BinaryOp::Add, s.clone(), int(1));
        assert_eq!(lower(&t, &lit).0, "s + 1");
        assert_eq!(lower_with(&t, wide(), &lit).0, "s + 1n");

        let (text, diagnostics) = lower(&t, &binary(BinaryOp::Mul, s.clone(), n));
        assert_eq!(text, "s * n");
        assert_eq!(diagnostics[0].code, DiagnosticCode::SizeMixing);

        let both = binary(BinaryOp::Sub, s.clone(), s);
        assert!(lower(&t, &both).1.is_empty());
    }
}
