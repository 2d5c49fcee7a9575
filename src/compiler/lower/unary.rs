//! Prefix operators and `++`/`--` on pointers and memory places.

use super::place::{with_setup, Place, Slot};
use super::{LoweringContext, Lowered, Lowerer};
use crate::compiler::diagnostics::DiagnosticCode;
use crate::syntax::builder::*;
use crate::syntax::{AssignOp, BinaryOp, Expr, ExprKind, UnaryOp, UpdateOp};

impl<'a> Lowerer<'a> {
    pub(super) fn lower_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> Expr {
        let on_pointer = self.category(operand).as_pointer().is_some();
        if on_pointer && matches!(op, UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot) {
            self.session.report(
                expr.span,
                format!("`{}` cannot be applied to a pointer", op),
                DiagnosticCode::PointerUnary,
            );
            return expr.clone();
        }
        Expr::new(
            expr.id,
            expr.span,
            ExprKind::Unary {
                op,
                operand: Box::new(self.lower_expr(operand, LoweringContext::value())),
            },
        )
    }

    pub(super) fn lower_update(
        &mut self,
        expr: &Expr,
        op: UpdateOp,
        prefix: bool,
        operand: &Expr,
        cx: LoweringContext,
    ) -> Expr {
        let lowered = match self.place_of(operand) {
            Ok(Some(place)) => self.update_place(expr, op, prefix, place, cx),
            Ok(None) => Ok(self.update_variable(expr, op, prefix, operand, cx)),
            Err(reported) => Err(reported),
        };
        match lowered {
            Ok(e) => e.at(expr.span),
            Err(_) => expr.clone(),
        }
    }

    fn update_variable(
        &mut self,
        expr: &Expr,
        op: UpdateOp,
        prefix: bool,
        operand: &Expr,
        cx: LoweringContext,
    ) -> Expr {
        let target = match operand.kind {
            ExprKind::Identifier(_) => operand.clone(),
            _ => self.lower_expr(operand, LoweringContext::value()),
        };
        let Some(desc) = self.category(operand).as_pointer() else {
            return Expr::new(
                expr.id,
                expr.span,
                ExprKind::Update {
                    op,
                    prefix,
                    operand: Box::new(target),
                },
            );
        };
        let step = self.step(desc);
        let delta = self.address_lit(step);
        let (assign_op, undo) = match op {
            UpdateOp::Increment => (AssignOp::Add, BinaryOp::Sub),
            UpdateOp::Decrement => (AssignOp::Sub, BinaryOp::Add),
        };
        let moved = assign(assign_op, target.clone(), delta.clone());
        if prefix || cx.discard {
            return moved;
        }
        paren(comma(vec![moved, binary(undo, target, delta)]))
    }

    /// Read-modify-write of a memory place
    fn update_place(
        &mut self,
        expr: &Expr,
        op: UpdateOp,
        prefix: bool,
        place: Place,
        cx: LoweringContext,
    ) -> Lowered<Expr> {
        let one = match &place.slot {
            Slot::Pointer(desc) => {
                let step = self.step(*desc);
                self.address_lit(step)
            }
            Slot::Scalar(kind) | Slot::BitField { kind, .. } => {
                if kind.is_bigint(self.session.width()) {
                    bigint(1)
                } else {
                    int(1)
                }
            }
            Slot::Aggregate(_) | Slot::Array { .. } => {
                return Err(self.report(
                    expr.span,
                    format!("`{}` cannot be applied to an aggregate", op),
                    DiagnosticCode::StructMismatch,
                ))
            }
        };
        let bop = match op {
            UpdateOp::Increment => BinaryOp::Add,
            UpdateOp::Decrement => BinaryOp::Sub,
        };
        let (setup, addr) = self.stabilize(place.addr);
        let place = Place {
            addr,
            slot: place.slot,
        };
        let current = self.read(place.clone());
        if cx.discard || prefix {
            let write = self.store(place.clone(), binary(bop, current, one));
            if cx.discard {
                return Ok(with_setup(setup, write));
            }
            let mut list: Vec<Expr> = setup.into_iter().collect();
            list.push(write);
            list.push(self.read(place));
            return Ok(paren(comma(list)));
        }
        let old = self.session.fresh_temp();
        self.scopes.hoist(old.clone());
        let mut list: Vec<Expr> = setup.into_iter().collect();
        list.push(assign(AssignOp::Assign, ident(old.clone()), current));
        list.push(self.store(place, binary(bop, ident(old.clone()), one)));
        list.push(ident(old));
        Ok(paren(comma(list)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{lower, lower_with, prop, wide};
    use super::*;
    use crate::types::TypeTable;

    fn update(op: UpdateOp, prefix: bool, operand: Expr) -> Expr {
        Expr::detached(ExprKind::Update {
            op,
            prefix,
            operand: Box::new(operand),
        })
    }

    #[test]
    fn test_prefix_operators_on_pointers() {
        let mut t = TypeTable::new();
        let u32t = t.scalar("uint32");
        let ptr = t.pointer(u32t);
        let p = t.ident("p", ptr);
        let (text, diagnostics) = lower(&t, &unary(UnaryOp::Neg, p.clone()));
        assert_eq!(text, "-p");
        assert_eq!(diagnostics[0].code, DiagnosticCode::PointerUnary);
        let (text, diagnostics) = lower(&t, &unary(UnaryOp::Not, p));
        assert_eq!(text, "!p");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_pointer_increment() {
        let mut t = TypeTable::new();
        let u32t = t.scalar("uint32");
        let ptr = t.pointer(u32t);
        let p = t.ident("p", ptr);
        assert_eq!(lower(&t, &update(UpdateOp::Increment, true, p.clone())).0, "p += 4");
        assert_eq!(lower(&t, &update(UpdateOp::Decrement, false, p.clone())).0, "p -= 4");
        let used = call_named("f", vec![update(UpdateOp::Increment, false, p.clone())]);
        assert_eq!(lower(&t, &used).0, "f((p += 4, p - 4))");
        let (text, _, _) = lower_with(&t, wide(), &update(UpdateOp::Increment, true, p));
        assert_eq!(text, "p += 4n");
    }

    #[test]
    fn test_place_increment() {
        let mut t = TypeTable::new();
        let c = t.scalar("char");
        let u8t = t.scalar("uint8");
        let (_, ty) = t.declare_struct("P", vec![("a", c), ("b", u8t)]);
        let ptr = t.pointer(ty);
        let p = t.ident("p", ptr);
        let pb = prop(&mut t, p, "b", None);
        assert_eq!(
            lower(&t, &update(UpdateOp::Increment, false, pb.clone())).0,
            "CTypeEnumWrite[2](p + 1, CTypeEnumRead[2](p + 1) + 1)"
        );
        let used = call_named("f", vec![update(UpdateOp::Increment, false, pb)]);
        let (text, _) = lower(&t, &used);
        assert!(text.starts_with("let __memlower_tmp_0;\n"));
        assert!(text.ends_with(
            "f((__memlower_tmp_0 = CTypeEnumRead[2](p + 1), CTypeEnumWrite[2](p + 1, __memlower_tmp_0 + 1), __memlower_tmp_0))"
        ));
    }
}
