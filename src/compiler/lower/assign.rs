//! Assignment lowering: scalar and pointer stores, bit-field
//! read-modify-write, aggregate copies and object literal initialization.

use super::place::{with_setup, Place, Slot};
use super::{LoweringContext, Lowered, Lowerer};
use crate::compiler::diagnostics::DiagnosticCode;
use crate::compiler::layout::StructDescriptor;
use crate::compiler::memory_model::ScalarKind;
use crate::compiler::session::RuntimeImport;
use crate::syntax::builder::*;
use crate::syntax::{AssignOp, BinaryOp, Expr, ExprKind, ObjectProperty};
use crate::types::TypeCategory;
use std::rc::Rc;

impl<'a> Lowerer<'a> {
    pub(super) fn lower_assign(
        &mut self,
        expr: &Expr,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        cx: LoweringContext,
    ) -> Expr {
        let lowered = match self.place_of(target) {
            Ok(Some(place)) => self.assign_place(expr, op, place, value, cx),
            Ok(None) => self.assign_variable(expr, op, target, value),
            Err(reported) => Err(reported),
        };
        match lowered {
            Ok(e) => e.at(expr.span),
            Err(_) => expr.clone(),
        }
    }

    fn assign_place(
        &mut self,
        expr: &Expr,
        op: AssignOp,
        place: Place,
        value: &Expr,
        cx: LoweringContext,
    ) -> Lowered<Expr> {
        if let Some(binop) = op.binary() {
            return self.compound_place(expr, binop, place, value, cx);
        }
        match &place.slot {
            Slot::Aggregate(_) | Slot::Array { .. } => {
                let (setup, addr) = match value.unparen().kind {
                    ExprKind::Object(_) | ExprKind::Array(_) => self.stabilize(place.addr),
                    _ => (None, place.addr),
                };
                let writes = self.init_place(
                    Place {
                        addr,
                        slot: place.slot,
                    },
                    value,
                )?;
                let mut list: Vec<Expr> = setup.into_iter().collect();
                list.extend(writes);
                if list.is_empty() {
                    return Ok(ident("undefined"));
                }
                Ok(comma(list))
            }
            _ => {
                if let ExprKind::Assign {
                    op: AssignOp::Assign,
                    target: inner_target,
                    value: inner_value,
                } = &value.unparen().kind
                {
                    if let Some(inner) = self.place_of(inner_target)? {
                        if !matches!(inner.slot, Slot::Aggregate(_) | Slot::Array { .. }) {
                            return self.chained(place, inner, inner_value, cx);
                        }
                    }
                }
                let lowered = self.lower_expr(value, LoweringContext::value());
                let lowered = self.check_store(&place.slot, value, lowered)?;
                if cx.discard {
                    return Ok(self.store(place, lowered));
                }
                let (setup, v) = self.stabilize(lowered);
                let write = self.store(place, v.clone());
                let mut list: Vec<Expr> = setup.into_iter().collect();
                list.push(write);
                list.push(v);
                Ok(comma(list))
            }
        }
    }

    /// `a.x = b.y = v`: both stores of one value, outer first
    fn chained(&mut self, outer: Place, inner: Place, value: &Expr, cx: LoweringContext) -> Lowered<Expr> {
        let lowered = self.lower_expr(value, LoweringContext::value());
        let (setup, v) = self.stabilize(lowered);
        let outer_value = self.check_store(&outer.slot, value, v.clone())?;
        let inner_value = self.check_store(&inner.slot, value, v.clone())?;
        let mut list: Vec<Expr> = setup.into_iter().collect();
        list.push(self.store(outer, outer_value));
        list.push(self.store(inner, inner_value));
        if !cx.discard {
            list.push(v);
        }
        Ok(comma(list))
    }

    fn compound_place(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        place: Place,
        value: &Expr,
        cx: LoweringContext,
    ) -> Lowered<Expr> {
        if matches!(place.slot, Slot::Aggregate(_) | Slot::Array { .. }) {
            return Err(self.report(
                expr.span,
                format!("`{}=` cannot be applied to an aggregate", op),
                DiagnosticCode::StructMismatch,
            ));
        }
        let (setup, addr) = self.stabilize(place.addr);
        let place = Place {
            addr,
            slot: place.slot,
        };
        let current = self.read(place.clone());
        let updated = match place.slot {
            Slot::Pointer(desc) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
                if self.category(value).as_pointer().is_some() {
                    return Err(self.report(
                        expr.span,
                        format!("`{}=` between two pointers", op),
                        DiagnosticCode::PointerPointerOperation,
                    ));
                }
                let step = self.step(desc);
                let offset = self.scale(value, step);
                binary(op, current, offset)
            }
            _ => {
                let rhs = self.lower_expr(value, LoweringContext::value());
                let rhs = match place.slot.value_kind() {
                    Some(kind) => self.box_literal(kind, rhs),
                    None => rhs,
                };
                binary(op, current, rhs)
            }
        };
        let write = self.store(place.clone(), updated);
        if cx.discard {
            return Ok(with_setup(setup, write));
        }
        let mut list: Vec<Expr> = setup.into_iter().collect();
        list.push(write);
        list.push(self.read(place));
        Ok(comma(list))
    }

    /// Writes that initialize a place from a value, expanding literals
    fn init_place(&mut self, place: Place, value: &Expr) -> Lowered<Vec<Expr>> {
        match (&place.slot, &value.unparen().kind) {
            (Slot::Aggregate(d), ExprKind::Object(properties)) => {
                let d = d.clone();
                self.init_aggregate(place.addr, &d, properties)
            }
            (Slot::Array { element, length }, ExprKind::Array(items)) => {
                if items.len() > *length as usize {
                    return Err(self.report(
                        value.span,
                        format!("{} initializers for an array of {}", items.len(), length),
                        DiagnosticCode::IndexOutOfRange,
                    ));
                }
                let size = element.size(self.session.width());
                let mut writes = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let slot = (**element).clone();
                    let addr = plus(place.addr.clone(), self.address_lit(size * i as u32));
                    writes.extend(self.init_place(Place { addr, slot }, item)?);
                }
                Ok(writes)
            }
            (Slot::Aggregate(d), _) => {
                let d = d.clone();
                let src = self.aggregate_source(&d, value)?;
                Ok(vec![self.copy_bytes(place.addr, src, d.total_length)])
            }
            (Slot::Array { .. }, _) => {
                let size = place.slot.size(self.session.width());
                let src = match self.place_of(value)? {
                    Some(Place {
                        addr,
                        slot: slot @ Slot::Array { .. },
                    }) if slot.size(self.session.width()) == size => addr,
                    _ => {
                        return Err(self.report(
                            value.span,
                            format!("`{}` is not an array of {} bytes", value, size),
                            DiagnosticCode::StructMismatch,
                        ))
                    }
                };
                Ok(vec![self.copy_bytes(place.addr, src, size)])
            }
            _ => {
                let lowered = self.lower_expr(value, LoweringContext::value());
                let lowered = self.check_store(&place.slot, value, lowered)?;
                Ok(vec![self.store(place, lowered)])
            }
        }
    }

    fn init_aggregate(
        &mut self,
        addr: Expr,
        descriptor: &StructDescriptor,
        properties: &[ObjectProperty],
    ) -> Lowered<Vec<Expr>> {
        let mut writes = Vec::new();
        for property in properties {
            let Some(field) = descriptor.field(&property.key) else {
                return Err(self.report(
                    property.value.span,
                    format!("`{}` has no field `{}`", descriptor.name, property.key),
                    DiagnosticCode::UnknownField,
                ));
            };
            let place = Place {
                addr: plus(addr.clone(), self.address_lit(field.byte_offset)),
                slot: Slot::of_field(field),
            };
            writes.extend(self.init_place(place, &property.value)?);
        }
        Ok(writes)
    }

    /// Source address for copying `value` into an aggregate of type `dst`
    fn aggregate_source(&mut self, dst: &Rc<StructDescriptor>, value: &Expr) -> Lowered<Expr> {
        if let Some(src) = self.place_of(value)? {
            if let Slot::Aggregate(s) = &src.slot {
                if s.extends(&dst.key) {
                    return Ok(src.addr);
                }
            }
        } else if let TypeCategory::Struct(key) = self.category(value) {
            let compatible = self
                .session
                .descriptor(self.oracle, key)
                .map(|s| s.extends(&dst.key))
                .unwrap_or(false);
            if compatible {
                let symbol = self.session.import(RuntimeImport::SymbolStructAddress);
                let object = self.lower_expr(value, LoweringContext::value());
                return Ok(index(object, ident(symbol)));
            }
        }
        Err(self.report(
            value.span,
            format!("`{}` cannot be assigned to `{}`", value, dst.name),
            DiagnosticCode::StructMismatch,
        ))
    }

    /// Validate a value stored into a slot, boxing literals as needed
    pub(super) fn check_store(&mut self, slot: &Slot, source: &Expr, lowered: Expr) -> Lowered<Expr> {
        let source_category = self.category(source);
        match slot {
            Slot::Pointer(_) => {
                if let TypeCategory::Scalar(kind) = source_category {
                    if !source.is_literal() {
                        return Err(self.report(
                            source.span,
                            format!("`{}` of type {} is not a pointer", source, kind),
                            DiagnosticCode::PointerFromNonPointer,
                        ));
                    }
                }
                Ok(self.box_literal(ScalarKind::Pointer, lowered))
            }
            Slot::Scalar(kind) | Slot::BitField { kind, .. } => {
                if source_category.as_pointer().is_some() {
                    return Err(self.report(
                        source.span,
                        format!("a pointer cannot be stored as {}", kind),
                        DiagnosticCode::ScalarFromPointer,
                    ));
                }
                Ok(self.box_literal(*kind, lowered))
            }
            _ => Ok(lowered),
        }
    }

    /// Turn an integral number literal into a big-integer literal for big-integer kinds
    pub(super) fn box_literal(&self, kind: ScalarKind, value: Expr) -> Expr {
        if !kind.is_bigint(self.session.width()) {
            return value;
        }
        match value.as_number() {
            Some(n) if n.fract() == 0.0 => bigint(n as i128).at(value.span),
            _ => value,
        }
    }

    fn assign_variable(&mut self, expr: &Expr, op: AssignOp, target: &Expr, value: &Expr) -> Lowered<Expr> {
        let target_lowered = match target.kind {
            ExprKind::Identifier(_) => target.clone(),
            _ => self.lower_expr(target, LoweringContext::value()),
        };
        let value_lowered = match (op, self.category(target)) {
            (AssignOp::Add | AssignOp::Sub, TypeCategory::Pointer(desc)) => {
                if self.category(value).as_pointer().is_some() {
                    return Err(self.report(
                        expr.span,
                        format!("`{}` between two pointers", op),
                        DiagnosticCode::PointerPointerOperation,
                    ));
                }
                let step = self.step(desc);
                self.scale(value, step)
            }
            (_, TypeCategory::Pointer(desc)) => {
                let lowered = self.lower_expr(value, LoweringContext::value());
                self.check_store(&Slot::Pointer(desc), value, lowered)?
            }
            (_, TypeCategory::Scalar(kind)) => {
                let lowered = self.lower_expr(value, LoweringContext::value());
                self.check_store(&Slot::Scalar(kind), value, lowered)?
            }
            (_, TypeCategory::Size) => {
                if value.as_number().is_none() && !self.size_compatible(value) {
                    return Err(self.report(
                        value.span,
                        format!("`{}` mixes size with a plain number", value),
                        DiagnosticCode::SizeMixing,
                    ));
                }
                let lowered = self.lower_expr(value, LoweringContext::value());
                self.box_literal(ScalarKind::Size, lowered)
            }
            _ => self.lower_expr(value, LoweringContext::value()),
        };
        Ok(Expr::new(
            expr.id,
            expr.span,
            ExprKind::Assign {
                op,
                target: Box::new(target_lowered),
                value: Box::new(value_lowered),
            },
        ))
    }

    /// Whether every operand of `expr` is a size, a pointer or a literal
    ///
    /// Operands the oracle knows nothing about are accepted.
    pub(super) fn size_compatible(&self, expr: &Expr) -> bool {
        match &expr.unparen().kind {
            ExprKind::Binary { left, right, .. } => {
                self.size_compatible(left) && self.size_compatible(right)
            }
            ExprKind::Number(_) | ExprKind::BigInt(_) => true,
            _ => match self.category(expr) {
                TypeCategory::Size | TypeCategory::Pointer(_) => true,
                _ => matches!(
                    self.value_kind(expr),
                    None | Some(ScalarKind::Size) | Some(ScalarKind::Pointer)
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{lower, lower_with, prop, wide};
    use super::*;
    use crate::types::{TypeId, TypeTable};

    fn pair(t: &mut TypeTable) -> TypeId {
        let c = t.scalar("char");
        let u8t = t.scalar("uint8");
        let (_, ty) = t.declare_struct("P", vec![("a", c), ("b", u8t)]);
        t.pointer(ty)
    }

    #[test]
    fn test_scalar_store() {
        let mut t = TypeTable::new();
        let ptr = pair(&mut t);
        let p = t.ident("p", ptr);
        let pb = prop(&mut t, p, "b", None);
        let e = assign(AssignOp::Assign, pb, int(5));
        assert_eq!(lower(&t, &e).0, "CTypeEnumWrite[2](p + 1, 5)");
    }

    #[test]
    fn test_chained_store_writes_outer_first() {
        let mut t = TypeTable::new();
        let ptr = pair(&mut t);
        let a = t.ident("a", ptr);
        let aa = prop(&mut t, a.clone(), "a", None);
        let ab = prop(&mut t, a, "b", None);
        let e = assign(AssignOp::Assign, aa, assign(AssignOp::Assign, ab, int(0)));
        assert_eq!(
            lower(&t, &e).0,
            "CTypeEnumWrite[4](a, 0), CTypeEnumWrite[2](a + 1, 0)"
        );
    }

    #[test]
    fn test_bit_field_write() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let a = t.bit(u8t, 3);
        let b = t.bit(u8t, 4);
        let (_, ty) = t.declare_struct("B", vec![("a", a), ("b", b)]);
        let ptr = t.pointer(ty);
        let p = t.ident("p", ptr);
        let pb = prop(&mut t, p, "b", None);
        let e = assign(AssignOp::Assign, pb, ident("v"));
        assert_eq!(
            lower(&t, &e).0,
            "CTypeEnumWrite[2](p, (CTypeEnumRead[2](p) & -121) | ((v & 15) << 3))"
        );
    }

    #[test]
    fn test_compound_store() {
        let mut t = TypeTable::new();
        let ptr = pair(&mut t);
        let p = t.ident("p", ptr);
        let pb = prop(&mut t, p, "b", None);
        let e = assign(AssignOp::Add, pb, int(1));
        assert_eq!(
            lower(&t, &e).0,
            "CTypeEnumWrite[2](p + 1, CTypeEnumRead[2](p + 1) + 1)"
        );
    }

    #[test]
    fn test_compound_store_hoists_impure_address() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let (decl, node) = t.declare_struct("Node", vec![("v", u8t)]);
        let next = t.pointer(node);
        t.set_members(
            decl,
            crate::types::table::plain_members(vec![("v", u8t), ("next", next)]),
        );
        let p = t.ident("p", next);
        let pn = prop(&mut t, p, "next", None);
        let v = prop(&mut t, pn, "v", None);
        let e = assign(AssignOp::Add, v, int(1));
        let (text, _) = lower(&t, &e);
        assert!(text.starts_with("let __memlower_tmp_0;\n"));
        assert!(text.contains(
            "__memlower_tmp_0 = CTypeEnumRead[20](p + 4), CTypeEnumWrite[2](__memlower_tmp_0, CTypeEnumRead[2](__memlower_tmp_0) + 1)"
        ));
    }

    fn outer(t: &mut TypeTable) -> TypeId {
        let u8t = t.scalar("uint8");
        let u16t = t.scalar("uint16");
        let inline = t.inline_struct(vec![("x", u16t), ("y", u16t)]);
        let (_, ty) = t.declare_struct("Outer", vec![("tag", u8t), ("pos", inline)]);
        t.pointer(ty)
    }

    #[test]
    fn test_aggregate_copy_and_literal() {
        let mut t = TypeTable::new();
        let ptr = outer(&mut t);
        let p = t.ident("p", ptr);
        let q = t.ident("q", ptr);
        let p_pos = prop(&mut t, p, "pos", None);
        let q_pos = prop(&mut t, q, "pos", None);

        let copy = assign(AssignOp::Assign, p_pos.clone(), q_pos);
        let (text, _, session) = lower_with(&t, Default::default(), &copy);
        assert_eq!(text, "memcpy(p + 2, q + 2, 4)");
        assert!(session.imports().iter().any(|i| i.name == "memcpy"));

        let literal = assign(
            AssignOp::Assign,
            p_pos.clone(),
            object(vec![("x".into(), int(1)), ("y".into(), int(2))]),
        );
        assert_eq!(
            lower(&t, &literal).0,
            "CTypeEnumWrite[6](p + 2, 1), CTypeEnumWrite[6](p + 4, 2)"
        );

        let (text, diagnostics) = lower(&t, &assign(AssignOp::Assign, p_pos, int(5)));
        assert_eq!(text, "p.pos = 5");
        assert_eq!(diagnostics[0].code, DiagnosticCode::StructMismatch);
    }

    #[test]
    fn test_struct_value_source_uses_its_address() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let (_, a) = t.declare_struct("A", vec![("x", u8t)]);
        let (_, holder) = t.declare_struct("H", vec![("a", a)]);
        let hp = t.pointer(holder);
        let h = t.ident("h", hp);
        let s = t.ident("s", a);
        let ha = prop(&mut t, h, "a", None);
        let e = assign(AssignOp::Assign, ha, s);
        assert_eq!(lower(&t, &e).0, "memcpy(h, s[symbolStructAddress], 1)");
    }

    #[test]
    fn test_pointer_variable_checks() {
        let mut t = TypeTable::new();
        let u16t = t.scalar("uint16");
        let i32t = t.scalar("int32");
        let ptr = t.pointer(u16t);
        let q = t.ident("q", ptr);
        let n = t.ident("n", i32t);

        let lit = assign(AssignOp::Assign, q.clone(), int(5));
        assert_eq!(lower(&t, &lit).0, "q = 5");
        assert_eq!(lower_with(&t, wide(), &lit).0, "q = 5n");

        let (_, diagnostics) = lower(&t, &assign(AssignOp::Assign, q.clone(), n.clone()));
        assert_eq!(diagnostics[0].code, DiagnosticCode::PointerFromNonPointer);

        let step = assign(AssignOp::Add, q.clone(), n.clone());
        assert_eq!(lower(&t, &step).0, "q += (n * 2)");

        let x = t.ident("x", i32t);
        let (_, diagnostics) = lower(&t, &assign(AssignOp::Assign, x, q));
        assert_eq!(diagnostics[0].code, DiagnosticCode::ScalarFromPointer);
    }

    #[test]
    fn test_size_mixing() {
        let mut t = TypeTable::new();
        let size = t.scalar("size");
        let i32t = t.scalar("int32");
        let s = t.ident("s", size);
        let n = t.ident("n", i32t);
        let (_, diagnostics) = lower(&t, &assign(AssignOp::Assign, s.clone(), n));
        assert_eq!(diagnostics[0].code, DiagnosticCode::SizeMixing);

        let lit = assign(AssignOp::Assign, s.clone(), int(3));
        assert_eq!(lower_with(&t, wide(), &lit).0, "s = 3n");
        assert_eq!(lower(&t, &lit).0, "s = 3");
    }
}
