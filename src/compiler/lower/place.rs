//! Memory places: field, index and dereference chains resolved to an address
//! plus the shape of what is stored there.

use super::{LoweringContext, Lowered, Lowerer};
use crate::compiler::diagnostics::DiagnosticCode;
use crate::compiler::layout::{read_shift, FieldMeta, FieldType, StructDescriptor};
use crate::compiler::memory_model::{AddressingWidth, ScalarKind};
use crate::compiler::session::RuntimeImport;
use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, Expr, ExprKind};
use crate::types::{Classifier, Pointee, PointerDescriptor, TypeCategory};
use std::rc::Rc;

/// What a memory place stores
#[derive(Debug, Clone)]
pub enum Slot {
    /// Scalar of a fixed kind
    Scalar(ScalarKind),
    /// Raw pointer
    Pointer(PointerDescriptor),
    /// Bits inside a storage unit of `kind`
    BitField {
        /// Kind of the storage unit
        kind: ScalarKind,
        /// Width in bits
        width: u32,
        /// Bit offset inside the unit
        bit_offset: u32,
    },
    /// Aggregate stored by value
    Aggregate(Rc<StructDescriptor>),
    /// Fixed-length array
    Array {
        /// Element slot
        element: Box<Slot>,
        /// Element count
        length: u32,
    },
}

impl Slot {
    /// Slot of an aggregate member
    pub fn of_field(field: &FieldMeta) -> Slot {
        let base = if field.is_pointer() {
            let pointee = match &field.ty {
                FieldType::Scalar(k) => Pointee::Scalar(*k),
                FieldType::Aggregate(d) => Pointee::Aggregate(d.key),
                FieldType::StructRef { key, .. } => Pointee::Aggregate(*key),
            };
            Slot::Pointer(PointerDescriptor {
                pointee,
                depth: field.pointer_level,
            })
        } else {
            match &field.ty {
                FieldType::Scalar(ScalarKind::Pointer) => {
                    Slot::Pointer(PointerDescriptor::to(Pointee::Scalar(ScalarKind::Void)))
                }
                FieldType::Scalar(kind) if field.is_bit_field => Slot::BitField {
                    kind: *kind,
                    width: field.bit_width,
                    bit_offset: field.bit_offset,
                },
                FieldType::Scalar(kind) => Slot::Scalar(*kind),
                FieldType::Aggregate(d) => Slot::Aggregate(d.clone()),
                FieldType::StructRef { key, .. } => {
                    Slot::Pointer(PointerDescriptor::to(Pointee::Aggregate(*key)))
                }
            }
        };
        if field.is_array {
            Slot::Array {
                element: Box::new(base),
                length: field.array_length,
            }
        } else {
            base
        }
    }

    /// Bytes occupied by the slot
    pub fn size(&self, width: AddressingWidth) -> u32 {
        match self {
            Slot::Scalar(k) | Slot::BitField { kind: k, .. } => k.byte_length(width),
            Slot::Pointer(_) => width.pointer_bytes(),
            Slot::Aggregate(d) => d.total_length,
            Slot::Array { element, length } => element.size(width) * length,
        }
    }

    /// Scalar kind of a value read from the slot
    pub fn value_kind(&self) -> Option<ScalarKind> {
        match self {
            Slot::Scalar(k) | Slot::BitField { kind: k, .. } => Some(*k),
            Slot::Pointer(_) => Some(ScalarKind::Pointer),
            _ => None,
        }
    }
}

/// An address together with what is stored at it
#[derive(Debug, Clone)]
pub struct Place {
    /// Lowered address expression
    pub addr: Expr,
    /// Stored shape
    pub slot: Slot,
}

impl<'a> Lowerer<'a> {
    /// Memory-model category of a source node
    pub(super) fn category(&self, expr: &Expr) -> TypeCategory {
        match self.oracle.type_of(expr.id) {
            Some(ty) => Classifier::new(self.oracle).classify(ty),
            None => match &expr.kind {
                ExprKind::Paren(inner) => self.category(inner),
                _ => TypeCategory::Unknown,
            },
        }
    }

    /// Scalar kind a source node evaluates to, if it is numeric
    pub(super) fn value_kind(&self, expr: &Expr) -> Option<ScalarKind> {
        if let Some(ty) = self.oracle.type_of(expr.id) {
            return Classifier::new(self.oracle).cast_kind(ty);
        }
        match &expr.kind {
            ExprKind::Paren(inner) => self.value_kind(inner),
            ExprKind::Number(n) if n.fract() == 0.0 && n.abs() < 2_147_483_648.0 => {
                Some(ScalarKind::Int32)
            }
            ExprKind::Number(_) => Some(ScalarKind::Double),
            ExprKind::BigInt(_) => Some(ScalarKind::Int64),
            ExprKind::Bool(_) => Some(ScalarKind::Bool),
            _ => None,
        }
    }

    /// Whether a source node is carried as a host big integer
    pub(super) fn is_bigint_valued(&self, expr: &Expr) -> bool {
        self.value_kind(expr)
            .map(|k| k.is_bigint(self.session.width()))
            .unwrap_or(false)
    }

    /// Address-sized integer literal
    pub(super) fn address_lit(&self, n: u32) -> Expr {
        if self.session.width().is_64() {
            bigint(n as i128)
        } else {
            int(n as i64)
        }
    }

    /// Resolve a source node to a memory place
    ///
    /// `Ok(None)` means the node is not a place and is lowered structurally.
    pub fn place_of(&mut self, expr: &Expr) -> Lowered<Option<Place>> {
        match &expr.kind {
            ExprKind::Paren(inner) => self.place_of(inner),
            ExprKind::Property { object, name } => self.property_place(expr, object, name),
            ExprKind::Index { object, index } => self.index_place(expr, object, index),
            ExprKind::Call { callee, args, .. } if args.len() == 1 => {
                if let ExprKind::Property { object, name } = &callee.kind {
                    if name == "indexOf" && self.category(object).as_pointer().is_some() {
                        return self.index_place(expr, object, &args[0]);
                    }
                }
                if self.is_intrinsic(callee, "accessof") {
                    return self.deref_place(expr, &args[0]).map(Some);
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Place a pointer refers to
    pub(super) fn deref_place(&mut self, expr: &Expr, pointer: &Expr) -> Lowered<Place> {
        match self.pointer_value(pointer)? {
            Some((addr, desc)) => {
                let slot = self.element_slot(desc, expr)?;
                Ok(Place { addr, slot })
            }
            None => Err(self.report(
                expr.span,
                format!("`{}` is not a pointer", pointer),
                DiagnosticCode::InvalidDereference,
            )),
        }
    }

    /// Lowered value and descriptor of a node holding a raw pointer
    pub(super) fn pointer_value(&mut self, expr: &Expr) -> Lowered<Option<(Expr, PointerDescriptor)>> {
        if let Some(place) = self.place_of(expr)? {
            return Ok(match place.slot {
                Slot::Pointer(desc) => Some((self.read(place), desc)),
                _ => None,
            });
        }
        match self.category(expr) {
            TypeCategory::Pointer(desc) => Ok(Some((self.lower_expr(expr, LoweringContext::value()), desc))),
            _ => Ok(None),
        }
    }

    /// Slot reached by dereferencing a pointer once
    pub(super) fn element_slot(&mut self, desc: PointerDescriptor, at: &Expr) -> Lowered<Slot> {
        if let Some(inner) = desc.deref() {
            return Ok(Slot::Pointer(inner));
        }
        match desc.pointee {
            Pointee::Scalar(ScalarKind::Pointer) => {
                Ok(Slot::Pointer(PointerDescriptor::to(Pointee::Scalar(ScalarKind::Void))))
            }
            Pointee::Scalar(ScalarKind::Void | ScalarKind::Null) => Err(self.report(
                at.span,
                "a void pointer cannot be dereferenced",
                DiagnosticCode::InvalidDereference,
            )),
            Pointee::Scalar(kind) => Ok(Slot::Scalar(kind)),
            Pointee::Aggregate(key) => match self.session.descriptor(self.oracle, key) {
                Some(d) => Ok(Slot::Aggregate(d)),
                None => Err(self.report(
                    at.span,
                    "pointee is not a memory aggregate",
                    DiagnosticCode::InvalidDereference,
                )),
            },
            Pointee::Any | Pointee::Multi | Pointee::Null => Err(self.report(
                at.span,
                "an untyped pointer cannot be dereferenced",
                DiagnosticCode::InvalidDereference,
            )),
        }
    }

    /// Bytes one step of pointer arithmetic moves
    pub(super) fn step(&mut self, desc: PointerDescriptor) -> u32 {
        let width = self.session.width();
        if desc.depth > 1 {
            return width.pointer_bytes();
        }
        match desc.pointee {
            Pointee::Scalar(ScalarKind::Void | ScalarKind::Null) => 1,
            Pointee::Scalar(kind) => kind.byte_length(width),
            Pointee::Aggregate(key) => self
                .session
                .descriptor(self.oracle, key)
                .map(|d| d.total_length)
                .unwrap_or(1),
            Pointee::Any | Pointee::Multi | Pointee::Null => 1,
        }
    }

    fn pointee_aggregate(&mut self, desc: PointerDescriptor) -> Option<Rc<StructDescriptor>> {
        match desc.pointee {
            Pointee::Aggregate(key) if desc.depth == 1 => self.session.descriptor(self.oracle, key),
            _ => None,
        }
    }

    /// Address and layout of the aggregate a property is looked up in
    ///
    /// The flag is false for shared pointers, whose own methods are
    /// reached through the same syntax.
    fn aggregate_base(&mut self, object: &Expr) -> Lowered<Option<(Expr, Rc<StructDescriptor>, bool)>> {
        if let Some(place) = self.place_of(object)? {
            return Ok(match place.slot.clone() {
                Slot::Aggregate(d) => Some((place.addr, d, true)),
                Slot::Pointer(desc) => match self.pointee_aggregate(desc) {
                    Some(d) => Some((self.read(place), d, true)),
                    None => None,
                },
                _ => None,
            });
        }
        match self.category(object) {
            TypeCategory::Pointer(desc) => match self.pointee_aggregate(desc) {
                Some(d) => Ok(Some((self.lower_expr(object, LoweringContext::value()), d, true))),
                None => Ok(None),
            },
            TypeCategory::SharedPointer(desc) => match self.pointee_aggregate(desc) {
                Some(d) => {
                    let raw = method(self.lower_expr(object, LoweringContext::value()), "get", vec![]);
                    Ok(Some((raw, d, false)))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn property_place(&mut self, expr: &Expr, object: &Expr, name: &str) -> Lowered<Option<Place>> {
        let Some((addr, descriptor, strict)) = self.aggregate_base(object)? else {
            return Ok(None);
        };
        match descriptor.field(name) {
            Some(field) => Ok(Some(Place {
                addr: plus(addr, self.address_lit(field.byte_offset)),
                slot: Slot::of_field(field),
            })),
            None if strict => Err(self.report(
                expr.span,
                format!("`{}` has no field `{}`", descriptor.name, name),
                DiagnosticCode::UnknownField,
            )),
            None => Ok(None),
        }
    }

    /// Base address, element slot and bound of something indexable
    fn indexable(&mut self, object: &Expr) -> Lowered<Option<(Expr, Slot, Option<u32>)>> {
        if let Some(place) = self.place_of(object)? {
            return match place.slot.clone() {
                Slot::Array { element, length } => Ok(Some((place.addr, *element, Some(length)))),
                Slot::Pointer(desc) => {
                    let slot = self.element_slot(desc, object)?;
                    Ok(Some((self.read(place), slot, None)))
                }
                _ => Ok(None),
            };
        }
        match self.category(object) {
            TypeCategory::Pointer(desc) => {
                let slot = self.element_slot(desc, object)?;
                Ok(Some((self.lower_expr(object, LoweringContext::value()), slot, None)))
            }
            TypeCategory::SharedPointer(_) => Err(self.report(
                object.span,
                "a shared pointer has no index operator",
                DiagnosticCode::SharedPointerIndex,
            )),
            _ => Ok(None),
        }
    }

    fn index_place(&mut self, expr: &Expr, object: &Expr, index: &Expr) -> Lowered<Option<Place>> {
        let Some((base, element, bound)) = self.indexable(object)? else {
            return Ok(None);
        };
        if let (Some(bound), Some(n)) = (bound, index.as_number()) {
            if n < 0.0 || n >= bound as f64 {
                return Err(self.report(
                    expr.span,
                    format!("index {} is out of range for an array of {}", n, bound),
                    DiagnosticCode::IndexOutOfRange,
                ));
            }
        }
        let size = element.size(self.session.width());
        let offset = self.scale(index, size);
        Ok(Some(Place {
            addr: plus(base, offset),
            slot: element,
        }))
    }

    /// Byte offset of `index` elements of `size` bytes
    pub(super) fn scale(&mut self, index: &Expr, size: u32) -> Expr {
        let wide = self.session.width().is_64();
        let lowered = self.lower_expr(index, LoweringContext::value());
        if let Some(n) = lowered.as_number() {
            return if wide && n.fract() == 0.0 {
                bigint(n as i128 * size as i128)
            } else {
                num(n * size as f64)
            };
        }
        if let Some(n) = lowered.as_bigint() {
            return if wide {
                bigint(n * size as i128)
            } else {
                int((n * size as i128) as i64)
            };
        }
        let value = if wide && !self.is_bigint_valued(index) {
            call_named("BigInt", vec![lowered])
        } else {
            lowered
        };
        if size == 1 {
            value
        } else {
            paren(binary(BinaryOp::Mul, value, self.address_lit(size)))
        }
    }

    /// Read the value stored at a place
    pub fn read(&mut self, place: Place) -> Expr {
        let width = self.session.width();
        match place.slot {
            Slot::Scalar(kind) => self.read_kind(kind, place.addr),
            Slot::Pointer(_) => self.read_kind(ScalarKind::Pointer, place.addr),
            Slot::BitField {
                kind,
                width: bits,
                bit_offset,
            } => {
                let shift = read_shift(kind.bits(width), bit_offset, bits);
                let raw = self.read_kind(kind, place.addr);
                let mask = (1i128 << bits) - 1;
                if kind.is_bigint(width) {
                    binary(
                        BinaryOp::BitAnd,
                        paren(binary(BinaryOp::Shr, raw, bigint(shift as i128))),
                        bigint(mask),
                    )
                } else {
                    let masked = binary(
                        BinaryOp::BitAnd,
                        paren(binary(BinaryOp::UShr, raw, int(shift as i64))),
                        int(mask as i64),
                    );
                    // `&` yields int32; a full 32-bit field has to come back unsigned
                    if bits >= 32 {
                        binary(BinaryOp::UShr, paren(masked), int(0))
                    } else {
                        masked
                    }
                }
            }
            Slot::Aggregate(d) => self.struct_access(place.addr, &d),
            Slot::Array { .. } => place.addr,
        }
    }

    pub(super) fn read_kind(&mut self, kind: ScalarKind, addr: Expr) -> Expr {
        let table = self.session.import(RuntimeImport::CTypeEnumRead);
        call(index(ident(table), int(kind.tag() as i64)), vec![addr])
    }

    pub(super) fn write_kind(&mut self, kind: ScalarKind, addr: Expr, value: Expr) -> Expr {
        let table = self.session.import(RuntimeImport::CTypeEnumWrite);
        call(index(ident(table), int(kind.tag() as i64)), vec![addr, value])
    }

    /// Proxy object over an aggregate in memory
    pub(super) fn struct_access(&mut self, addr: Expr, descriptor: &StructDescriptor) -> Expr {
        let access = self.session.import(RuntimeImport::StructAccess);
        self.session.require_struct(descriptor);
        let mut args = vec![addr];
        if !descriptor.name.is_empty() {
            args.push(ident(descriptor.name.clone()));
            if let Some(path) = &descriptor.path {
                args.push(string(path.clone()));
            }
        }
        call_named(access, args)
    }

    /// `memcpy(dst, src, length)`
    pub(super) fn copy_bytes(&mut self, dst: Expr, src: Expr, length: u32) -> Expr {
        let memcpy = self.session.import(RuntimeImport::Memcpy);
        call_named(memcpy, vec![dst, src, self.address_lit(length)])
    }

    /// Store an already lowered value at a place
    ///
    /// For aggregates and arrays `value` is the source address.
    pub fn store(&mut self, place: Place, value: Expr) -> Expr {
        let width = self.session.width();
        match place.slot {
            Slot::Scalar(kind) => self.write_kind(kind, place.addr, value),
            Slot::Pointer(_) => self.write_kind(ScalarKind::Pointer, place.addr, value),
            Slot::BitField {
                kind,
                width: bits,
                bit_offset,
            } => {
                let (setup, addr) = self.stabilize(place.addr);
                let shift = read_shift(kind.bits(width), bit_offset, bits);
                let mask = (1i128 << bits) - 1;
                let current = self.read_kind(kind, addr.clone());
                let (keep, mask, shift) = if kind.is_bigint(width) {
                    (bigint(!(mask << shift)), bigint(mask), bigint(shift as i128))
                } else {
                    let keep = !((mask << shift) as u32) as i32;
                    (int(keep as i64), int(mask as i64), int(shift as i64))
                };
                let merged = binary(
                    BinaryOp::BitOr,
                    paren(binary(BinaryOp::BitAnd, current, keep)),
                    paren(binary(
                        BinaryOp::Shl,
                        paren(binary(BinaryOp::BitAnd, value, mask)),
                        shift,
                    )),
                );
                let write = self.write_kind(kind, addr, merged);
                with_setup(setup, write)
            }
            Slot::Aggregate(d) => self.copy_bytes(place.addr, value, d.total_length),
            Slot::Array { element, length } => {
                let size = element.size(width) * length;
                self.copy_bytes(place.addr, value, size)
            }
        }
    }

    /// Make an address safe to evaluate more than once
    ///
    /// An address with effects is assigned to a hoisted temporary; the
    /// returned setup expression must run first.
    pub(super) fn stabilize(&mut self, addr: Expr) -> (Option<Expr>, Expr) {
        if crate::compiler::fold::is_pure(&addr) {
            return (None, addr);
        }
        let temp = self.session.fresh_temp();
        self.scopes.hoist(temp.clone());
        let setup = assign(crate::syntax::AssignOp::Assign, ident(temp.clone()), addr);
        (Some(setup), ident(temp))
    }
}

/// Prefix `expr` with an optional setup expression
pub(super) fn with_setup(setup: Option<Expr>, expr: Expr) -> Expr {
    match setup {
        Some(setup) => comma(vec![setup, expr]),
        None => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{lower, lower_with, prop, typed, wide};
    use super::*;
    use crate::types::{TypeId, TypeTable};

    fn point(t: &mut TypeTable) -> TypeId {
        let i8t = t.scalar("int8");
        let u16t = t.scalar("uint16");
        let (_, ty) = t.declare_struct("A", vec![("a", i8t), ("b", u16t)]);
        t.pointer(ty)
    }

    #[test]
    fn test_field_read_through_pointer() {
        let mut t = TypeTable::new();
        let ptr = point(&mut t);
        let p = t.ident("p", ptr);
        let pb = prop(&mut t, p.clone(), "b", None);
        let pa = prop(&mut t, p, "a", None);
        assert_eq!(lower(&t, &pb).0, "CTypeEnumRead[6](p + 2)");
        assert_eq!(lower(&t, &pa).0, "CTypeEnumRead[11](p)");
        let (text, _, session) = lower_with(&t, wide(), &pb);
        assert_eq!(text, "CTypeEnumRead[6](p + 2n)");
        assert_eq!(session.imports()[0].name, "CTypeEnumRead");
    }

    #[test]
    fn test_pointer_field_chain() {
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
        let pnv = prop(&mut t, pn, "v", None);
        assert_eq!(lower(&t, &pnv).0, "CTypeEnumRead[2](CTypeEnumRead[20](p + 4))");
    }

    #[test]
    fn test_bit_field_read() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let a = t.bit(u8t, 3);
        let b = t.bit(u8t, 4);
        let (_, ty) = t.declare_struct("B", vec![("a", a), ("b", b)]);
        let ptr = t.pointer(ty);
        let p = t.ident("p", ptr);
        let pb = prop(&mut t, p, "b", None);
        assert_eq!(lower(&t, &pb).0, "(CTypeEnumRead[2](p) >>> 3) & 15");
    }

    #[test]
    fn test_full_width_bit_field_read_stays_unsigned() {
        let mut t = TypeTable::new();
        let u32t = t.scalar("uint32");
        let whole = t.bit(u32t, 32);
        let (_, ty) = t.declare_struct("W", vec![("v", whole)]);
        let ptr = t.pointer(ty);
        let p = t.ident("p", ptr);
        let pv = prop(&mut t, p, "v", None);
        assert_eq!(
            lower(&t, &pv).0,
            "((CTypeEnumRead[8](p) >>> 0) & 4294967295) >>> 0"
        );
    }

    #[test]
    fn test_index_scaling() {
        let mut t = TypeTable::new();
        let u32t = t.scalar("uint32");
        let ptr = t.pointer(u32t);
        let p = t.ident("p", ptr);
        let i = t.ident("i", u32t);
        let by_var = typed(&mut t, ExprKind::Index { object: Box::new(p.clone()), index: Box::new(i) }, u32t);
        let by_lit = typed(&mut t, ExprKind::Index { object: Box::new(p), index: Box::new(int(2)) }, u32t);
        assert_eq!(lower(&t, &by_var).0, "CTypeEnumRead[8](p + (i * 4))");
        assert_eq!(lower(&t, &by_lit).0, "CTypeEnumRead[8](p + 8)");
        let (text, _, _) = lower_with(&t, wide(), &by_var);
        assert_eq!(text, "CTypeEnumRead[8](p + (BigInt(i) * 4n))");
    }

    #[test]
    fn test_index_of_equals_index() {
        let mut t = TypeTable::new();
        let u16t = t.scalar("uint16");
        let ptr = t.pointer(u16t);
        let p = t.ident("p", ptr);
        let call = method(p, "indexOf", vec![int(3)]);
        assert_eq!(lower(&t, &call).0, "CTypeEnumRead[6](p + 6)");
    }

    #[test]
    fn test_array_field_bounds() {
        let mut t = TypeTable::new();
        let u16t = t.scalar("uint16");
        let arr = t.array(u16t, 4);
        let (_, ty) = t.declare_struct("C", vec![("xs", arr)]);
        let ptr = t.pointer(ty);
        let p = t.ident("p", ptr);
        let xs = prop(&mut t, p, "xs", None);
        let ok = index(xs.clone(), int(1));
        let bad = index(xs, int(5));
        assert_eq!(lower(&t, &ok).0, "CTypeEnumRead[6](p + 2)");
        let (text, diagnostics) = lower(&t, &bad);
        assert_eq!(text, "p.xs[5]");
        assert_eq!(diagnostics[0].code, DiagnosticCode::IndexOutOfRange);
    }

    #[test]
    fn test_unknown_field_on_pointer() {
        let mut t = TypeTable::new();
        let ptr = point(&mut t);
        let p = t.ident("p", ptr);
        let pz = prop(&mut t, p, "zz", None);
        let (text, diagnostics) = lower(&t, &pz);
        assert_eq!(text, "p.zz");
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnknownField);
    }

    #[test]
    fn test_shared_pointer_access() {
        let mut t = TypeTable::new();
        let i8t = t.scalar("int8");
        let u16t = t.scalar("uint16");
        let (_, ty) = t.declare_struct("A", vec![("a", i8t), ("b", u16t)]);
        let shared = t.shared_ptr(ty);
        let s = t.ident("s", shared);
        let sb = prop(&mut t, s.clone(), "b", None);
        assert_eq!(lower(&t, &sb).0, "CTypeEnumRead[6](s.get() + 2)");

        let reset = method(s.clone(), "reset", vec![]);
        let (text, diagnostics) = lower(&t, &reset);
        assert_eq!(text, "s.reset()");
        assert!(diagnostics.is_empty());

        let (_, diagnostics) = lower(&t, &index(s, int(0)));
        assert_eq!(diagnostics[0].code, DiagnosticCode::SharedPointerIndex);
    }

    #[test]
    fn test_inline_aggregate_value() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let u16t = t.scalar("uint16");
        let inline = t.inline_struct(vec![("x", u16t), ("y", u16t)]);
        let (_, ty) = t.declare_struct("Outer", vec![("tag", u8t), ("pos", inline)]);
        let ptr = t.pointer(ty);
        let p = t.ident("p", ptr);
        let pos = prop(&mut t, p, "pos", None);
        let y = prop(&mut t, pos.clone(), "y", None);
        assert_eq!(lower(&t, &pos).0, "structAccess(p + 2, Outer, \"pos\")");
        assert_eq!(lower(&t, &y).0, "CTypeEnumRead[6](p + 4)");
    }

    #[test]
    fn test_accessof_reads_pointee() {
        let mut t = TypeTable::new();
        let i32t = t.scalar("int32");
        let ptr = t.pointer(i32t);
        let any = t.scalar("anyptr");
        let p = t.ident("p", ptr);
        let q = t.ident("q", any);
        let deref = call_named("accessof", vec![p]);
        assert_eq!(lower(&t, &deref).0, "CTypeEnumRead[15](p)");
        let (_, diagnostics) = lower(&t, &call_named("accessof", vec![q]));
        assert_eq!(diagnostics[0].code, DiagnosticCode::InvalidDereference);
    }

    #[test]
    fn test_slot_sizes() {
        let slot = Slot::Array {
            element: Box::new(Slot::Scalar(ScalarKind::Uint16)),
            length: 3,
        };
        assert_eq!(slot.size(AddressingWidth::Bits32), 6);
        let ptr = Slot::Pointer(PointerDescriptor::to(Pointee::Any));
        assert_eq!(ptr.size(AddressingWidth::Bits64), 8);
    }
}
