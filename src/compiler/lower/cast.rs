//! `static_cast<T>(x)` between scalar kinds, pointers and `size`.
//!
//! Integers up to 32 bits are host numbers, 64-bit integers are host big
//! integers. Pointers and `size` convert like unsigned integers of the
//! addressing width.

use super::{LoweringContext, Lowered, Lowerer};
use crate::compiler::diagnostics::DiagnosticCode;
use crate::compiler::fold::{fold_expr, to_int32};
use crate::compiler::memory_model::ScalarKind;
use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, Expr, Precedence, UnaryOp};
use crate::types::{Classifier, Pointee, TypeCategory, TypeId};

/// Host numbers the pointer-width kinds pass through unchanged in 32-bit mode
fn is_plain_number(kind: ScalarKind) -> bool {
    matches!(
        kind,
        ScalarKind::Float | ScalarKind::Double | ScalarKind::Int32 | ScalarKind::Uint32
    )
}

fn is_address(kind: ScalarKind) -> bool {
    matches!(kind, ScalarKind::Pointer | ScalarKind::Size)
}

/// Wrap an integral value into `bits` bits
fn wrap_integer(value: i64, bits: u32, signed: bool) -> i64 {
    let modulus = 1i64 << bits;
    let masked = value & (modulus - 1);
    if signed && masked >= modulus / 2 {
        masked - modulus
    } else {
        masked
    }
}

impl<'a> Lowerer<'a> {
    pub(super) fn lower_static_cast(&mut self, expr: &Expr, type_args: &[TypeId], args: &[Expr]) -> Lowered<Expr> {
        let (Some(&target), Some(arg)) = (type_args.first(), args.first()) else {
            return Err(self.report(
                expr.span,
                "static_cast needs a target type and a value",
                DiagnosticCode::InvalidTypeArgument,
            ));
        };
        let Some(to) = Classifier::new(self.oracle).cast_kind(target) else {
            return Err(self.report(
                expr.span,
                "cast target is not a scalar type",
                DiagnosticCode::InvalidCast,
            ));
        };
        let to = to.plain();
        let width = self.session.width();

        let is_null = self.is_intrinsic(arg.unparen(), "nullptr")
            || matches!(
                self.category(arg),
                TypeCategory::Pointer(desc) if desc.pointee == Pointee::Null
            );
        if is_null {
            return Ok(if to.is_bigint(width) { bigint(0) } else { int(0) });
        }

        let Some(from) = self.value_kind(arg).map(|k| k.plain()) else {
            return Err(self.report(
                arg.span,
                format!("`{}` has no scalar type to cast from", arg),
                DiagnosticCode::InvalidCast,
            ));
        };
        let value = self.lower_expr(arg, LoweringContext::value());
        match self.convert(value, from, to) {
            Some(converted) => {
                tracing::trace!("static_cast {} -> {}", from.name(), to.name());
                Ok(fold_expr(converted))
            }
            None => Err(self.report(
                expr.span,
                format!("cannot cast {} to {}", from.name(), to.name()),
                DiagnosticCode::InvalidCast,
            )),
        }
    }

    /// Representation change for a value of kind `from` viewed as `to`
    fn convert(&mut self, x: Expr, from: ScalarKind, to: ScalarKind) -> Option<Expr> {
        let width = self.session.width();
        if matches!(from, ScalarKind::Void | ScalarKind::Null) || matches!(to, ScalarKind::Void | ScalarKind::Null) {
            return None;
        }
        if from == to || (is_address(from) && is_address(to)) {
            return Some(x);
        }
        if (is_address(to) && is_plain_number(from)) || (is_address(from) && is_plain_number(to)) {
            return Some(match (width.is_64(), is_address(to)) {
                (false, _) => x,
                (true, true) => self.literal_or(x, |x| call_named("BigInt", vec![x])),
                (true, false) => call_named("Number", vec![x]),
            });
        }

        let unsigned_address = if width.is_64() {
            ScalarKind::Uint64
        } else {
            ScalarKind::Uint32
        };
        let from = if is_address(from) { unsigned_address } else { from };
        let to = if is_address(to) { unsigned_address } else { to };
        if from == to {
            return Some(x);
        }

        if to == ScalarKind::Bool {
            return Some(not_not(x));
        }
        if from == ScalarKind::Bool {
            let (one, zero) = if to.is_bigint(width) {
                (bigint(1), bigint(0))
            } else {
                (int(1), int(0))
            };
            return Some(paren(conditional(x, one, zero)));
        }
        if to.is_float() {
            return Some(if from.is_bigint(width) {
                call_named("Number", vec![x])
            } else {
                x
            });
        }
        if to.is_bigint(width) {
            return Some(self.to_bigint(x, from, to));
        }
        Some(self.to_number(x, from, to))
    }

    /// A literal converted in place, anything else through `f`
    fn literal_or(&self, x: Expr, f: impl FnOnce(Expr) -> Expr) -> Expr {
        match x.as_number() {
            Some(n) if n.fract() == 0.0 => bigint(n as i128),
            _ => f(x),
        }
    }

    fn to_bigint(&mut self, x: Expr, from: ScalarKind, to: ScalarKind) -> Expr {
        let width = self.session.width();
        if from.is_float() {
            let floored = call_named("BigInt", vec![method(ident("Math"), "floor", vec![x])]);
            return if to.is_signed() {
                floored
            } else {
                method(ident("BigInt"), "asUintN", vec![int(64), floored])
            };
        }
        if from.is_bigint(width) {
            let wrap = if to.is_signed() { "asIntN" } else { "asUintN" };
            return method(ident("BigInt"), wrap, vec![int(64), x]);
        }
        if let Some(n) = x.as_number() {
            if n.fract() == 0.0 {
                return bigint(n as i128);
            }
        }
        let value = match (from.is_signed(), to.is_signed()) {
            (false, _) => x,
            (true, true) => binary(BinaryOp::Shr, x, int(0)),
            (true, false) => binary(BinaryOp::UShr, x, int(0)),
        };
        call_named("BigInt", vec![value])
    }

    fn to_number(&mut self, x: Expr, from: ScalarKind, to: ScalarKind) -> Expr {
        let width = self.session.width();
        let bits = to.bits(width);
        let signed = to.is_signed();

        if from.is_bigint(width) {
            let wrap = if signed { "asIntN" } else { "asUintN" };
            return call_named(
                "Number",
                vec![method(ident("BigInt"), wrap, vec![int(bits as i64), x])],
            );
        }
        if let Some(n) = x.as_number() {
            let value = if bits == 32 && !signed {
                crate::compiler::fold::to_uint32(n) as i64
            } else {
                wrap_integer(to_int32(n) as i64, bits, signed)
            };
            return int(value);
        }
        if from.is_float() {
            return self.narrow(x, bits, signed, true);
        }

        let from_bits = from.bits(width);
        let from_signed = from.is_signed();
        let widening = bits > from_bits && (from_signed == signed || !from_signed);
        if widening {
            return x;
        }
        self.narrow(x, bits, signed, false)
    }

    /// Keep the low `bits` bits of an int32 value, sign-extending for signed kinds
    ///
    /// A float source is truncated first.
    fn narrow(&mut self, x: Expr, bits: u32, signed: bool, from_float: bool) -> Expr {
        if bits >= 32 {
            let op = if signed { BinaryOp::Shr } else { BinaryOp::UShr };
            return binary(op, x, int(0));
        }
        let x = if from_float {
            paren(binary(BinaryOp::Shr, x, int(0)))
        } else if x.precedence() >= Precedence::Call {
            x
        } else {
            paren(x)
        };
        let modulus = 1i64 << bits;
        let masked = paren(binary(BinaryOp::BitAnd, x, int(modulus - 1)));
        if !signed {
            return masked;
        }
        let (setup, m) = self.stabilize(masked);
        let extended = paren(conditional(
            paren(binary(BinaryOp::BitAnd, m.clone(), int(modulus / 2))),
            unary(UnaryOp::Neg, paren(binary(BinaryOp::Sub, int(modulus), m.clone()))),
            m,
        ));
        match setup {
            Some(setup) => paren(comma(vec![setup, extended])),
            None => extended,
        }
    }
}
