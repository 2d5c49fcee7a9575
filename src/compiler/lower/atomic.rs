//! Calls into the atomics runtime.
//!
//! `add(p, v)` on a `pointer<atomic_T>` gains two trailing arguments, the
//! kind tag and the shift that turns a byte address into an element index.
//! `atomic_bool` has no lock-free representation of its own and goes through
//! `atomic_int8`, with booleans coerced to `0`/`1` on the way in and `load`
//! coerced back.

use super::{LoweringContext, Lowerer};
use crate::compiler::memory_model::ScalarKind;
use crate::syntax::builder::*;
use crate::syntax::{Expr, ExprKind};
use crate::types::Pointee;

/// Operations the atomics runtime provides
pub const ATOMIC_OPERATIONS: [&str; 9] = [
    "add",
    "sub",
    "and",
    "or",
    "xor",
    "store",
    "load",
    "compareExchange",
    "exchange",
];

fn operation_name(callee: &Expr) -> Option<&str> {
    let name = match &callee.kind {
        ExprKind::Identifier(name) => name.as_str(),
        ExprKind::Property { name, .. } => name.as_str(),
        _ => return None,
    };
    ATOMIC_OPERATIONS.contains(&name).then_some(name)
}

impl<'a> Lowerer<'a> {
    /// Lower an atomic runtime call; `None` when the call is something else
    pub(super) fn lower_atomic(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> Option<Expr> {
        let operation = operation_name(callee)?;
        let desc = self.category(args.first()?).as_pointer()?;
        let kind = match desc.pointee {
            Pointee::Scalar(kind) if desc.depth == 1 && kind.is_atomic() => kind,
            _ => return None,
        };
        let is_bool = kind == ScalarKind::AtomicBool;
        let routed = if is_bool { ScalarKind::AtomicInt8 } else { kind };

        let value = LoweringContext::value();
        let mut lowered = Vec::with_capacity(args.len() + 2);
        for (i, arg) in args.iter().enumerate() {
            let arg = self.lower_expr(arg, value);
            lowered.push(if is_bool && i > 0 { bool_to_int(arg) } else { arg });
        }
        lowered.push(int(routed.tag() as i64));
        lowered.push(int(routed.pointer_shift() as i64));
        tracing::trace!("atomic {} on {}", operation, kind.name());

        let result = call(self.lower_expr(callee, value), lowered);
        let result = if is_bool && operation == "load" {
            not_not(result)
        } else {
            result
        };
        Some(result.at(expr.span))
    }
}

fn bool_to_int(value: Expr) -> Expr {
    match value.kind {
        ExprKind::Bool(b) => int(b as i64),
        _ => paren(conditional(paren(value), int(1), int(0))),
    }
}
