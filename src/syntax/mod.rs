//! Host-language syntax tree consumed and produced by the pass.
//!
//! The pass never parses source text: a host front end hands it a
//! [`Program`] (usually as JSON) together with a type oracle, and the pass
//! returns a rewritten [`Program`].

pub mod ast;
pub mod builder;
pub mod printer;

pub use ast::{
    AssignOp, BinaryOp, ClassMember, Expr, ExprKind, NodeId, ObjectProperty, Param, Precedence,
    Program, Span, Statement, UnaryOp, UpdateOp, VarKind,
};
pub use printer::Printer;
