//! # memlower - C-style memory semantics for a typed host language
//!
//! memlower is a source-to-source pass. It takes a typed syntax tree whose
//! programs use `pointer<T>`, `@struct` classes, bit-fields, fixed arrays and
//! atomics, and rewrites every such operation into address arithmetic plus
//! calls to a small runtime that reads and writes one shared linear memory.
//!
//! ## Features
//!
//! - **Struct layout** - C-compatible offsets, padding, unions, inheritance and bit-field packing
//! - **Pointer arithmetic** - scaled by the pointee size, in 32- or 64-bit addressing
//! - **Field access** - `p.x.y` becomes one `CTypeEnumRead[kind](p + offset)`
//! - **Casts** - `static_cast<T>(x)` between every pair of scalar kinds
//! - **Atomics** - kind tag and element shift appended to every atomic runtime call
//! - **Conditional compilation** - `if (defined(FLAG))` folded against the configured flags
//! - **Inline assembly** - `asm` templates assembled by an external tool and embedded
//!
//! ## Quick Start
//!
//! ```rust
//! use memlower::compiler::{CollectingSink, CompileOptions, Compiler};
//! use memlower::syntax::builder::call_named;
//! use memlower::syntax::{ExprKind, Program, Statement};
//! use memlower::types::TypeTable;
//!
//! // What the host type checker knows: `p: pointer<Point>`
//! let mut types = TypeTable::new();
//! let u16t = types.scalar("uint16");
//! let (_, point) = types.declare_struct("Point", vec![("x", u16t), ("y", u16t)]);
//! let ptr = types.pointer(point);
//! let p = types.ident("p", ptr);
//! let y = types.node(
//!     ExprKind::Property { object: Box::new(p), name: "y".into() },
//!     Some(u16t),
//! );
//!
//! // f(p.y)
//! let program = Program {
//!     statements: vec![Statement::Expression(call_named("f", vec![y]))],
//! };
//!
//! let mut compiler = Compiler::new(CompileOptions::default())
//!     .with_sink(Box::new(CollectingSink::default()));
//! let output = compiler.compile(&program, &types, "src/point.ts");
//! assert_eq!(output.program.to_string(), "f(CTypeEnumRead[6](p + 2));\n");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Program + TypeOracle → Classifier → LayoutEngine → Lowerer → Program + imports
//! ```
//!
//! ### Main Components
//!
//! - [`types::TypeOracle`] - what the host knows about each node and declaration
//! - [`types::Classifier`] - maps host types onto pointer / struct / scalar / size
//! - [`compiler::LayoutEngine`] - computes offsets and sizes of aggregates
//! - [`compiler::CompilationSession`] - per-run layout cache, imports and diagnostics
//! - [`compiler::Lowerer`] - the rewriting traversal
//! - [`compiler::Compiler`] - driver tying the above together
//!
//! ## Error Handling
//!
//! Problems in the program being rewritten never abort the pass. They are
//! reported as [`compiler::Diagnostic`]s and the offending expression is kept
//! as written. [`Error`] is reserved for the environment: unreadable files,
//! malformed units, an assembler that cannot be started.
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

#![allow(clippy::only_used_in_recursion)] // recursive lowering helpers
#![allow(clippy::collapsible_match)]

/// Version of memlower
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod syntax;
pub mod types;

// Re-export main types
pub use compiler::{
    CompilationUnit, CompileOptions, CompileOutput, Compiler, Diagnostic, DiagnosticCode,
};
pub use error::{Error, Result};
pub use syntax::{Expr, ExprKind, Program, Statement};
pub use types::{TypeOracle, TypeTable};
