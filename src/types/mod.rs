//! # Host Type System Bridge
//!
//! The pass never type-checks anything itself. It asks a [`TypeOracle`] what
//! the host's checker already knows, and the [`Classifier`] turns those
//! answers into memory-model categories:
//!
//! ```text
//! HostType ──classify──▶ Pointer { pointee, depth }
//!                        Struct(AggregateKey)
//!                        Scalar(ScalarKind)
//!                        Size
//!                        Unknown  (left alone by the lowering)
//! ```
//!
//! Pointers are recognized three ways:
//!
//! - `pointer<T>` wrappers, nested for deeper indirection
//! - branded primitives carrying a scalar tag and a depth
//! - the `anyptr`, `multiPointer` and `nullptr` aliases

pub mod classifier;
pub mod host;
pub mod table;

pub use classifier::{
    categories_equal, AggregateKey, Classifier, Pointee, PointerDescriptor, TypeCategory,
};
pub use host::{
    AggregateAnnotation, DeclId, Declaration, DeclarationKind, FieldAnnotation, HostType, Member,
    TypeId, TypeOracle,
};
pub use table::TypeTable;
