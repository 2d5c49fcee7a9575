//! Type classification for the memory model.
//!
//! Answers, for any host type: is it a pointer (to what, how deep), an
//! aggregate, a builtin scalar, the platform-width `size`, or none of these.
//! Aliases are followed; for unions the first member decides.

use super::host::*;
use crate::compiler::memory_model::ScalarKind;
use serde::{Deserialize, Serialize};

const MAX_RESOLVE_DEPTH: u32 = 64;

/// Identity of an aggregate layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AggregateKey {
    /// Class annotated with `@struct` / `@union`
    Declared(DeclId),
    /// Anonymous `struct<{..}>` / `union<{..}>` type expression
    Inline(TypeId),
}

/// What a pointer points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pointee {
    /// Builtin scalar (including `void`)
    Scalar(ScalarKind),
    /// Aggregate, resolved lazily through the layout cache
    Aggregate(AggregateKey),
    /// `anyptr`
    Any,
    /// `multiPointer`
    Multi,
    /// `nullptr`
    Null,
}

/// A pointer's target and indirection depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerDescriptor {
    /// Innermost target
    pub pointee: Pointee,
    /// Levels of indirection, at least 1
    pub depth: u32,
}

impl PointerDescriptor {
    /// Single-level pointer
    pub fn to(pointee: Pointee) -> Self {
        Self { pointee, depth: 1 }
    }

    /// The pointer obtained by dereferencing once, if still a pointer
    pub fn deref(&self) -> Option<PointerDescriptor> {
        (self.depth > 1).then(|| PointerDescriptor {
            pointee: self.pointee,
            depth: self.depth - 1,
        })
    }

    /// Whether this pointer accepts any other pointer
    pub fn is_untyped(&self) -> bool {
        self.depth == 1 && matches!(self.pointee, Pointee::Any | Pointee::Null)
    }
}

/// Memory-model category of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Raw pointer
    Pointer(PointerDescriptor),
    /// Struct or union
    Struct(AggregateKey),
    /// Builtin scalar
    Scalar(ScalarKind),
    /// Platform-width integer
    Size,
    /// `SharedPtr<T>`; the descriptor is the pointer it wraps
    SharedPointer(PointerDescriptor),
    /// `array<T, N>`
    Array {
        /// Element type
        element: TypeId,
        /// Element count
        length: u32,
    },
    /// Not part of the memory model
    Unknown,
}

impl TypeCategory {
    /// The pointer descriptor, if this is a raw pointer
    pub fn as_pointer(&self) -> Option<PointerDescriptor> {
        match self {
            TypeCategory::Pointer(d) => Some(*d),
            _ => None,
        }
    }

    /// Scalar kind carried by a value of this category
    ///
    /// Pointers are `pointer`, the platform integer is `size`.
    pub fn value_kind(&self) -> Option<ScalarKind> {
        match self {
            TypeCategory::Pointer(_) => Some(ScalarKind::Pointer),
            TypeCategory::Scalar(k) => Some(*k),
            TypeCategory::Size => Some(ScalarKind::Size),
            _ => None,
        }
    }
}

/// Classifies host types against the memory model
pub struct Classifier<'a> {
    oracle: &'a dyn TypeOracle,
}

impl<'a> Classifier<'a> {
    /// Create a classifier over an oracle
    pub fn new(oracle: &'a dyn TypeOracle) -> Self {
        Self { oracle }
    }

    /// Category of a type
    pub fn classify(&self, ty: TypeId) -> TypeCategory {
        self.classify_at(ty, 0)
    }

    fn classify_at(&self, ty: TypeId, depth: u32) -> TypeCategory {
        if depth > MAX_RESOLVE_DEPTH {
            tracing::warn!("type {} does not resolve; alias cycle?", ty.0);
            return TypeCategory::Unknown;
        }
        let Some(resolved) = self.oracle.resolve(ty) else {
            return TypeCategory::Unknown;
        };
        match resolved {
            HostType::Alias { name, args, target } => match name.as_str() {
                "pointer" => match args.first() {
                    Some(arg) => TypeCategory::Pointer(self.pointer_to(*arg, depth + 1)),
                    None => TypeCategory::Pointer(PointerDescriptor::to(Pointee::Scalar(
                        ScalarKind::Void,
                    ))),
                },
                "anyptr" => TypeCategory::Pointer(PointerDescriptor::to(Pointee::Any)),
                "multiPointer" => TypeCategory::Pointer(PointerDescriptor::to(Pointee::Multi)),
                "nullptr" => TypeCategory::Pointer(PointerDescriptor::to(Pointee::Null)),
                "size" => TypeCategory::Size,
                "struct" | "union" => TypeCategory::Struct(AggregateKey::Inline(ty)),
                "SharedPtr" => match args.first() {
                    Some(arg) => TypeCategory::SharedPointer(self.pointer_to(*arg, depth + 1)),
                    None => TypeCategory::Unknown,
                },
                "array" => match (args.first(), args.get(1).and_then(|n| self.number_arg(*n))) {
                    (Some(element), Some(length)) => TypeCategory::Array {
                        element: *element,
                        length,
                    },
                    _ => TypeCategory::Unknown,
                },
                "bit" => match args.first() {
                    Some(arg) => self.classify_at(*arg, depth + 1),
                    None => TypeCategory::Unknown,
                },
                other => match ScalarKind::from_name(other) {
                    Some(ScalarKind::Pointer) => {
                        TypeCategory::Pointer(PointerDescriptor::to(Pointee::Scalar(ScalarKind::Void)))
                    }
                    Some(ScalarKind::Null) => {
                        TypeCategory::Pointer(PointerDescriptor::to(Pointee::Null))
                    }
                    Some(kind) => TypeCategory::Scalar(kind),
                    None => match target {
                        Some(t) => self.classify_at(*t, depth + 1),
                        None => TypeCategory::Unknown,
                    },
                },
            },
            HostType::Declared(decl) => match self.oracle.declaration(*decl) {
                Some(d) if d.annotation().is_some() => {
                    TypeCategory::Struct(AggregateKey::Declared(*decl))
                }
                Some(Declaration {
                    kind: DeclarationKind::Enum,
                    ..
                }) => TypeCategory::Scalar(ScalarKind::Int32),
                _ => TypeCategory::Unknown,
            },
            HostType::Branded { tag, level } => {
                let kind = ScalarKind::from_name(tag);
                match (kind, *level) {
                    (Some(ScalarKind::Size), 0) => TypeCategory::Size,
                    (Some(k), 0) => TypeCategory::Scalar(k),
                    (Some(k), level) => TypeCategory::Pointer(PointerDescriptor {
                        pointee: Pointee::Scalar(k),
                        depth: level,
                    }),
                    (None, _) => TypeCategory::Unknown,
                }
            }
            HostType::Union(members) => match members.first() {
                Some(first) => self.classify_at(*first, depth + 1),
                None => TypeCategory::Unknown,
            },
            _ => TypeCategory::Unknown,
        }
    }

    fn pointer_to(&self, target: TypeId, depth: u32) -> PointerDescriptor {
        match self.classify_at(target, depth) {
            TypeCategory::Pointer(inner) => PointerDescriptor {
                pointee: inner.pointee,
                depth: inner.depth + 1,
            },
            TypeCategory::Struct(key) => PointerDescriptor::to(Pointee::Aggregate(key)),
            TypeCategory::Scalar(kind) => PointerDescriptor::to(Pointee::Scalar(kind)),
            TypeCategory::Size => PointerDescriptor::to(Pointee::Scalar(ScalarKind::Size)),
            _ => PointerDescriptor::to(Pointee::Scalar(ScalarKind::Void)),
        }
    }

    /// Value of a numeric literal type argument (`4` in `array<T, 4>`)
    pub fn number_arg(&self, ty: TypeId) -> Option<u32> {
        match self.oracle.resolve(ty)? {
            HostType::NumberLiteral(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u32),
            _ => None,
        }
    }

    /// Structural compatibility used to validate assignments and casts
    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        categories_equal(&self.classify(a), &self.classify(b))
    }

    /// Pointer depth of a type; 0 for non-pointers
    pub fn pointer_depth(&self, ty: TypeId) -> u32 {
        match self.classify(ty) {
            TypeCategory::Pointer(d) => d.depth,
            _ => 0,
        }
    }

    /// Scalar kind of a host value when it takes part in a numeric cast
    ///
    /// Plain host numbers count as `double`, integral number literals as
    /// `int32`, `bigint` as `int64` and `boolean` as `bool`.
    pub fn cast_kind(&self, ty: TypeId) -> Option<ScalarKind> {
        self.cast_kind_at(ty, 0)
    }

    fn cast_kind_at(&self, ty: TypeId, depth: u32) -> Option<ScalarKind> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        if let Some(kind) = self.classify(ty).value_kind() {
            return Some(kind);
        }
        match self.oracle.resolve(ty)? {
            HostType::NumberLiteral(n) if n.fract() == 0.0 && n.abs() < 2_147_483_648.0 => {
                Some(ScalarKind::Int32)
            }
            HostType::NumberLiteral(n) if n.fract() == 0.0 && *n >= 0.0 && *n < 4_294_967_296.0 => {
                Some(ScalarKind::Uint32)
            }
            HostType::NumberLiteral(_) | HostType::Number => Some(ScalarKind::Double),
            HostType::BigInt => Some(ScalarKind::Int64),
            HostType::Boolean => Some(ScalarKind::Bool),
            HostType::Union(members) => self.cast_kind_at(*members.first()?, depth + 1),
            _ => None,
        }
    }
}

/// Compatibility of two already classified types
pub fn categories_equal(a: &TypeCategory, b: &TypeCategory) -> bool {
    match (a, b) {
        (TypeCategory::Pointer(x), TypeCategory::Pointer(y)) => {
            if x.is_untyped() || y.is_untyped() {
                return true;
            }
            x.depth == y.depth && x.pointee == y.pointee
        }
        (TypeCategory::SharedPointer(x), TypeCategory::SharedPointer(y)) => x == y,
        (TypeCategory::Struct(x), TypeCategory::Struct(y)) => x == y,
        (TypeCategory::Scalar(x), TypeCategory::Scalar(y)) => x == y,
        (TypeCategory::Size, TypeCategory::Size) => true,
        (
            TypeCategory::Array {
                element: ex,
                length: lx,
            },
            TypeCategory::Array {
                element: ey,
                length: ly,
            },
        ) => ex == ey && lx == ly,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    #[test]
    fn test_pointer_depth_through_nesting() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let p1 = t.pointer(u8t);
        let p2 = t.pointer(p1);
        let c = Classifier::new(&t);
        assert_eq!(c.pointer_depth(p1), 1);
        assert_eq!(c.pointer_depth(p2), 2);
        assert_eq!(
            c.classify(p2),
            TypeCategory::Pointer(PointerDescriptor {
                pointee: Pointee::Scalar(ScalarKind::Uint8),
                depth: 2
            })
        );
    }

    #[test]
    fn test_aliases_and_unions_resolve() {
        let mut t = TypeTable::new();
        let i16t = t.scalar("int16");
        let alias = t.user_alias("Short", i16t);
        let undefined = t.add_type(HostType::Void);
        let union = t.add_type(HostType::Union(vec![alias, undefined]));
        let c = Classifier::new(&t);
        assert_eq!(c.classify(union), TypeCategory::Scalar(ScalarKind::Int16));
    }

    #[test]
    fn test_branded_pointer() {
        let mut t = TypeTable::new();
        let branded = t.add_type(HostType::Branded {
            tag: "uint32".into(),
            level: 2,
        });
        let size = t.add_type(HostType::Branded {
            tag: "size".into(),
            level: 0,
        });
        let c = Classifier::new(&t);
        assert_eq!(c.pointer_depth(branded), 2);
        assert_eq!(c.classify(size), TypeCategory::Size);
    }

    #[test]
    fn test_struct_recognition() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let (decl, ty) = t.declare_struct("A", vec![("a", u8t)]);
        let (_, plain) = t.declare_class("B", None, None, vec![]);
        let inline = t.inline_struct(vec![("x", u8t)]);
        let c = Classifier::new(&t);
        assert_eq!(c.classify(ty), TypeCategory::Struct(AggregateKey::Declared(decl)));
        assert_eq!(c.classify(plain), TypeCategory::Unknown);
        assert_eq!(c.classify(inline), TypeCategory::Struct(AggregateKey::Inline(inline)));
    }

    #[test]
    fn test_types_equal() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let u16t = t.scalar("uint16");
        let p8 = t.pointer(u8t);
        let p16 = t.pointer(u16t);
        let any = t.scalar("anyptr");
        let pp8 = t.pointer(p8);
        let c = Classifier::new(&t);
        assert!(c.types_equal(p8, any));
        assert!(c.types_equal(any, pp8));
        assert!(!c.types_equal(p8, p16));
        assert!(!c.types_equal(p8, pp8));
        assert!(c.types_equal(u8t, u8t));
        assert!(!c.types_equal(u8t, u16t));
    }

    #[test]
    fn test_unknown_is_not_fatal() {
        let mut t = TypeTable::new();
        let s = t.add_type(HostType::String);
        let c = Classifier::new(&t);
        assert_eq!(c.classify(s), TypeCategory::Unknown);
        assert_eq!(c.classify(TypeId(99)), TypeCategory::Unknown);
    }

    #[test]
    fn test_cast_kind_of_host_primitives() {
        let mut t = TypeTable::new();
        let lit = t.add_type(HostType::NumberLiteral(100.0));
        let num = t.add_type(HostType::Number);
        let big = t.add_type(HostType::BigInt);
        let c = Classifier::new(&t);
        assert_eq!(c.cast_kind(lit), Some(ScalarKind::Int32));
        assert_eq!(c.cast_kind(num), Some(ScalarKind::Double));
        assert_eq!(c.cast_kind(big), Some(ScalarKind::Int64));
    }
}
