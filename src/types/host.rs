//! The narrow view of the host's static type system that the pass relies on.

use crate::syntax::NodeId;
use serde::{Deserialize, Serialize};

/// Handle of a type in the host's type system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Handle of a declaration (class, enum, function, variable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

/// A resolved host type
///
/// Only the shapes the memory model cares about are distinguished; everything
/// else is `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostType {
    /// Reference to a named alias with type arguments, e.g. `pointer<T>`,
    /// `array<T, 4>`, `uint8`, `anyptr`, or a user alias
    Alias {
        /// Alias name as declared
        name: String,
        /// Type arguments
        #[serde(default)]
        args: Vec<TypeId>,
        /// What a user-declared alias stands for
        #[serde(default)]
        target: Option<TypeId>,
    },
    /// Instance type of a declared class or enum
    Declared(DeclId),
    /// Primitive intersected with a brand carrying a scalar tag and a pointer depth
    Branded {
        /// Scalar kind name carried by the brand
        tag: String,
        /// Pointer depth; 0 for a plain scalar
        #[serde(default)]
        level: u32,
    },
    /// Union of member types
    Union(Vec<TypeId>),
    /// Anonymous object type `{ a: T; b: U }`
    ObjectLiteral(Vec<(String, TypeId)>),
    /// Numeric literal type such as `4`
    NumberLiteral(f64),
    /// `number`
    Number,
    /// `bigint`
    BigInt,
    /// `boolean`
    Boolean,
    /// `string`
    String,
    /// `any`
    Any,
    /// `void`
    Void,
    /// Anything else
    Unknown,
}

/// Aggregate annotation on a class declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateAnnotation {
    /// `@struct`
    Struct,
    /// `@union`
    Union,
}

/// Decorator on a class property that overrides its analysed type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAnnotation {
    /// `@type(kind)`
    Type(String),
    /// `@pointer(level)`
    Pointer(u32),
    /// `@array(length)`
    Array(u32),
    /// `@bit(width)`
    Bit(u32),
    /// `@ignore`
    Ignore,
}

/// Property of a class declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Property name
    pub name: String,
    /// Declared type
    pub ty: TypeId,
    /// Decorators in source order
    #[serde(default)]
    pub annotations: Vec<FieldAnnotation>,
}

/// What a declaration declares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclarationKind {
    /// Class, possibly annotated as an aggregate
    Class {
        /// `@struct` / `@union`, if present
        #[serde(default)]
        annotation: Option<AggregateAnnotation>,
        /// Extended class
        #[serde(default)]
        parent: Option<DeclId>,
        /// Properties in declaration order
        #[serde(default)]
        members: Vec<Member>,
    },
    /// Enum declaration
    Enum,
    /// Function declaration
    Function,
    /// Variable declaration
    Variable,
}

/// A declaration known to the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Declared name
    pub name: String,
    /// Declaration payload
    pub kind: DeclarationKind,
    /// Module path the declaration lives in
    #[serde(default)]
    pub module: Option<String>,
}

impl Declaration {
    /// The aggregate annotation of a class declaration
    pub fn annotation(&self) -> Option<AggregateAnnotation> {
        match &self.kind {
            DeclarationKind::Class { annotation, .. } => *annotation,
            _ => None,
        }
    }
}

/// Queries the pass makes against the host's static type system
///
/// The real type checker of the host is one implementation;
/// [`TypeTable`](crate::types::TypeTable) is another, fed from JSON or built by hand.
pub trait TypeOracle {
    /// Type of an expression node, if the host knows it
    fn type_of(&self, node: NodeId) -> Option<TypeId>;

    /// Resolve a type handle
    fn resolve(&self, ty: TypeId) -> Option<&HostType>;

    /// Look up a declaration
    fn declaration(&self, decl: DeclId) -> Option<&Declaration>;
}
