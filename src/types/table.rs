//! `TypeTable` - a self-contained type oracle.
//!
//! Host front ends that cannot link against the pass directly serialize their
//! type information into this shape; tests and benchmarks build one by hand
//! through the builder methods below.

use super::host::*;
use crate::syntax::{Expr, ExprKind, NodeId, Span};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type oracle backed by plain tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    /// Types, indexed by [`TypeId`]
    #[serde(default)]
    pub types: Vec<HostType>,
    /// Declarations, indexed by [`DeclId`]
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    /// Type of each expression node, keyed by node id
    #[serde(default)]
    pub node_types: BTreeMap<u32, TypeId>,
    #[serde(skip)]
    next_node: u32,
}

impl TypeOracle for TypeTable {
    fn type_of(&self, node: NodeId) -> Option<TypeId> {
        if node.is_detached() {
            return None;
        }
        self.node_types.get(&node.0).copied()
    }

    fn resolve(&self, ty: TypeId) -> Option<&HostType> {
        self.types.get(ty.0 as usize)
    }

    fn declaration(&self, decl: DeclId) -> Option<&Declaration> {
        self.declarations.get(decl.0 as usize)
    }
}

impl TypeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that every id referenced by the table points inside it
    pub fn validate(&self) -> Result<()> {
        let types = self.types.len() as u32;
        let decls = self.declarations.len() as u32;
        let check_ty = |t: &TypeId| {
            if t.0 < types {
                Ok(())
            } else {
                Err(Error::InvalidUnit(format!("type id {} out of range", t.0)))
            }
        };
        for ty in &self.types {
            match ty {
                HostType::Alias { args, target, .. } => {
                    args.iter().try_for_each(check_ty)?;
                    target.iter().try_for_each(check_ty)?;
                }
                HostType::Declared(d) if d.0 >= decls => {
                    return Err(Error::InvalidUnit(format!("declaration id {} out of range", d.0)));
                }
                HostType::Union(members) => members.iter().try_for_each(check_ty)?,
                HostType::ObjectLiteral(members) => {
                    members.iter().try_for_each(|(_, t)| check_ty(t))?
                }
                _ => {}
            }
        }
        for decl in &self.declarations {
            if let DeclarationKind::Class {
                parent, members, ..
            } = &decl.kind
            {
                if matches!(parent, Some(p) if p.0 >= decls) {
                    return Err(Error::InvalidUnit(format!(
                        "parent of `{}` is out of range",
                        decl.name
                    )));
                }
                members.iter().try_for_each(|m| check_ty(&m.ty))?;
            }
        }
        self.node_types.values().try_for_each(check_ty)
    }

    /// Add a type and return its handle
    pub fn add_type(&mut self, ty: HostType) -> TypeId {
        self.types.push(ty);
        TypeId(self.types.len() as u32 - 1)
    }

    /// Add a declaration and return its handle
    pub fn declare(&mut self, decl: Declaration) -> DeclId {
        self.declarations.push(decl);
        DeclId(self.declarations.len() as u32 - 1)
    }

    /// `name<args>`
    pub fn alias(&mut self, name: &str, args: Vec<TypeId>) -> TypeId {
        self.add_type(HostType::Alias {
            name: name.to_string(),
            args,
            target: None,
        })
    }

    /// User alias `type name = target`
    pub fn user_alias(&mut self, name: &str, target: TypeId) -> TypeId {
        self.add_type(HostType::Alias {
            name: name.to_string(),
            args: Vec::new(),
            target: Some(target),
        })
    }

    /// Builtin scalar alias such as `uint8`
    pub fn scalar(&mut self, name: &str) -> TypeId {
        self.alias(name, Vec::new())
    }

    /// `pointer<T>`
    pub fn pointer(&mut self, to: TypeId) -> TypeId {
        self.alias("pointer", vec![to])
    }

    /// `array<T, N>`
    pub fn array(&mut self, of: TypeId, length: u32) -> TypeId {
        let n = self.add_type(HostType::NumberLiteral(length as f64));
        self.alias("array", vec![of, n])
    }

    /// `bit<T, N>`
    pub fn bit(&mut self, of: TypeId, width: u32) -> TypeId {
        let n = self.add_type(HostType::NumberLiteral(width as f64));
        self.alias("bit", vec![of, n])
    }

    /// `SharedPtr<T>`
    pub fn shared_ptr(&mut self, to: TypeId) -> TypeId {
        self.alias("SharedPtr", vec![to])
    }

    /// Anonymous `struct<{..}>`
    pub fn inline_struct(&mut self, members: Vec<(&str, TypeId)>) -> TypeId {
        self.inline_aggregate("struct", members)
    }

    /// Anonymous `union<{..}>`
    pub fn inline_union(&mut self, members: Vec<(&str, TypeId)>) -> TypeId {
        self.inline_aggregate("union", members)
    }

    fn inline_aggregate(&mut self, name: &str, members: Vec<(&str, TypeId)>) -> TypeId {
        let body = self.add_type(HostType::ObjectLiteral(
            members
                .into_iter()
                .map(|(n, t)| (n.to_string(), t))
                .collect(),
        ));
        self.alias(name, vec![body])
    }

    /// Declare an annotated class and return it with its instance type
    pub fn declare_class(
        &mut self,
        name: &str,
        annotation: Option<AggregateAnnotation>,
        parent: Option<DeclId>,
        members: Vec<Member>,
    ) -> (DeclId, TypeId) {
        let decl = self.declare(Declaration {
            name: name.to_string(),
            kind: DeclarationKind::Class {
                annotation,
                parent,
                members,
            },
            module: None,
        });
        let ty = self.add_type(HostType::Declared(decl));
        (decl, ty)
    }

    /// `@struct class name { .. }` with undecorated members
    pub fn declare_struct(&mut self, name: &str, members: Vec<(&str, TypeId)>) -> (DeclId, TypeId) {
        self.declare_class(
            name,
            Some(AggregateAnnotation::Struct),
            None,
            plain_members(members),
        )
    }

    /// `@union class name { .. }` with undecorated members
    pub fn declare_union(&mut self, name: &str, members: Vec<(&str, TypeId)>) -> (DeclId, TypeId) {
        self.declare_class(
            name,
            Some(AggregateAnnotation::Union),
            None,
            plain_members(members),
        )
    }

    /// Replace the member list of an already declared class
    ///
    /// Needed for self-referential aggregates, whose members mention the
    /// class's own instance type.
    pub fn set_members(&mut self, decl: DeclId, new_members: Vec<Member>) {
        if let Some(Declaration {
            kind: DeclarationKind::Class { members, .. },
            ..
        }) = self.declarations.get_mut(decl.0 as usize)
        {
            *members = new_members;
        }
    }

    /// Record the type of a node
    pub fn set_type(&mut self, node: NodeId, ty: TypeId) {
        self.node_types.insert(node.0, ty);
        self.next_node = self.next_node.max(node.0 + 1);
    }

    /// Allocate a fresh node id
    pub fn fresh_node(&mut self) -> NodeId {
        let start = self
            .node_types
            .keys()
            .next_back()
            .map(|k| k + 1)
            .unwrap_or(0);
        let id = self.next_node.max(start);
        self.next_node = id + 1;
        NodeId(id)
    }

    /// Build an expression node, optionally typed
    pub fn node(&mut self, kind: ExprKind, ty: Option<TypeId>) -> Expr {
        let id = self.fresh_node();
        if let Some(t) = ty {
            self.set_type(id, t);
        }
        Expr::new(id, Span::default(), kind)
    }

    /// Typed identifier node
    pub fn ident(&mut self, name: &str, ty: TypeId) -> Expr {
        self.node(ExprKind::Identifier(name.to_string()), Some(ty))
    }
}

/// Members without decorators
pub fn plain_members(members: Vec<(&str, TypeId)>) -> Vec<Member> {
    members
        .into_iter()
        .map(|(name, ty)| Member {
            name: name.to_string(),
            ty,
            annotations: Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assigns_ids() {
        let mut table = TypeTable::new();
        let u8t = table.scalar("uint8");
        let p = table.pointer(u8t);
        assert_eq!(u8t, TypeId(0));
        assert_eq!(p, TypeId(1));
        let a = table.ident("a", p);
        let b = table.ident("b", u8t);
        assert_ne!(a.id, b.id);
        assert_eq!(table.type_of(a.id), Some(p));
        assert_eq!(table.type_of(NodeId::DETACHED), None);
    }

    #[test]
    fn test_validate_rejects_dangling_ids() {
        let mut table = TypeTable::new();
        table.add_type(HostType::Alias {
            name: "pointer".into(),
            args: vec![TypeId(7)],
            target: None,
        });
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let mut table = TypeTable::new();
        let u16t = table.scalar("uint16");
        table.declare_struct("A", vec![("x", u16t)]);
        let json = serde_json::to_string(&table).unwrap();
        let back: TypeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.types, table.types);
        assert_eq!(back.declarations, table.declarations);
        assert!(back.validate().is_ok());
    }
}
