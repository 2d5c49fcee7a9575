//! Block-scoped bookkeeping for the lowering traversal.

use crate::syntax::{Statement, VarKind};
use std::collections::HashSet;

#[derive(Debug, Default)]
struct Scope {
    locals: HashSet<String>,
    hoisted: Vec<String>,
    synchronized: bool,
}

/// Stack of lexical scopes, one per block or function body
#[derive(Debug)]
pub struct LexicalContext {
    scopes: Vec<Scope>,
}

impl Default for LexicalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalContext {
    /// Context holding only the module scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Enter a block; `synchronized` is inherited when `None`
    pub fn push(&mut self, synchronized: Option<bool>) {
        let inherited = self.is_synchronized();
        self.scopes.push(Scope {
            synchronized: synchronized.unwrap_or(inherited),
            ..Scope::default()
        });
    }

    /// Leave a block, returning the declarations hoisted into it
    pub fn pop(&mut self) -> Vec<Statement> {
        // the module scope is never popped
        if self.scopes.len() <= 1 {
            return self.take_module_hoisted();
        }
        match self.scopes.pop() {
            Some(scope) => declarations(scope.hoisted),
            None => Vec::new(),
        }
    }

    /// Declarations hoisted into the module scope so far
    pub fn take_module_hoisted(&mut self) -> Vec<Statement> {
        match self.scopes.first_mut() {
            Some(scope) => declarations(std::mem::take(&mut scope.hoisted)),
            None => Vec::new(),
        }
    }

    /// Bind a name in the innermost scope
    pub fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.insert(name.to_string());
        }
    }

    /// Whether a user binding hides the pseudo-global of the same name
    pub fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.locals.contains(name))
    }

    /// Queue `let name;` at the top of the innermost block
    pub fn hoist(&mut self, name: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.insert(name.clone());
            scope.hoisted.push(name);
        }
    }

    /// Whether the enclosing function is synchronized
    pub fn is_synchronized(&self) -> bool {
        self.scopes.last().map(|s| s.synchronized).unwrap_or(false)
    }

    /// Current nesting depth, module scope included
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

fn declarations(names: Vec<String>) -> Vec<Statement> {
    names
        .into_iter()
        .map(|name| Statement::VarDecl {
            kind: VarKind::Let,
            name,
            type_annotation: None,
            init: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_is_scoped() {
        let mut ctx = LexicalContext::new();
        assert!(!ctx.is_shadowed("malloc"));
        ctx.push(None);
        ctx.declare("malloc");
        assert!(ctx.is_shadowed("malloc"));
        ctx.pop();
        assert!(!ctx.is_shadowed("malloc"));
    }

    #[test]
    fn test_hoisted_declarations_come_out_on_pop() {
        let mut ctx = LexicalContext::new();
        ctx.push(Some(true));
        ctx.hoist("__memlower_tmp_0".into());
        ctx.push(None);
        assert!(ctx.is_synchronized());
        assert!(ctx.pop().is_empty());
        let hoisted = ctx.pop();
        assert_eq!(hoisted.len(), 1);
        assert_eq!(hoisted[0].to_string(), "let __memlower_tmp_0;");
        assert_eq!(ctx.depth(), 1);
    }
}
