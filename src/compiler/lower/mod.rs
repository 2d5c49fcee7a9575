//! # Expression Lowering
//!
//! Rewrites pointer, struct, cast and atomic operations into address
//! arithmetic plus calls to the runtime's read/write-by-kind tables, folds
//! compile-time conditionals, and attaches layout metadata to aggregate
//! declarations.
//!
//! Lowering of a unit never fails as a whole. An illegal expression is
//! reported to the session and the original node is kept, so the rest of the
//! unit is still rewritten.
//!
//! The traversal is split by concern:
//!
//! - `place`: memory places (field, index and dereference chains), reads and stores
//! - `assign`: plain, compound and chained assignment, aggregate copies
//! - `arithmetic`: pointer arithmetic, pointer difference, `size` mixing
//! - `unary`: prefix operators and `++`/`--`
//! - `cast`: `static_cast`
//! - `atomic`: calls into the atomics runtime
//! - `intrinsics`: `sizeof`, `addressof`, allocators, `make`, `asm` and friends

mod arithmetic;
mod assign;
mod atomic;
mod cast;
mod intrinsics;
mod place;
mod unary;

pub use place::{Place, Slot};

use super::asm::AsmCompiler;
use super::conditional::{collapse, splice, ConditionalFolder};
use super::diagnostics::DiagnosticCode;
use super::memory_model::ScalarKind;
use super::metadata::StructMetadata;
use super::scope::LexicalContext;
use super::session::{CompilationSession, RuntimeImport};
use crate::syntax::builder::*;
use crate::syntax::{Expr, ExprKind, ObjectProperty, Param, Program, Span, Statement};
use crate::types::{AggregateKey, HostType, TypeOracle};

/// Marker for an expression whose problem has already been reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reported;

/// Outcome of lowering a sub-expression that may be illegal
pub type Lowered<T> = std::result::Result<T, Reported>;

/// Position of the expression being lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoweringContext {
    /// The value of the expression is not used
    pub discard: bool,
}

impl LoweringContext {
    /// The expression's value is consumed
    pub fn value() -> Self {
        Self { discard: false }
    }

    /// The expression is evaluated for its effects only
    pub fn statement() -> Self {
        Self { discard: true }
    }
}

/// Lowers one compilation unit against a session and a type oracle
pub struct Lowerer<'a> {
    session: &'a mut CompilationSession,
    oracle: &'a dyn TypeOracle,
    scopes: LexicalContext,
    asm: AsmCompiler,
}

impl<'a> Lowerer<'a> {
    /// Create a lowerer
    pub fn new(session: &'a mut CompilationSession, oracle: &'a dyn TypeOracle) -> Self {
        let options = session.options();
        let asm = AsmCompiler::new(
            options.assembler.clone(),
            options.temp_dir.clone(),
            options.addressing_width,
        );
        Self {
            session,
            oracle,
            scopes: LexicalContext::new(),
            asm,
        }
    }

    /// Lower a whole program
    pub fn lower_program(&mut self, program: &Program) -> Program {
        let body = self.lower_list(&program.statements);
        let mut statements = self.scopes.take_module_hoisted();
        statements.extend(body);
        Program { statements }
    }

    fn lower_list(&mut self, list: &[Statement]) -> Vec<Statement> {
        for stmt in list {
            match stmt {
                Statement::VarDecl { name, .. } | Statement::Function { name, .. } => {
                    self.scopes.declare(name)
                }
                _ => {}
            }
        }
        list.iter()
            .flat_map(|stmt| self.lower_statement(stmt))
            .collect()
    }

    fn lower_block(
        &mut self,
        list: &[Statement],
        synchronized: Option<bool>,
        params: &[Param],
    ) -> Vec<Statement> {
        self.scopes.push(synchronized);
        for param in params {
            self.scopes.declare(&param.name);
        }
        let body = self.lower_list(list);
        let mut statements = self.scopes.pop();
        statements.extend(body);
        statements
    }

    /// Body of an `if`/`while`, which is either a block or a single statement
    fn lower_body(&mut self, stmt: &Statement) -> Statement {
        match stmt {
            Statement::Block(list) => Statement::Block(self.lower_block(list, None, &[])),
            other => collapse(self.lower_statement(other)),
        }
    }

    /// Lower one statement into the statements replacing it
    pub fn lower_statement(&mut self, stmt: &Statement) -> Vec<Statement> {
        match stmt {
            Statement::Expression(expr) => {
                vec![Statement::Expression(
                    self.lower_expr(expr, LoweringContext::statement()),
                )]
            }
            Statement::VarDecl {
                kind,
                name,
                type_annotation,
                init,
            } => vec![Statement::VarDecl {
                kind: *kind,
                name: name.clone(),
                type_annotation: type_annotation.clone(),
                init: init
                    .as_ref()
                    .map(|e| self.lower_expr(e, LoweringContext::value())),
            }],
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => match self.evaluate_condition(condition) {
                Some(true) => self.lower_list(&splice((**then_branch).clone())),
                Some(false) => match else_branch {
                    Some(branch) => self.lower_list(&splice((**branch).clone())),
                    None => Vec::new(),
                },
                None => vec![Statement::If {
                    condition: self.lower_expr(condition, LoweringContext::value()),
                    then_branch: Box::new(self.lower_body(then_branch)),
                    else_branch: else_branch
                        .as_ref()
                        .map(|b| Box::new(self.lower_body(b))),
                }],
            },
            Statement::Block(list) => vec![Statement::Block(self.lower_block(list, None, &[]))],
            Statement::Return(value) => vec![Statement::Return(
                value
                    .as_ref()
                    .map(|e| self.lower_expr(e, LoweringContext::value())),
            )],
            Statement::While { condition, body } => vec![Statement::While {
                condition: self.lower_expr(condition, LoweringContext::value()),
                body: Box::new(self.lower_body(body)),
            }],
            Statement::Function {
                name,
                params,
                body,
                synchronized,
            } => vec![Statement::Function {
                name: name.clone(),
                params: params.clone(),
                body: self.lower_block(body, Some(*synchronized), params),
                synchronized: *synchronized,
            }],
            Statement::Class {
                decl,
                name,
                decorators,
                extends,
                members,
                metadata,
            } => {
                let metadata = match self
                    .session
                    .descriptor(self.oracle, AggregateKey::Declared(*decl))
                {
                    Some(descriptor) => {
                        for import in RuntimeImport::metadata() {
                            self.session.import(import);
                        }
                        Some(StructMetadata::from_descriptor(&descriptor))
                    }
                    None => metadata.clone(),
                };
                vec![Statement::Class {
                    decl: *decl,
                    name: name.clone(),
                    decorators: decorators.clone(),
                    extends: extends.clone(),
                    members: members.clone(),
                    metadata,
                }]
            }
            Statement::Empty => vec![Statement::Empty],
        }
    }

    /// Decide a compile-time condition, reporting flags that are not configured
    fn evaluate_condition(&mut self, condition: &Expr) -> Option<bool> {
        let evaluation = {
            let flags = &self.session.options().flags;
            ConditionalFolder::new(flags, self.session.file()).evaluate(condition)
        }?;
        for unknown in &evaluation.unknown {
            self.session.report(
                unknown.span,
                format!("flag in `{}` is not defined", unknown),
                DiagnosticCode::UnknownFlag,
            );
        }
        Some(evaluation.value)
    }

    /// Lower an expression; memory places become reads
    pub fn lower_expr(&mut self, expr: &Expr, cx: LoweringContext) -> Expr {
        match self.place_of(expr) {
            Ok(Some(place)) => {
                let lowered = self.read(place);
                tracing::trace!("lowered `{}` to `{}`", expr, lowered);
                lowered.at(expr.span)
            }
            Ok(None) => self.lower_structural(expr, cx),
            Err(Reported) => expr.clone(),
        }
    }

    /// Lower an expression that is not itself a memory place
    fn lower_structural(&mut self, expr: &Expr, cx: LoweringContext) -> Expr {
        let value = LoweringContext::value();
        let rebuilt = |kind| Expr::new(expr.id, expr.span, kind);
        match &expr.kind {
            ExprKind::Identifier(name) => self.lower_identifier(expr, name),
            ExprKind::Number(_)
            | ExprKind::BigInt(_)
            | ExprKind::String(_)
            | ExprKind::Bool(_)
            | ExprKind::Null => expr.clone(),
            ExprKind::Property { object, name } => rebuilt(ExprKind::Property {
                object: Box::new(self.lower_expr(object, value)),
                name: name.clone(),
            }),
            ExprKind::Index { object, index } => rebuilt(ExprKind::Index {
                object: Box::new(self.lower_expr(object, value)),
                index: Box::new(self.lower_expr(index, value)),
            }),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.lower_call(expr, callee, type_args, args, cx),
            ExprKind::Binary { op, left, right } => self.lower_binary(expr, *op, left, right),
            ExprKind::Assign {
                op,
                target,
                value: assigned,
            } => self.lower_assign(expr, *op, target, assigned, cx),
            ExprKind::Unary { op, operand } => self.lower_unary(expr, *op, operand),
            ExprKind::Update {
                op,
                prefix,
                operand,
            } => self.lower_update(expr, *op, *prefix, operand, cx),
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => match self.evaluate_condition(condition) {
                Some(true) => self.lower_expr(then, cx),
                Some(false) => self.lower_expr(otherwise, cx),
                None => rebuilt(ExprKind::Conditional {
                    condition: Box::new(self.lower_expr(condition, value)),
                    then: Box::new(self.lower_expr(then, cx)),
                    otherwise: Box::new(self.lower_expr(otherwise, cx)),
                }),
            },
            ExprKind::Paren(inner) => rebuilt(ExprKind::Paren(Box::new(self.lower_expr(inner, cx)))),
            ExprKind::Object(properties) => rebuilt(ExprKind::Object(
                properties
                    .iter()
                    .map(|p| ObjectProperty {
                        key: p.key.clone(),
                        value: self.lower_expr(&p.value, value),
                    })
                    .collect(),
            )),
            ExprKind::Array(items) => rebuilt(ExprKind::Array(
                items.iter().map(|e| self.lower_expr(e, value)).collect(),
            )),
            ExprKind::TaggedTemplate {
                tag,
                quasis,
                substitutions,
            } => {
                if self.is_intrinsic(tag, "asm") {
                    return self.lower_asm(expr, quasis, substitutions);
                }
                rebuilt(ExprKind::TaggedTemplate {
                    tag: Box::new(self.lower_expr(tag, value)),
                    quasis: quasis.clone(),
                    substitutions: substitutions
                        .iter()
                        .map(|e| self.lower_expr(e, value))
                        .collect(),
                })
            }
            ExprKind::As {
                expr: inner,
                ty,
                type_name,
            } => rebuilt(ExprKind::As {
                expr: Box::new(self.lower_expr(inner, value)),
                ty: *ty,
                type_name: type_name.clone(),
            }),
            ExprKind::Comma(list) => {
                let last = list.len().saturating_sub(1);
                rebuilt(ExprKind::Comma(
                    list.iter()
                        .enumerate()
                        .map(|(i, e)| {
                            let cx = if i == last { cx } else { LoweringContext::statement() };
                            self.lower_expr(e, cx)
                        })
                        .collect(),
                ))
            }
        }
    }

    fn lower_identifier(&mut self, expr: &Expr, name: &str) -> Expr {
        if self.scopes.is_shadowed(name) {
            return expr.clone();
        }
        match name {
            "nullptr" => return self.null_literal().at(expr.span),
            "__LINE__" => return int(expr.span.line as i64).at(expr.span),
            "__FILE__" => return string(self.session.file()).at(expr.span),
            _ => {}
        }
        let Some(kind) = ScalarKind::from_name(name) else {
            return expr.clone();
        };
        // a value that happens to carry a type name keeps its name
        let names_type = match self.oracle.type_of(expr.id).and_then(|t| self.oracle.resolve(t)) {
            None => true,
            Some(HostType::Alias { name: alias, .. }) => alias == name,
            Some(_) => false,
        };
        if names_type {
            int(kind.tag() as i64).at(expr.span)
        } else {
            expr.clone()
        }
    }

    /// The null pointer in the representation of this run
    fn null_literal(&self) -> Expr {
        self.address_lit(0)
    }

    /// Whether `callee` names the pseudo-global `name` and is not shadowed
    fn is_intrinsic(&self, callee: &Expr, name: &str) -> bool {
        callee.as_identifier() == Some(name) && !self.scopes.is_shadowed(name)
    }

    fn report(&mut self, span: Span, message: impl Into<String>, code: DiagnosticCode) -> Reported {
        self.session.report(span, message, code);
        Reported
    }
}
