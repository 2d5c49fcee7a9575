//! Calls: pseudo-global intrinsics, runtime helpers and inline assembly.

use super::place::Slot;
use super::{LoweringContext, Lowered, Lowerer};
use crate::compiler::asm::{encode, line_range, AsmOutcome, FAILURE_STUB};
use crate::compiler::conditional::{defined_flag, ConditionalFolder};
use crate::compiler::diagnostics::DiagnosticCode;
use crate::compiler::memory_model::ScalarKind;
use crate::compiler::session::RuntimeImport;
use crate::syntax::builder::*;
use crate::syntax::printer::format_number;
use crate::syntax::{Expr, ExprKind, Span};
use crate::types::{Classifier, TypeCategory, TypeId};

/// Allocator entry points and the runtime method each one maps to
const ALLOCATOR_METHODS: [(&str, &str); 5] = [
    ("malloc", "malloc"),
    ("calloc", "calloc"),
    ("realloc", "realloc"),
    ("aligned_alloc", "alignedAlloc"),
    ("free", "free"),
];

impl<'a> Lowerer<'a> {
    pub(super) fn lower_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        type_args: &[TypeId],
        args: &[Expr],
        cx: LoweringContext,
    ) -> Expr {
        let name = callee
            .as_identifier()
            .filter(|name| !self.scopes.is_shadowed(name))
            .map(str::to_string);
        let lowered = match name.as_deref() {
            Some("static_cast") => self.lower_static_cast(expr, type_args, args),
            Some("reinterpret_cast") => match args.first() {
                Some(arg) => Ok(self.lower_expr(arg, cx)),
                None => Err(self.report(
                    expr.span,
                    "reinterpret_cast needs a value",
                    DiagnosticCode::InvalidTypeArgument,
                )),
            },
            Some("sizeof") => Ok(self.lower_sizeof(expr, type_args, args)),
            Some("offsetof") => self.lower_offsetof(expr, type_args, args),
            Some("addressof") | Some("move") => self.lower_addressof(expr, args),
            Some("defined") => self.lower_defined(expr),
            Some("make") => self.lower_make(expr, type_args, args),
            Some("make_shared_ptr") => self.lower_make_shared(expr, type_args, args),
            Some("unmake") => Ok(self.runtime_call(RuntimeImport::Unmake, expr, callee, type_args, args)),
            Some(allocator) if ALLOCATOR_METHODS.iter().any(|(f, _)| *f == allocator) => {
                Ok(self.lower_allocator(allocator, args))
            }
            Some("memcpy") => Ok(self.runtime_call(RuntimeImport::Memcpy, expr, callee, type_args, args)),
            Some("memset") => Ok(self.runtime_call(RuntimeImport::Memset, expr, callee, type_args, args)),
            Some("memmove") => Ok(self.runtime_call(RuntimeImport::Memmove, expr, callee, type_args, args)),
            _ => match self.lower_atomic(expr, callee, args) {
                Some(atomic) => Ok(atomic),
                None => Ok(self.plain_call(expr, callee, type_args, args)),
            },
        };
        match lowered {
            Ok(e) => e.at(expr.span),
            Err(_) => expr.clone(),
        }
    }

    /// A call to a runtime helper of the same name
    fn runtime_call(
        &mut self,
        import: RuntimeImport,
        expr: &Expr,
        callee: &Expr,
        type_args: &[TypeId],
        args: &[Expr],
    ) -> Expr {
        self.session.import(import);
        self.plain_call(expr, callee, type_args, args)
    }

    /// A call lowered component-wise
    fn plain_call(&mut self, expr: &Expr, callee: &Expr, type_args: &[TypeId], args: &[Expr]) -> Expr {
        let value = LoweringContext::value();
        Expr::new(
            expr.id,
            expr.span,
            ExprKind::Call {
                callee: Box::new(self.lower_expr(callee, value)),
                type_args: type_args.to_vec(),
                args: args.iter().map(|a| self.lower_expr(a, value)).collect(),
            },
        )
    }

    /// Category of a type given either as a type argument or as a value naming it
    fn type_operand(&self, type_args: &[TypeId], args: &[Expr]) -> TypeCategory {
        if let Some(&ty) = type_args.first() {
            return Classifier::new(self.oracle).classify(ty);
        }
        let Some(arg) = args.first() else {
            return TypeCategory::Unknown;
        };
        match self.category(arg) {
            TypeCategory::Unknown => match arg.as_identifier().and_then(ScalarKind::from_name) {
                Some(ScalarKind::Size) => TypeCategory::Size,
                Some(kind) => TypeCategory::Scalar(kind),
                None => TypeCategory::Unknown,
            },
            category => category,
        }
    }

    fn size_of(&mut self, category: TypeCategory) -> Option<u32> {
        let width = self.session.width();
        match category {
            TypeCategory::Struct(key) => self.session.descriptor(self.oracle, key).map(|d| d.total_length),
            TypeCategory::Scalar(kind) => Some(kind.byte_length(width)),
            TypeCategory::Pointer(_) | TypeCategory::Size => Some(width.pointer_bytes()),
            TypeCategory::Array { element, length } => {
                let element = Classifier::new(self.oracle).classify(element);
                self.size_of(element).map(|size| size * length)
            }
            TypeCategory::SharedPointer(_) | TypeCategory::Unknown => None,
        }
    }

    fn lower_sizeof(&mut self, expr: &Expr, type_args: &[TypeId], args: &[Expr]) -> Expr {
        let category = self.type_operand(type_args, args);
        match self.size_of(category) {
            Some(size) => self.address_lit(size),
            None => {
                let sizeof = self.session.import(RuntimeImport::Sizeof);
                let args = args
                    .iter()
                    .map(|a| self.lower_expr(a, LoweringContext::value()))
                    .collect();
                Expr::new(
                    expr.id,
                    expr.span,
                    ExprKind::Call {
                        callee: Box::new(ident(sizeof)),
                        type_args: type_args.to_vec(),
                        args,
                    },
                )
            }
        }
    }

    /// `offsetof(T, "a.b")`: byte offset of a possibly nested field
    fn lower_offsetof(&mut self, expr: &Expr, type_args: &[TypeId], args: &[Expr]) -> Lowered<Expr> {
        let descriptor = match self.type_operand(type_args, args) {
            TypeCategory::Struct(key) => self.session.descriptor(self.oracle, key),
            _ => None,
        };
        let Some(mut descriptor) = descriptor else {
            return Err(self.report(
                expr.span,
                "offsetof needs an aggregate type",
                DiagnosticCode::InvalidTypeArgument,
            ));
        };
        let path = match args.last().map(|a| &a.unparen().kind) {
            Some(ExprKind::String(path)) | Some(ExprKind::Identifier(path)) => path.clone(),
            _ => {
                return Err(self.report(
                    expr.span,
                    "offsetof needs a field name",
                    DiagnosticCode::InvalidTypeArgument,
                ))
            }
        };
        let mut offset = 0;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(field) = descriptor.field(segment) else {
                return Err(self.report(
                    expr.span,
                    format!("`{}` has no field `{}`", descriptor.name, segment),
                    DiagnosticCode::UnknownField,
                ));
            };
            offset += field.byte_offset;
            if segments.peek().is_none() {
                break;
            }
            let next = match Slot::of_field(field) {
                Slot::Aggregate(inner) => inner,
                _ => {
                    return Err(self.report(
                        expr.span,
                        format!("`{}` is not an aggregate field", segment),
                        DiagnosticCode::UnknownField,
                    ))
                }
            };
            descriptor = next;
        }
        Ok(self.address_lit(offset))
    }

    fn lower_addressof(&mut self, expr: &Expr, args: &[Expr]) -> Lowered<Expr> {
        let Some(arg) = args.first() else {
            return Err(self.report(
                expr.span,
                "addressof needs a value",
                DiagnosticCode::InvalidTypeArgument,
            ));
        };
        if let ExprKind::Call { callee, args: inner, .. } = &arg.unparen().kind {
            if self.is_intrinsic(callee, "accessof") && inner.len() == 1 {
                return Ok(self.lower_expr(&inner[0], LoweringContext::value()));
            }
        }
        if let Some(place) = self.place_of(arg)? {
            if let Slot::BitField { .. } = place.slot {
                return Err(self.report(
                    arg.span,
                    format!("bit-field `{}` has no address", arg),
                    DiagnosticCode::BitFieldAddress,
                ));
            }
            return Ok(place.addr);
        }
        if let TypeCategory::Struct(_) = self.category(arg) {
            let symbol = self.session.import(RuntimeImport::SymbolStructAddress);
            let object = self.lower_expr(arg, LoweringContext::value());
            return Ok(index(object, ident(symbol)));
        }
        tracing::warn!("`{}` has no memory address; call kept", arg);
        Ok(call(
            ident("addressof"),
            vec![self.lower_expr(arg, LoweringContext::value())],
        ))
    }

    /// `defined(X)` used as a value
    fn lower_defined(&mut self, expr: &Expr) -> Lowered<Expr> {
        let Some(name) = defined_flag(expr) else {
            return Err(self.report(
                expr.span,
                "defined needs a flag name",
                DiagnosticCode::UnknownFlag,
            ));
        };
        let value = {
            let flags = &self.session.options().flags;
            ConditionalFolder::new(flags, self.session.file()).lookup(name, expr.span.line)
        };
        match value {
            Some(value) => Ok(value.to_expr()),
            None => Err(self.report(
                expr.span,
                format!("flag `{}` is not defined", name),
                DiagnosticCode::UnknownFlag,
            )),
        }
    }

    fn lower_make(&mut self, expr: &Expr, type_args: &[TypeId], args: &[Expr]) -> Lowered<Expr> {
        let descriptor = match type_args.first().map(|&ty| Classifier::new(self.oracle).classify(ty)) {
            Some(TypeCategory::Struct(key)) => self.session.descriptor(self.oracle, key),
            _ => None,
        };
        let Some(descriptor) = descriptor.filter(|d| !d.name.is_empty()) else {
            return Err(self.report(
                expr.span,
                "make needs a named aggregate type argument",
                DiagnosticCode::InvalidTypeArgument,
            ));
        };
        let make = self.session.import(RuntimeImport::Make);
        self.session.require_struct(&descriptor);
        let mut lowered: Vec<Expr> = args
            .iter()
            .map(|a| self.lower_expr(a, LoweringContext::value()))
            .collect();
        lowered.push(ident(descriptor.name.clone()));
        Ok(call_named(make, lowered))
    }

    fn lower_make_shared(&mut self, expr: &Expr, type_args: &[TypeId], args: &[Expr]) -> Lowered<Expr> {
        let category = type_args
            .first()
            .map(|&ty| Classifier::new(self.oracle).classify(ty))
            .unwrap_or(TypeCategory::Unknown);
        let target = match category {
            TypeCategory::Struct(key) => match self.session.descriptor(self.oracle, key) {
                Some(d) if !d.name.is_empty() => {
                    self.session.require_struct(&d);
                    Some(ident(d.name.clone()))
                }
                _ => None,
            },
            other => other.value_kind().map(|kind| int(kind.tag() as i64)),
        };
        let Some(target) = target else {
            return Err(self.report(
                expr.span,
                "make_shared_ptr needs a scalar or named aggregate type argument",
                DiagnosticCode::InvalidTypeArgument,
            ));
        };
        let make = self.session.import(RuntimeImport::MakeSharedPtr);
        let mut lowered: Vec<Expr> = args
            .iter()
            .map(|a| self.lower_expr(a, LoweringContext::value()))
            .collect();
        lowered.push(target);
        Ok(call_named(make, lowered))
    }

    fn lower_allocator(&mut self, function: &str, args: &[Expr]) -> Expr {
        let method_name = ALLOCATOR_METHODS
            .iter()
            .find(|(f, _)| *f == function)
            .map(|(_, m)| *m)
            .unwrap_or(function);
        let allocator = self.session.import(RuntimeImport::Allocator);
        let args = args
            .iter()
            .map(|a| self.lower_expr(a, LoweringContext::value()))
            .collect();
        method(ident(allocator), method_name, args)
    }

    /// Assemble an `asm` template into an embedded module string
    pub(super) fn lower_asm(&mut self, expr: &Expr, quasis: &[String], substitutions: &[Expr]) -> Expr {
        let mut text = String::new();
        for (i, quasi) in quasis.iter().enumerate() {
            text.push_str(quasi);
            let Some(substitution) = substitutions.get(i) else {
                continue;
            };
            let lowered = self.lower_expr(substitution, LoweringContext::value());
            match &lowered.kind {
                ExprKind::String(s) => text.push_str(s),
                ExprKind::Number(n) => text.push_str(&format_number(*n)),
                _ => {
                    self.session.report(
                        substitution.span,
                        format!("`{}` is not a literal and cannot be spliced into asm", substitution),
                        DiagnosticCode::AsmSubstitution,
                    );
                    return string(FAILURE_STUB).at(expr.span);
                }
            }
        }

        // template text starts after the tag and its opening backtick
        let template_start = expr.span.start + "asm".len() as u32 + 1;
        match self.asm.compile(&text) {
            Ok(AsmOutcome::Assembled(bytes)) => string(encode(&bytes)).at(expr.span),
            Ok(AsmOutcome::Rejected(errors)) => {
                for error in errors {
                    let (start, end) = line_range(&text, error.line);
                    let span = Span::new(
                        template_start + start,
                        template_start + end,
                        expr.span.line + error.line,
                    );
                    self.session.report(span, error.message, DiagnosticCode::AssemblerError);
                }
                string(FAILURE_STUB).at(expr.span)
            }
            Err(e) => {
                self.session.report(expr.span, e.to_string(), DiagnosticCode::AssemblerLaunch);
                string(FAILURE_STUB).at(expr.span)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{lower, lower_with, prop, wide};
    use super::*;
    use crate::compiler::CompileOptions;
    use crate::types::TypeTable;

    fn generic(name: &str, type_args: Vec<TypeId>, args: Vec<Expr>) -> Expr {
        Expr::detached(ExprKind::Call {
            callee: Box::new(ident(name)),
            type_args,
            args,
        })
    }

    fn sample(t: &mut TypeTable) -> TypeId {
        let u8t = t.scalar("uint8");
        let u32t = t.scalar("uint32");
        let b = t.bit(u8t, 3);
        let inline = t.inline_struct(vec![("x", u8t), ("y", u32t)]);
        let (_, ty) = t.declare_struct("S", vec![("flag", b), ("n", u32t), ("pos", inline)]);
        ty
    }

    #[test]
    fn test_sizeof() {
        let mut t = TypeTable::new();
        let s = sample(&mut t);
        let u16t = t.scalar("uint16");
        let arr = t.array(u16t, 5);
        let ptr = t.pointer(u16t);
        assert_eq!(lower(&t, &generic("sizeof", vec![s], vec![])).0, "16");
        assert_eq!(lower(&t, &generic("sizeof", vec![arr], vec![])).0, "10");
        assert_eq!(lower(&t, &generic("sizeof", vec![ptr], vec![])).0, "4");
        assert_eq!(lower(&t, &call_named("sizeof", vec![ident("uint16")])).0, "2");
        assert_eq!(lower_with(&t, wide(), &generic("sizeof", vec![ptr], vec![])).0, "8n");

        let (text, _, session) = lower_with(&t, CompileOptions::default(), &call_named("sizeof", vec![ident("x")]));
        assert_eq!(text, "sizeof(x)");
        assert!(session.imports().iter().any(|i| i.name == "sizeof"));
    }

    #[test]
    fn test_offsetof() {
        let mut t = TypeTable::new();
        let s = sample(&mut t);
        let of = |path: &str| generic("offsetof", vec![s], vec![string(path)]);
        assert_eq!(lower(&t, &of("n")).0, "4");
        assert_eq!(lower(&t, &of("pos.y")).0, "12");
        let (_, diagnostics) = lower(&t, &of("nope"));
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnknownField);
    }

    #[test]
    fn test_addressof() {
        let mut t = TypeTable::new();
        let s = sample(&mut t);
        let ptr = t.pointer(s);
        let p = t.ident("p", ptr);
        let v = t.ident("v", s);
        let pn = prop(&mut t, p.clone(), "n", None);
        let flag = prop(&mut t, p.clone(), "flag", None);
        assert_eq!(lower(&t, &call_named("addressof", vec![pn])).0, "p + 4");
        assert_eq!(
            lower(&t, &call_named("addressof", vec![call_named("accessof", vec![p])])).0,
            "p"
        );
        assert_eq!(lower(&t, &call_named("move", vec![v])).0, "v[symbolStructAddress]");
        let (_, diagnostics) = lower(&t, &call_named("addressof", vec![flag]));
        assert_eq!(diagnostics[0].code, DiagnosticCode::BitFieldAddress);
    }

    #[test]
    fn test_defined_as_value() {
        let t = TypeTable::new();
        let mut options = CompileOptions::default();
        options
            .flags
            .insert("LEVEL".into(), crate::compiler::FlagValue::Number(3.0));
        let (text, diagnostics, _) = lower_with(&t, options, &call_named("defined", vec![ident("LEVEL")]));
        assert_eq!(text, "3");
        assert!(diagnostics.is_empty());

        let (text, diagnostics) = lower(&t, &call_named("defined", vec![ident("MISSING")]));
        assert_eq!(text, "defined(MISSING)");
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnknownFlag);
    }

    #[test]
    fn test_make_and_shared_ptr() {
        let mut t = TypeTable::new();
        let s = sample(&mut t);
        let u16t = t.scalar("uint16");
        let (text, _, session) = lower_with(&t, CompileOptions::default(), &generic("make", vec![s], vec![]));
        assert_eq!(text, "make(S)");
        assert!(session.imports().iter().any(|i| i.name == "make"));
        let init = object(vec![("n".into(), int(1))]);
        assert_eq!(lower(&t, &generic("make", vec![s], vec![init])).0, "make({ n: 1 }, S)");
        let (_, diagnostics) = lower(&t, &generic("make", vec![u16t], vec![]));
        assert_eq!(diagnostics[0].code, DiagnosticCode::InvalidTypeArgument);
        let (_, diagnostics) = lower(&t, &generic("make", vec![], vec![]));
        assert_eq!(diagnostics[0].code, DiagnosticCode::InvalidTypeArgument);

        assert_eq!(lower(&t, &generic("make_shared_ptr", vec![s], vec![])).0, "makeSharedPtr(S)");
        assert_eq!(
            lower(&t, &generic("make_shared_ptr", vec![u16t], vec![int(3)])).0,
            "makeSharedPtr(3, 6)"
        );
    }

    #[test]
    fn test_allocator_and_memory_helpers() {
        let t = TypeTable::new();
        let (text, _, session) = lower_with(
            &t,
            CompileOptions::default(),
            &call_named("aligned_alloc", vec![int(8), int(64)]),
        );
        assert_eq!(text, "Allocator.alignedAlloc(8, 64)");
        assert!(session.imports().iter().any(|i| i.name == "Allocator"));

        let (text, _, session) = lower_with(
            &t,
            CompileOptions::default(),
            &call_named("memset", vec![ident("p"), int(0), int(4)]),
        );
        assert_eq!(text, "memset(p, 0, 4)");
        assert!(session.imports().iter().any(|i| i.name == "memset"));
    }

    #[test]
    fn test_reinterpret_cast_is_identity() {
        let mut t = TypeTable::new();
        let u8t = t.scalar("uint8");
        let e = generic("reinterpret_cast", vec![u8t], vec![ident("x")]);
        assert_eq!(lower(&t, &e).0, "x");
    }

    fn asm(quasis: Vec<&str>, substitutions: Vec<Expr>) -> Expr {
        Expr::new(
            crate::syntax::NodeId::DETACHED,
            Span::new(10, 40, 3),
            ExprKind::TaggedTemplate {
                tag: Box::new(ident("asm")),
                quasis: quasis.into_iter().map(String::from).collect(),
                substitutions,
            },
        )
    }

    fn asm_options(assembler: std::path::PathBuf, dir: &str) -> CompileOptions {
        CompileOptions {
            assembler,
            temp_dir: Some(std::env::temp_dir().join(format!("{}-{}", dir, std::process::id()))),
            ..CompileOptions::default()
        }
    }

    #[test]
    fn test_asm_rejects_non_literal_substitution() {
        let t = TypeTable::new();
        let options = asm_options("/nonexistent/wat2wasm".into(), "memlower-lower-asm-sub");
        let e = asm(vec!["(func ", ")"], vec![ident("x")]);
        let (text, diagnostics, _) = lower_with(&t, options, &e);
        assert_eq!(text, "\"compile asm error\"");
        assert_eq!(diagnostics[0].code, DiagnosticCode::AsmSubstitution);
    }

    #[test]
    fn test_asm_launch_failure() {
        let t = TypeTable::new();
        let options = asm_options("/nonexistent/wat2wasm".into(), "memlower-lower-asm-launch");
        let e = asm(vec!["(func)"], vec![]);
        let (text, diagnostics, _) = lower_with(&t, options, &e);
        assert_eq!(text, "\"compile asm error\"");
        assert_eq!(diagnostics[0].code, DiagnosticCode::AssemblerLaunch);
    }

    #[cfg(unix)]
    fn script(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("fake-wat2wasm.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_asm_success_and_error_mapping() {
        let t = TypeTable::new();
        let dir = std::env::temp_dir().join(format!("memlower-lower-asm-{}", std::process::id()));

        let ok = script(&dir.join("ok"), "for last; do :; done\nprintf 'wasm' > \"$last\"");
        let mut options = asm_options(ok, "memlower-lower-asm-ok");
        options.temp_dir = Some(dir.join("ok"));
        let e = asm(vec!["(func ", ")"], vec![string("$f")]);
        let (text, diagnostics, _) = lower_with(&t, options, &e);
        assert_eq!(text, "\"d2FzbQ==\"");
        assert!(diagnostics.is_empty());

        let bad = script(&dir.join("bad"), "echo \"$1:4:3: error: unexpected token\" >&2\nexit 1");
        let mut options = asm_options(bad, "memlower-lower-asm-bad");
        options.temp_dir = Some(dir.join("bad"));
        let e = asm(vec!["\n  bad"], vec![]);
        let (text, diagnostics, _) = lower_with(&t, options, &e);
        assert_eq!(text, "\"compile asm error\"");
        assert_eq!(diagnostics[0].code, DiagnosticCode::AssemblerError);
        assert_eq!(diagnostics[0].message, "unexpected token");
        assert_eq!(diagnostics[0].span, Span::new(17, 20, 4));
        let _ = std::fs::remove_dir_all(dir);
    }
}
