//! Per-compilation state: the layout cache, the set of runtime imports the
//! rewritten code needs, and the diagnostics reported so far.
//!
//! A session lives for exactly one compilation run. [`CompilationSession::reset`]
//! starts a new run; descriptors never leak from one run into the next.

use super::diagnostics::{Diagnostic, DiagnosticCode};
use super::layout::{AggregateKind, FieldMeta, FieldType, LayoutEngine, StructDescriptor};
use super::memory_model::{AddressingWidth, ByteOrder, ScalarKind};
use super::CompileOptions;
use crate::syntax::Span;
use crate::types::{
    AggregateAnnotation, AggregateKey, DeclId, DeclarationKind, FieldAnnotation, HostType, Member,
    TypeId, TypeOracle,
};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;

const MAX_ANALYSIS_DEPTH: u32 = 64;

/// Runtime bindings the rewritten code refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RuntimeImport {
    /// Read-by-kind table
    CTypeEnumRead,
    /// Write-by-kind table
    CTypeEnumWrite,
    /// Struct proxy over an address
    StructAccess,
    /// Byte copy
    Memcpy,
    /// Byte fill
    Memset,
    /// Overlapping byte copy
    Memmove,
    /// Runtime `sizeof`
    Sizeof,
    /// Metadata registration helper
    DefinedMetaProperty,
    /// Marks a prototype as an aggregate
    SymbolStruct,
    /// Metadata key for alignment
    SymbolStructMaxBaseTypeByteLength,
    /// Metadata key for length
    SymbolStructLength,
    /// Metadata key for the field map
    SymbolStructKeysMeta,
    /// Address behind a struct proxy object
    SymbolStructAddress,
    /// Heap allocator
    Allocator,
    /// Aggregate constructor
    Make,
    /// Aggregate destructor
    Unmake,
    /// Shared pointer constructor
    MakeSharedPtr,
}

impl RuntimeImport {
    /// Bound name
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeImport::CTypeEnumRead => "CTypeEnumRead",
            RuntimeImport::CTypeEnumWrite => "CTypeEnumWrite",
            RuntimeImport::StructAccess => "structAccess",
            RuntimeImport::Memcpy => "memcpy",
            RuntimeImport::Memset => "memset",
            RuntimeImport::Memmove => "memmove",
            RuntimeImport::Sizeof => "sizeof",
            RuntimeImport::DefinedMetaProperty => "definedMetaProperty",
            RuntimeImport::SymbolStruct => "symbolStruct",
            RuntimeImport::SymbolStructMaxBaseTypeByteLength => "symbolStructMaxBaseTypeByteLength",
            RuntimeImport::SymbolStructLength => "symbolStructLength",
            RuntimeImport::SymbolStructKeysMeta => "symbolStructKeysMeta",
            RuntimeImport::SymbolStructAddress => "symbolStructAddress",
            RuntimeImport::Allocator => "Allocator",
            RuntimeImport::Make => "make",
            RuntimeImport::Unmake => "unmake",
            RuntimeImport::MakeSharedPtr => "makeSharedPtr",
        }
    }

    /// Module path below the runtime package
    pub fn module(&self) -> &'static str {
        match self {
            RuntimeImport::CTypeEnumRead => "ctypeEnumRead",
            RuntimeImport::CTypeEnumWrite => "ctypeEnumWrite",
            RuntimeImport::StructAccess => "std/structAccess",
            RuntimeImport::Memcpy | RuntimeImport::Memset | RuntimeImport::Memmove => "std/memory",
            RuntimeImport::Sizeof => "std/sizeof",
            RuntimeImport::DefinedMetaProperty => "function/definedMetaProperty",
            RuntimeImport::SymbolStruct
            | RuntimeImport::SymbolStructMaxBaseTypeByteLength
            | RuntimeImport::SymbolStructLength
            | RuntimeImport::SymbolStructKeysMeta
            | RuntimeImport::SymbolStructAddress => "symbol",
            RuntimeImport::Allocator => "heap",
            RuntimeImport::Make => "std/make",
            RuntimeImport::Unmake => "std/unmake",
            RuntimeImport::MakeSharedPtr => "std/smartPtr/SharedPtr",
        }
    }

    /// Whether the binding is the module's default export
    pub fn is_default(&self) -> bool {
        matches!(
            self,
            RuntimeImport::CTypeEnumRead
                | RuntimeImport::CTypeEnumWrite
                | RuntimeImport::StructAccess
                | RuntimeImport::Sizeof
                | RuntimeImport::DefinedMetaProperty
                | RuntimeImport::Make
                | RuntimeImport::Unmake
        )
    }

    /// Everything the metadata registration block refers to
    pub fn metadata() -> [RuntimeImport; 5] {
        [
            RuntimeImport::DefinedMetaProperty,
            RuntimeImport::SymbolStruct,
            RuntimeImport::SymbolStructMaxBaseTypeByteLength,
            RuntimeImport::SymbolStructLength,
            RuntimeImport::SymbolStructKeysMeta,
        ]
    }
}

/// One import the surrounding module system has to materialize
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ImportSpec {
    /// Bound name
    pub name: String,
    /// Module path
    pub path: String,
    /// Default export rather than a named one
    pub default: bool,
}

/// Aggregate whose fields are being analysed
struct Owner<'a> {
    decl: DeclId,
    name: &'a str,
    module: Option<&'a str>,
}

#[derive(Default)]
struct Draft {
    ty: Option<FieldType>,
    pointer_level: u32,
    array_length: Option<u32>,
    bit_width: Option<u32>,
    self_contained: bool,
}

/// State of one compilation run
pub struct CompilationSession {
    options: CompileOptions,
    engine: LayoutEngine,
    file: String,
    cache: HashMap<AggregateKey, Option<Rc<StructDescriptor>>>,
    in_progress: HashSet<AggregateKey>,
    imports: BTreeSet<RuntimeImport>,
    struct_imports: BTreeMap<String, String>,
    path_rules: Vec<(Regex, String)>,
    diagnostics: Vec<Diagnostic>,
    next_temp: u32,
}

impl CompilationSession {
    /// Start a session for the unit at `file`
    pub fn new(options: CompileOptions, file: impl Into<String>) -> Self {
        let engine = LayoutEngine::new(options.addressing_width, options.byte_order);
        let path_rules = options
            .struct_path_map
            .iter()
            .filter_map(|rule| match glob_regex(&rule.pattern) {
                Some(re) => Some((re, rule.target.clone())),
                None => {
                    tracing::warn!("ignoring struct path pattern `{}`", rule.pattern);
                    None
                }
            })
            .collect();
        Self {
            options,
            engine,
            file: file.into(),
            cache: HashMap::new(),
            in_progress: HashSet::new(),
            imports: BTreeSet::new(),
            struct_imports: BTreeMap::new(),
            path_rules,
            diagnostics: Vec::new(),
            next_temp: 0,
        }
    }

    /// Forget everything from the previous run
    pub fn reset(&mut self, file: impl Into<String>) {
        self.file = file.into();
        self.cache.clear();
        self.in_progress.clear();
        self.imports.clear();
        self.struct_imports.clear();
        self.diagnostics.clear();
        self.next_temp = 0;
    }

    /// Options of this run
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Path of the unit being compiled
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Addressing width of this run
    pub fn width(&self) -> AddressingWidth {
        self.options.addressing_width
    }

    /// Bit-field numbering of this run
    pub fn byte_order(&self) -> ByteOrder {
        self.options.byte_order
    }

    /// Layout engine configured for this run
    pub fn engine(&self) -> LayoutEngine {
        self.engine
    }

    /// Record a recoverable problem
    pub fn report(&mut self, span: Span, message: impl Into<String>, code: DiagnosticCode) {
        let diagnostic = Diagnostic {
            file: self.file.clone(),
            span,
            message: message.into(),
            code,
        };
        tracing::debug!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Diagnostics reported so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Hand over the reported diagnostics
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Note that the output refers to a runtime binding; returns its name
    pub fn import(&mut self, import: RuntimeImport) -> &'static str {
        self.imports.insert(import);
        import.name()
    }

    /// Note that the output refers to an aggregate by name
    pub fn require_struct(&mut self, descriptor: &StructDescriptor) {
        let Some(module) = descriptor.module.as_deref() else {
            return;
        };
        // inline aggregates are named after their enclosing declaration
        if module == self.file || descriptor.name.is_empty() {
            return;
        }
        let path = self
            .path_rules
            .iter()
            .find(|(re, _)| re.is_match(module))
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| module.to_string());
        self.struct_imports.insert(descriptor.name.clone(), path);
    }

    /// Every import collected in this run
    pub fn imports(&self) -> Vec<ImportSpec> {
        let package = self.options.runtime_package.trim_end_matches('/');
        let mut list: Vec<ImportSpec> = self
            .imports
            .iter()
            .map(|i| ImportSpec {
                name: i.name().to_string(),
                path: format!("{}/{}", package, i.module()),
                default: i.is_default(),
            })
            .collect();
        list.extend(self.struct_imports.iter().map(|(name, path)| ImportSpec {
            name: name.clone(),
            path: path.clone(),
            default: false,
        }));
        list
    }

    /// Fresh name for a hoisted temporary
    pub fn fresh_temp(&mut self) -> String {
        let name = format!("__memlower_tmp_{}", self.next_temp);
        self.next_temp += 1;
        name
    }

    /// Layout of an aggregate, built on first use and memoized for the run
    ///
    /// `None` means the key does not denote a memory aggregate.
    pub fn descriptor(
        &mut self,
        oracle: &dyn TypeOracle,
        key: AggregateKey,
    ) -> Option<Rc<StructDescriptor>> {
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        if !self.in_progress.insert(key) {
            tracing::warn!("aggregate {:?} contains itself by value", key);
            return None;
        }
        tracing::debug!("layout cache miss for {:?}", key);
        let built = match key {
            AggregateKey::Declared(decl) => self.build_declared(oracle, decl),
            AggregateKey::Inline(ty) => self.build_detached_inline(oracle, ty),
        };
        self.in_progress.remove(&key);
        let built = built.map(Rc::new);
        self.cache.insert(key, built.clone());
        built
    }

    /// Every aggregate laid out so far, in a stable order
    pub fn descriptors(&self) -> Vec<Rc<StructDescriptor>> {
        let mut list: Vec<_> = self.cache.values().flatten().cloned().collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        list
    }

    fn build_declared(&mut self, oracle: &dyn TypeOracle, decl: DeclId) -> Option<StructDescriptor> {
        let declaration = oracle.declaration(decl)?;
        let DeclarationKind::Class {
            annotation: Some(annotation),
            parent,
            members,
        } = &declaration.kind
        else {
            return None;
        };

        let parent = parent.and_then(|p| self.descriptor(oracle, AggregateKey::Declared(p)));
        let owner = Owner {
            decl,
            name: &declaration.name,
            module: declaration.module.as_deref(),
        };

        let mut fields = Vec::new();
        for member in members {
            if member.annotations.contains(&FieldAnnotation::Ignore) {
                continue;
            }
            let mut path = vec![member.name.clone()];
            let mut draft = Draft::default();
            self.analyze_type(oracle, member.ty, &mut draft, &owner, &mut path, 0);
            apply_annotations(member, &mut draft);
            if draft.self_contained {
                tracing::warn!("`{}` contains itself by value", declaration.name);
                return None;
            }
            match finish(&member.name, draft, self.width()) {
                Some(field) => fields.push(field),
                None => tracing::warn!(
                    "skipping `{}.{}`: type is not part of the memory model",
                    declaration.name,
                    member.name
                ),
            }
        }

        let kind = match annotation {
            AggregateAnnotation::Struct => AggregateKind::Struct,
            AggregateAnnotation::Union => AggregateKind::Union,
        };
        self.engine.describe(
            declaration.name.clone(),
            AggregateKey::Declared(decl),
            kind,
            fields,
            parent,
            None,
            None,
            declaration.module.clone(),
        )
    }

    /// Inline aggregate met outside any declaration, e.g. `pointer<struct<{..}>>`
    fn build_detached_inline(&mut self, oracle: &dyn TypeOracle, ty: TypeId) -> Option<StructDescriptor> {
        let HostType::Alias { name, args, .. } = oracle.resolve(ty)? else {
            return None;
        };
        let union = name == "union";
        let body = *args.first()?;
        tracing::warn!("inline aggregate {} has no enclosing declaration", ty.0);
        let owner = Owner {
            decl: DeclId(u32::MAX),
            name: "",
            module: None,
        };
        self.inline_fields(oracle, ty, body, union, &owner, &mut Vec::new(), 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn inline_fields(
        &mut self,
        oracle: &dyn TypeOracle,
        ty: TypeId,
        body: TypeId,
        union: bool,
        owner: &Owner,
        path: &mut Vec<String>,
        depth: u32,
    ) -> Option<StructDescriptor> {
        let HostType::ObjectLiteral(members) = oracle.resolve(body)? else {
            return None;
        };
        let mut fields = Vec::new();
        for (name, member_ty) in members {
            path.push(name.clone());
            let mut draft = Draft::default();
            self.analyze_type(oracle, *member_ty, &mut draft, owner, path, depth + 1);
            path.pop();
            if draft.self_contained {
                return None;
            }
            if let Some(field) = finish(name, draft, self.width()) {
                fields.push(field);
            }
        }
        let kind = if union {
            AggregateKind::InlineUnion
        } else {
            AggregateKind::InlineStruct
        };
        let enclosing = (owner.decl.0 != u32::MAX).then_some(owner.decl);
        let path = (!path.is_empty()).then(|| path.join("."));
        self.engine.describe(
            owner.name.to_string(),
            AggregateKey::Inline(ty),
            kind,
            fields,
            None,
            enclosing,
            path,
            owner.module.map(str::to_string),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_type(
        &mut self,
        oracle: &dyn TypeOracle,
        ty: TypeId,
        draft: &mut Draft,
        owner: &Owner,
        path: &mut Vec<String>,
        depth: u32,
    ) {
        if depth > MAX_ANALYSIS_DEPTH {
            return;
        }
        let Some(resolved) = oracle.resolve(ty) else {
            return;
        };
        match resolved {
            HostType::Alias { name, args, target } => match name.as_str() {
                "array" => {
                    let length = args.get(1).and_then(|n| number_literal(oracle, *n));
                    match (args.first(), length) {
                        (Some(element), Some(n)) => {
                            draft.array_length = Some(draft.array_length.unwrap_or(1) * n);
                            self.analyze_type(oracle, *element, draft, owner, path, depth + 1);
                        }
                        _ => self.pointer_fallback(draft),
                    }
                }
                "bit" => {
                    let width = args.get(1).and_then(|n| number_literal(oracle, *n));
                    match (args.first(), width) {
                        (Some(base), Some(n)) => {
                            draft.bit_width = Some(n);
                            self.analyze_type(oracle, *base, draft, owner, path, depth + 1);
                        }
                        _ => self.pointer_fallback(draft),
                    }
                }
                "pointer" => {
                    draft.pointer_level += 1;
                    match args.first() {
                        Some(inner) => self.analyze_type(oracle, *inner, draft, owner, path, depth + 1),
                        None => self.pointer_fallback(draft),
                    }
                }
                "anyptr" | "multiPointer" | "nullptr" => {
                    draft.pointer_level += 1;
                    draft.ty = Some(FieldType::Scalar(ScalarKind::Void));
                }
                "struct" | "union" => {
                    let key = AggregateKey::Inline(ty);
                    let built = match self.cache.get(&key) {
                        Some(hit) => hit.clone(),
                        None => {
                            let built = match args.first() {
                                Some(body) => self
                                    .inline_fields(oracle, ty, *body, name == "union", owner, path, depth)
                                    .map(Rc::new),
                                None => None,
                            };
                            self.cache.insert(key, built.clone());
                            built
                        }
                    };
                    match built {
                        Some(d) => draft.ty = Some(FieldType::Aggregate(d)),
                        None => self.pointer_fallback(draft),
                    }
                }
                other => match ScalarKind::from_name(other) {
                    Some(ScalarKind::Null) => {
                        draft.pointer_level += 1;
                        draft.ty = Some(FieldType::Scalar(ScalarKind::Void));
                    }
                    Some(kind) => draft.ty = Some(FieldType::Scalar(kind)),
                    None => match target {
                        Some(t) => self.analyze_type(oracle, *t, draft, owner, path, depth + 1),
                        None => self.pointer_fallback(draft),
                    },
                },
            },
            HostType::Declared(decl) => {
                let Some(declaration) = oracle.declaration(*decl) else {
                    return self.pointer_fallback(draft);
                };
                match &declaration.kind {
                    DeclarationKind::Enum => draft.ty = Some(FieldType::Scalar(ScalarKind::Int32)),
                    DeclarationKind::Class {
                        annotation: Some(_),
                        ..
                    } => {
                        let key = AggregateKey::Declared(*decl);
                        if draft.pointer_level > 0 {
                            draft.ty = Some(FieldType::StructRef {
                                key,
                                name: declaration.name.clone(),
                            });
                        } else if *decl == owner.decl || self.in_progress.contains(&key) {
                            draft.self_contained = true;
                        } else {
                            match self.descriptor(oracle, key) {
                                Some(d) => draft.ty = Some(FieldType::Aggregate(d)),
                                None => self.pointer_fallback(draft),
                            }
                        }
                    }
                    _ => self.pointer_fallback(draft),
                }
            }
            HostType::Branded { tag, level } => match ScalarKind::from_name(tag) {
                Some(kind) => {
                    draft.pointer_level += level;
                    draft.ty = Some(FieldType::Scalar(kind));
                }
                None => self.pointer_fallback(draft),
            },
            HostType::Union(members) => match members.first() {
                Some(first) if draft.pointer_level == 0 => {
                    self.analyze_type(oracle, *first, draft, owner, path, depth + 1)
                }
                _ => self.pointer_fallback(draft),
            },
            _ => self.pointer_fallback(draft),
        }
    }

    fn pointer_fallback(&self, draft: &mut Draft) {
        if draft.pointer_level > 0 {
            draft.ty = Some(FieldType::Scalar(ScalarKind::Void));
        }
    }
}

fn number_literal(oracle: &dyn TypeOracle, ty: TypeId) -> Option<u32> {
    match oracle.resolve(ty)? {
        HostType::NumberLiteral(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u32),
        _ => None,
    }
}

fn apply_annotations(member: &Member, draft: &mut Draft) {
    for annotation in &member.annotations {
        match annotation {
            FieldAnnotation::Type(name) => match ScalarKind::from_name(name) {
                Some(kind) => draft.ty = Some(FieldType::Scalar(kind)),
                None => tracing::warn!("unknown @type({}) on `{}`", name, member.name),
            },
            FieldAnnotation::Pointer(level) => {
                draft.pointer_level = (*level).max(1);
                if draft.ty.is_none() {
                    draft.ty = Some(FieldType::Scalar(ScalarKind::Void));
                }
            }
            FieldAnnotation::Array(n) => draft.array_length = Some(*n),
            FieldAnnotation::Bit(n) => draft.bit_width = Some(*n),
            FieldAnnotation::Ignore => {}
        }
    }
}

fn finish(name: &str, draft: Draft, width: AddressingWidth) -> Option<FieldMeta> {
    let ty = draft.ty?;
    let mut field = FieldMeta::new(name, ty).pointer(draft.pointer_level);
    if let Some(n) = draft.array_length {
        field = field.array(n);
    }
    if let Some(bits) = draft.bit_width {
        let valid = match field.ty.scalar() {
            Some(kind) => !field.is_pointer() && kind.is_integer() && bits <= kind.bits(width),
            None => false,
        };
        if valid {
            field = field.bits(bits);
        } else {
            tracing::warn!("`{}` cannot be a bit-field; laid out as a plain member", name);
        }
    }
    Some(field)
}

/// Translate a `*` / `**` / `?` glob into an anchored regex
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}
