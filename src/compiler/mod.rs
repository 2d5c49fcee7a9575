//! # memlower Compiler - typed memory operations to linear memory
//!
//! This module rewrites a typed host program so that pointers, aggregates,
//! bit-fields and atomics become explicit address arithmetic over one
//! shared linear memory.
//!
//! ## Architecture
//!
//! ```text
//! Program + TypeOracle → Classify → Layout (cached) → Lower → Program + imports
//!                                       │
//!                                       └→ Metadata (attached to aggregate declarations)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use memlower::compiler::{CompilationUnit, CompileOptions, Compiler};
//!
//! let unit = CompilationUnit::load("unit.json")?;
//! let mut compiler = Compiler::new(CompileOptions::default());
//! let output = compiler.compile_unit(&unit)?;
//! std::fs::write("out.js", output.render())?;
//! ```

pub mod asm;
pub mod conditional;
pub mod diagnostics;
pub mod fold;
pub mod layout;
pub mod lower;
pub mod memory_model;
pub mod metadata;
pub mod scope;
pub mod session;

pub use conditional::FlagValue;
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticClass, DiagnosticCode, DiagnosticSink, StderrSink,
};
pub use layout::{FieldMeta, LayoutEngine, StructDescriptor};
pub use lower::Lowerer;
pub use memory_model::{AddressingWidth, ByteOrder, ScalarKind};
pub use metadata::StructMetadata;
pub use session::{CompilationSession, ImportSpec, RuntimeImport};

use crate::syntax::Program;
use crate::types::{AggregateKey, DeclId, TypeOracle, TypeTable};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Module system the rendered imports are written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// `import x from "..."`
    #[default]
    Esm,
    /// `const x = require("...")`
    Commonjs,
}

/// Maps the declaring module of a struct to the path it is imported from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructPathRule {
    /// Glob over the declaring module path (`*`, `**`, `?`)
    pub pattern: String,
    /// Import path used when the pattern matches
    pub target: String,
}

/// Compilation options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Compile-time flags visible to `defined(..)`
    pub flags: BTreeMap<String, FlagValue>,
    /// Pointer width of the target
    pub addressing_width: AddressingWidth,
    /// Byte order used to place bit-fields inside their storage unit
    pub byte_order: ByteOrder,
    /// Module system of the rendered imports
    pub module_format: ModuleFormat,
    /// Import paths for aggregates declared in other modules
    pub struct_path_map: Vec<StructPathRule>,
    /// Package every runtime import is resolved under
    pub runtime_package: String,
    /// Scratch directory for the assembler; the system one when absent
    pub temp_dir: Option<PathBuf>,
    /// Assembler executable
    pub assembler: PathBuf,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            flags: BTreeMap::new(),
            addressing_width: AddressingWidth::Bits32,
            byte_order: ByteOrder::Little,
            module_format: ModuleFormat::Esm,
            struct_path_map: Vec::new(),
            runtime_package: "cheap".to_string(),
            temp_dir: None,
            assembler: PathBuf::from("wat2wasm"),
        }
    }
}

impl CompileOptions {
    /// Read options from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Apply a `NAME=VALUE` flag definition; a bare `NAME` defines it as `true`
    pub fn define(&mut self, definition: &str) -> Result<()> {
        let (name, value) = match definition.split_once('=') {
            Some((name, value)) => (name.trim(), FlagValue::parse(value.trim())),
            None => (definition.trim(), FlagValue::Bool(true)),
        };
        if name.is_empty() {
            return Err(Error::config(format!("flag definition `{}` has no name", definition)));
        }
        self.flags.insert(name.to_string(), value);
        Ok(())
    }
}

/// One program together with everything the host knows about its types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Path of the unit, as used for `__FILE__` and cross-module imports
    pub path: String,
    /// Syntax tree
    pub program: Program,
    /// Type information
    #[serde(default)]
    pub types: TypeTable,
}

impl CompilationUnit {
    /// Parse a unit from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let unit: CompilationUnit = serde_json::from_str(text)?;
        unit.types.validate()?;
        Ok(unit)
    }

    /// Read a unit from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }
}

/// Compilation result
#[derive(Debug, Clone, Serialize)]
pub struct CompileOutput {
    /// Rewritten program
    pub program: Program,
    /// Bindings the rewritten program refers to
    pub imports: Vec<ImportSpec>,
    /// Module system the imports are rendered for
    pub module_format: ModuleFormat,
    /// Everything reported while lowering
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    /// Import declarations followed by the program text
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut named: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for import in &self.imports {
            if import.default {
                let _ = match self.module_format {
                    ModuleFormat::Esm => writeln!(out, "import {} from \"{}\";", import.name, import.path),
                    ModuleFormat::Commonjs => writeln!(
                        out,
                        "const {} = require(\"{}\").default;",
                        import.name, import.path
                    ),
                };
            } else {
                named.entry(&import.path).or_default().push(&import.name);
            }
        }
        for (path, names) in named {
            let _ = match self.module_format {
                ModuleFormat::Esm => writeln!(out, "import {{ {} }} from \"{}\";", names.join(", "), path),
                ModuleFormat::Commonjs => {
                    writeln!(out, "const {{ {} }} = require(\"{}\");", names.join(", "), path)
                }
            };
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.program.to_string());
        out
    }

    /// Whether nothing was reported
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Layout of one declared aggregate, as printed by `memlower layout`
#[derive(Debug, Clone, Serialize)]
pub struct LayoutReport {
    /// Aggregate name
    pub name: String,
    /// Declaring module, if known
    pub module: Option<String>,
    /// Field offsets, sizes and flags
    pub metadata: StructMetadata,
}

/// memlower compiler driver
pub struct Compiler {
    options: CompileOptions,
    sink: Box<dyn DiagnosticSink>,
}

impl Compiler {
    /// Create a compiler that writes diagnostics to stderr
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            sink: Box::new(StderrSink),
        }
    }

    /// Replace the diagnostic sink
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Lower one program against a type oracle
    ///
    /// Problems in the program never fail the call; they are sent to the sink
    /// and returned with the output.
    pub fn compile(&mut self, program: &Program, oracle: &dyn TypeOracle, path: &str) -> CompileOutput {
        let mut session = CompilationSession::new(self.options.clone(), path);
        let program = Lowerer::new(&mut session, oracle).lower_program(program);
        let diagnostics = session.take_diagnostics();
        for diagnostic in &diagnostics {
            tracing::debug!("{}", diagnostic);
            self.sink.report(diagnostic);
        }
        tracing::debug!(
            "lowered {} with {} import(s), {} diagnostic(s)",
            path,
            session.imports().len(),
            diagnostics.len()
        );
        CompileOutput {
            program,
            imports: session.imports(),
            module_format: self.options.module_format,
            diagnostics,
        }
    }

    /// Lower a compilation unit
    pub fn compile_unit(&mut self, unit: &CompilationUnit) -> Result<CompileOutput> {
        unit.types.validate()?;
        Ok(self.compile(&unit.program, &unit.types, &unit.path))
    }

    /// Layouts of every aggregate a unit declares
    pub fn layouts(&self, unit: &CompilationUnit) -> Vec<LayoutReport> {
        let mut session = CompilationSession::new(self.options.clone(), unit.path.as_str());
        (0..unit.types.declarations.len() as u32)
            .filter_map(|i| session.descriptor(&unit.types, AggregateKey::Declared(DeclId(i))))
            .map(|descriptor| LayoutReport {
                name: descriptor.name.clone(),
                module: descriptor.module.clone(),
                metadata: StructMetadata::from_descriptor(&descriptor),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::builder::*;
    use crate::syntax::{ExprKind, Statement};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SharedSink(Rc<RefCell<Vec<Diagnostic>>>);

    impl DiagnosticSink for SharedSink {
        fn report(&mut self, diagnostic: &Diagnostic) {
            self.0.borrow_mut().push(diagnostic.clone());
        }
    }

    fn field_read_unit() -> CompilationUnit {
        let mut types = TypeTable::new();
        let i8t = types.scalar("int8");
        let u16t = types.scalar("uint16");
        let (decl, s) = types.declare_struct("A", vec![("a", i8t), ("b", u16t)]);
        let ptr = types.pointer(s);
        let p = types.ident("p", ptr);
        let read = types.node(
            ExprKind::Property {
                object: Box::new(p),
                name: "b".into(),
            },
            Some(u16t),
        );
        let program = Program {
            statements: vec![
                Statement::Class {
                    decl,
                    name: "A".into(),
                    decorators: vec!["struct".into()],
                    extends: None,
                    members: Vec::new(),
                    metadata: None,
                },
                Statement::Expression(call_named("f", vec![read])),
            ],
        };
        CompilationUnit {
            path: "src/a.ts".into(),
            program,
            types,
        }
    }

    #[test]
    fn test_options_from_json() {
        let options: CompileOptions = serde_json::from_str(
            r#"{"addressing_width": "64", "flags": {"DEBUG": true, "LEVEL": 2}, "module_format": "commonjs"}"#,
        )
        .unwrap();
        assert_eq!(options.addressing_width, AddressingWidth::Bits64);
        assert_eq!(options.flags["DEBUG"], FlagValue::Bool(true));
        assert_eq!(options.flags["LEVEL"], FlagValue::Number(2.0));
        assert_eq!(options.module_format, ModuleFormat::Commonjs);
        assert_eq!(options.runtime_package, "cheap");
    }

    #[test]
    fn test_define_flags() {
        let mut options = CompileOptions::default();
        options.define("A=3").unwrap();
        options.define("B").unwrap();
        options.define("C=name").unwrap();
        assert_eq!(options.flags["A"], FlagValue::Number(3.0));
        assert_eq!(options.flags["B"], FlagValue::Bool(true));
        assert_eq!(options.flags["C"], FlagValue::String("name".into()));
        assert!(options.define("=1").is_err());
    }

    #[test]
    fn test_compile_unit_renders_imports_first() {
        let unit = field_read_unit();
        let mut compiler = Compiler::new(CompileOptions::default());
        let output = compiler.compile_unit(&unit).unwrap();
        assert!(output.is_clean());
        let text = output.render();
        assert!(text.starts_with("import CTypeEnumRead from \"cheap/ctypeEnumRead\";\n"));
        assert!(text.contains("f(CTypeEnumRead[6](p + 2));"));
        assert!(text.contains("definedMetaProperty"));
    }

    #[test]
    fn test_commonjs_imports() {
        let unit = field_read_unit();
        let options = CompileOptions {
            module_format: ModuleFormat::Commonjs,
            ..CompileOptions::default()
        };
        let output = Compiler::new(options).compile_unit(&unit).unwrap();
        let text = output.render();
        assert!(text.contains("const CTypeEnumRead = require(\"cheap/ctypeEnumRead\").default;"));
        assert!(text.contains("} = require(\"cheap/symbol\");"));
    }

    #[test]
    fn test_diagnostics_reach_the_sink() {
        let mut types = TypeTable::new();
        let u32t = types.scalar("uint32");
        let ptr = types.pointer(u32t);
        let p = types.ident("p", ptr);
        let program = Program {
            statements: vec![Statement::Expression(unary(crate::syntax::UnaryOp::Neg, p))],
        };
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut compiler =
            Compiler::new(CompileOptions::default()).with_sink(Box::new(SharedSink(seen.clone())));
        let output = compiler.compile(&program, &types, "src/b.ts");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].file, "src/b.ts");
        assert_eq!(seen.borrow()[0].code, DiagnosticCode::PointerUnary);
    }

    #[test]
    fn test_layouts() {
        let unit = field_read_unit();
        let layouts = Compiler::new(CompileOptions::default()).layouts(&unit);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].name, "A");
        assert_eq!(layouts[0].metadata.length, 4);
        assert_eq!(layouts[0].metadata.max_alignment, 2);
    }

    #[test]
    fn test_unit_json_round_trip() {
        let unit = field_read_unit();
        let text = serde_json::to_string(&unit).unwrap();
        let back = CompilationUnit::from_json(&text).unwrap();
        assert_eq!(back.path, "src/a.ts");
        assert_eq!(back.program, unit.program);
    }
}
