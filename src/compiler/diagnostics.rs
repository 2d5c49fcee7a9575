//! Recoverable diagnostics reported while lowering.
//!
//! A diagnostic never aborts the pass: the offending node is left as it was
//! (or replaced by a stub literal) and traversal continues.

use crate::syntax::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic families, each with its own code range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticClass {
    /// Operand type incompatible with the operation (1000-1999)
    TypeMismatch,
    /// Memory-model primitive used outside its legal shape (2000-2999)
    InvalidOperation,
    /// Failure surfaced from the external assembler (3000-3999)
    Syntax,
}

/// Stable diagnostic codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Non-pointer value assigned to a pointer
    PointerFromNonPointer = 1001,
    /// Pointer value assigned to a scalar
    ScalarFromPointer = 1002,
    /// Aggregate assigned from an incompatible aggregate
    StructMismatch = 1003,
    /// Cast between kinds with no conversion
    InvalidCast = 1004,
    /// Arithmetic between two pointers other than subtraction, or subtraction of unrelated pointers
    PointerPointerOperation = 2001,
    /// `size` mixed with a non-literal plain number
    SizeMixing = 2002,
    /// Prefix operator not allowed on a pointer
    PointerUnary = 2003,
    /// Address of a bit-field requested
    BitFieldAddress = 2004,
    /// Index operator on a shared pointer
    SharedPointerIndex = 2005,
    /// Missing or invalid explicit type argument
    InvalidTypeArgument = 2006,
    /// `defined()` of an unknown flag
    UnknownFlag = 2007,
    /// Literal array index out of range
    IndexOutOfRange = 2008,
    /// Field not present in the aggregate
    UnknownField = 2009,
    /// Dereference of a pointer that cannot be dereferenced
    InvalidDereference = 2010,
    /// Error reported by the assembler
    AssemblerError = 3001,
    /// Template substitution that is not a literal
    AsmSubstitution = 3002,
    /// Assembler could not be run
    AssemblerLaunch = 3003,
}

impl DiagnosticCode {
    /// Numeric code
    pub fn value(&self) -> u32 {
        *self as u32
    }

    /// Family the code belongs to
    pub fn class(&self) -> DiagnosticClass {
        match self.value() {
            1000..=1999 => DiagnosticClass::TypeMismatch,
            2000..=2999 => DiagnosticClass::InvalidOperation,
            _ => DiagnosticClass::Syntax,
        }
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Compilation unit path
    pub file: String,
    /// Offending source range
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Stable code
    pub code: DiagnosticCode,
}

impl Diagnostic {
    /// Family of the diagnostic
    pub fn class(&self) -> DiagnosticClass {
        self.code.class()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: error[{}]: {}",
            self.file,
            self.span.line,
            self.span.start,
            self.code.value(),
            self.message
        )
    }
}

/// Receiver of diagnostics
pub trait DiagnosticSink {
    /// Report one diagnostic
    fn report(&mut self, diagnostic: &Diagnostic);
}

/// Sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Diagnostics in report order
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }
}

/// Sink that writes to standard error, used when the host supplies none
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn report(&mut self, diagnostic: &Diagnostic) {
        eprintln!("{}", diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_classes() {
        assert_eq!(
            DiagnosticCode::ScalarFromPointer.class(),
            DiagnosticClass::TypeMismatch
        );
        assert_eq!(
            DiagnosticCode::SharedPointerIndex.class(),
            DiagnosticClass::InvalidOperation
        );
        assert_eq!(DiagnosticCode::AssemblerError.class(), DiagnosticClass::Syntax);
        assert_eq!(DiagnosticCode::UnknownFlag.value(), 2007);
    }

    #[test]
    fn test_display_and_collect() {
        let d = Diagnostic {
            file: "a.ts".into(),
            span: Span::new(4, 9, 2),
            message: "bad".into(),
            code: DiagnosticCode::PointerUnary,
        };
        assert_eq!(d.to_string(), "a.ts:2:4: error[2003]: bad");
        let mut sink = CollectingSink::default();
        sink.report(&d);
        assert_eq!(sink.diagnostics, vec![d]);
    }
}
