//! Compile-time conditionals folded against configured flags

use memlower::compiler::{CollectingSink, CompileOptions, Compiler, DiagnosticCode, FlagValue};
use memlower::syntax::builder::*;
use memlower::syntax::{BinaryOp, Program, Statement};
use memlower::types::TypeTable;

fn compiler(flags: &[(&str, FlagValue)]) -> Compiler {
    let mut options = CompileOptions::default();
    for (name, value) in flags {
        options.flags.insert(name.to_string(), value.clone());
    }
    Compiler::new(options).with_sink(Box::new(CollectingSink::default()))
}

fn block(name: &str) -> Box<Statement> {
    Box::new(Statement::Block(vec![Statement::Expression(call_named(
        name,
        vec![],
    ))]))
}

fn if_defined(flag: &str) -> Statement {
    Statement::If {
        condition: call_named("defined", vec![ident(flag)]),
        then_branch: block("x"),
        else_branch: Some(block("y")),
    }
}

#[test]
fn test_false_flag_takes_else_branch() {
    let types = TypeTable::new();
    let program = Program {
        statements: vec![if_defined("A")],
    };
    let output = compiler(&[("A", FlagValue::Bool(false))]).compile(&program, &types, "a.ts");
    assert_eq!(output.program.to_string(), "y();\n");
    assert!(output.is_clean());
}

#[test]
fn test_true_flag_folds_to_then_branch_and_is_idempotent() {
    let types = TypeTable::new();
    let program = Program {
        statements: vec![if_defined("A")],
    };
    let mut c = compiler(&[("A", FlagValue::Bool(true))]);
    let once = c.compile(&program, &types, "a.ts");
    assert_eq!(once.program.to_string(), "x();\n");
    let twice = c.compile(&once.program, &types, "a.ts");
    assert_eq!(twice.program, once.program);
}

#[test]
fn test_comparisons_keep_the_if_with_the_flag_value_inlined() {
    let types = TypeTable::new();
    let condition = binary(
        BinaryOp::Gt,
        call_named("defined", vec![ident("LEVEL")]),
        int(2),
    );
    let program = Program {
        statements: vec![Statement::If {
            condition,
            then_branch: block("verbose"),
            else_branch: None,
        }],
    };
    let output = compiler(&[("LEVEL", FlagValue::Number(3.0))]).compile(&program, &types, "a.ts");
    assert_eq!(output.program.to_string(), "if (3 > 2) {\n  verbose();\n}\n");
    assert!(output.is_clean());
}

#[test]
fn test_flags_combine_with_and_or() {
    let types = TypeTable::new();
    let condition = binary(
        BinaryOp::And,
        call_named("defined", vec![ident("A")]),
        call_named("defined", vec![ident("B")]),
    );
    let program = Program {
        statements: vec![Statement::If {
            condition,
            then_branch: block("x"),
            else_branch: Some(block("y")),
        }],
    };
    let both = compiler(&[("A", FlagValue::Bool(true)), ("B", FlagValue::Bool(true))])
        .compile(&program, &types, "a.ts");
    assert_eq!(both.program.to_string(), "x();\n");
    let one = compiler(&[("A", FlagValue::Bool(true)), ("B", FlagValue::Bool(false))])
        .compile(&program, &types, "a.ts");
    assert_eq!(one.program.to_string(), "y();\n");
}

#[test]
fn test_unknown_flag_is_reported() {
    let types = TypeTable::new();
    let program = Program {
        statements: vec![if_defined("MISSING")],
    };
    let output = compiler(&[]).compile(&program, &types, "a.ts");
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code, DiagnosticCode::UnknownFlag);
}

#[test]
fn test_runtime_condition_is_kept() {
    let types = TypeTable::new();
    let program = Program {
        statements: vec![Statement::If {
            condition: ident("ready"),
            then_branch: block("x"),
            else_branch: None,
        }],
    };
    let output = compiler(&[]).compile(&program, &types, "a.ts");
    assert_eq!(output.program.to_string(), "if (ready) {\n  x();\n}\n");
}
