//! Host-language text rendering of the syntax tree.
//!
//! Parentheses are inserted only where operator precedence requires them;
//! explicit [`ExprKind::Paren`] nodes are always kept.

use super::ast::*;
use std::fmt::{self, Write};

const INDENT: &str = "  ";

/// Renders a number the way the host language prints literals
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        format!("{}", n)
    }
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        Some(c) if c.is_ascii_digit() => return key.chars().all(|c| c.is_ascii_digit()),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn write_operand<W: Write>(out: &mut W, expr: &Expr, min: Precedence) -> fmt::Result {
    if expr.precedence() < min {
        out.write_char('(')?;
        write_expr(out, expr)?;
        out.write_char(')')
    } else {
        write_expr(out, expr)
    }
}

fn write_list<W: Write>(out: &mut W, list: &[Expr]) -> fmt::Result {
    for (i, item) in list.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        write_operand(out, item, Precedence::Assignment)?;
    }
    Ok(())
}

/// Writes one expression
pub fn write_expr<W: Write>(out: &mut W, expr: &Expr) -> fmt::Result {
    match &expr.kind {
        ExprKind::Identifier(name) => out.write_str(name),
        ExprKind::Number(n) => out.write_str(&format_number(*n)),
        ExprKind::BigInt(n) => write!(out, "{}n", n),
        ExprKind::String(s) => out.write_str(&quote(s)),
        ExprKind::Bool(b) => write!(out, "{}", b),
        ExprKind::Null => out.write_str("null"),
        ExprKind::Property { object, name } => {
            if matches!(object.kind, ExprKind::Number(_)) {
                write!(out, "({})", DisplayExpr(object))?;
            } else {
                write_operand(out, object, Precedence::Call)?;
            }
            write!(out, ".{}", name)
        }
        ExprKind::Index { object, index } => {
            write_operand(out, object, Precedence::Call)?;
            out.write_char('[')?;
            write_expr(out, index)?;
            out.write_char(']')
        }
        ExprKind::Call { callee, args, .. } => {
            write_operand(out, callee, Precedence::Call)?;
            out.write_char('(')?;
            write_list(out, args)?;
            out.write_char(')')
        }
        ExprKind::Binary { op, left, right } => {
            let prec = op.precedence();
            write_operand(out, left, prec)?;
            write!(out, " {} ", op)?;
            if right.precedence() <= prec {
                write!(out, "({})", DisplayExpr(right))
            } else {
                write_expr(out, right)
            }
        }
        ExprKind::Assign { op, target, value } => {
            write_operand(out, target, Precedence::Unary)?;
            write!(out, " {} ", op)?;
            write_operand(out, value, Precedence::Assignment)
        }
        ExprKind::Unary { op, operand } => {
            write!(out, "{}", op)?;
            let text = DisplayExpr(operand).to_string();
            let clash = match op {
                UnaryOp::Neg => text.starts_with('-'),
                UnaryOp::Plus => text.starts_with('+'),
                _ => false,
            };
            if clash || operand.precedence() < Precedence::Unary {
                write!(out, "({})", text)
            } else {
                out.write_str(&text)
            }
        }
        ExprKind::Update {
            op,
            prefix,
            operand,
        } => {
            if *prefix {
                write!(out, "{}", op)?;
                write_operand(out, operand, Precedence::Postfix)
            } else {
                write_operand(out, operand, Precedence::Postfix)?;
                write!(out, "{}", op)
            }
        }
        ExprKind::Conditional {
            condition,
            then,
            otherwise,
        } => {
            write_operand(out, condition, Precedence::Or)?;
            out.write_str(" ? ")?;
            write_operand(out, then, Precedence::Assignment)?;
            out.write_str(" : ")?;
            write_operand(out, otherwise, Precedence::Assignment)
        }
        ExprKind::Paren(inner) => {
            out.write_char('(')?;
            write_expr(out, inner)?;
            out.write_char(')')
        }
        ExprKind::Object(properties) => {
            if properties.is_empty() {
                return out.write_str("{}");
            }
            out.write_str("{ ")?;
            for (i, prop) in properties.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                if is_plain_key(&prop.key) {
                    out.write_str(&prop.key)?;
                } else {
                    out.write_str(&quote(&prop.key))?;
                }
                out.write_str(": ")?;
                write_operand(out, &prop.value, Precedence::Assignment)?;
            }
            out.write_str(" }")
        }
        ExprKind::Array(items) => {
            out.write_char('[')?;
            write_list(out, items)?;
            out.write_char(']')
        }
        ExprKind::TaggedTemplate {
            tag,
            quasis,
            substitutions,
        } => {
            write_operand(out, tag, Precedence::Call)?;
            out.write_char('`')?;
            for (i, quasi) in quasis.iter().enumerate() {
                out.write_str(&quasi.replace('`', "\\`"))?;
                if let Some(sub) = substitutions.get(i) {
                    out.write_str("${")?;
                    write_expr(out, sub)?;
                    out.write_char('}')?;
                }
            }
            out.write_char('`')
        }
        ExprKind::As {
            expr, type_name, ..
        } => {
            write_operand(out, expr, Precedence::Relational)?;
            write!(out, " as {}", type_name)
        }
        ExprKind::Comma(list) => write_list(out, list),
    }
}

struct DisplayExpr<'a>(&'a Expr);

impl fmt::Display for DisplayExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_expr(f, self.0)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_expr(f, self)
    }
}

/// Line-oriented statement printer
#[derive(Debug, Default)]
pub struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    /// Create an empty printer
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the printer and return the text
    pub fn finish(self) -> String {
        self.out
    }

    /// Append a full line at the current indentation
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Increase indentation
    pub fn indent(&mut self) {
        self.depth += 1;
    }

    /// Decrease indentation
    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Print every statement of a program
    pub fn program(&mut self, program: &Program) {
        for stmt in &program.statements {
            self.statement(stmt);
        }
    }

    fn body(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block(list) => {
                self.indent();
                for s in list {
                    self.statement(s);
                }
                self.dedent();
            }
            other => {
                self.indent();
                self.statement(other);
                self.dedent();
            }
        }
    }

    /// Print one statement
    pub fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expression(expr) => {
                if matches!(expr.kind, ExprKind::Object(_)) {
                    self.line(&format!("({});", expr));
                } else {
                    self.line(&format!("{};", expr));
                }
            }
            Statement::VarDecl {
                kind,
                name,
                type_annotation,
                init,
            } => {
                let keyword = match kind {
                    VarKind::Let => "let",
                    VarKind::Const => "const",
                    VarKind::Var => "var",
                };
                let mut text = format!("{} {}", keyword, name);
                if let Some(t) = type_annotation {
                    let _ = write!(text, ": {}", t);
                }
                if let Some(init) = init {
                    text.push_str(" = ");
                    let _ = write_operand(&mut text, init, Precedence::Assignment);
                }
                text.push(';');
                self.line(&text);
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.line(&format!("if ({}) {{", condition));
                self.body(then_branch);
                let mut next = else_branch.as_deref();
                while let Some(branch) = next {
                    match branch {
                        Statement::If {
                            condition,
                            then_branch,
                            else_branch,
                        } => {
                            self.line(&format!("}} else if ({}) {{", condition));
                            self.body(then_branch);
                            next = else_branch.as_deref();
                        }
                        other => {
                            self.line("} else {");
                            self.body(other);
                            next = None;
                        }
                    }
                }
                self.line("}");
            }
            Statement::Block(_) => {
                self.line("{");
                self.body(stmt);
                self.line("}");
            }
            Statement::Return(value) => match value {
                Some(v) => self.line(&format!("return {};", v)),
                None => self.line("return;"),
            },
            Statement::While { condition, body } => {
                self.line(&format!("while ({}) {{", condition));
                self.body(body);
                self.line("}");
            }
            Statement::Function {
                name, params, body, ..
            } => {
                let params = params
                    .iter()
                    .map(|p| match &p.type_annotation {
                        Some(t) => format!("{}: {}", p.name, t),
                        None => p.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                self.line(&format!("function {}({}) {{", name, params));
                self.indent();
                for s in body {
                    self.statement(s);
                }
                self.dedent();
                self.line("}");
            }
            Statement::Class {
                name,
                decorators,
                extends,
                members,
                metadata,
                ..
            } => {
                for d in decorators {
                    self.line(&format!("@{}", d));
                }
                match extends {
                    Some(parent) => self.line(&format!("class {} extends {} {{", name, parent)),
                    None => self.line(&format!("class {} {{", name)),
                }
                self.indent();
                for m in members {
                    let mut text = String::new();
                    for d in &m.decorators {
                        let _ = write!(text, "@{} ", d);
                    }
                    text.push_str(&m.name);
                    if let Some(t) = &m.type_annotation {
                        let _ = write!(text, ": {}", t);
                    }
                    text.push(';');
                    self.line(&text);
                }
                self.dedent();
                self.line("}");
                if let Some(meta) = metadata {
                    meta.write_registration(self, name);
                }
            }
            Statement::Empty => self.line(";"),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut printer = Printer::new();
        printer.statement(self);
        f.write_str(printer.finish().trim_end())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut printer = Printer::new();
        printer.program(self);
        f.write_str(&printer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::builder::*;

    #[test]
    fn test_precedence_parens() {
        let e = binary(
            BinaryOp::Mul,
            binary(BinaryOp::Add, ident("a"), int(1)),
            ident("b"),
        );
        assert_eq!(e.to_string(), "(a + 1) * b");

        let e = binary(
            BinaryOp::Sub,
            ident("a"),
            binary(BinaryOp::Sub, ident("b"), ident("c")),
        );
        assert_eq!(e.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_read_call_rendering() {
        let read = call(
            index(ident("CTypeEnumRead"), int(20)),
            vec![plus(ident("a"), int(4))],
        );
        assert_eq!(read.to_string(), "CTypeEnumRead[20](a + 4)");
    }

    #[test]
    fn test_literals() {
        assert_eq!(num(4.0).to_string(), "4");
        assert_eq!(num(1.5).to_string(), "1.5");
        assert_eq!(bigint(16).to_string(), "16n");
        assert_eq!(string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(unary(UnaryOp::Neg, int(-1)).to_string(), "-(-1)");
        assert_eq!(not_not(ident("x")).to_string(), "!!x");
    }

    #[test]
    fn test_if_else_chain() {
        let stmt = Statement::If {
            condition: ident("a"),
            then_branch: Box::new(Statement::Block(vec![Statement::Expression(ident("x"))])),
            else_branch: Some(Box::new(Statement::Block(vec![Statement::Expression(
                ident("y"),
            )]))),
        };
        assert_eq!(stmt.to_string(), "if (a) {\n  x;\n} else {\n  y;\n}");
    }
}
