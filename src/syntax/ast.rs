use crate::compiler::metadata::StructMetadata;
use crate::types::{DeclId, TypeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a syntax node, used to ask the type oracle about it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Id carried by nodes the pass synthesizes; the oracle knows nothing about them
    pub const DETACHED: NodeId = NodeId(u32::MAX);

    /// Whether this node was synthesized by the pass
    pub fn is_detached(&self) -> bool {
        *self == Self::DETACHED
    }
}

/// Source position of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Character offset of the first character
    pub start: u32,
    /// Character offset one past the last character
    pub end: u32,
    /// 1-based line of `start`
    pub line: u32,
}

impl Span {
    /// Creates a span
    pub fn new(start: u32, end: u32, line: u32) -> Self {
        Self { start, end, line }
    }
}

/// One compilation unit's statements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Top-level statements in source order
    pub statements: Vec<Statement>,
}

/// Declaration keyword of a variable statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    /// `let`
    Let,
    /// `const`
    Const,
    /// `var`
    Var,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Bound name
    pub name: String,
    /// Type annotation as written, kept for printing
    #[serde(default)]
    pub type_annotation: Option<String>,
}

/// Property declaration inside a class body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMember {
    /// Property name
    pub name: String,
    /// Decorators as written (`@pointer(2)` is stored as `pointer(2)`)
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Type annotation as written
    #[serde(default)]
    pub type_annotation: Option<String>,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Expression statement
    Expression(Expr),

    /// Variable declaration: let name: T = init
    VarDecl {
        /// Declaration keyword
        kind: VarKind,
        /// Bound name
        name: String,
        /// Type annotation as written
        #[serde(default)]
        type_annotation: Option<String>,
        /// Optional initializer
        #[serde(default)]
        init: Option<Expr>,
    },

    /// If statement
    If {
        /// Condition expression to evaluate
        condition: Expr,
        /// Statement executed when the condition holds
        then_branch: Box<Statement>,
        /// Optional statement executed otherwise
        #[serde(default)]
        else_branch: Option<Box<Statement>>,
    },

    /// Braced block
    Block(Vec<Statement>),

    /// Return statement
    Return(Option<Expr>),

    /// While loop
    While {
        /// Loop condition expression
        condition: Expr,
        /// Loop body
        body: Box<Statement>,
    },

    /// Function declaration
    Function {
        /// Function name
        name: String,
        /// Parameters in order
        params: Vec<Param>,
        /// Body statements
        body: Vec<Statement>,
        /// Whether the function is marked synchronized
        #[serde(default)]
        synchronized: bool,
    },

    /// Class declaration; aggregates get their layout metadata attached here
    Class {
        /// Declaration identity in the type oracle
        decl: DeclId,
        /// Class name
        name: String,
        /// Class-level decorators (`struct`, `union`, ...)
        #[serde(default)]
        decorators: Vec<String>,
        /// Name of the extended class
        #[serde(default)]
        extends: Option<String>,
        /// Property declarations
        #[serde(default)]
        members: Vec<ClassMember>,
        /// Emitted layout metadata
        #[serde(default)]
        metadata: Option<StructMetadata>,
    },

    /// Empty statement
    Empty,
}

/// An expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Node identity
    pub id: NodeId,
    /// Source position
    #[serde(default)]
    pub span: Span,
    /// Expression payload
    pub kind: ExprKind,
}

/// Property of an object literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    /// Property name
    pub key: String,
    /// Property value
    pub value: Expr,
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Identifier reference
    Identifier(String),
    /// Number literal
    Number(f64),
    /// Big-integer literal (`10n`)
    BigInt(i128),
    /// String literal
    String(String),
    /// Boolean literal
    Bool(bool),
    /// `null`
    Null,

    /// Property access: object.name
    Property {
        /// Accessed object
        object: Box<Expr>,
        /// Property name
        name: String,
    },

    /// Element access: object[index]
    Index {
        /// Accessed object
        object: Box<Expr>,
        /// Index expression
        index: Box<Expr>,
    },

    /// Call: callee<T..>(args)
    Call {
        /// Called expression
        callee: Box<Expr>,
        /// Explicit type arguments
        #[serde(default)]
        type_args: Vec<TypeId>,
        /// Arguments
        args: Vec<Expr>,
    },

    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },

    /// Assignment, plain or compound
    Assign {
        /// Operator
        op: AssignOp,
        /// Assigned place
        target: Box<Expr>,
        /// Assigned value
        value: Box<Expr>,
    },

    /// Prefix unary operation other than ++/--
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },

    /// ++ or --
    Update {
        /// Increment or decrement
        op: UpdateOp,
        /// Prefix (`++x`) or postfix (`x++`)
        prefix: bool,
        /// Updated place
        operand: Box<Expr>,
    },

    /// Ternary: condition ? then : otherwise
    Conditional {
        /// Condition
        condition: Box<Expr>,
        /// Value when true
        then: Box<Expr>,
        /// Value when false
        otherwise: Box<Expr>,
    },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Object literal
    Object(Vec<ObjectProperty>),

    /// Array literal
    Array(Vec<Expr>),

    /// Tagged template: tag`quasi${sub}quasi`
    TaggedTemplate {
        /// Tag expression
        tag: Box<Expr>,
        /// Literal text chunks, one more than substitutions
        quasis: Vec<String>,
        /// Substituted expressions
        #[serde(default)]
        substitutions: Vec<Expr>,
    },

    /// Type assertion: expr as T
    As {
        /// Asserted expression
        expr: Box<Expr>,
        /// Target type
        ty: TypeId,
        /// Target type as written
        type_name: String,
    },

    /// Comma sequence
    Comma(Vec<Expr>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
    /// %
    Mod,
    /// **
    Exp,
    /// <<
    Shl,
    /// >>
    Shr,
    /// >>>
    UShr,
    /// &
    BitAnd,
    /// |
    BitOr,
    /// ^
    BitXor,
    /// &&
    And,
    /// ||
    Or,
    /// ??
    Nullish,
    /// ==
    Eq,
    /// !=
    NotEq,
    /// ===
    StrictEq,
    /// !==
    StrictNotEq,
    /// <
    Lt,
    /// >
    Gt,
    /// <=
    LtEq,
    /// >=
    GtEq,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    /// =
    Assign,
    /// +=
    Add,
    /// -=
    Sub,
    /// *=
    Mul,
    /// /=
    Div,
    /// %=
    Mod,
    /// <<=
    Shl,
    /// >>=
    Shr,
    /// >>>=
    UShr,
    /// &=
    BitAnd,
    /// |=
    BitOr,
    /// ^=
    BitXor,
}

/// Prefix unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// -x
    Neg,
    /// +x
    Plus,
    /// !x
    Not,
    /// ~x
    BitNot,
    /// typeof x
    TypeOf,
}

/// ++ / --
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOp {
    /// ++
    Increment,
    /// --
    Decrement,
}

/// Operator precedence levels, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Comma sequences
    Comma,
    /// Assignment and ternary
    Assignment,
    /// Conditional expression
    Conditional,
    /// || and ??
    Or,
    /// &&
    And,
    /// |
    BitOr,
    /// ^
    BitXor,
    /// &
    BitAnd,
    /// == != === !==
    Equality,
    /// < > <= >=
    Relational,
    /// << >> >>>
    Shift,
    /// + -
    Additive,
    /// * / %
    Multiplicative,
    /// **
    Exponent,
    /// Prefix operators
    Unary,
    /// Postfix ++/--
    Postfix,
    /// Member access and calls
    Call,
    /// Literals, identifiers, parenthesized expressions
    Primary,
}

impl BinaryOp {
    /// Returns the precedence level of this binary operator
    pub fn precedence(&self) -> Precedence {
        match self {
            BinaryOp::Or | BinaryOp::Nullish => Precedence::Or,
            BinaryOp::And => Precedence::And,
            BinaryOp::BitOr => Precedence::BitOr,
            BinaryOp::BitXor => Precedence::BitXor,
            BinaryOp::BitAnd => Precedence::BitAnd,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => {
                Precedence::Equality
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => Precedence::Relational,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => Precedence::Shift,
            BinaryOp::Add | BinaryOp::Sub => Precedence::Additive,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => Precedence::Multiplicative,
            BinaryOp::Exp => Precedence::Exponent,
        }
    }

    /// Arithmetic and bitwise operators, as opposed to comparisons and logic
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Exp
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::UShr
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
        )
    }
}

impl AssignOp {
    /// The binary operator a compound assignment applies, `None` for plain `=`
    pub fn binary(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::UShr => Some(BinaryOp::UShr),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
        }
    }
}

impl Expr {
    /// Creates a synthesized node
    pub fn detached(kind: ExprKind) -> Self {
        Self {
            id: NodeId::DETACHED,
            span: Span::default(),
            kind,
        }
    }

    /// Creates a node known to the oracle
    pub fn new(id: NodeId, span: Span, kind: ExprKind) -> Self {
        Self { id, span, kind }
    }

    /// Same payload, positioned at `span`
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Number literal value, looking through parentheses
    pub fn as_number(&self) -> Option<f64> {
        match &self.kind {
            ExprKind::Number(n) => Some(*n),
            ExprKind::Paren(inner) => inner.as_number(),
            _ => None,
        }
    }

    /// Big-integer literal value, looking through parentheses
    pub fn as_bigint(&self) -> Option<i128> {
        match &self.kind {
            ExprKind::BigInt(n) => Some(*n),
            ExprKind::Paren(inner) => inner.as_bigint(),
            _ => None,
        }
    }

    /// Identifier name, if this is a bare identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Expression with any parentheses removed
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    /// Whether the node is a number, bigint, string, boolean or null literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self.unparen().kind,
            ExprKind::Number(_)
                | ExprKind::BigInt(_)
                | ExprKind::String(_)
                | ExprKind::Bool(_)
                | ExprKind::Null
        )
    }

    /// Binding strength of this node when printed
    pub fn precedence(&self) -> Precedence {
        match &self.kind {
            ExprKind::Number(n) if *n < 0.0 => Precedence::Unary,
            ExprKind::BigInt(n) if *n < 0 => Precedence::Unary,
            ExprKind::Identifier(_)
            | ExprKind::Number(_)
            | ExprKind::BigInt(_)
            | ExprKind::String(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::Paren(_)
            | ExprKind::Object(_)
            | ExprKind::Array(_) => Precedence::Primary,
            ExprKind::Property { .. }
            | ExprKind::Index { .. }
            | ExprKind::Call { .. }
            | ExprKind::TaggedTemplate { .. } => Precedence::Call,
            ExprKind::Update { prefix: false, .. } => Precedence::Postfix,
            ExprKind::Update { prefix: true, .. } | ExprKind::Unary { .. } => Precedence::Unary,
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::As { .. } => Precedence::Relational,
            ExprKind::Conditional { .. } => Precedence::Conditional,
            ExprKind::Assign { .. } => Precedence::Assignment,
            ExprKind::Comma(_) => Precedence::Comma,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Nullish => "??",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.binary() {
            None => f.write_str("="),
            Some(op) => write!(f, "{}=", op),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Plus => write!(f, "+"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::BitNot => write!(f, "~"),
            UnaryOp::TypeOf => write!(f, "typeof "),
        }
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UpdateOp::Increment => write!(f, "++"),
            UpdateOp::Decrement => write!(f, "--"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        assert!(BinaryOp::Mul.precedence() > BinaryOp::Add.precedence());
        assert!(BinaryOp::Add.precedence() > BinaryOp::Shl.precedence());
        assert!(BinaryOp::UShr.precedence() > BinaryOp::BitAnd.precedence());
        assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
    }

    #[test]
    fn test_compound_assign_maps_to_binary() {
        assert_eq!(AssignOp::Add.binary(), Some(BinaryOp::Add));
        assert_eq!(AssignOp::UShr.binary(), Some(BinaryOp::UShr));
        assert_eq!(AssignOp::Assign.binary(), None);
        assert_eq!(AssignOp::BitXor.to_string(), "^=");
    }

    #[test]
    fn test_unparen_and_literals() {
        let inner = Expr::detached(ExprKind::Number(3.0));
        let wrapped = Expr::detached(ExprKind::Paren(Box::new(inner)));
        assert_eq!(wrapped.as_number(), Some(3.0));
        assert!(wrapped.is_literal());
        assert!(NodeId::DETACHED.is_detached());
        assert!(!NodeId(4).is_detached());
    }
}
