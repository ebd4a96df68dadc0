//! Abstract syntax tree for COOL.
//!
//! Every expression variant carries its source span; the `static_type` field
//! starts `None` and is filled in by the semantic analyser once it resolves
//! each node's type.

use crate::diagnostics::Span;

/// A type name: either a concrete class or the contextual `SELF_TYPE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeName {
    Class(String),
    SelfType,
}

impl TypeName {
    pub fn class(name: impl Into<String>) -> Self {
        TypeName::Class(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeName::Class(s) => s.as_str(),
            TypeName::SelfType => "SELF_TYPE",
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formal {
    pub name: String,
    pub type_name: TypeName,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub type_name: TypeName,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub formals: Vec<Formal>,
    pub return_type: TypeName,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Attribute(Attribute),
    Method(Method),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    /// `None` means the class inherits from `Object` (the default).
    pub parent: Option<String>,
    pub features: Vec<Feature>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub classes: Vec<Class>,
}

/// A single `let` binding, possibly with an initialiser.
#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: String,
    pub type_name: TypeName,
    pub init: Option<Expr>,
    pub span: Span,
}

/// One `case` branch: `id : T => body`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub name: String,
    pub type_name: TypeName,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Assign {
        name: String,
        value: Box<Expr>,
    },
    /// Dispatch. Static dispatch (`e0@T.f(...)`) is the same variant with
    /// `static_class` set.
    Dispatch {
        receiver: Box<Expr>,
        static_class: Option<String>,
        method: String,
        args: Vec<Expr>,
    },
    Conditional {
        predicate: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    While {
        predicate: Box<Expr>,
        body: Box<Expr>,
    },
    Block(Vec<Expr>),
    /// Desugared: multi-binding `let` becomes nested single-binding `let`s
    /// during parsing, so by the time this variant reaches the semantic
    /// analyser it always holds exactly one binding.
    Let {
        binding: Box<LetBinding>,
        body: Box<Expr>,
    },
    Case {
        scrutinee: Box<Expr>,
        branches: Vec<CaseBranch>,
    },
    New(TypeName),
    IsVoid(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Complement(Box<Expr>),
    Not(Box<Expr>),
    /// Parenthesised grouping. Kept as its own node (rather than collapsed
    /// during parsing) purely so source spans stay accurate; typing just
    /// forwards to the inner expression.
    Group(Box<Expr>),
    Id(String),
    /// Raw decimal digit text from the lexer, not yet narrowed to `i32`,
    /// lexing accepts an unbounded digit run ("still accepted lexically
    /// and flagged at codegen"), so the narrowing, and its overflow check,
    /// happens during IR lowering instead of here.
    IntLiteral(String),
    StringLiteral(String),
    BoolLiteral(bool),
    /// A dispatch/parse error that reached the semantic analyser anyway, so
    /// typing can still assign `Object` and keep walking rather than abort.
    ErrorExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub static_type: Option<TypeName>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            static_type: None,
        }
    }
}
