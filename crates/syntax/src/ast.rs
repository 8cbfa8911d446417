//! AST types for the Monkey programming language.
//!
//! Every expression renders back to source-like text via `Display`; the
//! compiler relies on that rendering to order hash-literal keys
//! deterministically.

use std::fmt;

/// A span in the source code, used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// A node with source location information.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// An identifier.
pub type Ident = Spanned<String>;

/// A complete program: a sequence of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `return e;`
    Return(Expr, Span),
    /// An expression in statement position; compiled with a trailing `Pop`.
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Return(_, span) => *span,
            Stmt::Expr(expr) => expr.span(),
        }
    }
}

/// A braced sequence of statements. Blocks are expressions: they yield
/// the value of their final statement, or null.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `-`
    Neg,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Not => write!(f, "!"),
            PrefixOp::BitNot => write!(f, "~"),
            PrefixOp::Neg => write!(f, "-"),
        }
    }
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitXor,
    BitAnd,
    And,
    Or,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::BitOr => "|",
            InfixOp::BitXor => "^",
            InfixOp::BitAnd => "&",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::LtEq => "<=",
            InfixOp::GtEq => ">=",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
        };
        write!(f, "{}", s)
    }
}

/// A function literal: `fn(a, b) { ... }`.
///
/// When the literal is the direct right-hand side of a bind, the parser
/// records the bound name here so the compiler can wire up
/// self-recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLit {
    pub name: Option<String>,
    pub parameters: Vec<Ident>,
    pub body: Block,
    pub span: Span,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64, Span),
    Str(String, Span),
    Boolean(bool, Span),
    Null(Span),
    Ident(Ident),
    Prefix(PrefixOp, Box<Expr>, Span),
    Infix(InfixOp, Box<Expr>, Box<Expr>, Span),
    /// `x := e`: introduce a binding.
    Bind {
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    /// `x = e` or `a[i] = e`: store into an existing slot.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    /// `a[i]`. The parser also desugars `a.name` into an index with a
    /// string-literal index.
    Index {
        left: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
        span: Span,
    },
    While {
        condition: Box<Expr>,
        body: Block,
        span: Span,
    },
    Function(FunctionLit),
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
        span: Span,
    },
    Array(Vec<Expr>, Span),
    Hash(Vec<(Expr, Expr)>, Span),
}

impl Expr {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Integer(_, s)
            | Expr::Str(_, s)
            | Expr::Boolean(_, s)
            | Expr::Null(s)
            | Expr::Prefix(_, _, s)
            | Expr::Infix(_, _, _, s)
            | Expr::Array(_, s)
            | Expr::Hash(_, s) => *s,
            Expr::Ident(ident) => ident.span,
            Expr::Bind { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Index { span, .. }
            | Expr::If { span, .. }
            | Expr::While { span, .. }
            | Expr::Call { span, .. } => *span,
            Expr::Function(f) => f.span,
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Return(expr, _) => write!(f, "return {};", expr),
            Stmt::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(value, _) => write!(f, "{}", value),
            Expr::Str(value, _) => write!(f, "{}", value),
            Expr::Boolean(value, _) => write!(f, "{}", value),
            Expr::Null(_) => write!(f, "null"),
            Expr::Ident(ident) => write!(f, "{}", ident.node),
            Expr::Prefix(op, right, _) => write!(f, "({}{})", op, right),
            Expr::Infix(op, left, right, _) => write!(f, "({} {} {})", left, op, right),
            Expr::Bind { target, value, .. } => write!(f, "{} := {}", target, value),
            Expr::Assign { target, value, .. } => write!(f, "{} = {}", target, value),
            Expr::Index { left, index, .. } => write!(f, "({}[{}])", left, index),
            Expr::If {
                condition,
                consequence,
                alternative,
                ..
            } => {
                write!(f, "if {} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, " else {}", alt)?;
                }
                Ok(())
            }
            Expr::While {
                condition, body, ..
            } => write!(f, "while {} {}", condition, body),
            Expr::Function(func) => {
                let params: Vec<&str> =
                    func.parameters.iter().map(|p| p.node.as_str()).collect();
                write!(f, "fn({}) {{ {} }}", params.join(", "), func.body)
            }
            Expr::Call {
                function,
                arguments,
                ..
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            Expr::Array(elements, _) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Expr::Hash(pairs, _) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
        }
    }
}
