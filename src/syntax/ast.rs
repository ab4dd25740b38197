//! Syntax tree for the embedded module language
//!
//! Every node carries the 1-indexed source line it came from. Line numbers
//! survive the dedent/pad round trip in [`crate::source`], so trees parsed
//! from an extracted definition snippet line up with the owning module's
//! original text.

/// A parsed module: the ordered list of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAst {
    pub stmts: Vec<Stmt>,
}

/// One function parameter, optionally with a default expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub line: u32,
}

/// A function definition (top-level, nested, or a method).
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Line of the `fn` keyword
    pub line_start: u32,
    /// Line of the closing brace
    pub line_end: u32,
}

/// A class definition: a named container of method definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub methods: Vec<FnDef>,
    pub line_start: u32,
    pub line_end: u32,
}

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// `name = ...`
    Name { name: String, line: u32 },
    /// `object.field = ...`
    Attribute {
        object: Expr,
        name: String,
        line: u32,
    },
}

impl AssignTarget {
    /// The plain name being assigned, if this is a name target.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            AssignTarget::Name { name, .. } => Some(name),
            AssignTarget::Attribute { .. } => None,
        }
    }
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import module`
    Import { module: String, line: u32 },
    /// `from module import a, b`
    FromImport {
        module: String,
        names: Vec<String>,
        line: u32,
    },
    /// `a = expr` or chained `a = b = expr`
    Assign {
        targets: Vec<AssignTarget>,
        value: Expr,
        line: u32,
    },
    /// Bare expression statement
    Expr(Expr),
    /// `return [expr]`
    Return { value: Option<Expr>, line: u32 },
    /// `if cond { ... } [else { ... }]`
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        line: u32,
    },
    /// `while cond { ... }`
    While {
        cond: Expr,
        body: Vec<Stmt>,
        line: u32,
    },
    /// `fn name(...) { ... }`
    Fn(FnDef),
    /// `class Name { ... }`
    Class(ClassDef),
}

impl Stmt {
    pub fn line(&self) -> u32 {
        match self {
            Stmt::Import { line, .. }
            | Stmt::FromImport { line, .. }
            | Stmt::Assign { line, .. }
            | Stmt::Return { line, .. }
            | Stmt::If { line, .. }
            | Stmt::While { line, .. } => *line,
            Stmt::Expr(e) => e.line(),
            Stmt::Fn(f) => f.line_start,
            Stmt::Class(c) => c.line_start,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int { value: i64, line: u32 },
    Float { value: f64, line: u32 },
    Str { value: String, line: u32 },
    Bool { value: bool, line: u32 },
    Nil { line: u32 },
    Name { name: String, line: u32 },
    List { items: Vec<Expr>, line: u32 },
    Tuple { items: Vec<Expr>, line: u32 },
    Map { entries: Vec<(Expr, Expr)>, line: u32 },
    Attribute {
        object: Box<Expr>,
        name: String,
        line: u32,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        line: u32,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        line: u32,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        line: u32,
    },
}

impl Expr {
    pub fn line(&self) -> u32 {
        match self {
            Expr::Int { line, .. }
            | Expr::Float { line, .. }
            | Expr::Str { line, .. }
            | Expr::Bool { line, .. }
            | Expr::Nil { line }
            | Expr::Name { line, .. }
            | Expr::List { line, .. }
            | Expr::Tuple { line, .. }
            | Expr::Map { line, .. }
            | Expr::Attribute { line, .. }
            | Expr::Call { line, .. }
            | Expr::Unary { line, .. }
            | Expr::Binary { line, .. } => *line,
        }
    }
}
