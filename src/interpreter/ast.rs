use std::sync::Arc;

/// Parsed guest program.
#[derive(Debug, Clone)]
pub struct Program {
    /// Top-level statements in source order.
    pub body: Vec<Stmt>,
    /// Original source text, retained for error reporting and debugging.
    pub source: String,
}

impl Program {
    /// Construct a program from parsed statements and the source they came from.
    pub fn new(body: Vec<Stmt>, source: impl Into<String>) -> Self {
        Self {
            body,
            source: source.into(),
        }
    }
}

/// A statement tagged with the source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// 1-based line number.
    pub line: usize,
    /// Statement payload.
    pub kind: StmtKind,
}

/// Statement forms understood by the guest interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Bare expression evaluated for its side effects.
    Expr(Expr),
    /// `a = b = value`; targets are assigned left to right.
    Assign {
        /// Assignment targets.
        targets: Vec<Target>,
        /// Value expression.
        value: Expr,
    },
    /// `target op= value`.
    AugAssign {
        /// Assignment target.
        target: Target,
        /// Arithmetic operator applied before storing.
        op: BinOp,
        /// Right-hand operand.
        value: Expr,
    },
    /// `if` / `elif` chain with optional `else`.
    If {
        /// Condition/body pairs evaluated in order.
        branches: Vec<(Expr, Vec<Stmt>)>,
        /// `else` body.
        otherwise: Option<Vec<Stmt>>,
    },
    /// `while cond:` loop.
    While {
        /// Loop condition.
        cond: Expr,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// `for target in iter:` loop.
    For {
        /// Loop variable(s).
        target: Target,
        /// Iterable expression.
        iter: Expr,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// Function definition.
    Def(Arc<FunctionDef>),
    /// `return [value]`.
    Return(Option<Expr>),
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `pass`.
    Pass,
    /// `global a, b` inside a function body.
    Global(Vec<String>),
    /// `import a, b`.
    Import(Vec<String>),
    /// `from module import a, b`.
    ImportFrom {
        /// Module name.
        module: String,
        /// Imported member names.
        names: Vec<String>,
    },
    /// `raise [expr]`.
    Raise(Option<Expr>),
    /// `try:` with one or more `except` clauses.
    Try {
        /// Protected body.
        body: Vec<Stmt>,
        /// Handlers tried in order.
        handlers: Vec<ExceptHandler>,
    },
}

/// One `except [Kind] [as name]:` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Exception kind matched by this handler; `None` catches everything.
    pub kind: Option<String>,
    /// Name the caught exception is bound to.
    pub binding: Option<String>,
    /// Handler body.
    pub body: Vec<Stmt>,
}

/// User-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// Declared parameters in order.
    pub params: Vec<Param>,
    /// Function body.
    pub body: Vec<Stmt>,
}

/// Function parameter with an optional default expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Default value, evaluated once at definition time.
    pub default: Option<Expr>,
}

/// Assignable locations.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Plain variable.
    Name(String),
    /// `object[index]`.
    Index {
        /// Container expression.
        object: Expr,
        /// Key or position.
        index: Expr,
    },
    /// Tuple/list unpacking.
    Unpack(Vec<Target>),
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    Str(String),
    /// Formatted string literal.
    FString(Vec<FPart>),
    /// Variable reference.
    Name(String),
    /// `[a, b]`.
    List(Vec<Expr>),
    /// `(a, b)` or a bare comma list.
    Tuple(Vec<Expr>),
    /// `{k: v}`.
    Dict(Vec<(Expr, Expr)>),
    /// `[element for target in iter if cond]`.
    ListComp {
        /// Produced element.
        element: Box<Expr>,
        /// Loop variable(s).
        target: Box<Target>,
        /// Iterable.
        iter: Box<Expr>,
        /// Optional filter.
        cond: Option<Box<Expr>>,
    },
    /// Prefix operator.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Arithmetic operator.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Possibly chained comparison (`a < b <= c`).
    Compare {
        /// Leftmost operand.
        first: Box<Expr>,
        /// Operator/operand pairs.
        rest: Vec<(CmpOp, Expr)>,
    },
    /// Short-circuiting `and`.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuiting `or`.
    Or(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`.
    IfExp {
        /// Condition.
        cond: Box<Expr>,
        /// Value when the condition holds.
        then: Box<Expr>,
        /// Value otherwise.
        otherwise: Box<Expr>,
    },
    /// Function or method call.
    Call {
        /// Callee.
        func: Box<Expr>,
        /// Positional arguments.
        args: Vec<Expr>,
        /// Keyword arguments.
        kwargs: Vec<(String, Expr)>,
    },
    /// `object.name`.
    Attribute {
        /// Receiver.
        object: Box<Expr>,
        /// Attribute name.
        name: String,
    },
    /// `object[index]`.
    Index {
        /// Container.
        object: Box<Expr>,
        /// Key or position.
        index: Box<Expr>,
    },
    /// `object[start:stop]`.
    Slice {
        /// Sequence.
        object: Box<Expr>,
        /// Inclusive start.
        start: Option<Box<Expr>>,
        /// Exclusive stop.
        stop: Option<Box<Expr>>,
    },
}

/// Piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    /// Literal text.
    Lit(String),
    /// Interpolated expression with an optional format spec (`{x:.2f}`).
    Expr(Expr, Option<String>),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`.
    Neg,
    /// `+x`.
    Pos,
    /// `not x`.
    Not,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinOp {
    /// Source spelling, used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}
