//! Syntax tree for component modules.

use std::sync::Arc;

/// A parsed component module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Top-level declarations in source order
    pub items: Vec<Item>,
    /// Named exports as `(exported, local)` pairs
    pub exports: Vec<(String, String)>,
    /// Local name bound to the default export
    pub default_export: Option<String>,
}

impl Module {
    /// Local names of top-level function declarations and function-valued
    /// constants, in source order.
    pub fn components(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Function(func) => func.name.as_deref(),
                Item::Const {
                    pattern: Pattern::Ident(name),
                    value: Expr::Arrow(_),
                } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether `name` is bound at module level.
    pub fn binds(&self, name: &str) -> bool {
        self.items.iter().any(|item| match item {
            Item::Function(func) => func.name.as_deref() == Some(name),
            Item::Const { pattern, .. } => pattern.names().contains(&name),
        })
    }
}

/// Top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `function Name(...) { ... }`
    Function(Arc<Function>),
    /// `const pattern = value`
    Const {
        /// Binding target
        pattern: Pattern,
        /// Initializer
        value: Expr,
    },
}

/// Function or arrow function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Declared name, if any
    pub name: Option<String>,
    /// Parameters
    pub params: Vec<Param>,
    /// Body
    pub body: Body,
}

/// One parameter with its default.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Binding target
    pub pattern: Pattern,
    /// Used when the argument is `undefined`
    pub default: Option<Expr>,
}

/// Function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Concise arrow body
    Expr(Expr),
    /// Statement block
    Block(Vec<Stmt>),
}

/// Binding pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `name`
    Ident(String),
    /// `{ a, b: c, d = 1, ...rest }`
    Object {
        /// Destructured properties
        props: Vec<PropPattern>,
        /// Rest binding
        rest: Option<String>,
    },
    /// `[a, , b]`
    Array(Vec<Option<String>>),
}

impl Pattern {
    /// Names this pattern binds.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Ident(name) => vec![name.as_str()],
            Pattern::Object { props, rest } => props
                .iter()
                .map(|p| p.local.as_str())
                .chain(rest.as_deref())
                .collect(),
            Pattern::Array(slots) => slots.iter().flatten().map(String::as_str).collect(),
        }
    }
}

/// `key: local = default` inside an object pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PropPattern {
    /// Property read
    pub key: String,
    /// Name bound
    pub local: String,
    /// Used when the property is `undefined`
    pub default: Option<Expr>,
}

/// Statement inside a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `const`/`let`/`var` declaration
    Let {
        /// Binding target
        pattern: Pattern,
        /// Initializer
        init: Option<Expr>,
    },
    /// Nested function declaration
    Function(Arc<Function>),
    /// `return`
    Return(Option<Expr>),
    /// `if (cond) ... else ...`
    If {
        /// Condition
        cond: Expr,
        /// Taken branch
        then: Vec<Stmt>,
        /// Other branch
        otherwise: Vec<Stmt>,
    },
    /// Expression evaluated for effect
    Expr(Expr),
}

/// Expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Numeric literal
    Number(f64),
    /// String literal
    Str(String),
    /// Template literal parts
    Template(Vec<TemplatePart>),
    /// Name reference
    Ident(String),
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{ a: 1, ...b }`
    Object(Vec<ObjectEntry>),
    /// `object.property` / `object?.property`
    Member {
        /// Receiver
        object: Box<Expr>,
        /// Property name
        property: String,
        /// `?.` access
        optional: bool,
    },
    /// `object[index]`
    Index {
        /// Receiver
        object: Box<Expr>,
        /// Key expression
        index: Box<Expr>,
    },
    /// `callee(args)`
    Call {
        /// Function or method member
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Arrow or function expression
    Arrow(Arc<Function>),
    /// Prefix operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Arithmetic or comparison
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Short-circuiting `&&`, `||`, `??`
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Expr>,
        /// Evaluated only when needed
        right: Box<Expr>,
    },
    /// `cond ? then : otherwise`
    Conditional {
        /// Condition
        cond: Box<Expr>,
        /// Value when truthy
        then: Box<Expr>,
        /// Value when falsy
        otherwise: Box<Expr>,
    },
    /// JSX element or fragment
    Element(Arc<JsxElement>),
}

/// Piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text, escapes resolved
    Lit(String),
    /// `${expr}`
    Expr(Expr),
}

/// Entry of an object literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEntry {
    /// `key: value` or shorthand `key`
    Prop(String, Expr),
    /// `...expr`
    Spread(Expr),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `+`
    Plus,
    /// `typeof`
    TypeOf,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `==`
    LooseEq,
    /// `!=`
    LooseNe,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// `<name attrs>children</name>`; a fragment when `name` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsxElement {
    /// Tag name (`div`, `Card`, `Foo.Bar`)
    pub name: Option<String>,
    /// Attributes in source order
    pub attributes: Vec<JsxAttribute>,
    /// Children in source order
    pub children: Vec<JsxChild>,
}

/// JSX attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum JsxAttribute {
    /// `name`, `name="text"` or `name={expr}`
    Named {
        /// Attribute name
        name: String,
        /// `None` for a bare boolean attribute
        value: Option<Expr>,
    },
    /// `{...expr}`
    Spread(Expr),
}

/// JSX child.
#[derive(Debug, Clone, PartialEq)]
pub enum JsxChild {
    /// Literal text, whitespace already normalized
    Text(String),
    /// `{expr}` or a nested element
    Expr(Expr),
}
