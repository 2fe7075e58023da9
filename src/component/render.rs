//! Rendering component factories to element trees.
//!
//! A render evaluates the module's top-level bindings, calls the entry
//! component with the props, and expands nested components until only
//! intrinsic tags and text remain. Hooks return their initial values and
//! effects never run: a preview is a single static render.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::RenderError;
use super::syntax::{
    BinaryOp, Body, Expr, Function, Item, JsxAttribute, JsxChild, JsxElement, LogicalOp, Module,
    ObjectEntry, Pattern, Stmt, TemplatePart, UnaryOp,
};

/// Nested component and function calls allowed in one render.
pub const MAX_RENDER_DEPTH: usize = 64;

/// Evaluation steps allowed in one render.
pub const MAX_RENDER_STEPS: usize = 1_000_000;

/// Longest string or array a single operation may build.
pub const MAX_VALUE_LEN: usize = 10_000_000;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const UNITLESS_STYLES: &[&str] = &[
    "flex", "flexGrow", "flexShrink", "fontWeight", "lineHeight", "opacity", "order", "zIndex",
    "zoom",
];

/// Rendered output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    /// Text node
    Text(String),
    /// Intrinsic element
    Tag {
        /// Tag name
        name: String,
        /// HTML attributes in source order
        attributes: Vec<(String, String)>,
        /// Child nodes
        children: Vec<Element>,
    },
    /// Several siblings without a wrapper
    Fragment(Vec<Element>),
    /// Nothing was rendered
    Empty,
}

impl Element {
    /// Serialize as HTML with text and attribute values escaped.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Element::Text(text) => escape_into(out, text, false),
            Element::Tag {
                name,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    let _ = write!(out, " {key}=\"");
                    escape_into(out, value, true);
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&name.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{name}>");
            }
            Element::Fragment(children) => {
                for child in children {
                    child.write_html(out);
                }
            }
            Element::Empty => {}
        }
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        match self {
            Element::Text(text) => text.clone(),
            Element::Tag { children, .. } | Element::Fragment(children) => {
                children.iter().map(Element::text).collect()
            }
            Element::Empty => String::new(),
        }
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// An invokable component produced by a transform.
///
/// Two factories are equal when they were built from the same module and
/// entry, whatever their ids.
#[derive(Debug, Clone)]
pub struct ComponentFactory {
    id: Uuid,
    entry: String,
    module: Arc<Module>,
}

impl PartialEq for ComponentFactory {
    fn eq(&self, other: &Self) -> bool {
        self.entry == other.entry && self.module == other.module
    }
}

impl ComponentFactory {
    /// Factory rendering the binding `entry` of `module`.
    pub fn new(entry: impl Into<String>, module: Arc<Module>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry: entry.into(),
            module,
        }
    }

    /// Unique id of this factory instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Local name of the rendered binding.
    pub fn name(&self) -> &str {
        &self.entry
    }

    /// Parsed module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Render with `props`.
    pub fn render(&self, props: &serde_json::Value) -> Result<Element, RenderError> {
        let mut renderer = Renderer::new(&self.module);
        renderer.load_module()?;
        let component = renderer.lookup(MODULE_SCOPE, &self.entry)?;
        let value = match component {
            JsValue::Function(_) => renderer.call(&component, vec![JsValue::from_json(props)])?,
            other => other,
        };
        let element = renderer.to_element(value)?;
        debug!(
            factory = %self.id,
            component = %self.entry,
            steps = renderer.steps,
            "component rendered"
        );
        Ok(element)
    }
}

// ---- values -------------------------------------------------------------

#[derive(Debug, Clone)]
enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<Vec<JsValue>>),
    Object(Rc<Vec<(String, JsValue)>>),
    Function(Rc<Callable>),
    Node(Element),
}

#[derive(Debug)]
enum Callable {
    Closure { func: Arc<Function>, scope: usize },
    Native(Native),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Native {
    UseState,
    UseReducer,
    UseEffect,
    UseMemo,
    UseCallback,
    UseRef,
    UseContext,
    Noop,
    String,
    Number,
    Boolean,
    ParseInt,
    ParseFloat,
    JsonStringify,
    MathMax,
    MathMin,
    MathRound,
    MathFloor,
    MathCeil,
    MathAbs,
    ArrayIsArray,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
}

impl JsValue {
    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Bool(*b),
            serde_json::Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => JsValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                JsValue::Array(Rc::new(items.iter().map(JsValue::from_json).collect()))
            }
            serde_json::Value::Object(map) => JsValue::Object(Rc::new(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsValue::from_json(v)))
                    .collect(),
            )),
        }
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            JsValue::Undefined | JsValue::Function(_) => return None,
            JsValue::Null | JsValue::Node(_) => serde_json::Value::Null,
            JsValue::Bool(b) => serde_json::Value::Bool(*b),
            JsValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            JsValue::Str(s) => serde_json::Value::String(s.clone()),
            JsValue::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json().unwrap_or(serde_json::Value::Null))
                    .collect(),
            ),
            JsValue::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .filter_map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect(),
            ),
        })
    }

    fn native(native: Native) -> Self {
        JsValue::Function(Rc::new(Callable::Native(native)))
    }

    fn object(entries: Vec<(&str, JsValue)>) -> Self {
        JsValue::Object(Rc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        ))
    }

    fn truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::Str(_) => "string",
            JsValue::Function(_) => "function",
            _ => "object",
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Bool(b) => f64::from(u8::from(*b)),
            JsValue::Number(n) => *n,
            JsValue::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            JsValue::Array(items) if items.is_empty() => 0.0,
            JsValue::Array(items) if items.len() == 1 => items[0].to_number(),
            _ => f64::NAN,
        }
    }

    fn to_display(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Number(n) => number_to_string(*n),
            JsValue::Str(s) => s.clone(),
            JsValue::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            JsValue::Function(_) => "function".to_string(),
            JsValue::Object(_) | JsValue::Node(_) => "[object Object]".to_string(),
        }
    }

    fn describe(&self) -> String {
        match self {
            JsValue::Str(s) => format!("\"{s}\""),
            JsValue::Array(_) => "array".to_string(),
            JsValue::Object(_) | JsValue::Node(_) => "object".to_string(),
            other => other.to_display(),
        }
    }
}

/// Format a number the way JavaScript's `String(n)` does for common values.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn strict_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
        (JsValue::Bool(x), JsValue::Bool(y)) => x == y,
        (JsValue::Number(x), JsValue::Number(y)) => x == y,
        (JsValue::Str(x), JsValue::Str(y)) => x == y,
        (JsValue::Array(x), JsValue::Array(y)) => Rc::ptr_eq(x, y),
        (JsValue::Object(x), JsValue::Object(y)) => Rc::ptr_eq(x, y),
        (JsValue::Function(x), JsValue::Function(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

fn loose_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() && y.is_nullish() => true,
        (x, y) if x.is_nullish() || y.is_nullish() => false,
        (JsValue::Number(_) | JsValue::Str(_) | JsValue::Bool(_), JsValue::Number(_))
        | (JsValue::Number(_), JsValue::Str(_) | JsValue::Bool(_))
        | (JsValue::Bool(_), JsValue::Str(_))
        | (JsValue::Str(_), JsValue::Bool(_)) => a.to_number() == b.to_number(),
        _ => strict_equals(a, b),
    }
}

fn set_entry(entries: &mut Vec<(String, JsValue)>, key: String, value: JsValue) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn style_to_css(entries: &[(String, JsValue)]) -> String {
    entries
        .iter()
        .filter(|(_, value)| !value.is_nullish() && !matches!(value, JsValue::Bool(_)))
        .map(|(key, value)| {
            let value = match value {
                JsValue::Number(n) if *n != 0.0 && !UNITLESS_STYLES.contains(&key.as_str()) => {
                    format!("{}px", number_to_string(*n))
                }
                other => other.to_display(),
            };
            format!("{}:{}", camel_to_kebab(key), value)
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn global(name: &str) -> Option<JsValue> {
    let hook = |name: &str| match name {
        "useState" => Some(Native::UseState),
        "useReducer" => Some(Native::UseReducer),
        "useEffect" | "useLayoutEffect" => Some(Native::UseEffect),
        "useMemo" => Some(Native::UseMemo),
        "useCallback" => Some(Native::UseCallback),
        "useRef" => Some(Native::UseRef),
        "useContext" => Some(Native::UseContext),
        _ => None,
    };
    if let Some(native) = hook(name) {
        return Some(JsValue::native(native));
    }
    Some(match name {
        "React" => JsValue::object(
            [
                "useState",
                "useReducer",
                "useEffect",
                "useLayoutEffect",
                "useMemo",
                "useCallback",
                "useRef",
                "useContext",
            ]
            .into_iter()
            .filter_map(|name| hook(name).map(|native| (name, JsValue::native(native))))
            .collect(),
        ),
        "Math" => JsValue::object(vec![
            ("PI", JsValue::Number(std::f64::consts::PI)),
            ("max", JsValue::native(Native::MathMax)),
            ("min", JsValue::native(Native::MathMin)),
            ("round", JsValue::native(Native::MathRound)),
            ("floor", JsValue::native(Native::MathFloor)),
            ("ceil", JsValue::native(Native::MathCeil)),
            ("abs", JsValue::native(Native::MathAbs)),
        ]),
        "JSON" => JsValue::object(vec![("stringify", JsValue::native(Native::JsonStringify))]),
        "Array" => JsValue::object(vec![("isArray", JsValue::native(Native::ArrayIsArray))]),
        "Object" => JsValue::object(vec![
            ("keys", JsValue::native(Native::ObjectKeys)),
            ("values", JsValue::native(Native::ObjectValues)),
            ("entries", JsValue::native(Native::ObjectEntries)),
        ]),
        "console" => JsValue::object(vec![
            ("log", JsValue::native(Native::Noop)),
            ("warn", JsValue::native(Native::Noop)),
            ("error", JsValue::native(Native::Noop)),
        ]),
        "String" => JsValue::native(Native::String),
        "Number" => JsValue::native(Native::Number),
        "Boolean" => JsValue::native(Native::Boolean),
        "parseInt" => JsValue::native(Native::ParseInt),
        "parseFloat" => JsValue::native(Native::ParseFloat),
        "NaN" => JsValue::Number(f64::NAN),
        "Infinity" => JsValue::Number(f64::INFINITY),
        _ => return None,
    })
}

// ---- evaluation ---------------------------------------------------------

const MODULE_SCOPE: usize = 0;

struct Scope {
    vars: HashMap<String, JsValue>,
    parent: Option<usize>,
}

/// Scopes live in an arena indexed by closures, so captured environments
/// never form reference cycles and are freed with the renderer.
struct Renderer<'m> {
    module: &'m Module,
    scopes: Vec<Scope>,
    steps: usize,
    depth: usize,
}

type Eval<T> = Result<T, RenderError>;

fn type_error(message: impl Into<String>) -> RenderError {
    RenderError::Type(message.into())
}

fn check_string_len(len: usize) -> Eval<()> {
    if len > MAX_VALUE_LEN {
        return Err(RenderError::Range("Invalid string length".into()));
    }
    Ok(())
}

impl<'m> Renderer<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            scopes: vec![Scope {
                vars: HashMap::new(),
                parent: None,
            }],
            steps: 0,
            depth: 0,
        }
    }

    fn load_module(&mut self) -> Eval<()> {
        let module = self.module;
        for item in &module.items {
            if let Item::Function(func) = item {
                self.declare_function(MODULE_SCOPE, func);
            }
        }
        for item in &module.items {
            if let Item::Const { pattern, value } = item {
                let value = self.eval(MODULE_SCOPE, value)?;
                self.bind(MODULE_SCOPE, pattern, value)?;
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Eval<()> {
        self.steps += 1;
        if self.steps > MAX_RENDER_STEPS {
            return Err(RenderError::StepLimit(MAX_RENDER_STEPS));
        }
        Ok(())
    }

    fn push_scope(&mut self, parent: usize) -> usize {
        self.scopes.push(Scope {
            vars: HashMap::new(),
            parent: Some(parent),
        });
        self.scopes.len() - 1
    }

    fn declare(&mut self, scope: usize, name: &str, value: JsValue) {
        self.scopes[scope].vars.insert(name.to_string(), value);
    }

    fn declare_function(&mut self, scope: usize, func: &Arc<Function>) {
        if let Some(name) = &func.name {
            let closure = JsValue::Function(Rc::new(Callable::Closure {
                func: func.clone(),
                scope,
            }));
            self.declare(scope, name, closure);
        }
    }

    fn resolve(&self, scope: usize, name: &str) -> Option<JsValue> {
        let mut current = Some(scope);
        while let Some(idx) = current {
            if let Some(value) = self.scopes[idx].vars.get(name) {
                return Some(value.clone());
            }
            current = self.scopes[idx].parent;
        }
        global(name)
    }

    fn lookup(&self, scope: usize, name: &str) -> Eval<JsValue> {
        self.resolve(scope, name)
            .ok_or_else(|| RenderError::Reference(name.to_string()))
    }

    fn bind(&mut self, scope: usize, pattern: &Pattern, value: JsValue) -> Eval<()> {
        match pattern {
            Pattern::Ident(name) => self.declare(scope, name, value),
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot destructure properties of {}",
                        value.to_display()
                    )));
                }
                for prop in props {
                    let mut field = property(&value, &prop.key);
                    if matches!(field, JsValue::Undefined) {
                        if let Some(default) = &prop.default {
                            field = self.eval(scope, default)?;
                        }
                    }
                    self.declare(scope, &prop.local, field);
                }
                if let Some(rest) = rest {
                    let remaining = match &value {
                        JsValue::Object(entries) => entries
                            .iter()
                            .filter(|(key, _)| props.iter().all(|p| p.key != *key))
                            .cloned()
                            .collect(),
                        _ => Vec::new(),
                    };
                    self.declare(scope, rest, JsValue::Object(Rc::new(remaining)));
                }
            }
            Pattern::Array(slots) => {
                let JsValue::Array(items) = &value else {
                    return Err(type_error(format!(
                        "{} is not iterable",
                        value.describe()
                    )));
                };
                for (idx, slot) in slots.iter().enumerate() {
                    if let Some(name) = slot {
                        let item = items.get(idx).cloned().unwrap_or(JsValue::Undefined);
                        self.declare(scope, name, item);
                    }
                }
            }
        }
        Ok(())
    }

    fn call(&mut self, callee: &JsValue, args: Vec<JsValue>) -> Eval<JsValue> {
        let JsValue::Function(callable) = callee else {
            return Err(type_error(format!("{} is not a function", callee.describe())));
        };
        match &**callable {
            Callable::Native(native) => self.call_native(*native, args),
            Callable::Closure { func, scope } => {
                if self.depth >= MAX_RENDER_DEPTH {
                    return Err(RenderError::DepthExceeded(MAX_RENDER_DEPTH));
                }
                self.depth += 1;
                let result = self.invoke(func.clone(), *scope, args);
                self.depth -= 1;
                result
            }
        }
    }

    fn invoke(&mut self, func: Arc<Function>, parent: usize, args: Vec<JsValue>) -> Eval<JsValue> {
        let scope = self.push_scope(parent);
        let mut args = args.into_iter();
        for param in &func.params {
            let mut value = args.next().unwrap_or(JsValue::Undefined);
            if matches!(value, JsValue::Undefined) {
                if let Some(default) = &param.default {
                    value = self.eval(scope, default)?;
                }
            }
            self.bind(scope, &param.pattern, value)?;
        }
        match &func.body {
            Body::Expr(expr) => self.eval(scope, expr),
            Body::Block(stmts) => Ok(self.exec_block(scope, stmts)?.unwrap_or(JsValue::Undefined)),
        }
    }

    fn exec_block(&mut self, scope: usize, stmts: &[Stmt]) -> Eval<Option<JsValue>> {
        for stmt in stmts {
            if let Stmt::Function(func) = stmt {
                self.declare_function(scope, func);
            }
        }
        for stmt in stmts {
            self.tick()?;
            match stmt {
                Stmt::Let { pattern, init } => {
                    let value = match init {
                        Some(init) => self.eval(scope, init)?,
                        None => JsValue::Undefined,
                    };
                    self.bind(scope, pattern, value)?;
                }
                Stmt::Function(_) => {}
                Stmt::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(scope, expr)?,
                        None => JsValue::Undefined,
                    };
                    return Ok(Some(value));
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if self.eval(scope, cond)?.truthy() {
                        then
                    } else {
                        otherwise
                    };
                    let inner = self.push_scope(scope);
                    if let Some(value) = self.exec_block(inner, branch)? {
                        return Ok(Some(value));
                    }
                }
                Stmt::Expr(expr) => {
                    self.eval(scope, expr)?;
                }
            }
        }
        Ok(None)
    }

    fn eval(&mut self, scope: usize, expr: &Expr) -> Eval<JsValue> {
        self.tick()?;
        Ok(match expr {
            Expr::Undefined => JsValue::Undefined,
            Expr::Null => JsValue::Null,
            Expr::Bool(b) => JsValue::Bool(*b),
            Expr::Number(n) => JsValue::Number(*n),
            Expr::Str(s) => JsValue::Str(s.clone()),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Lit(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            out.push_str(&self.eval(scope, expr)?.to_display())
                        }
                    }
                    check_string_len(out.len())?;
                }
                JsValue::Str(out)
            }
            Expr::Ident(name) => self.lookup(scope, name)?,
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(scope, item)?);
                }
                JsValue::Array(Rc::new(values))
            }
            Expr::Object(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        ObjectEntry::Prop(key, value) => {
                            let value = self.eval(scope, value)?;
                            set_entry(&mut out, key.clone(), value);
                        }
                        ObjectEntry::Spread(expr) => {
                            if let JsValue::Object(spread) = self.eval(scope, expr)? {
                                for (key, value) in spread.iter() {
                                    set_entry(&mut out, key.clone(), value.clone());
                                }
                            }
                        }
                    }
                }
                JsValue::Object(Rc::new(out))
            }
            Expr::Member {
                object,
                property: name,
                optional,
            } => {
                let target = self.eval(scope, object)?;
                if target.is_nullish() {
                    if *optional {
                        return Ok(JsValue::Undefined);
                    }
                    return Err(type_error(format!(
                        "Cannot read properties of {} (reading '{name}')",
                        target.to_display()
                    )));
                }
                property(&target, name)
            }
            Expr::Index { object, index } => {
                let target = self.eval(scope, object)?;
                let key = self.eval(scope, index)?;
                if target.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot read properties of {} (reading '{}')",
                        target.to_display(),
                        key.to_display()
                    )));
                }
                property(&target, &key.to_display())
            }
            Expr::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                if let Expr::Member {
                    object,
                    property: name,
                    optional,
                } = &**callee
                {
                    let target = self.eval(scope, object)?;
                    if target.is_nullish() {
                        if *optional {
                            return Ok(JsValue::Undefined);
                        }
                        return Err(type_error(format!(
                            "Cannot read properties of {} (reading '{name}')",
                            target.to_display()
                        )));
                    }
                    for arg in args {
                        values.push(self.eval(scope, arg)?);
                    }
                    return self.call_method(target, name, values);
                }
                let function = self.eval(scope, callee)?;
                for arg in args {
                    values.push(self.eval(scope, arg)?);
                }
                self.call(&function, values)?
            }
            Expr::Arrow(func) => JsValue::Function(Rc::new(Callable::Closure {
                func: func.clone(),
                scope,
            })),
            Expr::Unary { op, operand } => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, &**operand) {
                    let kind = self
                        .resolve(scope, name)
                        .map_or("undefined", |value| value.type_of());
                    return Ok(JsValue::Str(kind.to_string()));
                }
                let value = self.eval(scope, operand)?;
                match op {
                    UnaryOp::Not => JsValue::Bool(!value.truthy()),
                    UnaryOp::Neg => JsValue::Number(-value.to_number()),
                    UnaryOp::Plus => JsValue::Number(value.to_number()),
                    UnaryOp::TypeOf => JsValue::Str(value.type_of().to_string()),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(scope, left)?;
                let right = self.eval(scope, right)?;
                binary(*op, &left, &right)?
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(scope, left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    left
                } else {
                    self.eval(scope, right)?
                }
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(scope, cond)?.truthy() {
                    self.eval(scope, then)?
                } else {
                    self.eval(scope, otherwise)?
                }
            }
            Expr::Element(element) => JsValue::Node(self.render_element(scope, element)?),
        })
    }

    // ---- JSX ------------------------------------------------------------

    fn render_element(&mut self, scope: usize, element: &JsxElement) -> Eval<Element> {
        let mut props: Vec<(String, JsValue)> = Vec::new();
        for attribute in &element.attributes {
            match attribute {
                JsxAttribute::Named { name, value } => {
                    let value = match value {
                        Some(expr) => self.eval(scope, expr)?,
                        None => JsValue::Bool(true),
                    };
                    set_entry(&mut props, name.clone(), value);
                }
                JsxAttribute::Spread(expr) => {
                    if let JsValue::Object(spread) = self.eval(scope, expr)? {
                        for (key, value) in spread.iter() {
                            set_entry(&mut props, key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        let mut children = Vec::with_capacity(element.children.len());
        for child in &element.children {
            children.push(match child {
                JsxChild::Text(text) => JsValue::Str(text.clone()),
                JsxChild::Expr(expr) => self.eval(scope, expr)?,
            });
        }

        let name = match element.name.as_deref() {
            None | Some("Fragment") | Some("React.Fragment") => {
                return Ok(Element::Fragment(self.collect_children(children)?));
            }
            Some(name) => name,
        };

        if name.starts_with(|c: char| c.is_ascii_lowercase()) && !name.contains('.') {
            let attributes = intrinsic_attributes(&props);
            let children = self.collect_children(children)?;
            return Ok(Element::Tag {
                name: name.to_string(),
                attributes,
                children,
            });
        }

        let component = self.resolve_component(scope, name)?;
        match children.len() {
            0 => {}
            1 => set_entry(&mut props, "children".to_string(), children.remove(0)),
            _ => set_entry(
                &mut props,
                "children".to_string(),
                JsValue::Array(Rc::new(children)),
            ),
        }
        let rendered = self.call(&component, vec![JsValue::Object(Rc::new(props))])?;
        self.to_element(rendered)
    }

    fn resolve_component(&mut self, scope: usize, name: &str) -> Eval<JsValue> {
        let mut segments = name.split('.');
        let head = segments.next().unwrap_or_default();
        let mut value = self
            .resolve(scope, head)
            .ok_or_else(|| RenderError::UnknownComponent(name.to_string()))?;
        for segment in segments {
            value = property(&value, segment);
        }
        match value {
            JsValue::Function(_) => Ok(value),
            JsValue::Undefined => Err(RenderError::UnknownComponent(name.to_string())),
            other => Err(type_error(format!(
                "<{name}> is {}, not a component",
                other.describe()
            ))),
        }
    }

    fn collect_children(&mut self, values: Vec<JsValue>) -> Eval<Vec<Element>> {
        let mut out = Vec::new();
        for value in values {
            self.flatten_into(value, &mut out)?;
        }
        Ok(out)
    }

    fn flatten_into(&mut self, value: JsValue, out: &mut Vec<Element>) -> Eval<()> {
        match value {
            JsValue::Undefined | JsValue::Null | JsValue::Bool(_) | JsValue::Function(_) => {}
            JsValue::Number(n) => out.push(Element::Text(number_to_string(n))),
            JsValue::Str(s) => out.push(Element::Text(s)),
            JsValue::Node(Element::Empty) => {}
            JsValue::Node(element) => out.push(element),
            JsValue::Array(items) => {
                for item in items.iter() {
                    self.tick()?;
                    self.flatten_into(item.clone(), out)?;
                }
            }
            JsValue::Object(_) => {
                return Err(type_error("Objects are not valid as a React child"));
            }
        }
        Ok(())
    }

    fn to_element(&mut self, value: JsValue) -> Eval<Element> {
        let mut nodes = Vec::new();
        self.flatten_into(value, &mut nodes)?;
        Ok(match nodes.len() {
            0 => Element::Empty,
            1 => nodes.remove(0),
            _ => Element::Fragment(nodes),
        })
    }

    // ---- builtins -------------------------------------------------------

    fn call_native(&mut self, native: Native, args: Vec<JsValue>) -> Eval<JsValue> {
        let arg = |idx: usize| args.get(idx).cloned().unwrap_or(JsValue::Undefined);
        let numbers = || args.iter().map(JsValue::to_number);
        Ok(match native {
            Native::UseState => {
                let initial = match arg(0) {
                    JsValue::Function(_) => self.call(&arg(0), Vec::new())?,
                    other => other,
                };
                JsValue::Array(Rc::new(vec![initial, JsValue::native(Native::Noop)]))
            }
            Native::UseReducer => {
                JsValue::Array(Rc::new(vec![arg(1), JsValue::native(Native::Noop)]))
            }
            Native::UseEffect | Native::UseContext | Native::Noop => JsValue::Undefined,
            Native::UseMemo => self.call(&arg(0), Vec::new())?,
            Native::UseCallback => arg(0),
            Native::UseRef => JsValue::object(vec![("current", arg(0))]),
            Native::String => JsValue::Str(if args.is_empty() {
                String::new()
            } else {
                arg(0).to_display()
            }),
            Native::Number => JsValue::Number(if args.is_empty() {
                0.0
            } else {
                arg(0).to_number()
            }),
            Native::Boolean => JsValue::Bool(arg(0).truthy()),
            Native::ParseInt => {
                let text = arg(0).to_display();
                let trimmed = text.trim_start();
                let end = trimmed
                    .char_indices()
                    .find(|&(idx, c)| !(c.is_ascii_digit() || (idx == 0 && (c == '-' || c == '+'))))
                    .map_or(trimmed.len(), |(idx, _)| idx);
                JsValue::Number(trimmed[..end].parse::<i64>().map_or(f64::NAN, |n| n as f64))
            }
            Native::ParseFloat => {
                JsValue::Number(arg(0).to_display().trim().parse().unwrap_or(f64::NAN))
            }
            Native::JsonStringify => match arg(0).to_json() {
                Some(json) => JsValue::Str(json.to_string()),
                None => JsValue::Undefined,
            },
            Native::MathMax => JsValue::Number(numbers().fold(f64::NEG_INFINITY, f64::max)),
            Native::MathMin => JsValue::Number(numbers().fold(f64::INFINITY, f64::min)),
            Native::MathRound => JsValue::Number((arg(0).to_number() + 0.5).floor()),
            Native::MathFloor => JsValue::Number(arg(0).to_number().floor()),
            Native::MathCeil => JsValue::Number(arg(0).to_number().ceil()),
            Native::MathAbs => JsValue::Number(arg(0).to_number().abs()),
            Native::ArrayIsArray => JsValue::Bool(matches!(arg(0), JsValue::Array(_))),
            Native::ObjectKeys | Native::ObjectValues | Native::ObjectEntries => {
                let entries = match arg(0) {
                    JsValue::Object(entries) => entries,
                    _ => Rc::new(Vec::new()),
                };
                JsValue::Array(Rc::new(
                    entries
                        .iter()
                        .map(|(k, v)| match native {
                            Native::ObjectKeys => JsValue::Str(k.clone()),
                            Native::ObjectValues => v.clone(),
                            _ => JsValue::Array(Rc::new(vec![JsValue::Str(k.clone()), v.clone()])),
                        })
                        .collect(),
                ))
            }
        })
    }

    fn call_method(&mut self, target: JsValue, name: &str, args: Vec<JsValue>) -> Eval<JsValue> {
        match &target {
            JsValue::Array(items) => self.array_method(items.clone(), name, args),
            JsValue::Str(text) => string_method(text, name, &args),
            JsValue::Number(n) if name == "toFixed" => {
                let digits =
                    args.first().map_or(0.0, JsValue::to_number).clamp(0.0, 100.0) as usize;
                Ok(JsValue::Str(format!("{n:.digits$}")))
            }
            JsValue::Number(n) if name == "toString" => Ok(JsValue::Str(number_to_string(*n))),
            _ => {
                let method = property(&target, name);
                if matches!(method, JsValue::Undefined) {
                    return Err(type_error(format!(
                        "{}.{name} is not a function",
                        target.describe()
                    )));
                }
                self.call(&method, args)
            }
        }
    }

    fn array_method(
        &mut self,
        items: Rc<Vec<JsValue>>,
        name: &str,
        args: Vec<JsValue>,
    ) -> Eval<JsValue> {
        let arg = |idx: usize| args.get(idx).cloned().unwrap_or(JsValue::Undefined);
        let callback = arg(0);
        let each = |renderer: &mut Self, idx: usize, item: &JsValue| {
            renderer.call(
                &callback,
                vec![item.clone(), JsValue::Number(idx as f64), JsValue::Array(items.clone())],
            )
        };
        Ok(match name {
            "map" => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    out.push(each(self, idx, item)?);
                }
                JsValue::Array(Rc::new(out))
            }
            "filter" => {
                let mut out = Vec::new();
                for (idx, item) in items.iter().enumerate() {
                    if each(self, idx, item)?.truthy() {
                        out.push(item.clone());
                    }
                }
                JsValue::Array(Rc::new(out))
            }
            "find" => {
                for (idx, item) in items.iter().enumerate() {
                    if each(self, idx, item)?.truthy() {
                        return Ok(item.clone());
                    }
                }
                JsValue::Undefined
            }
            "some" | "every" => {
                let want = name == "some";
                for (idx, item) in items.iter().enumerate() {
                    if each(self, idx, item)?.truthy() == want {
                        return Ok(JsValue::Bool(want));
                    }
                }
                JsValue::Bool(!want)
            }
            "forEach" => {
                for (idx, item) in items.iter().enumerate() {
                    each(self, idx, item)?;
                }
                JsValue::Undefined
            }
            "reduce" => {
                let mut iter = items.iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(type_error("Reduce of empty array with no initial value"));
                        }
                    },
                };
                for (idx, item) in iter {
                    acc = self.call(
                        &callback,
                        vec![acc, item.clone(), JsValue::Number(idx as f64)],
                    )?;
                }
                acc
            }
            "join" => {
                let separator = match args.first() {
                    None | Some(JsValue::Undefined) => ",".to_string(),
                    Some(sep) => sep.to_display(),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.to_display()
                        }
                    })
                    .collect();
                let total = parts
                    .iter()
                    .fold(0usize, |total, part| total.saturating_add(part.len()))
                    .saturating_add(separator.len().saturating_mul(parts.len().saturating_sub(1)));
                check_string_len(total)?;
                JsValue::Str(parts.join(&separator))
            }
            "includes" => JsValue::Bool(items.iter().any(|item| strict_equals(item, &callback))),
            "indexOf" => JsValue::Number(
                items
                    .iter()
                    .position(|item| strict_equals(item, &callback))
                    .map_or(-1.0, |idx| idx as f64),
            ),
            "slice" => {
                let (start, end) = slice_bounds(items.len(), &args);
                JsValue::Array(Rc::new(items[start..end].to_vec()))
            }
            "concat" => {
                let mut out = (*items).clone();
                for arg in args {
                    match arg {
                        JsValue::Array(more) => out.extend(more.iter().cloned()),
                        other => out.push(other),
                    }
                    if out.len() > MAX_VALUE_LEN {
                        return Err(RenderError::Range("Invalid array length".into()));
                    }
                }
                JsValue::Array(Rc::new(out))
            }
            "reverse" => JsValue::Array(Rc::new(items.iter().rev().cloned().collect())),
            _ => {
                return Err(type_error(format!("array.{name} is not a function")));
            }
        })
    }
}

fn slice_bounds(len: usize, args: &[JsValue]) -> (usize, usize) {
    let clamp = |value: Option<&JsValue>, default: usize| match value {
        None | Some(JsValue::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                len.saturating_sub((-n) as usize)
            } else {
                (n as usize).min(len)
            }
        }
    };
    let start = clamp(args.first(), 0);
    let end = clamp(args.get(1), len);
    (start, end.max(start))
}

fn string_method(text: &str, name: &str, args: &[JsValue]) -> Eval<JsValue> {
    let arg_text = |idx: usize| args.get(idx).map(JsValue::to_display).unwrap_or_default();
    Ok(match name {
        "toUpperCase" => JsValue::Str(text.to_uppercase()),
        "toLowerCase" => JsValue::Str(text.to_lowercase()),
        "trim" => JsValue::Str(text.trim().to_string()),
        "includes" => JsValue::Bool(text.contains(&arg_text(0))),
        "startsWith" => JsValue::Bool(text.starts_with(&arg_text(0))),
        "endsWith" => JsValue::Bool(text.ends_with(&arg_text(0))),
        "indexOf" => JsValue::Number(
            text.find(&arg_text(0))
                .map_or(-1.0, |byte| text[..byte].chars().count() as f64),
        ),
        "split" => {
            let parts: Vec<JsValue> = match args.first() {
                None | Some(JsValue::Undefined) => vec![JsValue::Str(text.to_string())],
                Some(sep) => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        text.chars().map(|c| JsValue::Str(c.to_string())).collect()
                    } else {
                        text.split(sep.as_str())
                            .map(|part| JsValue::Str(part.to_string()))
                            .collect()
                    }
                }
            };
            JsValue::Array(Rc::new(parts))
        }
        "slice" | "substring" => {
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = slice_bounds(chars.len(), args);
            JsValue::Str(chars[start..end].iter().collect())
        }
        "charAt" => {
            let idx = args.first().map_or(0.0, JsValue::to_number) as usize;
            JsValue::Str(text.chars().nth(idx).map(String::from).unwrap_or_default())
        }
        "replace" => JsValue::Str(text.replacen(&arg_text(0), &arg_text(1), 1)),
        "replaceAll" => {
            let (old, new) = (arg_text(0), arg_text(1));
            let hits = if old.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(old.as_str()).count()
            };
            check_string_len(text.len().saturating_add(hits.saturating_mul(new.len())))?;
            JsValue::Str(text.replace(&old, &new))
        }
        "repeat" => {
            let count = args.first().map_or(0.0, JsValue::to_number);
            if !(0.0..=10_000.0).contains(&count) {
                return Err(RenderError::Range("Invalid count value".into()));
            }
            check_string_len(text.len().saturating_mul(count as usize))?;
            JsValue::Str(text.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let width = args.first().map_or(0.0, JsValue::to_number).max(0.0);
            if width > MAX_VALUE_LEN as f64 {
                return Err(RenderError::Range("Invalid string length".into()));
            }
            let width = width as usize;
            let fill = match args.get(1) {
                None | Some(JsValue::Undefined) => " ".to_string(),
                Some(fill) => fill.to_display(),
            };
            let len = text.chars().count();
            if len >= width || fill.is_empty() {
                JsValue::Str(text.to_string())
            } else {
                let padding: String = fill.chars().cycle().take(width - len).collect();
                JsValue::Str(if name == "padStart" {
                    padding + text
                } else {
                    text.to_string() + &padding
                })
            }
        }
        "toString" => JsValue::Str(text.to_string()),
        _ => return Err(type_error(format!("string.{name} is not a function"))),
    })
}

fn property(target: &JsValue, name: &str) -> JsValue {
    match target {
        JsValue::Object(entries) => entries
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or(JsValue::Undefined),
        JsValue::Array(items) => match name {
            "length" => JsValue::Number(items.len() as f64),
            _ => name
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx).cloned())
                .unwrap_or(JsValue::Undefined),
        },
        JsValue::Str(text) => match name {
            "length" => JsValue::Number(text.chars().count() as f64),
            _ => name
                .parse::<usize>()
                .ok()
                .and_then(|idx| text.chars().nth(idx))
                .map_or(JsValue::Undefined, |c| JsValue::Str(c.to_string())),
        },
        _ => JsValue::Undefined,
    }
}

fn binary(op: BinaryOp, left: &JsValue, right: &JsValue) -> Eval<JsValue> {
    let numeric = |f: fn(f64, f64) -> f64| JsValue::Number(f(left.to_number(), right.to_number()));
    let compare = |f: fn(std::cmp::Ordering) -> bool| {
        if let (JsValue::Str(a), JsValue::Str(b)) = (left, right) {
            return JsValue::Bool(f(a.cmp(b)));
        }
        JsValue::Bool(
            left.to_number()
                .partial_cmp(&right.to_number())
                .is_some_and(f),
        )
    };
    Ok(match op {
        BinaryOp::Add => match (left, right) {
            (
                JsValue::Number(_) | JsValue::Bool(_) | JsValue::Null | JsValue::Undefined,
                JsValue::Number(_) | JsValue::Bool(_) | JsValue::Null | JsValue::Undefined,
            ) => numeric(|a, b| a + b),
            _ => {
                let (left, right) = (left.to_display(), right.to_display());
                check_string_len(left.len().saturating_add(right.len()))?;
                JsValue::Str(left + &right)
            }
        },
        BinaryOp::Sub => numeric(|a, b| a - b),
        BinaryOp::Mul => numeric(|a, b| a * b),
        BinaryOp::Div => numeric(|a, b| a / b),
        BinaryOp::Rem => numeric(|a, b| a % b),
        BinaryOp::StrictEq => JsValue::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => JsValue::Bool(!strict_equals(left, right)),
        BinaryOp::LooseEq => JsValue::Bool(loose_equals(left, right)),
        BinaryOp::LooseNe => JsValue::Bool(!loose_equals(left, right)),
        BinaryOp::Lt => compare(|o| o.is_lt()),
        BinaryOp::Gt => compare(|o| o.is_gt()),
        BinaryOp::Le => compare(|o| o.is_le()),
        BinaryOp::Ge => compare(|o| o.is_ge()),
    })
}

fn intrinsic_attributes(props: &[(String, JsValue)]) -> Vec<(String, String)> {
    props
        .iter()
        .filter_map(|(key, value)| {
            if matches!(key.as_str(), "key" | "ref" | "children" | "dangerouslySetInnerHTML") {
                return None;
            }
            let name = match key.as_str() {
                "className" => "class".to_string(),
                "htmlFor" => "for".to_string(),
                other => other.to_string(),
            };
            let value = match value {
                JsValue::Undefined
                | JsValue::Null
                | JsValue::Bool(false)
                | JsValue::Function(_) => return None,
                JsValue::Bool(true) => String::new(),
                JsValue::Object(entries) if name == "style" => style_to_css(entries),
                other => other.to_display(),
            };
            Some((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::component::jsx::JsxTransform;
    use crate::component::Transform;

    fn render(source: &str, props: serde_json::Value) -> Result<Element, RenderError> {
        JsxTransform
            .transform(source, None)
            .expect("source should transform")
            .render(&props)
    }

    fn html(source: &str, props: serde_json::Value) -> String {
        render(source, props).expect("render should succeed").to_html()
    }

    #[test]
    fn test_props_are_rendered() {
        let out = html(
            "export default function Greeting({ name, excited = false }) {
                return <h1 className=\"title\">Hello, {name}{excited ? '!' : '.'}</h1>;
            }",
            json!({ "name": "Ada" }),
        );
        assert_eq!(out, "<h1 class=\"title\">Hello, Ada.</h1>");
    }

    #[test]
    fn test_nested_components_receive_children() {
        let out = html(
            "const Card = ({ title, children }) => <section><h2>{title}</h2>{children}</section>;
             export default function App() {
               return <Card title=\"Box\"><p>inside</p></Card>;
             }",
            json!({}),
        );
        assert_eq!(out, "<section><h2>Box</h2><p>inside</p></section>");
    }

    #[test]
    fn test_lists_and_conditionals() {
        let out = html(
            "export default ({ items, show }) => (
               <ul>
                 {items.map((item, i) => <li key={i}>{i + 1}. {item.toUpperCase()}</li>)}
                 {show && <li>extra</li>}
               </ul>
             );",
            json!({ "items": ["a", "b"], "show": false }),
        );
        assert_eq!(out, "<ul><li>1. A</li><li>2. B</li></ul>");
    }

    #[test]
    fn test_intrinsic_attribute_mapping() {
        let out = html(
            "export default () => <label htmlFor=\"x\" style={{ fontSize: 12, opacity: 0.5 }} onClick={() => 1} hidden={false}>hi</label>;",
            json!({}),
        );
        assert_eq!(
            out,
            "<label for=\"x\" style=\"font-size:12px;opacity:0.5\">hi</label>"
        );
    }

    #[test]
    fn test_text_is_escaped_and_void_tags_close() {
        let out = html(
            "export default ({ text }) => <div title={text}>{text}<br/></div>;",
            json!({ "text": "<b>\"x\" & y</b>" }),
        );
        assert_eq!(
            out,
            "<div title=\"&lt;b&gt;&quot;x&quot; &amp; y&lt;/b&gt;\">&lt;b&gt;\"x\" &amp; y&lt;/b&gt;<br></div>"
        );
    }

    #[test]
    fn test_hooks_use_initial_values() {
        let out = html(
            "import { useState } from 'react';
             export default function Counter({ start }) {
               const [count, setCount] = useState(start);
               const label = React.useMemo(() => `Count: ${count}`, [count]);
               useEffect(() => { setCount(count + 1); }, []);
               return <button onClick={() => setCount(count + 1)}>{label}</button>;
             }",
            json!({ "start": 3 }),
        );
        assert_eq!(out, "<button>Count: 3</button>");
    }

    #[test]
    fn test_render_errors() {
        assert_eq!(
            render("export default () => <Missing />;", json!({})),
            Err(RenderError::UnknownComponent("Missing".into()))
        );
        assert_eq!(
            render("export default () => <p>{nope}</p>;", json!({})),
            Err(RenderError::Reference("nope".into()))
        );
        assert_eq!(
            render("export default function Loop() { return <Loop />; }", json!({})),
            Err(RenderError::DepthExceeded(MAX_RENDER_DEPTH))
        );
        assert!(matches!(
            render("export default ({ user }) => <p>{user.name}</p>;", json!({})),
            Err(RenderError::Type(_))
        ));
    }

    #[test]
    fn test_oversized_strings_are_range_errors() {
        let too_long = |source| matches!(render(source, json!({})), Err(RenderError::Range(_)));
        assert!(too_long("export default () => <p>{'a'.padStart(1e15)}</p>;"));
        assert!(too_long("export default () => <p>{'ab'.repeat(10000).repeat(10000)}</p>;"));
        assert!(too_long(
            "export default () => { const s = 'x'.repeat(5000).repeat(2000); return <p>{s + s}</p>; };"
        ));
        assert!(too_long("export default () => <p>{'x'.repeat(-1)}</p>;"));
        assert_eq!(
            html("export default () => <p>{'7'.padStart(3, '0')}</p>;", json!({})),
            "<p>007</p>"
        );
    }

    #[test]
    fn test_factory_equality_ignores_id() {
        let source = "export default () => <p/>;";
        let a = JsxTransform.transform(source, None).unwrap();
        let b = JsxTransform.transform(source, None).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
        assert_eq!(a.render(&json!({})).unwrap(), b.render(&json!({})).unwrap());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.5), "-0.5");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }
}
