use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::ast::FunctionDef;
use super::builtins::Builtin;
use super::runtime::Stream;
use super::{Result, ScriptError};

/// Shared, mutable list storage (Python lists alias on assignment).
pub type ListRef = Rc<RefCell<Vec<Value>>>;
/// Shared, mutable dict storage; insertion ordered.
pub type DictRef = Rc<RefCell<Vec<(Value, Value)>>>;

/// Runtime value of the guest language.
#[derive(Debug, Clone)]
pub enum Value {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// IEEE double.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Mutable list.
    List(ListRef),
    /// Immutable tuple.
    Tuple(Rc<Vec<Value>>),
    /// Mutable dict.
    Dict(DictRef),
    /// Lazy integer range.
    Range {
        /// First value.
        start: i64,
        /// Exclusive bound.
        stop: i64,
        /// Non-zero step.
        step: i64,
    },
    /// User-defined function with its evaluated defaults.
    Function(Rc<UserFunction>),
    /// Builtin function.
    Builtin(Builtin),
    /// Method bound to a receiver (`items.append`).
    Method(Rc<(Value, String)>),
    /// Imported module.
    Module(Module),
    /// `sys.stdout` / `sys.stderr`.
    Stream(Stream),
    /// Caught exception instance.
    Exception(Rc<ScriptError>),
}

/// Function object created by `def`.
#[derive(Debug)]
pub struct UserFunction {
    /// Definition from the AST.
    pub def: Arc<FunctionDef>,
    /// Evaluated default values, aligned with `def.params`.
    pub defaults: Vec<Option<Value>>,
}

/// Modules available to `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    /// `sys`: `stdout`, `stderr`.
    Sys,
    /// `math`: a handful of functions and constants.
    Math,
}

impl Module {
    /// Resolve a module by import name.
    pub fn by_name(name: &str) -> Option<Module> {
        match name {
            "sys" => Some(Module::Sys),
            "math" => Some(Module::Math),
            _ => None,
        }
    }

    /// Import name.
    pub fn name(self) -> &'static str {
        match self {
            Module::Sys => "sys",
            Module::Math => "math",
        }
    }
}

impl Value {
    /// Build a string value.
    pub fn str(text: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(text.as_ref()))
    }

    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Build a tuple value.
    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    /// Python type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range { .. } => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
            Value::Stream(_) => "TextIOWrapper",
            Value::Exception(_) => "Exception",
        }
    }

    /// Python truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Range { .. } => range_len(self) > 0,
            _ => true,
        }
    }

    /// `str(value)`.
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(err) => err.message.clone(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Value::Dict(entries) => {
                let parts: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    format!("range({start}, {stop})")
                } else {
                    format!("range({start}, {stop}, {step})")
                }
            }
            Value::Function(func) => format!("<function {}>", func.def.name),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Value::Method(bound) => {
                format!("<method '{}' of '{}' object>", bound.1, bound.0.type_name())
            }
            Value::Module(module) => format!("<module '{}'>", module.name()),
            Value::Stream(Stream::Stdout) => "<sys.stdout>".to_string(),
            Value::Stream(Stream::Stderr) => "<sys.stderr>".to_string(),
            Value::Exception(err) => format!("{}({})", err.kind, quote_str(&err.message)),
        }
    }

    /// Numeric view for arithmetic; bools count as integers.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Integer view (bools included).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// `==` semantics.
    pub fn py_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.as_f64() == b.as_f64()
                && match (a, b) {
                    (Number::Int(x), Number::Int(y)) => x == y,
                    _ => true,
                };
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k.py_eq(k2))
                            .is_some_and(|(_, v2)| v.py_eq(v2))
                    })
            }
            (
                Value::Range {
                    start: a, step: sa, ..
                },
                Value::Range {
                    start: b, step: sb, ..
                },
            ) => {
                let len = range_len(self);
                len == range_len(other) && (len == 0 || (a == b && (len == 1 || sa == sb)))
            }
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `is` semantics: identity for reference types, equality for singletons.
    pub fn py_is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => self.py_eq(other),
        }
    }

    /// Ordering for `<`, `sorted`, `min` and `max`.
    pub fn py_cmp(&self, other: &Value) -> Result<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| ScriptError::value_error("cannot order NaN"));
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => seq_cmp(&a.borrow(), &b.borrow()),
            (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b),
            _ => Err(ScriptError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Keys must be immutable scalars or tuples of them.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => true,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => false,
        }
    }

    /// Materialize any iterable into its items.
    pub fn iterate(&self) -> Result<Vec<Value>> {
        match self {
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Dict(entries) => Ok(entries.borrow().iter().map(|(k, _)| k.clone()).collect()),
            Value::Range { .. } => materialize_range(self),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

/// Numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
}

impl Number {
    /// Widen to f64.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

/// Number of items a range yields.
pub fn range_len(range: &Value) -> usize {
    match range {
        Value::Range { start, stop, step } => {
            let (start, stop, step) = (*start as i128, *stop as i128, *step as i128);
            let span = if step > 0 { stop - start } else { start - stop };
            if span <= 0 {
                0
            } else {
                let step = step.abs();
                ((span + step - 1) / step) as usize
            }
        }
        _ => 0,
    }
}

/// Longest string or sequence a single operation may build.
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// Refuse to build a sequence of `len` items; raises `MemoryError`.
pub fn check_len(len: usize) -> Result<usize> {
    if len > MAX_SEQUENCE_LEN {
        return Err(ScriptError::new(
            "MemoryError",
            format!("sequence of length {len} exceeds the limit of {MAX_SEQUENCE_LEN}"),
        ));
    }
    Ok(len)
}

fn materialize_range(range: &Value) -> Result<Vec<Value>> {
    match range {
        Value::Range { start, step, .. } => Ok((0..check_len(range_len(range))?)
            .map(|i| Value::Int(start + step * i as i64))
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn seq_cmp(a: &[Value], b: &[Value]) -> Result<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if x.py_eq(y) {
            continue;
        }
        return x.py_cmp(y);
    }
    Ok(a.len().cmp(&b.len()))
}

/// Python-compatible float repr (`1.0`, `0.1`, `1e+16`, `inf`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{value:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => text,
        };
    }
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn quote_str(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_render_like_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(-2.5), "-2.5");
    }

    #[test]
    fn containers_repr_with_quotes() {
        let value = Value::list(vec![Value::str("a"), Value::Int(1), Value::None]);
        assert_eq!(value.repr(), "['a', 1, None]");
        assert_eq!(value.to_display(), "['a', 1, None]");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&Value::str("1")));
    }

    #[test]
    fn range_length_handles_negative_steps() {
        let range = Value::Range {
            start: 10,
            stop: 0,
            step: -3,
        };
        assert_eq!(range_len(&range), 4);
        assert_eq!(range.iterate().unwrap().len(), 4);
    }

    #[test]
    fn ranges_compare_by_the_values_they_yield() {
        let range = |start, stop, step| Value::Range { start, stop, step };
        assert!(range(0, 10, 3).py_eq(&range(0, 11, 3)));
        assert!(range(5, 5, 1).py_eq(&range(9, 0, 1)));
        assert!(range(4, 5, 1).py_eq(&range(4, 6, 7)));
        assert!(!range(0, 10, 2).py_eq(&range(0, 10, 3)));
        assert!(range(0, i64::MAX, 1).py_eq(&range(0, i64::MAX, 1)));
    }

    #[test]
    fn oversized_range_refuses_to_materialize() {
        let range = Value::Range {
            start: 0,
            stop: 10_i64.pow(13),
            step: 1,
        };
        assert_eq!(range.iterate().unwrap_err().kind, "MemoryError");
        assert!(check_len(MAX_SEQUENCE_LEN).is_ok());
    }
}
