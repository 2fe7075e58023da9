use std::cmp::Ordering;
use std::rc::Rc;

use super::ast::BinOp;
use super::runtime::{Interpreter, Stream, arith, set_item};
use super::value::{Module, Number, Value, check_len};
use super::{Result, ScriptError};

/// Exception classes the guest can name, raise and catch.
pub const EXCEPTION_KINDS: &[&str] = &[
    "BaseException",
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "EOFError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "MemoryError",
    "ModuleNotFoundError",
    "NameError",
    "NotImplementedError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "TimeoutError",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// Builtin callables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `print(*values, sep=, end=, file=)`
    Print,
    /// `input(prompt)`, answered by the host
    Input,
    /// `len(x)`
    Len,
    /// `range(stop)` / `range(start, stop[, step])`
    Range,
    /// `int(x)`
    Int,
    /// `float(x)`
    Float,
    /// `str(x)`
    Str,
    /// `bool(x)`
    Bool,
    /// `abs(x)`
    Abs,
    /// `min(...)`
    Min,
    /// `max(...)`
    Max,
    /// `sum(iterable[, start])`
    Sum,
    /// `round(x[, digits])`
    Round,
    /// `list([iterable])`
    List,
    /// `tuple([iterable])`
    Tuple,
    /// `dict([pairs])`
    Dict,
    /// `sorted(iterable)`
    Sorted,
    /// `enumerate(iterable)`
    Enumerate,
    /// `zip(*iterables)`
    Zip,
    /// `repr(x)`
    Repr,
    /// Exception class used as a constructor.
    Exception(&'static str),
    /// `math.sqrt`
    MathSqrt,
    /// `math.floor`
    MathFloor,
    /// `math.ceil`
    MathCeil,
}

const GLOBAL_BUILTINS: &[Builtin] = &[
    Builtin::Print,
    Builtin::Input,
    Builtin::Len,
    Builtin::Range,
    Builtin::Int,
    Builtin::Float,
    Builtin::Str,
    Builtin::Bool,
    Builtin::Abs,
    Builtin::Min,
    Builtin::Max,
    Builtin::Sum,
    Builtin::Round,
    Builtin::List,
    Builtin::Tuple,
    Builtin::Dict,
    Builtin::Sorted,
    Builtin::Enumerate,
    Builtin::Zip,
    Builtin::Repr,
];

impl Builtin {
    /// Name the builtin is bound to.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Input => "input",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Str => "str",
            Builtin::Bool => "bool",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Round => "round",
            Builtin::List => "list",
            Builtin::Tuple => "tuple",
            Builtin::Dict => "dict",
            Builtin::Sorted => "sorted",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Repr => "repr",
            Builtin::Exception(kind) => kind,
            Builtin::MathSqrt => "sqrt",
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
        }
    }
}

/// Resolve a name that is not bound in any scope.
pub fn lookup(name: &str) -> Option<Value> {
    if let Some(builtin) = GLOBAL_BUILTINS.iter().find(|b| b.name() == name) {
        return Some(Value::Builtin(*builtin));
    }
    EXCEPTION_KINDS
        .iter()
        .find(|kind| **kind == name)
        .map(|kind| Value::Builtin(Builtin::Exception(kind)))
}

/// Whether an exception of class `kind` is caught by `except handler`.
pub fn exception_matches(kind: &str, handler: &str) -> bool {
    if kind == handler || handler == "BaseException" {
        return true;
    }
    match handler {
        "Exception" => true,
        "ArithmeticError" => matches!(kind, "ZeroDivisionError" | "OverflowError"),
        "LookupError" => matches!(kind, "IndexError" | "KeyError"),
        "ImportError" => kind == "ModuleNotFoundError",
        "RuntimeError" => matches!(kind, "RecursionError" | "NotImplementedError"),
        _ => false,
    }
}

/// Attribute of an imported module.
pub fn module_attr(module: Module, name: &str) -> Result<Value> {
    let value = match (module, name) {
        (Module::Sys, "stdout") => Value::Stream(Stream::Stdout),
        (Module::Sys, "stderr") => Value::Stream(Stream::Stderr),
        (Module::Math, "pi") => Value::Float(std::f64::consts::PI),
        (Module::Math, "e") => Value::Float(std::f64::consts::E),
        (Module::Math, "tau") => Value::Float(std::f64::consts::TAU),
        (Module::Math, "inf") => Value::Float(f64::INFINITY),
        (Module::Math, "nan") => Value::Float(f64::NAN),
        (Module::Math, "sqrt") => Value::Builtin(Builtin::MathSqrt),
        (Module::Math, "floor") => Value::Builtin(Builtin::MathFloor),
        (Module::Math, "ceil") => Value::Builtin(Builtin::MathCeil),
        _ => {
            return Err(ScriptError::new(
                "AttributeError",
                format!("module '{}' has no attribute '{}'", module.name(), name),
            ));
        }
    };
    Ok(value)
}

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "splitlines",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "index",
    "count",
    "capitalize",
    "title",
    "isdigit",
    "isalpha",
    "isalnum",
    "isspace",
    "isupper",
    "islower",
    "zfill",
    "ljust",
    "rjust",
    "format",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "reverse", "sort", "clear",
    "copy",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "update",
    "setdefault",
    "clear",
    "copy",
];

fn no_attribute(receiver: &Value, name: &str) -> ScriptError {
    ScriptError::new(
        "AttributeError",
        format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            name
        ),
    )
}

/// `receiver.name` outside of a call.
pub fn get_attr(receiver: &Value, name: &str) -> Result<Value> {
    let known = match receiver {
        Value::Module(module) => return module_attr(*module, name),
        Value::Exception(err) if name == "args" => {
            return Ok(Value::tuple(vec![Value::str(&err.message)]));
        }
        Value::Str(_) => STR_METHODS.contains(&name),
        Value::List(_) => LIST_METHODS.contains(&name),
        Value::Dict(_) => DICT_METHODS.contains(&name),
        _ => false,
    };
    if !known {
        return Err(no_attribute(receiver, name));
    }
    Ok(Value::Method(Rc::new((receiver.clone(), name.to_string()))))
}

// ----- argument helpers -----------------------------------------------------

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else if args.len() < min {
            format!("at least {min}")
        } else {
            format!("at most {max}")
        };
        return Err(ScriptError::type_error(format!(
            "{name}() takes {expected} argument{} ({} given)",
            if expected.ends_with('1') { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn take_kwargs(
    name: &str,
    kwargs: Vec<(String, Value)>,
    allowed: &[&str],
) -> Result<Vec<(String, Value)>> {
    if let Some((unexpected, _)) = kwargs.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
        return Err(ScriptError::type_error(format!(
            "{name}() got an unexpected keyword argument '{unexpected}'"
        )));
    }
    Ok(kwargs)
}

fn kwarg(kwargs: &[(String, Value)], name: &str) -> Option<Value> {
    kwargs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

fn expect_int(name: &str, value: &Value) -> Result<i64> {
    value.as_int().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{name}() argument must be an integer, not '{}'",
            value.type_name()
        ))
    })
}

fn expect_str<'v>(name: &str, value: &'v Value) -> Result<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::type_error(format!(
            "{name}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn float_to_int(value: f64) -> Result<i64> {
    if value.is_nan() {
        return Err(ScriptError::value_error(
            "cannot convert float NaN to integer",
        ));
    }
    if value.is_infinite() || value >= 9.3e18 || value <= -9.3e18 {
        return Err(ScriptError::new(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    Ok(value as i64)
}

// ----- builtin functions ----------------------------------------------------

/// Invoke a builtin function.
pub fn call(
    interp: &mut Interpreter<'_>,
    builtin: Builtin,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let kwargs = take_kwargs(name, kwargs, &["sep", "end", "file", "flush"])?;
            let sep = match kwarg(&kwargs, "sep") {
                None | Some(Value::None) => " ".to_string(),
                Some(value) => expect_str(name, &value)?.to_string(),
            };
            let end = match kwarg(&kwargs, "end") {
                None | Some(Value::None) => "\n".to_string(),
                Some(value) => expect_str(name, &value)?.to_string(),
            };
            let stream = match kwarg(&kwargs, "file") {
                None | Some(Value::None) => Stream::Stdout,
                Some(Value::Stream(stream)) => stream,
                Some(other) => {
                    return Err(ScriptError::new(
                        "AttributeError",
                        format!("'{}' object has no attribute 'write'", other.type_name()),
                    ));
                }
            };
            let parts: Vec<String> = args.iter().map(Value::to_display).collect();
            let mut text = parts.join(&sep);
            text.push_str(&end);
            interp.write(stream, &text);
            Ok(Value::None)
        }
        Builtin::Input => {
            take_kwargs(name, kwargs, &[])?;
            arity(name, &args, 0, 1)?;
            let prompt = args.first().map(Value::to_display).unwrap_or_default();
            match interp.read_line(&prompt) {
                Some(line) => Ok(Value::str(line)),
                None => Err(ScriptError::new("EOFError", "EOF when reading a line")),
            }
        }
        Builtin::Len => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(entries) => entries.borrow().len(),
                range @ Value::Range { .. } => super::value::range_len(range),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len as i64))
        }
        Builtin::Range => {
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|arg| {
                    arg.as_int().ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            arg.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<i64>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(ScriptError::type_error("range expected at most 3 arguments")),
            };
            if step == 0 {
                return Err(ScriptError::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range { start, stop, step })
        }
        Builtin::Int => {
            arity(name, &args, 0, 2)?;
            let Some(value) = args.first() else {
                return Ok(Value::Int(0));
            };
            if let Some(base) = args.get(1) {
                let base = expect_int(name, base)?;
                let text = expect_str(name, value)?;
                let radix = u32::try_from(base)
                    .ok()
                    .filter(|b| (2..=36).contains(b))
                    .ok_or_else(|| ScriptError::value_error("int() base must be >= 2 and <= 36"))?;
                return i64::from_str_radix(text.trim(), radix)
                    .map(Value::Int)
                    .map_err(|_| {
                        ScriptError::value_error(format!(
                            "invalid literal for int() with base {base}: {}",
                            value.repr()
                        ))
                    });
            }
            match value {
                Value::Str(text) => text
                    .trim()
                    .replace('_', "")
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| {
                        ScriptError::value_error(format!(
                            "invalid literal for int() with base 10: {}",
                            value.repr()
                        ))
                    }),
                Value::Float(f) => float_to_int(*f).map(Value::Int),
                other => other.as_int().map(Value::Int).ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))
                }),
            }
        }
        Builtin::Float => {
            arity(name, &args, 0, 1)?;
            let Some(value) = args.first() else {
                return Ok(Value::Float(0.0));
            };
            match value {
                Value::Str(text) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    ScriptError::value_error(format!(
                        "could not convert string to float: {}",
                        value.repr()
                    ))
                }),
                other => other
                    .as_number()
                    .map(|n| Value::Float(n.as_f64()))
                    .ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "float() argument must be a string or a real number, not '{}'",
                            other.type_name()
                        ))
                    }),
            }
        }
        Builtin::Str => {
            arity(name, &args, 0, 1)?;
            Ok(Value::str(
                args.first().map(Value::to_display).unwrap_or_default(),
            ))
        }
        Builtin::Bool => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        Builtin::Repr => {
            arity(name, &args, 1, 1)?;
            Ok(Value::str(args[0].repr()))
        }
        Builtin::Abs => {
            arity(name, &args, 1, 1)?;
            match args[0].as_number() {
                Some(Number::Int(n)) => n.checked_abs().map(Value::Int).ok_or_else(|| {
                    ScriptError::new("OverflowError", "integer result out of range")
                }),
                Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
                None => Err(ScriptError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    args[0].type_name()
                ))),
            }
        }
        Builtin::Min | Builtin::Max => {
            take_kwargs(name, kwargs, &[])?;
            let candidates = match args.len() {
                0 => {
                    return Err(ScriptError::type_error(format!(
                        "{name} expected at least 1 argument, got 0"
                    )));
                }
                1 => args[0].iterate()?,
                _ => args,
            };
            let wanted = if builtin == Builtin::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = candidates.into_iter();
            let mut best = iter.next().ok_or_else(|| {
                ScriptError::value_error(format!("{name}() arg is an empty sequence"))
            })?;
            for candidate in iter {
                if candidate.py_cmp(&best)? == wanted {
                    best = candidate;
                }
            }
            Ok(best)
        }
        Builtin::Sum => {
            arity(name, &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(ScriptError::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            for item in args[0].iterate()? {
                total = arith(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Round => {
            arity(name, &args, 1, 2)?;
            let digits = match args.get(1) {
                None | Some(Value::None) => None,
                Some(value) => Some(expect_int(name, value)?),
            };
            match (args[0].as_number(), digits) {
                (Some(Number::Int(n)), _) => Ok(Value::Int(n)),
                (Some(Number::Float(f)), None) => float_to_int(f.round_ties_even()).map(Value::Int),
                (Some(Number::Float(f)), Some(digits)) => {
                    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
                    Ok(Value::Float((f * scale).round_ties_even() / scale))
                }
                (None, _) => Err(ScriptError::type_error(format!(
                    "type {} doesn't define __round__ method",
                    args[0].type_name()
                ))),
            }
        }
        Builtin::List => {
            arity(name, &args, 0, 1)?;
            let items = match args.first() {
                Some(value) => value.iterate()?,
                None => Vec::new(),
            };
            Ok(Value::list(items))
        }
        Builtin::Tuple => {
            arity(name, &args, 0, 1)?;
            let items = match args.first() {
                Some(value) => value.iterate()?,
                None => Vec::new(),
            };
            Ok(Value::tuple(items))
        }
        Builtin::Dict => {
            arity(name, &args, 0, 1)?;
            let dict = Value::Dict(Default::default());
            if let Some(source) = args.first() {
                let pairs = match source {
                    Value::Dict(entries) => entries.borrow().clone(),
                    other => other
                        .iterate()?
                        .into_iter()
                        .map(|pair| match pair.iterate()?.as_slice() {
                            [key, value] => Ok((key.clone(), value.clone())),
                            _ => Err(ScriptError::value_error(
                                "dictionary update sequence element has wrong length",
                            )),
                        })
                        .collect::<Result<Vec<_>>>()?,
                };
                for (key, value) in pairs {
                    set_item(&dict, key, value)?;
                }
            }
            for (key, value) in kwargs {
                set_item(&dict, Value::str(key), value)?;
            }
            Ok(dict)
        }
        Builtin::Sorted => {
            let kwargs = take_kwargs(name, kwargs, &["key", "reverse"])?;
            arity(name, &args, 1, 1)?;
            let items = args[0].iterate()?;
            let sorted = sort_values(interp, items, &kwargs)?;
            Ok(Value::list(sorted))
        }
        Builtin::Enumerate => {
            let kwargs = take_kwargs(name, kwargs, &["start"])?;
            arity(name, &args, 1, 2)?;
            let start = match args.get(1).cloned().or_else(|| kwarg(&kwargs, "start")) {
                Some(value) => expect_int(name, &value)?,
                None => 0,
            };
            let pairs = args[0]
                .iterate()?
                .into_iter()
                .enumerate()
                .map(|(i, item)| Value::tuple(vec![Value::Int(start + i as i64), item]))
                .collect();
            Ok(Value::list(pairs))
        }
        Builtin::Zip => {
            let columns = args
                .iter()
                .map(Value::iterate)
                .collect::<Result<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let zipped = (0..rows)
                .map(|row| Value::tuple(columns.iter().map(|col| col[row].clone()).collect()))
                .collect();
            Ok(Value::list(zipped))
        }
        Builtin::Exception(kind) => {
            let message = match args.as_slice() {
                [] => String::new(),
                [single] => single.to_display(),
                many => Value::tuple(many.to_vec()).repr(),
            };
            Ok(Value::Exception(Rc::new(ScriptError::new(kind, message))))
        }
        Builtin::MathSqrt => {
            arity(name, &args, 1, 1)?;
            let value = number_arg(name, &args[0])?;
            if value < 0.0 {
                return Err(ScriptError::value_error("math domain error"));
            }
            Ok(Value::Float(value.sqrt()))
        }
        Builtin::MathFloor | Builtin::MathCeil => {
            arity(name, &args, 1, 1)?;
            if let Some(n) = args[0].as_int() {
                return Ok(Value::Int(n));
            }
            let value = number_arg(name, &args[0])?;
            let rounded = if builtin == Builtin::MathFloor {
                value.floor()
            } else {
                value.ceil()
            };
            float_to_int(rounded).map(Value::Int)
        }
    }
}

fn number_arg(name: &str, value: &Value) -> Result<f64> {
    value.as_number().map(Number::as_f64).ok_or_else(|| {
        ScriptError::type_error(format!(
            "{name}() must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

fn sort_values(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    kwargs: &[(String, Value)],
) -> Result<Vec<Value>> {
    let reverse = kwarg(kwargs, "reverse").is_some_and(|v| v.truthy());
    let key = kwarg(kwargs, "key").filter(|k| !matches!(k, Value::None));

    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = match &key {
            Some(func) => interp.call(func.clone(), vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        keyed.push((sort_key, item));
    }

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = if reverse { b.py_cmp(a) } else { a.py_cmp(b) };
        ordering.unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(keyed.into_iter().map(|(_, item)| item).collect()),
    }
}

// ----- methods --------------------------------------------------------------

/// Invoke `receiver.name(*args, **kwargs)`.
pub fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    match receiver {
        Value::Module(module) => {
            let func = module_attr(*module, name)?;
            interp.call(func, args, kwargs)
        }
        Value::Str(text) if STR_METHODS.contains(&name) => str_method(text, name, args, kwargs),
        Value::List(_) if LIST_METHODS.contains(&name) => {
            list_method(interp, receiver, name, args, kwargs)
        }
        Value::Dict(_) if DICT_METHODS.contains(&name) => dict_method(receiver, name, args, kwargs),
        other => Err(no_attribute(other, name)),
    }
}

fn strip_set(args: &[Value], name: &str) -> Result<Option<Vec<char>>> {
    match args.first() {
        None | Some(Value::None) => Ok(None),
        Some(value) => Ok(Some(expect_str(name, value)?.chars().collect())),
    }
}

fn affix_matches(name: &str, arg: &Value, test: impl Fn(&str) -> bool) -> Result<bool> {
    match arg {
        Value::Str(s) => Ok(test(s)),
        Value::Tuple(options) => {
            for option in options.iter() {
                if test(expect_str(name, option)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(ScriptError::type_error(format!(
            "{name} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn char_index(text: &str, byte_index: usize) -> i64 {
    text[..byte_index].chars().count() as i64
}

fn pad(text: &str, width: i64, fill: char, left: bool) -> Result<String> {
    let len = text.chars().count() as i64;
    if width <= len {
        return Ok(text.to_string());
    }
    check_len(usize::try_from(width).unwrap_or(usize::MAX))?;
    let padding: String = std::iter::repeat_n(fill, (width - len) as usize).collect();
    Ok(if left {
        format!("{padding}{text}")
    } else {
        format!("{text}{padding}")
    })
}

fn str_method(
    text: &str,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    if name != "format" && name != "split" {
        take_kwargs(name, kwargs.clone(), &[])?;
    }
    let bool_result = |b: bool| Ok(Value::Bool(b));
    match name {
        "upper" => Ok(Value::str(text.to_uppercase())),
        "lower" => Ok(Value::str(text.to_lowercase())),
        "strip" | "lstrip" | "rstrip" => {
            arity(name, &args, 0, 1)?;
            let set = strip_set(&args, name)?;
            let matches = |c: char| match &set {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            let stripped = match name {
                "strip" => text.trim_matches(matches),
                "lstrip" => text.trim_start_matches(matches),
                _ => text.trim_end_matches(matches),
            };
            Ok(Value::str(stripped))
        }
        "split" => {
            let kwargs = take_kwargs(name, kwargs, &["sep", "maxsplit"])?;
            arity(name, &args, 0, 2)?;
            let sep = args.first().cloned().or_else(|| kwarg(&kwargs, "sep"));
            let maxsplit = match args.get(1).cloned().or_else(|| kwarg(&kwargs, "maxsplit")) {
                Some(value) => expect_int(name, &value)?,
                None => -1,
            };
            let parts: Vec<Value> = match sep {
                None | Some(Value::None) => text.split_whitespace().map(Value::str).collect(),
                Some(sep) => {
                    let sep = expect_str(name, &sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::value_error("empty separator"));
                    }
                    if maxsplit < 0 {
                        text.split(sep).map(Value::str).collect()
                    } else {
                        text.splitn(maxsplit as usize + 1, sep)
                            .map(Value::str)
                            .collect()
                    }
                }
            };
            Ok(Value::list(parts))
        }
        "splitlines" => Ok(Value::list(text.lines().map(Value::str).collect())),
        "join" => {
            arity(name, &args, 1, 1)?;
            let mut pieces = Vec::new();
            for (i, item) in args[0].iterate()?.into_iter().enumerate() {
                match item {
                    Value::Str(s) => pieces.push(s.to_string()),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            let joined = pieces
                .iter()
                .fold(0usize, |total, piece| total.saturating_add(piece.len()))
                .saturating_add(text.len().saturating_mul(pieces.len().saturating_sub(1)));
            check_len(joined)?;
            Ok(Value::str(pieces.join(text)))
        }
        "replace" => {
            arity(name, &args, 2, 2)?;
            let old = expect_str(name, &args[0])?;
            let new = expect_str(name, &args[1])?;
            let hits = if old.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(old).count()
            };
            check_len(text.len().saturating_add(hits.saturating_mul(new.len())))?;
            Ok(Value::str(text.replace(old, new)))
        }
        "startswith" => {
            arity(name, &args, 1, 1)?;
            affix_matches(name, &args[0], |p| text.starts_with(p)).map(Value::Bool)
        }
        "endswith" => {
            arity(name, &args, 1, 1)?;
            affix_matches(name, &args[0], |p| text.ends_with(p)).map(Value::Bool)
        }
        "find" | "index" => {
            arity(name, &args, 1, 1)?;
            let needle = expect_str(name, &args[0])?;
            match text.find(needle) {
                Some(at) => Ok(Value::Int(char_index(text, at))),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(ScriptError::value_error("substring not found")),
            }
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let needle = expect_str(name, &args[0])?;
            let count = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "capitalize" => {
            let mut chars = text.chars();
            let out = match chars.next() {
                Some(first) => {
                    let rest = chars.as_str().to_lowercase();
                    first.to_uppercase().chain(rest.chars()).collect()
                }
                None => String::new(),
            };
            Ok(Value::str(out))
        }
        "title" => {
            let mut out = String::with_capacity(text.len());
            let mut previous_cased = false;
            for ch in text.chars() {
                if previous_cased {
                    out.extend(ch.to_lowercase());
                } else {
                    out.extend(ch.to_uppercase());
                }
                previous_cased = ch.is_alphabetic();
            }
            Ok(Value::str(out))
        }
        "isdigit" => bool_result(!text.is_empty() && text.chars().all(|c| c.is_ascii_digit())),
        "isalpha" => bool_result(!text.is_empty() && text.chars().all(char::is_alphabetic)),
        "isalnum" => bool_result(!text.is_empty() && text.chars().all(char::is_alphanumeric)),
        "isspace" => bool_result(!text.is_empty() && text.chars().all(char::is_whitespace)),
        "isupper" => bool_result(
            text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase),
        ),
        "islower" => bool_result(
            text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_uppercase),
        ),
        "zfill" => {
            arity(name, &args, 1, 1)?;
            let width = expect_int(name, &args[0])?;
            let (sign, digits) = match text.strip_prefix(['-', '+']) {
                Some(rest) => (&text[..1], rest),
                None => ("", text),
            };
            let padded = pad(digits, width - sign.len() as i64, '0', true)?;
            Ok(Value::str(format!("{sign}{padded}")))
        }
        "ljust" | "rjust" => {
            arity(name, &args, 1, 2)?;
            let width = expect_int(name, &args[0])?;
            let fill = match args.get(1) {
                Some(value) => {
                    let fill = expect_str(name, value)?;
                    let mut chars = fill.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => {
                            return Err(ScriptError::type_error(
                                "The fill character must be exactly one character long",
                            ));
                        }
                    }
                }
                None => ' ',
            };
            pad(text, width, fill, name == "rjust").map(Value::str)
        }
        "format" => format_template(text, &args, &kwargs).map(Value::str),
        _ => Err(no_attribute(&Value::str(text), name)),
    }
}

fn list_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    let Value::List(items) = receiver else {
        return Err(no_attribute(receiver, name));
    };
    if name != "sort" {
        take_kwargs(name, kwargs.clone(), &[])?;
    }
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            items.borrow_mut().push(args[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let extra = args[0].iterate()?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(ScriptError::new("IndexError", "pop from empty list"));
            }
            let len = items.len() as i64;
            let at = match args.first() {
                Some(value) => expect_int(name, value)?,
                None => -1,
            };
            let resolved = if at < 0 { at + len } else { at };
            if resolved < 0 || resolved >= len {
                return Err(ScriptError::new("IndexError", "pop index out of range"));
            }
            Ok(items.remove(resolved as usize))
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let at = expect_int(name, &args[0])?;
            let resolved = if at < 0 { (at + len).max(0) } else { at.min(len) };
            items.insert(resolved as usize, args[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let mut items = items.borrow_mut();
            match items.iter().position(|v| v.py_eq(&args[0])) {
                Some(at) => {
                    items.remove(at);
                    Ok(Value::None)
                }
                None => Err(ScriptError::value_error("list.remove(x): x not in list")),
            }
        }
        "index" => {
            arity(name, &args, 1, 1)?;
            let items = items.borrow();
            items
                .iter()
                .position(|v| v.py_eq(&args[0]))
                .map(|at| Value::Int(at as i64))
                .ok_or_else(|| {
                    ScriptError::value_error(format!("{} is not in list", args[0].repr()))
                })
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let count = items.borrow().iter().filter(|v| v.py_eq(&args[0])).count();
            Ok(Value::Int(count as i64))
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "sort" => {
            let kwargs = take_kwargs(name, kwargs, &["key", "reverse"])?;
            arity(name, &args, 0, 0)?;
            let current = items.borrow().clone();
            let sorted = sort_values(interp, current, &kwargs)?;
            *items.borrow_mut() = sorted;
            Ok(Value::None)
        }
        "clear" => {
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::list(items.borrow().clone())),
        _ => Err(no_attribute(receiver, name)),
    }
}

fn dict_method(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    let Value::Dict(entries) = receiver else {
        return Err(no_attribute(receiver, name));
    };
    if name != "update" {
        take_kwargs(name, kwargs.clone(), &[])?;
    }
    let find = |key: &Value| {
        entries
            .borrow()
            .iter()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v.clone())
    };
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            Ok(find(&args[0]).unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => Ok(Value::list(
            entries.borrow().iter().map(|(k, _)| k.clone()).collect(),
        )),
        "values" => Ok(Value::list(
            entries.borrow().iter().map(|(_, v)| v.clone()).collect(),
        )),
        "items" => Ok(Value::list(
            entries
                .borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "pop" => {
            arity(name, &args, 1, 2)?;
            let mut entries = entries.borrow_mut();
            match entries.iter().position(|(k, _)| k.py_eq(&args[0])) {
                Some(at) => Ok(entries.remove(at).1),
                None => args
                    .get(1)
                    .cloned()
                    .ok_or_else(|| ScriptError::new("KeyError", args[0].repr())),
            }
        }
        "update" => {
            arity(name, &args, 0, 1)?;
            if let Some(other) = args.first() {
                let pairs = match other {
                    Value::Dict(other) => other.borrow().clone(),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "'{}' object is not a mapping",
                            other.type_name()
                        )));
                    }
                };
                for (key, value) in pairs {
                    set_item(receiver, key, value)?;
                }
            }
            for (key, value) in kwargs {
                set_item(receiver, Value::str(key), value)?;
            }
            Ok(Value::None)
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            if let Some(existing) = find(&args[0]) {
                return Ok(existing);
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            set_item(receiver, args[0].clone(), default.clone())?;
            Ok(default)
        }
        "clear" => {
            entries.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::Dict(Rc::new(std::cell::RefCell::new(
            entries.borrow().clone(),
        )))),
        _ => Err(no_attribute(receiver, name)),
    }
}

// ----- formatting -----------------------------------------------------------

#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    zero_pad: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self> {
        let invalid = || ScriptError::value_error(format!("Invalid format specifier '{spec}'"));
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;

        if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            i = 2;
        } else if chars.first().is_some_and(|c| matches!(c, '<' | '>' | '^')) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero_pad = true;
            i += 1;
        }
        let width_start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > width_start {
            let digits: String = chars[width_start..i].iter().collect();
            out.width = check_len(digits.parse().map_err(|_| invalid())?)?;
        }
        if chars.get(i) == Some(&',') {
            out.grouping = true;
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            out.precision = Some(check_len(digits.parse().map_err(|_| invalid())?)?);
        }
        if let Some(kind) = chars.get(i) {
            if !matches!(kind, 'f' | 'F' | 'd' | 's' | '%' | 'e' | 'g') {
                return Err(invalid());
            }
            out.kind = Some(*kind);
            i += 1;
        }
        if i != chars.len() {
            return Err(invalid());
        }
        Ok(out)
    }
}

fn group_thousands(digits: &str) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(at) => digits.split_at(at),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped.push_str(rest);
    grouped
}

fn python_exponent(text: String) -> String {
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// Render `value` according to a format spec (`.2f`, `>8`, `,d`, ...).
pub fn format_value(value: &Value, spec: Option<&str>) -> Result<String> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(value.to_display());
    };
    let spec = FormatSpec::parse(spec)?;
    let unknown = |code: char| {
        ScriptError::value_error(format!(
            "Unknown format code '{code}' for object of type '{}'",
            value.type_name()
        ))
    };

    let number = match value {
        Value::Bool(_) if spec.kind.is_none() => None,
        other => other.as_number(),
    };
    let body = match (number, spec.kind) {
        (Some(n), Some('f' | 'F')) => format!("{:.*}", spec.precision.unwrap_or(6), n.as_f64()),
        (Some(n), Some('%')) => format!("{:.*}%", spec.precision.unwrap_or(6), n.as_f64() * 100.0),
        (Some(n), Some('e')) => {
            python_exponent(format!("{:.*e}", spec.precision.unwrap_or(6), n.as_f64()))
        }
        (Some(Number::Int(n)), Some('d')) => n.to_string(),
        (Some(Number::Float(_)), Some('d')) => return Err(unknown('d')),
        (Some(Number::Float(f)), None | Some('g')) if spec.precision.is_some() => {
            format!("{:.*}", spec.precision.unwrap_or(6), f)
        }
        (Some(_), None | Some('g')) => value.to_display(),
        (Some(_), Some(code)) => return Err(unknown(code)),
        (None, None | Some('s')) => {
            let text = value.to_display();
            match spec.precision {
                Some(limit) => text.chars().take(limit).collect(),
                None => text,
            }
        }
        (None, Some(code)) => return Err(unknown(code)),
    };
    let body = if spec.grouping && number.is_some() {
        match body.strip_prefix('-') {
            Some(digits) => format!("-{}", group_thousands(digits)),
            None => group_thousands(&body),
        }
    } else {
        body
    };

    let len = body.chars().count();
    if len >= spec.width {
        return Ok(body);
    }
    let missing = spec.width - len;
    if spec.zero_pad && spec.align.is_none() && number.is_some() {
        let (sign, digits) = match body.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", body.as_str()),
        };
        return Ok(format!("{sign}{}{digits}", "0".repeat(missing)));
    }
    let fill = spec
        .fill
        .unwrap_or(if spec.zero_pad { '0' } else { ' ' })
        .to_string();
    let align = spec
        .align
        .unwrap_or(if number.is_some() { '>' } else { '<' });
    Ok(match align {
        '>' => format!("{}{body}", fill.repeat(missing)),
        '^' => format!(
            "{}{body}{}",
            fill.repeat(missing / 2),
            fill.repeat(missing - missing / 2)
        ),
        _ => format!("{body}{}", fill.repeat(missing)),
    })
}

/// `str.format` with `{}`, `{0}` and `{name}` fields.
fn format_template(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(ScriptError::value_error(
                                "expected '}' before end of string",
                            ));
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, Some(spec)),
                    None => (field.as_str(), None),
                };
                let value = if name.is_empty() {
                    let value = args.get(auto_index).cloned();
                    auto_index += 1;
                    value.ok_or_else(|| {
                        ScriptError::new(
                            "IndexError",
                            format!("Replacement index {} out of range", auto_index - 1),
                        )
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned().ok_or_else(|| {
                        ScriptError::new(
                            "IndexError",
                            format!("Replacement index {index} out of range"),
                        )
                    })?
                } else {
                    kwarg(kwargs, name)
                        .ok_or_else(|| ScriptError::new("KeyError", Value::str(name).repr()))?
                };
                out.push_str(&format_value(&value, spec)?);
            }
            '}' => {
                return Err(ScriptError::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_specs_cover_common_shapes() {
        let pi = Value::Float(std::f64::consts::PI);
        assert_eq!(format_value(&pi, Some(".2f")).unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(5), Some("03d")).unwrap(), "005");
        assert_eq!(format_value(&Value::Int(-5), Some("04")).unwrap(), "-005");
        assert_eq!(
            format_value(&Value::Int(1234567), Some(",")).unwrap(),
            "1,234,567"
        );
        assert_eq!(format_value(&Value::str("ab"), Some(">4")).unwrap(), "  ab");
        assert_eq!(format_value(&Value::str("ab"), Some("*^6")).unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Float(0.25), Some(".0%")).unwrap(), "25%");
        assert!(format_value(&Value::Float(1.5), Some("d")).is_err());
    }

    #[test]
    fn template_formatting_resolves_fields() {
        let args = vec![Value::str("Ada"), Value::Int(3)];
        let kwargs = vec![("unit".to_string(), Value::str("cats"))];
        assert_eq!(
            format_template("{} has {1} {unit} {{ok}}", &args, &kwargs).unwrap(),
            "Ada has 3 cats {ok}"
        );
        assert!(format_template("{5}", &args, &kwargs).is_err());
    }

    #[test]
    fn exception_hierarchy_matches_parents() {
        assert!(exception_matches("ZeroDivisionError", "ArithmeticError"));
        assert!(exception_matches("KeyError", "LookupError"));
        assert!(exception_matches("ValueError", "Exception"));
        assert!(!exception_matches("ValueError", "TypeError"));
    }

    #[test]
    fn lookup_finds_functions_and_exception_classes() {
        assert!(matches!(lookup("len"), Some(Value::Builtin(Builtin::Len))));
        assert!(matches!(
            lookup("KeyError"),
            Some(Value::Builtin(Builtin::Exception("KeyError")))
        ));
        assert!(lookup("open").is_none());
    }
}
