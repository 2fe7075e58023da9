use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::ast::{BinOp, CmpOp, Expr, FPart, Program, Stmt, StmtKind, Target, UnaryOp};
use super::builtins::{self, Builtin};
use super::value::{Module, Number, UserFunction, Value, check_len, range_len};
use super::{Result, ScriptError};

/// Output stream written by guest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Host interface driven by the interpreter.
///
/// The interpreter never touches process I/O itself: writes are handed to the
/// host verbatim (one call per `print`), and `input()` blocks inside
/// [`GuestHost::read_line`] until the host supplies a value. Returning `None`
/// from `read_line` signals end of input and raises `EOFError` in the guest.
pub trait GuestHost {
    /// Deliver text written to `stream`.
    fn write(&mut self, stream: Stream, text: &str);
    /// Block until a line of input is available for `prompt`.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Resource limits enforced while a guest program runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of statements and loop iterations executed.
    pub max_steps: u64,
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 5_000_000,
            max_call_depth: 100,
        }
    }
}

/// Control-flow outcome of executing a statement.
#[derive(Debug)]
enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Default)]
struct Frame {
    locals: HashMap<String, Value>,
    global_names: HashSet<String>,
}

/// Tree-walking evaluator bound to a host for one run.
pub struct Interpreter<'h> {
    host: &'h mut dyn GuestHost,
    limits: Limits,
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    steps: u64,
    handling: Vec<Rc<ScriptError>>,
}

impl<'h> Interpreter<'h> {
    /// Create an interpreter with a fresh global namespace.
    pub fn new(host: &'h mut dyn GuestHost, limits: Limits) -> Self {
        Self {
            host,
            limits,
            globals: HashMap::new(),
            frames: Vec::new(),
            steps: 0,
            handling: Vec::new(),
        }
    }

    /// Execute a parsed program to completion.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        match self.exec_block(&program.body)? {
            Flow::Next | Flow::Return(_) => Ok(()),
            Flow::Break => Err(ScriptError::new("SyntaxError", "'break' outside loop")),
            Flow::Continue => Err(ScriptError::new(
                "SyntaxError",
                "'continue' not properly in loop",
            )),
        }
    }

    /// Number of steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Look up a global binding after (or during) a run.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub(crate) fn write(&mut self, stream: Stream, text: &str) {
        self.host.write(stream, text);
    }

    pub(crate) fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.host.read_line(prompt)
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ScriptError::step_limit(self.limits.max_steps));
        }
        Ok(())
    }

    // ----- statements -------------------------------------------------------

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            let flow = self.exec(stmt).map_err(|err| err.at_line(stmt.line))?;
            if !matches!(flow, Flow::Next) {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.exec_aug_assign(target, *op, value)?,
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body);
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Next | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    self.tick()?;
                }
            }
            StmtKind::For { target, iter, body } => return self.exec_for(target, iter, body),
            StmtKind::Def(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(expr) => Some(self.eval(expr)?),
                        None => None,
                    });
                }
                let function = UserFunction {
                    def: def.clone(),
                    defaults,
                };
                self.store(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                if self.frames.is_empty() {
                    return Err(ScriptError::syntax(stmt.line, "'return' outside function"));
                }
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.global_names.extend(names.iter().cloned());
                }
            }
            StmtKind::Import(names) => {
                for name in names {
                    let module = import(name)?;
                    self.store(name, Value::Module(module));
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let module = import(module)?;
                for name in names {
                    let value = builtins::module_attr(module, name)?;
                    self.store(name, value);
                }
            }
            StmtKind::Raise(expr) => return Err(self.exec_raise(expr.as_ref())?),
            StmtKind::Try { body, handlers } => {
                let err = match self.exec_block(body) {
                    Ok(flow) => return Ok(flow),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => err,
                };
                let handler = handlers.iter().find(|handler| match &handler.kind {
                    Some(kind) => builtins::exception_matches(&err.kind, kind),
                    None => true,
                });
                let Some(handler) = handler else {
                    return Err(err);
                };
                let caught = Rc::new(err);
                if let Some(name) = &handler.binding {
                    self.store(name, Value::Exception(caught.clone()));
                }
                self.handling.push(caught);
                let result = self.exec_block(&handler.body);
                self.handling.pop();
                return result;
            }
        }
        Ok(Flow::Next)
    }

    fn exec_for(&mut self, target: &Target, iter: &Expr, body: &[Stmt]) -> Result<Flow> {
        let iterable = self.eval(iter)?;
        // Ranges are walked lazily so `range(10**9)` is bounded by the step limit
        // rather than by memory.
        if let Value::Range { start, step, .. } = iterable {
            for i in 0..range_len(&iterable) {
                self.assign(target, Value::Int(start + step * i as i64))?;
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Next | Flow::Continue => {}
                    ret @ Flow::Return(_) => return Ok(ret),
                }
                self.tick()?;
            }
            return Ok(Flow::Next);
        }

        for item in iterable.iterate()? {
            self.assign(target, item)?;
            match self.exec_block(body)? {
                Flow::Break => break,
                Flow::Next | Flow::Continue => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
            self.tick()?;
        }
        Ok(Flow::Next)
    }

    fn exec_aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = augmented(op, current, rhs)?;
                self.store(name, updated);
            }
            Target::Index { object, index } => {
                let container = self.eval(object)?;
                let key = self.eval(index)?;
                let current = get_item(&container, &key)?;
                let rhs = self.eval(value)?;
                let updated = augmented(op, current, rhs)?;
                set_item(&container, key, updated)?;
            }
            Target::Unpack(_) => {
                return Err(ScriptError::new(
                    "SyntaxError",
                    "illegal expression for augmented assignment",
                ));
            }
        }
        Ok(())
    }

    fn exec_raise(&mut self, expr: Option<&Expr>) -> Result<ScriptError> {
        let Some(expr) = expr else {
            return Ok(match self.handling.last() {
                Some(active) => (**active).clone(),
                None => ScriptError::new("RuntimeError", "No active exception to reraise"),
            });
        };
        match self.eval(expr)? {
            Value::Exception(err) => Ok(ScriptError {
                line: None,
                ..(*err).clone()
            }),
            Value::Builtin(Builtin::Exception(kind)) => Ok(ScriptError::new(kind, "")),
            _ => Err(ScriptError::type_error(
                "exceptions must derive from BaseException",
            )),
        }
    }

    // ----- bindings ---------------------------------------------------------

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.global_names.contains(name) {
                if let Some(value) = frame.locals.get(name) {
                    return Ok(value.clone());
                }
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        builtins::lookup(name).ok_or_else(|| ScriptError::name_error(name))
    }

    fn store(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            if !frame.global_names.contains(name) {
                frame.locals.insert(name.to_string(), value);
                return;
            }
        }
        self.globals.insert(name.to_string(), value);
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<()> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Index { object, index } => {
                let container = self.eval(object)?;
                let key = self.eval(index)?;
                set_item(&container, key, value)
            }
            Target::Unpack(targets) => {
                let items = value.iterate()?;
                if items.len() < targets.len() {
                    return Err(ScriptError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(ScriptError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    // ----- expressions ------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Lit(text) => out.push_str(text),
                        FPart::Expr(expr, spec) => {
                            let value = self.eval(expr)?;
                            out.push_str(&builtins::format_value(&value, spec.as_deref())?);
                        }
                    }
                }
                Ok(Value::str(out))
            }
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::Dict(entries) => {
                let dict = Value::Dict(Default::default());
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    set_item(&dict, key, value)?;
                }
                Ok(dict)
            }
            Expr::ListComp {
                element,
                target,
                iter,
                cond,
            } => {
                let mut out = Vec::new();
                for item in self.eval(iter)?.iterate()? {
                    self.tick()?;
                    self.assign(target, item)?;
                    if let Some(cond) = cond {
                        if !self.eval(cond)?.truthy() {
                            continue;
                        }
                    }
                    out.push(self.eval(element)?);
                }
                Ok(Value::list(out))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                arith(*op, &left, &right)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, expr) in rest {
                    let right = self.eval(expr)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::IfExp {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let args = self.eval_all(args)?;
                let mut kw = Vec::with_capacity(kwargs.len());
                for (name, expr) in kwargs {
                    kw.push((name.clone(), self.eval(expr)?));
                }
                if let Expr::Attribute { object, name } = func.as_ref() {
                    let receiver = self.eval(object)?;
                    if !matches!(receiver, Value::Module(_)) {
                        return builtins::call_method(self, &receiver, name, args, kw);
                    }
                }
                let callee = self.eval(func)?;
                self.call(callee, args, kw)
            }
            Expr::Attribute { object, name } => {
                let receiver = self.eval(object)?;
                builtins::get_attr(&receiver, name)
            }
            Expr::Index { object, index } => {
                let container = self.eval(object)?;
                let key = self.eval(index)?;
                get_item(&container, &key)
            }
            Expr::Slice {
                object,
                start,
                stop,
            } => {
                let container = self.eval(object)?;
                let start = self.eval_bound(start.as_deref())?;
                let stop = self.eval_bound(stop.as_deref())?;
                slice(&container, start, stop)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_bound(&mut self, expr: Option<&Expr>) -> Result<Option<i64>> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    ScriptError::type_error("slice indices must be integers or None")
                }),
            },
        }
    }

    /// Invoke a callable value.
    pub(crate) fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        match callee {
            Value::Function(function) => self.call_user(&function, args, kwargs),
            Value::Builtin(builtin) => builtins::call(self, builtin, args, kwargs),
            Value::Method(bound) => builtins::call_method(self, &bound.0, &bound.1, args, kwargs),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_user(
        &mut self,
        function: &UserFunction,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        let def = &function.def;
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(ScriptError::new(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        if args.len() > def.params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                def.name,
                def.params.len(),
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(def.params.len(), None);
        for (name, value) in kwargs {
            let position = def
                .params
                .iter()
                .position(|param| param.name == name)
                .ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        def.name, name
                    ))
                })?;
            if slots[position].is_some() {
                return Err(ScriptError::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    def.name, name
                )));
            }
            slots[position] = Some(value);
        }

        let mut frame = Frame::default();
        for ((param, slot), default) in def.params.iter().zip(slots).zip(&function.defaults) {
            let value = match slot.or_else(|| default.clone()) {
                Some(value) => value,
                None => {
                    return Err(ScriptError::type_error(format!(
                        "{}() missing required argument: '{}'",
                        def.name, param.name
                    )));
                }
            };
            frame.locals.insert(param.name.clone(), value);
        }

        self.frames.push(frame);
        let result = self.exec_block(&def.body);
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::None),
            Flow::Break => Err(ScriptError::new("SyntaxError", "'break' outside loop")),
            Flow::Continue => Err(ScriptError::new(
                "SyntaxError",
                "'continue' not properly in loop",
            )),
        }
    }
}

fn import(name: &str) -> Result<Module> {
    Module::by_name(name).ok_or_else(|| {
        ScriptError::new("ModuleNotFoundError", format!("No module named '{name}'"))
    })
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
        UnaryOp::Neg => match value.as_number() {
            Some(Number::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(ScriptError::type_error(format!(
                "bad operand type for unary -: '{}'",
                value.type_name()
            ))),
        },
        UnaryOp::Pos => match value.as_number() {
            Some(Number::Int(n)) => Ok(Value::Int(n)),
            Some(Number::Float(f)) => Ok(Value::Float(f)),
            None => Err(ScriptError::type_error(format!(
                "bad operand type for unary +: '{}'",
                value.type_name()
            ))),
        },
    }
}

fn overflow() -> ScriptError {
    ScriptError::new("OverflowError", "integer result out of range")
}

fn repeat_count(len: usize, times: i64) -> Result<usize> {
    let times = times.max(0) as usize;
    check_len(len.checked_mul(times).unwrap_or(usize::MAX))?;
    Ok(times)
}

fn repeated(items: &[Value], times: usize) -> Vec<Value> {
    items.iter().cloned().cycle().take(items.len() * times).collect()
}

/// `+=` and friends; lists extend in place.
fn augmented(op: BinOp, current: Value, rhs: Value) -> Result<Value> {
    if let (BinOp::Add, Value::List(items)) = (op, &current) {
        let extra = rhs.iterate()?;
        check_len(items.borrow().len().saturating_add(extra.len()))?;
        items.borrow_mut().extend(extra);
        return Ok(current);
    }
    arith(op, &current, &rhs)
}

/// Binary arithmetic shared by expressions, `sum()` and augmented assignment.
pub(crate) fn arith(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return match (a, b) {
            (Number::Int(a), Number::Int(b)) => int_arith(op, a, b),
            _ => float_arith(op, a.as_f64(), b.as_f64()),
        };
    }

    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len().saturating_add(b.len()))?;
            Ok(Value::str(format!("{a}{b}")))
        }
        (BinOp::Add, Value::Str(_), other) => Err(ScriptError::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        (BinOp::Mul, Value::Str(s), times) | (BinOp::Mul, times, Value::Str(s))
            if times.as_int().is_some() =>
        {
            let count = repeat_count(s.len(), times.as_int().unwrap_or(0))?;
            Ok(Value::str(s.repeat(count)))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            check_len(a.borrow().len().saturating_add(b.borrow().len()))?;
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            check_len(a.len().saturating_add(b.len()))?;
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, Value::List(items), times) | (BinOp::Mul, times, Value::List(items))
            if times.as_int().is_some() =>
        {
            let items = items.borrow();
            let count = repeat_count(items.len(), times.as_int().unwrap_or(0))?;
            Ok(Value::list(repeated(&items, count)))
        }
        (BinOp::Mul, Value::Tuple(items), times) | (BinOp::Mul, times, Value::Tuple(items))
            if times.as_int().is_some() =>
        {
            let count = repeat_count(items.len(), times.as_int().unwrap_or(0))?;
            Ok(Value::tuple(repeated(items, count)))
        }
        _ => Err(ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Result<Value> {
    let zero = || ScriptError::new("ZeroDivisionError", "integer division or modulo by zero");
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Div => {
            if b == 0 {
                return Err(ScriptError::new("ZeroDivisionError", "division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { quotient - 1 } else { quotient }))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let rem = a.checked_rem(b).ok_or_else(overflow)?;
            Ok(Value::Int(if rem != 0 && ((rem < 0) != (b < 0)) {
                rem + b
            } else {
                rem
            }))
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ScriptError::new(
                        "ZeroDivisionError",
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).map(Value::Int).ok_or_else(overflow)
        }
    }
}

fn float_arith(op: BinOp, a: f64, b: f64) -> Result<Value> {
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div => {
            if b == 0.0 {
                return Err(ScriptError::new("ZeroDivisionError", "float division by zero"));
            }
            Ok(Value::Float(a / b))
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(ScriptError::new(
                    "ZeroDivisionError",
                    "float floor division by zero",
                ));
            }
            Ok(Value::Float((a / b).floor()))
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::new("ZeroDivisionError", "float modulo"));
            }
            let rem = a % b;
            Ok(Value::Float(if rem != 0.0 && ((rem < 0.0) != (b < 0.0)) {
                rem + b
            } else {
                rem
            }))
        }
        BinOp::Pow => Ok(Value::Float(a.powf(b))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => !left.py_eq(right),
        CmpOp::Lt => left.py_cmp(right)? == Less,
        CmpOp::LtE => left.py_cmp(right)? != Greater,
        CmpOp::Gt => left.py_cmp(right)? == Greater,
        CmpOp::GtE => left.py_cmp(right)? != Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => left.py_is(right),
        CmpOp::IsNot => !left.py_is(right),
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(ScriptError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Dict(entries) => Ok(entries.borrow().iter().any(|(k, _)| k.py_eq(item))),
        Value::Range { start, stop, step } => Ok(match item.as_int() {
            Some(n) => {
                let inside = if *step > 0 {
                    n >= *start && n < *stop
                } else {
                    n <= *start && n > *stop
                };
                inside && (n - start) % step == 0
            }
            None => false,
        }),
        other => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize> {
    let raw = index.as_int().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })?;
    let len = len as i64;
    let resolved = if raw < 0 { raw + len } else { raw };
    if resolved < 0 || resolved >= len {
        return Err(ScriptError::new(
            "IndexError",
            format!("{what} index out of range"),
        ));
    }
    Ok(resolved as usize)
}

fn get_item(container: &Value, key: &Value) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let at = normalize_index(key, items.len(), "list")?;
            Ok(items[at].clone())
        }
        Value::Tuple(items) => {
            let at = normalize_index(key, items.len(), "tuple")?;
            Ok(items[at].clone())
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let at = normalize_index(key, chars.len(), "string")?;
            Ok(Value::str(chars[at].to_string()))
        }
        Value::Range { start, step, .. } => {
            let at = normalize_index(key, range_len(container), "range object")?;
            Ok(Value::Int(start + step * at as i64))
        }
        Value::Dict(entries) => {
            if !key.is_hashable() {
                return Err(unhashable(key));
            }
            entries
                .borrow()
                .iter()
                .find(|(k, _)| k.py_eq(key))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ScriptError::new("KeyError", key.repr()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn unhashable(key: &Value) -> ScriptError {
    ScriptError::type_error(format!("unhashable type: '{}'", key.type_name()))
}

pub(crate) fn set_item(container: &Value, key: Value, value: Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let at = normalize_index(&key, items.len(), "list assignment")?;
            items[at] = value;
            Ok(())
        }
        Value::Dict(entries) => {
            if !key.is_hashable() {
                return Err(unhashable(&key));
            }
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
            Ok(())
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bounds(len: usize, start: Option<i64>, stop: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let clamp = |bound: i64| -> i64 {
        let resolved = if bound < 0 { bound + len } else { bound };
        resolved.clamp(0, len)
    };
    let start = start.map(clamp).unwrap_or(0);
    let stop = stop.map(clamp).unwrap_or(len);
    (start as usize, stop.max(start) as usize)
}

fn slice(container: &Value, start: Option<i64>, stop: Option<i64>) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let (from, to) = slice_bounds(items.len(), start, stop);
            Ok(Value::list(items[from..to].to_vec()))
        }
        Value::Tuple(items) => {
            let (from, to) = slice_bounds(items.len(), start, stop);
            Ok(Value::tuple(items[from..to].to_vec()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (from, to) = slice_bounds(chars.len(), start, stop);
            Ok(Value::str(chars[from..to].iter().collect::<String>()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::parse_program;

    #[derive(Default)]
    struct Capture {
        stdout: String,
        stderr: String,
        answers: Vec<String>,
        prompts: Vec<String>,
    }

    impl GuestHost for Capture {
        fn write(&mut self, stream: Stream, text: &str) {
            match stream {
                Stream::Stdout => self.stdout.push_str(text),
                Stream::Stderr => self.stderr.push_str(text),
            }
        }

        fn read_line(&mut self, prompt: &str) -> Option<String> {
            self.prompts.push(prompt.to_string());
            if self.answers.is_empty() {
                None
            } else {
                Some(self.answers.remove(0))
            }
        }
    }

    fn run(source: &str) -> (Capture, Result<()>) {
        run_with(source, Vec::new(), Limits::default())
    }

    fn run_with(source: &str, answers: Vec<&str>, limits: Limits) -> (Capture, Result<()>) {
        let mut host = Capture {
            answers: answers.into_iter().map(String::from).collect(),
            ..Capture::default()
        };
        let result = parse_program(source).and_then(|program| {
            let mut interpreter = Interpreter::new(&mut host, limits);
            interpreter.run(&program)
        });
        (host, result)
    }

    #[test]
    fn prints_arithmetic_and_strings() {
        let (out, result) = run("x = 7 // 2\nprint(x, 7 / 2, -7 // 2, 2 ** 10)\nprint('a' + 'b' * 3)\n");
        result.expect("run");
        assert_eq!(out.stdout, "3 3.5 -4 1024\nabbb\n");
    }

    #[test]
    fn functions_recursion_and_defaults() {
        let src = "def fact(n, acc=1):\n    if n <= 1:\n        return acc\n    return fact(n - 1, acc * n)\nprint(fact(10))\n";
        let (out, result) = run(src);
        result.expect("run");
        assert_eq!(out.stdout, "3628800\n");
    }

    #[test]
    fn loops_with_break_continue_and_ranges() {
        let src = "total = 0\nfor i in range(10):\n    if i % 2:\n        continue\n    if i > 6:\n        break\n    total += i\nprint(total)\n";
        let (out, result) = run(src);
        result.expect("run");
        assert_eq!(out.stdout, "12\n");
    }

    #[test]
    fn input_reads_from_host_and_eof_raises() {
        let (out, result) = run_with(
            "name = input('Name? ')\nprint(f'Hello {name}!')\n",
            vec!["Ada"],
            Limits::default(),
        );
        result.expect("run");
        assert_eq!(out.prompts, vec!["Name? "]);
        assert_eq!(out.stdout, "Hello Ada!\n");

        let (_, result) = run("input()\n");
        let err = result.unwrap_err();
        assert_eq!(err.kind, "EOFError");
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn try_except_catches_and_binds() {
        let src = "try:\n    int('abc')\nexcept ValueError as e:\n    print('bad:', e)\n";
        let (out, result) = run(src);
        result.expect("run");
        assert_eq!(
            out.stdout,
            "bad: invalid literal for int() with base 10: 'abc'\n"
        );
    }

    #[test]
    fn uncaught_errors_carry_line_numbers() {
        let (_, result) = run("x = 1\ny = x / 0\n");
        let err = result.unwrap_err();
        assert_eq!(err.kind, "ZeroDivisionError");
        assert_eq!(err.line, Some(2));
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero (line 2)");
    }

    #[test]
    fn step_limit_is_not_catchable() {
        let limits = Limits {
            max_steps: 1_000,
            max_call_depth: 50,
        };
        let src = "try:\n    while True:\n        pass\nexcept Exception:\n    print('caught')\n";
        let (out, result) = run_with(src, Vec::new(), limits);
        assert_eq!(result.unwrap_err().kind, "TimeoutError");
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let limits = Limits {
            max_steps: 1_000_000,
            max_call_depth: 20,
        };
        let (_, result) = run_with("def f(n):\n    return f(n + 1)\nf(0)\n", Vec::new(), limits);
        assert_eq!(result.unwrap_err().kind, "RecursionError");
    }

    #[test]
    fn stderr_via_sys_module() {
        let (out, result) = run("import sys\nprint('oops', file=sys.stderr)\nprint('ok')\n");
        result.expect("run");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.stdout, "ok\n");
    }

    #[test]
    fn collections_and_comprehensions() {
        let src = "d = {'a': 1}\nd['b'] = 2\nitems = [k + str(v) for k, v in d.items() if v > 0]\nprint(items, len(d), 'a' in d)\nxs = [3, 1, 2]\nxs.sort()\nprint(xs[-1], xs[:2])\n";
        let (out, result) = run(src);
        result.expect("run");
        assert_eq!(out.stdout, "['a1', 'b2'] 2 True\n3 [1, 2]\n");
    }

    #[test]
    fn globals_are_shared_with_functions() {
        let src = "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\nprint(count)\n";
        let (out, result) = run(src);
        result.expect("run");
        assert_eq!(out.stdout, "2\n");
    }

    #[test]
    fn unknown_modules_are_rejected() {
        let (_, result) = run("import os\n");
        let err = result.unwrap_err();
        assert_eq!(err.kind, "ModuleNotFoundError");
        assert_eq!(err.message, "No module named 'os'");
    }

    #[test]
    fn sequence_repetition_clones_items() {
        let src = "row = [0] * 3\ngrid = [row] * 2\nrow.append(1)\nprint(grid, (1, 'a') * 2, [] * 5)\n";
        let (out, result) = run(src);
        result.expect("run");
        assert_eq!(out.stdout, "[[0, 0, 0, 1], [0, 0, 0, 1]] (1, 'a', 1, 'a') []\n");
    }

    #[test]
    fn oversized_allocations_raise_memory_error() {
        for src in [
            "x = list(range(10**13))\n",
            "x = sorted(range(10**12))\n",
            "x = 'x'.ljust(10**14)\n",
            "x = '7'.zfill(10**14)\n",
            "x = f'{1:>99999999999}'\n",
            "x = ('ab' * 5000000).replace('a', 'aaaaaaaaaa')\n",
            "s = 'x' * 6000000\nt = s + s\n",
        ] {
            let (_, result) = run(src);
            assert_eq!(result.unwrap_err().kind, "MemoryError", "{src}");
        }

        let (out, result) =
            run("try:\n    'x'.rjust(10**14)\nexcept MemoryError:\n    print('caught')\n");
        result.expect("run");
        assert_eq!(out.stdout, "caught\n");
    }
}
