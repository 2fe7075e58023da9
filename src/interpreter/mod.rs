//! Sandboxed interpreter for guest scripts.
//!
//! Guest programs are written in a small, indentation-structured subset of
//! Python. Execution is synchronous: every write to standard output/error and
//! every blocking `input()` call is routed through a [`GuestHost`], which lets
//! the embedding decide whether output is buffered (batch runs) or streamed
//! and whether an input request parks the guest until an operator answers
//! (interactive sessions).

/// Abstract syntax tree definitions for the guest language.
pub mod ast;
/// Builtin functions, modules and methods.
pub mod builtins;
/// Tokenizer with indentation tracking.
pub mod lexer;
/// Recursive-descent parser producing [`Program`]s.
pub mod parser;
/// Tree-walking evaluator and the host interface it drives.
pub mod runtime;
/// Runtime values.
pub mod value;

pub use ast::{Expr, Program, Stmt, StmtKind};
pub use parser::{parse_expression, parse_program};
pub use runtime::{GuestHost, Interpreter, Limits, Stream};
pub use value::Value;

use std::fmt;

/// Convenience result alias for interpreter operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// A guest-level exception: syntax errors, runtime errors and explicit `raise`.
///
/// These are data, not host faults. Engines surface them as the `error` field
/// of a batch run or as the final error line of an interactive session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    /// Exception class name (`ValueError`, `SyntaxError`, ...).
    pub kind: String,
    /// Exception message; may be empty.
    pub message: String,
    /// Source line the exception was raised on, when known.
    pub line: Option<usize>,
    /// Sandbox-limit violations cannot be caught by guest `except` clauses.
    pub(crate) fatal: bool,
}

impl ScriptError {
    /// Build an exception of the given kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line: None,
            fatal: false,
        }
    }

    /// `SyntaxError` located at `line`.
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message).at_line(line)
    }

    /// `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// `ValueError`.
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    /// `NameError` for an unbound identifier.
    pub fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{name}' is not defined"))
    }

    /// Sandbox step budget exhausted.
    pub fn step_limit(limit: u64) -> Self {
        Self {
            fatal: true,
            ..Self::new(
                "TimeoutError",
                format!("execution exceeded the sandbox limit of {limit} steps"),
            )
        }
    }

    /// Attach a line number unless one is already recorded.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// Whether the error escapes guest `try`/`except`.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// `Kind: message` without the location suffix, as `str(e)` would print it
    /// in a traceback's last line.
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.kind.clone()
        } else {
            format!("{}: {}", self.kind, self.message)
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {})", self.summary(), line),
            None => write!(f, "{}", self.summary()),
        }
    }
}

impl std::error::Error for ScriptError {}
