//! Codebridge – run stored code snippets in an embedded sandbox
//!
//! This crate bridges a snippet manager and an in-process execution sandbox:
//! - A lazily initialized, single-flight sandbox runtime with retry after failure
//! - Batch execution collecting stdout/stderr and a formatted error
//! - Interactive sessions that stream terminal lines and suspend on `input()`
//! - Component previews: JSX modules parsed into factories and rendered to HTML
//! - Coercion of declared preview parameters into typed props

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Live component previews
pub mod component;

/// Guest script interpreter
pub mod interpreter;

/// Runtime lifecycle and execution engines
pub mod runtime;

// Re-export key types for convenience
pub use component::{ComponentFactory, Element, JsxTransform, Preview, Transform};
pub use runtime::{
    BatchExecutionEngine, BridgeError, Executor, InteractiveSession, RuntimeConfig,
    RuntimeManager, SessionHandlers, looks_interactive,
};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
