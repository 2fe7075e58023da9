//! Error types for the execution bridge
//!
//! Each layer gets its own thiserror enum. Guest exceptions are not errors at
//! this level: they are captured as data by the engines, so only host-side
//! faults travel through these types.

use std::time::Duration;
use thiserror::Error;

use crate::component::{RenderError, TransformError};

/// Top-level bridge error
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Runtime failed to initialize
    #[error("Runtime initialization failed: {0}")]
    Init(#[from] RuntimeInitError),

    /// An engine was used outside its protocol
    #[error("Protocol misuse: {0}")]
    Protocol(#[from] ProtocolMisuseError),

    /// Component source could not be transformed
    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    /// Component rendering failed
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
}

/// Why the sandboxed runtime could not be brought up.
///
/// Clonable so that every waiter of a single-flight load receives the same
/// error, and so the manager can keep it as terminal state until `reset()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeInitError {
    /// Configuration rejected before loading
    #[error("Invalid runtime configuration: {0}")]
    Config(String),

    /// The interpreter loaded but failed its self-check program
    #[error("Runtime self-check failed: {0}")]
    SelfCheck(String),

    /// Loader-specific failure
    #[error("Runtime load failed: {0}")]
    Load(String),

    /// Caller-imposed bound elapsed before the load settled
    #[error("Runtime did not become ready within {0:?}")]
    Timeout(Duration),

    /// The load task panicked or was cancelled
    #[error("Runtime load task aborted: {0}")]
    Aborted(String),
}

/// An engine was driven in a way its protocol does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolMisuseError {
    /// `run`/`run_interactive` before the manager reached `Ready`
    #[error("Runtime is not ready (state: {state})")]
    NotReady {
        /// Observed manager state
        state: String,
    },

    /// A session was started while a previous run is still in flight
    #[error("Interactive session is already running")]
    SessionBusy,

    /// The guest worker disappeared without reporting completion
    #[error("Guest worker terminated unexpectedly: {0}")]
    WorkerLost(String),
}

/// Result alias for host-side bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
