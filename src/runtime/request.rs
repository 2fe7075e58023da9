//! Execution requests and the executor that routes them.

use serde::Serialize;
use tracing::debug;

use super::batch::{BatchExecutionEngine, BatchOutput};
use super::detect::looks_interactive;
use super::error::BridgeError;
use super::manager::RuntimeManager;
use super::session::{InteractiveSession, SessionHandlers, SessionOutcome};
use super::terminal::{TerminalLine, TerminalLineModel};

/// Which engine a request runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run to completion, collecting output
    Batch,
    /// Stream lines and suspend on input
    Interactive,
}

/// Source text plus the mode derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    source: String,
    mode: ExecutionMode,
}

impl ExecutionRequest {
    /// Build a request; the mode comes from [`looks_interactive`].
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mode = if looks_interactive(&source) {
            ExecutionMode::Interactive
        } else {
            ExecutionMode::Batch
        };
        Self { source, mode }
    }

    /// Build a request with an explicit mode, bypassing detection.
    pub fn with_mode(source: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            source: source.into(),
            mode,
        }
    }

    /// Guest source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Derived mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Result of an executed request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionReport {
    /// Batch run output
    Batch(BatchOutput),
    /// Interactive run outcome and the lines it produced
    Interactive {
        /// How the session ended
        outcome: SessionOutcome,
        /// Terminal lines in emission order
        transcript: Vec<TerminalLine>,
    },
}

/// Owns the manager and both engines; initializes the runtime on demand.
#[derive(Debug, Clone)]
pub struct Executor {
    manager: RuntimeManager,
    batch: BatchExecutionEngine,
    session: InteractiveSession,
}

impl Executor {
    /// Executor over `manager`.
    pub fn new(manager: RuntimeManager) -> Self {
        Self {
            batch: BatchExecutionEngine::new(manager.clone()),
            session: InteractiveSession::new(manager.clone()),
            manager,
        }
    }

    /// The underlying manager.
    pub fn manager(&self) -> &RuntimeManager {
        &self.manager
    }

    /// Terminal log of interactive runs.
    pub fn transcript(&self) -> TerminalLineModel {
        self.session.transcript()
    }

    /// Ensure the runtime is ready, then run `request` on the engine its mode
    /// selects. `handlers` are only consulted for interactive requests.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        handlers: SessionHandlers,
    ) -> Result<ExecutionReport, BridgeError> {
        self.manager.ensure_ready().await?;
        debug!(mode = ?request.mode(), "dispatching execution request");
        match request.mode() {
            ExecutionMode::Batch => Ok(ExecutionReport::Batch(
                self.batch.run(request.source()).await?,
            )),
            ExecutionMode::Interactive => {
                let outcome = self
                    .session
                    .run_interactive(request.source(), handlers)
                    .await?;
                Ok(ExecutionReport::Interactive {
                    outcome,
                    transcript: self.session.transcript().snapshot(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_is_derived_from_source() {
        assert_eq!(
            ExecutionRequest::new("print(1)").mode(),
            ExecutionMode::Batch
        );
        assert_eq!(
            ExecutionRequest::new("x = input()").mode(),
            ExecutionMode::Interactive
        );
        assert_eq!(
            ExecutionRequest::with_mode("x = input()", ExecutionMode::Batch).mode(),
            ExecutionMode::Batch
        );
    }
}
