//! Execution runtime and public API
//!
//! This module owns the lifecycle of the sandboxed interpreter and the two
//! engines that drive it: batch runs that collect output, and interactive
//! sessions that stream terminal lines and suspend on input requests.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::interpreter::Limits;

// Submodules
pub mod batch;
pub mod detect;
pub mod error;
pub mod manager;
pub mod request;
pub mod sandbox;
pub mod session;
pub mod snippet;
pub mod terminal;

pub use batch::{BatchExecutionEngine, BatchOutput};
pub use detect::looks_interactive;
pub use error::{BridgeError, ProtocolMisuseError, RuntimeInitError};
pub use manager::{RuntimeManager, RuntimeStatus};
pub use request::{ExecutionMode, ExecutionReport, ExecutionRequest, Executor};
pub use sandbox::{RuntimeHandle, RuntimeLoader, SandboxLoader, SandboxRuntime};
pub use session::{InteractiveSession, SessionHandlers, SessionOutcome, SessionState};
pub use snippet::{Snippet, SnippetTarget};
pub use terminal::{LineKind, TerminalLine, TerminalLineModel};

/// Largest call depth accepted by [`RuntimeConfig::validate`].
pub const MAX_CALL_DEPTH_CEILING: usize = 500;

/// Configuration for the sandboxed runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Statements and loop iterations a single run may execute
    pub max_steps: u64,

    /// Maximum nesting of guest function calls
    pub max_call_depth: usize,

    /// Run the self-check program while loading
    pub self_check: bool,

    /// Upper bound the CLI waits for the runtime to load, in milliseconds
    pub ready_timeout_ms: u64,

    /// Enable debug tracing
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_steps: limits.max_steps,
            max_call_depth: limits.max_call_depth,
            self_check: true,
            ready_timeout_ms: 10_000,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Interpreter limits derived from this configuration
    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_call_depth: self.max_call_depth,
        }
    }

    /// Reject configurations the sandbox cannot honour
    pub fn validate(&self) -> Result<(), RuntimeInitError> {
        if self.max_steps == 0 {
            return Err(RuntimeInitError::Config(
                "max_steps must be greater than zero".into(),
            ));
        }
        if self.max_call_depth == 0 || self.max_call_depth > MAX_CALL_DEPTH_CEILING {
            return Err(RuntimeInitError::Config(format!(
                "max_call_depth must be between 1 and {MAX_CALL_DEPTH_CEILING}, got {}",
                self.max_call_depth
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: RuntimeConfig =
            serde_json::from_slice(&data).context("Failed to deserialize config")?;
        Ok(config)
    }

    /// Write configuration as pretty JSON, replacing the file atomically
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move config into {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_round_trips_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.json");

        let config = RuntimeConfig {
            max_steps: 1234,
            debug: true,
            ..RuntimeConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(RuntimeConfig::load(&path).unwrap(), config);
        assert!(!temp.path().join("runtime.tmp").exists());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.json");
        std::fs::write(&path, r#"{ "max_call_depth": 64 }"#).unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.max_steps, RuntimeConfig::default().max_steps);
    }

    #[test]
    fn test_validate_rejects_unusable_limits() {
        let zero_steps = RuntimeConfig {
            max_steps: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            zero_steps.validate(),
            Err(RuntimeInitError::Config(_))
        ));

        let too_deep = RuntimeConfig {
            max_call_depth: MAX_CALL_DEPTH_CEILING + 1,
            ..RuntimeConfig::default()
        };
        assert!(too_deep.validate().is_err());
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_config_file_reports_path() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/runtime.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/runtime.json"));
    }
}
