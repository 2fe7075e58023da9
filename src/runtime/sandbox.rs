//! The loaded sandbox and the loader seam used by the manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use super::RuntimeConfig;
use super::batch::CaptureHost;
use super::error::RuntimeInitError;
use crate::interpreter::{GuestHost, Interpreter, Limits, ScriptError, parse_program};

/// Shared handle to a ready runtime.
pub type RuntimeHandle = Arc<SandboxRuntime>;

/// Program run while loading to prove the interpreter works end to end.
const SELF_CHECK_PROGRAM: &str = "\
squares = [n * n for n in range(4)]
label = 'ready'
print(f'{label} {sum(squares)}')
";
const SELF_CHECK_EXPECTED: &str = "ready 14\n";

/// An initialized interpreter runtime.
///
/// The runtime itself is stateless between runs: every execution starts with
/// a fresh global namespace. It does track whether a run is in flight so
/// overlapping use can be reported.
#[derive(Debug)]
pub struct SandboxRuntime {
    id: Uuid,
    loaded_at: DateTime<Utc>,
    limits: Limits,
    busy: AtomicBool,
}

impl SandboxRuntime {
    /// Create a runtime enforcing `limits`.
    pub fn new(limits: Limits) -> Self {
        Self {
            id: Uuid::new_v4(),
            loaded_at: Utc::now(),
            limits,
            busy: AtomicBool::new(false),
        }
    }

    /// Unique id of this runtime instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the runtime finished loading.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Limits applied to every run.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Parse and run `source` to completion, routing all I/O through `host`.
    ///
    /// Blocks the calling thread; async callers go through `spawn_blocking`.
    pub fn execute(&self, source: &str, host: &mut dyn GuestHost) -> Result<(), ScriptError> {
        let _guard = self.enter();
        let program = parse_program(source)?;
        let mut interpreter = Interpreter::new(host, self.limits);
        let result = interpreter.run(&program);
        debug!(
            runtime = %self.id,
            steps = interpreter.steps(),
            ok = result.is_ok(),
            "guest run finished"
        );
        result
    }

    fn enter(&self) -> BusyGuard<'_> {
        let overlapping = self.busy.swap(true, Ordering::AcqRel);
        if overlapping {
            warn!(runtime = %self.id, "concurrent runs on one runtime; output may interleave");
        }
        BusyGuard {
            busy: &self.busy,
            owner: !overlapping,
        }
    }

    fn self_check(&self) -> Result<(), RuntimeInitError> {
        let mut host = CaptureHost::default();
        self.execute(SELF_CHECK_PROGRAM, &mut host)
            .map_err(|err| RuntimeInitError::SelfCheck(err.to_string()))?;
        if host.stdout != SELF_CHECK_EXPECTED {
            return Err(RuntimeInitError::SelfCheck(format!(
                "unexpected output {:?}",
                host.stdout
            )));
        }
        Ok(())
    }
}

struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    owner: bool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.owner {
            self.busy.store(false, Ordering::Release);
        }
    }
}

/// Produces a runtime for the manager.
pub trait RuntimeLoader: Send + Sync + 'static {
    /// Start loading. The returned future is driven on its own task.
    fn load(&self) -> BoxFuture<'static, Result<SandboxRuntime, RuntimeInitError>>;
}

/// Default loader: validates the configuration and self-checks the interpreter.
#[derive(Debug, Clone, Default)]
pub struct SandboxLoader {
    config: RuntimeConfig,
}

impl SandboxLoader {
    /// Loader for `config`.
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Configuration this loader applies.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl RuntimeLoader for SandboxLoader {
    fn load(&self) -> BoxFuture<'static, Result<SandboxRuntime, RuntimeInitError>> {
        let config = self.config.clone();
        async move {
            config.validate()?;
            let limits = config.limits();
            if !config.self_check {
                return Ok(SandboxRuntime::new(limits));
            }
            tokio::task::spawn_blocking(move || {
                let runtime = SandboxRuntime::new(limits);
                runtime.self_check().map(|()| runtime)
            })
            .await
            .map_err(|err| RuntimeInitError::Aborted(err.to_string()))?
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_loader_passes_self_check() {
        let runtime = SandboxLoader::default().load().await.unwrap();
        assert_eq!(runtime.limits(), Limits::default());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_loading() {
        let loader = SandboxLoader::new(RuntimeConfig {
            max_steps: 0,
            ..RuntimeConfig::default()
        });
        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, RuntimeInitError::Config(_)));
    }

    #[tokio::test]
    async fn test_starved_step_budget_fails_self_check() {
        let loader = SandboxLoader::new(RuntimeConfig {
            max_steps: 2,
            ..RuntimeConfig::default()
        });
        let err = loader.load().await.unwrap_err();
        match err {
            RuntimeInitError::SelfCheck(message) => assert!(message.contains("TimeoutError")),
            other => panic!("expected self-check failure, got {other:?}"),
        }
    }

    #[test]
    fn test_busy_flag_is_released_after_run() {
        let runtime = SandboxRuntime::new(Limits::default());
        let mut host = CaptureHost::default();
        runtime.execute("print(1)", &mut host).unwrap();
        assert!(!runtime.busy.load(Ordering::Acquire));
        assert_eq!(host.stdout, "1\n");
    }
}
