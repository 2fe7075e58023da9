//! Lifecycle owner of the sandboxed runtime.
//!
//! The manager lazily loads the runtime on first demand. Concurrent callers
//! share one in-flight load, and the outcome (handle or error) is memoized
//! until an explicit [`RuntimeManager::reset`].

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::RuntimeConfig;
use super::error::RuntimeInitError;
use super::sandbox::{RuntimeHandle, RuntimeLoader, SandboxLoader};

type LoadFuture = Shared<BoxFuture<'static, Result<RuntimeHandle, RuntimeInitError>>>;

enum State {
    Uninitialized,
    Loading(LoadFuture),
    Ready(RuntimeHandle),
    Failed(RuntimeInitError),
}

/// Data-only view of the manager state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum RuntimeStatus {
    /// No load attempted since creation or the last reset
    Uninitialized,
    /// A load is in flight
    Loading,
    /// A handle is available
    Ready,
    /// The last load failed
    Failed(String),
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Uninitialized => write!(f, "uninitialized"),
            RuntimeStatus::Loading => write!(f, "loading"),
            RuntimeStatus::Ready => write!(f, "ready"),
            RuntimeStatus::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Owns the runtime lifecycle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RuntimeManager {
    loader: Arc<dyn RuntimeLoader>,
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("status", &self.status())
            .finish()
    }
}

impl RuntimeManager {
    /// Manager using the default [`SandboxLoader`] for `config`.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_loader(SandboxLoader::new(config))
    }

    /// Manager backed by a custom loader.
    pub fn with_loader(loader: impl RuntimeLoader) -> Self {
        Self {
            loader: Arc::new(loader),
            state: Arc::new(Mutex::new(State::Uninitialized)),
        }
    }

    /// Resolve to a ready handle, loading the runtime if needed.
    ///
    /// A `Failed` manager returns its stored error without retrying; call
    /// [`reset`](Self::reset) first to try again.
    pub async fn ensure_ready(&self) -> Result<RuntimeHandle, RuntimeInitError> {
        let pending = {
            let mut state = self.state.lock();
            match &*state {
                State::Ready(handle) => return Ok(handle.clone()),
                State::Failed(err) => return Err(err.clone()),
                State::Loading(pending) => {
                    debug!("joining in-flight runtime load");
                    pending.clone()
                }
                State::Uninitialized => {
                    let pending = self.start_load();
                    *state = State::Loading(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// [`ensure_ready`](Self::ensure_ready) bounded by `timeout`.
    ///
    /// Timing out abandons the wait only; the load keeps running and records
    /// its outcome.
    pub async fn ensure_ready_within(
        &self,
        timeout: Duration,
    ) -> Result<RuntimeHandle, RuntimeInitError> {
        match tokio::time::timeout(timeout, self.ensure_ready()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?timeout, "timed out waiting for runtime");
                Err(RuntimeInitError::Timeout(timeout))
            }
        }
    }

    fn start_load(&self) -> LoadFuture {
        info!("loading sandbox runtime");
        let loader = self.loader.clone();
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async { loader.load().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(RuntimeInitError::Aborted("loader panicked".into())))
                .map(Arc::new);

            let mut state = state.lock();
            match &outcome {
                Ok(handle) => {
                    info!(
                        runtime = %handle.id(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "sandbox runtime ready"
                    );
                    *state = State::Ready(handle.clone());
                }
                Err(err) => {
                    warn!(error = %err, "sandbox runtime failed to load");
                    *state = State::Failed(err.clone());
                }
            }
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|err| Err(RuntimeInitError::Aborted(err.to_string())))
        }
        .boxed()
        .shared()
    }

    /// Whether a handle is available right now.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), State::Ready(_))
    }

    /// The stored error when `Failed`.
    pub fn last_error(&self) -> Option<RuntimeInitError> {
        match &*self.state.lock() {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Current ready handle, without waiting.
    pub fn handle(&self) -> Option<RuntimeHandle> {
        match &*self.state.lock() {
            State::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Snapshot of the lifecycle state.
    pub fn status(&self) -> RuntimeStatus {
        match &*self.state.lock() {
            State::Uninitialized => RuntimeStatus::Uninitialized,
            State::Loading(_) => RuntimeStatus::Loading,
            State::Ready(_) => RuntimeStatus::Ready,
            State::Failed(err) => RuntimeStatus::Failed(err.to_string()),
        }
    }

    /// Forget a `Ready` handle or `Failed` error so the next
    /// [`ensure_ready`](Self::ensure_ready) loads again. Ignored while loading.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        match &*state {
            State::Loading(_) => debug!("reset ignored while runtime is loading"),
            State::Uninitialized => {}
            State::Ready(_) | State::Failed(_) => {
                info!("resetting sandbox runtime");
                *state = State::Uninitialized;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Limits;
    use crate::runtime::sandbox::SandboxRuntime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyLoader {
        attempts: Arc<AtomicUsize>,
        failures: usize,
    }

    impl RuntimeLoader for FlakyLoader {
        fn load(&self) -> BoxFuture<'static, Result<SandboxRuntime, RuntimeInitError>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            let fail = attempt < self.failures;
            async move {
                if fail {
                    Err(RuntimeInitError::Load(format!("attempt {attempt} failed")))
                } else {
                    Ok(SandboxRuntime::new(Limits::default()))
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_ready_is_memoized() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = RuntimeManager::with_loader(FlakyLoader {
            attempts: attempts.clone(),
            failures: 0,
        });
        assert_eq!(manager.status(), RuntimeStatus::Uninitialized);

        let first = manager.ensure_ready().await.unwrap();
        let second = manager.ensure_ready().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_failure_is_terminal_until_reset() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = RuntimeManager::with_loader(FlakyLoader {
            attempts: attempts.clone(),
            failures: 1,
        });

        let err = manager.ensure_ready().await.unwrap_err();
        assert_eq!(manager.last_error(), Some(err.clone()));
        assert_eq!(manager.ensure_ready().await.unwrap_err(), err);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        manager.reset();
        assert_eq!(manager.status(), RuntimeStatus::Uninitialized);
        manager.ensure_ready().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(manager.last_error().is_none());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RuntimeStatus::Loading.to_string(), "loading");
        assert_eq!(
            RuntimeStatus::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }
}
