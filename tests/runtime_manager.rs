use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use codebridge::interpreter::Limits;
use codebridge::runtime::{
    BatchExecutionEngine, InteractiveSession, ProtocolMisuseError, RuntimeConfig,
    RuntimeInitError, RuntimeLoader, RuntimeManager, RuntimeStatus, SandboxRuntime,
    SessionHandlers,
};
use futures::FutureExt;
use futures::future::BoxFuture;

struct SlowLoader {
    attempts: Arc<AtomicUsize>,
    delay: Duration,
    failures: usize,
}

impl SlowLoader {
    fn new(delay: Duration, failures: usize) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                attempts: attempts.clone(),
                delay,
                failures,
            },
            attempts,
        )
    }
}

impl RuntimeLoader for SlowLoader {
    fn load(&self) -> BoxFuture<'static, Result<SandboxRuntime, RuntimeInitError>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = attempt < self.failures;
        let delay = self.delay;
        async move {
            tokio::time::sleep(delay).await;
            if fail {
                Err(RuntimeInitError::Load(format!("attempt {attempt} failed")))
            } else {
                Ok(SandboxRuntime::new(Limits::default()))
            }
        }
        .boxed()
    }
}

struct PanickingLoader;

fn explode() -> Result<SandboxRuntime, RuntimeInitError> {
    panic!("loader exploded")
}

impl RuntimeLoader for PanickingLoader {
    fn load(&self) -> BoxFuture<'static, Result<SandboxRuntime, RuntimeInitError>> {
        async move { explode() }.boxed()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_load() {
    let (loader, attempts) = SlowLoader::new(Duration::from_millis(50), 0);
    let manager = RuntimeManager::with_loader(loader);

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_ready().await })
        })
        .collect();

    let mut handles = Vec::new();
    for waiter in waiters {
        handles.push(waiter.await.unwrap().unwrap());
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(handles.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(manager.status(), RuntimeStatus::Ready);
}

#[tokio::test]
async fn failed_load_is_shared_and_retried_only_after_reset() {
    let (loader, attempts) = SlowLoader::new(Duration::from_millis(10), 1);
    let manager = RuntimeManager::with_loader(loader);

    let (a, b) = tokio::join!(manager.ensure_ready(), manager.ensure_ready());
    let err = a.unwrap_err();
    assert_eq!(b.unwrap_err(), err);
    assert!(matches!(manager.status(), RuntimeStatus::Failed(_)));

    // Failed is terminal until reset.
    assert_eq!(manager.ensure_ready().await.unwrap_err(), err);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    manager.reset();
    manager.ensure_ready().await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(manager.is_ready());
}

#[tokio::test]
async fn timeout_abandons_wait_but_not_load() {
    let (loader, attempts) = SlowLoader::new(Duration::from_millis(150), 0);
    let manager = RuntimeManager::with_loader(loader);

    let err = manager
        .ensure_ready_within(Duration::from_millis(10))
        .await
        .unwrap_err();
    assert_eq!(err, RuntimeInitError::Timeout(Duration::from_millis(10)));
    assert_eq!(manager.status(), RuntimeStatus::Loading);

    // Reset is ignored while the load is in flight.
    manager.reset();
    assert_eq!(manager.status(), RuntimeStatus::Loading);

    manager.ensure_ready().await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_loader_fails_instead_of_hanging() {
    let manager = RuntimeManager::with_loader(PanickingLoader);
    let err = manager.ensure_ready().await.unwrap_err();
    assert!(matches!(err, RuntimeInitError::Aborted(_)));
    assert_eq!(manager.last_error(), Some(err));
}

#[tokio::test]
async fn engines_refuse_to_run_before_ready() {
    let manager = RuntimeManager::new(RuntimeConfig::default());

    let err = BatchExecutionEngine::new(manager.clone())
        .run("print(1)")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolMisuseError::NotReady {
            state: "uninitialized".into()
        }
    );

    let session = InteractiveSession::new(manager.clone());
    let err = session
        .run_interactive("print(1)", SessionHandlers::without_input())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolMisuseError::NotReady { .. }));
    assert!(session.transcript().is_empty());

    // Neither engine starts a load on its own.
    assert_eq!(manager.status(), RuntimeStatus::Uninitialized);
}

#[tokio::test]
async fn invalid_config_fails_initialization() {
    let manager = RuntimeManager::new(RuntimeConfig {
        max_call_depth: 0,
        ..RuntimeConfig::default()
    });
    let err = manager.ensure_ready().await.unwrap_err();
    assert!(matches!(err, RuntimeInitError::Config(_)));
    assert!(err.to_string().contains("max_call_depth"));
}
