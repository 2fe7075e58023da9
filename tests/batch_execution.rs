use codebridge::runtime::{
    BatchExecutionEngine, ExecutionMode, ExecutionReport, ExecutionRequest, Executor,
    RuntimeConfig, RuntimeManager, SessionHandlers,
};

async fn ready_engine(config: RuntimeConfig) -> BatchExecutionEngine {
    let manager = RuntimeManager::new(config);
    manager.ensure_ready().await.unwrap();
    BatchExecutionEngine::new(manager)
}

#[tokio::test]
async fn collects_stdout_of_a_clean_run() {
    let engine = ready_engine(RuntimeConfig::default()).await;
    let out = engine
        .run(
            "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\n\nprint([fib(i) for i in range(8)])\nprint(f\"{3.14159:.2f}\")\n",
        )
        .await
        .unwrap();
    assert_eq!(out.output, "[0, 1, 1, 2, 3, 5, 8, 13]\n3.14\n");
    assert!(!out.has_error());
}

#[tokio::test]
async fn exception_keeps_prior_output() {
    let engine = ready_engine(RuntimeConfig::default()).await;
    let out = engine
        .run("print('start')\nitems = [1, 2]\nprint(items[5])\n")
        .await
        .unwrap();
    assert_eq!(out.output, "start\n");
    assert!(out.error.starts_with("IndexError"), "{}", out.error);
    assert!(out.error.contains("line 3"));
}

#[tokio::test]
async fn stderr_text_precedes_exception() {
    let engine = ready_engine(RuntimeConfig::default()).await;
    let out = engine
        .run("import sys\nprint('careful', file=sys.stderr, end='')\nx = 1 / 0\n")
        .await
        .unwrap();
    assert_eq!(out.output, "");
    assert!(out.error.starts_with("careful\nZeroDivisionError"), "{}", out.error);
}

#[tokio::test]
async fn step_budget_stops_runaway_programs() {
    let engine = ready_engine(RuntimeConfig {
        max_steps: 10_000,
        ..RuntimeConfig::default()
    })
    .await;
    let out = engine.run("while True:\n    pass\n").await.unwrap();
    assert!(out.error.starts_with("TimeoutError"), "{}", out.error);

    // The runtime stays usable after a limit violation.
    let out = engine.run("print('again')").await.unwrap();
    assert_eq!(out.output, "again\n");
}

#[tokio::test]
async fn executor_initializes_and_routes_batch_requests() {
    let executor = Executor::new(RuntimeManager::new(RuntimeConfig::default()));
    let request = ExecutionRequest::new("print(sum(range(5)))");
    assert_eq!(request.mode(), ExecutionMode::Batch);

    match executor
        .execute(request, SessionHandlers::without_input())
        .await
        .unwrap()
    {
        ExecutionReport::Batch(out) => assert_eq!(out.output, "10\n"),
        other => panic!("expected batch report, got {other:?}"),
    }
    assert!(executor.manager().is_ready());
}

#[tokio::test]
async fn forced_batch_input_sees_end_of_file() {
    let executor = Executor::new(RuntimeManager::new(RuntimeConfig::default()));
    let request = ExecutionRequest::with_mode(
        "try:\n    name = input('Name? ')\nexcept EOFError:\n    print('no input')\n",
        ExecutionMode::Batch,
    );
    match executor
        .execute(request, SessionHandlers::without_input())
        .await
        .unwrap()
    {
        ExecutionReport::Batch(out) => {
            assert_eq!(out.output, "Name? no input\n");
            assert!(!out.has_error());
        }
        other => panic!("expected batch report, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_allocations_come_back_as_memory_errors() {
    let engine = ready_engine(RuntimeConfig::default()).await;
    for source in [
        "print('before')\nx = list(range(10**12))\n",
        "print('before')\nx = sum(range(10**13))\n",
        "print('before')\nx = 'x'.ljust(10**14)\n",
    ] {
        let out = engine.run(source).await.unwrap();
        assert_eq!(out.output, "before\n");
        assert!(out.error.starts_with("MemoryError"), "{}", out.error);
    }

    let out = engine.run("print(len('ab' * 3))").await.unwrap();
    assert_eq!(out.output, "6\n");
}
