use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use codebridge::runtime::{
    ExecutionReport, ExecutionRequest, Executor, InteractiveSession, LineKind,
    ProtocolMisuseError, RuntimeConfig, RuntimeManager, SessionHandlers, SessionOutcome,
    SessionState, TerminalLine,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;

async fn ready_session() -> InteractiveSession {
    let manager = RuntimeManager::new(RuntimeConfig::default());
    manager.ensure_ready().await.unwrap();
    InteractiveSession::new(manager)
}

/// Handlers answering input requests from a fixed script of replies.
fn scripted(answers: &[Option<&str>]) -> SessionHandlers {
    let mut answers: VecDeque<Option<String>> = answers
        .iter()
        .map(|answer| answer.map(str::to_string))
        .collect();
    SessionHandlers::new(move |_prompt| {
        let answer = answers.pop_front().flatten();
        Box::pin(async move { answer })
    })
}

fn kinds_and_text(lines: &[TerminalLine]) -> Vec<(LineKind, &str)> {
    lines
        .iter()
        .map(|line| (line.kind, line.text.as_str()))
        .collect()
}

#[tokio::test]
async fn prompt_echo_and_output_are_ordered() {
    let session = ready_session().await;
    let outcome = session
        .run_interactive("x = input('Q: ')\nprint(x)\n", scripted(&[Some("42")]))
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Finished);
    assert_eq!(session.state(), SessionState::Finished);
    let lines = session.transcript().snapshot();
    assert_eq!(
        kinds_and_text(&lines),
        vec![
            (LineKind::InputPrompt, "Q: "),
            (LineKind::InputEcho, "42"),
            (LineKind::Output, "42"),
        ]
    );
    assert!(lines.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[tokio::test]
async fn every_prompt_is_followed_by_its_echo() {
    let session = ready_session().await;
    let source = "total = 0\nfor i in range(3):\n    total += int(input(f'n{i}? '))\nprint('total', total)\n";
    session
        .run_interactive(source, scripted(&[Some("1"), Some("2"), Some("3")]))
        .await
        .unwrap();

    let lines = session.transcript().snapshot();
    for (idx, line) in lines.iter().enumerate() {
        if line.kind == LineKind::InputPrompt {
            assert_eq!(lines[idx + 1].kind, LineKind::InputEcho);
        }
    }
    assert_eq!(lines.last().unwrap().text, "total 6");
}

#[tokio::test]
async fn missing_answer_raises_eof_in_the_guest() {
    let session = ready_session().await;
    let source = "try:\n    name = input('> ')\nexcept EOFError:\n    print('eof')\n";
    let outcome = session
        .run_interactive(source, scripted(&[None]))
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Finished);
    assert_eq!(
        kinds_and_text(&session.transcript().snapshot()),
        vec![
            (LineKind::InputPrompt, "> "),
            (LineKind::InputEcho, ""),
            (LineKind::Output, "eof"),
        ]
    );
}

#[tokio::test]
async fn uncaught_exception_ends_with_error_line() {
    let session = ready_session().await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let handlers = SessionHandlers::without_input().on_error(move |line| {
        sink.lock().push(line.to_string());
    });

    let outcome = session
        .run_interactive("print('a')\nraise ValueError('nope')\n", handlers)
        .await
        .unwrap();

    match outcome {
        SessionOutcome::Crashed(err) => assert_eq!(err.kind, "ValueError"),
        other => panic!("expected crash, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Crashed);
    let lines = session.transcript().snapshot();
    let last = lines.last().unwrap();
    assert_eq!(last.kind, LineKind::Error);
    assert_eq!(last.text, "ValueError: nope (line 2)");
    assert_eq!(*errors.lock(), vec!["ValueError: nope (line 2)".to_string()]);
}

#[tokio::test]
async fn partial_output_is_flushed_before_prompt() {
    let session = ready_session().await;
    let outputs = Arc::new(Mutex::new(Vec::new()));
    let sink = outputs.clone();
    let handlers =
        scripted(&[Some("Bo")]).on_output(move |line| sink.lock().push(line.to_string()));

    session
        .run_interactive(
            "print('Name', end='')\nn = input(': ')\nprint('hi ' + n, end='')\n",
            handlers,
        )
        .await
        .unwrap();

    assert_eq!(
        kinds_and_text(&session.transcript().snapshot()),
        vec![
            (LineKind::Output, "Name"),
            (LineKind::InputPrompt, ": "),
            (LineKind::InputEcho, "Bo"),
            (LineKind::Output, "hi Bo"),
        ]
    );
    assert_eq!(*outputs.lock(), vec!["Name".to_string(), "hi Bo".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_while_awaiting_input_is_rejected() {
    let session = ready_session().await;
    let (answer_tx, answer_rx) = oneshot::channel::<String>();
    let mut pending = Some(answer_rx);
    let handlers = SessionHandlers::new(move |_prompt| {
        let rx = pending.take();
        Box::pin(async move {
            match rx {
                Some(rx) => rx.await.ok(),
                None => None,
            }
        })
    });

    let running = session.clone();
    let first = tokio::spawn(async move {
        running
            .run_interactive("x = input('wait: ')\nprint('got', x)\n", handlers)
            .await
    });

    for _ in 0..200 {
        if session.state() == SessionState::AwaitingInput {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.state(), SessionState::AwaitingInput);

    let err = session
        .run_interactive("print(1)", SessionHandlers::without_input())
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolMisuseError::SessionBusy);

    answer_tx.send("yes".to_string()).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), SessionOutcome::Finished);
    assert_eq!(
        session.transcript().snapshot().last().unwrap().text,
        "got yes"
    );
}

#[tokio::test]
async fn rerun_clears_transcript_and_keeps_ids_increasing() {
    let session = ready_session().await;
    session
        .run_interactive("print('one')", SessionHandlers::without_input())
        .await
        .unwrap();
    let first = session.transcript().snapshot();

    session
        .run_interactive("print('two')", SessionHandlers::without_input())
        .await
        .unwrap();
    let second = session.transcript().snapshot();

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].text, "two");
    assert!(second[0].id > first[0].id);
}

#[tokio::test]
async fn executor_routes_input_programs_to_the_session() {
    let executor = Executor::new(RuntimeManager::new(RuntimeConfig::default()));
    let report = executor
        .execute(
            ExecutionRequest::new("age = int(input('Age: '))\nprint(age + 1)\n"),
            scripted(&[Some("41")]),
        )
        .await
        .unwrap();

    match report {
        ExecutionReport::Interactive {
            outcome,
            transcript,
        } => {
            assert_eq!(outcome, SessionOutcome::Finished);
            assert_eq!(transcript.last().unwrap().text, "42");
        }
        other => panic!("expected interactive report, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_allocation_ends_the_session_with_an_error_line() {
    let session = ready_session().await;
    for source in [
        "n = int(input('n? '))\nx = list(range(n))\n",
        "n = int(input('n? '))\nx = 'x'.ljust(n)\n",
    ] {
        let outcome = session
            .run_interactive(source, scripted(&[Some("1000000000000")]))
            .await
            .unwrap();

        match outcome {
            SessionOutcome::Crashed(err) => assert_eq!(err.kind, "MemoryError"),
            other => panic!("expected crash, got {other:?}"),
        }
        let last = session.transcript().snapshot().pop().unwrap();
        assert_eq!(last.kind, LineKind::Error);
        assert!(last.text.starts_with("MemoryError"), "{}", last.text);
    }
}
