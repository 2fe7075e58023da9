//! Interactive sessions: stream guest output and suspend on `input()`.
//!
//! The guest runs on a blocking worker. Every write and input request is
//! posted on one ordered channel, so the host side sees events exactly in
//! guest order. An input request carries a oneshot reply sender; the guest
//! parks on the receiving end while the host awaits the operator's answer on
//! the async side, so the host event loop never blocks.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ProtocolMisuseError;
use super::manager::RuntimeManager;
use super::terminal::{LineKind, TerminalLineModel};
use crate::interpreter::{GuestHost, ScriptError, Stream};

/// Bound on guest events queued ahead of the host; writers block beyond it.
const EVENT_BUFFER: usize = 256;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not started
    Idle,
    /// Guest is executing
    Running,
    /// Guest is parked on an input request
    AwaitingInput,
    /// Guest completed normally
    Finished,
    /// Guest ended with an uncaught exception
    Crashed,
}

impl SessionState {
    fn in_flight(self) -> bool {
        matches!(self, SessionState::Running | SessionState::AwaitingInput)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Program ran to completion
    Finished,
    /// Program raised an uncaught exception
    Crashed(ScriptError),
}

type LineHandler = Box<dyn FnMut(&str) + Send>;
type InputHandler = Box<dyn FnMut(String) -> BoxFuture<'static, Option<String>> + Send>;

/// Callbacks notified while a session runs.
///
/// `on_input_request` receives the prompt and resolves to the operator's
/// answer; `None` means no answer will come and the guest sees end of input.
pub struct SessionHandlers {
    on_output: LineHandler,
    on_error: LineHandler,
    on_input_request: InputHandler,
}

impl SessionHandlers {
    /// Handlers answering input requests with `on_input_request` and ignoring
    /// output until [`on_output`](Self::on_output) / [`on_error`](Self::on_error)
    /// are set.
    pub fn new<F>(on_input_request: F) -> Self
    where
        F: FnMut(String) -> BoxFuture<'static, Option<String>> + Send + 'static,
    {
        Self {
            on_output: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
            on_input_request: Box::new(on_input_request),
        }
    }

    /// Handlers that answer every input request with end of input.
    pub fn without_input() -> Self {
        Self::new(|_| Box::pin(async { None }))
    }

    /// Set the stdout line callback.
    pub fn on_output(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_output = Box::new(handler);
        self
    }

    /// Set the stderr / exception line callback.
    pub fn on_error(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Box::new(handler);
        self
    }
}

impl fmt::Debug for SessionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandlers").finish_non_exhaustive()
    }
}

enum GuestEvent {
    Write(Stream, String),
    Input {
        prompt: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Guest-side host: forwards everything to the session channel.
struct ChannelHost {
    events: mpsc::Sender<GuestEvent>,
}

impl GuestHost for ChannelHost {
    fn write(&mut self, stream: Stream, text: &str) {
        // The session may already be gone; output then has nowhere to go.
        let _ = self
            .events
            .blocking_send(GuestEvent::Write(stream, text.to_owned()));
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        self.events
            .blocking_send(GuestEvent::Input {
                prompt: prompt.to_owned(),
                reply,
            })
            .ok()?;
        answer.blocking_recv().ok().flatten()
    }
}

/// Splits written text into complete lines, per stream.
#[derive(Default)]
struct LineAssembler {
    partial: Option<(Stream, String)>,
}

impl LineAssembler {
    /// Feed text; returns lines completed by it (including a partial line of
    /// the other stream, flushed by the switch).
    fn push(&mut self, stream: Stream, text: &str) -> Vec<(Stream, String)> {
        let mut lines = Vec::new();
        if self.partial.as_ref().is_some_and(|(s, _)| *s != stream) {
            lines.extend(self.flush());
        }
        let (_, buffer) = self.partial.get_or_insert_with(|| (stream, String::new()));
        buffer.push_str(text);
        while let Some(at) = buffer.find('\n') {
            let line: String = buffer.drain(..=at).collect();
            lines.push((stream, line.trim_end_matches(['\n', '\r']).to_owned()));
        }
        if buffer.is_empty() {
            self.partial = None;
        }
        lines
    }

    fn flush(&mut self) -> Option<(Stream, String)> {
        self.partial.take().filter(|(_, text)| !text.is_empty())
    }
}

/// Clears the in-flight state if the driving future is dropped mid-run.
struct RunGuard {
    state: Arc<Mutex<SessionState>>,
    settled: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.state.lock();
            if state.in_flight() {
                *state = SessionState::Idle;
            }
        }
    }
}

/// Runs guest programs interactively against the manager's runtime.
#[derive(Debug, Clone)]
pub struct InteractiveSession {
    id: Uuid,
    manager: RuntimeManager,
    state: Arc<Mutex<SessionState>>,
    transcript: TerminalLineModel,
}

impl InteractiveSession {
    /// Session with its own transcript.
    pub fn new(manager: RuntimeManager) -> Self {
        Self::with_transcript(manager, TerminalLineModel::new())
    }

    /// Session appending to a caller-provided transcript.
    pub fn with_transcript(manager: RuntimeManager, transcript: TerminalLineModel) -> Self {
        Self {
            id: Uuid::new_v4(),
            manager,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            transcript,
        }
    }

    /// Session id, used in log fields.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Shared handle to the session's terminal log.
    pub fn transcript(&self) -> TerminalLineModel {
        self.transcript.clone()
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock() = next;
    }

    fn emit(&self, handlers: &mut SessionHandlers, stream: Stream, text: &str) {
        match stream {
            Stream::Stdout => {
                self.transcript.append(LineKind::Output, text);
                (handlers.on_output)(text);
            }
            Stream::Stderr => {
                self.transcript.append(LineKind::Error, text);
                (handlers.on_error)(text);
            }
        }
    }

    /// Run `source`, relaying lines to `handlers` and the transcript.
    ///
    /// The transcript is cleared first. Both normal completion and an
    /// uncaught guest exception return `Ok`; the latter ends the transcript
    /// with an `Error` line.
    pub async fn run_interactive(
        &self,
        source: &str,
        mut handlers: SessionHandlers,
    ) -> Result<SessionOutcome, ProtocolMisuseError> {
        let runtime = self
            .manager
            .handle()
            .ok_or_else(|| ProtocolMisuseError::NotReady {
                state: self.manager.status().to_string(),
            })?;
        {
            let mut state = self.state.lock();
            if state.in_flight() {
                warn!(session = %self.id, "session started while a run is in flight");
                return Err(ProtocolMisuseError::SessionBusy);
            }
            *state = SessionState::Running;
        }
        let mut guard = RunGuard {
            state: self.state.clone(),
            settled: false,
        };

        self.transcript.clear();
        info!(session = %self.id, runtime = %runtime.id(), "interactive session started");

        let (events, mut inbox) = mpsc::channel(EVENT_BUFFER);
        let source = source.to_owned();
        let worker = tokio::task::spawn_blocking(move || {
            let mut host = ChannelHost { events };
            runtime.execute(&source, &mut host)
        });

        let mut assembler = LineAssembler::default();
        while let Some(event) = inbox.recv().await {
            match event {
                GuestEvent::Write(stream, text) => {
                    for (stream, line) in assembler.push(stream, &text) {
                        self.emit(&mut handlers, stream, &line);
                    }
                }
                GuestEvent::Input { prompt, reply } => {
                    if let Some((stream, line)) = assembler.flush() {
                        self.emit(&mut handlers, stream, &line);
                    }
                    self.set_state(SessionState::AwaitingInput);
                    self.transcript.append(LineKind::InputPrompt, prompt.clone());
                    debug!(session = %self.id, %prompt, "guest awaiting input");

                    let answer = (handlers.on_input_request)(prompt).await;
                    self.transcript
                        .append(LineKind::InputEcho, answer.clone().unwrap_or_default());
                    self.set_state(SessionState::Running);
                    if reply.send(answer).is_err() {
                        debug!(session = %self.id, "guest stopped waiting for input");
                    }
                }
            }
        }
        if let Some((stream, line)) = assembler.flush() {
            self.emit(&mut handlers, stream, &line);
        }

        let result = worker.await.map_err(|err| {
            warn!(session = %self.id, error = %err, "guest worker lost");
            ProtocolMisuseError::WorkerLost(err.to_string())
        });
        guard.settled = true;
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                self.set_state(SessionState::Crashed);
                return Err(err);
            }
        };

        let outcome = match result {
            Ok(()) => {
                self.set_state(SessionState::Finished);
                SessionOutcome::Finished
            }
            Err(err) => {
                let line = err.to_string();
                self.transcript.append(LineKind::Error, line.clone());
                (handlers.on_error)(&line);
                self.set_state(SessionState::Crashed);
                SessionOutcome::Crashed(err)
            }
        };
        info!(
            session = %self.id,
            state = ?self.state(),
            lines = self.transcript.len(),
            "interactive session ended"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_splits_and_keeps_partials() {
        let mut assembler = LineAssembler::default();
        assert!(assembler.push(Stream::Stdout, "abc").is_empty());
        let lines = assembler.push(Stream::Stdout, "def\nghi\n");
        assert_eq!(
            lines,
            vec![
                (Stream::Stdout, "abcdef".to_string()),
                (Stream::Stdout, "ghi".to_string())
            ]
        );
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_assembler_flushes_on_stream_switch() {
        let mut assembler = LineAssembler::default();
        assembler.push(Stream::Stdout, "progress ");
        let lines = assembler.push(Stream::Stderr, "oops\n");
        assert_eq!(
            lines,
            vec![
                (Stream::Stdout, "progress ".to_string()),
                (Stream::Stderr, "oops".to_string())
            ]
        );
    }

    #[test]
    fn test_in_flight_states() {
        assert!(SessionState::AwaitingInput.in_flight());
        assert!(!SessionState::Finished.in_flight());
        assert!(!SessionState::Idle.in_flight());
    }
}
