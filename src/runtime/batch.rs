//! Run guest source to completion and collect what it wrote.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ProtocolMisuseError;
use super::manager::RuntimeManager;
use super::sandbox::SandboxRuntime;
use crate::interpreter::{GuestHost, Stream};

/// Captured result of a batch run. Empty strings mean nothing to report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Everything written to stdout
    pub output: String,
    /// Everything written to stderr, followed by the uncaught exception if any
    pub error: String,
}

impl BatchOutput {
    /// Whether the run produced error text.
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Host that buffers both streams and has no input source.
///
/// `input()` writes its prompt to stdout and then sees end of input, so the
/// guest raises `EOFError` just as it would with a closed stdin.
#[derive(Debug, Default)]
pub(crate) struct CaptureHost {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl GuestHost for CaptureHost {
    fn write(&mut self, stream: Stream, text: &str) {
        match stream {
            Stream::Stdout => self.stdout.push_str(text),
            Stream::Stderr => self.stderr.push_str(text),
        }
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.stdout.push_str(prompt);
        None
    }
}

/// Execute `source` on `runtime`, blocking the current thread.
pub(crate) fn run_to_completion(runtime: &SandboxRuntime, source: &str) -> BatchOutput {
    let mut host = CaptureHost::default();
    let result = runtime.execute(source, &mut host);

    let mut error = host.stderr;
    if let Err(err) = result {
        if !error.is_empty() && !error.ends_with('\n') {
            error.push('\n');
        }
        error.push_str(&err.to_string());
    }
    BatchOutput {
        output: host.stdout,
        error,
    }
}

/// Runs whole programs against the manager's runtime.
#[derive(Debug, Clone)]
pub struct BatchExecutionEngine {
    manager: RuntimeManager,
}

impl BatchExecutionEngine {
    /// Engine bound to `manager`.
    pub fn new(manager: RuntimeManager) -> Self {
        Self { manager }
    }

    /// Run `source` to completion.
    ///
    /// Does not initialize the runtime: calling this before the manager is
    /// ready is a protocol error. Guest exceptions are reported in
    /// [`BatchOutput::error`], never as `Err`.
    pub async fn run(&self, source: &str) -> Result<BatchOutput, ProtocolMisuseError> {
        let runtime = self
            .manager
            .handle()
            .ok_or_else(|| ProtocolMisuseError::NotReady {
                state: self.manager.status().to_string(),
            })?;

        debug!(runtime = %runtime.id(), bytes = source.len(), "batch run starting");
        let source = source.to_owned();
        let output = tokio::task::spawn_blocking(move || run_to_completion(&runtime, &source))
            .await
            .map_err(|err| ProtocolMisuseError::WorkerLost(err.to_string()))?;
        debug!(
            output_bytes = output.output.len(),
            failed = output.has_error(),
            "batch run finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Limits;

    fn run(source: &str) -> BatchOutput {
        run_to_completion(&SandboxRuntime::new(Limits::default()), source)
    }

    #[test]
    fn test_stdout_and_stderr_are_split() {
        let out = run("import sys\nprint('hi')\nprint('warn', file=sys.stderr)\n");
        assert_eq!(out.output, "hi\n");
        assert_eq!(out.error, "warn\n");
    }

    #[test]
    fn test_uncaught_exception_lands_in_error() {
        let out = run("print('before')\nraise ValueError('bad input')\n");
        assert_eq!(out.output, "before\n");
        assert_eq!(out.error, "ValueError: bad input (line 2)");
    }

    #[test]
    fn test_input_raises_eof_in_batch_mode() {
        let out = run("name = input('Name: ')\nprint(name)\n");
        assert_eq!(out.output, "Name: ");
        assert!(out.error.starts_with("EOFError"));
    }

    #[test]
    fn test_syntax_errors_are_reported_not_raised() {
        let out = run("if True\n    print(1)\n");
        assert!(out.output.is_empty());
        assert!(out.error.starts_with("SyntaxError"));
    }

    #[tokio::test]
    async fn test_run_before_ready_is_misuse() {
        let engine = BatchExecutionEngine::new(RuntimeManager::new(Default::default()));
        let err = engine.run("print(1)").await.unwrap_err();
        assert!(matches!(err, ProtocolMisuseError::NotReady { .. }));
    }
}
