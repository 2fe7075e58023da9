//! Ordered, typed terminal log shared between a session and its display.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// What a terminal line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Guest stdout
    Output,
    /// Guest stderr or the final exception
    Error,
    /// Prompt of a pending `input()` call
    InputPrompt,
    /// Value supplied for the preceding prompt
    InputEcho,
}

/// One displayed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalLine {
    /// Unique, monotonically increasing id
    pub id: u64,
    /// Line kind
    pub kind: LineKind,
    /// Text without trailing newline
    pub text: String,
}

#[derive(Debug, Default)]
struct Log {
    lines: Vec<TerminalLine>,
    next_id: u64,
}

/// Append-only line log. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct TerminalLineModel {
    log: Arc<Mutex<Log>>,
}

impl TerminalLineModel {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and return its id.
    pub fn append(&self, kind: LineKind, text: impl Into<String>) -> u64 {
        let mut log = self.log.lock();
        let id = log.next_id;
        log.next_id += 1;
        log.lines.push(TerminalLine {
            id,
            kind,
            text: text.into(),
        });
        id
    }

    /// Copy of all lines in emission order.
    pub fn snapshot(&self) -> Vec<TerminalLine> {
        self.log.lock().lines.clone()
    }

    /// Drop all lines. Ids are never reused afterwards.
    pub fn clear(&self) {
        self.log.lock().lines.clear();
    }

    /// Number of lines currently held.
    pub fn len(&self) -> usize {
        self.log.lock().lines.len()
    }

    /// Whether the log holds no lines.
    pub fn is_empty(&self) -> bool {
        self.log.lock().lines.is_empty()
    }

    /// Kind of the most recent line.
    pub fn last_kind(&self) -> Option<LineKind> {
        self.log.lock().lines.last().map(|line| line.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_across_clear() {
        let model = TerminalLineModel::new();
        let a = model.append(LineKind::Output, "a");
        let b = model.append(LineKind::Error, "b");
        assert!(b > a);

        model.clear();
        assert!(model.is_empty());
        let c = model.append(LineKind::Output, "c");
        assert!(c > b);
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_clones_share_the_log() {
        let model = TerminalLineModel::new();
        let view = model.clone();
        model.append(LineKind::InputPrompt, "Q: ");
        model.append(LineKind::InputEcho, "42");

        let lines = view.snapshot();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, LineKind::InputPrompt);
        assert_eq!(lines[1].text, "42");
        assert_eq!(view.last_kind(), Some(LineKind::InputEcho));
    }
}
