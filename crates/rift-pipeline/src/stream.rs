//! Line-oriented streaming of container output.

use rift_core::domain::{Result, RiftError};
use tokio::sync::{mpsc, oneshot};

use crate::backend::ExecutionResult;

/// Splits a byte stream into lines.
///
/// Lines end at `\n`; a trailing `\r` is dropped. Bytes are decoded lossily
/// once a full line is available, so multi-byte characters split across
/// chunks survive.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flush the unterminated remainder, unless it is blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let line = decode_line(&rest);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Handle to a running command.
///
/// Lines arrive on a bounded channel in output order. The completion value
/// (exit code, full output, duration) resolves only after the line channel
/// has been fed its last line.
#[derive(Debug)]
pub struct StreamingExecution {
    lines: mpsc::Receiver<String>,
    completion: oneshot::Receiver<Result<ExecutionResult>>,
}

impl StreamingExecution {
    pub fn new(
        lines: mpsc::Receiver<String>,
        completion: oneshot::Receiver<Result<ExecutionResult>>,
    ) -> Self {
        Self { lines, completion }
    }

    /// A handle for a command that already finished, replaying its output.
    pub fn completed(result: ExecutionResult) -> Self {
        let mut splitter = LineSplitter::new();
        let mut lines = splitter.push(result.output.as_bytes());
        lines.extend(splitter.finish());

        let (line_tx, line_rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            // Capacity covers every line.
            let _ = line_tx.try_send(line);
        }
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(Ok(result));
        Self::new(line_rx, done_rx)
    }

    /// Next output line, or `None` once the command's output is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the final result. Unread lines are discarded.
    pub async fn finish(self) -> Result<ExecutionResult> {
        drop(self.lines);
        self.completion
            .await
            .map_err(|_| RiftError::Container("execution task ended without a result".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_handles_chunk_boundaries() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"collected 3 it"), Vec::<String>::new());
        assert_eq!(splitter.push(b"ems\r\nPASSED\nFAI"), vec!["collected 3 items", "PASSED"]);
        assert_eq!(splitter.push(b"LED\n"), vec!["FAILED"]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_flushes_partial_line() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"first\nno newline").len() == 1);
        assert_eq!(splitter.finish().as_deref(), Some("no newline"));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_skips_blank_remainder() {
        let mut splitter = LineSplitter::new();
        splitter.push(b"done\n   ");
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_keeps_split_utf8() {
        let mut splitter = LineSplitter::new();
        let bytes = "✓ ok\n".as_bytes();
        assert!(splitter.push(&bytes[..1]).is_empty());
        assert_eq!(splitter.push(&bytes[1..]), vec!["✓ ok"]);
    }

    #[tokio::test]
    async fn test_completed_replays_output() {
        let mut exec = StreamingExecution::completed(ExecutionResult {
            exit_code: 1,
            output: "a\nb\nc".into(),
            duration_ms: 5,
        });
        let mut seen = Vec::new();
        while let Some(line) = exec.next_line().await {
            seen.push(line);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        let result = exec.finish().await.unwrap();
        assert_eq!(result.exit_code, 1);
    }
}
