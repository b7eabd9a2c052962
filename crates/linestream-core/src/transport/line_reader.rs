//! Line-at-a-time reading with stall detection

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Buffered byte source behind a stream
pub type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;

/// Result of one bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A non-blank line, line terminator stripped
    Line(String),
    /// A blank line sent by the server to signal liveness
    KeepAlive,
    /// Nothing arrived within the stall threshold
    TimedOut,
    /// The source reached end of stream with no pending content
    Closed,
    /// The read was interrupted by a stop request
    Cancelled,
}

/// Reads newline-delimited records from a stream body
pub struct LineReader {
    source: LineSource,
    /// Bytes of the current line; survives interrupted reads
    pending: Vec<u8>,
    lines_read: u64,
}

impl LineReader {
    pub fn new<R>(source: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            source: Box::new(source),
            pending: Vec::new(),
            lines_read: 0,
        }
    }

    /// Lines returned so far, keep-alives included
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Read the next line, waiting at most `stall`
    ///
    /// The read races the stall timer and `cancel`. The losing read future is
    /// dropped on the spot, so a late result or fault can never surface; bytes
    /// it already consumed stay in `pending`.
    pub async fn read_line(
        &mut self,
        stall: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<ReadOutcome> {
        let read = self.source.read_until(b'\n', &mut self.pending);

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ReadOutcome::Cancelled),
            result = tokio::time::timeout(stall, read) => match result {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(error)) => {
                    self.pending.clear();
                    return Err(error);
                }
                Err(_) => {
                    debug!("No data within {:?}", stall);
                    return Ok(ReadOutcome::TimedOut);
                }
            },
        };

        if bytes == 0 && self.pending.is_empty() {
            return Ok(ReadOutcome::Closed);
        }

        // An unterminated final line still counts; the next call reports Closed
        let line = take_line(&mut self.pending);
        self.lines_read += 1;

        if line.trim().is_empty() {
            Ok(ReadOutcome::KeepAlive)
        } else {
            Ok(ReadOutcome::Line(line))
        }
    }
}

fn take_line(pending: &mut Vec<u8>) -> String {
    if pending.last() == Some(&b'\n') {
        pending.pop();
        if pending.last() == Some(&b'\r') {
            pending.pop();
        }
    }
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}
