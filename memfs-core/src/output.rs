//! Line buffering for guest output.
//!
//! Guests write arbitrary byte fragments through `fd_write`; consumers want
//! whole lines. [`OutputAggregator`] sits between the two and hands each
//! completed line, without its newline, to a [`LineSink`].

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Tracing target of events carrying guest-produced text.
pub const GUEST_TARGET: &str = "memfs::guest";

/// Destination for completed output lines.
pub trait LineSink {
    /// Receive one line. The trailing newline has already been stripped.
    fn emit_line(&mut self, line: &str);
}

impl<F: FnMut(&str)> LineSink for F {
    fn emit_line(&mut self, line: &str) {
        self(line)
    }
}

/// Writes each line to the host's standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn emit_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not fault the guest.
        let _ = writeln!(out, "{}", line);
    }
}

/// Emits each line as an info event under [`GUEST_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn emit_line(&mut self, line: &str) {
        tracing::info!(target: GUEST_TARGET, "{}", line);
    }
}

/// Collects lines in memory behind a clonable handle.
#[derive(Debug, Default, Clone)]
pub struct SharedLines {
    lines: Arc<Mutex<Vec<String>>>,
}

impl SharedLines {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line emitted so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Remove and return every line emitted so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl LineSink for SharedLines {
    fn emit_line(&mut self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Buffers string fragments and emits them line by line.
pub struct OutputAggregator {
    buffer: String,
    sink: Box<dyn LineSink>,
}

impl OutputAggregator {
    /// Create an aggregator that emits into `sink`.
    pub fn new(sink: impl LineSink + 'static) -> Self {
        Self {
            buffer: String::new(),
            sink: Box::new(sink),
        }
    }

    /// Append a fragment, emitting every line it completes.
    pub fn write(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
        while let Some(newline) = self.buffer.find('\n') {
            self.sink.emit_line(&self.buffer[..newline]);
            self.buffer.drain(..=newline);
        }
    }

    /// Emit any trailing partial line.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.sink.emit_line(&rest);
        }
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

impl Default for OutputAggregator {
    fn default() -> Self {
        Self::new(StdoutSink)
    }
}

impl std::fmt::Debug for OutputAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputAggregator")
            .field("pending", &self.buffer)
            .finish_non_exhaustive()
    }
}
