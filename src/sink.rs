// src/sink.rs

//! Destinations for piped subprocess output.
//!
//! The subsystem never inspects what it writes; it only forwards bytes to
//! the "standard" or "error" side of an [`OutputSink`].

use std::io::{self, Write};
use std::sync::Mutex;

use tracing::{info, warn};

/// A console/log sink with independent standard and error streams.
pub trait OutputSink: Send + Sync {
    fn write_out(&self, bytes: &[u8]) -> io::Result<()>;

    fn write_err(&self, bytes: &[u8]) -> io::Result<()>;

    /// Write a text line to the error stream, logging instead of failing.
    ///
    /// Used for the subsystem's own notices (exit codes, launch failures).
    fn notice(&self, line: &str) {
        let mut text = line.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if let Err(e) = self.write_err(text.as_bytes()) {
            warn!(error = %e, notice = %line, "failed to write notice to sink");
        }
    }
}

/// Forwards output to the host's own stdout/stderr.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    // Serializes writers so chunks from different processes don't interleave
    // mid-chunk.
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for ConsoleSink {
    fn write_out(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()
    }

    fn write_err(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut err = io::stderr().lock();
        err.write_all(bytes)?;
        err.flush()
    }
}

/// Forwards output to `tracing`, one event per line.
///
/// Partial lines are buffered until their newline arrives or the sink is
/// dropped.
#[derive(Debug)]
pub struct TracingSink {
    name: String,
    pending: Mutex<(Vec<u8>, Vec<u8>)>,
}

impl TracingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Mutex::new((Vec::new(), Vec::new())),
        }
    }

    fn emit(&self, stream: &'static str, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\r', '\n']);
        if stream == "stderr" {
            warn!(process = %self.name, stream, "{}", text);
        } else {
            info!(process = %self.name, stream, "{}", text);
        }
    }

    fn feed(&self, stderr: bool, bytes: &[u8]) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let (buf, stream) = if stderr {
            (&mut pending.1, "stderr")
        } else {
            (&mut pending.0, "stdout")
        };

        buf.extend_from_slice(bytes);
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            self.emit(stream, &line);
        }
    }
}

impl OutputSink for TracingSink {
    fn write_out(&self, bytes: &[u8]) -> io::Result<()> {
        self.feed(false, bytes);
        Ok(())
    }

    fn write_err(&self, bytes: &[u8]) -> io::Result<()> {
        self.feed(true, bytes);
        Ok(())
    }
}

impl Drop for TracingSink {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(|p| p.into_inner());
        let out = std::mem::take(&mut pending.0);
        let err = std::mem::take(&mut pending.1);
        if !out.is_empty() {
            self.emit("stdout", &out);
        }
        if !err.is_empty() {
            self.emit("stderr", &err);
        }
    }
}
