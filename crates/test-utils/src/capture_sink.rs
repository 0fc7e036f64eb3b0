use std::io;
use std::sync::Mutex;

use procwatch::OutputSink;

/// An `OutputSink` that records everything written to it.
#[derive(Debug, Default)]
pub struct CaptureSink {
    out: Mutex<Vec<u8>>,
    err: Mutex<Vec<u8>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.out.lock().unwrap()).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.err.lock().unwrap()).into_owned()
    }
}

impl OutputSink for CaptureSink {
    fn write_out(&self, bytes: &[u8]) -> io::Result<()> {
        self.out.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn write_err(&self, bytes: &[u8]) -> io::Result<()> {
        self.err.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}
