//! One-line look-ahead reader over a byte input source, with stable
//! byte offsets for diagnostics.

use std::io::BufRead;

use crate::error::ReaderSnapshot;

/// The longest byte sequence ending in `\n`, or the trailing segment
/// after the last `\n` if the stream doesn't end in one, held alongside
/// its position in the overall stream.
pub struct LineReader<R> {
    source: Option<R>,
    current_line: Vec<u8>,
    start: u64,
    stop: u64,
    line_number: u64,
    eof: bool,
}

impl<R: BufRead> LineReader<R> {
    /// Creates a reader and primes it with the first line.
    pub fn new(source: R) -> std::io::Result<Self> {
        let mut reader = LineReader {
            source: Some(source),
            current_line: Vec::new(),
            start: 0,
            stop: 0,
            line_number: 0,
            eof: false,
        };
        reader.advance()?;
        Ok(reader)
    }

    pub fn current_line(&self) -> &[u8] {
        &self.current_line
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Reads the next line into `current_line`. On exhaustion, sets
    /// `eof` and closes the input source exactly once.
    pub fn advance(&mut self) -> std::io::Result<()> {
        if self.eof {
            return Ok(());
        }
        let source = self
            .source
            .as_mut()
            .expect("source dropped before eof was set");

        let mut buf = Vec::new();
        let n = source.read_until(b'\n', &mut buf)?;
        self.line_number += 1;
        self.start = self.stop;
        self.stop = self.start + n as u64;
        if n == 0 {
            self.eof = true;
            self.stop = self.start;
            self.current_line.clear();
            self.source = None; // closes the underlying source
        } else {
            self.current_line = buf;
        }
        Ok(())
    }

    /// A debugging snapshot: line number, byte range, and the first ~72
    /// bytes of the current line, for inclusion in error messages.
    pub fn snapshot(&self) -> ReaderSnapshot {
        let preview_len = self.current_line.len().min(72);
        ReaderSnapshot {
            line_number: self.line_number,
            start: self.start,
            stop: self.stop,
            preview: String::from_utf8_lossy(&self.current_line[..preview_len]).into_owned(),
        }
    }
}
