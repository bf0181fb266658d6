#![allow(dead_code)]

use std::io;

/// A writer that collects output and fails once it has been written to
/// `limit` times.
pub struct Writer {
    buf: Vec<u8>,
    writes: usize,
    limit: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self::with_max(usize::MAX)
    }

    pub fn with_max(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            writes: 0,
            limit,
        }
    }

    #[track_caller]
    pub fn into_string(self) -> String {
        String::from_utf8(self.buf).unwrap()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writes == self.limit {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "writer closed"));
        }
        self.writes += 1;
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
