use std::cmp::min;
use std::io::{Error, ErrorKind, Read, Result, Write};

/// An in-memory transport for tests: reads come from a fixed buffer, writes
/// accumulate in `written_buf`.
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    pub written_buf: Vec<u8>,
    err_on_write: bool,
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream {
            read_buf,
            read_pos: 0,
            written_buf: Vec::new(),
            err_on_write: false,
        }
    }

    /// A stream whose writes fail, for connection-loss tests.
    pub fn new_write_err() -> MockStream {
        MockStream {
            read_buf: Vec::new(),
            read_pos: 0,
            written_buf: Vec::new(),
            err_on_write: true,
        }
    }

    /// Everything written so far, as lossy UTF-8.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written_buf).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_pos >= self.read_buf.len() {
            return Err(Error::new(ErrorKind::UnexpectedEof, "EOF"));
        }
        let len = min(buf.len(), self.read_buf.len() - self.read_pos);
        buf[..len].copy_from_slice(&self.read_buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        Ok(len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.err_on_write {
            return Err(Error::new(ErrorKind::Other, "MockStream write error"));
        }
        self.written_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
