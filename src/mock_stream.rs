use std::cmp::min;
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex};

use crate::stream::{self, Backend, Stream, StreamFlags};

/// Scripted transport for driving a client in tests. Reads replay a fixed
/// buffer; writes are collected where the test can still see them after the
/// stream has been handed to a client.
#[derive(Default)]
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    written: Written,
    err_on_read: bool,
    eof_on_read: bool,
    trickle: bool,
}

/// Shared view of everything written to a [`MockStream`].
#[derive(Clone, Default)]
pub struct Written(Arc<Mutex<Vec<u8>>>);

impl Written {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream::default().with_buf(read_buf)
    }

    pub fn with_buf(mut self, read_buf: Vec<u8>) -> MockStream {
        self.read_buf = read_buf;
        self
    }

    pub fn with_eof(mut self) -> MockStream {
        self.eof_on_read = true;
        self
    }

    pub fn with_err(mut self) -> MockStream {
        self.err_on_read = true;
        self
    }

    /// Deliver input one byte per read.
    pub fn with_delay(mut self) -> MockStream {
        self.trickle = true;
        self
    }

    pub fn written(&self) -> Written {
        self.written.clone()
    }

    pub fn into_stream(self) -> Stream {
        Stream::new(self)
    }
}

impl Backend for MockStream {
    fn flags(&self) -> StreamFlags {
        StreamFlags::RDWR
    }

    fn read(&mut self, buf: &mut [u8]) -> stream::Result<usize> {
        if self.eof_on_read {
            return Ok(0);
        }
        if self.err_on_read {
            return Err(Error::new(ErrorKind::Other, "MockStream Error").into());
        }
        let mut len = min(buf.len(), self.read_buf.len() - self.read_pos);
        if self.trickle {
            len = min(len, 1);
        }
        buf[..len].copy_from_slice(&self.read_buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        Ok(len)
    }

    fn write(&mut self, buf: &[u8]) -> stream::Result<usize> {
        self.written.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
}
