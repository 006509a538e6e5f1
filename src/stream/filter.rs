use std::cmp;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::{
    Backend, Error, Ioctl, IoctlReply, Ownership, Result, Stream, StreamFlags, Transport,
    DEFAULT_BUFFER_SIZE,
};

/// Which way a [`FilterStream`] transforms data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDirection {
    /// The filter is applied to data read from the wrapped stream.
    Decode,
    /// The filter is applied to data written to the wrapped stream.
    Encode,
}

/// A byte transformation that can be fed in arbitrary chunks.
pub trait Filter: Send {
    /// Transforms `input`, appending the result to `output`. Bytes that
    /// cannot be processed until more input arrives are held back.
    fn apply(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()>;

    /// Emits whatever is still held back at end of input.
    fn finish(&mut self, _output: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Applies a [`Filter`] to the data flowing through another stream.
pub struct FilterStream {
    transport: Transport,
    filter: Box<dyn Filter>,
    direction: FilterDirection,
    pending: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl FilterStream {
    /// Wraps `transport`. A decoding filter stream is read-only, an encoding
    /// one is write-only.
    pub fn create<F: Filter + 'static>(
        transport: Stream,
        filter: F,
        direction: FilterDirection,
        ownership: Ownership,
    ) -> Stream {
        Stream::new(FilterStream {
            transport: Transport::new(transport, ownership),
            filter: Box::new(filter),
            direction,
            pending: Vec::new(),
            pos: 0,
            finished: false,
        })
    }
}

impl Backend for FilterStream {
    fn flags(&self) -> StreamFlags {
        match self.direction {
            FilterDirection::Decode => StreamFlags::READ,
            FilterDirection::Encode => StreamFlags::WRITE,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut chunk = [0u8; DEFAULT_BUFFER_SIZE];
        while self.pos == self.pending.len() && !self.finished {
            self.pending.clear();
            self.pos = 0;
            match self.transport.get().read(&mut chunk)? {
                0 => {
                    self.filter.finish(&mut self.pending)?;
                    self.finished = true;
                }
                n => self.filter.apply(&chunk[..n], &mut self.pending)?,
            }
        }
        let n = cmp::min(buf.len(), self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut out = Vec::with_capacity(buf.len());
        self.filter.apply(buf, &mut out)?;
        self.transport.get().write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        if self.direction == FilterDirection::Encode {
            self.transport.get().flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut res = Ok(());
        if self.direction == FilterDirection::Encode {
            let mut tail = Vec::new();
            res = self
                .filter
                .finish(&mut tail)
                .and_then(|_| self.transport.get().write_all(&tail))
                .and_then(|_| self.transport.get().flush());
        }
        res.and(self.transport.release())
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        match op {
            Ioctl::GetFilterDirection => Ok(IoctlReply::Direction(self.direction)),
            _ => self.transport.get().ioctl(op.clone()),
        }
    }
}

/// Converts bare `\n` line endings to `\r\n`.
#[derive(Debug, Default)]
pub struct CrlfEncoder {
    last_cr: bool,
}

impl Filter for CrlfEncoder {
    fn apply(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        for &b in input {
            if b == b'\n' && !self.last_cr {
                output.push(b'\r');
            }
            output.push(b);
            self.last_cr = b == b'\r';
        }
        Ok(())
    }
}

/// Converts `\r\n` line endings to `\n`.
#[derive(Debug, Default)]
pub struct CrlfDecoder {
    held_cr: bool,
}

impl Filter for CrlfDecoder {
    fn apply(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        for &b in input {
            if self.held_cr {
                self.held_cr = false;
                if b != b'\n' {
                    output.push(b'\r');
                }
            }
            if b == b'\r' {
                self.held_cr = true;
            } else {
                output.push(b);
            }
        }
        Ok(())
    }

    fn finish(&mut self, output: &mut Vec<u8>) -> Result<()> {
        if self.held_cr {
            self.held_cr = false;
            output.push(b'\r');
        }
        Ok(())
    }
}

/// Encodes data as base64, broken into lines.
#[derive(Debug)]
pub struct Base64Encoder {
    held: Vec<u8>,
    line_length: Option<usize>,
    column: usize,
}

impl Base64Encoder {
    /// An encoder producing 76-column lines terminated by `\r\n`.
    pub fn new() -> Base64Encoder {
        Base64Encoder {
            held: Vec::new(),
            line_length: Some(76),
            column: 0,
        }
    }

    /// An encoder producing a single unbroken line.
    pub fn unwrapped() -> Base64Encoder {
        Base64Encoder {
            line_length: None,
            ..Base64Encoder::new()
        }
    }

    fn emit(&mut self, encoded: &str, output: &mut Vec<u8>) {
        let limit = match self.line_length {
            Some(limit) => limit,
            None => return output.extend_from_slice(encoded.as_bytes()),
        };
        for &b in encoded.as_bytes() {
            if self.column == limit {
                output.extend_from_slice(b"\r\n");
                self.column = 0;
            }
            output.push(b);
            self.column += 1;
        }
    }
}

impl Default for Base64Encoder {
    fn default() -> Self {
        Base64Encoder::new()
    }
}

impl Filter for Base64Encoder {
    fn apply(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        self.held.extend_from_slice(input);
        let whole = self.held.len() - self.held.len() % 3;
        if whole > 0 {
            let encoded = STANDARD.encode(&self.held[..whole]);
            self.held.drain(..whole);
            self.emit(&encoded, output);
        }
        Ok(())
    }

    fn finish(&mut self, output: &mut Vec<u8>) -> Result<()> {
        if !self.held.is_empty() {
            let encoded = STANDARD.encode(&self.held);
            self.held.clear();
            self.emit(&encoded, output);
        }
        Ok(())
    }
}

/// Decodes base64, ignoring whitespace and line breaks.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    held: Vec<u8>,
}

impl Base64Decoder {
    fn decode(&mut self, upto: usize, output: &mut Vec<u8>) -> Result<()> {
        let decoded = STANDARD
            .decode(&self.held[..upto])
            .map_err(|e| Error::Filter(e.to_string()))?;
        self.held.drain(..upto);
        output.extend_from_slice(&decoded);
        Ok(())
    }
}

impl Filter for Base64Decoder {
    fn apply(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        self.held
            .extend(input.iter().copied().filter(|b| !b.is_ascii_whitespace()));
        let whole = self.held.len() - self.held.len() % 4;
        if whole > 0 {
            self.decode(whole, output)?;
        }
        Ok(())
    }

    fn finish(&mut self, output: &mut Vec<u8>) -> Result<()> {
        // unpadded input is tolerated
        match self.held.len() {
            0 => Ok(()),
            1 => {
                self.held.clear();
                Err(Error::Filter("truncated base64 input".into()))
            }
            n => {
                self.held.extend(std::iter::repeat(b'=').take(4 - n));
                self.decode(4, output)
            }
        }
    }
}
