use std::cmp;

use super::{
    Backend, Error, Ioctl, IoctlReply, Ownership, Result, Stream, StreamFlags, Transport,
    DEFAULT_BUFFER_SIZE,
};

/// Makes a forward-only stream seekable by keeping everything read from it.
///
/// Seeking past the cached data reads ahead from the wrapped stream; asking
/// for the size reads it to the end.
pub struct CacheStream {
    transport: Transport,
    cache: Vec<u8>,
    pos: usize,
    complete: bool,
}

impl CacheStream {
    /// Wraps `transport`, which must be readable.
    pub fn create(transport: Stream, ownership: Ownership) -> Stream {
        Stream::new(CacheStream {
            transport: Transport::new(transport, ownership),
            cache: Vec::new(),
            pos: 0,
            complete: false,
        })
    }

    // Reads one more chunk into the cache; false at end of input.
    fn fetch(&mut self) -> Result<bool> {
        if self.complete {
            return Ok(false);
        }
        let mut chunk = [0u8; DEFAULT_BUFFER_SIZE];
        match self.transport.get().read(&mut chunk)? {
            0 => {
                self.complete = true;
                Ok(false)
            }
            n => {
                self.cache.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
        }
    }
}

impl Backend for CacheStream {
    fn flags(&self) -> StreamFlags {
        StreamFlags::READ | StreamFlags::SEEK
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.cache.len() && !self.fetch()? {
            return Ok(0);
        }
        let n = cmp::min(buf.len(), self.cache.len() - self.pos);
        buf[..n].copy_from_slice(&self.cache[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        let pos = usize::try_from(pos).map_err(|_| Error::InvalidArgument("seek offset"))?;
        while self.cache.len() < pos {
            if !self.fetch()? {
                return Err(Error::InvalidArgument("seek past end of stream"));
            }
        }
        self.pos = pos;
        Ok(pos as u64)
    }

    fn size(&mut self) -> Result<u64> {
        while self.fetch()? {}
        Ok(self.cache.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.transport.release()
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        self.transport.get().ioctl(op.clone())
    }
}
