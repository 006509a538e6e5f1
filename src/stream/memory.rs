use std::cmp;

use super::{Backend, Ioctl, IoctlReply, Result, Stream, StreamFlags};

/// A seekable stream kept entirely in memory.
///
/// [`Ioctl::GetTransport`] replies with a copy of the contents, which makes
/// a memory stream a handy sink for inspecting what was written through a
/// stack of composed streams.
#[derive(Debug, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryStream {
    /// Creates an empty memory stream.
    pub fn create() -> Stream {
        Stream::new(MemoryStream::default())
    }

    /// Creates a memory stream holding `data`, positioned at its start.
    pub fn with_contents<T: Into<Vec<u8>>>(data: T) -> Stream {
        Stream::new(MemoryStream {
            data: data.into(),
            pos: 0,
        })
    }
}

impl Backend for MemoryStream {
    fn flags(&self) -> StreamFlags {
        StreamFlags::RDWR | StreamFlags::SEEK
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = cmp::min(self.pos, self.data.len());
        let n = cmp::min(buf.len(), self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos = start + n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        self.pos = pos as usize;
        Ok(pos)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        match op {
            Ioctl::GetTransport => Ok(IoctlReply::Bytes(self.data.clone())),
            _ => Err(super::Error::Unsupported),
        }
    }
}
