use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{Backend, Error, Ioctl, IoctlReply, Result, Stream, StreamFlags};

/// A stream over a file on disk.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    flags: StreamFlags,
}

impl FileStream {
    /// Opens an existing file. `flags` selects reading, writing or both.
    pub fn open<P: AsRef<Path>>(path: P, flags: StreamFlags) -> Result<Stream> {
        let file = OpenOptions::new()
            .read(flags.contains(StreamFlags::READ))
            .write(flags.contains(StreamFlags::WRITE))
            .open(path)?;
        Ok(FileStream::from_file(file, flags))
    }

    /// Creates (or truncates) a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Stream> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(FileStream::from_file(file, StreamFlags::RDWR))
    }

    /// Opens a file for appending, creating it if needed.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Stream> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(FileStream::from_file(file, StreamFlags::WRITE))
    }

    /// Wraps an already open file.
    pub fn from_file(file: File, flags: StreamFlags) -> Stream {
        Stream::new(FileStream {
            file,
            flags: (flags & StreamFlags::RDWR) | StreamFlags::SEEK,
        })
    }
}

impl Backend for FileStream {
    fn flags(&self) -> StreamFlags {
        self.flags
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::Start(pos))?)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        match op {
            #[cfg(unix)]
            Ioctl::GetTransport => {
                use std::os::unix::io::AsRawFd;
                Ok(IoctlReply::Fd(self.file.as_raw_fd()))
            }
            _ => Err(Error::Unsupported),
        }
    }
}
