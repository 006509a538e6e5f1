//! Composable byte streams.
//!
//! A [`Stream`] is a cloneable, reference-counted handle to a byte source
//! and/or sink. The actual I/O is delegated to a [`Backend`]; the handle
//! layers read and write buffering, error bookkeeping and lifetime rules on
//! top of it, so that every kind of stream (files, memory, sockets, TLS,
//! filters, transcripts) behaves the same way to its users.
//!
//! Streams compose: a [`FilterStream`], [`XscriptStream`], [`CacheStream`]
//! or [`IoStream`] wraps other streams, either taking ownership of them (the
//! wrapped stream is closed together with the wrapper) or merely borrowing
//! them.
//!
//! ```no_run
//! use mailstream::stream::{MemoryStream, Ownership, XscriptStream};
//!
//! let mem = MemoryStream::create();
//! let traced = XscriptStream::client(mem.clone(), Ownership::Borrowed);
//! traced.write_all(b"A1 NOOP\r\n").unwrap();
//! traced.flush().unwrap();
//! ```

use std::cmp;
use std::fmt;
use std::io::{self, SeekFrom};
use std::net::Shutdown;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, trace};

mod cache;
mod file;
mod filter;
mod iostream;
mod memory;
mod socket;
#[cfg(feature = "native-tls")]
mod tls;
mod xscript;

pub use self::cache::CacheStream;
pub use self::file::FileStream;
pub use self::filter::{
    Base64Decoder, Base64Encoder, CrlfDecoder, CrlfEncoder, Filter, FilterDirection,
    FilterStream,
};
pub use self::iostream::IoStream;
pub use self::memory::MemoryStream;
pub use self::socket::SocketStream;
#[cfg(feature = "native-tls")]
pub use self::tls::TlsStream;
pub use self::xscript::{TranscriptLevel, XscriptStream};

/// Size of the buffer a stream gets when none is requested.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

bitflags! {
    /// What a stream is able to do.
    pub struct StreamFlags: u32 {
        /// The stream can be read from.
        const READ = 0x01;
        /// The stream can be written to.
        const WRITE = 0x02;
        /// The stream supports random access.
        const SEEK = 0x04;
        /// Operations on the stream do not block.
        const NONBLOCK = 0x08;
        /// Shorthand for `READ | WRITE`.
        const RDWR = Self::READ.bits | Self::WRITE.bits;
    }
}

/// Errors produced by streams.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The stream has been closed.
    #[error("stream is closed")]
    Closed,
    /// A seek or size query was made on a stream that does not support it.
    #[error("stream is not seekable")]
    NotSeekable,
    /// The stream was not opened for the requested direction.
    #[error("stream is not open for {0}")]
    NotPermitted(&'static str),
    /// The backend does not implement the requested control operation.
    #[error("operation not supported by this stream")]
    Unsupported,
    /// A write made no progress.
    #[error("short write: {written} of {requested} bytes")]
    ShortWrite {
        /// Bytes that made it out.
        written: usize,
        /// Bytes that were requested.
        requested: usize,
    },
    /// The operation cannot complete right now and may be retried.
    #[error("operation would block")]
    WouldBlock,
    /// An argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A filter was fed data it cannot transform.
    #[error("filter error: {0}")]
    Filter(String),
    /// An error from the `native_tls` library.
    #[cfg(feature = "native-tls")]
    #[error("TLS error: {0}")]
    Tls(#[source] Arc<native_tls::Error>),
    /// An operating system error.
    #[error("{0}")]
    Io(#[source] Arc<io::Error>),
}

impl Error {
    /// Returns true if the failed operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }

    /// Errors that are remembered and reported by every later operation.
    fn is_permanent(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() != io::ErrorKind::Interrupted,
            Error::ShortWrite { .. } | Error::Filter(_) => true,
            #[cfg(feature = "native-tls")]
            Error::Tls(_) => true,
            _ => false,
        }
    }

    fn is_interrupted(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::Interrupted)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            _ => Error::Io(Arc::new(err)),
        }
    }
}

#[cfg(feature = "native-tls")]
impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Error {
        Error::Tls(Arc::new(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        let kind = match &err {
            Error::Io(e) => e.kind(),
            Error::WouldBlock => io::ErrorKind::WouldBlock,
            Error::NotSeekable | Error::Unsupported => io::ErrorKind::Unsupported,
            Error::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            Error::Filter(_) => io::ErrorKind::InvalidData,
            Error::ShortWrite { .. } => io::ErrorKind::WriteZero,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// A convenience wrapper around `Result` for stream errors.
pub type Result<T> = std::result::Result<T, Error>;

/// How a stream buffers data between its user and its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    /// Every call goes straight to the backend.
    None,
    /// Writes are passed on at each newline.
    Line,
    /// Data is passed on once the buffer of the given size fills up.
    Full(usize),
}

impl BufferType {
    fn read_capacity(self) -> usize {
        match self {
            BufferType::None => 0,
            BufferType::Line => DEFAULT_BUFFER_SIZE,
            BufferType::Full(size) => cmp::max(size, 1),
        }
    }
}

impl Default for BufferType {
    fn default() -> Self {
        BufferType::Full(DEFAULT_BUFFER_SIZE)
    }
}

/// Whether a composed stream owns the stream it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The wrapped stream is closed when the wrapper is closed.
    Owned,
    /// The wrapped stream is left open.
    Borrowed,
}

/// Stream control operations.
///
/// Each backend handles the operations that make sense for it and reports
/// [`Error::Unsupported`] for the rest. Composed streams forward what they
/// do not handle themselves to the stream they wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ioctl {
    /// Ask for the innermost transport: a file descriptor for files and
    /// sockets, the contents for memory streams.
    GetTransport,
    /// Set socket timeouts. `None` means block forever.
    SetTimeouts {
        /// Read timeout.
        read: Option<Duration>,
        /// Write timeout.
        write: Option<Duration>,
    },
    /// Shut down one or both directions of a connection.
    Shutdown(Shutdown),
    /// Query the verbosity of a transcript stream.
    GetTranscriptLevel,
    /// Change the verbosity of a transcript stream. Replies with the
    /// previous level.
    SetTranscriptLevel(TranscriptLevel),
    /// Query the direction of a filter stream.
    GetFilterDirection,
}

/// The answer to an [`Ioctl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoctlReply {
    /// The operation was carried out and has nothing to report.
    None,
    /// A raw file descriptor.
    Fd(i32),
    /// A copy of the bytes backing the stream.
    Bytes(Vec<u8>),
    /// A transcript level.
    TranscriptLevel(TranscriptLevel),
    /// A filter direction.
    Direction(FilterDirection),
}

/// The I/O primitives behind a [`Stream`].
///
/// Backends see unbuffered calls only. A read returning `Ok(0)` means end of
/// input. Writes may be partial; the stream retries until everything is out.
pub trait Backend: Send {
    /// Capabilities of this backend.
    fn flags(&self) -> StreamFlags;

    /// Reads up to `buf.len()` bytes.
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::NotPermitted("reading"))
    }

    /// Writes some prefix of `buf`, returning how much was taken.
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::NotPermitted("writing"))
    }

    /// Pushes out anything the backend holds.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases the resources behind the backend. Called at most once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Moves to an absolute position.
    fn seek(&mut self, _pos: u64) -> Result<u64> {
        Err(Error::NotSeekable)
    }

    /// Total size of the underlying data.
    fn size(&mut self) -> Result<u64> {
        Err(Error::NotSeekable)
    }

    /// Performs a control operation.
    fn ioctl(&mut self, _op: &Ioctl) -> Result<IoctlReply> {
        Err(Error::Unsupported)
    }
}

struct Core {
    backend: Box<dyn Backend>,
    flags: StreamFlags,
    open: bool,
    eof: bool,
    last_error: Option<Error>,
    buftype: BufferType,
    rbuf: Vec<u8>,
    rpos: usize,
    wbuf: Vec<u8>,
    // position of the backend, which trails or leads the logical position by
    // whatever sits in the buffers
    offset: u64,
}

impl Core {
    fn check(&self) -> Result<()> {
        if !self.open {
            return Err(Error::Closed);
        }
        match &self.last_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn require(&self, flag: StreamFlags, what: &'static str) -> Result<()> {
        if self.flags.contains(flag) {
            Ok(())
        } else {
            Err(Error::NotPermitted(what))
        }
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        if err.is_permanent() {
            debug!(error = %err, "stream entered error state");
            self.last_error = Some(err.clone());
        }
        Err(err)
    }

    fn unread(&self) -> usize {
        self.rbuf.len() - self.rpos
    }

    fn position(&self) -> u64 {
        if self.unread() > 0 {
            self.offset - self.unread() as u64
        } else {
            self.offset + self.wbuf.len() as u64
        }
    }

    fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.backend.read(buf) {
                Ok(n) => {
                    self.offset += n as u64;
                    self.eof = n == 0;
                    return Ok(n);
                }
                Err(e) if e.is_interrupted() => continue,
                Err(e) => return self.fail(e),
            }
        }
    }

    fn fill(&mut self) -> Result<usize> {
        self.flush_writes()?;
        let mut buf = std::mem::take(&mut self.rbuf);
        buf.resize(self.buftype.read_capacity(), 0);
        self.rpos = 0;
        let res = self.raw_read(&mut buf);
        buf.truncate(*res.as_ref().unwrap_or(&0));
        self.rbuf = buf;
        res
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check()?;
        self.require(StreamFlags::READ, "reading")?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buftype == BufferType::None && self.unread() == 0 {
            self.flush_writes()?;
            return self.raw_read(buf);
        }
        if self.unread() == 0 && self.fill()? == 0 {
            return Ok(0);
        }
        let n = cmp::min(buf.len(), self.unread());
        buf[..n].copy_from_slice(&self.rbuf[self.rpos..self.rpos + n]);
        self.rpos += n;
        Ok(n)
    }

    fn read_line(&mut self, line: &mut Vec<u8>) -> Result<usize> {
        self.check()?;
        self.require(StreamFlags::READ, "reading")?;
        let start = line.len();
        if self.buftype == BufferType::None && self.unread() == 0 {
            self.flush_writes()?;
            let mut byte = [0u8; 1];
            while self.raw_read(&mut byte)? == 1 {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            return Ok(line.len() - start);
        }
        loop {
            if self.unread() == 0 && self.fill()? == 0 {
                break;
            }
            let avail = &self.rbuf[self.rpos..];
            match avail.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    line.extend_from_slice(&avail[..=i]);
                    self.rpos += i + 1;
                    break;
                }
                None => {
                    line.extend_from_slice(avail);
                    self.rpos = self.rbuf.len();
                }
            }
        }
        Ok(line.len() - start)
    }

    // Writes out `data`, removing what was written even on failure. A backend
    // that would block after taking part of the data yields the partial
    // count instead of the error.
    fn drain(&mut self, data: &mut Vec<u8>) -> Result<usize> {
        let requested = data.len();
        let mut written = 0;
        let res = loop {
            if written == requested {
                break Ok(written);
            }
            match self.backend.write(&data[written..]) {
                Ok(0) => break Err(Error::ShortWrite { written, requested }),
                Ok(n) => {
                    written += n;
                    self.offset += n as u64;
                }
                Err(e) if e.is_interrupted() => continue,
                Err(e) if e.is_transient() && written > 0 => break Ok(written),
                Err(e) => break Err(e),
            }
        };
        data.drain(..written);
        match res {
            Ok(n) => Ok(n),
            Err(e) => self.fail(e),
        }
    }

    fn flush_writes(&mut self) -> Result<()> {
        if self.wbuf.is_empty() {
            return Ok(());
        }
        let mut data = std::mem::take(&mut self.wbuf);
        let res = self.drain(&mut data);
        self.wbuf = data;
        match res {
            Ok(_) if !self.wbuf.is_empty() => Err(Error::WouldBlock),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // Before writing to a seekable stream, move the backend back to where the
    // reader logically is.
    fn discard_read_buffer(&mut self) -> Result<()> {
        if self.rbuf.is_empty() || !self.flags.contains(StreamFlags::SEEK) {
            return Ok(());
        }
        let pos = self.position();
        self.rbuf.clear();
        self.rpos = 0;
        match self.backend.seek(pos) {
            Ok(p) => {
                self.offset = p;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check()?;
        self.require(StreamFlags::WRITE, "writing")?;
        self.discard_read_buffer()?;
        match self.buftype {
            BufferType::None => return self.drain(&mut buf.to_vec()),
            BufferType::Line => {
                self.wbuf.extend_from_slice(buf);
                if let Some(i) = self.wbuf.iter().rposition(|&b| b == b'\n') {
                    let rest = self.wbuf.split_off(i + 1);
                    let res = self.flush_writes();
                    self.wbuf.extend_from_slice(&rest);
                    res?;
                }
            }
            BufferType::Full(size) => {
                self.wbuf.extend_from_slice(buf);
                if self.wbuf.len() >= size {
                    self.flush_writes()?;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.check()?;
        self.flush_writes()?;
        match self.backend.flush() {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        self.check()?;
        if !self.flags.contains(StreamFlags::SEEK) {
            return Err(Error::NotSeekable);
        }
        let target = match from {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(d) => i128::from(self.position()) + i128::from(d),
            SeekFrom::End(d) => {
                self.flush_writes()?;
                i128::from(self.backend.size()?) + i128::from(d)
            }
        };
        let target =
            u64::try_from(target).map_err(|_| Error::InvalidArgument("seek before start"))?;
        self.flush_writes()?;
        let buf_start = self.offset - self.rbuf.len() as u64;
        if !self.rbuf.is_empty() && target >= buf_start && target <= self.offset {
            self.rpos = (target - buf_start) as usize;
            self.eof = false;
            return Ok(target);
        }
        self.rbuf.clear();
        self.rpos = 0;
        match self.backend.seek(target) {
            Ok(pos) => {
                self.offset = pos;
                self.eof = false;
                Ok(pos)
            }
            Err(e) => self.fail(e),
        }
    }

    fn size(&mut self) -> Result<u64> {
        self.check()?;
        self.flush_writes()?;
        self.backend.size()
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.flush_writes()?;
        self.backend.ioctl(op)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let flushed = if self.last_error.is_none() {
            self.flush()
        } else {
            Ok(())
        };
        let closed = self.backend.close();
        self.open = false;
        self.rbuf = Vec::new();
        self.rpos = 0;
        self.wbuf = Vec::new();
        flushed.and(closed)
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "error closing stream on release");
        }
    }
}

/// A handle to a stream.
///
/// Cloning a `Stream` takes another reference to the same stream; the
/// stream is closed when the last reference is dropped, or explicitly by
/// [`Stream::close`], which closes it for every holder.
#[derive(Clone)]
pub struct Stream {
    core: Arc<Mutex<Core>>,
}

impl Stream {
    /// Wraps a backend in a stream with default buffering.
    pub fn new<B: Backend + 'static>(backend: B) -> Stream {
        Stream::with_buffer(backend, BufferType::default())
    }

    /// Wraps a backend in a stream with the given buffering.
    pub fn with_buffer<B: Backend + 'static>(backend: B, buftype: BufferType) -> Stream {
        let flags = backend.flags();
        trace!(?flags, ?buftype, "stream opened");
        Stream {
            core: Arc::new(Mutex::new(Core {
                backend: Box::new(backend),
                flags,
                open: true,
                eof: false,
                last_error: None,
                buftype,
                rbuf: Vec::new(),
                rpos: 0,
                wbuf: Vec::new(),
                offset: 0,
            })),
        }
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capabilities of the stream.
    pub fn flags(&self) -> StreamFlags {
        self.core().flags
    }

    /// Number of live handles to this stream.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.core)
    }

    /// Returns true if both handles refer to the same stream.
    pub fn same(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Returns true until the stream is closed.
    pub fn is_open(&self) -> bool {
        self.core().open
    }

    /// Returns true once a read has hit end of input.
    pub fn is_eof(&self) -> bool {
        self.core().eof
    }

    /// The permanent error the stream is stuck in, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.core().last_error.clone()
    }

    /// Forgets a recorded permanent error.
    pub fn clear_error(&self) {
        self.core().last_error = None;
    }

    /// Changes buffering. Pending output is flushed first.
    pub fn set_buffer(&self, buftype: BufferType) -> Result<()> {
        let mut core = self.core();
        core.check()?;
        core.flush_writes()?;
        core.buftype = buftype;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes; `Ok(0)` means end of input.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.core().read(buf)
    }

    /// Reads until `buf` is full.
    pub fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut core = self.core();
        let mut filled = 0;
        while filled < buf.len() {
            match core.read(&mut buf[filled..])? {
                0 => {
                    return Err(Error::Io(Arc::new(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "end of stream inside a fixed-size read",
                    ))))
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Appends one line, including its `\n`, to `line`.
    ///
    /// Returns the number of bytes appended. Zero means end of input; a
    /// final line without a newline is returned as is.
    pub fn read_line(&self, line: &mut Vec<u8>) -> Result<usize> {
        self.core().read_line(line)
    }

    /// Reads everything up to end of input onto `buf`, returning the byte
    /// count.
    pub fn read_to_end(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut core = self.core();
        let start = buf.len();
        let mut chunk = [0u8; DEFAULT_BUFFER_SIZE];
        loop {
            match core.read(&mut chunk)? {
                0 => return Ok(buf.len() - start),
                n => buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Writes `buf`, returning how much of it was taken. The count is short
    /// only when an unbuffered nonblocking backend blocks partway through.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.core().write(buf)
    }

    /// Writes all of `buf`.
    pub fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Writes formatted text.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(s) => self.write_all(s.as_bytes()),
            None => self.write_all(fmt::format(args).as_bytes()),
        }
    }

    /// Pushes buffered output through to the backend.
    pub fn flush(&self) -> Result<()> {
        self.core().flush()
    }

    /// Moves the logical position of a seekable stream.
    pub fn seek(&self, from: SeekFrom) -> Result<u64> {
        self.core().seek(from)
    }

    /// The logical position of a seekable stream.
    pub fn tell(&self) -> Result<u64> {
        let core = self.core();
        core.check()?;
        if !core.flags.contains(StreamFlags::SEEK) {
            return Err(Error::NotSeekable);
        }
        Ok(core.position())
    }

    /// Total size of a seekable stream.
    pub fn size(&self) -> Result<u64> {
        self.core().size()
    }

    /// Performs a control operation.
    pub fn ioctl(&self, op: Ioctl) -> Result<IoctlReply> {
        self.core().ioctl(&op)
    }

    /// Flushes and closes the stream for every holder. Closing twice is a
    /// no-op; any later I/O fails with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        self.core().close()
    }

    /// Copies everything left in `self` to `dst`, returning the byte count.
    pub fn copy_to(&self, dst: &Stream) -> Result<u64> {
        let mut buf = vec![0; DEFAULT_BUFFER_SIZE];
        let mut total = 0;
        loop {
            match self.read(&mut buf)? {
                0 => return Ok(total),
                n => {
                    dst.write_all(&buf[..n])?;
                    total += n as u64;
                }
            }
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_lock() {
            Ok(core) => f
                .debug_struct("Stream")
                .field("flags", &core.flags)
                .field("open", &core.open)
                .field("refs", &Arc::strong_count(&self.core))
                .finish(),
            Err(_) => f.write_str("Stream { <busy> }"),
        }
    }
}

impl io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Stream::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Stream::flush(self).map_err(io::Error::from)
    }
}

impl io::Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Stream::seek(self, pos).map_err(io::Error::from)
    }
}

/// A stream held by a composed stream, released according to its
/// [`Ownership`].
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    stream: Stream,
    ownership: Ownership,
}

impl Transport {
    pub(crate) fn new(stream: Stream, ownership: Ownership) -> Transport {
        Transport { stream, ownership }
    }

    pub(crate) fn get(&self) -> &Stream {
        &self.stream
    }

    pub(crate) fn release(&self) -> Result<()> {
        match self.ownership {
            Ownership::Owned => self.stream.close(),
            Ownership::Borrowed => Ok(()),
        }
    }
}
