use std::io::{self, Read, Write};
use std::net::{self, Shutdown, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::{Backend, Error, Ioctl, IoctlReply, Result, Stream, StreamFlags};

/// A stream over a TCP connection.
///
/// Sockets are not seekable. Timeouts set through [`Ioctl::SetTimeouts`]
/// turn a stalled read or write into a permanent `TimedOut` error rather
/// than a retryable one.
#[derive(Debug)]
pub struct SocketStream {
    sock: net::TcpStream,
    timed: bool,
}

impl SocketStream {
    /// Connects to `addr`, trying each resolved address in turn.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Option<Duration>) -> Result<Stream> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            let res = match timeout {
                Some(t) => net::TcpStream::connect_timeout(&addr, t),
                None => net::TcpStream::connect(addr),
            };
            match res {
                Ok(sock) => {
                    debug!(%addr, "connected");
                    return Ok(SocketStream::from_std(sock));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
            })
            .into())
    }

    /// Wraps a connected socket.
    pub fn from_std(sock: net::TcpStream) -> Stream {
        Stream::new(SocketStream { sock, timed: false })
    }

    fn map_err(&self, err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut if self.timed => {
                io::Error::new(io::ErrorKind::TimedOut, "socket operation timed out").into()
            }
            _ => err.into(),
        }
    }
}

impl Backend for SocketStream {
    fn flags(&self) -> StreamFlags {
        StreamFlags::RDWR
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.sock.read(buf).map_err(|e| self.map_err(e))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.sock.write(buf).map_err(|e| self.map_err(e))
    }

    fn flush(&mut self) -> Result<()> {
        self.sock.flush().map_err(|e| self.map_err(e))
    }

    fn close(&mut self) -> Result<()> {
        match self.sock.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        match op {
            #[cfg(unix)]
            Ioctl::GetTransport => {
                use std::os::unix::io::AsRawFd;
                Ok(IoctlReply::Fd(self.sock.as_raw_fd()))
            }
            Ioctl::SetTimeouts { read, write } => {
                self.sock.set_read_timeout(*read)?;
                self.sock.set_write_timeout(*write)?;
                self.timed = read.is_some() || write.is_some();
                Ok(IoctlReply::None)
            }
            Ioctl::Shutdown(how) => {
                self.sock.shutdown(*how)?;
                Ok(IoctlReply::None)
            }
            _ => Err(Error::Unsupported),
        }
    }
}
