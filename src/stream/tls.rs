use std::io::{Read, Write};

use native_tls::{HandshakeError, TlsConnector};
use tracing::debug;

use super::{Backend, Error, Ioctl, IoctlReply, Ownership, Result, Stream, StreamFlags};

/// A TLS session layered over another stream.
///
/// The wrapped stream is usually a [`SocketStream`](super::SocketStream),
/// but any readable and writable stream will do. Control operations the
/// TLS layer does not handle go to the wrapped stream.
pub struct TlsStream {
    inner: native_tls::TlsStream<Stream>,
    ownership: Ownership,
}

impl TlsStream {
    /// Performs a client handshake for `domain` over `transport`.
    pub fn connect(
        domain: &str,
        transport: Stream,
        connector: &TlsConnector,
        ownership: Ownership,
    ) -> Result<Stream> {
        let inner = match connector.connect(domain, transport) {
            Ok(inner) => inner,
            Err(HandshakeError::Failure(e)) => return Err(e.into()),
            Err(HandshakeError::WouldBlock(mid)) => {
                if ownership == Ownership::Owned {
                    let _ = mid.get_ref().close();
                }
                return Err(Error::WouldBlock);
            }
        };
        debug!(domain, "TLS session established");
        Ok(Stream::new(TlsStream { inner, ownership }))
    }
}

impl Backend for TlsStream {
    fn flags(&self) -> StreamFlags {
        StreamFlags::RDWR
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.inner.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.inner.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    fn close(&mut self) -> Result<()> {
        if let Err(e) = self.inner.shutdown() {
            debug!(error = %e, "TLS shutdown failed");
        }
        match self.ownership {
            Ownership::Owned => self.inner.get_ref().close(),
            Ownership::Borrowed => Ok(()),
        }
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        self.inner.get_ref().ioctl(op.clone())
    }
}
