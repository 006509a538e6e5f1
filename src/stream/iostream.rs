use std::net::Shutdown;

use super::{Backend, Error, Ioctl, IoctlReply, Ownership, Result, Stream, StreamFlags, Transport};

/// Joins a readable stream and a writable stream into one bidirectional
/// stream, as needed when a session runs over a pair of pipes.
pub struct IoStream {
    input: Transport,
    output: Transport,
}

impl IoStream {
    /// Reads go to `input`, writes to `output`.
    pub fn create(input: Stream, output: Stream, ownership: Ownership) -> Stream {
        Stream::new(IoStream {
            input: Transport::new(input, ownership),
            output: Transport::new(output, ownership),
        })
    }
}

impl Backend for IoStream {
    fn flags(&self) -> StreamFlags {
        StreamFlags::RDWR
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.input.get().read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.output.get().write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.output.get().flush()
    }

    fn close(&mut self) -> Result<()> {
        let out = self.output.release();
        let inp = self.input.release();
        out.and(inp)
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        match op {
            Ioctl::Shutdown(Shutdown::Read) => self.input.get().ioctl(op.clone()),
            Ioctl::Shutdown(Shutdown::Write) => self.output.get().ioctl(op.clone()),
            Ioctl::Shutdown(Shutdown::Both) | Ioctl::SetTimeouts { .. } => {
                let results = [
                    self.input.get().ioctl(op.clone()),
                    self.output.get().ioctl(op.clone()),
                ];
                let mut supported = false;
                for res in results {
                    match res {
                        Ok(_) => supported = true,
                        Err(Error::Unsupported) => {}
                        Err(e) => return Err(e),
                    }
                }
                if supported {
                    Ok(IoctlReply::None)
                } else {
                    Err(Error::Unsupported)
                }
            }
            _ => self.input.get().ioctl(op.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    #[test]
    fn reads_one_writes_other() {
        let input = MemoryStream::with_contents("* OK hi\r\n");
        let output = MemoryStream::create();
        let s = IoStream::create(input.clone(), output.clone(), Ownership::Borrowed);
        let mut line = Vec::new();
        s.read_line(&mut line).unwrap();
        assert_eq!(line, b"* OK hi\r\n");
        s.write_all(b"A1 LOGOUT\r\n").unwrap();
        s.flush().unwrap();
        assert_eq!(
            output.ioctl(Ioctl::GetTransport).unwrap(),
            IoctlReply::Bytes(b"A1 LOGOUT\r\n".to_vec())
        );
        s.close().unwrap();
        assert!(input.is_open() && output.is_open());
    }

    #[test]
    fn owned_halves_are_closed() {
        let input = MemoryStream::create();
        let output = MemoryStream::create();
        let s = IoStream::create(input.clone(), output.clone(), Ownership::Owned);
        drop(s);
        assert!(!input.is_open());
        assert!(!output.is_open());
    }
}
