use tracing::{debug, warn};

use super::{
    Backend, BufferType, Ioctl, IoctlReply, Ownership, Result, Stream, StreamFlags,
    Transport,
};

/// How much of the traffic a transcript stream records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TranscriptLevel {
    /// Everything is logged verbatim.
    Normal,
    /// Passwords in `LOGIN` and `PASS` commands are masked.
    Secure,
    /// Data is replaced by a `(data...)` marker; used while literal
    /// payloads are in flight.
    Payload,
}

impl Default for TranscriptLevel {
    fn default() -> Self {
        TranscriptLevel::Normal
    }
}

const READ: usize = 0;
const WRITE: usize = 1;

/// A pass-through stream that logs the traffic going through it.
///
/// Every complete line is emitted with a direction prefix, by default
/// `"S: "` for data read and `"C: "` for data written. Lines go to the
/// `mailstream::transcript` tracing target at debug level, or to a log
/// stream given with [`XscriptStream::with_sink`]. Failures of the log
/// stream never affect the traffic.
pub struct XscriptStream {
    transport: Transport,
    level: TranscriptLevel,
    prefix: [String; 2],
    partial: [Vec<u8>; 2],
    muted: [bool; 2],
    sink: Option<Stream>,
    sink_failed: bool,
}

impl XscriptStream {
    /// A transcript of the client side of a session.
    pub fn client(transport: Stream, ownership: Ownership) -> Stream {
        XscriptStream::with_prefixes(transport, ownership, "S: ", "C: ", None)
    }

    /// A transcript of the server side of a session.
    pub fn server(transport: Stream, ownership: Ownership) -> Stream {
        XscriptStream::with_prefixes(transport, ownership, "C: ", "S: ", None)
    }

    /// A client transcript written to `sink` instead of the tracing
    /// subscriber.
    pub fn with_sink(transport: Stream, ownership: Ownership, sink: Stream) -> Stream {
        XscriptStream::with_prefixes(transport, ownership, "S: ", "C: ", Some(sink))
    }

    /// A transcript with custom prefixes for data read and data written.
    pub fn with_prefixes(
        transport: Stream,
        ownership: Ownership,
        read_prefix: &str,
        write_prefix: &str,
        sink: Option<Stream>,
    ) -> Stream {
        // unbuffered, so that level changes take effect at the exact byte
        Stream::with_buffer(
            XscriptStream {
                transport: Transport::new(transport, ownership),
                level: TranscriptLevel::Normal,
                prefix: [read_prefix.to_string(), write_prefix.to_string()],
                partial: [Vec::new(), Vec::new()],
                muted: [false, false],
                sink,
                sink_failed: false,
            },
            BufferType::None,
        )
    }

    fn record(&mut self, dir: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.level == TranscriptLevel::Payload {
            if !self.muted[dir] {
                self.muted[dir] = true;
                self.emit(dir, b"(data...)");
            }
            return;
        }
        self.partial[dir].extend_from_slice(data);
        while let Some(i) = self.partial[dir].iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial[dir].drain(..=i).collect();
            let line = strip_eol(&line);
            if self.level == TranscriptLevel::Secure {
                let masked = mask_secrets(line);
                self.emit(dir, &masked);
            } else {
                self.emit(dir, line);
            }
        }
    }

    fn emit(&mut self, dir: usize, line: &[u8]) {
        let text = format!("{}{}", self.prefix[dir], String::from_utf8_lossy(line));
        match &self.sink {
            Some(sink) => {
                let res = sink
                    .write_all(text.as_bytes())
                    .and_then(|_| sink.write_all(b"\n"));
                if let Err(e) = res {
                    if !self.sink_failed {
                        warn!(error = %e, "transcript sink failed; further lines are dropped");
                        self.sink_failed = true;
                    }
                }
            }
            None => debug!(target: "mailstream::transcript", "{}", text),
        }
    }

    fn flush_partial(&mut self) {
        for dir in [READ, WRITE] {
            if !self.partial[dir].is_empty() {
                let line = std::mem::take(&mut self.partial[dir]);
                self.emit(dir, &line);
            }
        }
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Masks the password in `tag LOGIN user pass` and `PASS secret` lines.
fn mask_secrets(line: &[u8]) -> Vec<u8> {
    let words: Vec<&[u8]> = line.splitn(4, |&b| b == b' ').collect();
    match words.as_slice() {
        [cmd, _] if cmd.eq_ignore_ascii_case(b"PASS") => b"PASS ***".to_vec(),
        [tag, cmd, user, _] if cmd.eq_ignore_ascii_case(b"LOGIN") => {
            let mut out = Vec::with_capacity(line.len());
            out.extend_from_slice(tag);
            out.push(b' ');
            out.extend_from_slice(cmd);
            out.push(b' ');
            out.extend_from_slice(user);
            out.extend_from_slice(b" \"***\"");
            out
        }
        _ => line.to_vec(),
    }
}

impl Backend for XscriptStream {
    fn flags(&self) -> StreamFlags {
        self.transport.get().flags() & !StreamFlags::SEEK
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.transport.get().read(buf)?;
        self.record(READ, &buf[..n]);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.transport.get().write_all(buf)?;
        self.record(WRITE, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.transport.get().flush()
    }

    fn close(&mut self) -> Result<()> {
        self.flush_partial();
        self.transport.release()
    }

    fn ioctl(&mut self, op: &Ioctl) -> Result<IoctlReply> {
        match op {
            Ioctl::GetTranscriptLevel => Ok(IoctlReply::TranscriptLevel(self.level)),
            Ioctl::SetTranscriptLevel(level) => {
                let previous = self.level;
                if *level == TranscriptLevel::Payload && previous != TranscriptLevel::Payload {
                    self.flush_partial();
                }
                if *level != TranscriptLevel::Payload {
                    self.muted = [false, false];
                }
                self.level = *level;
                Ok(IoctlReply::TranscriptLevel(previous))
            }
            _ => self.transport.get().ioctl(op.clone()),
        }
    }
}
