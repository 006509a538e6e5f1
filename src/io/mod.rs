//! Record-level IMAP I/O.
//!
//! [`ImapIo`] sits on top of a [`Stream`] and deals in IMAP records: a line
//! together with the payloads of any `{n}` literals it announces. Records
//! are split into [`Word`]s on arrival. On the sending side it knows how to
//! put a string on the wire as an atom, a quoted string or a literal, and
//! how to wait for the server's go-ahead before a synchronizing literal.

use std::fmt;

use lazy_static::lazy_static;
use regex::bytes::Regex;
use tracing::{debug, trace};

use crate::error::{Error, FramingError, Result};
use crate::stream::{Ioctl, IoctlReply, Ownership, Stream, TranscriptLevel, XscriptStream};

mod split;

pub(crate) use self::split::{is_atom_safe, needs_literal, quote_into};
pub use self::split::{format_words, split_words, Word};

/// Literals larger than this are refused unless configured otherwise.
pub const DEFAULT_MAX_LITERAL: usize = 64 * 1024 * 1024;

lazy_static! {
    static ref LITERAL_AT_END: Regex = Regex::new(r"\{([0-9]*)(\+?)\}\r?\n$").unwrap();
}

/// Which end of the conversation an [`ImapIo`] speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends commands, reads responses.
    Client,
    /// Reads commands, sends responses. Synchronizing literals from the
    /// peer are answered with a continuation request.
    Server,
}

/// Buffered IMAP reader and writer over a stream.
pub struct ImapIo {
    stream: Stream,
    raw: Option<Stream>,
    role: Role,
    level: TranscriptLevel,
    record: Vec<u8>,
    words: Vec<Word>,
    reply_ready: bool,
    max_literal: usize,
}

impl fmt::Debug for ImapIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapIo")
            .field("role", &self.role)
            .field("tracing", &self.raw.is_some())
            .field("reply_ready", &self.reply_ready)
            .finish()
    }
}

impl ImapIo {
    /// Creates an I/O layer over `stream`.
    pub fn new(stream: Stream, role: Role) -> ImapIo {
        ImapIo {
            stream,
            raw: None,
            role,
            level: TranscriptLevel::Normal,
            record: Vec::new(),
            words: Vec::new(),
            reply_ready: false,
            max_literal: DEFAULT_MAX_LITERAL,
        }
    }

    /// Sets the largest literal [`get_line`](Self::get_line) will accept.
    pub fn set_max_literal(&mut self, max: usize) {
        self.max_literal = max;
    }

    /// The role this layer plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The stream records are exchanged over. While tracing is on this is
    /// the transcript stream.
    pub fn transport(&self) -> &Stream {
        &self.stream
    }

    /// The stream under the transcript, or [`transport`](Self::transport)
    /// when tracing is off.
    pub fn carrier(&self) -> &Stream {
        self.raw.as_ref().unwrap_or(&self.stream)
    }

    /// Swaps in a new transport, for instance after a TLS upgrade, and
    /// returns the old one. Tracing stays on if it was on.
    pub fn replace_stream(&mut self, stream: Stream) -> Stream {
        let tracing = self.raw.is_some();
        if let Err(e) = self.trace_disable() {
            debug!(error = %e, "closing transcript stream failed");
        }
        let old = std::mem::replace(&mut self.stream, stream);
        self.reset_reply();
        if tracing {
            self.trace_enable();
        }
        old
    }

    /// Stops tracing and gives back the transport.
    pub fn into_inner(mut self) -> Stream {
        if let Err(e) = self.trace_disable() {
            debug!(error = %e, "closing transcript stream failed");
        }
        self.stream
    }

    fn reset_reply(&mut self) {
        self.reply_ready = false;
        self.words.clear();
        self.record.clear();
    }

    /// Reads one complete record: a line, plus the payload of every literal
    /// announced at the end of a line, plus the line that follows it, until
    /// a line without a trailing literal header ends the record. The record
    /// is then split into words.
    pub fn get_line(&mut self) -> Result<()> {
        self.reset_reply();
        loop {
            let start = self.record.len();
            let n = self.stream.read_line(&mut self.record)?;
            if n == 0 {
                return Err(if start == 0 {
                    Error::ConnectionLost
                } else {
                    FramingError::PrematureEof.into()
                });
            }
            if !self.record.ends_with(b"\n") {
                return Err(FramingError::PrematureEof.into());
            }
            let (size, sync) = match literal_header(&self.record[start..])? {
                Some(header) => header,
                None => break,
            };
            if size > self.max_literal {
                return Err(Error::Resource(format!(
                    "literal of {} bytes exceeds the limit of {}",
                    size, self.max_literal
                )));
            }
            if self.role == Role::Server && sync {
                self.stream.write_all(b"+ GO AHEAD\r\n")?;
                self.stream.flush()?;
            }
            let saved = self.push_level(TranscriptLevel::Payload);
            let res = self.read_payload(size);
            self.pop_level(saved);
            res?;
        }
        self.words = split_words(&self.record)?;
        trace!(
            bytes = self.record.len(),
            words = self.words.len(),
            "record received"
        );
        self.reply_ready = true;
        Ok(())
    }

    fn read_payload(&mut self, size: usize) -> Result<()> {
        let start = self.record.len();
        self.record.resize(start + size, 0);
        let mut filled = start;
        while filled < self.record.len() {
            match self.stream.read(&mut self.record[filled..])? {
                0 => {
                    self.record.truncate(filled);
                    return Err(FramingError::PrematureEof.into());
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    /// The words of the last record read.
    pub fn words(&self) -> Result<&[Word]> {
        if self.reply_ready {
            Ok(&self.words)
        } else {
            Err(FramingError::ReplyNotReady.into())
        }
    }

    /// Takes the words of the last record read, leaving no reply ready.
    pub fn take_words(&mut self) -> Result<Vec<Word>> {
        if !self.reply_ready {
            return Err(FramingError::ReplyNotReady.into());
        }
        self.reply_ready = false;
        Ok(std::mem::take(&mut self.words))
    }

    /// Returns true if a record has been read and its words not taken.
    pub fn is_reply_ready(&self) -> bool {
        self.reply_ready
    }

    /// The raw bytes of the last record read.
    pub fn raw_line(&self) -> &[u8] {
        &self.record
    }

    /// Writes raw bytes.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.stream.write_all(data)?)
    }

    /// Writes formatted text.
    pub fn send_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        Ok(self.stream.write_fmt(args)?)
    }

    /// Writes an atom as is.
    pub fn send_atom(&mut self, atom: &str) -> Result<()> {
        self.send(atom.as_bytes())
    }

    /// Writes a string as a quoted string, or as a literal if it contains
    /// line breaks, NULs or 8-bit bytes.
    pub fn send_qstring(&mut self, data: &[u8]) -> Result<()> {
        if needs_literal(data) {
            return self.send_literal_string(data);
        }
        let mut out = Vec::with_capacity(data.len() + 2);
        quote_into(&mut out, data);
        self.send(&out)
    }

    /// Writes a string as an atom when it can be one, otherwise as
    /// [`send_qstring`](Self::send_qstring) would.
    pub fn send_astring(&mut self, data: &[u8]) -> Result<()> {
        if is_atom_safe(data) {
            self.send(data)
        } else {
            self.send_qstring(data)
        }
    }

    /// Writes `NIL` for `None`, otherwise a string.
    pub fn send_nstring(&mut self, data: Option<&[u8]>) -> Result<()> {
        match data {
            Some(data) => self.send_qstring(data),
            None => self.send(b"NIL"),
        }
    }

    /// Writes a `{n}` (or non-synchronizing `{n+}`) header and flushes.
    pub fn send_literal_header(&mut self, len: u64, sync: bool) -> Result<()> {
        let plus = if sync { "" } else { "+" };
        self.send_fmt(format_args!("{{{}{}}}\r\n", len, plus))?;
        self.flush()
    }

    /// Reads the next record and checks that it is a continuation request.
    ///
    /// Anything else yields [`Error::BadReply`] with the record's words left
    /// ready, so the caller can tell a tagged rejection from garbage.
    pub fn await_continuation(&mut self) -> Result<()> {
        self.get_line()?;
        if self.words.first().map_or(false, |w| w.is_atom("+")) {
            self.reset_reply();
            return Ok(());
        }
        let line = String::from_utf8_lossy(&self.record);
        Err(Error::BadReply(line.trim_end().to_string()))
    }

    /// Writes literal payload bytes, hidden from the transcript.
    pub fn send_literal_payload(&mut self, data: &[u8]) -> Result<()> {
        let saved = self.push_level(TranscriptLevel::Payload);
        let res = self.send(data);
        self.pop_level(saved);
        res
    }

    /// Writes `data` as a literal. A client waits for the server's
    /// continuation request between header and payload.
    pub fn send_literal_string(&mut self, data: &[u8]) -> Result<()> {
        self.send_literal_header(data.len() as u64, true)?;
        if self.role == Role::Client {
            self.await_continuation()?;
        }
        self.send_literal_payload(data)
    }

    /// Writes `size` bytes read from `source` as a literal.
    pub fn send_literal_stream(&mut self, source: &Stream, size: u64) -> Result<()> {
        self.send_literal_header(size, true)?;
        if self.role == Role::Client {
            self.await_continuation()?;
        }
        self.send_literal_payload_from(source, size)
    }

    /// Writes `size` bytes read from `source` as literal payload, hidden
    /// from the transcript. The header must already have been sent.
    pub fn send_literal_payload_from(&mut self, source: &Stream, size: u64) -> Result<()> {
        let saved = self.push_level(TranscriptLevel::Payload);
        let res = self.copy_payload(source, size);
        self.pop_level(saved);
        res
    }

    fn copy_payload(&mut self, source: &Stream, size: u64) -> Result<()> {
        let mut buf = vec![0u8; crate::stream::DEFAULT_BUFFER_SIZE];
        let mut left = size;
        while left > 0 {
            let want = std::cmp::min(left, buf.len() as u64) as usize;
            let n = source.read(&mut buf[..want])?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "message stream ended before its announced size",
                )
                .into());
            }
            self.stream.write_all(&buf[..n])?;
            left -= n as u64;
        }
        Ok(())
    }

    /// Writes words separated by spaces, each as a string, and ends the
    /// line.
    pub fn send_words<W: AsRef<[u8]>>(&mut self, words: &[W]) -> Result<()> {
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                self.send(b" ")?;
            }
            self.send_qstring(word.as_ref())?;
        }
        self.send(b"\r\n")
    }

    /// Pushes everything written so far to the peer.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.stream.flush()?)
    }

    /// Starts logging the traffic through a transcript stream.
    pub fn trace_enable(&mut self) {
        if self.raw.is_some() {
            return;
        }
        let traced = match self.role {
            Role::Client => XscriptStream::client(self.stream.clone(), Ownership::Borrowed),
            Role::Server => XscriptStream::server(self.stream.clone(), Ownership::Borrowed),
        };
        if self.level != TranscriptLevel::Normal {
            let _ = traced.ioctl(Ioctl::SetTranscriptLevel(self.level));
        }
        self.raw = Some(std::mem::replace(&mut self.stream, traced));
    }

    /// Stops logging the traffic.
    pub fn trace_disable(&mut self) -> Result<()> {
        if let Some(raw) = self.raw.take() {
            let traced = std::mem::replace(&mut self.stream, raw);
            traced.close()?;
        }
        Ok(())
    }

    /// Returns true while a transcript is being written.
    pub fn is_tracing(&self) -> bool {
        self.raw.is_some()
    }

    /// Sets the transcript verbosity and returns the previous one. The
    /// level is remembered while tracing is off.
    pub fn set_transcript_level(&mut self, level: TranscriptLevel) -> TranscriptLevel {
        let previous = std::mem::replace(&mut self.level, level);
        if self.raw.is_some() {
            let _ = self.stream.ioctl(Ioctl::SetTranscriptLevel(level));
        }
        previous
    }

    fn push_level(&self, level: TranscriptLevel) -> Option<TranscriptLevel> {
        self.raw.as_ref()?;
        match self.stream.ioctl(Ioctl::SetTranscriptLevel(level)) {
            Ok(IoctlReply::TranscriptLevel(previous)) => Some(previous),
            _ => None,
        }
    }

    fn pop_level(&self, saved: Option<TranscriptLevel>) {
        if let Some(level) = saved {
            let _ = self.stream.ioctl(Ioctl::SetTranscriptLevel(level));
        }
    }
}

// Checks a line for a trailing literal header; returns its size and whether
// it is synchronizing.
fn literal_header(line: &[u8]) -> Result<Option<(usize, bool)>> {
    let caps = match LITERAL_AT_END.captures(line) {
        Some(caps) => caps,
        None => return Ok(None),
    };
    let size = std::str::from_utf8(&caps[1])
        .ok()
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or(FramingError::MalformedLiteral)?;
    Ok(Some((size, caps[2].is_empty())))
}
