//! The IMAP client command engine.
//!
//! A [`Client`] owns one transport [`Stream`] and runs one command at a
//! time over it. Every command goes through the same cycle: check that the
//! session state permits it, send it under a fresh tag, then read responses
//! until the server completes that tag. Untagged data seen on the way is
//! folded into the session (capabilities, selected mailbox status) and
//! reported to any callback registered for it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;

use base64::Engine as _;
use chrono::{DateTime, FixedOffset};
use tracing::{debug, trace, warn};

use super::authenticator::Authenticator;
use super::error::{Error, FramingError, Result};
use super::io::{needs_literal, ImapIo, Role, DEFAULT_MAX_LITERAL};
use super::msgset::{MessageSet, MessageSetError};
use super::parse::{parse_authenticate_challenge, parse_response};
use super::stream::{Stream, TranscriptLevel};
use super::types::*;
use super::utils::{validate_atom, validate_str};

/// Tags are this prefix followed by a counter starting at 1.
pub const DEFAULT_TAG_PREFIX: &str = "A";

const APPEND_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// The states of an IMAP session, from
/// [section 3 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No greeting has been read on the current transport.
    Disconnected,
    /// Connected, but not yet logged in.
    NotAuthenticated,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected,
    /// `LOGOUT` completed.
    Logout,
}

impl SessionState {
    const CONNECTED: &'static [SessionState] = &[
        SessionState::NotAuthenticated,
        SessionState::Authenticated,
        SessionState::Selected,
    ];
    const NOT_AUTH: &'static [SessionState] = &[SessionState::NotAuthenticated];
    const AUTH: &'static [SessionState] = &[SessionState::Authenticated, SessionState::Selected];
    const SELECTED: &'static [SessionState] = &[SessionState::Selected];
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::NotAuthenticated => "not authenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::Selected => "selected",
            SessionState::Logout => "logout",
        })
    }
}

/// Kinds of server data a callback can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventCode {
    /// The greeting was `PREAUTH`.
    Preauth,
    /// `* BYE`
    Bye,
    /// `* OK`
    Ok,
    /// `* NO`
    No,
    /// `* BAD`
    Bad,
    /// An `[ALERT]` response code.
    Alert,
    /// A capability list, untagged or as a response code.
    Capability,
    /// `[PERMANENTFLAGS ...]`
    PermanentFlags,
    /// `[UIDNEXT n]`
    UidNext,
    /// `[UIDVALIDITY n]`
    UidValidity,
    /// `[UNSEEN n]`
    Unseen,
    /// `[READ-ONLY]`
    ReadOnly,
    /// `[READ-WRITE]`
    ReadWrite,
    /// `* n EXISTS`
    Exists,
    /// `* n RECENT`
    Recent,
    /// `* n EXPUNGE`
    Expunge,
    /// `* FLAGS`
    Flags,
    /// `* n FETCH`
    Fetch,
    /// `* LIST`
    List,
    /// `* LSUB`
    Lsub,
    /// `* STATUS`
    MailboxStatus,
    /// `* SEARCH`
    Search,
    /// `* ID`
    Id,
    /// Anything else.
    Other,
}

/// What a callback is told about one piece of server data.
#[derive(Debug)]
pub struct Event<'a> {
    /// The kind of data.
    pub code: EventCode,
    /// The number the data carries, if any: a message count for `EXISTS`
    /// and `RECENT`, a sequence number for `EXPUNGE` and `FETCH`, the value
    /// of `UIDNEXT`, `UIDVALIDITY` and `UNSEEN` codes.
    pub number: Option<u32>,
    /// The complete response.
    pub response: &'a Untagged,
}

/// A handler for [`Event`]s.
pub type Callback = Box<dyn FnMut(&Event<'_>) + Send>;

struct Selection {
    name: String,
    examine: bool,
    status: MailboxStatus,
}

/// One command argument.
enum Arg<'a> {
    /// Sent verbatim; must already be validated.
    Atom(Cow<'a, str>),
    /// An atom if possible, else a quoted string or literal.
    AString(&'a [u8]),
    /// A quoted string or literal.
    QString(&'a [u8]),
    /// A parenthesized list.
    List(Vec<Arg<'a>>),
    Nil,
    /// A literal read from a stream.
    Message { source: &'a Stream, size: u64 },
}

impl<'a> Arg<'a> {
    fn atom<S: Into<Cow<'a, str>>>(s: S) -> Self {
        Arg::Atom(s.into())
    }

    fn astring(s: &'a str) -> Self {
        Arg::AString(s.as_bytes())
    }

    fn set(set: &MessageSet) -> Result<Self> {
        if set.is_empty() {
            return Err(MessageSetError::Syntax("empty message set".to_string()).into());
        }
        Ok(Arg::Atom(Cow::Owned(set.to_string())))
    }
}

/// A command ready to be sent: its name, the states it may be issued in and
/// its arguments.
struct Command<'a> {
    name: &'static str,
    allowed: &'static [SessionState],
    args: Vec<Arg<'a>>,
}

impl<'a> Command<'a> {
    fn new(name: &'static str, allowed: &'static [SessionState]) -> Self {
        Command {
            name,
            allowed,
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: Arg<'a>) -> Self {
        self.args.push(arg);
        self
    }
}

struct Completion {
    status: Status,
    code: Option<ResponseCode>,
    text: String,
}

enum Step {
    Continue(String),
    Done(Completion),
}

/// The successful result of running a command.
struct Outcome {
    code: Option<ResponseCode>,
    untagged: Vec<Untagged>,
}

/// An authenticator-backed reply to `AUTHENTICATE` challenges.
type Responder<'r> = &'r mut dyn FnMut(&str) -> Result<Vec<u8>>;

/// An IMAP session over a [`Stream`].
///
/// Create one with [`Client::new`] and read the server greeting with
/// [`connect`](Client::connect), or let a
/// [`ClientBuilder`](crate::ClientBuilder) do both.
///
/// Once a transport or framing error has occurred the session is *failed*:
/// every later command returns that same error without touching the
/// transport, until [`disconnect`](Client::disconnect) resets it.
pub struct Client {
    io: Option<ImapIo>,
    state: SessionState,
    tag_prefix: String,
    tag: u32,
    capabilities: Option<Capabilities>,
    selection: Option<Selection>,
    failed: Option<Error>,
    deferred: Option<Error>,
    callbacks: HashMap<EventCode, Callback>,
    last_text: String,
    max_literal: usize,
    tracing: bool,
    level: TranscriptLevel,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("tag", &self.tag)
            .field("capabilities", &self.capabilities)
            .field("failed", &self.failed)
            .finish()
    }
}

impl Client {
    /// Creates a client over `carrier`. No I/O happens until
    /// [`connect`](Self::connect).
    pub fn new(carrier: Stream) -> Client {
        Client {
            io: Some(ImapIo::new(carrier, Role::Client)),
            state: SessionState::Disconnected,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            tag: 0,
            capabilities: None,
            selection: None,
            failed: None,
            deferred: None,
            callbacks: HashMap::new(),
            last_text: String::new(),
            max_literal: DEFAULT_MAX_LITERAL,
            tracing: false,
            level: TranscriptLevel::Normal,
        }
    }

    /// Reads the server greeting.
    ///
    /// `* OK` leaves the session not authenticated; `* PREAUTH` makes it
    /// authenticated; `* BYE` is returned as [`Error::Bye`].
    pub fn connect(&mut self) -> Result<()> {
        if let Some(e) = &self.failed {
            return Err(e.clone());
        }
        if self.state != SessionState::Disconnected || self.io.is_none() {
            return Err(Error::WrongState {
                command: "connect",
                state: self.state,
            });
        }
        let res = self.read_greeting();
        self.note_failure(res)
    }

    fn read_greeting(&mut self) -> Result<()> {
        let greeting = match self.read_response()? {
            Response::Untagged(greeting @ Untagged::Status { .. }) => greeting,
            Response::Tagged { tag, .. } => {
                return Err(Error::Desync {
                    expected: None,
                    got: tag,
                })
            }
            Response::Continuation { text, .. } => {
                return Err(FramingError::Malformed(format!("+ {}", text)).into())
            }
            Response::Untagged(other) => {
                return Err(FramingError::Malformed(format!("{:?}", other)).into())
            }
        };
        self.process_untagged(&greeting);
        if let Untagged::Status { status, text, .. } = greeting {
            self.last_text = text.clone();
            match status {
                Status::Ok => self.set_state(SessionState::NotAuthenticated),
                Status::PreAuth => self.set_state(SessionState::Authenticated),
                Status::Bye => return Err(Error::Bye(text)),
                _ => return Err(FramingError::Malformed(format!("{} {}", status, text)).into()),
            }
        }
        Ok(())
    }

    /// Closes the transport and forgets everything about the session:
    /// state, tag counter, capabilities, selected mailbox and any failure.
    pub fn disconnect(&mut self) -> Result<()> {
        let res = match self.io.take() {
            Some(io) => io.into_inner().close().map_err(Error::from),
            None => Ok(()),
        };
        self.state = SessionState::Disconnected;
        self.tag = 0;
        self.capabilities = None;
        self.selection = None;
        self.failed = None;
        self.deferred = None;
        self.last_text.clear();
        debug!("disconnected");
        res
    }

    /// Binds a new transport after [`disconnect`](Self::disconnect).
    pub fn set_carrier(&mut self, carrier: Stream) -> Result<()> {
        if self.io.is_some() && self.state != SessionState::Disconnected {
            return Err(Error::WrongState {
                command: "set_carrier",
                state: self.state,
            });
        }
        let mut io = ImapIo::new(carrier, Role::Client);
        io.set_max_literal(self.max_literal);
        io.set_transcript_level(self.level);
        if self.tracing {
            io.trace_enable();
        }
        self.io = Some(io);
        self.state = SessionState::Disconnected;
        Ok(())
    }

    /// The transport, if one is bound.
    pub fn carrier(&self) -> Option<&Stream> {
        self.io.as_ref().map(ImapIo::carrier)
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The error that failed the session, if any.
    pub fn failure(&self) -> Option<&Error> {
        self.failed.as_ref()
    }

    /// Human-readable text of the last completion or greeting.
    pub fn last_response_text(&self) -> &str {
        &self.last_text
    }

    /// Status of the selected mailbox.
    pub fn selected(&self) -> Option<&MailboxStatus> {
        self.selection.as_ref().map(|s| &s.status)
    }

    /// Name of the selected mailbox.
    pub fn selected_name(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.name.as_str())
    }

    /// Changes the tag prefix. Must be a valid atom.
    pub fn set_tag_prefix(&mut self, prefix: &str) -> Result<()> {
        self.tag_prefix = validate_atom(prefix)?.to_string();
        Ok(())
    }

    /// Sets the largest literal the client accepts from the server.
    pub fn set_max_literal(&mut self, max: usize) {
        self.max_literal = max;
        if let Some(io) = self.io.as_mut() {
            io.set_max_literal(max);
        }
    }

    /// Turns the protocol transcript on or off. The transcript is logged
    /// through `tracing` under the `mailstream::transcript` target.
    pub fn trace(&mut self, enable: bool) -> Result<()> {
        self.tracing = enable;
        match self.io.as_mut() {
            Some(io) if enable => io.trace_enable(),
            Some(io) => io.trace_disable()?,
            None => {}
        }
        Ok(())
    }

    /// Sets the transcript level, returning the previous one.
    pub fn set_transcript_level(&mut self, level: TranscriptLevel) -> TranscriptLevel {
        if let Some(io) = self.io.as_mut() {
            io.set_transcript_level(level);
        }
        std::mem::replace(&mut self.level, level)
    }

    /// Registers `callback` for `code`, returning the callback it replaces.
    ///
    /// Data for codes without a callback is dropped after the client has
    /// folded it into its own state.
    pub fn register_callback<F>(&mut self, code: EventCode, callback: F) -> Option<Callback>
    where
        F: FnMut(&Event<'_>) + Send + 'static,
    {
        self.callbacks.insert(code, Box::new(callback))
    }

    /// Removes the callback for `code`.
    pub fn clear_callback(&mut self, code: EventCode) -> Option<Callback> {
        self.callbacks.remove(&code)
    }

    /// Asks the server for its capabilities and refreshes the cache.
    pub fn capability(&mut self) -> Result<Capabilities> {
        let outcome = self.run(Command::new("CAPABILITY", SessionState::CONNECTED))?;
        let found = outcome.untagged.into_iter().find_map(|u| match u {
            Untagged::Capabilities(c) => Some(c),
            _ => None,
        });
        match found.or_else(|| self.capabilities.clone()) {
            Some(caps) => Ok(caps),
            None => Err(Error::Parse(crate::error::ParseError::Unexpected(
                "CAPABILITY completed without a capability list".to_string(),
            ))),
        }
    }

    /// The server's capabilities, asking for them only if they are not
    /// already known.
    pub fn capabilities(&mut self) -> Result<&Capabilities> {
        let caps = match self.capabilities.take() {
            Some(caps) => caps,
            None => self.capability()?,
        };
        Ok(&*self.capabilities.insert(caps))
    }

    /// Checks for one capability, asking the server if needed.
    pub fn has_capability(&mut self, name: &str) -> Result<bool> {
        Ok(self.capabilities()?.has(name))
    }

    /// Noop always succeeds, and it does nothing. It gives the server a
    /// chance to report mailbox changes.
    pub fn noop(&mut self) -> Result<()> {
        self.run(Command::new("NOOP", SessionState::CONNECTED))
            .map(|_| ())
    }

    /// Logout informs the server that the client is done with the connection.
    pub fn logout(&mut self) -> Result<()> {
        self.run(Command::new("LOGOUT", SessionState::CONNECTED))?;
        self.selection = None;
        self.set_state(SessionState::Logout);
        Ok(())
    }

    /// The `ID` command ([RFC 2971](https://tools.ietf.org/html/rfc2971)):
    /// sends our identification and returns the server's.
    pub fn id(&mut self, params: Option<&[(&str, &str)]>) -> Result<HashMap<String, String>> {
        let arg = match params {
            Some(params) => Arg::List(
                params
                    .iter()
                    .flat_map(|(k, v)| [Arg::QString(k.as_bytes()), Arg::QString(v.as_bytes())])
                    .collect(),
            ),
            None => Arg::Nil,
        };
        let outcome = self.run(Command::new("ID", SessionState::CONNECTED).arg(arg))?;
        Ok(outcome
            .untagged
            .into_iter()
            .find_map(|u| match u {
                Untagged::Id(params) => Some(params.unwrap_or_default()),
                _ => None,
            })
            .unwrap_or_default())
    }

    /// Runs `STARTTLS` and replaces the transport with the one `upgrade`
    /// builds from the current one. Cached capabilities are dropped.
    pub fn starttls_with<F>(&mut self, upgrade: F) -> Result<()>
    where
        F: FnOnce(Stream) -> Result<Stream>,
    {
        self.run(Command::new("STARTTLS", SessionState::NOT_AUTH))?;
        self.capabilities = None;
        let plain = self.io()?.carrier().clone();
        let res = upgrade(plain).and_then(|secure| {
            self.io()?.replace_stream(secure);
            Ok(())
        });
        self.note_failure(res)
    }

    /// Runs `STARTTLS` and performs a TLS handshake for `domain`.
    #[cfg(feature = "native-tls")]
    pub fn starttls(&mut self, domain: &str, connector: &native_tls::TlsConnector) -> Result<()> {
        use crate::stream::{Ownership, TlsStream};
        self.starttls_with(|plain| {
            Ok(TlsStream::connect(
                domain,
                plain,
                connector,
                Ownership::Owned,
            )?)
        })
    }

    /// Log in to the IMAP server.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let cmd = Command::new("LOGIN", SessionState::NOT_AUTH)
            .arg(Arg::astring(username))
            .arg(Arg::astring(password));
        let outcome = self.run_secure(cmd, None)?;
        self.authenticated(outcome);
        Ok(())
    }

    /// Authenticate with the server using the given SASL mechanism, with
    /// `authenticator` answering the server's challenges.
    pub fn authenticate<A: Authenticator>(
        &mut self,
        mechanism: &str,
        authenticator: &A,
    ) -> Result<()> {
        let mechanism = validate_atom(mechanism)?;
        let cmd =
            Command::new("AUTHENTICATE", SessionState::NOT_AUTH).arg(Arg::atom(mechanism));
        let mut respond = |text: &str| -> Result<Vec<u8>> {
            let challenge = parse_authenticate_challenge(text)?;
            let response = authenticator.process(&challenge);
            Ok(base64::engine::general_purpose::STANDARD
                .encode(response.as_ref())
                .into_bytes())
        };
        let outcome = self.run_secure(cmd, Some(&mut respond))?;
        self.authenticated(outcome);
        Ok(())
    }

    fn run_secure(&mut self, cmd: Command<'_>, responder: Option<Responder<'_>>) -> Result<Outcome> {
        let saved = self.io.as_mut().map(|io| io.set_transcript_level(TranscriptLevel::Secure));
        let res = self.run_with(cmd, responder);
        if let (Some(io), Some(level)) = (self.io.as_mut(), saved) {
            io.set_transcript_level(level);
        }
        res
    }

    fn authenticated(&mut self, outcome: Outcome) {
        // servers may advertise different capabilities once logged in
        if !matches!(outcome.code, Some(ResponseCode::Capabilities(_))) {
            self.capabilities = None;
        }
        self.set_state(SessionState::Authenticated);
    }

    /// Selects a mailbox, returning its status.
    ///
    /// Selecting the mailbox that is already selected, in the same mode,
    /// returns the known status without contacting the server.
    pub fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open("SELECT", mailbox, false)
    }

    /// Examine is identical to [`select`](Self::select), but the mailbox is
    /// opened read-only.
    pub fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open("EXAMINE", mailbox, true)
    }

    fn open(&mut self, name: &'static str, mailbox: &str, examine: bool) -> Result<MailboxStatus> {
        if self.failed.is_none() && self.state == SessionState::Selected {
            if let Some(sel) = &self.selection {
                if sel.name == mailbox && sel.examine == examine {
                    trace!(mailbox, "mailbox already selected");
                    return Ok(sel.status.clone());
                }
            }
        }
        self.permit(name, &[SessionState::Authenticated])?;

        self.selection = Some(Selection {
            name: mailbox.to_string(),
            examine,
            status: MailboxStatus {
                writable: !examine,
                ..MailboxStatus::default()
            },
        });
        let cmd = Command::new(name, &[SessionState::Authenticated]).arg(Arg::astring(mailbox));
        match self.run(cmd) {
            Ok(_) => {
                self.set_state(SessionState::Selected);
                Ok(self.selected().cloned().unwrap_or_default())
            }
            Err(e) => {
                self.selection = None;
                Err(e)
            }
        }
    }

    /// Create creates a mailbox with the given name.
    pub fn create(&mut self, mailbox: &str) -> Result<()> {
        self.run(Command::new("CREATE", SessionState::AUTH).arg(Arg::astring(mailbox)))
            .map(|_| ())
    }

    /// Delete permanently removes the mailbox with the given name.
    pub fn delete(&mut self, mailbox: &str) -> Result<()> {
        self.run(Command::new("DELETE", SessionState::AUTH).arg(Arg::astring(mailbox)))
            .map(|_| ())
    }

    /// Rename changes the name of a mailbox.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let cmd = Command::new("RENAME", SessionState::AUTH)
            .arg(Arg::astring(from))
            .arg(Arg::astring(to));
        self.run(cmd).map(|_| ())
    }

    /// Subscribe adds the specified mailbox name to the server's set of "active" or "subscribed"
    /// mailboxes as returned by the LSUB command.
    pub fn subscribe(&mut self, mailbox: &str) -> Result<()> {
        self.run(Command::new("SUBSCRIBE", SessionState::AUTH).arg(Arg::astring(mailbox)))
            .map(|_| ())
    }

    /// Unsubscribe removes the specified mailbox name from the server's set of
    /// "active" or "subscribed" mailboxes as returned by the LSUB command.
    pub fn unsubscribe(&mut self, mailbox: &str) -> Result<()> {
        self.run(Command::new("UNSUBSCRIBE", SessionState::AUTH).arg(Arg::astring(mailbox)))
            .map(|_| ())
    }

    /// The LIST command returns a subset of names from the complete set
    /// of all names available to the client.
    pub fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<Name>> {
        self.names("LIST", reference, pattern)
    }

    /// The LSUB command returns a subset of names from the set of names
    /// that the user has declared as being "active" or "subscribed".
    pub fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<Name>> {
        self.names("LSUB", reference, pattern)
    }

    fn names(&mut self, name: &'static str, reference: &str, pattern: &str) -> Result<Vec<Name>> {
        let cmd = Command::new(name, SessionState::AUTH)
            .arg(Arg::QString(reference.as_bytes()))
            .arg(Arg::astring(pattern));
        let outcome = self.run(cmd)?;
        Ok(outcome
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::List(n) | Untagged::Lsub(n) => Some(n),
                _ => None,
            })
            .collect())
    }

    /// The STATUS command requests the status of the indicated mailbox.
    /// `items` is a parenthesized list such as `(MESSAGES UNSEEN)`.
    ///
    /// For the selected mailbox the known status is returned instead.
    pub fn status(&mut self, mailbox: &str, items: &str) -> Result<MailboxStatus> {
        if self.failed.is_none() && self.state == SessionState::Selected {
            if let Some(sel) = self.selection.as_ref().filter(|s| s.name == mailbox) {
                return Ok(sel.status.clone());
            }
        }
        let cmd = Command::new("STATUS", SessionState::AUTH)
            .arg(Arg::astring(mailbox))
            .arg(Arg::atom(validate_str(items)?));
        let outcome = self.run(cmd)?;
        let mut status = MailboxStatus::default();
        for u in outcome.untagged {
            if let Untagged::MailboxStatus { items, .. } = u {
                for (item, value) in items {
                    match item.as_str() {
                        "MESSAGES" => status.exists = value,
                        "RECENT" => status.recent = value,
                        "UIDNEXT" => status.uid_next = Some(value),
                        "UIDVALIDITY" => status.uid_validity = Some(value),
                        "UNSEEN" => status.unseen = Some(value),
                        _ => trace!(item = %item, "ignoring STATUS item"),
                    }
                }
            }
        }
        Ok(status)
    }

    /// The APPEND command adds a message to a mailbox.
    ///
    /// The message is read from `message`, which must be seekable so its
    /// size can be announced; it is uploaded from the start. Returns the
    /// new message's UID when the server reports one.
    pub fn append(
        &mut self,
        mailbox: &str,
        flags: &[Flag],
        date: Option<DateTime<FixedOffset>>,
        message: &Stream,
    ) -> Result<Option<Uid>> {
        self.permit("APPEND", SessionState::AUTH)?;
        let flags = flags
            .iter()
            .map(|f| -> Result<Arg<'static>> {
                Ok(Arg::atom(validate_atom(&f.to_string())?.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let date = date.map(|d| d.format(APPEND_DATE_FORMAT).to_string());
        let size = message.size()?;
        message.seek(SeekFrom::Start(0))?;

        let mut cmd = Command::new("APPEND", SessionState::AUTH).arg(Arg::astring(mailbox));
        if !flags.is_empty() {
            cmd = cmd.arg(Arg::List(flags));
        }
        if let Some(date) = &date {
            cmd = cmd.arg(Arg::QString(date.as_bytes()));
        }
        cmd = cmd.arg(Arg::Message {
            source: message,
            size,
        });

        let outcome = self.run(cmd)?;
        Ok(match outcome.code {
            Some(ResponseCode::AppendUid { uid, .. }) => Some(uid),
            _ => None,
        })
    }

    /// Check requests a checkpoint of the currently selected mailbox.
    pub fn check(&mut self) -> Result<()> {
        self.run(Command::new("CHECK", SessionState::SELECTED))
            .map(|_| ())
    }

    /// Expunge permanently removes all messages that have the `\Deleted` flag set from the
    /// currently selected mailbox. Returns the sequence numbers reported as expunged, in the
    /// order the server sent them.
    pub fn expunge(&mut self) -> Result<Vec<Seq>> {
        let outcome = self.run(Command::new("EXPUNGE", SessionState::SELECTED))?;
        Ok(outcome
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::Expunge(n) => Some(n),
                _ => None,
            })
            .collect())
    }

    /// Searches the mailbox for messages that match the given criteria, returning their
    /// sequence numbers.
    pub fn search(&mut self, criteria: &str) -> Result<Vec<Seq>> {
        self.searching("SEARCH", criteria)
    }

    /// Like [`search`](Self::search), but returns UIDs.
    pub fn uid_search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        self.searching("UID SEARCH", criteria)
    }

    fn searching(&mut self, name: &'static str, criteria: &str) -> Result<Vec<u32>> {
        let cmd = Command::new(name, SessionState::SELECTED).arg(Arg::atom(validate_str(criteria)?));
        let outcome = self.run(cmd)?;
        Ok(outcome
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::Search(found) => Some(found),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Fetch retrieves data associated with the messages in `set`, as selected by `query`
    /// (e.g. `(FLAGS BODY.PEEK[HEADER])`). A UID set is sent as `UID FETCH`.
    pub fn fetch(&mut self, set: &MessageSet, query: &str) -> Result<Vec<Fetch>> {
        let name = if set.is_uid() { "UID FETCH" } else { "FETCH" };
        self.fetching(name, set, query)
    }

    /// Store alters data associated with the messages in `set`, e.g. with a `query` of
    /// `+FLAGS (\Deleted)`. Returns the updated data the server reports.
    pub fn store(&mut self, set: &MessageSet, query: &str) -> Result<Vec<Fetch>> {
        let name = if set.is_uid() { "UID STORE" } else { "STORE" };
        self.fetching(name, set, query)
    }

    fn fetching(&mut self, name: &'static str, set: &MessageSet, query: &str) -> Result<Vec<Fetch>> {
        let cmd = Command::new(name, SessionState::SELECTED)
            .arg(Arg::set(set)?)
            .arg(Arg::atom(validate_str(query)?));
        let outcome = self.run(cmd)?;
        Ok(outcome
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::Fetch(f) => Some(f),
                _ => None,
            })
            .collect())
    }

    /// Copy copies the messages in `set` to the end of the specified destination mailbox.
    pub fn copy(&mut self, set: &MessageSet, mailbox: &str) -> Result<()> {
        let name = if set.is_uid() { "UID COPY" } else { "COPY" };
        let cmd = Command::new(name, SessionState::SELECTED)
            .arg(Arg::set(set)?)
            .arg(Arg::astring(mailbox));
        self.run(cmd).map(|_| ())
    }

    /// Close permanently removes all messages that have the `\Deleted` flag set from the currently
    /// selected mailbox, and returns to the authenticated state from the selected state.
    pub fn close(&mut self) -> Result<()> {
        self.leave("CLOSE")
    }

    /// Unselect leaves the selected mailbox without expunging it
    /// ([RFC 3691](https://tools.ietf.org/html/rfc3691)).
    pub fn unselect(&mut self) -> Result<()> {
        self.leave("UNSELECT")
    }

    fn leave(&mut self, name: &'static str) -> Result<()> {
        self.run(Command::new(name, SessionState::SELECTED))?;
        self.selection = None;
        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    /// Runs a command this client does not model. `args` is sent verbatim
    /// after the command name; the untagged responses are returned as they
    /// came.
    pub fn run_command(&mut self, command: &str, args: &str) -> Result<Vec<Untagged>> {
        let mut cmd =
            Command::new("", SessionState::CONNECTED).arg(Arg::atom(validate_atom(command)?));
        if !args.is_empty() {
            cmd = cmd.arg(Arg::atom(validate_str(args)?));
        }
        self.run(cmd).map(|o| o.untagged)
    }

    fn io(&mut self) -> Result<&mut ImapIo> {
        self.io
            .as_mut()
            .ok_or(Error::Stream(crate::stream::Error::Closed))
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "session state change");
            self.state = state;
        }
    }

    fn permit(&self, command: &'static str, allowed: &[SessionState]) -> Result<()> {
        if let Some(e) = &self.failed {
            return Err(e.clone());
        }
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::WrongState {
                command,
                state: self.state,
            })
        }
    }

    fn note_failure<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            if e.is_fatal() && self.failed.is_none() {
                warn!(error = %e, "session failed");
                self.failed = Some(e.clone());
            }
        }
        res
    }

    fn next_tag(&mut self) -> String {
        self.tag += 1;
        format!("{}{}", self.tag_prefix, self.tag)
    }

    fn run(&mut self, cmd: Command<'_>) -> Result<Outcome> {
        self.run_with(cmd, None)
    }

    fn run_with(&mut self, cmd: Command<'_>, responder: Option<Responder<'_>>) -> Result<Outcome> {
        let label = if cmd.name.is_empty() {
            "command"
        } else {
            cmd.name
        };
        self.permit(label, cmd.allowed)?;
        self.deferred = None;
        let res = self.execute(&cmd, responder);
        self.note_failure(res)
    }

    fn execute(&mut self, cmd: &Command<'_>, mut responder: Option<Responder<'_>>) -> Result<Outcome> {
        let tag = self.next_tag();
        debug!(tag = %tag, command = cmd.name, "sending command");
        let mut untagged = Vec::new();

        let io = self.io()?;
        io.send_atom(&tag)?;
        if !cmd.name.is_empty() {
            io.send(b" ")?;
            io.send_atom(cmd.name)?;
        }
        for arg in &cmd.args {
            self.io()?.send(b" ")?;
            if let Some(done) = self.send_arg(&tag, arg, &mut untagged)? {
                return self.finish(done, untagged);
            }
        }
        self.io()?.send(b"\r\n")?;
        self.io()?.flush()?;

        loop {
            match self.wait(&tag, &mut untagged)? {
                Step::Done(done) => return self.finish(done, untagged),
                Step::Continue(text) => {
                    let reply = match responder.as_mut() {
                        Some(respond) => (*respond)(&text),
                        None => {
                            return Err(FramingError::Malformed(format!(
                                "unexpected continuation request: {}",
                                text
                            ))
                            .into())
                        }
                    };
                    let io = self.io()?;
                    match reply {
                        Ok(reply) => io.send(&reply)?,
                        Err(e) => {
                            // cancel the exchange; the server answers BAD
                            io.send(b"*")?;
                            self.deferred.get_or_insert(e);
                        }
                    }
                    let io = self.io()?;
                    io.send(b"\r\n")?;
                    io.flush()?;
                }
            }
        }
    }

    fn send_arg(
        &mut self,
        tag: &str,
        arg: &Arg<'_>,
        untagged: &mut Vec<Untagged>,
    ) -> Result<Option<Completion>> {
        match arg {
            Arg::Atom(atom) => self.io()?.send_atom(atom)?,
            Arg::Nil => self.io()?.send(b"NIL")?,
            Arg::AString(data) | Arg::QString(data) if needs_literal(data) => {
                self.io()?.send_literal_header(data.len() as u64, true)?;
                if let Some(done) = self.await_go_ahead(tag, untagged)? {
                    return Ok(Some(done));
                }
                self.io()?.send_literal_payload(data)?;
            }
            Arg::AString(data) => self.io()?.send_astring(data)?,
            Arg::QString(data) => self.io()?.send_qstring(data)?,
            Arg::List(items) => {
                self.io()?.send(b"(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.io()?.send(b" ")?;
                    }
                    if let Some(done) = self.send_arg(tag, item, untagged)? {
                        return Ok(Some(done));
                    }
                }
                self.io()?.send(b")")?;
            }
            Arg::Message { source, size } => {
                self.io()?.send_literal_header(*size, true)?;
                if let Some(done) = self.await_go_ahead(tag, untagged)? {
                    return Ok(Some(done));
                }
                self.io()?.send_literal_payload_from(source, *size)?;
            }
        }
        Ok(None)
    }

    // Waits for the go-ahead for a literal. The server may instead complete
    // the command, typically rejecting it.
    fn await_go_ahead(&mut self, tag: &str, untagged: &mut Vec<Untagged>) -> Result<Option<Completion>> {
        match self.wait(tag, untagged)? {
            Step::Continue(_) => Ok(None),
            Step::Done(done) => Ok(Some(done)),
        }
    }

    fn read_response(&mut self) -> Result<Response> {
        let io = self.io()?;
        io.get_line()?;
        let words = io.take_words()?;
        parse_response(&words)
    }

    // Reads until the command tagged `tag` completes or the server asks for
    // more data.
    fn wait(&mut self, tag: &str, untagged: &mut Vec<Untagged>) -> Result<Step> {
        loop {
            let response = match self.read_response() {
                Ok(response) => response,
                Err(e @ Error::Parse(_)) => {
                    debug!(error = %e, "undecodable untagged response");
                    self.deferred.get_or_insert(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match response {
                Response::Untagged(u) => {
                    self.process_untagged(&u);
                    untagged.push(u);
                }
                Response::Continuation { text, .. } => return Ok(Step::Continue(text)),
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } => {
                    if got != tag {
                        return Err(Error::Desync {
                            expected: Some(tag.to_string()),
                            got,
                        });
                    }
                    if let Some(code) = &code {
                        self.apply_code(code);
                    }
                    return Ok(Step::Done(Completion { status, code, text }));
                }
            }
        }
    }

    fn finish(&mut self, done: Completion, untagged: Vec<Untagged>) -> Result<Outcome> {
        debug!(status = %done.status, text = %done.text, "command completed");
        self.last_text = done.text;
        let deferred = self.deferred.take();
        match done.status {
            Status::Ok => match deferred {
                Some(e) => Err(e),
                None => Ok(Outcome {
                    code: done.code,
                    untagged,
                }),
            },
            Status::No => Err(Error::No(self.last_text.clone())),
            _ => Err(Error::Bad(self.last_text.clone())),
        }
    }

    fn apply_code(&mut self, code: &ResponseCode) {
        match code {
            ResponseCode::Capabilities(caps) => self.capabilities = Some(caps.clone()),
            ResponseCode::Alert => {}
            _ => {
                if let Some(status) = self.selection.as_mut().map(|s| &mut s.status) {
                    match code {
                        ResponseCode::PermanentFlags(flags) => status.permanent_flags = flags.clone(),
                        ResponseCode::UidNext(n) => status.uid_next = Some(*n),
                        ResponseCode::UidValidity(n) => status.uid_validity = Some(*n),
                        ResponseCode::Unseen(n) => status.unseen = Some(*n),
                        ResponseCode::ReadOnly => status.writable = false,
                        ResponseCode::ReadWrite => status.writable = true,
                        _ => {}
                    }
                }
            }
        }
    }

    fn process_untagged(&mut self, u: &Untagged) {
        trace!(response = ?u, "untagged response");
        let status = self.selection.as_mut().map(|s| &mut s.status);
        let (code, number) = match u {
            Untagged::Status { status: st, code, text } => {
                if let Some(code) = code {
                    self.apply_code(code);
                    if let Some((event, number)) = code_event(code) {
                        self.notify(event, number, u);
                    }
                }
                if *st == Status::Bye {
                    debug!(text = %text, "server said BYE");
                }
                let event = match st {
                    Status::Ok => EventCode::Ok,
                    Status::No => EventCode::No,
                    Status::Bad => EventCode::Bad,
                    Status::Bye => EventCode::Bye,
                    Status::PreAuth => EventCode::Preauth,
                };
                (event, None)
            }
            Untagged::Capabilities(caps) => {
                self.capabilities = Some(caps.clone());
                (EventCode::Capability, None)
            }
            Untagged::Exists(n) => {
                if let Some(status) = status {
                    status.exists = *n;
                }
                (EventCode::Exists, Some(*n))
            }
            Untagged::Recent(n) => {
                if let Some(status) = status {
                    status.recent = *n;
                }
                (EventCode::Recent, Some(*n))
            }
            Untagged::Expunge(n) => {
                if let Some(status) = status {
                    status.exists = status.exists.saturating_sub(1);
                }
                (EventCode::Expunge, Some(*n))
            }
            Untagged::Flags(flags) => {
                if let Some(status) = status {
                    status.flags = flags.clone();
                }
                (EventCode::Flags, None)
            }
            Untagged::Fetch(f) => (EventCode::Fetch, Some(f.message)),
            Untagged::List(_) => (EventCode::List, None),
            Untagged::Lsub(_) => (EventCode::Lsub, None),
            Untagged::MailboxStatus { .. } => (EventCode::MailboxStatus, None),
            Untagged::Search(_) => (EventCode::Search, None),
            Untagged::Id(_) => (EventCode::Id, None),
            _ => (EventCode::Other, None),
        };
        self.notify(code, number, u);
    }

    fn notify(&mut self, code: EventCode, number: Option<u32>, response: &Untagged) {
        match self.callbacks.get_mut(&code) {
            Some(callback) => callback(&Event {
                code,
                number,
                response,
            }),
            None => trace!(?code, "no callback registered; event dropped"),
        }
    }
}

fn code_event(code: &ResponseCode) -> Option<(EventCode, Option<u32>)> {
    Some(match code {
        ResponseCode::Alert => (EventCode::Alert, None),
        ResponseCode::Capabilities(_) => (EventCode::Capability, None),
        ResponseCode::PermanentFlags(_) => (EventCode::PermanentFlags, None),
        ResponseCode::UidNext(n) => (EventCode::UidNext, Some(*n)),
        ResponseCode::UidValidity(n) => (EventCode::UidValidity, Some(*n)),
        ResponseCode::Unseen(n) => (EventCode::Unseen, Some(*n)),
        ResponseCode::ReadOnly => (EventCode::ReadOnly, None),
        ResponseCode::ReadWrite => (EventCode::ReadWrite, None),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::{MockStream, Written};
    use crate::stream::MemoryStream;
    use std::sync::{Arc, Mutex};

    const GREETING: &str = "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Dovecot ready.\r\n";

    fn client(response: &str) -> (Client, Written) {
        let mock = MockStream::new(format!("{}{}", GREETING, response).into_bytes());
        let written = mock.written();
        let mut client = Client::new(mock.into_stream());
        client.connect().unwrap();
        (client, written)
    }

    fn authenticated(response: &str) -> (Client, Written) {
        let (mut c, written) = client(response);
        c.state = SessionState::Authenticated;
        (c, written)
    }

    fn selected(response: &str) -> (Client, Written) {
        let (mut c, written) = client(&format!(
            "* 3 EXISTS\r\nA1 OK [READ-WRITE] SELECT completed\r\n{}",
            response
        ));
        c.state = SessionState::Authenticated;
        c.select("INBOX").unwrap();
        written.clear();
        (c, written)
    }

    fn seq(s: &str) -> MessageSet {
        MessageSet::parse(s, crate::msgset::SetKind::Sequence).unwrap()
    }

    #[test]
    fn greeting() {
        let (c, written) = client("");
        assert_eq!(c.state(), SessionState::NotAuthenticated);
        assert!(c.capabilities.as_ref().unwrap().has_auth("PLAIN"));
        assert_eq!(c.last_response_text(), "Dovecot ready.");
        assert!(written.bytes().is_empty());
    }

    #[test]
    fn preauth_greeting() {
        let mock = MockStream::new(b"* PREAUTH IMAP4rev1 server logged in as Smith\r\n".to_vec());
        let mut c = Client::new(mock.into_stream());
        let seen = Arc::new(Mutex::new(false));
        let flag = seen.clone();
        c.register_callback(EventCode::Preauth, move |_| *flag.lock().unwrap() = true);
        c.connect().unwrap();
        assert_eq!(c.state(), SessionState::Authenticated);
        assert!(*seen.lock().unwrap());
    }

    #[test]
    fn bye_greeting() {
        let mock = MockStream::new(b"* BYE Too many connections\r\n".to_vec());
        let mut c = Client::new(mock.into_stream());
        match c.connect() {
            Err(Error::Bye(text)) => assert_eq!(text, "Too many connections"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(c.failure().is_some());
        assert_eq!(c.state(), SessionState::Disconnected);
    }

    #[test]
    fn readline_delay_read() {
        let mock = MockStream::new(GREETING.as_bytes().to_vec()).with_delay();
        let mut c = Client::new(mock.into_stream());
        c.connect().unwrap();
        assert_eq!(c.state(), SessionState::NotAuthenticated);
    }

    #[test]
    fn readline_eof() {
        let mut c = Client::new(MockStream::default().with_eof().into_stream());
        match c.connect() {
            Err(Error::ConnectionLost) => {}
            other => panic!("EOF read did not return connection lost: {:?}", other),
        }
    }

    #[test]
    fn readline_err() {
        let mut c = Client::new(MockStream::default().with_err().into_stream());
        let err = c.connect().unwrap_err();
        assert!(matches!(err, Error::Stream(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn login() {
        let (mut c, written) = client("A1 OK Logged in\r\n");
        c.login("username", "password").unwrap();
        assert_eq!(written.text(), "A1 LOGIN username password\r\n");
        assert_eq!(c.state(), SessionState::Authenticated);
        // no capabilities came with the completion
        assert!(c.capabilities.is_none());
    }

    #[test]
    fn login_quotes_and_literals() {
        let (mut c, written) = client("+ Ready\r\nA1 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n");
        c.login("first last", "pa\u{e9}ss").unwrap();
        assert_eq!(
            written.bytes(),
            "A1 LOGIN \"first last\" {6}\r\npa\u{e9}ss\r\n".as_bytes()
        );
        assert!(c.capabilities.as_ref().unwrap().has("IDLE"));
    }

    #[test]
    fn rejected_login() {
        let (mut c, written) = client("A1 OK NOOP completed\r\nA2 NO Authentication failed\r\n");
        c.noop().unwrap();
        let caps_before = c.capabilities.clone();
        match c.login("baduser", "badpass") {
            Err(Error::No(text)) => assert_eq!(text, "Authentication failed"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(written.text().ends_with("A2 LOGIN baduser badpass\r\n"));
        assert_eq!(c.state(), SessionState::NotAuthenticated);
        assert_eq!(c.capabilities, caps_before);
        assert!(c.failure().is_none());
    }

    #[test]
    fn literal_rejected_before_payload() {
        let (mut c, written) = client("A1 NO [ALERT] no 8-bit passwords\r\n");
        assert!(matches!(c.login("u", "p\u{e9}"), Err(Error::No(_))));
        assert_eq!(written.text(), "A1 LOGIN u {3}\r\n");
        assert!(c.failure().is_none());
    }

    #[test]
    fn authenticate_plain() {
        let (mut c, written) = client("+ \r\nA1 OK Success\r\n");
        let auth = crate::authenticator::Plain::new("tim", "tanstaaftanstaaf");
        c.authenticate("PLAIN", &auth).unwrap();
        assert_eq!(
            written.text(),
            "A1 AUTHENTICATE PLAIN\r\nAHRpbQB0YW5zdGFhZnRhbnN0YWFm\r\n"
        );
        assert_eq!(c.state(), SessionState::Authenticated);
    }

    #[test]
    fn authenticate_bad_challenge_cancels() {
        let (mut c, written) = client("+ %%%\r\nA1 BAD cancelled\r\n");
        let auth = crate::authenticator::Plain::new("tim", "x");
        assert!(matches!(
            c.authenticate("PLAIN", &auth),
            Err(Error::Bad(_))
        ));
        assert_eq!(written.text(), "A1 AUTHENTICATE PLAIN\r\n*\r\n");
        assert_eq!(c.state(), SessionState::NotAuthenticated);
    }

    #[test]
    fn select_fires_exists() {
        let (mut c, written) = authenticated(
            "* 4 EXISTS\r\n* FLAGS (\\Seen)\r\nA1 OK [READ-WRITE] SELECT completed\r\n",
        );
        let count = Arc::new(Mutex::new(None));
        let seen = count.clone();
        c.register_callback(EventCode::Exists, move |e| *seen.lock().unwrap() = e.number);
        let mailbox = c.select("INBOX").unwrap();
        assert_eq!(written.text(), "A1 SELECT INBOX\r\n");
        assert_eq!(c.state(), SessionState::Selected);
        assert_eq!(*count.lock().unwrap(), Some(4));
        assert_eq!(mailbox.exists, 4);
        assert_eq!(mailbox.flags, vec![Flag::Seen]);
        assert!(mailbox.writable);
    }

    #[test]
    fn examine() {
        let response = "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
            * OK [PERMANENTFLAGS ()] Read-only mailbox.\r\n\
            * 1 EXISTS\r\n\
            * 1 RECENT\r\n\
            * OK [UNSEEN 1] First unseen.\r\n\
            * OK [UIDVALIDITY 1257842737] UIDs valid\r\n\
            * OK [UIDNEXT 2] Predicted next UID\r\n\
            A1 OK [READ-ONLY] Select completed.\r\n";
        let expected = MailboxStatus {
            flags: vec![
                Flag::Answered,
                Flag::Flagged,
                Flag::Deleted,
                Flag::Seen,
                Flag::Draft,
            ],
            exists: 1,
            recent: 1,
            unseen: Some(1),
            permanent_flags: vec![],
            uid_next: Some(2),
            uid_validity: Some(1257842737),
            writable: false,
        };
        let (mut c, written) = authenticated(response);
        let mailbox = c.examine("INBOX").unwrap();
        assert_eq!(written.text(), "A1 EXAMINE INBOX\r\n");
        assert_eq!(mailbox, expected);
        assert_eq!(c.selected_name(), Some("INBOX"));
    }

    #[test]
    fn reselect_uses_cache() {
        let (mut c, written) = selected("");
        let status = c.select("INBOX").unwrap();
        assert_eq!(status.exists, 3);
        assert!(written.bytes().is_empty());
        assert!(matches!(
            c.select("Archive"),
            Err(Error::WrongState { command: "SELECT", state: SessionState::Selected })
        ));
        assert!(written.bytes().is_empty());
    }

    #[test]
    fn failed_select_leaves_state() {
        let (mut c, _) = authenticated("A1 NO Mailbox doesn't exist\r\n");
        assert!(matches!(c.select("Nope"), Err(Error::No(_))));
        assert_eq!(c.state(), SessionState::Authenticated);
        assert!(c.selected().is_none());
    }

    #[test]
    fn select_before_login_writes_nothing() {
        let (mut c, written) = client("");
        match c.select("INBOX") {
            Err(Error::WrongState { command, state }) => {
                assert_eq!(command, "SELECT");
                assert_eq!(state, SessionState::NotAuthenticated);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(written.bytes().is_empty());
        assert_eq!(c.tag, 0);
    }

    #[test]
    fn desync_fails_session() {
        let (mut c, written) = client(
            "A1 OK a\r\nA2 OK b\r\nA3 OK c\r\nA4 OK d\r\nA5 OK e\r\nA6 OK f\r\nA9 OK done\r\n",
        );
        for _ in 0..6 {
            c.noop().unwrap();
        }
        match c.noop() {
            Err(Error::Desync { expected, got }) => {
                assert_eq!(expected.as_deref(), Some("A7"));
                assert_eq!(got, "A9");
            }
            other => panic!("unexpected {:?}", other),
        }
        let sent = written.bytes().len();
        let again = c.noop().unwrap_err();
        assert!(matches!(again, Error::Desync { .. }));
        assert_eq!(again.kind(), crate::ErrorKind::Framing);
        assert_eq!(written.bytes().len(), sent);

        c.disconnect().unwrap();
        assert!(c.failure().is_none());
        assert_eq!(c.state(), SessionState::Disconnected);
    }

    #[test]
    fn tags_are_unique() {
        let replies: String = (1..=20).map(|n| format!("A{} OK\r\n", n)).collect();
        let (mut c, written) = client(&replies);
        for _ in 0..20 {
            c.noop().unwrap();
        }
        let text = written.text();
        let tags: std::collections::HashSet<_> =
            text.lines().map(|l| l.split(' ').next().unwrap()).collect();
        assert_eq!(tags.len(), 20);
    }

    #[test]
    fn tag_prefix() {
        let (mut c, written) = client("x1 OK\r\n");
        c.set_tag_prefix("x").unwrap();
        c.noop().unwrap();
        assert_eq!(written.text(), "x1 NOOP\r\n");
        assert!(c.set_tag_prefix("a b").is_err());
    }

    #[test]
    fn capability() {
        let (mut c, written) = client(
            "* CAPABILITY IMAP4rev1 STARTTLS AUTH=GSSAPI LOGINDISABLED\r\n\
             A1 OK CAPABILITY completed\r\n",
        );
        let caps = c.capability().unwrap();
        assert_eq!(written.text(), "A1 CAPABILITY\r\n");
        assert_eq!(caps.len(), 4);
        for e in ["IMAP4rev1", "STARTTLS", "AUTH=GSSAPI", "LOGINDISABLED"] {
            assert!(caps.has(e));
        }
        // cached from now on
        assert!(c.has_capability("STARTTLS").unwrap());
        assert_eq!(written.text(), "A1 CAPABILITY\r\n");
    }

    #[test]
    fn lazy_capabilities() {
        let mock = MockStream::new(
            b"* OK hi\r\n* CAPABILITY IMAP4rev1 IDLE\r\nA1 OK done\r\n".to_vec(),
        );
        let written = mock.written();
        let mut c = Client::new(mock.into_stream());
        c.connect().unwrap();
        assert!(c.has_capability("IDLE").unwrap());
        assert!(!c.has_capability("CONDSTORE").unwrap());
        assert_eq!(written.text(), "A1 CAPABILITY\r\n");
    }

    #[test]
    fn simple_commands() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Client) -> Result<()>>)> = vec![
            ("A1 CREATE INBOX.Sent\r\n", Box::new(|c: &mut Client| c.create("INBOX.Sent"))),
            ("A1 DELETE \"old stuff\"\r\n", Box::new(|c: &mut Client| c.delete("old stuff"))),
            ("A1 RENAME INBOX NEWINBOX\r\n", Box::new(|c: &mut Client| c.rename("INBOX", "NEWINBOX"))),
            ("A1 SUBSCRIBE INBOX\r\n", Box::new(|c: &mut Client| c.subscribe("INBOX"))),
            ("A1 UNSUBSCRIBE INBOX\r\n", Box::new(|c: &mut Client| c.unsubscribe("INBOX"))),
        ];
        for (expected, op) in cases {
            let (mut c, written) = authenticated("A1 OK completed\r\n");
            op(&mut c).unwrap();
            assert_eq!(written.text(), expected);
        }
    }

    #[test]
    fn selected_commands() {
        let (mut c, written) = selected("A2 OK CHECK completed\r\n");
        c.check().unwrap();
        assert_eq!(written.text(), "A2 CHECK\r\n");

        let (mut c, _) = selected("* 3 EXPUNGE\r\n* 3 EXPUNGE\r\nA2 OK EXPUNGE completed\r\n");
        assert_eq!(c.expunge().unwrap(), vec![3, 3]);
        assert_eq!(c.selected().unwrap().exists, 1);

        let (mut c, written) = selected("A2 OK CLOSE completed\r\n");
        c.close().unwrap();
        assert_eq!(written.text(), "A2 CLOSE\r\n");
        assert_eq!(c.state(), SessionState::Authenticated);
        assert!(c.selected().is_none());
        assert!(matches!(c.check(), Err(Error::WrongState { .. })));
    }

    #[test]
    fn store() {
        let (mut c, written) = selected(
            "* 2 FETCH (FLAGS (\\Deleted \\Seen))\r\n\
             * 3 FETCH (FLAGS (\\Deleted))\r\n\
             A2 OK STORE completed\r\n",
        );
        let fetches = c.store(&seq("2:3"), "+FLAGS (\\Deleted)").unwrap();
        assert_eq!(written.text(), "A2 STORE 2:3 +FLAGS (\\Deleted)\r\n");
        assert_eq!(fetches.len(), 2);
        assert_eq!(fetches[0].flags(), &[Flag::Deleted, Flag::Seen]);
    }

    #[test]
    fn uid_commands() {
        let mut uids = MessageSet::new(crate::msgset::SetKind::Uid);
        uids.add_range(4, 0).unwrap();
        uids.add(1).unwrap();

        let (mut c, written) = selected("* 1 FETCH (UID 1 FLAGS ())\r\nA2 OK done\r\n");
        let fetches = c.fetch(&uids, "FLAGS").unwrap();
        assert_eq!(written.text(), "A2 UID FETCH 1,4:* FLAGS\r\n");
        assert_eq!(fetches[0].uid, Some(1));

        let (mut c, written) = selected("A2 OK done\r\n");
        c.copy(&uids, "MEETING").unwrap();
        assert_eq!(written.text(), "A2 UID COPY 1,4:* MEETING\r\n");

        let (mut c, written) = selected("* SEARCH 5 9\r\nA2 OK done\r\n");
        assert_eq!(c.uid_search("UNSEEN").unwrap(), vec![5, 9]);
        assert_eq!(written.text(), "A2 UID SEARCH UNSEEN\r\n");
    }

    #[test]
    fn fetch_body() {
        let (mut c, written) = selected("* 2 FETCH (BODY[TEXT] {3}\r\nfoo)\r\nA2 OK FETCH completed\r\n");
        let fetches = c.fetch(&seq("2"), "BODY[TEXT]").unwrap();
        assert_eq!(written.text(), "A2 FETCH 2 BODY[TEXT]\r\n");
        assert_eq!(fetches[0].text(), Some(&b"foo"[..]));
    }

    #[test]
    fn fetch_validates_input() {
        let (mut c, written) = selected("");
        assert!(matches!(
            c.fetch(&seq("1"), "BODY[]\r\nA3 LOGOUT"),
            Err(Error::Validate(_))
        ));
        let empty = MessageSet::new(crate::msgset::SetKind::Sequence);
        assert!(matches!(c.fetch(&empty, "FLAGS"), Err(Error::MessageSet(_))));
        assert!(written.bytes().is_empty());
    }

    #[test]
    fn undecodable_data_is_reported_after_completion() {
        let (mut c, _) = selected("* 1 FETCH (UID x)\r\nA2 OK done\r\nA3 OK NOOP\r\n");
        assert!(matches!(
            c.fetch(&seq("1"), "UID"),
            Err(Error::Parse(_))
        ));
        assert!(c.failure().is_none());
        c.noop().unwrap();
    }

    #[test]
    fn undecodable_code_on_untagged_status_is_deferred() {
        let (mut c, _) = client("* OK [UIDNEXT x] hmm\r\nA1 OK done\r\nA2 OK again\r\n");
        assert!(matches!(c.noop(), Err(Error::Parse(_))));
        assert_eq!(c.last_response_text(), "done");
        assert!(c.failure().is_none());
        c.noop().unwrap();
        assert_eq!(c.last_response_text(), "again");
    }

    #[test]
    fn undecodable_code_on_completion_still_completes() {
        let (mut c, written) = client("A1 OK [UIDNEXT x] done\r\nA2 OK again\r\n");
        c.noop().unwrap();
        assert_eq!(c.last_response_text(), "done");
        c.noop().unwrap();
        assert_eq!(written.text(), "A1 NOOP\r\nA2 NOOP\r\n");
        assert!(c.failure().is_none());
    }

    #[test]
    fn undecodable_code_on_continuation_and_completion() {
        let (mut c, written) =
            authenticated("+ [UNSEEN none] go\r\nA1 OK [APPENDUID 1 abc] ok\r\n");
        let message = MemoryStream::with_contents("hi\r\n");
        assert_eq!(c.append("INBOX", &[], None, &message).unwrap(), None);
        assert_eq!(written.text(), "A1 APPEND INBOX {4}\r\nhi\r\n\r\n");
        assert!(c.failure().is_none());
    }

    #[test]
    fn completion_with_foreign_status_fails_session() {
        let (mut c, _) = client("A1 PREAUTH hi\r\nA2 OK never read\r\n");
        let err = c.noop().unwrap_err();
        assert!(matches!(err, Error::Framing(FramingError::Malformed(_))));
        assert!(err.is_fatal());
        assert!(c.failure().is_some());
    }

    #[test]
    fn list() {
        let (mut c, written) = authenticated(
            "* LIST (\\HasNoChildren) \".\" INBOX\r\n\
             * LIST (\\Noselect) \".\" \"Public Folders\"\r\n\
             A1 OK LIST completed\r\n",
        );
        let names = c.list("", "*").unwrap();
        assert_eq!(written.text(), "A1 LIST \"\" \"*\"\r\n");
        assert_eq!(names.len(), 2);
        assert_eq!(names[1].name(), "Public Folders");
        assert!(!names[1].is_selectable());
    }

    #[test]
    fn status() {
        let (mut c, written) = authenticated(
            "* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\nA1 OK STATUS completed\r\n",
        );
        let status = c.status("blurdybloop", "(MESSAGES UIDNEXT)").unwrap();
        assert_eq!(written.text(), "A1 STATUS blurdybloop (MESSAGES UIDNEXT)\r\n");
        assert_eq!(status.exists, 231);
        assert_eq!(status.uid_next, Some(44292));

        let (mut c, written) = selected("");
        assert_eq!(c.status("INBOX", "(MESSAGES)").unwrap().exists, 3);
        assert!(written.bytes().is_empty());
    }

    #[test]
    fn append() {
        let (mut c, written) =
            authenticated("+ Ready for literal data\r\nA1 OK [APPENDUID 38505 3955] APPEND completed\r\n");
        let message = MemoryStream::with_contents("Subject: hi\r\n\r\nhello\r\n");
        message.seek(SeekFrom::End(0)).unwrap();
        let date = DateTime::parse_from_rfc3339("1994-02-07T21:52:25-08:00").unwrap();
        let uid = c
            .append("saved-messages", &[Flag::Seen], Some(date), &message)
            .unwrap();
        assert_eq!(uid, Some(3955));
        assert_eq!(
            written.text(),
            "A1 APPEND saved-messages (\\Seen) \"07-Feb-1994 21:52:25 -0800\" {22}\r\n\
             Subject: hi\r\n\r\nhello\r\n\r\n"
        );
    }

    #[test]
    fn append_rejected() {
        let (mut c, written) = authenticated("A1 NO [TRYCREATE] no such mailbox\r\n");
        let message = MemoryStream::with_contents("x");
        assert!(matches!(c.append("nowhere", &[], None, &message), Err(Error::No(_))));
        assert_eq!(written.text(), "A1 APPEND nowhere {1}\r\n");
        assert!(c.failure().is_none());
    }

    #[test]
    fn id() {
        let (mut c, written) = client("* ID (\"name\" \"Cyrus\")\r\nA1 OK done\r\n");
        let id = c.id(Some(&[("name", "mailstream")])).unwrap();
        assert_eq!(written.text(), "A1 ID (\"name\" \"mailstream\")\r\n");
        assert_eq!(id.get("name").map(String::as_str), Some("Cyrus"));
    }

    #[test]
    fn logout() {
        let (mut c, written) = client("* BYE IMAP4rev1 Server logging out\r\nA1 OK LOGOUT completed\r\n");
        let byes = Arc::new(Mutex::new(0));
        let counter = byes.clone();
        c.register_callback(EventCode::Bye, move |_| *counter.lock().unwrap() += 1);
        c.logout().unwrap();
        assert_eq!(written.text(), "A1 LOGOUT\r\n");
        assert_eq!(c.state(), SessionState::Logout);
        assert_eq!(*byes.lock().unwrap(), 1);
        assert!(matches!(c.noop(), Err(Error::WrongState { .. })));
    }

    #[test]
    fn starttls_swaps_transport() {
        let (mut c, written) = client("A1 OK Begin TLS negotiation now\r\n");
        let upgraded = MockStream::new(b"A2 OK done\r\n".to_vec());
        let after = upgraded.written();
        c.starttls_with(move |_plain| Ok(upgraded.into_stream()))
            .unwrap();
        assert!(c.capabilities.is_none());
        assert_eq!(written.text(), "A1 STARTTLS\r\n");
        c.noop().unwrap();
        assert_eq!(after.text(), "A2 NOOP\r\n");
    }

    #[test]
    fn run_command() {
        let (mut c, written) = selected("* QUOTAROOT INBOX \"\"\r\nA2 OK done\r\n");
        let untagged = c.run_command("GETQUOTAROOT", "INBOX").unwrap();
        assert_eq!(written.text(), "A2 GETQUOTAROOT INBOX\r\n");
        assert!(matches!(&untagged[0], Untagged::Other { name, .. } if name == "QUOTAROOT"));
    }

    #[test]
    fn reconnect() {
        let (mut c, _) = authenticated("");
        c.disconnect().unwrap();
        assert!(matches!(c.noop(), Err(Error::WrongState { .. })));
        c.set_carrier(MockStream::new(GREETING.as_bytes().to_vec()).into_stream())
            .unwrap();
        c.connect().unwrap();
        assert_eq!(c.state(), SessionState::NotAuthenticated);
        assert_eq!(c.next_tag(), "A1");
    }

    #[test]
    fn callbacks_see_unsolicited_data() {
        let (mut c, _) = selected("* 5 EXISTS\r\n* 2 RECENT\r\n* 4 FETCH (FLAGS (\\Seen))\r\nA2 OK\r\n");
        let events = Arc::new(Mutex::new(Vec::new()));
        for code in [EventCode::Exists, EventCode::Fetch] {
            let events = events.clone();
            c.register_callback(code, move |e| events.lock().unwrap().push((e.code, e.number)));
        }
        c.noop().unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![(EventCode::Exists, Some(5)), (EventCode::Fetch, Some(4))]
        );
        assert_eq!(c.selected().unwrap().exists, 5);
        assert_eq!(c.selected().unwrap().recent, 2);
    }
}
