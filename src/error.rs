//! IMAP error types.

use std::fmt;
use std::result;
#[cfg(feature = "native-tls")]
use std::sync::Arc;

use thiserror::Error;

use crate::client::SessionState;
use crate::msgset::MessageSetError;
use crate::stream;

/// A convenience wrapper around `Result` for `mailstream::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur in the IMAP client.
///
/// Errors are cheap to clone so that a session can remember the error that
/// broke it and hand the same value back on every later call.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// An error raised by the underlying transport stream.
    #[error(transparent)]
    Stream(#[from] stream::Error),
    /// The connection was terminated unexpectedly.
    #[error("connection lost")]
    ConnectionLost,
    /// An error from the `native_tls` library while setting up a connector.
    #[cfg(feature = "native-tls")]
    #[error("TLS error: {0}")]
    Tls(Arc<native_tls::Error>),
    /// The server sent bytes that do not form a valid IMAP record.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// A tagged completion arrived for a command that is not outstanding.
    #[error("tag desynchronised: expected {expected:?}, got {got}")]
    Desync {
        /// The tag of the outstanding command, if any.
        expected: Option<String>,
        /// The tag the server actually completed.
        got: String,
    },
    /// A command was issued in a session state that does not permit it.
    #[error("{command} is not allowed in the {state} state")]
    WrongState {
        /// The command that was refused.
        command: &'static str,
        /// The state the session was in.
        state: SessionState,
    },
    /// Something other than a continuation request arrived while a literal
    /// was waiting to be sent.
    #[error("expected a continuation request, got {0:?}")]
    BadReply(String),
    /// A BAD response from the IMAP server.
    #[error("Bad Response: {0}")]
    Bad(String),
    /// A NO response from the IMAP server.
    #[error("No Response: {0}")]
    No(String),
    /// The server sent BYE where a greeting was expected.
    #[error("server closed the session: {0}")]
    Bye(String),
    /// A configured resource limit was exceeded.
    #[error("resource limit exceeded: {0}")]
    Resource(String),
    /// Error parsing a server response or a caller supplied value.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Error validating input data.
    #[error(transparent)]
    Validate(#[from] ValidateError),
    /// An invalid message set was built or parsed.
    #[error(transparent)]
    MessageSet(#[from] MessageSetError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Stream(err.into())
    }
}

#[cfg(feature = "native-tls")]
impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Error {
        Error::Tls(Arc::new(err))
    }
}

/// The broad class an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport failed or the peer went away.
    Transport,
    /// The byte stream could not be split into well-formed records.
    Framing,
    /// The caller issued a command out of sequence.
    Sequencing,
    /// The server answered NO or BAD.
    ServerRejection,
    /// A configured limit was exceeded.
    Resource,
    /// The caller supplied a value that cannot be sent or parsed.
    Input,
}

impl Error {
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Stream(_) | Error::ConnectionLost | Error::Bye(_) => ErrorKind::Transport,
            #[cfg(feature = "native-tls")]
            Error::Tls(_) => ErrorKind::Transport,
            Error::Framing(_) | Error::Desync { .. } | Error::BadReply(_) => ErrorKind::Framing,
            Error::WrongState { .. } => ErrorKind::Sequencing,
            Error::Bad(_) | Error::No(_) => ErrorKind::ServerRejection,
            Error::Resource(_) => ErrorKind::Resource,
            Error::Parse(_) | Error::Validate(_) | Error::MessageSet(_) => ErrorKind::Input,
        }
    }

    /// Returns true if a session that hit this error can no longer be used.
    ///
    /// Transient stream conditions such as a would-block read are never fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Stream(e) => !e.is_transient(),
            Error::Resource(_) => true,
            _ => matches!(self.kind(), ErrorKind::Transport | ErrorKind::Framing),
        }
    }
}

/// Violations of the IMAP record framing rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// A `{n}` literal header was empty or its count did not fit.
    #[error("malformed literal header")]
    MalformedLiteral,
    /// The input ended in the middle of a line or a literal.
    #[error("premature end of input")]
    PrematureEof,
    /// A quoted string was not terminated.
    #[error("unbalanced quote")]
    UnbalancedQuote,
    /// Parentheses do not pair up.
    #[error("unbalanced parenthesis")]
    UnbalancedParen,
    /// Square brackets do not pair up.
    #[error("unbalanced bracket")]
    UnbalancedBracket,
    /// A line break appeared inside a record without a literal header.
    #[error("unexpected line break")]
    StrayLineBreak,
    /// The record does not have the shape of any IMAP response.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Words were requested before a complete record was read.
    #[error("no reply has been read")]
    ReplyNotReady,
}

/// An error parsing a server response or a caller supplied value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A number was expected.
    #[error("Unable to parse number: {0:?}")]
    Number(String),
    /// A date could not be understood.
    #[error("Unable to parse date: {0:?}")]
    Date(String),
    /// A server challenge was not valid base64.
    #[error("Unable to parse authentication challenge: {0:?}")]
    Authentication(String),
    /// A response did not carry the data the command expects.
    #[error("Unable to parse response: {0}")]
    Unexpected(String),
}

/// An invalid character was found in an input string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateError(pub char);

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // print character in debug form because invalid ones are often whitespaces
        write!(f, "Invalid character in input: {:?}", self.0)
    }
}

impl std::error::Error for ValidateError {}
