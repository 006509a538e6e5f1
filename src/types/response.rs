use std::collections::HashMap;
use std::fmt;

use super::{Capabilities, Fetch, Flag, Name};

/// A generic piece of response data, as produced from the words of a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// A bare atom or number.
    Atom(String),
    /// A quoted string or a literal.
    String(Vec<u8>),
    /// A parenthesized list.
    List(Vec<Value>),
    /// A bracketed section, as in `BODY[HEADER]` or a response code.
    Section(Vec<Value>),
    /// `NIL`
    Nil,
}

impl Value {
    /// The atom text, if this is an atom.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Value::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// Atom or string contents; `None` for `NIL` and lists.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Atom(a) => Some(a.as_bytes()),
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Atom or string contents as text, lossily decoded.
    pub fn as_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// The items of a list. `NIL` counts as the empty list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Nil => Some(&[]),
            _ => None,
        }
    }

    /// The value as a number, if it is a numeric atom.
    pub fn as_number(&self) -> Option<u32> {
        self.as_atom().and_then(|a| a.parse().ok())
    }

    /// Returns true if this is an atom equal to `name`, ignoring case.
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Value::Atom(a) if a.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atom(a) => f.write_str(a),
            Value::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Value::List(items) => {
                f.write_str("(")?;
                crate::utils::iter_join_onto(&mut *f, items, " ")?;
                f.write_str(")")
            }
            Value::Section(items) => {
                f.write_str("[")?;
                crate::utils::iter_join_onto(&mut *f, items, " ")?;
                f.write_str("]")
            }
            Value::Nil => f.write_str("NIL"),
        }
    }
}

/// The condition reported by a status response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// `OK`
    Ok,
    /// `NO`
    No,
    /// `BAD`
    Bad,
    /// `BYE`
    Bye,
    /// `PREAUTH`
    PreAuth,
}

impl Status {
    pub(crate) fn from_atom(atom: &str) -> Option<Self> {
        match atom.to_ascii_uppercase().as_str() {
            "OK" => Some(Status::Ok),
            "NO" => Some(Status::No),
            "BAD" => Some(Status::Bad),
            "BYE" => Some(Status::Bye),
            "PREAUTH" => Some(Status::PreAuth),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
            Status::Bye => "BYE",
            Status::PreAuth => "PREAUTH",
        })
    }
}

/// A response code, the bracketed part at the start of a status response's text.
///
/// See [section 7.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.1).
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseCode {
    /// Text the user must be shown.
    Alert,
    /// The server failed to parse a message's headers.
    Parse,
    /// The mailbox is selected read-only.
    ReadOnly,
    /// The mailbox is selected read-write.
    ReadWrite,
    /// The target mailbox of an `APPEND` or `COPY` does not exist but may be created.
    TryCreate,
    /// Predicted next UID.
    UidNext(u32),
    /// Unique identifier validity value.
    UidValidity(u32),
    /// The first unseen message.
    Unseen(u32),
    /// Flags the client can change permanently.
    PermanentFlags(Vec<Flag>),
    /// The server's capabilities, sent without a separate `CAPABILITY` command.
    Capabilities(Capabilities),
    /// UIDPLUS response to `APPEND`.
    AppendUid {
        /// Validity of the target mailbox.
        uid_validity: u32,
        /// UID assigned to the appended message.
        uid: u32,
    },
    /// Any other code, with its raw arguments.
    Other(String, Vec<Value>),
}

/// Data the server sends outside the completion of a command.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Untagged {
    /// `* OK`, `* NO`, `* BAD`, `* BYE` or `* PREAUTH`.
    Status {
        /// The condition.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capabilities(Capabilities),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* FLAGS (...)`
    Flags(Vec<Flag>),
    /// `* n FETCH (...)`
    Fetch(Fetch),
    /// `* LIST ...`
    List(Name),
    /// `* LSUB ...`
    Lsub(Name),
    /// `* STATUS mailbox (...)`
    MailboxStatus {
        /// The mailbox the status is for.
        mailbox: String,
        /// Item names, upper-cased, with their values.
        items: Vec<(String, u32)>,
    },
    /// `* SEARCH n ...`
    Search(Vec<u32>),
    /// `* ID (...)` or `* ID NIL`
    Id(Option<HashMap<String, String>>),
    /// Anything this crate does not model, keyed by its upper-cased name.
    Other {
        /// Response name, e.g. `QUOTA`.
        name: String,
        /// A leading number, for `* n NAME` forms.
        number: Option<u32>,
        /// Remaining data.
        data: Vec<Value>,
    },
}

/// A complete server response line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// `+ ...`, a request for more data.
    Continuation {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Remaining text, which for `AUTHENTICATE` carries the base64 challenge.
        text: String,
    },
    /// `tag OK|NO|BAD ...`, the completion of a command.
    Tagged {
        /// The tag of the completed command.
        tag: String,
        /// Its outcome.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* ...`
    Untagged(Untagged),
}
