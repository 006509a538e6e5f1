use std::fmt;

/// With the exception of [`Flag::Custom`], these flags are system flags that are pre-defined in
/// [RFC 3501 section 2.3.2](https://tools.ietf.org/html/rfc3501#section-2.3.2). All system flags
/// begin with `\` in the IMAP protocol.
///
/// Flags are compared case-sensitively, as they are sent by the server.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Flag {
    /// Message has been read
    Seen,

    /// Message has been answered
    Answered,

    /// Message is "flagged" for urgent/special attention
    Flagged,

    /// Message is "deleted" for removal by later EXPUNGE
    Deleted,

    /// Message has not completed composition (marked as a draft).
    Draft,

    /// Message is "recently" arrived in this mailbox. This flag can not be altered by the client.
    Recent,

    /// The [`MailboxStatus::permanent_flags`](super::MailboxStatus::permanent_flags) can include
    /// this special flag (`\*`), which indicates that it is possible to create new keywords by
    /// attempting to store those flags in the mailbox.
    MayCreate,

    /// A non-standard user- or server-defined flag.
    Custom(String),
}

impl Flag {
    fn system(s: &str) -> Option<Self> {
        match s {
            "\\Seen" => Some(Flag::Seen),
            "\\Answered" => Some(Flag::Answered),
            "\\Flagged" => Some(Flag::Flagged),
            "\\Deleted" => Some(Flag::Deleted),
            "\\Draft" => Some(Flag::Draft),
            "\\Recent" => Some(Flag::Recent),
            "\\*" => Some(Flag::MayCreate),
            _ => None,
        }
    }

    /// Helper function to transform strings into flags.
    pub fn from_strs<S: ToString>(v: impl IntoIterator<Item = S>) -> impl Iterator<Item = Flag> {
        v.into_iter().map(|s| Flag::from(s.to_string()))
    }

    /// Returns `true` for flags the client may set with `STORE` or `APPEND`.
    pub fn is_settable(&self) -> bool {
        !matches!(self, Flag::Recent | Flag::MayCreate)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::MayCreate => write!(f, "\\*"),
            Flag::Custom(ref s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for Flag {
    fn from(s: String) -> Self {
        if let Some(f) = Flag::system(&s) {
            f
        } else {
            Flag::Custom(s)
        }
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        Flag::system(s).unwrap_or_else(|| Flag::Custom(s.to_string()))
    }
}
