use chrono::{DateTime, FixedOffset};

use super::{Flag, Seq, Uid, Value};

/// An IMAP [`FETCH` response](https://tools.ietf.org/html/rfc3501#section-7.4.2) that contains
/// data about a particular message. This response occurs as the result of a `FETCH` or `STORE`
/// command, as well as by unilateral server decision (e.g., flag updates).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fetch {
    /// The ordinal number of this message in its containing mailbox.
    pub message: Seq,

    /// A number expressing the unique identifier of the message.
    pub uid: Option<Uid>,

    /// A number expressing the [RFC-2822](https://tools.ietf.org/html/rfc2822) size of the message.
    pub size: Option<u32>,

    pub(crate) flags: Vec<Flag>,
    pub(crate) internal_date: Option<DateTime<FixedOffset>>,
    pub(crate) envelope: Option<Envelope>,
    pub(crate) rfc822: Option<Vec<u8>>,
    pub(crate) rfc822_header: Option<Vec<u8>>,
    pub(crate) rfc822_text: Option<Vec<u8>>,
    pub(crate) sections: Vec<BodySection>,
    pub(crate) body_structure: Option<Value>,
}

/// The contents of one `BODY[section]<origin>` item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodySection {
    /// The section specifier, e.g. `""`, `"TEXT"` or `"1.2.MIME"`, upper-cased.
    pub section: String,
    /// Starting octet, for partial fetches.
    pub origin: Option<u32>,
    /// The data, or `None` if the server answered `NIL`.
    pub data: Option<Vec<u8>>,
}

impl Fetch {
    /// A list of flags that are set for this message.
    pub fn flags(&self) -> &[Flag] {
        &self.flags[..]
    }

    /// The bytes that make up the header of this message, if `BODY[HEADER]`, `BODY.PEEK[HEADER]`,
    /// or `RFC822.HEADER` was included in the `query` argument to `FETCH`.
    pub fn header(&self) -> Option<&[u8]> {
        self.rfc822_header
            .as_deref()
            .or_else(|| self.section("HEADER"))
    }

    /// The entire body of this message, if `BODY[]`, `BODY.PEEK[]`, or `RFC822` was included in
    /// the `query` argument to `FETCH`. The bytes SHOULD be interpreted by the client according
    /// to the content transfer encoding, body type, and subtype.
    pub fn body(&self) -> Option<&[u8]> {
        self.rfc822.as_deref().or_else(|| self.section(""))
    }

    /// The bytes that make up the text of this message, if `BODY[TEXT]`, `RFC822.TEXT`, or
    /// `BODY.PEEK[TEXT]` was included in the `query` argument to `FETCH`.
    pub fn text(&self) -> Option<&[u8]> {
        self.rfc822_text
            .as_deref()
            .or_else(|| self.section("TEXT"))
    }

    /// The data of the `BODY[section]` item with the given specifier, compared without regard
    /// to case.
    pub fn section(&self, section: &str) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|s| s.section.eq_ignore_ascii_case(section))
            .and_then(|s| s.data.as_deref())
    }

    /// Every `BODY[...]` item in the response.
    pub fn sections(&self) -> &[BodySection] {
        &self.sections
    }

    /// The envelope of this message, if `ENVELOPE` was included in the `query` argument to
    /// `FETCH`.
    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    /// The internal date of the message, if `INTERNALDATE` was requested.
    pub fn internal_date(&self) -> Option<DateTime<FixedOffset>> {
        self.internal_date
    }

    /// The unparsed `BODYSTRUCTURE`, if requested.
    pub fn body_structure(&self) -> Option<&Value> {
        self.body_structure.as_ref()
    }
}

/// The envelope structure of a message, as described in
/// [section 7.4.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.4.2).
/// Header values are returned exactly as the server sent them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Envelope {
    pub date: Option<Vec<u8>>,
    pub subject: Option<Vec<u8>>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<Vec<u8>>,
    pub message_id: Option<Vec<u8>>,
}

/// One address of an [`Envelope`] address list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Address {
    /// Personal name.
    pub name: Option<Vec<u8>>,
    /// At-domain-list (source route).
    pub adl: Option<Vec<u8>>,
    /// Mailbox name, or the group name at the start of a group.
    pub mailbox: Option<Vec<u8>>,
    /// Host name; `None` marks the start or end of a group.
    pub host: Option<Vec<u8>>,
}
