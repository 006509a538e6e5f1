//! This module contains types used throughout the IMAP protocol.

/// From section [2.3.1.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.1).
///
/// A 32-bit value assigned to each message, which when used with the unique identifier validity
/// value forms a 64-bit value that will not refer to any other message in the mailbox or any
/// subsequent mailbox with the same name forever. Unique identifiers are assigned in a strictly
/// ascending fashion in the mailbox, but are not necessarily contiguous.
pub type Uid = u32;

/// From section [2.3.1.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.2).
///
/// A relative position from 1 to the number of messages in the mailbox. When a new message is
/// added, it is assigned a message sequence number that is 1 higher than the number of messages
/// in the mailbox before that new message was added. Sequence numbers are reassigned on
/// `EXPUNGE`.
pub type Seq = u32;

mod flag;
pub use self::flag::Flag;

mod mailbox;
pub use self::mailbox::MailboxStatus;

mod fetch;
pub use self::fetch::{Address, BodySection, Envelope, Fetch};

mod name;
pub use self::name::{Name, NameAttribute};

mod capabilities;
pub use self::capabilities::Capabilities;

mod response;
pub use self::response::{Response, ResponseCode, Status, Untagged, Value};
