use std::fmt;

use super::Flag;

/// Meta-information about the currently selected mailbox, as collected from the untagged
/// responses to `SELECT` or `EXAMINE` and kept up to date while the mailbox stays selected.
///
/// [`Client::status`](crate::Client::status) returns the same structure for other mailboxes; in
/// that case `unseen` holds the number of unseen messages rather than the first unseen one.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MailboxStatus {
    /// Defined flags in the mailbox.
    pub flags: Vec<Flag>,
    /// The number of messages in the mailbox.
    pub exists: u32,
    /// The number of messages with the `\Recent` flag set.
    pub recent: u32,
    /// The message sequence number of the first unseen message in the mailbox.
    pub unseen: Option<u32>,
    /// Flags that the client can change permanently.
    pub permanent_flags: Vec<Flag>,
    /// The next unique identifier value.
    pub uid_next: Option<u32>,
    /// The unique identifier validity value.
    pub uid_validity: Option<u32>,
    /// `false` when the mailbox was opened with `EXAMINE` or the server answered `READ-ONLY`.
    pub writable: bool,
}

impl fmt::Display for MailboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flags: {:?}, exists: {}, recent: {}, unseen: {:?}, permanent_flags: {:?}, \
             uid_next: {:?}, uid_validity: {:?}, writable: {}",
            self.flags,
            self.exists,
            self.recent,
            self.unseen,
            self.permanent_flags,
            self.uid_next,
            self.uid_validity,
            self.writable,
        )
    }
}
