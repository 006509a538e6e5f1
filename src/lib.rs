//! Composable mail streams and a synchronous IMAP client.
//!
//! The crate is built in layers:
//!
//! - [`stream`]: a [`Stream`](stream::Stream) handle over pluggable
//!   backends (sockets, TLS, files, memory) and over other streams
//!   (transcripts, caches, filters, input/output pairs).
//! - [`io`]: IMAP record I/O on top of a stream. It reads lines with
//!   their literals and splits them into words, and it writes atoms,
//!   quoted strings and literals.
//! - [`Client`]: the command engine. It enforces the session state machine,
//!   tags commands and tracks capabilities and the selected mailbox.
//! - [`MessageSet`]: sequence number and UID sets.
//!
//! # Usage
//!
//! ```no_run
//! use mailstream::{ClientBuilder, MessageSet, SetKind};
//!
//! fn main() -> mailstream::Result<()> {
//!     let mut client = ClientBuilder::new("imap.example.com").connect()?;
//!     client.login("me@example.com", "password")?;
//!
//!     let inbox = client.select("INBOX")?;
//!     println!("{}", inbox);
//!
//!     let mut set = MessageSet::new(SetKind::Sequence);
//!     set.add_range(1, 10)?;
//!     for message in client.fetch(&set, "(FLAGS BODY.PEEK[HEADER])")? {
//!         if let Some(header) = message.header() {
//!             println!("{}", String::from_utf8_lossy(header));
//!         }
//!     }
//!
//!     client.logout()
//! }
//! ```

mod parse;
mod types;
mod utils;

pub mod authenticator;
pub mod client;
pub mod error;
pub mod io;
pub mod msgset;
pub mod stream;

mod client_builder;

pub use crate::client::{Callback, Client, Event, EventCode, SessionState};
pub use crate::client_builder::{ClientBuilder, TlsMode};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::msgset::{MessageSet, MessageSetError, Range, SetKind};
pub use crate::parse::{parse_authenticate_challenge, parse_response};
pub use crate::types::*;

#[cfg(test)]
mod mock_stream;
