use std::time::Duration;

use crate::client::Client;
use crate::error::Result;
use crate::stream::{self, Ioctl, SocketStream, Stream, TranscriptLevel};

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// No encryption.
    Plain,
    /// Connect in the clear and upgrade with `STARTTLS` after the greeting.
    StartTls,
    /// TLS from the first byte ("implicit TLS", usually port 993).
    Tls,
}

/// A convenience builder for connected [`Client`]s.
///
/// ```no_run
/// # use mailstream::ClientBuilder;
/// # fn main() -> Result<(), mailstream::Error> {
/// let mut client = ClientBuilder::new("imap.example.com").connect()?;
/// client.login("user", "secret")?;
/// # Ok(())
/// # }
/// ```
///
/// To use `STARTTLS` on the plain port instead:
/// ```no_run
/// # use mailstream::{ClientBuilder, TlsMode};
/// # fn main() -> Result<(), mailstream::Error> {
/// let client = ClientBuilder::new("imap.example.com")
///     .mode(TlsMode::StartTls)
///     .connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder<D>
where
    D: AsRef<str>,
{
    domain: D,
    port: Option<u16>,
    mode: TlsMode,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    trace: bool,
    level: TranscriptLevel,
    max_literal: Option<usize>,
    tag_prefix: Option<String>,
}

impl<D> ClientBuilder<D>
where
    D: AsRef<str>,
{
    /// Make a new `ClientBuilder` for `domain`, using implicit TLS.
    pub fn new(domain: D) -> Self {
        ClientBuilder {
            domain,
            port: None,
            mode: TlsMode::Tls,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            trace: false,
            level: TranscriptLevel::Normal,
            max_literal: None,
            tag_prefix: None,
        }
    }

    /// The port to connect to. Defaults to 993 for [`TlsMode::Tls`] and 143
    /// otherwise.
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    /// How to secure the connection.
    pub fn mode(&mut self, mode: TlsMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Use `STARTTLS` for this connection.
    pub fn starttls(&mut self) -> &mut Self {
        self.mode(TlsMode::StartTls)
    }

    /// Give up connecting after `timeout`.
    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Fail reads that block longer than `timeout`.
    pub fn read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Fail writes that block longer than `timeout`.
    pub fn write_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Log the protocol transcript through `tracing`.
    pub fn trace(&mut self, enable: bool) -> &mut Self {
        self.trace = enable;
        self
    }

    /// How much of the transcript to log.
    pub fn transcript_level(&mut self, level: TranscriptLevel) -> &mut Self {
        self.level = level;
        self
    }

    /// The largest literal to accept from the server.
    pub fn max_literal(&mut self, max: usize) -> &mut Self {
        self.max_literal = Some(max);
        self
    }

    /// The prefix for command tags.
    pub fn tag_prefix(&mut self, prefix: &str) -> &mut Self {
        self.tag_prefix = Some(prefix.to_string());
        self
    }

    /// Connects, performs any TLS handshake with the system's default
    /// `native-tls` settings and reads the greeting.
    #[cfg(feature = "native-tls")]
    pub fn connect(&self) -> Result<Client> {
        use crate::stream::{Ownership, TlsStream};

        self.connect_with(|domain, plain| {
            let connector = native_tls::TlsConnector::new()?;
            Ok(TlsStream::connect(
                domain,
                plain,
                &connector,
                Ownership::Owned,
            )?)
        })
    }

    /// Connects and reads the greeting. Only [`TlsMode::Plain`] works
    /// without the `native-tls` feature; use
    /// [`connect_with`](Self::connect_with) to bring another TLS stack.
    #[cfg(not(feature = "native-tls"))]
    pub fn connect(&self) -> Result<Client> {
        self.connect_with(|_, _| Err(stream::Error::Unsupported.into()))
    }

    /// Make a [`Client`] using a custom TLS initialization. This function is intended
    /// to be used if your TLS setup requires custom work such as adding private CAs
    /// or other specific TLS parameters.
    ///
    /// `handshake` is given the domain and the connected socket, and returns
    /// the encrypted stream. With [`TlsMode::StartTls`] it is called after
    /// the server has accepted `STARTTLS`; with [`TlsMode::Plain`] it is not
    /// called at all.
    pub fn connect_with<F>(&self, handshake: F) -> Result<Client>
    where
        F: FnOnce(&str, Stream) -> Result<Stream>,
    {
        let domain = self.domain.as_ref();
        let port = self.port.unwrap_or(match self.mode {
            TlsMode::Tls => 993,
            _ => 143,
        });
        let sock = SocketStream::connect((domain, port), self.connect_timeout)?;
        if self.read_timeout.is_some() || self.write_timeout.is_some() {
            sock.ioctl(Ioctl::SetTimeouts {
                read: self.read_timeout,
                write: self.write_timeout,
            })?;
        }

        match self.mode {
            TlsMode::Plain => self.connect_over(sock),
            TlsMode::Tls => {
                let secure = handshake(domain, sock)?;
                self.connect_over(secure)
            }
            TlsMode::StartTls => {
                let mut client = self.connect_over(sock)?;
                client.starttls_with(|plain| handshake(domain, plain))?;
                Ok(client)
            }
        }
    }

    /// Applies the configured settings to a client over an already
    /// connected `carrier` and reads the greeting.
    pub fn connect_over(&self, carrier: Stream) -> Result<Client> {
        let mut client = Client::new(carrier);
        if let Some(max) = self.max_literal {
            client.set_max_literal(max);
        }
        if let Some(prefix) = &self.tag_prefix {
            client.set_tag_prefix(prefix)?;
        }
        client.set_transcript_level(self.level);
        client.trace(self.trace)?;
        client.connect()?;
        Ok(client)
    }
}
