//! Transport bootstrap: everything that has to happen to a socket before
//! the engine can own it.
//!
//! The engine is transport-agnostic and only ever writes to an established
//! stream, so plain TCP, implicit TLS, and the connect-time `STARTTLS`
//! upgrade all live here. With `STARTTLS` the server greeting is consumed
//! during the upgrade; [`Connected::greeting_consumed`] tells the model so.

use std::io::{Read, Write};
use std::net::TcpStream;

use bufstream::BufStream;
#[cfg(feature = "tls")]
use native_tls::{TlsConnector, TlsStream};

use crate::error::{Error, Result};

/// An established transport, ready to hand to
/// [`Model::new`](crate::model::Model::new).
pub struct Connected<C> {
    pub transport: C,
    /// True when the connect-time `STARTTLS` exchange already ate the
    /// greeting; pass it on via
    /// [`Model::set_greeting_consumed`](crate::model::Model::set_greeting_consumed).
    pub greeting_consumed: bool,
}

/// A convenience builder for engine transports.
///
/// ```no_run
/// # use imap_model::connector::Connector;
/// # fn main() -> Result<(), imap_model::error::Error> {
/// # #[cfg(feature = "tls")]
/// let connected = Connector::new("imap.example.com", 993).native_tls()?;
/// # Ok(())
/// # }
/// ```
///
/// To use `STARTTLS` on a cleartext port, call `starttls()` first:
/// ```no_run
/// # use imap_model::connector::Connector;
/// # fn main() -> Result<(), imap_model::error::Error> {
/// # #[cfg(feature = "tls")]
/// let connected = Connector::new("imap.example.com", 143)
///     .starttls()
///     .native_tls()?;
/// # Ok(())
/// # }
/// ```
pub struct Connector<D>
where
    D: AsRef<str>,
{
    domain: D,
    port: u16,
    starttls: bool,
}

impl<D> Connector<D>
where
    D: AsRef<str>,
{
    /// Make a new `Connector` using the given domain and port.
    pub fn new(domain: D, port: u16) -> Self {
        Connector {
            domain,
            port,
            starttls: false,
        }
    }

    /// Upgrade the cleartext connection with `STARTTLS` before handing it
    /// over.
    pub fn starttls(&mut self) -> &mut Self {
        self.starttls = true;
        self
    }

    /// Connect without any TLS. The greeting is left for the engine.
    pub fn plain(&mut self) -> Result<Connected<BufStream<TcpStream>>> {
        let tcp = TcpStream::connect((self.domain.as_ref(), self.port))?;
        Ok(Connected {
            transport: BufStream::new(tcp),
            greeting_consumed: false,
        })
    }

    /// Connect using a `native-tls` transport: implicit TLS, or an
    /// explicit `STARTTLS` upgrade if requested.
    #[cfg(feature = "tls")]
    pub fn native_tls(&mut self) -> Result<Connected<BufStream<TlsStream<TcpStream>>>> {
        self.connect(|domain, tcp| {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| Error::ConnectionLost(e.to_string()))?;
            connector
                .connect(domain, tcp)
                .map_err(|e| Error::ConnectionLost(e.to_string()))
        })
    }

    /// Connect using a custom TLS initialization, e.g. to pin private CAs.
    ///
    /// The `handshake` callback receives the domain and the connected
    /// `TcpStream` (with the `STARTTLS` exchange already performed when
    /// requested) and returns the encrypted stream.
    pub fn connect<F, C>(&mut self, handshake: F) -> Result<Connected<BufStream<C>>>
    where
        F: FnOnce(&str, TcpStream) -> Result<C>,
        C: Read + Write,
    {
        let (tcp, greeting_consumed) = if self.starttls {
            let mut tcp = TcpStream::connect((self.domain.as_ref(), self.port))?;
            let greeting = read_line(&mut tcp)?;
            if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
                return Err(Error::Bad(format!("unexpected greeting: {}", greeting)));
            }
            tcp.write_all(b"a0 STARTTLS\r\n")?;
            tcp.flush()?;
            loop {
                let line = read_line(&mut tcp)?;
                if line.starts_with("a0 ") {
                    if !line.starts_with("a0 OK") {
                        return Err(Error::Bad(format!("STARTTLS refused: {}", line)));
                    }
                    break;
                }
            }
            (tcp, true)
        } else {
            (TcpStream::connect((self.domain.as_ref(), self.port))?, false)
        };
        let tls = handshake(self.domain.as_ref(), tcp)?;
        Ok(Connected {
            transport: BufStream::new(tls),
            greeting_consumed,
        })
    }
}

/// Read one CRLF-terminated line, byte by byte; this runs only during the
/// pre-TLS exchange, so there is no buffered reader to disturb.
fn read_line<R: Read>(stream: &mut R) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        line.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
