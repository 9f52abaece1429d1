//! Error types of the engine.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::result;

/// A convenience wrapper around `Result` for [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// The set of errors that can occur while driving the engine.
#[derive(Debug)]
pub enum Error {
    /// An `io::Error` that occurred while trying to write to the network stream.
    Io(IoError),
    /// A NO response from the IMAP server to a tagged command.
    No(String),
    /// A BAD response from the IMAP server to a tagged command.
    Bad(String),
    /// A response referenced a message or body part that does not exist in
    /// the local tree. The response is dropped; the connection continues.
    UnknownMessageIndex(String),
    /// A response arrived in a state where the engine cannot attribute it,
    /// e.g. a FETCH before the message listing was synchronized.
    UnexpectedResponse(String),
    /// The connection was terminated: socket error, server BYE, or an
    /// explicit notification from the transport owner.
    ConnectionLost(String),
    /// Command inputs were not valid [IMAP
    /// strings](https://tools.ietf.org/html/rfc3501#section-4.3).
    Validate(ValidateError),
    /// A URL fetch was refused by the externals policy gate.
    PolicyDenied(String),
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl From<ValidateError> for Error {
    fn from(err: ValidateError) -> Error {
        Error::Validate(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            Error::Validate(ref e) => fmt::Display::fmt(e, f),
            Error::No(ref data) => write!(f, "No Response: {}", data),
            Error::Bad(ref data) => write!(f, "Bad Response: {}", data),
            Error::UnknownMessageIndex(ref what) => {
                write!(f, "Unknown message index: {}", what)
            }
            Error::UnexpectedResponse(ref what) => {
                write!(f, "Unexpected response: {}", what)
            }
            Error::ConnectionLost(ref why) => write!(f, "Connection lost: {}", why),
            Error::PolicyDenied(ref url) => write!(f, "Denied by policy: {}", url),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Validate(ref e) => Some(e),
            _ => None,
        }
    }
}

/// An [invalid character](https://tools.ietf.org/html/rfc3501#section-4.3) was found in an input
/// string.
#[derive(Debug)]
pub struct ValidateError(pub char);

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print character in debug form because invalid ones are often whitespaces
        write!(f, "Invalid character in input: {:?}", self.0)
    }
}

impl StdError for ValidateError {}
