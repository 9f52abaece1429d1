//! Typed commands and their RFC 3501 serialization.
//!
//! The engine builds [`Command`] values and hands them to
//! [`Connection::submit`](crate::conn::Connection::submit), which serializes
//! them under a fresh tag. Serialization is the one place where wire bytes
//! are produced; the read side of the protocol lives outside this crate.

use chrono::{DateTime, FixedOffset};

use crate::conn::Capabilities;
use crate::error::{Result, ValidateError};
use crate::types::{Flag, Uid};

/// A command the engine can issue.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Command {
    Capability,
    Login {
        username: String,
        password: String,
    },
    Logout,
    Noop,
    List {
        reference: String,
        pattern: String,
    },
    Select {
        mailbox: String,
    },
    Create {
        mailbox: String,
    },
    Append {
        mailbox: String,
        flags: Vec<Flag>,
        date: Option<DateTime<FixedOffset>>,
        message: Vec<u8>,
    },
    /// `UID SEARCH ALL`, used to synchronize a message listing.
    UidSearchAll,
    /// `UID FETCH uid (ENVELOPE BODYSTRUCTURE RFC822.SIZE)`.
    UidFetchMetadata {
        uid: Uid,
    },
    /// `UID FETCH uid (BODY.PEEK[section])`.
    UidFetchPart {
        uid: Uid,
        section: String,
    },
    /// `STORE sequence ±FLAGS (flag)`.
    Store {
        sequence: String,
        flag: Flag,
        add: bool,
    },
}

/// A serialized command.
///
/// `chunks[0]` can be written immediately. Every later chunk is the payload
/// of a synchronizing literal and must wait for a `+` continuation request
/// before it goes out. With `LITERAL+` negotiated there is only ever one
/// chunk.
#[derive(Debug)]
pub struct SerializedCommand {
    pub chunks: Vec<Vec<u8>>,
}

impl Command {
    /// Serialize under the given tag.
    ///
    /// Non-synchronizing literals (`{n+}`) are used iff the capability set
    /// advertises `LITERAL+` or `LITERAL-` ([RFC
    /// 7888](https://tools.ietf.org/html/rfc7888)).
    pub fn serialize(&self, tag: &str, capabilities: &Capabilities) -> Result<SerializedCommand> {
        let line = match self {
            Command::Capability => "CAPABILITY".to_string(),
            Command::Logout => "LOGOUT".to_string(),
            Command::Noop => "NOOP".to_string(),
            Command::Login { username, password } => {
                format!("LOGIN {} {}", quoted(username)?, quoted(password)?)
            }
            Command::List { reference, pattern } => {
                format!("LIST {} {}", quoted(reference)?, quoted(pattern)?)
            }
            Command::Select { mailbox } => format!("SELECT {}", quoted(mailbox)?),
            Command::Create { mailbox } => format!("CREATE {}", quoted(mailbox)?),
            Command::UidSearchAll => "UID SEARCH ALL".to_string(),
            Command::UidFetchMetadata { uid } => {
                format!("UID FETCH {} (ENVELOPE BODYSTRUCTURE RFC822.SIZE)", uid)
            }
            Command::UidFetchPart { uid, section } => {
                format!("UID FETCH {} (BODY.PEEK[{}])", uid, section)
            }
            Command::Store {
                sequence,
                flag,
                add,
            } => format!(
                "STORE {} {}FLAGS ({})",
                sequence,
                if *add { "+" } else { "-" },
                flag
            ),
            Command::Append {
                mailbox,
                flags,
                date,
                message,
            } => {
                return serialize_append(tag, capabilities, mailbox, flags, date.as_ref(), message);
            }
        };

        Ok(SerializedCommand {
            chunks: vec![format!("{} {}\r\n", tag, line).into_bytes()],
        })
    }
}

fn serialize_append(
    tag: &str,
    capabilities: &Capabilities,
    mailbox: &str,
    flags: &[Flag],
    date: Option<&DateTime<FixedOffset>>,
    message: &[u8],
) -> Result<SerializedCommand> {
    let mut line = format!("{} APPEND {}", tag, quoted(mailbox)?);
    if !flags.is_empty() {
        let rendered: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        line.push_str(&format!(" ({})", rendered.join(" ")));
    }
    if let Some(date) = date {
        // INTERNALDATE, RFC 3501 date-time: "dd-Mon-yyyy hh:mm:ss +zzzz"
        line.push_str(&format!(" \"{}\"", date.format("%e-%b-%Y %H:%M:%S %z")));
    }

    if capabilities.literal_plus() {
        let mut chunk = line.into_bytes();
        chunk.extend_from_slice(format!(" {{{}+}}\r\n", message.len()).as_bytes());
        chunk.extend_from_slice(message);
        chunk.extend_from_slice(b"\r\n");
        Ok(SerializedCommand {
            chunks: vec![chunk],
        })
    } else {
        let mut first = line.into_bytes();
        first.extend_from_slice(format!(" {{{}}}\r\n", message.len()).as_bytes());
        let mut second = message.to_vec();
        second.extend_from_slice(b"\r\n");
        Ok(SerializedCommand {
            chunks: vec![first, second],
        })
    }
}

/// Render a string as an IMAP quoted string.
///
/// CR and LF can never appear inside a quoted string; sending them would let
/// untrusted input inject commands, so they are rejected outright.
fn quoted(s: &str) -> Result<String> {
    if let Some(bad) = s.chars().find(|c| *c == '\r' || *c == '\n') {
        return Err(ValidateError(bad).into());
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn caps(raw: &[&str]) -> Capabilities {
        let mut c = Capabilities::default();
        c.replace(raw.iter().map(|s| s.to_string()).collect());
        c
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quoted("INBOX").unwrap(), "\"INBOX\"");
        assert_eq!(quoted("a\"b\\c").unwrap(), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn quoting_rejects_crlf() {
        match quoted("evil\r\nX LOGOUT") {
            Err(Error::Validate(ValidateError(c))) => assert_eq!(c, '\r'),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn login_is_quoted() {
        let cmd = Command::Login {
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let ser = cmd.serialize("a2", &caps(&[])).unwrap();
        assert_eq!(ser.chunks.len(), 1);
        assert_eq!(ser.chunks[0], b"a2 LOGIN \"u\" \"p\"\r\n".to_vec());
    }

    #[test]
    fn append_uses_nonsync_literal_when_negotiated() {
        let cmd = Command::Append {
            mailbox: "outbox".to_string(),
            flags: vec![],
            date: None,
            message: b"HELLO".to_vec(),
        };
        let ser = cmd.serialize("a5", &caps(&["IMAP4rev1", "LITERAL+"])).unwrap();
        assert_eq!(ser.chunks.len(), 1);
        assert_eq!(
            ser.chunks[0],
            b"a5 APPEND \"outbox\" {5+}\r\nHELLO\r\n".to_vec()
        );
    }

    #[test]
    fn append_synchronizing_literal_without_extension() {
        let cmd = Command::Append {
            mailbox: "outbox".to_string(),
            flags: vec![],
            date: None,
            message: b"HELLO".to_vec(),
        };
        let ser = cmd.serialize("a5", &caps(&["IMAP4rev1"])).unwrap();
        assert_eq!(ser.chunks.len(), 2);
        assert_eq!(ser.chunks[0], b"a5 APPEND \"outbox\" {5}\r\n".to_vec());
        assert_eq!(ser.chunks[1], b"HELLO\r\n".to_vec());
    }

    #[test]
    fn literal_minus_also_counts() {
        let cmd = Command::Append {
            mailbox: "x".to_string(),
            flags: vec![],
            date: None,
            message: b"ab".to_vec(),
        };
        let ser = cmd.serialize("a1", &caps(&["LITERAL-"])).unwrap();
        assert_eq!(ser.chunks.len(), 1);
    }

    #[test]
    fn append_renders_flags_and_date() {
        use chrono::TimeZone;
        let date = FixedOffset::east(3600)
            .ymd(2014, 7, 8)
            .and_hms(9, 10, 11);
        let cmd = Command::Append {
            mailbox: "INBOX".to_string(),
            flags: vec![Flag::Seen],
            date: Some(date),
            message: b"x".to_vec(),
        };
        let ser = cmd.serialize("a9", &caps(&["LITERAL+"])).unwrap();
        let text = String::from_utf8_lossy(&ser.chunks[0]).to_string();
        assert!(text.starts_with("a9 APPEND \"INBOX\" (\\Seen) \" 8-Jul-2014 09:10:11 +0100\""));
    }

    #[test]
    fn store_renders_sign() {
        let cmd = Command::Store {
            sequence: "1:3".to_string(),
            flag: Flag::Seen,
            add: false,
        };
        let ser = cmd.serialize("a4", &caps(&[])).unwrap();
        assert_eq!(ser.chunks[0], b"a4 STORE 1:3 -FLAGS (\\Seen)\r\n".to_vec());
    }
}
