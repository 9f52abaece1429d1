//! Connection state: the write side of the socket, the tag map, and the
//! negotiated capability set.
//!
//! The engine owns exactly one selected mailbox per connection, and every
//! tag it has submitted stays in the tag map until the matching tagged
//! response has been dispatched.

use std::collections::{HashMap, VecDeque};
use std::io::Write;

use crate::command::Command;
use crate::engine::TaskId;
use crate::error::Result;
use crate::tree::NodeId;

static TAG_PREFIX: &str = "a";

/// The capability set negotiated on a connection.
///
/// From [section 7.2.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1):
/// the capability list will include the atom "IMAP4rev1"; client
/// implementations SHOULD NOT require any capability name other than
/// `IMAP4rev1`, and MUST ignore any unknown capability names.
#[derive(Clone, Debug, Default)]
pub struct Capabilities(Vec<String>);

impl Capabilities {
    /// Check if the server has the given capability. Comparison is
    /// case-insensitive per the RFC's atom rules.
    pub fn has_str(&self, s: &str) -> bool {
        self.0.iter().any(|c| c.eq_ignore_ascii_case(s))
    }

    /// Whether non-synchronizing literals may be used
    /// ([RFC 7888](https://tools.ietf.org/html/rfc7888): `LITERAL+`, or the
    /// `LITERAL-` variant which is a superset for our small literals).
    pub fn literal_plus(&self) -> bool {
        self.has_str("LITERAL+") || self.has_str("LITERAL-")
    }

    /// Replace the whole set, e.g. after a `CAPABILITY` response.
    pub fn replace(&mut self, capabilities: Vec<String>) {
        self.0 = capabilities;
    }

    /// Returns true if nothing has been learned about the server yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all the server's capabilities.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

/// What a pending tagged command is, so that a tagged reply can be
/// validated against what the owning task thinks it sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CommandKind {
    Capability,
    Login,
    Logout,
    Noop,
    List,
    ListAfterCreate,
    Select,
    Create,
    Append,
    Search,
    FetchMetadata,
    FetchPart,
    Store,
}

/// Tag-map entry: the kind of command in flight, an optional cargo string
/// (mailbox name, part section, ...) and the task that owns the tag.
#[derive(Clone, Debug)]
pub struct PendingCommand {
    pub kind: CommandKind,
    pub cargo: Option<String>,
    pub task: TaskId,
}

/// Coarse lifecycle of a connection as seen by the task engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// The transport is up but the IMAP session is not yet authenticated.
    Connecting,
    /// Authenticated; tasks may issue commands freely.
    Ready,
    /// The connection is gone; every command on it is doomed.
    Failed,
}

/// One IMAP connection: the write half of an established transport plus the
/// engine-side protocol state.
///
/// The read half is owned by the caller, who parses incoming lines with an
/// external tokenizer and feeds typed responses back through the model.
#[derive(Debug)]
pub struct Connection<W: Write> {
    transport: W,
    tag: u32,
    pub(crate) state: ConnectionState,
    pub(crate) capabilities: Capabilities,
    pub(crate) commands: HashMap<String, PendingCommand>,
    /// Mailbox currently selected on this connection, if any. At most one.
    pub(crate) selected: Option<NodeId>,
    /// Literal chunks waiting for `+` continuation requests, oldest first.
    pending_chunks: VecDeque<Vec<u8>>,
}

impl<W: Write> Connection<W> {
    pub fn new(transport: W) -> Connection<W> {
        Connection {
            transport,
            tag: 0,
            state: ConnectionState::Connecting,
            capabilities: Capabilities::default(),
            commands: HashMap::new(),
            selected: None,
            pending_chunks: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Serialize and submit a command, returning its tag.
    ///
    /// The tag is recorded in the tag map *before* anything is written, so
    /// a reply can never arrive for a tag the router does not know about.
    pub(crate) fn submit(
        &mut self,
        task: TaskId,
        kind: CommandKind,
        cargo: Option<String>,
        command: &Command,
    ) -> Result<String> {
        self.tag += 1;
        let tag = format!("{}{}", TAG_PREFIX, self.tag);
        let serialized = command.serialize(&tag, &self.capabilities)?;

        self.commands
            .insert(tag.clone(), PendingCommand { kind, cargo, task });

        let mut chunks = serialized.chunks.into_iter();
        if let Some(first) = chunks.next() {
            self.transport.write_all(&first)?;
            self.transport.flush()?;
        }
        for rest in chunks {
            self.pending_chunks.push_back(rest);
        }
        Ok(tag)
    }

    /// The server sent a `+` continuation request: release the next queued
    /// literal chunk.
    pub(crate) fn continue_literal(&mut self) -> Result<bool> {
        match self.pending_chunks.pop_front() {
            Some(chunk) => {
                self.transport.write_all(&chunk)?;
                self.transport.flush()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Look up the pending command for a tag without removing it.
    pub(crate) fn pending(&self, tag: &str) -> Option<&PendingCommand> {
        self.commands.get(tag)
    }

    /// Remove a tag from the map once its tagged response has been
    /// dispatched.
    pub(crate) fn retire(&mut self, tag: &str) -> Option<PendingCommand> {
        self.commands.remove(tag)
    }

    /// Number of tags still awaiting their tagged response.
    pub fn in_flight(&self) -> usize {
        self.commands.len()
    }

    /// Access to the transport, mainly so tests can inspect written bytes.
    pub fn transport(&self) -> &W {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut W {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;

    fn conn() -> Connection<MockStream> {
        Connection::new(MockStream::new(Vec::new()))
    }

    #[test]
    fn tags_are_sequential() {
        let mut c = conn();
        let t1 = c
            .submit(0, CommandKind::Noop, None, &Command::Noop)
            .unwrap();
        let t2 = c
            .submit(0, CommandKind::Noop, None, &Command::Noop)
            .unwrap();
        assert_eq!(t1, "a1");
        assert_eq!(t2, "a2");
        assert_eq!(
            c.transport().written_buf,
            b"a1 NOOP\r\na2 NOOP\r\n".to_vec()
        );
    }

    #[test]
    fn tag_is_mapped_until_retired() {
        let mut c = conn();
        let tag = c
            .submit(7, CommandKind::Capability, None, &Command::Capability)
            .unwrap();
        assert_eq!(c.pending(&tag).unwrap().task, 7);
        assert_eq!(c.pending(&tag).unwrap().kind, CommandKind::Capability);
        let gone = c.retire(&tag).unwrap();
        assert_eq!(gone.task, 7);
        assert!(c.pending(&tag).is_none());
    }

    #[test]
    fn literal_chunks_wait_for_continuation() {
        let mut c = conn();
        // no LITERAL+ negotiated: APPEND is split at the literal
        c.submit(
            0,
            CommandKind::Append,
            None,
            &Command::Append {
                mailbox: "x".to_string(),
                flags: vec![],
                date: None,
                message: b"HELLO".to_vec(),
            },
        )
        .unwrap();
        assert_eq!(c.transport().written_buf, b"a1 APPEND \"x\" {5}\r\n".to_vec());
        assert!(c.continue_literal().unwrap());
        assert_eq!(
            c.transport().written_buf,
            b"a1 APPEND \"x\" {5}\r\nHELLO\r\n".to_vec()
        );
        assert!(!c.continue_literal().unwrap());
    }
}
