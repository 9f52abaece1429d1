//! Typed server responses, as handed to the engine by the external
//! wire-protocol parser.

use crate::types::{BodyStructure, Envelope, Flag, ListEntry, Seq, Uid};

/// Condition of a state response, per [RFC 3501 section
/// 7.1](https://tools.ietf.org/html/rfc3501#section-7.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

/// Response code that may be sent with OK/NO/BAD/BYE responses.
/// See [RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.1).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ResponseCode {
    /// Human-readable text the user should see.
    Alert,
    /// The capability listing piggy-backed on a greeting or LOGIN reply.
    Capabilities(Vec<String>),
    /// Flags that can be changed permanently.
    PermanentFlags(Vec<String>),
    /// The mailbox was selected read-only.
    ReadOnly,
    /// The mailbox was selected read-write.
    ReadWrite,
    /// Indicates that the mailbox must be created first.
    TryCreate,
    /// Next unique identifier value.
    UidNext(Uid),
    /// The unique identifier validity value.
    UidValidity(u32),
    /// First message without the \Seen flag set.
    Unseen(Seq),
    /// A code this engine does not interpret; kept verbatim.
    Other(String),
}

/// A tagged or untagged OK/NO/BAD/PREAUTH/BYE response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct State {
    /// The tag of the command this responds to; `None` for untagged state
    /// responses (including the greeting).
    pub tag: Option<String>,
    pub status: Status,
    pub code: Option<ResponseCode>,
    /// Information text that may be presented to the user.
    pub information: Option<String>,
}

impl State {
    /// An untagged state response, e.g. the connection greeting.
    pub fn untagged(status: Status, information: &str) -> Self {
        State {
            tag: None,
            status,
            code: None,
            information: Some(information.to_string()),
        }
    }

    /// A tagged state response.
    pub fn tagged(tag: &str, status: Status, information: &str) -> Self {
        State {
            tag: Some(tag.to_string()),
            status,
            code: None,
            information: Some(information.to_string()),
        }
    }

    /// Attach a response code.
    pub fn with_code(mut self, code: ResponseCode) -> Self {
        self.code = Some(code);
        self
    }
}

/// One attribute from an untagged `STATUS` response.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum StatusAttribute {
    Messages(u32),
    Recent(u32),
    UidNext(Uid),
    UidValidity(u32),
    Unseen(u32),
}

/// One key/value pair from an untagged `FETCH` response.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum FetchItem {
    Envelope(Envelope),
    BodyStructure(BodyStructure),
    Rfc822Size(u32),
    Uid(Uid),
    Flags(Vec<Flag>),
    /// `BODY[<section>]` data; the section is the dotted part id, possibly
    /// with a trailing `HEADER`/`TEXT`/`MIME`, exactly as echoed by the
    /// server. The data is still transfer-encoded.
    Body { section: String, data: Vec<u8> },
    /// A fetch key this engine does not interpret. Logged and ignored.
    Other(String),
}

/// A single parsed server response.
///
/// [RFC 3501 section 7](https://tools.ietf.org/html/rfc3501#section-7)
/// requires clients to accept any response at any time; the engine routes
/// each of these to the task that cares, or logs it.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Response {
    /// A `+` continuation request: the server is ready for the next literal.
    Continue { information: Option<String> },
    /// A tagged or untagged OK/NO/BAD/PREAUTH/BYE.
    State(State),
    /// An untagged `CAPABILITY` listing.
    Capabilities(Vec<String>),
    /// An untagged `LIST` line.
    List(ListEntry),
    /// An untagged `LSUB` line.
    Lsub(ListEntry),
    /// An untagged `STATUS` line.
    Status {
        mailbox: String,
        attributes: Vec<StatusAttribute>,
    },
    /// An untagged `SEARCH` result.
    Search(Vec<Uid>),
    /// An untagged `FETCH` carrying data for the message with the given
    /// sequence number in the currently selected mailbox.
    Fetch(Seq, Vec<FetchItem>),
    /// An untagged `EXISTS`: number of messages in the selected mailbox.
    Exists(u32),
    /// An untagged `RECENT`.
    Recent(u32),
    /// An untagged `EXPUNGE` of the given sequence number.
    Expunge(Seq),
    /// An untagged `FLAGS` listing applicable message flags.
    Flags(Vec<Flag>),
}
