//! The model layer of an IMAP4rev1 client.
//!
//! This crate turns one persistent, full-duplex IMAP connection into a
//! navigable, lazily populated, cache-backed tree of mailboxes, messages,
//! and MIME body parts:
//!
//! - [`tree`] holds the heterogeneous node hierarchy with per-node fetch
//!   state;
//! - [`model`] is the façade a UI reads nodes through; touching an
//!   unfetched node schedules the work that fills it in;
//! - the task engine multiplexes dependency-ordered operations (connect,
//!   LIST, SELECT, FETCH, APPEND, STORE) over the connection and routes
//!   every server response to the task that cares;
//! - [`addressing`] translates between IMAP part ids (`1.2`, `2.MIME`),
//!   URL-style part paths, RFC 2392 `cid:` references, and tree nodes;
//! - [`netpolicy`] gates what rendered message content may load;
//! - [`cache`] is the write-through store consulted before the network.
//!
//! The wire grammar stays outside: an external parser turns server output
//! into the typed [`types::Response`] values this crate consumes, and the
//! engine writes RFC 3501 command lines (with `LITERAL+` literals when
//! negotiated) to the transport it was given.
//!
//! ```no_run
//! use imap_model::{Credentials, Model};
//! use imap_model::cache::MemoryCache;
//! use imap_model::connector::Connector;
//!
//! # fn main() -> imap_model::Result<()> {
//! # #[cfg(feature = "tls")]
//! # {
//! let connected = Connector::new("imap.example.com", 993).native_tls()?;
//! let (mut model, events) = Model::new(
//!     connected.transport,
//!     Credentials {
//!         username: "user".to_string(),
//!         password: "password".to_string(),
//!     },
//!     Box::new(MemoryCache::new()),
//! );
//! // drive your read loop: parse each server line into a typed Response
//! // and hand it to model.process_response(), draining `events` as you go
//! let root = model.root();
//! let top_level = model.row_count(root);
//! # let _ = top_level;
//! # }
//! # Ok(())
//! # }
//! ```

pub mod addressing;
pub mod cache;
pub mod command;
pub mod conn;
pub mod connector;
pub mod decode;
mod engine;
pub mod error;
pub mod model;
pub mod netpolicy;
mod tasks;
pub mod tree;
pub mod types;

#[cfg(test)]
mod mock_stream;

pub use crate::conn::{Capabilities, Connection, ConnectionState};
pub use crate::connector::{Connected, Connector};
pub use crate::error::{Error, Result};
pub use crate::model::{Credentials, Data, Event, Model, Role};
pub use crate::netpolicy::UrlReply;
pub use crate::tree::{FetchStatus, NodeId, SpecialPart, Tree};
pub use crate::types::{Response, Uid};
