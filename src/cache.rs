//! The cache façade consumed by tasks.
//!
//! Tasks read through the cache before going to the network and write
//! through it whenever fresh data arrives. The engine does not prescribe
//! durability; [`MemoryCache`] is a complete implementation, and an on-disk
//! one can be slotted in behind the same trait.

use std::collections::HashMap;

use crate::types::{BodyStructure, Envelope, Uid};

/// Metadata for one child mailbox, as remembered from a LIST response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailboxMetadata {
    pub name: String,
    pub separator: Option<char>,
    /// Raw LIST attribute strings, e.g. `\Noselect`.
    pub flags: Vec<String>,
}

/// Cached per-message metadata.
#[derive(Clone, Debug, Default)]
pub struct MessageMetadata {
    pub envelope: Option<Envelope>,
    pub size: Option<u32>,
    pub body_structure: Option<BodyStructure>,
}

/// Persists and retrieves what the engine has learned from the server.
/// Every reader returns `None` on a miss; every writer is write-through.
pub trait Cache {
    /// The child mailboxes of `parent`, if the listing is known.
    fn child_mailboxes(&self, parent: &str) -> Option<Vec<MailboxMetadata>>;

    /// Drop the remembered child listing, e.g. before a forced rescan.
    fn forget_child_mailboxes(&mut self, parent: &str);

    fn set_child_mailboxes(&mut self, parent: &str, children: Vec<MailboxMetadata>);

    /// The uid listing of a mailbox, in message sequence order.
    fn message_list(&self, mailbox: &str) -> Option<Vec<Uid>>;

    fn set_message_list(&mut self, mailbox: &str, uids: Vec<Uid>);

    fn message_metadata(&self, mailbox: &str, uid: Uid) -> Option<MessageMetadata>;

    fn set_message_metadata(&mut self, mailbox: &str, uid: Uid, metadata: MessageMetadata);

    /// Decoded bytes of one body part.
    fn message_part(&self, mailbox: &str, uid: Uid, part_id: &str) -> Option<Vec<u8>>;

    fn set_message_part(&mut self, mailbox: &str, uid: Uid, part_id: &str, data: Vec<u8>);
}

/// The in-memory cache: plain maps, no eviction. Valid for the whole
/// lifetime of a model, dropped with it.
#[derive(Default)]
pub struct MemoryCache {
    mailboxes: HashMap<String, Vec<MailboxMetadata>>,
    listings: HashMap<String, Vec<Uid>>,
    metadata: HashMap<(String, Uid), MessageMetadata>,
    parts: HashMap<(String, Uid, String), Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }
}

impl Cache for MemoryCache {
    fn child_mailboxes(&self, parent: &str) -> Option<Vec<MailboxMetadata>> {
        self.mailboxes.get(parent).cloned()
    }

    fn forget_child_mailboxes(&mut self, parent: &str) {
        self.mailboxes.remove(parent);
    }

    fn set_child_mailboxes(&mut self, parent: &str, children: Vec<MailboxMetadata>) {
        self.mailboxes.insert(parent.to_string(), children);
    }

    fn message_list(&self, mailbox: &str) -> Option<Vec<Uid>> {
        self.listings.get(mailbox).cloned()
    }

    fn set_message_list(&mut self, mailbox: &str, uids: Vec<Uid>) {
        self.listings.insert(mailbox.to_string(), uids);
    }

    fn message_metadata(&self, mailbox: &str, uid: Uid) -> Option<MessageMetadata> {
        self.metadata.get(&(mailbox.to_string(), uid)).cloned()
    }

    fn set_message_metadata(&mut self, mailbox: &str, uid: Uid, metadata: MessageMetadata) {
        self.metadata.insert((mailbox.to_string(), uid), metadata);
    }

    fn message_part(&self, mailbox: &str, uid: Uid, part_id: &str) -> Option<Vec<u8>> {
        self.parts
            .get(&(mailbox.to_string(), uid, part_id.to_string()))
            .cloned()
    }

    fn set_message_part(&mut self, mailbox: &str, uid: Uid, part_id: &str, data: Vec<u8>) {
        self.parts
            .insert((mailbox.to_string(), uid, part_id.to_string()), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_listing_round_trip() {
        let mut cache = MemoryCache::new();
        assert!(cache.child_mailboxes("").is_none());
        cache.set_child_mailboxes(
            "",
            vec![MailboxMetadata {
                name: "INBOX".into(),
                separator: Some('/'),
                flags: vec![],
            }],
        );
        assert_eq!(cache.child_mailboxes("").unwrap().len(), 1);
        cache.forget_child_mailboxes("");
        assert!(cache.child_mailboxes("").is_none());
    }

    #[test]
    fn part_bytes_are_keyed_by_uid_and_id() {
        let mut cache = MemoryCache::new();
        cache.set_message_part("INBOX", 7, "1.2", b"abc".to_vec());
        assert_eq!(cache.message_part("INBOX", 7, "1.2").unwrap(), b"abc");
        assert!(cache.message_part("INBOX", 7, "1.3").is_none());
        assert!(cache.message_part("INBOX", 8, "1.2").is_none());
    }
}
