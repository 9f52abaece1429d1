//! The mailbox tree: a heterogeneous, lazily populated hierarchy of
//! mailboxes, message listings, messages, and MIME parts.
//!
//! Nodes live in a generational arena and reference each other by
//! [`NodeId`]; children are owned by their slot, parents are plain
//! back-references used for navigation only, so no reference cycles can
//! form. Nodes are destroyed only by explicit invalidation (a rescan or
//! model shutdown), which frees a whole subtree at once.

use log::debug;

use crate::decode::decode_body;
use crate::error::{Error, Result};
use crate::types::{
    BodyFields, BodyStructure, Envelope, FetchItem, Flag, NameAttribute, Seq, Uid,
};

/// How much of a node's contents has been retrieved from the server.
///
/// Monotonic within one fetch cycle; an explicit invalidation resets it back
/// to `None`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchStatus {
    /// Nothing has been requested yet.
    None,
    /// A request is in flight.
    Loading,
    /// The contents are synchronized with the server.
    Done,
}

/// Handle to a node in the [`Tree`].
///
/// Ids are generational: freeing a node invalidates every outstanding id
/// for it, so a stale handle can never alias a recycled slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// The special pseudo-children every body part exposes by name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpecialPart {
    /// `BODY[<id>.HEADER]`
    Header,
    /// `BODY[<id>.TEXT]`
    Text,
    /// `BODY[<id>.MIME]`
    Mime,
}

impl SpecialPart {
    pub fn keyword(self) -> &'static str {
        match self {
            SpecialPart::Header => "HEADER",
            SpecialPart::Text => "TEXT",
            SpecialPart::Mime => "MIME",
        }
    }

    pub fn from_keyword(s: &str) -> Option<SpecialPart> {
        match s {
            "HEADER" => Some(SpecialPart::Header),
            "TEXT" => Some(SpecialPart::Text),
            "MIME" => Some(SpecialPart::Mime),
            _ => None,
        }
    }
}

/// Attributes of a mailbox node.
#[derive(Clone, Debug)]
pub struct MailboxData {
    /// Full name, e.g. `lists/rust`.
    pub name: String,
    /// Hierarchy separator; `None` for a flat namespace.
    pub separator: Option<char>,
    /// LIST attributes, as last reported by the server.
    pub flags: Vec<NameAttribute>,
}

impl MailboxData {
    pub fn is_no_select(&self) -> bool {
        self.flags.contains(&NameAttribute::NoSelect)
    }

    /// The last component of the mailbox name.
    pub fn leaf_name(&self) -> &str {
        match self.separator {
            Some(sep) => self.name.rsplit(sep).next().unwrap_or(&self.name),
            None => &self.name,
        }
    }

    /// What the LIST attributes say about child mailboxes, if anything.
    pub fn child_mailboxes_hint(&self) -> Option<bool> {
        if self.flags.contains(&NameAttribute::NoInferiors)
            || self.flags.contains(&NameAttribute::HasNoChildren)
        {
            Some(false)
        } else if self.flags.contains(&NameAttribute::HasChildren) {
            Some(true)
        } else {
            None
        }
    }
}

/// Attributes of a message node.
#[derive(Clone, Debug, Default)]
pub struct MessageData {
    pub uid: Option<Uid>,
    pub envelope: Option<Envelope>,
    /// `RFC822.SIZE` in bytes.
    pub size: Option<u32>,
    pub flags: Vec<Flag>,
}

/// Attributes of a body-part node.
#[derive(Clone, Debug)]
pub struct PartData {
    /// Lowercased `type/subtype`.
    pub mime_type: String,
    /// Content transfer encoding, lowercased. Empty means `7bit`.
    pub transfer_encoding: String,
    pub charset: Option<String>,
    /// `Content-ID` without the surrounding angle brackets.
    pub body_fld_id: Option<String>,
    /// Encoded size in octets, as advertised by `BODYSTRUCTURE`.
    pub octets: u32,
    /// Decoded bytes, once fetched.
    pub data: Option<Vec<u8>>,
    /// `Some` if this node is one of the named pseudo-children.
    pub special: Option<SpecialPart>,
    /// The three pseudo-children, in `Header`/`Text`/`Mime` order. Empty on
    /// pseudo-children themselves.
    specials: Vec<NodeId>,
}

/// The node sum type. Each variant owns its children exclusively.
#[derive(Clone, Debug)]
pub enum Payload {
    Mailbox(MailboxData),
    /// The synthetic first child of every mailbox, holding its messages.
    MsgList,
    Message(MessageData),
    Part(PartData),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) status: FetchStatus,
    pub payload: Payload,
}

impl Node {
    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn as_mailbox(&self) -> Option<&MailboxData> {
        match self.payload {
            Payload::Mailbox(ref m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageData> {
        match self.payload {
            Payload::Message(ref m) => Some(m),
            _ => None,
        }
    }

    pub fn as_part(&self) -> Option<&PartData> {
        match self.payload {
            Payload::Part(ref p) => Some(p),
            _ => None,
        }
    }

    pub fn is_msg_list(&self) -> bool {
        matches!(self.payload, Payload::MsgList)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The arena holding every node, rooted at an implicit mailbox whose direct
/// children are the account's top-level mailboxes.
#[derive(Debug)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Tree {
    pub fn new() -> Tree {
        let mut tree = Tree {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        let root = tree.alloc_mailbox(None, String::new(), None, Vec::new());
        tree.root = root;
        tree
    }

    /// The implicit root mailbox. Its message listing is always empty and
    /// `Done`; its remaining children are top-level mailboxes.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn status(&self, id: NodeId) -> FetchStatus {
        self.get(id).map(|n| n.status).unwrap_or(FetchStatus::None)
    }

    pub fn set_status(&mut self, id: NodeId, status: FetchStatus) {
        if let Some(node) = self.get_mut(id) {
            node.status = status;
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| &n.children[..]).unwrap_or(&[])
    }

    /// Bounds-checked positional child access.
    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.get(id).and_then(|n| n.children.get(index).copied())
    }

    pub fn children_count(&self, id: NodeId) -> usize {
        self.get(id).map(|n| n.children.len()).unwrap_or(0)
    }

    /// Position of this node in its parent's child vector; 0 for the root
    /// and for pseudo-children.
    pub fn row_in_parent(&self, id: NodeId) -> usize {
        let parent = match self.parent(id) {
            Some(p) => p,
            None => return 0,
        };
        self.children(parent)
            .iter()
            .position(|c| *c == id)
            .unwrap_or(0)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Create a mailbox node together with its synthetic message-list
    /// child. The caller is responsible for inserting the new node into its
    /// parent's child vector.
    ///
    /// The message listing is born `Done` for the root placeholder (there
    /// are no messages "between" top-level mailboxes) and for `\Noselect`
    /// mailboxes, which must never be selected.
    pub fn alloc_mailbox(
        &mut self,
        parent: Option<NodeId>,
        name: String,
        separator: Option<char>,
        flags: Vec<NameAttribute>,
    ) -> NodeId {
        let mailbox = self.alloc(Node {
            parent,
            children: Vec::new(),
            status: FetchStatus::None,
            payload: Payload::Mailbox(MailboxData {
                name,
                separator,
                flags,
            }),
        });
        let list_done = parent.is_none()
            || self
                .get(mailbox)
                .and_then(|n| n.as_mailbox())
                .map(|m| m.is_no_select())
                .unwrap_or(false);
        let msg_list = self.alloc(Node {
            parent: Some(mailbox),
            children: Vec::new(),
            status: if list_done {
                FetchStatus::Done
            } else {
                FetchStatus::None
            },
            payload: Payload::MsgList,
        });
        if let Some(node) = self.get_mut(mailbox) {
            node.children.insert(0, msg_list);
        }
        mailbox
    }

    /// Create a message node under a message-list node. The caller appends
    /// it to the listing.
    pub fn alloc_message(&mut self, msg_list: NodeId, uid: Option<Uid>) -> NodeId {
        self.alloc(Node {
            parent: Some(msg_list),
            children: Vec::new(),
            status: FetchStatus::None,
            payload: Payload::Message(MessageData {
                uid,
                ..MessageData::default()
            }),
        })
    }

    /// Create a body-part node under a message or another part, together
    /// with its `HEADER`/`TEXT`/`MIME` pseudo-children.
    ///
    /// A `multipart/*` part directly below a message, or below a
    /// `message/*` part, is purely structural: it has no bytes of its own
    /// and is therefore born `Done`.
    pub fn alloc_part(&mut self, parent: NodeId, fields: &BodyFields) -> NodeId {
        let mime_type = fields.media_type.to_ascii_lowercase();
        let top_level_multipart =
            mime_type.starts_with("multipart/") && self.parent_hosts_top_level(parent);
        let part = self.alloc(Node {
            parent: Some(parent),
            children: Vec::new(),
            status: if top_level_multipart {
                FetchStatus::Done
            } else {
                FetchStatus::None
            },
            payload: Payload::Part(PartData {
                mime_type,
                transfer_encoding: fields.transfer_encoding.to_ascii_lowercase(),
                charset: fields.charset.clone(),
                body_fld_id: fields
                    .id
                    .as_deref()
                    .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string()),
                octets: fields.octets,
                data: None,
                special: None,
                specials: Vec::new(),
            }),
        });
        let specials: Vec<NodeId> = [SpecialPart::Header, SpecialPart::Text, SpecialPart::Mime]
            .iter()
            .map(|kind| {
                self.alloc(Node {
                    parent: Some(part),
                    children: Vec::new(),
                    status: FetchStatus::None,
                    payload: Payload::Part(PartData {
                        mime_type: String::new(),
                        transfer_encoding: String::new(),
                        charset: None,
                        body_fld_id: None,
                        octets: 0,
                        data: None,
                        special: Some(*kind),
                        specials: Vec::new(),
                    }),
                })
            })
            .collect();
        if let Some(Payload::Part(p)) = self.get_mut(part).map(|n| &mut n.payload) {
            p.specials = specials;
        }
        part
    }

    fn parent_hosts_top_level(&self, parent: NodeId) -> bool {
        match self.get(parent).map(|n| &n.payload) {
            Some(Payload::Message(_)) => true,
            Some(Payload::Part(p)) => p.mime_type.starts_with("message/"),
            _ => false,
        }
    }

    /// Whether this part is a top-level multipart: structural only, with no
    /// part id segment of its own.
    pub fn is_top_level_multipart(&self, id: NodeId) -> bool {
        let node = match self.get(id) {
            Some(n) => n,
            None => return false,
        };
        let part = match node.as_part() {
            Some(p) => p,
            None => return false,
        };
        part.mime_type.starts_with("multipart/")
            && node
                .parent
                .map(|p| self.parent_hosts_top_level(p))
                .unwrap_or(false)
    }

    /// The named pseudo-child of a part.
    pub fn special_child(&self, part: NodeId, kind: SpecialPart) -> Option<NodeId> {
        let index = match kind {
            SpecialPart::Header => 0,
            SpecialPart::Text => 1,
            SpecialPart::Mime => 2,
        };
        self.get(part)?.as_part()?.specials.get(index).copied()
    }

    /// Replace a node's children, transitioning it to `Done`, and return
    /// the evicted children for the caller to free.
    ///
    /// The mailbox variant preserves the message-list child at index 0 and,
    /// for a `\Noselect` mailbox, forces that child to `Done` so nothing
    /// ever tries to select it. The part variant keeps its own status: a
    /// part's status tracks its bytes, not its structure.
    pub fn set_children(&mut self, id: NodeId, new_children: Vec<NodeId>) -> Vec<NodeId> {
        for child in &new_children {
            if let Some(node) = self.get_mut(*child) {
                node.parent = Some(id);
            }
        }
        let (old, msg_list, keep_status) = match self.get(id) {
            Some(node) => match node.payload {
                Payload::Mailbox(_) => (
                    node.children.get(1..).map(|s| s.to_vec()).unwrap_or_default(),
                    node.children.first().copied(),
                    false,
                ),
                Payload::Part(_) => (node.children.clone(), None, true),
                _ => (node.children.clone(), None, false),
            },
            None => return Vec::new(),
        };
        let no_select = self
            .get(id)
            .and_then(|n| n.as_mailbox())
            .map(|m| m.is_no_select())
            .unwrap_or(false);
        if let Some(node) = self.get_mut(id) {
            node.children = new_children;
            if let Some(list) = msg_list {
                node.children.insert(0, list);
            }
            if !keep_status {
                node.status = FetchStatus::Done;
            }
        }
        if no_select {
            if let Some(list) = msg_list {
                self.set_status(list, FetchStatus::Done);
            }
        }
        old
    }

    /// Free a node and its entire subtree, pseudo-children included.
    pub fn free(&mut self, id: NodeId) {
        let node = match self.get(id) {
            Some(n) => n,
            None => return,
        };
        let mut doomed = node.children.clone();
        if let Some(part) = node.as_part() {
            doomed.extend(part.specials.iter().copied());
        }
        for child in doomed {
            self.free(child);
        }
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.node.is_some() {
                slot.node = None;
                slot.generation += 1;
                self.free.push(id.index);
            }
        }
    }

    /// Append a node at the end of a parent's child vector.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Find a mailbox node by its full name; the empty name is the root.
    pub fn find_mailbox(&self, name: &str) -> Option<NodeId> {
        fn dfs(tree: &Tree, node: NodeId, name: &str) -> Option<NodeId> {
            if tree.get(node)?.as_mailbox()?.name == name {
                return Some(node);
            }
            // child 0 is the message listing; mailboxes start at 1
            for child in tree.children(node).iter().skip(1) {
                if let Some(found) = dfs(tree, *child, name) {
                    return Some(found);
                }
            }
            None
        }
        dfs(self, self.root, name)
    }

    /// The message a part (or pseudo-part) ultimately belongs to.
    pub fn message_of(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = id;
        loop {
            let node = self.get(cursor)?;
            if node.as_message().is_some() {
                return Some(cursor);
            }
            cursor = node.parent?;
        }
    }

    /// The mailbox containing a node.
    pub fn mailbox_of(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = id;
        loop {
            let node = self.get(cursor)?;
            if node.as_mailbox().is_some() {
                return Some(cursor);
            }
            cursor = node.parent?;
        }
    }

    /// Build the MIME tree for a message from a `BODYSTRUCTURE` and return
    /// the message's new children (a single top-level part; for a multipart
    /// message that part is the structural container).
    pub fn build_message_parts(&mut self, message: NodeId, structure: &BodyStructure) -> Vec<NodeId> {
        vec![self.build_structure(message, structure)]
    }

    fn build_structure(&mut self, parent: NodeId, structure: &BodyStructure) -> NodeId {
        match structure {
            BodyStructure::Basic(fields) => self.alloc_part(parent, fields),
            BodyStructure::Message { fields, body } => {
                let part = self.alloc_part(parent, fields);
                let inner = self.build_structure(part, body);
                if let Some(node) = self.get_mut(part) {
                    node.children = vec![inner];
                }
                part
            }
            BodyStructure::Multipart { subtype, parts } => {
                let fields = BodyFields {
                    media_type: format!("multipart/{}", subtype),
                    ..BodyFields::default()
                };
                let part = self.alloc_part(parent, &fields);
                let children: Vec<NodeId> = parts
                    .iter()
                    .map(|p| self.build_structure(part, p))
                    .collect();
                if let Some(node) = self.get_mut(part) {
                    node.children = children;
                }
                part
            }
        }
    }

    /// Apply one untagged FETCH response to the given mailbox, returning
    /// the nodes whose data changed.
    ///
    /// The message listing must already be synchronized: a FETCH that
    /// arrives earlier cannot be attributed and is rejected. Out-of-range
    /// sequence numbers are rejected likewise; either way the connection
    /// itself continues.
    pub fn apply_fetch_items(
        &mut self,
        mailbox: NodeId,
        seq: Seq,
        items: &[FetchItem],
    ) -> Result<Vec<NodeId>> {
        let msg_list = self
            .child(mailbox, 0)
            .filter(|id| self.get(*id).map(|n| n.is_msg_list()).unwrap_or(false))
            .ok_or_else(|| Error::UnexpectedResponse("mailbox has no message list".into()))?;
        if self.status(msg_list) != FetchStatus::Done {
            return Err(Error::UnexpectedResponse(format!(
                "got FETCH for message {} before the listing was synchronized",
                seq
            )));
        }
        let index = (seq as usize)
            .checked_sub(1)
            .ok_or_else(|| Error::UnknownMessageIndex("FETCH with sequence number 0".into()))?;
        let message = self.child(msg_list, index).ok_or_else(|| {
            Error::UnknownMessageIndex(format!("got FETCH that is out of bounds: {}", seq))
        })?;

        let mut changed = Vec::new();
        for item in items {
            match item {
                FetchItem::Envelope(envelope) => {
                    if let Some(Payload::Message(m)) =
                        self.get_mut(message).map(|n| &mut n.payload)
                    {
                        m.envelope = Some(envelope.clone());
                    }
                    self.set_status(message, FetchStatus::Done);
                    changed.push(message);
                }
                FetchItem::BodyStructure(structure) => {
                    if self.children_count(message) > 0 {
                        // the structure is already known; the cached one wins
                        debug!("ignoring duplicate BODYSTRUCTURE for message {}", seq);
                    } else {
                        let parts = self.build_message_parts(message, structure);
                        let evicted = self.set_children(message, parts);
                        for old in evicted {
                            self.free(old);
                        }
                        changed.push(message);
                    }
                }
                FetchItem::Rfc822Size(size) => {
                    if let Some(Payload::Message(m)) =
                        self.get_mut(message).map(|n| &mut n.payload)
                    {
                        m.size = Some(*size);
                    }
                    changed.push(message);
                }
                FetchItem::Uid(uid) => {
                    if let Some(Payload::Message(m)) =
                        self.get_mut(message).map(|n| &mut n.payload)
                    {
                        m.uid = Some(*uid);
                    }
                }
                FetchItem::Flags(flags) => {
                    if let Some(Payload::Message(m)) =
                        self.get_mut(message).map(|n| &mut n.payload)
                    {
                        m.flags = flags.clone();
                    }
                    changed.push(message);
                }
                FetchItem::Body { section, data } => {
                    let part = crate::addressing::resolve_part_id(self, message, section)?;
                    let decoded = {
                        let encoding = self
                            .get(part)
                            .and_then(|n| n.as_part())
                            .map(|p| p.transfer_encoding.clone())
                            .unwrap_or_default();
                        decode_body(&encoding, data)
                    };
                    if let Some(Payload::Part(p)) = self.get_mut(part).map(|n| &mut n.payload) {
                        p.data = Some(decoded);
                    }
                    self.set_status(part, FetchStatus::Done);
                    changed.push(part);
                }
                FetchItem::Other(key) => {
                    debug!("unknown FETCH identifier {}", key);
                }
            }
        }
        Ok(changed)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(mime: &str, encoding: &str) -> BodyFields {
        BodyFields::new(mime, encoding)
    }

    #[test]
    fn root_has_done_msg_list() {
        let tree = Tree::new();
        let root = tree.root();
        assert_eq!(tree.children_count(root), 1);
        let list = tree.child(root, 0).unwrap();
        assert!(tree.get(list).unwrap().is_msg_list());
        assert_eq!(tree.status(list), FetchStatus::Done);
    }

    #[test]
    fn mailbox_always_keeps_msg_list_first() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let work = tree.alloc_mailbox(Some(root), "work".into(), Some('/'), vec![]);
        let evicted = tree.set_children(root, vec![inbox, work]);
        assert!(evicted.is_empty());
        assert_eq!(tree.children_count(root), 3);
        assert!(tree.get(tree.child(root, 0).unwrap()).unwrap().is_msg_list());
        assert_eq!(tree.status(root), FetchStatus::Done);
        // fresh mailboxes have a message list born None
        let inbox_list = tree.child(inbox, 0).unwrap();
        assert_eq!(tree.status(inbox_list), FetchStatus::None);
    }

    #[test]
    fn set_children_returns_exactly_the_evicted() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.alloc_mailbox(Some(root), "a".into(), Some('/'), vec![]);
        let b = tree.alloc_mailbox(Some(root), "b".into(), Some('/'), vec![]);
        tree.set_children(root, vec![a, b]);
        let c = tree.alloc_mailbox(Some(root), "c".into(), Some('/'), vec![]);
        let evicted = tree.set_children(root, vec![c]);
        assert_eq!(evicted, vec![a, b]);
        for old in evicted {
            tree.free(old);
        }
        assert!(tree.get(a).is_none());
        assert!(tree.get(b).is_none());
        assert_eq!(tree.children_count(root), 2);
    }

    #[test]
    fn stale_ids_do_not_alias_recycled_slots() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.alloc_mailbox(Some(root), "a".into(), Some('/'), vec![]);
        tree.free(a);
        let b = tree.alloc_mailbox(Some(root), "b".into(), Some('/'), vec![]);
        assert!(tree.get(a).is_none());
        assert_eq!(tree.get(b).unwrap().as_mailbox().unwrap().name, "b");
    }

    #[test]
    fn noselect_mailbox_msg_list_is_done() {
        let mut tree = Tree::new();
        let root = tree.root();
        let noselect = tree.alloc_mailbox(
            Some(root),
            "foo/bar".into(),
            Some('/'),
            vec![NameAttribute::NoSelect],
        );
        let list = tree.child(noselect, 0).unwrap();
        assert_eq!(tree.status(list), FetchStatus::Done);
        assert_eq!(tree.children_count(list), 0);
    }

    #[test]
    fn top_level_multipart_is_born_done() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = tree.child(inbox, 0).unwrap();
        let message = tree.alloc_message(list, Some(1));
        tree.set_children(list, vec![message]);

        let bs = BodyStructure::Multipart {
            subtype: "mixed".into(),
            parts: vec![
                BodyStructure::Basic(plain("text/plain", "7bit")),
                BodyStructure::Basic(plain("IMAGE/PNG", "base64")),
            ],
        };
        let parts = tree.build_message_parts(message, &bs);
        tree.set_children(message, parts);

        let container = tree.child(message, 0).unwrap();
        assert!(tree.is_top_level_multipart(container));
        assert_eq!(tree.status(container), FetchStatus::Done);
        assert_eq!(tree.children_count(container), 2);
        // mime types are lowercased on the way in
        let image = tree.child(container, 1).unwrap();
        assert_eq!(tree.get(image).unwrap().as_part().unwrap().mime_type, "image/png");
        assert!(!tree.is_top_level_multipart(image));
        assert_eq!(tree.status(image), FetchStatus::None);
    }

    #[test]
    fn nested_multipart_under_message_part_is_top_level() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = tree.child(inbox, 0).unwrap();
        let message = tree.alloc_message(list, Some(1));
        tree.set_children(list, vec![message]);

        let bs = BodyStructure::Message {
            fields: plain("message/rfc822", "7bit"),
            body: Box::new(BodyStructure::Multipart {
                subtype: "alternative".into(),
                parts: vec![BodyStructure::Basic(plain("text/plain", "7bit"))],
            }),
        };
        let parts = tree.build_message_parts(message, &bs);
        tree.set_children(message, parts);

        let rfc822 = tree.child(message, 0).unwrap();
        let inner = tree.child(rfc822, 0).unwrap();
        assert!(tree.is_top_level_multipart(inner));
    }

    #[test]
    fn fetch_before_sync_is_rejected() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let err = tree
            .apply_fetch_items(inbox, 1, &[FetchItem::Rfc822Size(10)])
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[test]
    fn fetch_out_of_bounds_is_rejected() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = tree.child(inbox, 0).unwrap();
        tree.set_children(list, vec![]);
        let err = tree
            .apply_fetch_items(inbox, 3, &[FetchItem::Rfc822Size(10)])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMessageIndex(_)));
    }

    #[test]
    fn envelope_marks_message_done_and_duplicate_structure_is_ignored() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = tree.child(inbox, 0).unwrap();
        let message = tree.alloc_message(list, Some(4));
        tree.set_children(list, vec![message]);

        let envelope = Envelope {
            subject: Some("Hi".into()),
            ..Envelope::default()
        };
        let structure = BodyStructure::Basic(plain("text/plain", "7bit"));
        tree.apply_fetch_items(
            inbox,
            1,
            &[
                FetchItem::Envelope(envelope),
                FetchItem::BodyStructure(structure.clone()),
                FetchItem::Rfc822Size(42),
            ],
        )
        .unwrap();
        assert_eq!(tree.status(message), FetchStatus::Done);
        let data = tree.get(message).unwrap().as_message().unwrap().clone();
        assert_eq!(data.envelope.unwrap().subject.as_deref(), Some("Hi"));
        assert_eq!(data.size, Some(42));
        let first_child = tree.child(message, 0).unwrap();

        // a second BODYSTRUCTURE leaves the existing tree alone
        let other = BodyStructure::Basic(plain("text/html", "base64"));
        tree.apply_fetch_items(inbox, 1, &[FetchItem::BodyStructure(other)])
            .unwrap();
        assert_eq!(tree.child(message, 0).unwrap(), first_child);
        assert_eq!(
            tree.get(first_child).unwrap().as_part().unwrap().mime_type,
            "text/plain"
        );
    }

    #[test]
    fn body_fetch_decodes_and_stores() {
        let mut tree = Tree::new();
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = tree.child(inbox, 0).unwrap();
        let message = tree.alloc_message(list, Some(9));
        tree.set_children(list, vec![message]);
        let structure = BodyStructure::Basic(plain("text/plain", "quoted-printable"));
        tree.apply_fetch_items(inbox, 1, &[FetchItem::BodyStructure(structure)])
            .unwrap();

        tree.apply_fetch_items(
            inbox,
            1,
            &[FetchItem::Body {
                section: "1".into(),
                data: b"Hello=3Dworld".to_vec(),
            }],
        )
        .unwrap();
        let part = tree.child(message, 0).unwrap();
        assert_eq!(tree.status(part), FetchStatus::Done);
        assert_eq!(
            tree.get(part).unwrap().as_part().unwrap().data.as_deref(),
            Some(&b"Hello=world"[..])
        );
    }
}
