//! The model façade: the single entry point the UI uses to read tree nodes
//! and trigger loads.
//!
//! Reads are cheap and never block: an accessor that touches an unfetched
//! node returns what is known right now, marks the node `Loading`, and
//! kicks off the task that will fill it in. When fresh data lands, a
//! [`Event::DataChanged`] for the node shows up on the event channel.

use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc;

use chrono::{DateTime, FixedOffset};

use crate::addressing;
use crate::cache::Cache;
use crate::conn::{Connection, ConnectionState};
use crate::engine::{TaskEngine, TaskId, TaskState};
use crate::tasks::{
    Append, CreateConnection, CreateMailbox, FetchMessageMetadata, FetchMessagePart,
    GetAnyConnection, ListChildMailboxes, SelectMailbox, StoreFlags, SyncMessageList, TaskCtx,
};
use crate::tree::{FetchStatus, NodeId, Payload, Tree};
use crate::types::{Envelope, Flag, NameAttribute, Response};

/// Signals emitted by the model, delivered over an mpsc channel so the UI
/// collaborator can drain them whenever it gets around to it.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    MailboxCreationSucceeded(String),
    MailboxCreationFailed(String, String),
    /// Network activity started or stopped.
    ActivityHappening(bool),
    /// A node's data or children changed.
    DataChanged(NodeId),
    /// Something about a message (flags, part bytes) changed.
    MessageChanged(NodeId),
    /// A rendered document wants an external URL while externals are
    /// blocked; the UI decides whether to unblock.
    RequestingExternal(String),
}

/// Fire-and-forget sender: a UI that went away must not take the engine
/// down with it.
#[derive(Clone)]
pub(crate) struct EventSender(mpsc::Sender<Event>);

impl EventSender {
    pub(crate) fn new(sender: mpsc::Sender<Event>) -> EventSender {
        EventSender(sender)
    }

    pub fn emit(&self, event: Event) {
        let _ = self.0.send(event);
    }
}

/// Login credentials for the one account this model serves.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Roles for the dynamic [`Model::data`] adapter; prefer the typed
/// per-role accessors where you can.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Display,
    Tooltip,
    Envelope,
    Size,
    Flags,
    IsFetched,
    PartBytes,
}

/// The dynamically typed result of [`Model::data`].
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    None,
    Text(String),
    Number(u32),
    Envelope(Box<Envelope>),
    Flags(Vec<Flag>),
    Bool(bool),
    Bytes(Vec<u8>),
}

macro_rules! cx {
    ($model:expr) => {
        TaskCtx {
            tree: &mut $model.tree,
            conn: &mut $model.conn,
            cache: &mut *$model.cache,
            events: &$model.events,
        }
    };
}

/// One account's worth of IMAP state: the tree, the cache, one connection,
/// and the tasks in flight over it.
///
/// Everything runs on the caller's thread; feed parsed responses in with
/// [`process_response`](Self::process_response) and drain the event channel
/// in between.
pub struct Model<W: Write> {
    pub(crate) tree: Tree,
    pub(crate) conn: Connection<W>,
    pub(crate) cache: Box<dyn Cache>,
    pub(crate) engine: TaskEngine<W>,
    pub(crate) events: EventSender,
    credentials: Credentials,
    greeting_pending: bool,
    connect_task: Option<TaskId>,
    select_tasks: HashMap<NodeId, TaskId>,
    sync_tasks: HashMap<NodeId, TaskId>,
    busy: bool,
    pub(crate) externals_enabled: bool,
}

enum Kind {
    Mailbox,
    MsgList,
    Message,
    Part,
}

impl<W: Write> Model<W> {
    /// Build a model over an established transport. The greeting is
    /// expected to arrive as the first response; if the transport bootstrap
    /// already consumed it (connect-time STARTTLS), call
    /// [`set_greeting_consumed`](Self::set_greeting_consumed) before
    /// anything else.
    pub fn new(
        transport: W,
        credentials: Credentials,
        cache: Box<dyn Cache>,
    ) -> (Model<W>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let model = Model {
            tree: Tree::new(),
            conn: Connection::new(transport),
            cache,
            engine: TaskEngine::new(),
            events: EventSender(tx),
            credentials,
            greeting_pending: true,
            connect_task: None,
            select_tasks: HashMap::new(),
            sync_tasks: HashMap::new(),
            busy: false,
            externals_enabled: false,
        };
        (model, rx)
    }

    pub fn set_greeting_consumed(&mut self) {
        self.greeting_pending = false;
    }

    /// The implicit root mailbox.
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Read-only access to the tree for collaborators that only navigate.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Feed one parsed server response into the engine.
    pub fn process_response(&mut self, response: Response) {
        let mut cx = cx!(self);
        self.engine.process_response(&mut cx, &response);
        self.update_busy();
    }

    /// The transport owner saw a socket error: fail everything in flight.
    pub fn connection_lost(&mut self, reason: &str) {
        let mut cx = cx!(self);
        self.engine.connection_lost(&mut cx, reason);
        self.update_busy();
    }

    fn drive(&mut self) {
        let mut cx = cx!(self);
        self.engine.drive(&mut cx);
        self.update_busy();
    }

    fn update_busy(&mut self) {
        let busy = self.engine.has_live_tasks();
        if busy != self.busy {
            self.busy = busy;
            self.events.emit(Event::ActivityHappening(busy));
        }
    }

    fn kind(&self, node: NodeId) -> Option<Kind> {
        self.tree.get(node).map(|n| match n.payload {
            Payload::Mailbox(_) => Kind::Mailbox,
            Payload::MsgList => Kind::MsgList,
            Payload::Message(_) => Kind::Message,
            Payload::Part(_) => Kind::Part,
        })
    }

    // ---- task plumbing ------------------------------------------------

    fn ensure_connection(&mut self) -> Option<TaskId> {
        if self.conn.state() == ConnectionState::Ready {
            return None;
        }
        if let Some(tid) = self.connect_task {
            if matches!(
                self.engine.state(tid),
                TaskState::Pending | TaskState::Active
            ) {
                return Some(tid);
            }
        }
        let task = CreateConnection::new(
            self.credentials.username.clone(),
            self.credentials.password.clone(),
            self.greeting_pending,
        );
        let tid = self.engine.add(Box::new(task));
        self.connect_task = Some(tid);
        Some(tid)
    }

    fn get_any_connection(&mut self) -> TaskId {
        let dep = self.ensure_connection();
        let tid = self.engine.add(Box::new(GetAnyConnection));
        if let Some(dep) = dep {
            self.engine.add_dependency(tid, dep);
        }
        tid
    }

    fn ensure_select(&mut self, mailbox: NodeId) -> TaskId {
        if let Some(&tid) = self.select_tasks.get(&mailbox) {
            match self.engine.state(tid) {
                TaskState::Pending | TaskState::Active => return tid,
                TaskState::Completed if self.conn.selected == Some(mailbox) => return tid,
                _ => {}
            }
        }
        let dep = self.get_any_connection();
        let tid = self.engine.add(Box::new(SelectMailbox::new(mailbox)));
        self.engine.add_dependency(tid, dep);
        self.select_tasks.insert(mailbox, tid);
        tid
    }

    fn ensure_sync(&mut self, msg_list: NodeId, mailbox: NodeId) -> TaskId {
        if let Some(&tid) = self.sync_tasks.get(&msg_list) {
            match self.engine.state(tid) {
                TaskState::Pending | TaskState::Active => return tid,
                TaskState::Completed if self.tree.status(msg_list) == FetchStatus::Done => {
                    return tid;
                }
                _ => {}
            }
        }
        let select = self.ensure_select(mailbox);
        let tid = self.engine.add(Box::new(SyncMessageList::new(msg_list)));
        self.engine.add_dependency(tid, select);
        self.sync_tasks.insert(msg_list, tid);
        tid
    }

    /// The select + sync prerequisites every mailbox-scoped fetch needs.
    fn mailbox_scope(&mut self, msg_list: NodeId, mailbox: NodeId) -> (TaskId, TaskId) {
        let select = self.ensure_select(mailbox);
        let sync = self.ensure_sync(msg_list, mailbox);
        (select, sync)
    }

    fn mailbox_name(&self, mailbox: NodeId) -> Option<String> {
        self.tree
            .get(mailbox)
            .and_then(|n| n.as_mailbox())
            .map(|m| m.name.clone())
    }

    // ---- lazy fetching ------------------------------------------------

    /// Idempotent per-node fetch: a no-op unless the node is `None`.
    fn ensure_fetch(&mut self, node: NodeId) {
        if self.tree.status(node) != FetchStatus::None {
            return;
        }
        match self.kind(node) {
            Some(Kind::Mailbox) => self.fetch_mailbox(node),
            Some(Kind::MsgList) => self.fetch_msg_list(node),
            Some(Kind::Message) => self.fetch_message(node),
            Some(Kind::Part) => self.fetch_part(node),
            None => {}
        }
    }

    fn fetch_mailbox(&mut self, mailbox: NodeId) {
        let name = match self.mailbox_name(mailbox) {
            Some(n) => n,
            None => return,
        };
        self.tree.set_status(mailbox, FetchStatus::Loading);
        if let Some(metadata) = self.cache.child_mailboxes(&name) {
            let nodes: Vec<NodeId> = metadata
                .iter()
                .map(|m| {
                    self.tree.alloc_mailbox(
                        Some(mailbox),
                        m.name.clone(),
                        m.separator,
                        m.flags.iter().map(|f| NameAttribute::from(f.as_str())).collect(),
                    )
                })
                .collect();
            let evicted = self.tree.set_children(mailbox, nodes);
            for old in evicted {
                self.tree.free(old);
            }
            self.events.emit(Event::DataChanged(mailbox));
            return;
        }
        let dep = self.get_any_connection();
        let tid = self.engine.add(Box::new(ListChildMailboxes::new(mailbox)));
        self.engine.add_dependency(tid, dep);
        self.drive();
    }

    fn fetch_msg_list(&mut self, msg_list: NodeId) {
        let mailbox = match self.tree.parent(msg_list) {
            Some(m) => m,
            None => return,
        };
        let name = match self.mailbox_name(mailbox) {
            Some(n) => n,
            None => return,
        };
        self.tree.set_status(msg_list, FetchStatus::Loading);
        if let Some(uids) = self.cache.message_list(&name) {
            let messages: Vec<NodeId> = uids
                .iter()
                .map(|uid| self.tree.alloc_message(msg_list, Some(*uid)))
                .collect();
            let evicted = self.tree.set_children(msg_list, messages);
            for old in evicted {
                self.tree.free(old);
            }
            self.events.emit(Event::DataChanged(msg_list));
            return;
        }
        self.mailbox_scope(msg_list, mailbox);
        self.drive();
    }

    fn fetch_message(&mut self, message: NodeId) {
        let msg_list = match self.tree.parent(message) {
            Some(l) => l,
            None => return,
        };
        let mailbox = match self.tree.parent(msg_list) {
            Some(m) => m,
            None => return,
        };
        self.tree.set_status(message, FetchStatus::Loading);

        let cached = self
            .mailbox_name(mailbox)
            .zip(self.tree.get(message).and_then(|n| n.as_message()).and_then(|m| m.uid))
            .and_then(|(name, uid)| self.cache.message_metadata(&name, uid));
        if let Some(metadata) = cached.filter(|m| m.envelope.is_some()) {
            if let Some(Payload::Message(data)) =
                self.tree.get_mut(message).map(|n| &mut n.payload)
            {
                data.envelope = metadata.envelope.clone();
                data.size = metadata.size;
            }
            if let Some(structure) = &metadata.body_structure {
                if self.tree.children_count(message) == 0 {
                    let parts = self.tree.build_message_parts(message, structure);
                    self.tree.set_children(message, parts);
                }
            }
            self.tree.set_status(message, FetchStatus::Done);
            self.events.emit(Event::DataChanged(message));
            return;
        }

        let (select, sync) = self.mailbox_scope(msg_list, mailbox);
        let tid = self.engine.add(Box::new(FetchMessageMetadata::new(message)));
        self.engine.add_dependency(tid, select);
        self.engine.add_dependency(tid, sync);
        self.drive();
    }

    fn fetch_part(&mut self, part: NodeId) {
        let message = match self.tree.message_of(part) {
            Some(m) => m,
            None => return,
        };
        let msg_list = match self.tree.parent(message) {
            Some(l) => l,
            None => return,
        };
        let mailbox = match self.tree.parent(msg_list) {
            Some(m) => m,
            None => return,
        };
        self.tree.set_status(part, FetchStatus::Loading);

        let uid = self
            .tree
            .get(message)
            .and_then(|n| n.as_message())
            .and_then(|m| m.uid);
        let section = addressing::part_id(&self.tree, part).ok();
        if let (Some(name), Some(uid), Some(section)) =
            (self.mailbox_name(mailbox), uid, section.as_deref())
        {
            if let Some(bytes) = self.cache.message_part(&name, uid, section) {
                if let Some(Payload::Part(data)) =
                    self.tree.get_mut(part).map(|n| &mut n.payload)
                {
                    data.data = Some(bytes);
                }
                self.tree.set_status(part, FetchStatus::Done);
                self.events.emit(Event::DataChanged(part));
                return;
            }
        }

        let (select, sync) = self.mailbox_scope(msg_list, mailbox);
        let tid = self.engine.add(Box::new(FetchMessagePart::new(part)));
        self.engine.add_dependency(tid, select);
        self.engine.add_dependency(tid, sync);
        self.drive();
    }

    // ---- node accessors ----------------------------------------------

    /// Number of children right now; triggers the fetch that will bring
    /// the real children in if nothing has been requested yet. Body parts
    /// know their structure from BODYSTRUCTURE and never fetch here.
    pub fn row_count(&mut self, node: NodeId) -> usize {
        if !matches!(self.kind(node), Some(Kind::Part)) {
            self.ensure_fetch(node);
        }
        self.tree.children_count(node)
    }

    /// Bounds-checked child access. The message listing at index 0 of a
    /// mailbox is always there and costs nothing.
    pub fn child(&mut self, node: NodeId, index: usize) -> Option<NodeId> {
        let skip_fetch = match self.kind(node) {
            Some(Kind::Mailbox) => index == 0,
            Some(Kind::Part) | None => true,
            _ => false,
        };
        if !skip_fetch {
            self.ensure_fetch(node);
        }
        self.tree.child(node, index)
    }

    /// Position of a node in its parent.
    pub fn row_in_parent(&self, node: NodeId) -> usize {
        self.tree.row_in_parent(node)
    }

    /// Explicitly request a node's contents. Idempotent: a node that is
    /// already loading or loaded is left alone.
    pub fn fetch(&mut self, node: NodeId) {
        self.ensure_fetch(node);
    }

    /// Fast answer from the LIST flags where possible; otherwise triggers
    /// a listing and reports what is known so far.
    pub fn has_child_mailboxes(&mut self, mailbox: NodeId) -> bool {
        if self.tree.status(mailbox) == FetchStatus::Done {
            return self.tree.children_count(mailbox) > 1;
        }
        if let Some(hint) = self
            .tree
            .get(mailbox)
            .and_then(|n| n.as_mailbox())
            .and_then(|m| m.child_mailboxes_hint())
        {
            return hint;
        }
        self.ensure_fetch(mailbox);
        self.tree.children_count(mailbox) > 1
    }

    /// Drop the cached child listing and fetch it again from the server.
    pub fn rescan_for_child_mailboxes(&mut self, mailbox: NodeId) {
        if let Some(name) = self.mailbox_name(mailbox) {
            self.cache.forget_child_mailboxes(&name);
        }
        self.tree.set_status(mailbox, FetchStatus::None);
        self.ensure_fetch(mailbox);
    }

    // ---- typed data accessors ----------------------------------------

    /// The one-line label for a node, in the shape the tree view wants.
    pub fn display_text(&mut self, node: NodeId) -> Option<String> {
        let status = self.tree.status(node);
        match self.kind(node)? {
            Kind::Mailbox => {
                let data = self.tree.get(node)?.as_mailbox()?;
                if data.name.is_empty() {
                    return None;
                }
                let name = data.leaf_name().to_string();
                Some(if status == FetchStatus::Loading {
                    format!("{} [loading]", name)
                } else {
                    name
                })
            }
            Kind::MsgList => Some(match status {
                FetchStatus::Loading => "[loading messages...]".to_string(),
                FetchStatus::Done => {
                    let count = self.tree.children_count(node);
                    if count > 0 {
                        format!("[{} messages]", count)
                    } else {
                        "[no messages]".to_string()
                    }
                }
                FetchStatus::None => "[messages?]".to_string(),
            }),
            Kind::Message => {
                self.ensure_fetch(node);
                if self.tree.status(node) != FetchStatus::Done {
                    return Some("[loading...]".to_string());
                }
                let data = self.tree.get(node)?.as_message()?;
                Some(
                    data.envelope
                        .as_ref()
                        .and_then(|e| e.subject.clone())
                        .unwrap_or_default(),
                )
            }
            Kind::Part => {
                let part = self.tree.get(node)?.as_part()?;
                let mime = part.mime_type.clone();
                if self.tree.is_top_level_multipart(node) {
                    Some(mime)
                } else {
                    let id = addressing::part_id(&self.tree, node).unwrap_or_default();
                    Some(format!("{}: {}", id, mime))
                }
            }
        }
    }

    /// A hover summary; only messages have one.
    pub fn tooltip(&mut self, node: NodeId) -> Option<String> {
        match self.kind(node)? {
            Kind::Message => {
                self.ensure_fetch(node);
                let data = self.tree.get(node)?.as_message()?;
                data.envelope.as_ref().map(|e| e.to_string())
            }
            _ => None,
        }
    }

    pub fn envelope(&mut self, message: NodeId) -> Option<Envelope> {
        self.ensure_fetch(message);
        self.tree
            .get(message)?
            .as_message()?
            .envelope
            .clone()
    }

    pub fn size(&mut self, message: NodeId) -> Option<u32> {
        self.ensure_fetch(message);
        self.tree.get(message)?.as_message()?.size
    }

    pub fn flags(&self, message: NodeId) -> Vec<Flag> {
        self.tree
            .get(message)
            .and_then(|n| n.as_message())
            .map(|m| m.flags.clone())
            .unwrap_or_default()
    }

    pub fn is_fetched(&self, node: NodeId) -> bool {
        self.tree.status(node) == FetchStatus::Done
    }

    /// The decoded bytes of a body part, triggering the fetch on a miss.
    pub fn part_bytes(&mut self, part: NodeId) -> Option<Vec<u8>> {
        self.ensure_fetch(part);
        self.tree.get(part)?.as_part()?.data.clone()
    }

    /// Thin dynamic adapter over the typed accessors, for a UI boundary
    /// that wants a single entry point.
    pub fn data(&mut self, node: NodeId, role: Role) -> Data {
        match role {
            Role::Display => self
                .display_text(node)
                .map(Data::Text)
                .unwrap_or(Data::None),
            Role::Tooltip => self.tooltip(node).map(Data::Text).unwrap_or(Data::None),
            Role::Envelope => self
                .envelope(node)
                .map(|e| Data::Envelope(Box::new(e)))
                .unwrap_or(Data::None),
            Role::Size => self.size(node).map(Data::Number).unwrap_or(Data::None),
            Role::Flags => Data::Flags(self.flags(node)),
            Role::IsFetched => Data::Bool(self.is_fetched(node)),
            Role::PartBytes => self
                .part_bytes(node)
                .map(Data::Bytes)
                .unwrap_or(Data::None),
        }
    }

    // ---- operations ---------------------------------------------------

    /// Create a mailbox on the server; the outcome arrives as a
    /// [`Event::MailboxCreationSucceeded`] or
    /// [`Event::MailboxCreationFailed`].
    pub fn create_mailbox(&mut self, name: &str) {
        let dep = self.get_any_connection();
        let tid = self.engine.add(Box::new(CreateMailbox::new(name.to_string())));
        self.engine.add_dependency(tid, dep);
        self.drive();
    }

    /// Upload raw message bytes into a mailbox.
    pub fn append(
        &mut self,
        mailbox: &str,
        message: Vec<u8>,
        flags: Vec<Flag>,
        date: Option<DateTime<FixedOffset>>,
    ) {
        let dep = self.get_any_connection();
        let tid = self
            .engine
            .add(Box::new(Append::new(mailbox.to_string(), message, flags, date)));
        self.engine.add_dependency(tid, dep);
        self.drive();
    }

    /// Set or clear `\Seen` on the messages at the given rows of a message
    /// listing.
    pub fn mark_messages_read(&mut self, msg_list: NodeId, rows: &[usize], read: bool) {
        self.set_message_flags(msg_list, rows, Flag::Seen, read);
    }

    /// Set or clear an arbitrary flag on the messages at the given rows.
    pub fn set_message_flags(&mut self, msg_list: NodeId, rows: &[usize], flag: Flag, add: bool) {
        let mailbox = match self.tree.parent(msg_list) {
            Some(m) => m,
            None => return,
        };
        let (select, sync) = self.mailbox_scope(msg_list, mailbox);
        let tid = self.engine.add(Box::new(StoreFlags::new(
            msg_list,
            rows.to_vec(),
            flag,
            add,
        )));
        self.engine.add_dependency(tid, select);
        self.engine.add_dependency(tid, sync);
        self.drive();
    }

    /// Whether http/ftp references in rendered content may hit the network.
    pub fn externals_enabled(&self) -> bool {
        self.externals_enabled
    }

    pub fn set_externals_enabled(&mut self, enabled: bool) {
        self.externals_enabled = enabled;
    }
}
