//! Mailbox selection and message-list synchronization.
//!
//! `SELECT`/`EXAMINE` runs as its own task so that every mailbox-scoped
//! FETCH can simply depend on it; the engine thereby guarantees at most one
//! selected mailbox per connection.

use std::io::Write;

use crate::command::Command;
use crate::conn::CommandKind;
use crate::engine::TaskId;
use crate::error::Result;
use crate::model::Event;
use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::tree::{FetchStatus, NodeId};
use crate::types::{Flag, ResponseCode, State, Status, Uid};

/// Issue `SELECT` for a mailbox and consume the untagged chatter
/// (EXISTS/RECENT/FLAGS and the usual OK codes) that comes with it.
pub(crate) struct SelectMailbox {
    mailbox: NodeId,
    tag: Option<String>,
    exists: Option<u32>,
}

impl SelectMailbox {
    pub fn new(mailbox: NodeId) -> Self {
        SelectMailbox {
            mailbox,
            tag: None,
            exists: None,
        }
    }

    fn in_flight(&self) -> bool {
        self.tag.is_some()
    }
}

impl<W: Write> Task<W> for SelectMailbox {
    fn describe(&self) -> &'static str {
        "SelectMailbox"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        if cx.conn.selected == Some(self.mailbox) {
            return Ok(TaskStatus::Completed);
        }
        let data = match cx.tree.get(self.mailbox).and_then(|n| n.as_mailbox()) {
            Some(m) => m,
            None => return Ok(TaskStatus::Failed("mailbox is gone".to_string())),
        };
        if data.is_no_select() {
            return Ok(TaskStatus::Failed(format!(
                "{} is \\Noselect",
                data.name
            )));
        }
        let command = Command::Select {
            mailbox: data.name.clone(),
        };
        self.tag = Some(cx.conn.submit(
            id,
            CommandKind::Select,
            Some(data.name.clone()),
            &command,
        )?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_exists(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        count: u32,
    ) -> Result<Dispatch> {
        if !self.in_flight() {
            return Ok(Dispatch::NotMine);
        }
        self.exists = Some(count);
        Ok(Dispatch::Handled)
    }

    fn handle_recent(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _count: u32,
    ) -> Result<Dispatch> {
        if !self.in_flight() {
            return Ok(Dispatch::NotMine);
        }
        Ok(Dispatch::Handled)
    }

    fn handle_flags(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _flags: &[Flag],
    ) -> Result<Dispatch> {
        if !self.in_flight() {
            return Ok(Dispatch::NotMine);
        }
        Ok(Dispatch::Handled)
    }

    fn handle_state(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        state: &State,
    ) -> Result<Dispatch> {
        if state.tag.is_none() {
            // untagged OK with select-time codes (UIDVALIDITY, UNSEEN, ...)
            let select_related = matches!(
                state.code,
                Some(ResponseCode::UidNext(_))
                    | Some(ResponseCode::UidValidity(_))
                    | Some(ResponseCode::Unseen(_))
                    | Some(ResponseCode::PermanentFlags(_))
                    | Some(ResponseCode::ReadOnly)
                    | Some(ResponseCode::ReadWrite)
            );
            if self.in_flight() && state.status == Status::Ok && select_related {
                return Ok(Dispatch::Handled);
            }
            return Ok(Dispatch::NotMine);
        }
        if state.tag != self.tag {
            return Ok(Dispatch::NotMine);
        }
        match state.status {
            Status::Ok => {
                cx.conn.selected = Some(self.mailbox);
                Ok(Dispatch::Completed)
            }
            _ => Ok(Dispatch::Failed(format!(
                "SELECT failed: {}",
                state.information.clone().unwrap_or_default()
            ))),
        }
    }
}

/// Synchronize a mailbox's message listing: `UID SEARCH ALL`, then message
/// nodes in sequence order (uids ascending). Depends on [`SelectMailbox`].
pub(crate) struct SyncMessageList {
    msg_list: NodeId,
    tag: Option<String>,
    uids: Vec<Uid>,
}

impl SyncMessageList {
    pub fn new(msg_list: NodeId) -> Self {
        SyncMessageList {
            msg_list,
            tag: None,
            uids: Vec::new(),
        }
    }
}

impl<W: Write> Task<W> for SyncMessageList {
    fn describe(&self) -> &'static str {
        "SyncMessageList"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        if cx.tree.status(self.msg_list) == FetchStatus::Done {
            return Ok(TaskStatus::Completed);
        }
        self.tag = Some(
            cx.conn
                .submit(id, CommandKind::Search, None, &Command::UidSearchAll)?,
        );
        Ok(TaskStatus::InProgress)
    }

    fn handle_search(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        uids: &[Uid],
    ) -> Result<Dispatch> {
        if self.tag.is_none() {
            return Ok(Dispatch::NotMine);
        }
        self.uids.extend_from_slice(uids);
        Ok(Dispatch::Handled)
    }

    fn handle_state(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        state: &State,
    ) -> Result<Dispatch> {
        if state.tag.is_none() || state.tag != self.tag {
            return Ok(Dispatch::NotMine);
        }
        if state.status != Status::Ok {
            cx.tree.set_status(self.msg_list, FetchStatus::None);
            return Ok(Dispatch::Failed(format!(
                "UID SEARCH failed: {}",
                state.information.clone().unwrap_or_default()
            )));
        }
        // uids ascending is sequence order
        self.uids.sort_unstable();
        let messages: Vec<NodeId> = self
            .uids
            .iter()
            .map(|uid| cx.tree.alloc_message(self.msg_list, Some(*uid)))
            .collect();
        let evicted = cx.tree.set_children(self.msg_list, messages);
        for old in evicted {
            cx.tree.free(old);
        }
        if let Some(mailbox) = cx.tree.parent(self.msg_list) {
            if let Some(name) = cx
                .tree
                .get(mailbox)
                .and_then(|n| n.as_mailbox())
                .map(|m| m.name.clone())
            {
                cx.cache.set_message_list(&name, self.uids.clone());
            }
        }
        cx.events.emit(Event::DataChanged(self.msg_list));
        Ok(Dispatch::Completed)
    }
}
