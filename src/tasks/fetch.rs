//! Message metadata and body-part retrieval.

use std::io::Write;

use crate::addressing;
use crate::cache::MessageMetadata;
use crate::command::Command;
use crate::conn::CommandKind;
use crate::engine::TaskId;
use crate::error::{Error, Result};
use crate::model::Event;
use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::tree::{FetchStatus, NodeId};
use crate::types::{FetchItem, Seq, State, Status, Uid};

/// Resolve an incoming FETCH against the selected mailbox.
///
/// Returns the mailbox and the message node at `seq`. A FETCH that arrives
/// with no mailbox selected, or before the listing was synchronized, cannot
/// be attributed; an out-of-range sequence number does not exist. Either
/// way the response is dropped and the connection continues.
fn locate<W: Write>(cx: &TaskCtx<'_, W>, seq: Seq) -> Result<(NodeId, NodeId)> {
    let mailbox = cx.conn.selected.ok_or_else(|| {
        Error::UnexpectedResponse(format!("FETCH {} with no mailbox selected", seq))
    })?;
    let msg_list = cx
        .tree
        .child(mailbox, 0)
        .ok_or_else(|| Error::UnexpectedResponse("mailbox has no message list".to_string()))?;
    if cx.tree.status(msg_list) != FetchStatus::Done {
        return Err(Error::UnexpectedResponse(format!(
            "got FETCH for message {} before the listing was synchronized",
            seq
        )));
    }
    let message = (seq as usize)
        .checked_sub(1)
        .and_then(|index| cx.tree.child(msg_list, index))
        .ok_or_else(|| {
            Error::UnknownMessageIndex(format!("got FETCH that is out of bounds: {}", seq))
        })?;
    Ok((mailbox, message))
}

fn mailbox_name<W: Write>(cx: &TaskCtx<'_, W>, mailbox: NodeId) -> Option<String> {
    cx.tree
        .get(mailbox)
        .and_then(|n| n.as_mailbox())
        .map(|m| m.name.clone())
}

/// `UID FETCH uid (ENVELOPE BODYSTRUCTURE RFC822.SIZE)` for one message.
pub(crate) struct FetchMessageMetadata {
    message: NodeId,
    uid: Option<Uid>,
    tag: Option<String>,
}

impl FetchMessageMetadata {
    pub fn new(message: NodeId) -> Self {
        FetchMessageMetadata {
            message,
            uid: None,
            tag: None,
        }
    }
}

impl<W: Write> Task<W> for FetchMessageMetadata {
    fn describe(&self) -> &'static str {
        "FetchMessageMetadata"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        let uid = match cx
            .tree
            .get(self.message)
            .and_then(|n| n.as_message())
            .and_then(|m| m.uid)
        {
            Some(uid) => uid,
            None => return Ok(TaskStatus::Failed("message has no uid".to_string())),
        };
        self.uid = Some(uid);
        self.tag = Some(cx.conn.submit(
            id,
            CommandKind::FetchMetadata,
            Some(uid.to_string()),
            &Command::UidFetchMetadata { uid },
        )?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_fetch(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        seq: Seq,
        items: &[FetchItem],
    ) -> Result<Dispatch> {
        if self.tag.is_none() {
            return Ok(Dispatch::NotMine);
        }
        let (mailbox, message) = locate(cx, seq)?;
        if message != self.message {
            return Ok(Dispatch::NotMine);
        }
        let changed = cx.tree.apply_fetch_items(mailbox, seq, items)?;
        for node in changed {
            cx.events.emit(Event::DataChanged(node));
        }

        if let (Some(name), Some(uid)) = (mailbox_name(cx, mailbox), self.uid) {
            let data = cx.tree.get(message).and_then(|n| n.as_message());
            let mut metadata = cx
                .cache
                .message_metadata(&name, uid)
                .unwrap_or_else(MessageMetadata::default);
            if let Some(data) = data {
                metadata.envelope = data.envelope.clone();
                metadata.size = data.size;
            }
            for item in items {
                if let FetchItem::BodyStructure(structure) = item {
                    if metadata.body_structure.is_none() {
                        metadata.body_structure = Some(structure.clone());
                    }
                }
            }
            cx.cache.set_message_metadata(&name, uid, metadata);
        }
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
        match state.status {
            Status::Ok => Ok(Dispatch::Completed),
            _ => {
                cx.tree.set_status(self.message, FetchStatus::None);
                Ok(Dispatch::Failed(format!(
                    "UID FETCH failed: {}",
                    state.information.clone().unwrap_or_default()
                )))
            }
        }
    }
}

/// `UID FETCH uid (BODY.PEEK[section])` for one body part, decoding the
/// transfer encoding on arrival.
pub(crate) struct FetchMessagePart {
    part: NodeId,
    section: Option<String>,
    uid: Option<Uid>,
    tag: Option<String>,
}

impl FetchMessagePart {
    pub fn new(part: NodeId) -> Self {
        FetchMessagePart {
            part,
            section: None,
            uid: None,
            tag: None,
        }
    }
}

impl<W: Write> Task<W> for FetchMessagePart {
    fn describe(&self) -> &'static str {
        "FetchMessagePart"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        let message = match cx.tree.message_of(self.part) {
            Some(m) => m,
            None => return Ok(TaskStatus::Failed("part has no message".to_string())),
        };
        let uid = match cx
            .tree
            .get(message)
            .and_then(|n| n.as_message())
            .and_then(|m| m.uid)
        {
            Some(uid) => uid,
            None => return Ok(TaskStatus::Failed("message has no uid".to_string())),
        };
        let section = addressing::part_id(cx.tree, self.part)?;
        if section.is_empty() {
            // a structural multipart has no bytes of its own
            cx.tree.set_status(self.part, FetchStatus::Done);
            return Ok(TaskStatus::Completed);
        }
        self.uid = Some(uid);
        self.section = Some(section.clone());
        self.tag = Some(cx.conn.submit(
            id,
            CommandKind::FetchPart,
            Some(section.clone()),
            &Command::UidFetchPart { uid, section },
        )?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_fetch(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        seq: Seq,
        items: &[FetchItem],
    ) -> Result<Dispatch> {
        if self.tag.is_none() {
            return Ok(Dispatch::NotMine);
        }
        let (mailbox, message) = locate(cx, seq)?;
        if Some(message) != cx.tree.message_of(self.part) {
            return Ok(Dispatch::NotMine);
        }
        let changed = cx.tree.apply_fetch_items(mailbox, seq, items)?;
        for node in changed {
            cx.events.emit(Event::DataChanged(node));
        }
        cx.events.emit(Event::MessageChanged(message));

        if let (Some(name), Some(uid), Some(section)) = (
            mailbox_name(cx, mailbox),
            self.uid,
            self.section.as_deref(),
        ) {
            if let Some(data) = cx
                .tree
                .get(self.part)
                .and_then(|n| n.as_part())
                .and_then(|p| p.data.clone())
            {
                cx.cache.set_message_part(&name, uid, section, data);
            }
        }
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
        match state.status {
            Status::Ok if cx.tree.status(self.part) == FetchStatus::Done => {
                Ok(Dispatch::Completed)
            }
            Status::Ok => {
                cx.tree.set_status(self.part, FetchStatus::None);
                Ok(Dispatch::Failed(
                    "server did not return the requested part".to_string(),
                ))
            }
            _ => {
                cx.tree.set_status(self.part, FetchStatus::None);
                Ok(Dispatch::Failed(format!(
                    "UID FETCH failed: {}",
                    state.information.clone().unwrap_or_default()
                )))
            }
        }
    }
}
