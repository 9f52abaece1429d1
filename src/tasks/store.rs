//! Flag updates with `STORE`.

use std::io::Write;

use crate::command::Command;
use crate::conn::CommandKind;
use crate::engine::TaskId;
use crate::error::Result;
use crate::model::Event;
use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::tree::{NodeId, Payload};
use crate::types::{FetchItem, Seq, State, Status};

/// Add or remove one flag on a set of messages, identified by their rows in
/// the message listing. Servers usually echo the new flag set in untagged
/// FETCHes; the tagged OK applies the change locally either way.
pub(crate) struct StoreFlags {
    msg_list: NodeId,
    rows: Vec<usize>,
    flag: crate::types::Flag,
    add: bool,
    tag: Option<String>,
}

impl StoreFlags {
    pub fn new(msg_list: NodeId, rows: Vec<usize>, flag: crate::types::Flag, add: bool) -> Self {
        StoreFlags {
            msg_list,
            rows,
            flag,
            add,
            tag: None,
        }
    }

    fn sequence_set(&self) -> String {
        let mut seqs: Vec<usize> = self.rows.iter().map(|row| row + 1).collect();
        seqs.sort_unstable();
        seqs.dedup();
        seqs.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn apply_locally<W: Write>(&self, cx: &mut TaskCtx<'_, W>) {
        for &row in &self.rows {
            let message = match cx.tree.child(self.msg_list, row) {
                Some(m) => m,
                None => continue,
            };
            if let Some(Payload::Message(data)) = cx.tree.get_mut(message).map(|n| &mut n.payload)
            {
                if self.add {
                    if !data.flags.contains(&self.flag) {
                        data.flags.push(self.flag.clone());
                    }
                } else {
                    data.flags.retain(|f| *f != self.flag);
                }
            }
            cx.events.emit(Event::MessageChanged(message));
        }
    }
}

impl<W: Write> Task<W> for StoreFlags {
    fn describe(&self) -> &'static str {
        "StoreFlags"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        if self.rows.is_empty() {
            return Ok(TaskStatus::Completed);
        }
        let command = Command::Store {
            sequence: self.sequence_set(),
            flag: self.flag.clone(),
            add: self.add,
        };
        self.tag = Some(cx.conn.submit(id, CommandKind::Store, None, &command)?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_fetch(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        seq: Seq,
        items: &[FetchItem],
    ) -> Result<Dispatch> {
        if self.tag.is_none() || !self.rows.contains(&((seq as usize).saturating_sub(1))) {
            return Ok(Dispatch::NotMine);
        }
        let mailbox = match cx.tree.parent(self.msg_list) {
            Some(m) => m,
            None => return Ok(Dispatch::NotMine),
        };
        let changed = cx.tree.apply_fetch_items(mailbox, seq, items)?;
        for node in changed {
            cx.events.emit(Event::MessageChanged(node));
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
            Status::Ok => {
                self.apply_locally(cx);
                Ok(Dispatch::Completed)
            }
            _ => Ok(Dispatch::Failed(format!(
                "STORE failed: {}",
                state.information.clone().unwrap_or_default()
            ))),
        }
    }
}
