//! Upload a message with `APPEND`.

use std::io::Write;

use chrono::{DateTime, FixedOffset};

use crate::command::Command;
use crate::conn::CommandKind;
use crate::engine::TaskId;
use crate::error::Result;
use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::types::{Flag, State, Status};

/// `APPEND` raw message bytes into a target mailbox. The literal goes out
/// in one write with `LITERAL+`, otherwise the payload waits for the
/// server's continuation request.
pub(crate) struct Append {
    mailbox: String,
    flags: Vec<Flag>,
    date: Option<DateTime<FixedOffset>>,
    message: Vec<u8>,
    tag: Option<String>,
}

impl Append {
    pub fn new(
        mailbox: String,
        message: Vec<u8>,
        flags: Vec<Flag>,
        date: Option<DateTime<FixedOffset>>,
    ) -> Self {
        Append {
            mailbox,
            flags,
            date,
            message,
            tag: None,
        }
    }
}

impl<W: Write> Task<W> for Append {
    fn describe(&self) -> &'static str {
        "Append"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        let command = Command::Append {
            mailbox: self.mailbox.clone(),
            flags: self.flags.clone(),
            date: self.date,
            message: std::mem::take(&mut self.message),
        };
        self.tag = Some(cx.conn.submit(
            id,
            CommandKind::Append,
            Some(self.mailbox.clone()),
            &command,
        )?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_state(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        state: &State,
    ) -> Result<Dispatch> {
        if state.tag.is_none() || state.tag != self.tag {
            return Ok(Dispatch::NotMine);
        }
        match state.status {
            Status::Ok => Ok(Dispatch::Completed),
            _ => Ok(Dispatch::Failed(format!(
                "APPEND failed: {}",
                state.information.clone().unwrap_or_default()
            ))),
        }
    }
}
