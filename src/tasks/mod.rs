//! The task contract: a unit of asynchronous work that may depend on other
//! tasks, issues tagged commands once its prerequisites are done, and is
//! offered incoming responses until it completes.
//!
//! Tasks never run concurrently; the engine takes a task out of its slot,
//! lets it mutate the tree/connection/cache through [`TaskCtx`], and puts it
//! back. Everything between two suspension points is run-to-completion.

use std::io::Write;

use crate::cache::Cache;
use crate::conn::Connection;
use crate::engine::TaskId;
use crate::error::Result;
use crate::model::EventSender;
use crate::tree::Tree;
use crate::types::{FetchItem, Flag, ListEntry, Seq, State, Uid};

mod connect;
pub(crate) use self::connect::{CreateConnection, GetAnyConnection};

mod mailbox;
pub(crate) use self::mailbox::{CreateMailbox, ListChildMailboxes};

mod select;
pub(crate) use self::select::{SelectMailbox, SyncMessageList};

mod fetch;
pub(crate) use self::fetch::{FetchMessageMetadata, FetchMessagePart};

mod append;
pub(crate) use self::append::Append;

mod store;
pub(crate) use self::store::StoreFlags;

/// Everything a task may touch while it runs.
pub(crate) struct TaskCtx<'a, W: Write> {
    pub tree: &'a mut Tree,
    pub conn: &'a mut Connection<W>,
    pub cache: &'a mut dyn Cache,
    pub events: &'a EventSender,
}

/// What `perform` reports back to the engine.
#[derive(Debug)]
pub(crate) enum TaskStatus {
    /// Commands are in flight; keep offering responses.
    InProgress,
    /// All done; release dependents.
    Completed,
    /// Terminal failure; cascades to dependents.
    Failed(String),
}

/// What a response handler reports back to the router.
#[derive(Debug)]
pub(crate) enum Dispatch {
    /// The response does not concern this task; offer it to the next one.
    NotMine,
    /// Claimed; the task keeps running.
    Handled,
    /// Claimed, and it was the last thing the task was waiting for.
    Completed,
    /// Claimed, and it dooms the task.
    Failed(String),
}

/// A long-running operation multiplexed over the connection.
///
/// `perform` is called exactly once, after every prerequisite has completed
/// successfully. Each `handle_*` method is offered the corresponding
/// untagged response kind; `handle_state` additionally receives tagged
/// replies for tags this task owns. Handlers return
/// [`Dispatch::NotMine`] to pass a response along.
pub(crate) trait Task<W: Write> {
    /// Short name for logging.
    fn describe(&self) -> &'static str;

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus>;

    fn handle_state(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _state: &State,
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_capabilities(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _capabilities: &[String],
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_list(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _entry: &ListEntry,
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_search(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _uids: &[Uid],
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_fetch(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _seq: Seq,
        _items: &[FetchItem],
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_exists(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _count: u32,
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_recent(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _count: u32,
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }

    fn handle_flags(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        _flags: &[Flag],
    ) -> Result<Dispatch> {
        Ok(Dispatch::NotMine)
    }
}
