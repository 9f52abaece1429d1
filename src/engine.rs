//! The task scheduler and response router.
//!
//! Tasks form a dependency DAG; a task's `perform` runs once every
//! prerequisite has completed. Incoming responses are routed here: tagged
//! replies go straight to the task owning the tag (via the connection's tag
//! map), untagged responses are offered to active tasks in insertion order
//! until one claims them. Failure cascades to dependents in reverse
//! insertion order; the engine never retries on its own.

use std::io::Write;

use log::{debug, warn};

use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::types::{Response, Status};

pub(crate) type TaskId = usize;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TaskState {
    /// Waiting for prerequisites.
    Pending,
    /// `perform` has run; commands may be in flight.
    Active,
    Completed,
    Failed,
}

struct TaskSlot<W: Write> {
    task: Option<Box<dyn Task<W>>>,
    state: TaskState,
    blockers: usize,
    dependents: Vec<TaskId>,
    aborted: bool,
}

pub(crate) struct TaskEngine<W: Write> {
    slots: Vec<TaskSlot<W>>,
}

impl<W: Write> TaskEngine<W> {
    pub fn new() -> Self {
        TaskEngine { slots: Vec::new() }
    }

    /// Register a task. It will not run before [`drive`](Self::drive) is
    /// called and its prerequisites (if any) have completed.
    pub fn add(&mut self, task: Box<dyn Task<W>>) -> TaskId {
        self.slots.push(TaskSlot {
            task: Some(task),
            state: TaskState::Pending,
            blockers: 0,
            dependents: Vec::new(),
            aborted: false,
        });
        self.slots.len() - 1
    }

    /// Make `dependent` wait for `prerequisite`. A prerequisite that has
    /// already completed adds nothing; one that has already failed dooms
    /// the dependent immediately.
    pub fn add_dependency(&mut self, dependent: TaskId, prerequisite: TaskId) {
        match self.slots[prerequisite].state {
            TaskState::Completed => {}
            TaskState::Failed => {
                self.fail(dependent, "prerequisite already failed".to_string());
            }
            _ => {
                self.slots[prerequisite].dependents.push(dependent);
                self.slots[dependent].blockers += 1;
            }
        }
    }

    pub fn state(&self, id: TaskId) -> TaskState {
        self.slots[id].state
    }

    /// Whether any task is still pending or has commands in flight.
    pub fn has_live_tasks(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s.state, TaskState::Pending | TaskState::Active))
    }

    /// Abort a task. Before `perform` this is a fast path straight to
    /// failure; afterwards it is best-effort and the task finishes when its
    /// pending tag returns.
    pub fn abort(&mut self, id: TaskId) {
        match self.slots[id].state {
            TaskState::Pending => self.fail(id, "aborted".to_string()),
            TaskState::Active => self.slots[id].aborted = true,
            _ => {}
        }
    }

    /// Run every unblocked pending task until a fixpoint.
    pub fn drive(&mut self, cx: &mut TaskCtx<'_, W>) {
        loop {
            let runnable = self
                .slots
                .iter()
                .position(|s| s.state == TaskState::Pending && s.blockers == 0 && s.task.is_some());
            let id = match runnable {
                Some(id) => id,
                None => break,
            };
            if self.slots[id].aborted {
                self.fail(id, "aborted".to_string());
                continue;
            }
            self.slots[id].state = TaskState::Active;
            let mut task = match self.slots[id].task.take() {
                Some(t) => t,
                None => continue,
            };
            let outcome = task.perform(id, cx);
            let name = task.describe();
            self.slots[id].task = Some(task);
            match outcome {
                Ok(TaskStatus::InProgress) => {}
                Ok(TaskStatus::Completed) => self.complete(id),
                Ok(TaskStatus::Failed(reason)) => self.fail(id, reason),
                Err(e) => {
                    warn!("{} failed to start: {}", name, e);
                    self.fail(id, e.to_string());
                }
            }
        }
    }

    /// Route one typed response, then run anything it unblocked.
    pub fn process_response(&mut self, cx: &mut TaskCtx<'_, W>, response: &Response) {
        match response {
            Response::Continue { .. } => match cx.conn.continue_literal() {
                Ok(true) => {}
                Ok(false) => debug!("continuation request with no literal pending"),
                Err(e) => {
                    let reason = e.to_string();
                    self.connection_lost(cx, &reason);
                }
            },
            Response::State(state) if state.status == Status::Bye => {
                let reason = state
                    .information
                    .clone()
                    .unwrap_or_else(|| "server closed the connection".to_string());
                self.connection_lost(cx, &reason);
            }
            Response::State(state) if state.tag.is_some() => {
                self.dispatch_tagged(cx, response);
            }
            _ => {
                self.dispatch_untagged(cx, response);
            }
        }
        self.drive(cx);
    }

    fn dispatch_tagged(&mut self, cx: &mut TaskCtx<'_, W>, response: &Response) {
        let state = match response {
            Response::State(s) => s,
            _ => return,
        };
        let tag = match state.tag.as_deref() {
            Some(t) => t,
            None => return,
        };
        let owner = match cx.conn.pending(tag) {
            Some(pending) => pending.task,
            None => {
                warn!("tagged response for unknown tag {}", tag);
                return;
            }
        };
        let dispatch = self.offer(cx, owner, |task, id, cx| task.handle_state(id, cx, state));
        // the tag stays mapped until its response has been dispatched
        cx.conn.retire(tag);
        match dispatch {
            Dispatch::NotMine => {
                warn!("task did not claim its own tag {}", tag);
            }
            Dispatch::Handled => {}
            Dispatch::Completed => self.complete(owner),
            Dispatch::Failed(reason) => self.fail(owner, reason),
        }
    }

    fn dispatch_untagged(&mut self, cx: &mut TaskCtx<'_, W>, response: &Response) {
        for id in 0..self.slots.len() {
            if self.slots[id].state != TaskState::Active {
                continue;
            }
            let dispatch = self.offer(cx, id, |task, id, cx| match response {
                Response::State(state) => task.handle_state(id, cx, state),
                Response::Capabilities(caps) => task.handle_capabilities(id, cx, caps),
                Response::List(entry) | Response::Lsub(entry) => task.handle_list(id, cx, entry),
                Response::Search(uids) => task.handle_search(id, cx, uids),
                Response::Fetch(seq, items) => task.handle_fetch(id, cx, *seq, items),
                Response::Exists(n) => task.handle_exists(id, cx, *n),
                Response::Recent(n) => task.handle_recent(id, cx, *n),
                Response::Flags(flags) => task.handle_flags(id, cx, flags),
                _ => Ok(Dispatch::NotMine),
            });
            match dispatch {
                Dispatch::NotMine => continue,
                Dispatch::Handled => return,
                Dispatch::Completed => {
                    self.complete(id);
                    return;
                }
                Dispatch::Failed(reason) => {
                    self.fail(id, reason);
                    return;
                }
            }
        }
        debug!("unclaimed untagged response: {:?}", response);
    }

    /// Let a task look at a response. Handler errors are per-response
    /// errors: logged, and the response is considered consumed.
    fn offer<F>(&mut self, cx: &mut TaskCtx<'_, W>, id: TaskId, f: F) -> Dispatch
    where
        F: FnOnce(&mut dyn Task<W>, TaskId, &mut TaskCtx<'_, W>) -> crate::error::Result<Dispatch>,
    {
        let mut task = match self.slots[id].task.take() {
            Some(t) => t,
            None => return Dispatch::NotMine,
        };
        let outcome = f(task.as_mut(), id, cx);
        let name = task.describe();
        self.slots[id].task = Some(task);
        match outcome {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!("{} dropped a response: {}", name, e);
                Dispatch::Handled
            }
        }
    }

    fn complete(&mut self, id: TaskId) {
        if matches!(
            self.slots[id].state,
            TaskState::Completed | TaskState::Failed
        ) {
            return;
        }
        self.slots[id].state = TaskState::Completed;
        let dependents = std::mem::take(&mut self.slots[id].dependents);
        for dependent in dependents {
            self.slots[dependent].blockers = self.slots[dependent].blockers.saturating_sub(1);
        }
    }

    fn fail(&mut self, id: TaskId, reason: String) {
        if matches!(
            self.slots[id].state,
            TaskState::Completed | TaskState::Failed
        ) {
            return;
        }
        warn!(
            "task {} failed: {}",
            self.slots[id]
                .task
                .as_ref()
                .map(|t| t.describe())
                .unwrap_or("<taken>"),
            reason
        );
        self.slots[id].state = TaskState::Failed;
        let dependents = std::mem::take(&mut self.slots[id].dependents);
        // dependents fail in reverse insertion order
        for dependent in dependents.into_iter().rev() {
            self.fail(dependent, format!("prerequisite failed: {}", reason));
        }
    }

    /// Socket error or server BYE: every task on this connection fails with
    /// the same reason, and the tree is left exactly as it was.
    pub fn connection_lost(&mut self, cx: &mut TaskCtx<'_, W>, reason: &str) {
        cx.conn.state = crate::conn::ConnectionState::Failed;
        for id in 0..self.slots.len() {
            if matches!(
                self.slots[id].state,
                TaskState::Pending | TaskState::Active
            ) {
                self.fail(id, format!("connection lost: {}", reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;

    use crate::cache::MemoryCache;
    use crate::conn::Connection;
    use crate::mock_stream::MockStream;
    use crate::model::EventSender;
    use crate::tree::Tree;

    /// Records when it ran; optionally fails, optionally never finishes.
    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        outcome: fn() -> TaskStatus,
    }

    impl Task<MockStream> for Probe {
        fn describe(&self) -> &'static str {
            self.name
        }

        fn perform(
            &mut self,
            _id: TaskId,
            _cx: &mut TaskCtx<'_, MockStream>,
        ) -> crate::error::Result<TaskStatus> {
            self.log.borrow_mut().push(self.name);
            Ok((self.outcome)())
        }
    }

    struct Harness {
        tree: Tree,
        conn: Connection<MockStream>,
        cache: MemoryCache,
        events: EventSender,
    }

    impl Harness {
        fn new() -> Harness {
            let (tx, _rx) = mpsc::channel();
            Harness {
                tree: Tree::new(),
                conn: Connection::new(MockStream::new(Vec::new())),
                cache: MemoryCache::new(),
                events: EventSender::new(tx),
            }
        }

        fn cx(&mut self) -> TaskCtx<'_, MockStream> {
            TaskCtx {
                tree: &mut self.tree,
                conn: &mut self.conn,
                cache: &mut self.cache,
                events: &self.events,
            }
        }
    }

    fn probe(
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
        outcome: fn() -> TaskStatus,
    ) -> Box<Probe> {
        Box::new(Probe {
            name,
            log: Rc::clone(log),
            outcome,
        })
    }

    #[test]
    fn dependents_wait_for_prerequisites() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut harness = Harness::new();
        let mut engine: TaskEngine<MockStream> = TaskEngine::new();

        let slow = engine.add(probe(&log, "slow", || TaskStatus::InProgress));
        let dependent = engine.add(probe(&log, "dependent", || TaskStatus::Completed));
        engine.add_dependency(dependent, slow);
        engine.drive(&mut harness.cx());
        assert_eq!(*log.borrow(), vec!["slow"]);
        assert_eq!(engine.state(dependent), TaskState::Pending);

        // dependency on an already-completed task is a no-op
        let instant = engine.add(probe(&log, "instant", || TaskStatus::Completed));
        engine.drive(&mut harness.cx());
        let late = engine.add(probe(&log, "late", || TaskStatus::Completed));
        engine.add_dependency(late, instant);
        engine.drive(&mut harness.cx());
        assert_eq!(engine.state(late), TaskState::Completed);
    }

    #[test]
    fn failure_cascades_to_dependents() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut harness = Harness::new();
        let mut engine: TaskEngine<MockStream> = TaskEngine::new();

        let doomed = engine.add(probe(&log, "doomed", || {
            TaskStatus::Failed("boom".to_string())
        }));
        let first = engine.add(probe(&log, "first", || TaskStatus::Completed));
        let second = engine.add(probe(&log, "second", || TaskStatus::Completed));
        engine.add_dependency(first, doomed);
        engine.add_dependency(second, doomed);
        engine.drive(&mut harness.cx());

        assert_eq!(*log.borrow(), vec!["doomed"]);
        assert_eq!(engine.state(first), TaskState::Failed);
        assert_eq!(engine.state(second), TaskState::Failed);
        assert!(!engine.has_live_tasks());
    }

    #[test]
    fn abort_before_perform_is_a_fast_failure() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut harness = Harness::new();
        let mut engine: TaskEngine<MockStream> = TaskEngine::new();

        let blocker = engine.add(probe(&log, "blocker", || TaskStatus::InProgress));
        let blocked = engine.add(probe(&log, "blocked", || TaskStatus::Completed));
        engine.add_dependency(blocked, blocker);
        engine.drive(&mut harness.cx());

        engine.abort(blocked);
        assert_eq!(engine.state(blocked), TaskState::Failed);
        // the aborted task never ran
        assert_eq!(*log.borrow(), vec!["blocker"]);
    }
}
