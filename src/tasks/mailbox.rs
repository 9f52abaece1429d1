//! Mailbox discovery and creation.

use std::io::Write;

use log::warn;

use crate::cache::MailboxMetadata;
use crate::command::Command;
use crate::conn::CommandKind;
use crate::engine::TaskId;
use crate::error::Result;
use crate::model::Event;
use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::tree::{FetchStatus, NodeId, Tree};
use crate::types::{ListEntry, State, Status};

/// The direct children of `parent` in a listing: entries exactly one level
/// down, plus synthesized placeholders for levels the server skipped (a
/// `LIST "" *` may report `foo/bar` without ever mentioning `foo`).
fn child_entries(parent: &str, entries: &[ListEntry]) -> Vec<ListEntry> {
    let mut out: Vec<ListEntry> = Vec::new();
    let upsert = |out: &mut Vec<ListEntry>, entry: ListEntry| {
        match out.iter().position(|e| e.name == entry.name) {
            // a real entry wins over a synthesized placeholder
            Some(at) => out[at] = entry,
            None => out.push(entry),
        }
    };
    for entry in entries {
        if entry.name == parent {
            continue;
        }
        let (sep, remainder) = match entry.delimiter {
            Some(sep) => {
                if parent.is_empty() {
                    (sep, &entry.name[..])
                } else if entry.name.starts_with(parent)
                    && entry.name[parent.len()..].starts_with(sep)
                {
                    (sep, &entry.name[parent.len() + sep.len_utf8()..])
                } else {
                    continue;
                }
            }
            None => {
                if parent.is_empty() {
                    upsert(&mut out, entry.clone());
                }
                continue;
            }
        };
        match remainder.find(sep) {
            None => upsert(&mut out, entry.clone()),
            Some(at) => {
                let name = if parent.is_empty() {
                    remainder[..at].to_string()
                } else {
                    format!("{}{}{}", parent, sep, &remainder[..at])
                };
                if !out.iter().any(|e| e.name == name) {
                    out.push(ListEntry {
                        attributes: Vec::new(),
                        delimiter: Some(sep),
                        name,
                    });
                }
            }
        }
    }
    out
}

fn metadata_of(entry: &ListEntry) -> MailboxMetadata {
    MailboxMetadata {
        name: entry.name.clone(),
        separator: entry.delimiter,
        flags: entry.attributes.iter().map(|a| a.to_string()).collect(),
    }
}

/// Populate the sub-mailboxes of one mailbox (or of the root) with
/// `LIST "" parent<sep>*`, write the listing through the cache, and replace
/// the parent's children.
pub(crate) struct ListChildMailboxes {
    parent: NodeId,
    tag: Option<String>,
    entries: Vec<ListEntry>,
}

impl ListChildMailboxes {
    pub fn new(parent: NodeId) -> Self {
        ListChildMailboxes {
            parent,
            tag: None,
            entries: Vec::new(),
        }
    }

    fn parent_name(&self, tree: &Tree) -> Option<(String, Option<char>)> {
        tree.get(self.parent)
            .and_then(|n| n.as_mailbox())
            .map(|m| (m.name.clone(), m.separator))
    }

    /// Attach the collected listing below `parent_node`, one level at a
    /// time. The `*` wildcard reported every descendant, so each level's
    /// child set is complete and the mailboxes transition to `Done`.
    fn attach<W: Write>(&self, cx: &mut TaskCtx<'_, W>, parent_node: NodeId, parent_name: &str) {
        let children = child_entries(parent_name, &self.entries);
        cx.cache
            .set_child_mailboxes(parent_name, children.iter().map(metadata_of).collect());
        let nodes: Vec<NodeId> = children
            .iter()
            .map(|entry| {
                cx.tree.alloc_mailbox(
                    Some(parent_node),
                    entry.name.clone(),
                    entry.delimiter,
                    entry.attributes.clone(),
                )
            })
            .collect();
        let evicted = cx.tree.set_children(parent_node, nodes.clone());
        for old in evicted {
            cx.tree.free(old);
        }
        for (node, entry) in nodes.iter().zip(&children) {
            self.attach(cx, *node, &entry.name);
        }
    }
}

impl<W: Write> Task<W> for ListChildMailboxes {
    fn describe(&self) -> &'static str {
        "ListChildMailboxes"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        let (name, separator) = match self.parent_name(cx.tree) {
            Some(p) => p,
            None => return Ok(TaskStatus::Failed("mailbox is gone".to_string())),
        };
        let pattern = if name.is_empty() {
            "*".to_string()
        } else {
            match separator {
                Some(sep) => format!("{}{}*", name, sep),
                None => {
                    // a flat name cannot have children
                    cx.tree.set_status(self.parent, FetchStatus::Done);
                    return Ok(TaskStatus::Completed);
                }
            }
        };
        let command = Command::List {
            reference: String::new(),
            pattern,
        };
        self.tag = Some(cx.conn.submit(id, CommandKind::List, Some(name), &command)?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_list(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        entry: &ListEntry,
    ) -> Result<Dispatch> {
        let (name, _) = match self.parent_name(cx.tree) {
            Some(p) => p,
            None => return Ok(Dispatch::NotMine),
        };
        if !name.is_empty() && !entry.name.starts_with(&name) {
            return Ok(Dispatch::NotMine);
        }
        self.entries.push(entry.clone());
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
            return Ok(Dispatch::Failed(format!(
                "LIST failed: {}",
                state.information.clone().unwrap_or_default()
            )));
        }
        let (name, _) = match self.parent_name(cx.tree) {
            Some(p) => p,
            None => return Ok(Dispatch::Failed("mailbox is gone".to_string())),
        };
        self.attach(cx, self.parent, &name);
        cx.events.emit(Event::DataChanged(self.parent));
        Ok(Dispatch::Completed)
    }
}

/// `CREATE` a mailbox, then `LIST "" name` and merge the result into the
/// tree so the new mailbox appears without a full rescan.
pub(crate) struct CreateMailbox {
    mailbox: String,
    tag_create: Option<String>,
    tag_list: Option<String>,
    entries: Vec<ListEntry>,
}

impl CreateMailbox {
    pub fn new(mailbox: String) -> Self {
        CreateMailbox {
            mailbox,
            tag_create: None,
            tag_list: None,
            entries: Vec::new(),
        }
    }

    fn merge_into_tree<W: Write>(&self, cx: &mut TaskCtx<'_, W>) {
        for entry in &self.entries {
            let parent_name = match entry.delimiter {
                Some(sep) => entry
                    .name
                    .rfind(sep)
                    .map(|at| entry.name[..at].to_string())
                    .unwrap_or_default(),
                None => String::new(),
            };
            let parent = match cx.tree.find_mailbox(&parent_name) {
                Some(p) => p,
                None => continue,
            };
            if cx.tree.status(parent) != FetchStatus::Done {
                // not listed yet; the next LIST will pick the mailbox up
                continue;
            }
            let already_there = cx.tree.children(parent).iter().skip(1).any(|c| {
                cx.tree
                    .get(*c)
                    .and_then(|n| n.as_mailbox())
                    .map(|m| m.name == entry.name)
                    .unwrap_or(false)
            });
            if already_there {
                continue;
            }
            let node = cx.tree.alloc_mailbox(
                Some(parent),
                entry.name.clone(),
                entry.delimiter,
                entry.attributes.clone(),
            );
            cx.tree.append_child(parent, node);
            let mut cached = cx.cache.child_mailboxes(&parent_name).unwrap_or_default();
            cached.push(metadata_of(entry));
            cx.cache.set_child_mailboxes(&parent_name, cached);
            cx.events.emit(Event::DataChanged(parent));
        }
    }
}

impl<W: Write> Task<W> for CreateMailbox {
    fn describe(&self) -> &'static str {
        "CreateMailbox"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        let command = Command::Create {
            mailbox: self.mailbox.clone(),
        };
        self.tag_create = Some(cx.conn.submit(
            id,
            CommandKind::Create,
            Some(self.mailbox.clone()),
            &command,
        )?);
        Ok(TaskStatus::InProgress)
    }

    fn handle_list(
        &mut self,
        _id: TaskId,
        _cx: &mut TaskCtx<'_, W>,
        entry: &ListEntry,
    ) -> Result<Dispatch> {
        if self.tag_list.is_none() || entry.name != self.mailbox {
            return Ok(Dispatch::NotMine);
        }
        self.entries.push(entry.clone());
        Ok(Dispatch::Handled)
    }

    fn handle_state(
        &mut self,
        id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        state: &State,
    ) -> Result<Dispatch> {
        let text = || state.information.clone().unwrap_or_default();
        if state.tag.is_some() && state.tag == self.tag_create {
            return match state.status {
                Status::Ok => {
                    cx.events
                        .emit(Event::MailboxCreationSucceeded(self.mailbox.clone()));
                    let command = Command::List {
                        reference: String::new(),
                        pattern: self.mailbox.clone(),
                    };
                    self.tag_list = Some(cx.conn.submit(
                        id,
                        CommandKind::ListAfterCreate,
                        Some(self.mailbox.clone()),
                        &command,
                    )?);
                    Ok(Dispatch::Handled)
                }
                _ => {
                    let reason = text();
                    cx.events.emit(Event::MailboxCreationFailed(
                        self.mailbox.clone(),
                        reason.clone(),
                    ));
                    Ok(Dispatch::Failed(reason))
                }
            };
        }
        if state.tag.is_some() && state.tag == self.tag_list {
            if state.status == Status::Ok {
                self.merge_into_tree(cx);
            } else {
                // the mailbox exists; only the incremental listing is lost
                warn!("LIST after CREATE failed: {}", text());
            }
            return Ok(Dispatch::Completed);
        }
        Ok(Dispatch::NotMine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, sep: char) -> ListEntry {
        ListEntry::new(name, Some(sep), Vec::<&str>::new())
    }

    fn names(entries: &[ListEntry]) -> Vec<String> {
        entries.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn child_entries_filters_depth() {
        let entries = vec![
            entry("a", '/'),
            entry("a/b", '/'),
            entry("a/b/c", '/'),
            entry("ab", '/'),
        ];
        assert_eq!(names(&child_entries("", &entries)), vec!["a", "ab"]);
        assert_eq!(names(&child_entries("a", &entries)), vec!["a/b"]);
        assert_eq!(names(&child_entries("a/b", &entries)), vec!["a/b/c"]);
    }

    #[test]
    fn child_entries_synthesizes_missing_levels() {
        // the server never mentioned "foo" itself
        let entries = vec![ListEntry::new("foo/bar", Some('/'), vec!["\\Noselect"])];
        let of_root = child_entries("", &entries);
        assert_eq!(names(&of_root), vec!["foo"]);
        assert!(of_root[0].attributes.is_empty());
        let of_foo = child_entries("foo", &entries);
        assert_eq!(names(&of_foo), vec!["foo/bar"]);
        assert!(of_foo[0].is_no_select());
    }

    #[test]
    fn real_entry_replaces_placeholder() {
        let entries = vec![
            entry("a/b", '/'),
            ListEntry::new("a", Some('/'), vec!["\\HasChildren"]),
        ];
        let of_root = child_entries("", &entries);
        assert_eq!(names(&of_root), vec!["a"]);
        assert!(!of_root[0].attributes.is_empty());
    }
}
