//! Translation between IMAP body-part addressing and tree nodes.
//!
//! IMAP numbers parts 1-based and dot-separated (`1.2.3`), with
//! `HEADER`/`TEXT`/`MIME` pseudo-parts; top-level multiparts are purely
//! structural and contribute no segment of their own. The rendering
//! collaborator additionally addresses parts with slash-separated URL paths
//! and RFC 2392 `cid:` references.

use crate::error::{Error, Result};
use crate::tree::{NodeId, SpecialPart, Tree};

/// Resolve a server-side part id (`1.2`, `2.MIME`, ...) against a message.
///
/// Descends transparently through a top-level multipart: its child 0 is the
/// real first sub-part. A trailing keyword selects the pseudo-child of the
/// last part.
pub fn resolve_part_id(tree: &Tree, message: NodeId, id: &str) -> Result<NodeId> {
    let mut item = message;
    let mut segments = id.split('.').peekable();
    while let Some(segment) = segments.next() {
        if let Some(kind) = SpecialPart::from_keyword(segment) {
            if segments.peek().is_some() {
                return Err(Error::UnknownMessageIndex(format!(
                    "trailing data after {} in part id {}",
                    segment, id
                )));
            }
            return tree.special_child(item, kind).ok_or_else(|| {
                Error::UnknownMessageIndex(format!("no {} pseudo-part in {}", segment, id))
            });
        }
        let number: u32 = segment.parse().map_err(|_| {
            Error::UnknownMessageIndex(format!(
                "can't translate received offset of the message part to a number: {}",
                id
            ))
        })?;
        if number == 0 {
            return Err(Error::UnknownMessageIndex(format!(
                "part offsets are 1-based: {}",
                id
            )));
        }
        if let Some(first) = tree.child(item, 0) {
            if tree.is_top_level_multipart(first) {
                item = first;
            }
        }
        item = tree.child(item, number as usize - 1).ok_or_else(|| {
            Error::UnknownMessageIndex(format!(
                "offset of the message part not found: {} of {}",
                number, id
            ))
        })?;
    }
    if tree.get(item).and_then(|n| n.as_part()).is_none() {
        return Err(Error::UnknownMessageIndex(format!(
            "offset of the message part doesn't point anywhere: {}",
            id
        )));
    }
    Ok(item)
}

/// Resolve the URL-style slash-separated form used by the rendering
/// collaborator: 1-based child indices, optionally ending in a
/// `HEADER`/`TEXT`/`MIME` keyword.
pub fn resolve_path(tree: &Tree, message: NodeId, path: &str) -> Result<NodeId> {
    let mut item = message;
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    if segments.peek().is_none() {
        return Err(Error::UnknownMessageIndex(format!("bogus part path: {:?}", path)));
    }
    while let Some(segment) = segments.next() {
        if let Some(kind) = SpecialPart::from_keyword(segment) {
            if segments.peek().is_some() {
                return Err(Error::UnknownMessageIndex(format!(
                    "trailing data after {} in part path {}",
                    segment, path
                )));
            }
            return tree.special_child(item, kind).ok_or_else(|| {
                Error::UnknownMessageIndex(format!("no {} pseudo-part in {}", segment, path))
            });
        }
        let number: usize = segment.parse().map_err(|_| {
            Error::UnknownMessageIndex(format!("non-numeric path segment in {}", path))
        })?;
        item = number
            .checked_sub(1)
            .and_then(|index| tree.child(item, index))
            .ok_or_else(|| {
                Error::UnknownMessageIndex(format!("path offset {} not found in {}", number, path))
            })?;
    }
    if tree.get(item).and_then(|n| n.as_part()).is_none() {
        return Err(Error::UnknownMessageIndex(format!(
            "part path doesn't name a part: {}",
            path
        )));
    }
    Ok(item)
}

/// The inverse of [`resolve_part_id`]: the server-side id of a part.
///
/// Walks up to the message, joining 1-based rows with dots. Top-level
/// multiparts contribute nothing, inheriting their parent's id (the empty
/// string when the parent is the message itself).
pub fn part_id(tree: &Tree, part: NodeId) -> Result<String> {
    let node = tree
        .get(part)
        .ok_or_else(|| Error::UnknownMessageIndex("stale part handle".into()))?;
    let data = node
        .as_part()
        .ok_or_else(|| Error::UnknownMessageIndex("node is not a body part".into()))?;

    if let Some(kind) = data.special {
        let parent = node
            .parent
            .ok_or_else(|| Error::UnknownMessageIndex("pseudo-part without parent".into()))?;
        let base = part_id(tree, parent)?;
        return Ok(if base.is_empty() {
            kind.keyword().to_string()
        } else {
            format!("{}.{}", base, kind.keyword())
        });
    }

    let parent = node
        .parent
        .ok_or_else(|| Error::UnknownMessageIndex("part without parent".into()))?;

    if tree.is_top_level_multipart(part) {
        return match tree.get(parent).map(|n| n.as_part()) {
            Some(Some(_)) => part_id(tree, parent),
            _ => Ok(String::new()),
        };
    }

    let row = tree.row_in_parent(part) + 1;
    match tree.get(parent) {
        Some(p) if p.as_message().is_some() => Ok(row.to_string()),
        Some(p) if p.as_part().is_some() => {
            let parent_id = part_id(tree, parent)?;
            if parent_id.is_empty() {
                Ok(row.to_string())
            } else {
                Ok(format!("{}.{}", parent_id, row))
            }
        }
        _ => Err(Error::UnknownMessageIndex(
            "part parent is neither message nor part".into(),
        )),
    }
}

/// Depth-first search for the part whose `Content-ID` matches `cid`.
/// Surrounding angle brackets on the requested id are ignored, per RFC
/// 2392.
pub fn resolve_cid(tree: &Tree, message: NodeId, cid: &str) -> Option<NodeId> {
    let want = cid.trim_matches(|c| c == '<' || c == '>');
    if want.is_empty() {
        return None;
    }
    fn dfs(tree: &Tree, node: NodeId, want: &str) -> Option<NodeId> {
        for child in tree.children(node) {
            if let Some(part) = tree.get(*child).and_then(|n| n.as_part()) {
                if part.body_fld_id.as_deref() == Some(want) {
                    return Some(*child);
                }
            }
            if let Some(found) = dfs(tree, *child, want) {
                return Some(found);
            }
        }
        None
    }
    dfs(tree, message, want)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use crate::types::{BodyFields, BodyStructure};

    fn message_with(tree: &mut Tree, structure: &BodyStructure) -> NodeId {
        let root = tree.root();
        let inbox = tree.alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = tree.child(inbox, 0).unwrap();
        let message = tree.alloc_message(list, Some(1));
        tree.set_children(list, vec![message]);
        let parts = tree.build_message_parts(message, structure);
        tree.set_children(message, parts);
        message
    }

    fn nested_structure() -> BodyStructure {
        BodyStructure::Multipart {
            subtype: "mixed".into(),
            parts: vec![
                BodyStructure::Basic(BodyFields::new("text/plain", "7bit")),
                BodyStructure::Multipart {
                    subtype: "related".into(),
                    parts: vec![
                        BodyStructure::Basic(BodyFields::new("text/html", "quoted-printable")),
                        BodyStructure::Basic(BodyFields::with_id(
                            "image/png",
                            "base64",
                            "<logo@example.org>",
                        )),
                    ],
                },
            ],
        }
    }

    #[test]
    fn resolves_through_top_level_multipart() {
        let mut tree = Tree::new();
        let message = message_with(&mut tree, &nested_structure());

        let first = resolve_part_id(&tree, message, "1").unwrap();
        assert_eq!(
            tree.get(first).unwrap().as_part().unwrap().mime_type,
            "text/plain"
        );
        let html = resolve_part_id(&tree, message, "2.1").unwrap();
        assert_eq!(
            tree.get(html).unwrap().as_part().unwrap().mime_type,
            "text/html"
        );
        let png = resolve_part_id(&tree, message, "2.2").unwrap();
        assert_eq!(
            tree.get(png).unwrap().as_part().unwrap().mime_type,
            "image/png"
        );
    }

    #[test]
    fn part_id_round_trips() {
        let mut tree = Tree::new();
        let message = message_with(&mut tree, &nested_structure());
        for id in &["1", "2.1", "2.2", "1.MIME", "2.1.HEADER", "2.2.TEXT"] {
            let node = resolve_part_id(&tree, message, id).unwrap();
            assert_eq!(part_id(&tree, node).unwrap(), *id, "round-trip of {}", id);
        }
    }

    #[test]
    fn top_level_multipart_inherits_empty_id() {
        let mut tree = Tree::new();
        let message = message_with(&mut tree, &nested_structure());
        let container = tree.child(message, 0).unwrap();
        assert!(tree.is_top_level_multipart(container));
        assert_eq!(part_id(&tree, container).unwrap(), "");
        // nested multipart/related is a regular part with its own segment
        let related = tree.child(container, 1).unwrap();
        assert!(!tree.is_top_level_multipart(related));
        assert_eq!(part_id(&tree, related).unwrap(), "2");
    }

    #[test]
    fn rejects_bad_ids() {
        let mut tree = Tree::new();
        let message = message_with(&mut tree, &nested_structure());
        for bad in &["0", "7", "2.9", "x", "1.BOGUS", "MIME.1"] {
            assert!(
                resolve_part_id(&tree, message, bad).is_err(),
                "{} should not resolve",
                bad
            );
        }
    }

    #[test]
    fn single_part_message_resolves_without_descent() {
        let mut tree = Tree::new();
        let message = message_with(
            &mut tree,
            &BodyStructure::Basic(BodyFields::new("text/plain", "7bit")),
        );
        let part = resolve_part_id(&tree, message, "1").unwrap();
        assert_eq!(part_id(&tree, part).unwrap(), "1");
    }

    #[test]
    fn path_resolution_uses_one_based_rows() {
        let mut tree = Tree::new();
        let message = message_with(&mut tree, &nested_structure());
        // /1 is the structural container, /1/2/1 the html part inside it
        let container = resolve_path(&tree, message, "/1").unwrap();
        assert!(tree.is_top_level_multipart(container));
        let html = resolve_path(&tree, message, "/1/2/1").unwrap();
        assert_eq!(
            tree.get(html).unwrap().as_part().unwrap().mime_type,
            "text/html"
        );
        let header = resolve_path(&tree, message, "/1/1/HEADER").unwrap();
        assert!(tree.get(header).unwrap().as_part().unwrap().special.is_some());
        assert!(resolve_path(&tree, message, "").is_err());
        assert!(resolve_path(&tree, message, "/9").is_err());
    }

    #[test]
    fn cid_lookup_ignores_angle_brackets() {
        let mut tree = Tree::new();
        let message = message_with(&mut tree, &nested_structure());
        let png = resolve_cid(&tree, message, "<logo@example.org>").unwrap();
        assert_eq!(
            tree.get(png).unwrap().as_part().unwrap().mime_type,
            "image/png"
        );
        assert_eq!(resolve_cid(&tree, message, "logo@example.org"), Some(png));
        assert_eq!(resolve_cid(&tree, message, "missing@example.org"), None);
        // the stored id round-trips through the lookup
        let stored = tree
            .get(png)
            .unwrap()
            .as_part()
            .unwrap()
            .body_fld_id
            .clone()
            .unwrap();
        assert_eq!(resolve_cid(&tree, message, &stored), Some(png));
    }
}
