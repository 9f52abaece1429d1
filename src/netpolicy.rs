//! The externals gate: decides what a rendered message body may load.
//!
//! HTML bodies reference sibling parts (`cid:`, and the internal
//! `trojita-imap://msg/` scheme the part widgets use) and arbitrary
//! internet resources. Part references are served straight from the tree;
//! internet fetches are only allowed once the user opted in, and anything
//! else is refused outright.

use std::io::Write;

use log::debug;
use url::Url;

use crate::addressing;
use crate::model::{Event, Model};
use crate::tree::NodeId;

/// What the gate decided about one URL.
#[derive(Clone, Debug, PartialEq)]
pub enum UrlReply {
    /// A body part resolved in the tree; bytes may still be empty while
    /// the part is being fetched, in which case a change notification for
    /// the part will follow.
    Part {
        mime_type: String,
        data: Vec<u8>,
    },
    /// An external resource the policy allows; the caller proxies it over
    /// its own transport.
    Proxy,
    /// Refused: unresolvable part, blocked external, or a scheme we do not
    /// serve.
    Forbidden,
}

impl<W: Write> Model<W> {
    /// Serve a URL referenced from the given message's rendered content.
    pub fn serve_url(&mut self, message: NodeId, url: &str) -> UrlReply {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                debug!("unparsable content URL {}: {}", url, e);
                return UrlReply::Forbidden;
            }
        };
        match parsed.scheme() {
            "trojita-imap" => {
                if parsed.host_str() != Some("msg") {
                    debug!("no such part: {}", url);
                    return UrlReply::Forbidden;
                }
                match addressing::resolve_path(self.tree(), message, parsed.path()) {
                    Ok(part) => self.reply_with_part(part),
                    Err(_) => {
                        debug!("no such part: {}", url);
                        UrlReply::Forbidden
                    }
                }
            }
            "cid" => {
                let cid = parsed.path();
                match addressing::resolve_cid(self.tree(), message, cid) {
                    Some(part) => self.reply_with_part(part),
                    None => {
                        debug!("Content-ID not found: {}", cid);
                        UrlReply::Forbidden
                    }
                }
            }
            "http" | "https" | "ftp" => {
                if self.externals_enabled() {
                    UrlReply::Proxy
                } else {
                    self.events
                        .emit(Event::RequestingExternal(url.to_string()));
                    UrlReply::Forbidden
                }
            }
            other => {
                debug!("forbidden per policy: {} ({})", url, other);
                UrlReply::Forbidden
            }
        }
    }

    fn reply_with_part(&mut self, part: NodeId) -> UrlReply {
        let mime_type = self
            .tree
            .get(part)
            .and_then(|n| n.as_part())
            .map(|p| p.mime_type.clone())
            .unwrap_or_default();
        // kick off the fetch if the bytes are not here yet
        let data = self.part_bytes(part).unwrap_or_default();
        UrlReply::Part { mime_type, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::model::Credentials;
    use crate::mock_stream::MockStream;
    use crate::tree::FetchStatus;
    use crate::types::{BodyFields, BodyStructure};

    fn model_with_message() -> (Model<MockStream>, std::sync::mpsc::Receiver<Event>, NodeId) {
        let (mut model, rx) = Model::new(
            MockStream::new(Vec::new()),
            Credentials {
                username: "u".to_string(),
                password: "p".to_string(),
            },
            Box::new(MemoryCache::new()),
        );
        let root = model.root();
        let inbox = model
            .tree
            .alloc_mailbox(Some(root), "INBOX".into(), Some('/'), vec![]);
        let list = model.tree.child(inbox, 0).unwrap();
        let message = model.tree.alloc_message(list, Some(1));
        model.tree.set_children(list, vec![message]);
        let structure = BodyStructure::Multipart {
            subtype: "related".into(),
            parts: vec![
                BodyStructure::Basic(BodyFields::new("text/html", "7bit")),
                BodyStructure::Basic(BodyFields::with_id("image/png", "base64", "<b@x>")),
            ],
        };
        let parts = model.tree.build_message_parts(message, &structure);
        model.tree.set_children(message, parts);
        (model, rx, message)
    }

    fn preload(model: &mut Model<MockStream>, message: NodeId, id: &str, bytes: &[u8]) {
        let part = addressing::resolve_part_id(&model.tree, message, id).unwrap();
        if let Some(crate::tree::Payload::Part(p)) =
            model.tree.get_mut(part).map(|n| &mut n.payload)
        {
            p.data = Some(bytes.to_vec());
        }
        model.tree.set_status(part, FetchStatus::Done);
    }

    #[test]
    fn cid_resolution_serves_the_matching_part() {
        let (mut model, _rx, message) = model_with_message();
        preload(&mut model, message, "2", b"png bytes");
        match model.serve_url(message, "cid:b@x") {
            UrlReply::Part { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, b"png bytes");
            }
            other => panic!("expected part, got {:?}", other),
        }
        assert_eq!(
            model.serve_url(message, "cid:missing@x"),
            UrlReply::Forbidden
        );
    }

    #[test]
    fn internal_scheme_resolves_paths() {
        let (mut model, _rx, message) = model_with_message();
        preload(&mut model, message, "1", b"<html/>");
        match model.serve_url(message, "trojita-imap://msg/1/1") {
            UrlReply::Part { mime_type, data } => {
                assert_eq!(mime_type, "text/html");
                assert_eq!(data, b"<html/>");
            }
            other => panic!("expected part, got {:?}", other),
        }
        assert_eq!(
            model.serve_url(message, "trojita-imap://msg/9"),
            UrlReply::Forbidden
        );
        assert_eq!(
            model.serve_url(message, "trojita-imap://elsewhere/1"),
            UrlReply::Forbidden
        );
    }

    #[test]
    fn externals_are_gated() {
        let (mut model, rx, message) = model_with_message();
        assert_eq!(
            model.serve_url(message, "http://example.org/x.png"),
            UrlReply::Forbidden
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::RequestingExternal("http://example.org/x.png".to_string())
        );
        model.set_externals_enabled(true);
        assert_eq!(
            model.serve_url(message, "http://example.org/x.png"),
            UrlReply::Proxy
        );
        assert_eq!(
            model.serve_url(message, "ftp://example.org/x"),
            UrlReply::Proxy
        );
    }

    #[test]
    fn unknown_schemes_are_forbidden() {
        let (mut model, _rx, message) = model_with_message();
        assert_eq!(
            model.serve_url(message, "file:///etc/passwd"),
            UrlReply::Forbidden
        );
        assert_eq!(model.serve_url(message, "not a url"), UrlReply::Forbidden);
    }
}
