//! Typed form of the `BODYSTRUCTURE` fetch item: a server-provided tree
//! describing the MIME composition of a message without its bytes.

/// The basic fields every non-multipart body part carries, per [RFC 3501
/// section 7.4.2](https://tools.ietf.org/html/rfc3501#section-7.4.2).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BodyFields {
    /// `type/subtype`, e.g. `text/plain`. Stored as received; the tree
    /// lowercases it when a part node is built.
    pub media_type: String,
    /// The `charset` body parameter, if present.
    pub charset: Option<String>,
    /// The body id (`Content-ID`), with angle brackets, as on the wire.
    pub id: Option<String>,
    /// The content transfer encoding, e.g. `quoted-printable`. Empty means
    /// `7bit`.
    pub transfer_encoding: String,
    /// Size of the encoded body in octets.
    pub octets: u32,
}

impl BodyFields {
    /// Convenience constructor used heavily by tests.
    pub fn new<S: ToString>(media_type: S, transfer_encoding: S) -> Self {
        BodyFields {
            media_type: media_type.to_string(),
            transfer_encoding: transfer_encoding.to_string(),
            ..BodyFields::default()
        }
    }

    /// Same, with a `Content-ID` attached.
    pub fn with_id<S: ToString>(media_type: S, transfer_encoding: S, id: S) -> Self {
        BodyFields {
            id: Some(id.to_string()),
            ..BodyFields::new(media_type, transfer_encoding)
        }
    }
}

/// A parsed `BODYSTRUCTURE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BodyStructure {
    /// A leaf part: `text/*`, `image/*`, `application/*`, ...
    Basic(BodyFields),
    /// A `message/rfc822` part wrapping a complete message.
    Message {
        fields: BodyFields,
        body: Box<BodyStructure>,
    },
    /// A `multipart/*` container.
    Multipart {
        /// The subtype, e.g. `mixed`, `alternative`, `related`.
        subtype: String,
        parts: Vec<BodyStructure>,
    },
}

impl BodyStructure {
    /// Number of leaf (non-container) parts in this structure.
    pub fn leaf_count(&self) -> usize {
        match self {
            BodyStructure::Basic(_) => 1,
            BodyStructure::Message { body, .. } => body.leaf_count(),
            BodyStructure::Multipart { parts, .. } => parts.iter().map(|p| p.leaf_count()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_count_walks_containers() {
        let bs = BodyStructure::Multipart {
            subtype: "mixed".to_string(),
            parts: vec![
                BodyStructure::Basic(BodyFields::new("text/plain", "7bit")),
                BodyStructure::Message {
                    fields: BodyFields::new("message/rfc822", "7bit"),
                    body: Box::new(BodyStructure::Basic(BodyFields::new("text/html", "base64"))),
                },
            ],
        };
        assert_eq!(bs.leaf_count(), 2);
    }
}
