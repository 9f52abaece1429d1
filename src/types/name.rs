/// An attribute set on a mailbox in a `LIST` or `LSUB` response.
///
/// The first four are defined by [RFC 3501 section
/// 7.2.2](https://tools.ietf.org/html/rfc3501#section-7.2.2); `HasChildren`
/// and `HasNoChildren` come from the `CHILDREN` extension ([RFC
/// 3348](https://tools.ietf.org/html/rfc3348)) and are sent by most servers.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum NameAttribute {
    /// It is not possible for any child levels of hierarchy to exist under
    /// this name; no child levels exist now and none can be created in the
    /// future.
    NoInferiors,

    /// It is not possible to use this name as a selectable mailbox.
    NoSelect,

    /// The mailbox has been marked "interesting" by the server.
    Marked,

    /// The mailbox does not contain any additional messages since the last
    /// time it was selected.
    Unmarked,

    /// The mailbox has at least one child mailbox.
    HasChildren,

    /// The mailbox has no child mailboxes.
    HasNoChildren,

    /// Some other attribute; the raw value is kept verbatim.
    Custom(String),
}

impl NameAttribute {
    fn system(s: &str) -> Option<Self> {
        // attribute comparison is case-insensitive per RFC 3501
        match s.to_ascii_uppercase().as_str() {
            "\\NOINFERIORS" => Some(NameAttribute::NoInferiors),
            "\\NOSELECT" => Some(NameAttribute::NoSelect),
            "\\MARKED" => Some(NameAttribute::Marked),
            "\\UNMARKED" => Some(NameAttribute::Unmarked),
            "\\HASCHILDREN" => Some(NameAttribute::HasChildren),
            "\\HASNOCHILDREN" => Some(NameAttribute::HasNoChildren),
            _ => None,
        }
    }
}

impl std::fmt::Display for NameAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            NameAttribute::NoInferiors => write!(f, "\\Noinferiors"),
            NameAttribute::NoSelect => write!(f, "\\Noselect"),
            NameAttribute::Marked => write!(f, "\\Marked"),
            NameAttribute::Unmarked => write!(f, "\\Unmarked"),
            NameAttribute::HasChildren => write!(f, "\\HasChildren"),
            NameAttribute::HasNoChildren => write!(f, "\\HasNoChildren"),
            NameAttribute::Custom(ref s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for NameAttribute {
    fn from(s: String) -> Self {
        if let Some(a) = NameAttribute::system(&s) {
            a
        } else {
            NameAttribute::Custom(s)
        }
    }
}

impl From<&str> for NameAttribute {
    fn from(s: &str) -> Self {
        NameAttribute::from(s.to_string())
    }
}

/// One mailbox reported by a `LIST` or `LSUB` command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListEntry {
    /// Attributes of this name.
    pub attributes: Vec<NameAttribute>,

    /// The hierarchy delimiter is a character used to delimit levels of hierarchy in a mailbox
    /// name.  A client can use it to create child mailboxes, and to search higher or lower levels
    /// of naming hierarchy.  All children of a top-level hierarchy node use the same
    /// separator character.  `None` means that no hierarchy exists; the name is a "flat" name.
    pub delimiter: Option<char>,

    /// The name represents an unambiguous left-to-right hierarchy, and is valid for use as a
    /// reference in `LIST` and `LSUB` commands. Unless [`NameAttribute::NoSelect`] is indicated,
    /// the name is also valid as an argument for commands, such as `SELECT`, that accept mailbox
    /// names.
    pub name: String,
}

impl ListEntry {
    /// Build an entry from raw attribute strings, as handed over by the
    /// wire-protocol layer.
    pub fn new<S: ToString>(
        name: S,
        delimiter: Option<char>,
        attributes: impl IntoIterator<Item = S>,
    ) -> Self {
        ListEntry {
            attributes: attributes
                .into_iter()
                .map(|a| NameAttribute::from(a.to_string()))
                .collect(),
            delimiter,
            name: name.to_string(),
        }
    }

    /// Whether this mailbox can never be `SELECT`ed.
    pub fn is_no_select(&self) -> bool {
        self.attributes.contains(&NameAttribute::NoSelect)
    }
}
