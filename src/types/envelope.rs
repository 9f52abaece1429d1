use std::fmt;

/// One address from an envelope address list, per [RFC 3501 section
/// 7.4.2](https://tools.ietf.org/html/rfc3501#section-7.4.2).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Address {
    /// The display name, if any.
    pub name: Option<String>,
    /// The local part of the address.
    pub mailbox: Option<String>,
    /// The domain part of the address.
    pub host: Option<String>,
}

impl Address {
    /// Construct a plain `mailbox@host` address.
    pub fn new<S: ToString>(name: Option<S>, mailbox: S, host: S) -> Self {
        Address {
            name: name.map(|n| n.to_string()),
            mailbox: Some(mailbox.to_string()),
            host: Some(host.to_string()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => format!("{}@{}", m, h),
            (Some(m), None) => m.clone(),
            _ => String::new(),
        };
        match self.name {
            Some(ref name) => write!(f, "{} <{}>", name, addr),
            None => write!(f, "{}", addr),
        }
    }
}

/// The envelope structure of a message, per [RFC 3501 section
/// 7.4.2](https://tools.ietf.org/html/rfc3501#section-7.4.2), extended with
/// the `References` header the threading code wants.
///
/// The date is kept as the raw RFC 2822 string the server sent; parsing it
/// is the presentation layer's business.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    /// Contents of the `In-Reply-To` header, angle brackets stripped.
    pub in_reply_to: Option<String>,
    /// Contents of the `Message-Id` header, angle brackets stripped.
    pub message_id: Option<String>,
    /// Message-ids from the `References` header, angle brackets stripped.
    pub references: Vec<String>,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(addresses: &[Address]) -> String {
            addresses
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
        writeln!(f, "From: {}", join(&self.from))?;
        writeln!(f, "To: {}", join(&self.to))?;
        if !self.cc.is_empty() {
            writeln!(f, "Cc: {}", join(&self.cc))?;
        }
        if let Some(ref date) = self.date {
            writeln!(f, "Date: {}", date)?;
        }
        write!(f, "Subject: {}", self.subject.as_deref().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display() {
        let a = Address::new(Some("John Doe"), "jdoe", "example.org");
        assert_eq!(a.to_string(), "John Doe <jdoe@example.org>");
        let b = Address::new(None, "jdoe", "example.org");
        assert_eq!(b.to_string(), "jdoe@example.org");
    }

    #[test]
    fn envelope_display_mentions_subject() {
        let e = Envelope {
            subject: Some("Hi".to_string()),
            from: vec![Address::new(None, "a", "x")],
            ..Envelope::default()
        };
        assert!(e.to_string().contains("Subject: Hi"));
        assert!(e.to_string().contains("From: a@x"));
    }
}
