use std::fmt;
use std::slice::Iter;

/// From [section 7.2.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1).
///
/// A list of capabilities that the server supports.
/// The capability list will include the atom "IMAP4rev1".
///
/// A capability name which begins with `AUTH=` indicates that the server supports that particular
/// authentication mechanism. More generally, a capability of the form `NAME=value` is treated as
/// the capability `NAME` carrying the parameter `value`; a name may appear with several
/// parameters.
///
/// The `LOGINDISABLED` capability indicates that the `LOGIN` command is disabled, and that the
/// server will respond with a [`crate::Error::No`] response to any attempt to use the `LOGIN`
/// command even if the user name and password are valid.
///
/// Client implementations SHOULD NOT require any capability name other than `IMAP4rev1`, and MUST
/// ignore any unknown capability names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<String>);

impl Capabilities {
    /// Builds the list from the atoms of a `CAPABILITY` response.
    pub fn new<I, S>(atoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Capabilities(atoms.into_iter().map(Into::into).collect())
    }

    /// Check if the server has the given capability, either bare or with a parameter.
    /// Names are compared without regard to case.
    pub fn has(&self, name: &str) -> bool {
        self.0.iter().any(|c| split(c).0.eq_ignore_ascii_case(name) || c.eq_ignore_ascii_case(name))
    }

    /// The first parameter given for `name`, so `get("AUTH")` yields `Some("PLAIN")` for a
    /// server advertising `AUTH=PLAIN`. Returns `None` for bare or unknown capabilities.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params(name).next()
    }

    /// Every parameter given for `name`.
    pub fn params<'a: 'b, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a str> + 'b {
        self.0.iter().filter_map(move |c| match split(c) {
            (n, Some(value)) if n.eq_ignore_ascii_case(name) => Some(value),
            _ => None,
        })
    }

    /// Check if the server supports the given SASL mechanism.
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.params("AUTH").any(|m| m.eq_ignore_ascii_case(mechanism))
    }

    /// Iterate over all the server's capabilities
    pub fn iter(&self) -> Iter<'_, String> {
        self.0.iter()
    }

    /// Returns how many capabilities the server has.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the server purports to have no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn split(capability: &str) -> (&str, Option<&str>) {
    match capability.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (capability, None),
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::utils::iter_join_onto(f, self.0.iter(), " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_parameters() {
        let caps = Capabilities::new([
            "IMAP4rev1",
            "STARTTLS",
            "AUTH=PLAIN",
            "AUTH=XOAUTH2",
            "APPENDLIMIT=35651584",
        ]);
        assert_eq!(caps.len(), 5);
        assert!(caps.has("imap4rev1"));
        assert!(caps.has("AUTH"));
        assert!(caps.has("AUTH=PLAIN"));
        assert!(!caps.has("IDLE"));
        assert_eq!(caps.get("AUTH"), Some("PLAIN"));
        assert_eq!(caps.get("STARTTLS"), None);
        assert_eq!(caps.get("appendlimit"), Some("35651584"));
        assert!(caps.has_auth("xoauth2"));
        assert!(!caps.has_auth("GSSAPI"));
        assert_eq!(caps.to_string(), "IMAP4rev1 STARTTLS AUTH=PLAIN AUTH=XOAUTH2 APPENDLIMIT=35651584");
    }
}
