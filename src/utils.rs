use crate::error::{Result, ValidateError};

/// Writes the items of `iter` to `w`, separated by `delim`.
pub(crate) fn iter_join_onto<W, I, T>(mut w: W, iter: I, delim: &str) -> std::fmt::Result
where
    W: std::fmt::Write,
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut it = iter.into_iter().peekable();
    while let Some(n) = it.next() {
        write!(w, "{}", n)?;
        if it.peek().is_some() {
            write!(w, "{}", delim)?;
        }
    }
    Ok(())
}

/// Like [`iter_join_onto`], collecting into a new string.
pub(crate) fn iter_join<I, T>(iter: I, delim: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut s = String::new();
    let _ = iter_join_onto(&mut s, iter, delim);
    s
}

/// Checks text that is spliced verbatim into a command line, such as a
/// `FETCH` query or `SEARCH` criteria. Line breaks and NULs would end the
/// command early, so they are refused.
pub(crate) fn validate_str(value: &str) -> Result<&str> {
    match value.chars().find(|c| matches!(c, '\r' | '\n' | '\0')) {
        Some(c) => Err(ValidateError(c).into()),
        None => Ok(value),
    }
}

/// Like [`validate_str`], but also refuses empty text and spaces, for
/// values that must form a single atom (keywords, mechanism names).
pub(crate) fn validate_atom(value: &str) -> Result<&str> {
    if value.is_empty() {
        return Err(ValidateError(' ').into());
    }
    match value
        .chars()
        .find(|c| c.is_ascii_control() || matches!(c, ' ' | '(' | ')' | '{' | '"'))
    {
        Some(c) => Err(ValidateError(c).into()),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn join() {
        assert_eq!(iter_join([1, 2, 3], ","), "1,2,3");
        assert_eq!(iter_join(Vec::<u32>::new(), ","), "");
    }

    #[test]
    fn search_criteria_cannot_smuggle_commands() {
        for (criteria, bad) in [("SUBJECT x\nA9 DELETE INBOX", '\n'), ("FROM a\0", '\0')] {
            match validate_str(criteria) {
                Err(Error::Validate(ValidateError(c))) => assert_eq!(c, bad),
                other => panic!("{:?} gave {:?}", criteria, other),
            }
        }
        assert_eq!(validate_str("UNSEEN SINCE 1-Feb-1994").unwrap(), "UNSEEN SINCE 1-Feb-1994");
    }

    #[test]
    fn validate_carriage_return() {
        match validate_str("BODY[]\r\nA2 LOGOUT") {
            Err(Error::Validate(ValidateError('\r'))) => {}
            other => panic!("Wrong result: {:?}", other),
        }
        assert_eq!(validate_str("(FLAGS BODY.PEEK[HEADER])").unwrap(), "(FLAGS BODY.PEEK[HEADER])");
    }

    #[test]
    fn atoms() {
        assert!(validate_atom("$Forwarded").is_ok());
        assert!(validate_atom("XOAUTH2").is_ok());
        assert!(validate_atom("two words").is_err());
        assert!(validate_atom("").is_err());
        assert!(validate_atom("a\tb").is_err());
        match validate_atom("\\Seen (x)") {
            Err(Error::Validate(ValidateError(c))) => assert_eq!(c, ' '),
            other => panic!("unexpected {:?}", other),
        }
    }
}
