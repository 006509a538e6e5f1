//! Splitting IMAP records into words and joining words back into records.

use std::fmt;

use crate::error::FramingError;

/// One lexical unit of an IMAP record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Word {
    /// A bare atom such as `OK`, `A12` or `\Seen`.
    Atom(String),
    /// The unescaped contents of a quoted string.
    Quoted(Vec<u8>),
    /// The payload of a `{n}` literal.
    Literal(Vec<u8>),
    /// `(`
    Open,
    /// `)`
    Close,
    /// `[`
    OpenSection,
    /// `]`
    CloseSection,
    /// The human-readable remainder of a status or continuation line.
    Text(String),
}

impl Word {
    /// The bytes this word carries. Delimiters yield their own character.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Word::Atom(s) | Word::Text(s) => s.as_bytes(),
            Word::Quoted(b) | Word::Literal(b) => b,
            Word::Open => b"(",
            Word::Close => b")",
            Word::OpenSection => b"[",
            Word::CloseSection => b"]",
        }
    }

    /// The atom text, if this is an atom.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Word::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if this is an atom equal to `name`, ignoring case.
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Word::Atom(a) if a.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Quoted(b) => write!(f, "\"{}\"", String::from_utf8_lossy(b)),
            Word::Literal(b) => write!(f, "{{{}}}", b.len()),
            other => f.write_str(&String::from_utf8_lossy(other.as_bytes())),
        }
    }
}

const STATUS_WORDS: [&str; 5] = ["OK", "NO", "BAD", "BYE", "PREAUTH"];

/// Returns true if `data` cannot travel inside a quoted string.
pub(crate) fn needs_literal(data: &[u8]) -> bool {
    data.iter()
        .any(|&b| b == b'\r' || b == b'\n' || b == 0 || b >= 0x80)
}

/// Returns true if `data` can be sent as a bare atom.
pub(crate) fn is_atom_safe(data: &[u8]) -> bool {
    !data.is_empty()
        && data.iter().all(|&b| {
            b > b' '
                && b < 0x7f
                && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b'[' | b']')
        })
        && !data.eq_ignore_ascii_case(b"NIL")
}

/// Appends `data` to `out` as a quoted string.
pub(crate) fn quote_into(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'"');
    for &b in data {
        if b == b'"' || b == b'\\' {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b'"');
}

/// Splits one complete record into words.
///
/// The record is a line with any literal payloads inlined after their
/// `{n}\r\n` headers, as assembled by [`ImapIo::get_line`]. On status
/// lines (`OK`, `NO`, `BAD`, `BYE` or `PREAUTH` after `*` or a tag) and on
/// `+` continuation lines only the optional `[code]` is split; the rest of
/// the line becomes a single [`Word::Text`].
///
/// [`ImapIo::get_line`]: super::ImapIo::get_line
pub fn split_words(record: &[u8]) -> Result<Vec<Word>, FramingError> {
    let mut splitter = Splitter {
        input: record,
        end: line_end(record),
        pos: 0,
        words: Vec::new(),
        parens: 0,
        brackets: 0,
    };
    splitter.run()?;
    Ok(splitter.words)
}

/// Formats words as a line of quoted strings, falling back to literals for
/// words that cannot be quoted. [`split_words`] turns the result back into
/// the same words.
pub fn format_words<W: AsRef<[u8]>>(words: &[W]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let word = word.as_ref();
        if i > 0 {
            out.push(b' ');
        }
        if needs_literal(word) {
            out.extend_from_slice(format!("{{{}}}\r\n", word.len()).as_bytes());
            out.extend_from_slice(word);
        } else {
            quote_into(&mut out, word);
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn line_end(record: &[u8]) -> usize {
    if record.ends_with(b"\r\n") {
        record.len() - 2
    } else if record.ends_with(b"\n") {
        record.len() - 1
    } else {
        record.len()
    }
}

struct Splitter<'a> {
    input: &'a [u8],
    end: usize,
    pos: usize,
    words: Vec<Word>,
    parens: usize,
    brackets: usize,
}

impl<'a> Splitter<'a> {
    fn peek(&self) -> Option<u8> {
        if self.pos < self.end {
            Some(self.input[self.pos])
        } else {
            None
        }
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn run(&mut self) -> Result<(), FramingError> {
        loop {
            self.skip_blanks();
            if self.peek().is_none() {
                break;
            }
            if self.starts_text() {
                self.text()?;
                break;
            }
            self.token()?;
        }
        if self.parens > 0 {
            return Err(FramingError::UnbalancedParen);
        }
        if self.brackets > 0 {
            return Err(FramingError::UnbalancedBracket);
        }
        Ok(())
    }

    fn starts_text(&self) -> bool {
        match self.words.as_slice() {
            [Word::Atom(plus)] => plus == "+",
            [Word::Atom(_), Word::Atom(status)] => STATUS_WORDS
                .iter()
                .any(|s| status.eq_ignore_ascii_case(s)),
            _ => false,
        }
    }

    fn text(&mut self) -> Result<(), FramingError> {
        if self.peek() == Some(b'[') {
            self.token()?;
            while self.brackets > 0 {
                self.skip_blanks();
                if self.peek().is_none() {
                    return Err(FramingError::UnbalancedBracket);
                }
                self.token()?;
            }
            self.skip_blanks();
        }
        if self.pos < self.end {
            let text = String::from_utf8_lossy(&self.input[self.pos..self.end]);
            self.words.push(Word::Text(text.into_owned()));
        }
        self.pos = self.end;
        Ok(())
    }

    fn token(&mut self) -> Result<(), FramingError> {
        let c = self.input[self.pos];
        let word = match c {
            b'(' => {
                self.parens += 1;
                Word::Open
            }
            b')' => {
                self.parens = self
                    .parens
                    .checked_sub(1)
                    .ok_or(FramingError::UnbalancedParen)?;
                Word::Close
            }
            b'[' => {
                self.brackets += 1;
                Word::OpenSection
            }
            b']' => {
                self.brackets = self
                    .brackets
                    .checked_sub(1)
                    .ok_or(FramingError::UnbalancedBracket)?;
                Word::CloseSection
            }
            b'"' => return self.quoted(),
            b'\r' | b'\n' => return Err(FramingError::StrayLineBreak),
            b'{' => {
                if self.literal()? {
                    return Ok(());
                }
                return self.atom();
            }
            _ => return self.atom(),
        };
        self.pos += 1;
        self.words.push(word);
        Ok(())
    }

    fn quoted(&mut self) -> Result<(), FramingError> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\r') | Some(b'\n') => return Err(FramingError::UnbalancedQuote),
                Some(b'"') => break,
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None | Some(b'\r') | Some(b'\n') => {
                            return Err(FramingError::UnbalancedQuote)
                        }
                        Some(c) => out.push(c),
                    }
                }
                Some(c) => out.push(c),
            }
            self.pos += 1;
        }
        self.pos += 1;
        self.words.push(Word::Quoted(out));
        Ok(())
    }

    // Consumes a `{n}` or `{n+}` header and its payload. Returns false if the
    // brace does not open a literal header at all.
    fn literal(&mut self) -> Result<bool, FramingError> {
        let rest = &self.input[self.pos..];
        let close = match rest.iter().position(|&b| b == b'}') {
            Some(i) => i,
            None => return Ok(false),
        };
        let inner = &rest[1..close];
        let digits = inner.strip_suffix(b"+").unwrap_or(inner);
        if !digits.iter().all(u8::is_ascii_digit) {
            return Ok(false);
        }
        let after = &rest[close + 1..];
        let newline = if after.starts_with(b"\r\n") {
            2
        } else if after.starts_with(b"\n") {
            1
        } else {
            return Err(FramingError::MalformedLiteral);
        };
        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|d| d.parse().ok())
            .ok_or(FramingError::MalformedLiteral)?;
        let start = self.pos + close + 1 + newline;
        let stop = start
            .checked_add(size)
            .filter(|&stop| stop <= self.input.len())
            .ok_or(FramingError::PrematureEof)?;
        self.words
            .push(Word::Literal(self.input[start..stop].to_vec()));
        self.pos = stop;
        // the payload may run into the final line terminator
        self.end = line_end_from(self.input, stop);
        Ok(true)
    }

    fn atom(&mut self) -> Result<(), FramingError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b' ' | b'\t' | b'(' | b')' | b'[' | b']' | b'"' | b'\r' | b'\n') {
                break;
            }
            self.pos += 1;
        }
        let atom = String::from_utf8_lossy(&self.input[start..self.pos]);
        self.words.push(Word::Atom(atom.into_owned()));
        Ok(())
    }
}

fn line_end_from(input: &[u8], from: usize) -> usize {
    from + line_end(&input[from..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn atom(s: &str) -> Word {
        Word::Atom(s.to_string())
    }

    #[test]
    fn untagged_data() {
        let words = split_words(b"* 4 EXISTS\r\n").unwrap();
        assert_eq!(words, vec![atom("*"), atom("4"), atom("EXISTS")]);
    }

    #[test]
    fn status_line_keeps_text_whole() {
        let words = split_words(b"A1 OK [READ-WRITE] SELECT \"completed\r\n").unwrap();
        assert_eq!(
            words,
            vec![
                atom("A1"),
                atom("OK"),
                Word::OpenSection,
                atom("READ-WRITE"),
                Word::CloseSection,
                Word::Text("SELECT \"completed".to_string()),
            ]
        );
    }

    #[test]
    fn response_code_with_list() {
        let words =
            split_words(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n").unwrap();
        assert_eq!(
            words,
            vec![
                atom("*"),
                atom("OK"),
                Word::OpenSection,
                atom("PERMANENTFLAGS"),
                Word::Open,
                atom("\\Deleted"),
                atom("\\Seen"),
                atom("\\*"),
                Word::Close,
                Word::CloseSection,
                Word::Text("Limited".to_string()),
            ]
        );
    }

    #[test]
    fn continuation() {
        assert_eq!(
            split_words(b"+ Ready for literal data\r\n").unwrap(),
            vec![atom("+"), Word::Text("Ready for literal data".to_string())]
        );
        assert_eq!(split_words(b"+\r\n").unwrap(), vec![atom("+")]);
    }

    #[test]
    fn quoted_escapes() {
        let words = split_words(b"* LIST () \"/\" \"a \\\"b\\\\\"\r\n").unwrap();
        assert_eq!(words[5], Word::Quoted(b"a \"b\\".to_vec()));
    }

    #[test]
    fn literal_inside_fetch() {
        let words = split_words(b"* 2 FETCH (BODY[TEXT] {5}\r\nhi\r\n! UID 9)\r\n").unwrap();
        assert_eq!(
            words,
            vec![
                atom("*"),
                atom("2"),
                atom("FETCH"),
                Word::Open,
                atom("BODY"),
                Word::OpenSection,
                atom("TEXT"),
                Word::CloseSection,
                Word::Literal(b"hi\r\n!".to_vec()),
                atom("UID"),
                atom("9"),
                Word::Close,
            ]
        );
    }

    #[test]
    fn literal_at_end_of_record() {
        let words = split_words(b"A1 LOGIN {3}\r\nfoo {4+}\r\nb\r\nr\r\n").unwrap();
        assert_eq!(
            words,
            vec![
                atom("A1"),
                atom("LOGIN"),
                Word::Literal(b"foo".to_vec()),
                Word::Literal(b"b\r\nr".to_vec()),
            ]
        );
    }

    #[test]
    fn framing_errors() {
        assert_eq!(
            split_words(b"* LIST (\\Noselect \"/\" x\r\n"),
            Err(FramingError::UnbalancedParen)
        );
        assert_eq!(
            split_words(b"* 1 FETCH (UID 1))\r\n"),
            Err(FramingError::UnbalancedParen)
        );
        assert_eq!(
            split_words(b"* LIST () \"/ INBOX\r\n"),
            Err(FramingError::UnbalancedQuote)
        );
        assert_eq!(
            split_words(b"* OK [ALERT oops\r\n"),
            Err(FramingError::UnbalancedBracket)
        );
        assert_eq!(
            split_words(b"* 1 FETCH (BODY[] {10}\r\nshort)\r\n"),
            Err(FramingError::PrematureEof)
        );
        assert_eq!(
            split_words(b"A1 LOGIN {}\r\nx\r\n"),
            Err(FramingError::MalformedLiteral)
        );
        assert_eq!(
            split_words(b"A1 X {99999999999999999999999}\r\n"),
            Err(FramingError::MalformedLiteral)
        );
        assert_eq!(
            split_words(b"A1 X\r\nA2 Y\r\n"),
            Err(FramingError::StrayLineBreak)
        );
    }

    #[test]
    fn format_quotes_and_literals() {
        let line = format_words(&[&b"INBOX"[..], b"a \"q\"", b"two\r\nlines"]);
        assert_eq!(
            line,
            b"\"INBOX\" \"a \\\"q\\\"\" {10}\r\ntwo\r\nlines\r\n".to_vec()
        );
    }

    proptest! {
        #[test]
        fn format_then_split_is_identity(
            words in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..8)
        ) {
            let line = format_words(&words);
            let split = split_words(&line).unwrap();
            let bytes: Vec<Vec<u8>> = split.iter().map(|w| w.as_bytes().to_vec()).collect();
            prop_assert_eq!(bytes, words);
        }
    }
}
