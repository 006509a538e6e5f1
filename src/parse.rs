use std::collections::HashMap;

use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;

use super::error::{Error, FramingError, ParseError, Result};
use super::io::Word;
use super::types::*;

lazy_static! {
    static ref ORIGIN: Regex = Regex::new(r"^<([0-9]+)>$").unwrap();
}

const INTERNALDATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// Classifies one reply, already split into words, as a [`Response`].
///
/// A reply whose overall shape is wrong is a framing error; a well-formed
/// untagged reply whose data cannot be decoded is a [`ParseError`].
pub fn parse_response(words: &[Word]) -> Result<Response> {
    let (values, text) = to_values(words)?;
    let text = text.unwrap_or_default();
    let malformed = || Error::Framing(FramingError::Malformed(describe(words)));

    let mut it = values.into_iter();
    let tag = match it.next() {
        Some(Value::Atom(tag)) => tag,
        _ => return Err(malformed()),
    };
    let rest: Vec<Value> = it.collect();

    match tag.as_str() {
        "+" => Ok(Response::Continuation {
            code: lenient_code(&rest),
            text,
        }),
        "*" => untagged(rest, text).map(Response::Untagged),
        _ => {
            let status = rest
                .first()
                .and_then(Value::as_atom)
                .and_then(Status::from_atom)
                .filter(|s| matches!(s, Status::Ok | Status::No | Status::Bad))
                .ok_or_else(malformed)?;
            Ok(Response::Tagged {
                tag,
                status,
                code: lenient_code(&rest[1..]),
                text,
            })
        }
    }
}

/// Decodes the base64 challenge of an `AUTHENTICATE` continuation.
pub fn parse_authenticate_challenge(text: &str) -> Result<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|_| Error::Parse(ParseError::Authentication(text.to_string())))
}

fn describe(words: &[Word]) -> String {
    crate::utils::iter_join(words, " ")
}

fn to_values(words: &[Word]) -> Result<(Vec<Value>, Option<String>)> {
    let mut stack: Vec<(Vec<Value>, bool)> = vec![(Vec::new(), false)];
    let mut text = None;

    for word in words {
        let value = match word {
            Word::Atom(a) if a.eq_ignore_ascii_case("NIL") => Value::Nil,
            Word::Atom(a) => Value::Atom(a.clone()),
            Word::Quoted(b) | Word::Literal(b) => Value::String(b.clone()),
            Word::Open => {
                stack.push((Vec::new(), false));
                continue;
            }
            Word::OpenSection => {
                stack.push((Vec::new(), true));
                continue;
            }
            Word::Close | Word::CloseSection => {
                let closes_section = *word == Word::CloseSection;
                let unbalanced = if closes_section {
                    FramingError::UnbalancedBracket
                } else {
                    FramingError::UnbalancedParen
                };
                if stack.len() < 2 {
                    return Err(unbalanced.into());
                }
                match stack.pop() {
                    Some((items, true)) if closes_section => Value::Section(items),
                    Some((items, false)) if !closes_section => Value::List(items),
                    _ => return Err(unbalanced.into()),
                }
            }
            Word::Text(t) => {
                text = Some(t.clone());
                continue;
            }
        };
        if let Some((top, _)) = stack.last_mut() {
            top.push(value);
        }
    }

    match stack.pop() {
        Some((values, false)) if stack.is_empty() => Ok((values, text)),
        _ => Err(FramingError::UnbalancedParen.into()),
    }
}

fn number(v: Option<&Value>) -> Result<u32> {
    match v {
        Some(v) => v
            .as_number()
            .ok_or_else(|| Error::Parse(ParseError::Number(v.to_string()))),
        None => Err(Error::Parse(ParseError::Number(String::new()))),
    }
}

fn unexpected(what: &str, v: &[Value]) -> Error {
    Error::Parse(ParseError::Unexpected(format!(
        "{}: {}",
        what,
        crate::utils::iter_join(v, " ")
    )))
}

fn flags(v: Option<&Value>) -> Result<Vec<Flag>> {
    let items = v
        .and_then(Value::as_list)
        .ok_or_else(|| unexpected("flag list", v.map(std::slice::from_ref).unwrap_or(&[])))?;
    Ok(items
        .iter()
        .filter_map(Value::as_atom)
        .map(Flag::from)
        .collect())
}

fn nstring(v: Option<&Value>) -> Option<Vec<u8>> {
    v.and_then(Value::as_bytes).map(<[u8]>::to_vec)
}

fn leading_code(rest: &[Value]) -> Result<Option<ResponseCode>> {
    match rest.first() {
        Some(Value::Section(items)) => response_code(items).map(Some),
        _ => Ok(None),
    }
}

// Codes on tagged and continuation lines never hide the line itself: one
// whose arguments do not decode is kept raw.
fn lenient_code(rest: &[Value]) -> Option<ResponseCode> {
    match rest.first() {
        Some(Value::Section(items)) => match response_code(items) {
            Ok(code) => Some(code),
            Err(_) => items.first().and_then(Value::as_atom).map(|name| {
                ResponseCode::Other(name.to_ascii_uppercase(), items[1..].to_vec())
            }),
        },
        _ => None,
    }
}

fn response_code(items: &[Value]) -> Result<ResponseCode> {
    let name = match items.first().and_then(Value::as_atom) {
        Some(name) => name.to_ascii_uppercase(),
        None => return Err(unexpected("response code", items)),
    };
    let args = &items[1..];
    Ok(match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => ResponseCode::UidNext(number(args.first())?),
        "UIDVALIDITY" => ResponseCode::UidValidity(number(args.first())?),
        "UNSEEN" => ResponseCode::Unseen(number(args.first())?),
        "PERMANENTFLAGS" => ResponseCode::PermanentFlags(flags(args.first())?),
        "CAPABILITY" => {
            ResponseCode::Capabilities(Capabilities::new(args.iter().filter_map(Value::as_atom)))
        }
        "APPENDUID" => ResponseCode::AppendUid {
            uid_validity: number(args.first())?,
            uid: number(args.get(1))?,
        },
        _ => ResponseCode::Other(name, args.to_vec()),
    })
}

fn untagged(rest: Vec<Value>, text: String) -> Result<Untagged> {
    let head = match rest.first().and_then(Value::as_atom) {
        Some(head) => head.to_string(),
        None => return Err(unexpected("untagged response", &rest)),
    };

    if let Ok(n) = head.parse::<u32>() {
        let name = match rest.get(1).and_then(Value::as_atom) {
            Some(name) => name.to_ascii_uppercase(),
            None => return Err(unexpected("untagged response", &rest)),
        };
        return Ok(match name.as_str() {
            "EXISTS" => Untagged::Exists(n),
            "RECENT" => Untagged::Recent(n),
            "EXPUNGE" => Untagged::Expunge(n),
            "FETCH" => Untagged::Fetch(fetch(n, rest.get(2))?),
            _ => Untagged::Other {
                name,
                number: Some(n),
                data: rest[2..].to_vec(),
            },
        });
    }

    if let Some(status) = Status::from_atom(&head) {
        return Ok(Untagged::Status {
            status,
            code: leading_code(&rest[1..])?,
            text,
        });
    }

    let name = head.to_ascii_uppercase();
    let args = &rest[1..];
    Ok(match name.as_str() {
        "CAPABILITY" => Untagged::Capabilities(Capabilities::new(
            args.iter().filter_map(Value::as_atom),
        )),
        "FLAGS" => Untagged::Flags(flags(args.first())?),
        "LIST" => Untagged::List(list_name(args)?),
        "LSUB" => Untagged::Lsub(list_name(args)?),
        "SEARCH" => Untagged::Search(
            args.iter()
                .map(|v| number(Some(v)))
                .collect::<Result<_>>()?,
        ),
        "STATUS" => mailbox_status(args)?,
        "ID" => Untagged::Id(match args.first() {
            Some(Value::List(items)) => Some(id_params(items)),
            _ => None,
        }),
        _ => Untagged::Other {
            name,
            number: None,
            data: args.to_vec(),
        },
    })
}

fn list_name(args: &[Value]) -> Result<Name> {
    let attributes = match args.first() {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(Value::as_atom)
            .map(NameAttribute::from)
            .collect(),
        _ => return Err(unexpected("LIST attributes", args)),
    };
    let delimiter = args.get(1).and_then(Value::as_text);
    let name = args
        .get(2)
        .and_then(Value::as_text)
        .ok_or_else(|| unexpected("LIST name", args))?;
    Ok(Name::new(attributes, delimiter, name))
}

fn mailbox_status(args: &[Value]) -> Result<Untagged> {
    let mailbox = args
        .first()
        .and_then(Value::as_text)
        .ok_or_else(|| unexpected("STATUS mailbox", args))?;
    let items = match args.get(1) {
        Some(Value::List(items)) => items,
        _ => return Err(unexpected("STATUS items", args)),
    };
    let items = items
        .chunks(2)
        .map(|pair| {
            let name = pair[0]
                .as_atom()
                .ok_or_else(|| unexpected("STATUS item", pair))?;
            Ok((name.to_ascii_uppercase(), number(pair.get(1))?))
        })
        .collect::<Result<_>>()?;
    Ok(Untagged::MailboxStatus { mailbox, items })
}

fn id_params(items: &[Value]) -> HashMap<String, String> {
    items
        .chunks(2)
        .filter_map(|pair| match pair {
            [key, value] => Some((key.as_text()?, value.as_text()?)),
            _ => None,
        })
        .collect()
}

fn fetch(message: Seq, data: Option<&Value>) -> Result<Fetch> {
    let items = match data {
        Some(Value::List(items)) => items,
        _ => return Err(unexpected("FETCH data", data.map(std::slice::from_ref).unwrap_or(&[]))),
    };

    let mut fetch = Fetch {
        message,
        ..Fetch::default()
    };
    let mut it = items.iter().peekable();
    while let Some(item) = it.next() {
        let name = match item.as_atom() {
            Some(name) => name.to_ascii_uppercase(),
            None => return Err(unexpected("FETCH item", items)),
        };

        if name == "BODY" {
            if let Some(Value::Section(spec)) = it.peek().copied() {
                it.next();
                let section = crate::utils::iter_join(spec, " ").to_ascii_uppercase();
                let origin = match it.peek().copied().and_then(Value::as_atom) {
                    Some(atom) => match ORIGIN.captures(atom) {
                        Some(cap) => Some(
                            cap[1]
                                .parse()
                                .map_err(|_| Error::Parse(ParseError::Number(atom.to_string())))?,
                        ),
                        None => None,
                    },
                    None => None,
                };
                if origin.is_some() {
                    it.next();
                }
                fetch.sections.push(BodySection {
                    section,
                    origin,
                    data: nstring(it.next()),
                });
                continue;
            }
        }

        let value = it.next();
        match name.as_str() {
            "UID" => fetch.uid = Some(number(value)?),
            "RFC822.SIZE" => fetch.size = Some(number(value)?),
            "FLAGS" => fetch.flags = flags(value)?,
            "INTERNALDATE" => {
                let text = value.and_then(Value::as_text).unwrap_or_default();
                let date = DateTime::parse_from_str(text.trim(), INTERNALDATE_FORMAT)
                    .map_err(|_| Error::Parse(ParseError::Date(text.clone())))?;
                fetch.internal_date = Some(date);
            }
            "ENVELOPE" => fetch.envelope = Some(envelope(value)?),
            "RFC822" => fetch.rfc822 = nstring(value),
            "RFC822.HEADER" => fetch.rfc822_header = nstring(value),
            "RFC822.TEXT" => fetch.rfc822_text = nstring(value),
            "BODY" | "BODYSTRUCTURE" => fetch.body_structure = value.cloned(),
            _ => tracing::trace!("ignoring FETCH item {}", name),
        }
    }
    Ok(fetch)
}

fn envelope(v: Option<&Value>) -> Result<Envelope> {
    let fields = match v {
        Some(Value::List(fields)) if fields.len() >= 10 => fields,
        _ => return Err(unexpected("ENVELOPE", v.map(std::slice::from_ref).unwrap_or(&[]))),
    };
    Ok(Envelope {
        date: nstring(fields.first()),
        subject: nstring(fields.get(1)),
        from: addresses(&fields[2])?,
        sender: addresses(&fields[3])?,
        reply_to: addresses(&fields[4])?,
        to: addresses(&fields[5])?,
        cc: addresses(&fields[6])?,
        bcc: addresses(&fields[7])?,
        in_reply_to: nstring(fields.get(8)),
        message_id: nstring(fields.get(9)),
    })
}

fn addresses(v: &Value) -> Result<Vec<Address>> {
    let list = v
        .as_list()
        .ok_or_else(|| unexpected("address list", std::slice::from_ref(v)))?;
    list.iter()
        .map(|a| match a {
            Value::List(parts) if parts.len() == 4 => Ok(Address {
                name: nstring(parts.first()),
                adl: nstring(parts.get(1)),
                mailbox: nstring(parts.get(2)),
                host: nstring(parts.get(3)),
            }),
            _ => Err(unexpected("address", std::slice::from_ref(a))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::split_words;

    fn parse(line: &str) -> Result<Response> {
        parse_response(&split_words(line.as_bytes()).unwrap())
    }

    fn untagged_of(line: &str) -> Untagged {
        match parse(line).unwrap() {
            Response::Untagged(u) => u,
            other => panic!("not untagged: {:?}", other),
        }
    }

    #[test]
    fn tagged_completion() {
        let resp = parse("A1 OK [READ-WRITE] SELECT completed\r\n").unwrap();
        assert_eq!(
            resp,
            Response::Tagged {
                tag: "A1".to_string(),
                status: Status::Ok,
                code: Some(ResponseCode::ReadWrite),
                text: "SELECT completed".to_string(),
            }
        );
        assert!(matches!(
            parse("A2 no Authentication failed\r\n").unwrap(),
            Response::Tagged { status: Status::No, code: None, .. }
        ));
    }

    #[test]
    fn tagged_must_carry_a_completion_status() {
        for line in ["A1 BYE\r\n", "A1 PREAUTH hi\r\n", "A1 FETCH\r\n", "(A1 OK)\r\n"] {
            match parse(line) {
                Err(Error::Framing(FramingError::Malformed(_))) => {}
                other => panic!("{:?} gave {:?}", line, other),
            }
        }
    }

    #[test]
    fn undecodable_code_on_tagged_line_is_kept_raw() {
        match parse("A1 OK [UIDNEXT x] done\r\n").unwrap() {
            Response::Tagged {
                status: Status::Ok,
                code: Some(ResponseCode::Other(name, args)),
                text,
                ..
            } => {
                assert_eq!(name, "UIDNEXT");
                assert_eq!(args, vec![Value::Atom("x".to_string())]);
                assert_eq!(text, "done");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse("A1 OK [APPENDUID 1 abc] ok\r\n").unwrap(),
            Response::Tagged { code: Some(ResponseCode::Other(..)), .. }
        ));
        assert!(matches!(
            parse("+ [UNSEEN none] go\r\n").unwrap(),
            Response::Continuation { code: Some(ResponseCode::Other(..)), .. }
        ));
        // the untagged form is still an error for the caller to defer
        assert!(matches!(
            parse("* OK [UIDNEXT x] hmm\r\n"),
            Err(Error::Parse(ParseError::Number(_)))
        ));
    }

    #[test]
    fn continuation() {
        assert_eq!(
            parse("+ UmVhZHk=\r\n").unwrap(),
            Response::Continuation {
                code: None,
                text: "UmVhZHk=".to_string()
            }
        );
        assert_eq!(parse_authenticate_challenge("UmVhZHk=").unwrap(), b"Ready");
        assert!(parse_authenticate_challenge("not base64!").is_err());
    }

    #[test]
    fn status_responses_and_codes() {
        assert_eq!(
            untagged_of("* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n"),
            Untagged::Status {
                status: Status::Ok,
                code: Some(ResponseCode::PermanentFlags(vec![
                    Flag::Deleted,
                    Flag::Seen,
                    Flag::MayCreate
                ])),
                text: "Limited".to_string(),
            }
        );
        assert!(matches!(
            untagged_of("* OK [UIDVALIDITY 3857529045] UIDs valid\r\n"),
            Untagged::Status { code: Some(ResponseCode::UidValidity(3857529045)), .. }
        ));
        assert!(matches!(
            untagged_of("* BYE Autologout; idle for too long\r\n"),
            Untagged::Status { status: Status::Bye, code: None, .. }
        ));
        match untagged_of("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n") {
            Untagged::Status { code: Some(ResponseCode::Capabilities(c)), .. } => {
                assert!(c.has_auth("PLAIN"))
            }
            other => panic!("{:?}", other),
        }
        assert!(matches!(
            untagged_of("* OK [HIGHESTMODSEQ 715194045007] ok\r\n"),
            Untagged::Status { code: Some(ResponseCode::Other(ref n, _)), .. } if n == "HIGHESTMODSEQ"
        ));
        assert!(parse("* OK [UNSEEN many] x\r\n").is_err());
    }

    #[test]
    fn mailbox_data() {
        assert_eq!(untagged_of("* 23 EXISTS\r\n"), Untagged::Exists(23));
        assert_eq!(untagged_of("* 5 recent\r\n"), Untagged::Recent(5));
        assert_eq!(untagged_of("* 3 EXPUNGE\r\n"), Untagged::Expunge(3));
        assert_eq!(
            untagged_of("* FLAGS (\\Answered \\Flagged $Forwarded)\r\n"),
            Untagged::Flags(vec![
                Flag::Answered,
                Flag::Flagged,
                Flag::Custom("$Forwarded".to_string())
            ])
        );
        assert_eq!(untagged_of("* SEARCH 2 84 882\r\n"), Untagged::Search(vec![2, 84, 882]));
        assert_eq!(untagged_of("* SEARCH\r\n"), Untagged::Search(vec![]));
        assert_eq!(
            untagged_of("* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\n"),
            Untagged::MailboxStatus {
                mailbox: "blurdybloop".to_string(),
                items: vec![("MESSAGES".to_string(), 231), ("UIDNEXT".to_string(), 44292)],
            }
        );
        match untagged_of("* LIST (\\Noselect \\HasChildren) \"/\" \"[Gmail]\"\r\n") {
            Untagged::List(name) => {
                assert_eq!(name.name(), "[Gmail]");
                assert_eq!(name.delimiter(), Some("/"));
                assert!(!name.is_selectable());
            }
            other => panic!("{:?}", other),
        }
        match untagged_of("* LSUB () NIL INBOX\r\n") {
            Untagged::Lsub(name) => {
                assert_eq!(name.delimiter(), None);
                assert_eq!(name.name(), "INBOX");
            }
            other => panic!("{:?}", other),
        }
        match untagged_of("* ID (\"name\" \"Dovecot\" \"version\" NIL)\r\n") {
            Untagged::Id(Some(params)) => {
                assert_eq!(params.get("name").map(String::as_str), Some("Dovecot"));
                assert!(!params.contains_key("version"));
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(untagged_of("* ID NIL\r\n"), Untagged::Id(None));
        assert!(matches!(
            untagged_of("* QUOTA \"\" (STORAGE 10 512)\r\n"),
            Untagged::Other { ref name, number: None, .. } if name == "QUOTA"
        ));
    }

    #[test]
    fn fetch_items() {
        let line = "* 12 FETCH (FLAGS (\\Seen) UID 4827313 RFC822.SIZE 4286 \
                    INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" \
                    BODY[HEADER.FIELDS (FROM)] {21}\r\nFrom: a@example.org\r\n \
                    BODY[TEXT]<0> \"hello\" BODYSTRUCTURE (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 5 1))\r\n";
        let f = match untagged_of(line) {
            Untagged::Fetch(f) => f,
            other => panic!("{:?}", other),
        };
        assert_eq!(f.message, 12);
        assert_eq!(f.uid, Some(4827313));
        assert_eq!(f.size, Some(4286));
        assert_eq!(f.flags(), &[Flag::Seen]);
        assert_eq!(
            f.internal_date().unwrap().to_rfc3339(),
            "1996-07-17T02:44:25-07:00"
        );
        assert_eq!(
            f.section("HEADER.FIELDS (FROM)"),
            Some(&b"From: a@example.org\r\n"[..])
        );
        assert_eq!(f.text(), Some(&b"hello"[..]));
        assert_eq!(f.sections()[1].origin, Some(0));
        assert!(f.body_structure().is_some());
        assert_eq!(f.body(), None);
    }

    #[test]
    fn fetch_envelope() {
        let line = "* 2 FETCH (ENVELOPE (\"Wed, 17 Jul 1996 02:23:25 -0700 (PDT)\" \
                    \"IMAP4rev1 WG mtg summary and minutes\" \
                    ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) \
                    ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) \
                    ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) \
                    ((NIL NIL \"imap\" \"cac.washington.edu\")) \
                    ((NIL NIL \"minutes\" \"CNRI.Reston.VA.US\") \
                    (\"John Klensin\" NIL \"KLENSIN\" \"MIT.EDU\")) NIL NIL \
                    \"<B27397-0100000@cac.washington.edu>\") RFC822 NIL)\r\n";
        let f = match untagged_of(line) {
            Untagged::Fetch(f) => f,
            other => panic!("{:?}", other),
        };
        let env = f.envelope().unwrap();
        assert_eq!(
            env.subject.as_deref(),
            Some(&b"IMAP4rev1 WG mtg summary and minutes"[..])
        );
        assert_eq!(env.from[0].mailbox.as_deref(), Some(&b"gray"[..]));
        assert_eq!(env.cc.len(), 2);
        assert_eq!(env.cc[1].name.as_deref(), Some(&b"John Klensin"[..]));
        assert!(env.bcc.is_empty());
        assert_eq!(env.in_reply_to, None);
        assert_eq!(
            env.message_id.as_deref(),
            Some(&b"<B27397-0100000@cac.washington.edu>"[..])
        );
        assert_eq!(f.body(), None);
    }

    #[test]
    fn bad_fetch_data_is_a_parse_error() {
        assert!(matches!(
            parse("* 1 FETCH (UID x)\r\n"),
            Err(Error::Parse(ParseError::Number(_)))
        ));
        assert!(matches!(
            parse("* 1 FETCH (INTERNALDATE \"yesterday\")\r\n"),
            Err(Error::Parse(ParseError::Date(_)))
        ));
        assert!(matches!(
            parse("* 1 FETCH UID\r\n"),
            Err(Error::Parse(ParseError::Unexpected(_)))
        ));
    }
}
