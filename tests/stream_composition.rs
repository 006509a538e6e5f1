use std::io::SeekFrom;

use mailstream::stream::{
    Base64Decoder, CacheStream, CrlfEncoder, FileStream, FilterDirection, FilterStream, IoStream,
    Ioctl, IoctlReply, MemoryStream, Ownership, Stream, StreamFlags, TranscriptLevel,
    XscriptStream,
};
use mailstream::{Client, SessionState};

fn contents(stream: &Stream) -> String {
    match stream.ioctl(Ioctl::GetTransport).unwrap() {
        IoctlReply::Bytes(b) => String::from_utf8(b).unwrap(),
        other => panic!("unexpected reply {:?}", other),
    }
}

fn session(script: &str) -> (Client, Stream) {
    let output = MemoryStream::create();
    let carrier = IoStream::create(
        MemoryStream::with_contents(script),
        output.clone(),
        Ownership::Borrowed,
    );
    let mut client = Client::new(carrier);
    client.connect().unwrap();
    (client, output)
}

#[test]
fn append_from_filtered_source() {
    // bare newlines become CRLF on the way out of the filter; the cache
    // makes the result seekable so its size can be announced
    let raw = MemoryStream::with_contents("Subject: x\n\nbody\n");
    let crlf = FilterStream::create(raw, CrlfEncoder::default(), FilterDirection::Decode, Ownership::Owned);
    let message = CacheStream::create(crlf, Ownership::Owned);

    let (mut client, output) = session(concat!(
        "* PREAUTH ready\r\n",
        "+ go\r\n",
        "A1 OK APPEND completed\r\n",
    ));
    assert_eq!(client.append("Drafts", &[], None, &message).unwrap(), None);
    assert_eq!(
        contents(&output),
        "A1 APPEND Drafts {20}\r\nSubject: x\r\n\r\nbody\r\n\r\n"
    );
}

#[test]
fn transcript_of_a_session() {
    let sink = MemoryStream::create();
    let output = MemoryStream::create();
    let wire = IoStream::create(
        MemoryStream::with_contents("* OK ready\r\nA1 OK welcome\r\nA2 OK done\r\n"),
        output.clone(),
        Ownership::Borrowed,
    );
    let traced = XscriptStream::with_sink(wire, Ownership::Owned, sink.clone());
    let mut client = Client::new(traced.clone());
    client.connect().unwrap();

    traced
        .ioctl(Ioctl::SetTranscriptLevel(TranscriptLevel::Secure))
        .unwrap();
    client.login("joe", "hunter2").unwrap();
    traced
        .ioctl(Ioctl::SetTranscriptLevel(TranscriptLevel::Normal))
        .unwrap();
    client.noop().unwrap();
    assert_eq!(client.state(), SessionState::Authenticated);

    let log = contents(&sink);
    assert_eq!(
        log,
        "S: * OK ready\nC: A1 LOGIN joe \"***\"\nS: A1 OK welcome\nC: A2 NOOP\nS: A2 OK done\n"
    );
    // the wire itself is untouched
    assert_eq!(contents(&output), "A1 LOGIN joe hunter2\r\nA2 NOOP\r\n");
}

#[test]
fn append_from_file() {
    let path = std::env::temp_dir().join(format!("mailstream-append-{}.eml", std::process::id()));
    let file = FileStream::create(&path).unwrap();
    file.write_all(b"Subject: from disk\r\n\r\nok\r\n").unwrap();
    file.close().unwrap();

    let message = FileStream::open(&path, StreamFlags::READ | StreamFlags::SEEK).unwrap();
    // the client rewinds before uploading
    message.seek(SeekFrom::Start(5)).unwrap();

    let (mut client, output) = session(concat!(
        "* PREAUTH ready\r\n",
        "+ go\r\n",
        "A1 OK [APPENDUID 9 12] done\r\n",
    ));
    let uid = client.append("INBOX", &[], None, &message).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(uid, Some(12));
    assert_eq!(
        contents(&output),
        "A1 APPEND INBOX {26}\r\nSubject: from disk\r\n\r\nok\r\n\r\n"
    );
}

#[test]
fn base64_decoding_source() {
    let encoded = MemoryStream::with_contents("aGVsbG8g\r\nd29ybGQ=\r\n");
    let decoded = FilterStream::create(
        encoded,
        Base64Decoder::default(),
        FilterDirection::Decode,
        Ownership::Owned,
    );
    let mut out = Vec::new();
    decoded.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"hello world");
}
