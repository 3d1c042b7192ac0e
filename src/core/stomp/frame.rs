//! STOMP 1.2 text frame codec.
//!
//! Frames are `COMMAND\n` + `key:value\n` headers + `\n` + body + NUL.
//! A bare EOL between frames is a heart-beat. The decoder is incremental
//! so transports that deliver partial frames (XHR polling) can feed it
//! chunk by chunk.

use crate::domain::config::DEFAULT_MAX_FRAME_BYTES;
use thiserror::Error;

/// STOMP commands, client and server side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame codec errors
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("malformed header line '{0}'")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header '{0}'")]
    InvalidEscape(String),
    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),
    #[error("frame body not terminated by NUL")]
    MissingNul,
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
}

impl From<FrameError> for crate::domain::error::LiveError {
    fn from(err: FrameError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// One STOMP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins when a header is repeated
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// Serialize to wire text, adding `content-length` for non-empty bodies
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (key, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Item produced by the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Heartbeat,
    Frame(Frame),
}

/// Incremental decoder; holds any trailing partial frame between feeds
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: String,
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that rejects any frame, or unfinished remainder, above `max_frame_bytes`
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_frame_bytes,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Append `chunk` and return every complete item it finishes.
    ///
    /// On error the buffer is discarded so one corrupt frame cannot wedge
    /// the stream.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<Incoming>, FrameError> {
        self.buffer.push_str(chunk);
        let mut items = Vec::new();

        loop {
            if self.buffer.starts_with("\r\n") {
                self.buffer.drain(..2);
                items.push(Incoming::Heartbeat);
                continue;
            }
            if self.buffer.starts_with('\n') {
                self.buffer.drain(..1);
                items.push(Incoming::Heartbeat);
                continue;
            }
            if self.buffer.is_empty() {
                break;
            }

            match parse_frame(&self.buffer, self.max_frame_bytes) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.drain(..consumed);
                    items.push(Incoming::Frame(frame));
                }
                Ok(None) if self.buffer.len() > self.max_frame_bytes => {
                    self.buffer.clear();
                    return Err(FrameError::FrameTooLarge {
                        limit: self.max_frame_bytes,
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    return Err(e);
                }
            }
        }

        Ok(items)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Parse one frame from the start of `buf`; `Ok(None)` when incomplete
fn parse_frame(buf: &str, max_frame_bytes: usize) -> Result<Option<(Frame, usize)>, FrameError> {
    let mut pos = 0;
    let mut command: Option<Command> = None;
    let mut headers = Vec::new();

    let body_start = loop {
        let Some(offset) = buf[pos..].find('\n') else {
            return Ok(None);
        };
        let end = pos + offset;
        let line = buf[pos..end].strip_suffix('\r').unwrap_or(&buf[pos..end]);
        pos = end + 1;

        match command {
            None => {
                command = Some(
                    Command::parse(line).ok_or_else(|| FrameError::UnknownCommand(line.to_string()))?,
                );
            }
            Some(_) if line.is_empty() => break pos,
            Some(cmd) => {
                let (key, value) = line
                    .split_once(':')
                    .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
                if cmd.escapes_headers() {
                    headers.push((unescape_header(key)?, unescape_header(value)?));
                } else {
                    headers.push((key.to_string(), value.to_string()));
                }
            }
        }
    };

    // Loop above only breaks after the command line was read
    let Some(command) = command else {
        return Ok(None);
    };

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    let (body, consumed) = match content_length {
        Some(len) => {
            let body_end = body_start
                .checked_add(len)
                .ok_or_else(|| FrameError::InvalidContentLength(len.to_string()))?;
            if body_end >= max_frame_bytes {
                return Err(FrameError::FrameTooLarge {
                    limit: max_frame_bytes,
                });
            }
            if buf.len() <= body_end {
                return Ok(None);
            }
            if buf.as_bytes()[body_end] != 0 {
                return Err(FrameError::MissingNul);
            }
            let body = buf
                .get(body_start..body_end)
                .ok_or_else(|| FrameError::InvalidContentLength(len.to_string()))?;
            (body.to_string(), body_end + 1)
        }
        None => match buf[body_start..].find('\0') {
            Some(offset) => {
                let body_end = body_start + offset;
                (buf[body_start..body_end].to_string(), body_end + 1)
            }
            None => return Ok(None),
        },
    };

    Ok(Some((
        Frame {
            command,
            headers,
            body,
        },
        consumed,
    )))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn message(destination: &str, body: &str) -> Frame {
        Frame::new(Command::Message)
            .with_header("destination", destination)
            .with_header("subscription", "sub-0")
            .with_header("message-id", "1")
            .with_body(body)
    }

    #[test]
    fn test_encode_adds_content_length() {
        let encoded = Frame::new(Command::Send)
            .with_header("destination", "/app/ping")
            .with_body("{}")
            .encode();
        assert_eq!(encoded, "SEND\ndestination:/app/ping\ncontent-length:2\n\n{}\0");
    }

    #[test]
    fn test_connect_headers_are_not_escaped() {
        let encoded = Frame::new(Command::Connect)
            .with_header("host", "a:b")
            .encode();
        assert!(encoded.contains("host:a:b\n"));
    }

    #[test]
    fn test_decode_message_frame() {
        let mut decoder = FrameDecoder::new();
        let items = decoder
            .feed("MESSAGE\ndestination:/topic/a\nsubscription:sub-0\n\n{\"x\":1}\0")
            .unwrap();
        assert_eq!(items.len(), 1);
        let Incoming::Frame(frame) = &items[0] else {
            panic!("expected frame");
        };
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.destination(), Some("/topic/a"));
        assert_eq!(frame.body, "{\"x\":1}");
    }

    #[test]
    fn test_heartbeats_between_frames() {
        let mut decoder = FrameDecoder::new();
        let items = decoder.feed("\n\r\nRECEIPT\nreceipt-id:7\n\n\0\n").unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Incoming::Heartbeat);
        assert_eq!(items[1], Incoming::Heartbeat);
        assert!(matches!(items[2], Incoming::Frame(ref f) if f.header("receipt-id") == Some("7")));
        assert_eq!(items[3], Incoming::Heartbeat);
    }

    #[test]
    fn test_partial_frame_is_buffered() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed("MESSAGE\ndestination:/topic/a\n").unwrap().is_empty());
        assert!(decoder.pending_len() > 0);
        let items = decoder.feed("\nhello\0").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_content_length_allows_nul_in_body() {
        let mut decoder = FrameDecoder::new();
        let items = decoder
            .feed("MESSAGE\ndestination:/t\ncontent-length:3\n\na\0b\0")
            .unwrap();
        let Incoming::Frame(frame) = &items[0] else {
            panic!("expected frame");
        };
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_header_escaping() {
        let frame = message("/topic/a:b", "x");
        let mut decoder = FrameDecoder::new();
        let items = decoder.feed(&frame.encode()).unwrap();
        let Incoming::Frame(decoded) = &items[0] else {
            panic!("expected frame");
        };
        assert_eq!(decoded.destination(), Some("/topic/a:b"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let frame = Frame::new(Command::Message)
            .with_header("foo", "first")
            .with_header("foo", "second");
        assert_eq!(frame.header("foo"), Some("first"));
    }

    #[test]
    fn test_unknown_command_resets_buffer() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed("HELLO\n\n\0").unwrap_err();
        assert_eq!(err, FrameError::UnknownCommand("HELLO".to_string()));
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.feed("RECEIPT\n\n\0").unwrap().len(), 1);
    }

    #[test]
    fn test_bad_content_length() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed("MESSAGE\ncontent-length:abc\n\n\0").unwrap_err();
        assert!(matches!(err, FrameError::InvalidContentLength(_)));
    }

    #[test]
    fn test_content_length_overflow_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let err = decoder
            .feed("MESSAGE\ndestination:/t\ncontent-length:18446744073709551615\n\n{}\0")
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidContentLength(_) | FrameError::FrameTooLarge { .. }
        ));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_oversized_content_length_does_not_stall_stream() {
        let mut decoder = FrameDecoder::new();
        let err = decoder
            .feed("MESSAGE\ndestination:/t\ncontent-length:999999999\n\n{}")
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::FrameTooLarge {
                limit: DEFAULT_MAX_FRAME_BYTES
            }
        );
        assert_eq!(decoder.pending_len(), 0);

        let items = decoder.feed(&message("/t", "ok").encode()).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_unterminated_frame_past_limit_is_dropped() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(64);
        assert!(decoder.feed("MESSAGE\ndestination:/t\n\n").unwrap().is_empty());
        let err = decoder.feed(&"x".repeat(100)).unwrap_err();
        assert_eq!(err, FrameError::FrameTooLarge { limit: 64 });
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.feed("RECEIPT\n\n\0").unwrap().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_split_feed_matches_whole(body in "[a-zA-Z0-9 {}:,\"]{0,64}", split in 0usize..200) {
            let encoded = message("/topic/dashboard/sessions", &body).encode();
            let split = split.min(encoded.len());
            let (a, b) = encoded.split_at(split);

            let mut decoder = FrameDecoder::new();
            let mut items = decoder.feed(a).unwrap();
            items.extend(decoder.feed(b).unwrap());

            prop_assert_eq!(items.len(), 1);
            match &items[0] {
                Incoming::Frame(frame) => prop_assert_eq!(&frame.body, &body),
                Incoming::Heartbeat => prop_assert!(false, "unexpected heartbeat"),
            }
        }
    }
}
