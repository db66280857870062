//! Minimal STOMP 1.2 frame codec for the push channel.
//!
//! Frames travel as WebSocket text messages, one frame per message:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```
//!
//! Bare EOLs between frames are heart-beats and decode to `None`.

use std::fmt;

/// STOMP frame command.
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
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    /// `CONNECT` and `CONNECTED` headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from decoding a STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StompError {
    #[error("unknown STOMP command: {0}")]
    UnknownCommand(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    #[error("frame is not terminated")]
    Unterminated,
    #[error("content-length {declared} does not fit a body of {available} bytes")]
    ContentLength { declared: usize, available: usize },
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header. Repeated names are kept; lookups return the first.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Encodes the frame, adding `content-length` for non-empty bodies.
    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decodes one frame. Returns `Ok(None)` for a heart-beat.
    ///
    /// # Errors
    ///
    /// Returns `StompError` for unknown commands, malformed or badly escaped
    /// headers, a missing NUL terminator, or an inconsistent `content-length`.
    pub fn decode(input: &str) -> Result<Option<Self>, StompError> {
        let rest = input.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(None);
        }

        let (command_line, mut cursor) = next_line(rest).ok_or(StompError::Unterminated)?;
        let command = Command::parse(command_line)
            .ok_or_else(|| StompError::UnknownCommand(command_line.to_string()))?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, after) = next_line(cursor).ok_or(StompError::Unterminated)?;
            cursor = after;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let declared = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());

        let body = match declared {
            Some(len) => cursor.get(..len).ok_or(StompError::ContentLength {
                declared: len,
                available: cursor.len(),
            })?,
            None => {
                let end = cursor.find('\0').ok_or(StompError::Unterminated)?;
                &cursor[..end]
            }
        };

        Ok(Some(Self {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

fn next_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = &input[..idx];
    let line = line.strip_suffix('\r').unwrap_or(line);
    Some((line, &input[idx + 1..]))
}

fn push_header_part(out: &mut String, part: &str, escape: bool) {
    if !escape {
        out.push_str(part);
        return;
    }
    for c in part.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Client frames used by the push channel
// ---------------------------------------------------------------------------

/// `CONNECT` frame with heart-beats disabled and an optional bearer credential.
#[must_use]
pub fn connect_frame(authorization: Option<&str>) -> Frame {
    let frame = Frame::new(Command::Connect)
        .header("accept-version", "1.2,1.1,1.0")
        .header("heart-beat", "0,0");
    match authorization {
        Some(value) => frame.header("Authorization", value),
        None => frame,
    }
}

#[must_use]
pub fn subscribe_frame(id: &str, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

#[must_use]
pub fn disconnect_frame() -> Frame {
    Frame::new(Command::Disconnect)
}
