//! STOMP 1.2 text frames.
//!
//! Frames travel one per WebSocket text message: `COMMAND\nheader:value\n...\n\nbody\0`.
//! A message holding only end-of-line characters is a heart-beat.

use crate::domain::errors::{RealtimeError, RealtimeResult};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let cmd = match s {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            _ => return None,
        };
        Some(cmd)
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `key`; repeated headers keep their first occurrence
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame for a STOMP 1.2 broker
    pub fn connect(host: &str, heartbeat_ms: u64, authorization: Option<&str>) -> Self {
        let mut frame = StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", format!("{},0", heartbeat_ms));
        if let Some(token) = authorization {
            frame = frame.header("Authorization", format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send_json<T: Serialize>(destination: &str, payload: &T) -> RealtimeResult<Self> {
        let body = serde_json::to_string(payload)?;
        Ok(StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body))
    }

    pub fn disconnect(receipt: &str) -> Self {
        StompFrame::new(StompCommand::Disconnect).header("receipt", receipt)
    }

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
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame. `Ok(None)` means a heart-beat.
    pub fn parse(text: &str) -> RealtimeResult<Option<StompFrame>> {
        let trimmed = text.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() || trimmed == "\0" {
            return Ok(None);
        }

        let (head, rest) = split_head(trimmed)
            .ok_or_else(|| RealtimeError::Protocol("frame has no header terminator".to_string()))?;

        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command_line = lines.next().unwrap_or_default();
        let command = StompCommand::parse(command_line)
            .ok_or_else(|| RealtimeError::Protocol(format!("unknown command: {}", command_line)))?;

        let unescape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| RealtimeError::Protocol(format!("malformed header: {}", line)))?;
            if unescape {
                headers.push((unescape_header(key)?, unescape_header(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let frame = StompFrame {
            command,
            headers,
            body: String::new(),
        };
        let body = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len.trim().parse().map_err(|_| {
                    RealtimeError::Protocol(format!("invalid content-length: {}", len))
                })?;
                rest.get(..len)
                    .ok_or_else(|| RealtimeError::Protocol("body shorter than content-length".to_string()))?
                    .to_string()
            }
            None => match rest.find('\0') {
                Some(end) => rest[..end].to_string(),
                None => rest.to_string(),
            },
        };

        Ok(Some(StompFrame { body, ..frame }))
    }
}

/// Split at the first blank line (LF or CRLF) separating headers from body
fn split_head(text: &str) -> Option<(&str, &str)> {
    let mut start = 0;
    while let Some(offset) = text[start..].find('\n') {
        let end = start + offset;
        if matches!(&text[start..end], "" | "\r") {
            return Some((&text[..start], &text[end + 1..]));
        }
        start = end + 1;
    }
    None
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> RealtimeResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
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
            other => {
                return Err(RealtimeError::Protocol(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
