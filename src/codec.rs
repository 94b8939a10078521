//! Line codec and reply parsing for the ServerQuery text protocol.
//!
//! Replies are `\n\r` terminated lines. A command produces zero or more data
//! lines followed by a status line of the form `error id=0 msg=ok`. Data lines
//! hold `|`-separated records of space-separated `key=value` pairs.

use std::collections::HashMap;
use std::io;

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::models::{ChannelRecord, ClientRecord};

/// Ceiling for one reply line. A whole client or channel list arrives as a
/// single line, so this has to fit servers with thousands of entries.
pub const MAX_LINE_LEN: usize = 10 * 1024 * 1024;

/// Status id the server returns for an empty list.
pub const STATUS_EMPTY_RESULT: u32 = 1281;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong { actual: usize, limit: usize },
    #[error("invalid utf-8 in reply: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Reads trimmed reply lines and writes newline-terminated commands.
pub struct QueryCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
}

impl QueryCodec {
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for QueryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for QueryCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(CodecError::LineTooLong {
                        actual: src.len(),
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(CodecError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            // The server terminates with "\n\r", so the '\r' leads the next line.
            let text = String::from_utf8(line.to_vec())?;
            let trimmed = text.trim_matches(&['\r', '\n'][..]);
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        // Trailing '\r' of the last "\n\r" terminator.
        if src.iter().all(|b| *b == b'\r') {
            src.clear();
            self.next_index = 0;
            return Ok(None);
        }
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-line").into())
    }
}

impl Encoder<String> for QueryCodec {
    type Error = CodecError;

    fn encode(&mut self, cmd: String, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.reserve(cmd.len() + 1);
        dst.extend_from_slice(cmd.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

// ============================================================================
// Escaping
// ============================================================================

/// Escape a value for use in a command parameter.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str(r"\\"),
            '/' => out.push_str(r"\/"),
            ' ' => out.push_str(r"\s"),
            '|' => out.push_str(r"\p"),
            '\x07' => out.push_str(r"\a"),
            '\x08' => out.push_str(r"\b"),
            '\x0c' => out.push_str(r"\f"),
            '\n' => out.push_str(r"\n"),
            '\r' => out.push_str(r"\r"),
            '\t' => out.push_str(r"\t"),
            '\x0b' => out.push_str(r"\v"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape`]. Unknown escape sequences are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('s') => out.push(' '),
            Some('p') => out.push('|'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// Reply parsing
// ============================================================================

/// One `key=value` record. Bare keys map to an empty value.
pub type Record = HashMap<String, String>;

/// Parse a data line into its records.
pub fn parse_records(line: &str) -> Vec<Record> {
    line.split('|').map(parse_record).collect()
}

fn parse_record(entry: &str) -> Record {
    entry
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape(value)),
            None => (token.to_string(), String::new()),
        })
        .collect()
}

/// Status line terminating every reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: u32,
    pub msg: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.id == 0
    }

    pub fn is_empty_result(&self) -> bool {
        self.id == STATUS_EMPTY_RESULT
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error id={} msg={}", self.id, self.msg)
    }
}

/// Parse `error id=.. msg=..`; `None` if the line is not a status line.
pub fn parse_status(line: &str) -> Option<Status> {
    let rest = line.strip_prefix("error ")?;
    let record = parse_record(rest);
    let id = record.get("id")?.parse().ok()?;
    let msg = record.get("msg").cloned().unwrap_or_default();
    Some(Status { id, msg })
}

/// Asynchronous event lines interleaved with replies.
pub fn is_notification(line: &str) -> bool {
    line.starts_with("notify")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for field {field}")]
    Invalid { field: &'static str, value: String },
}

fn required<'a>(record: &'a Record, field: &'static str) -> Result<&'a str, FieldError> {
    record
        .get(field)
        .map(String::as_str)
        .ok_or(FieldError::Missing(field))
}

fn number<T: std::str::FromStr>(record: &Record, field: &'static str) -> Result<T, FieldError> {
    let value = required(record, field)?;
    value.parse().map_err(|_| FieldError::Invalid {
        field,
        value: value.to_string(),
    })
}

/// Voice flags are reported as "0"/"1" and only with `-voice`.
fn flag(record: &Record, field: &'static str) -> Result<Option<bool>, FieldError> {
    match record.get(field).map(String::as_str) {
        None => Ok(None),
        Some("1") => Ok(Some(true)),
        Some("0") => Ok(Some(false)),
        Some(other) => Err(FieldError::Invalid {
            field,
            value: other.to_string(),
        }),
    }
}

pub fn channel_record(record: &Record) -> Result<ChannelRecord, FieldError> {
    Ok(ChannelRecord {
        id: number(record, "cid")?,
        name: required(record, "channel_name")?.to_string(),
        parent_id: number(record, "pid")?,
    })
}

pub fn client_record(record: &Record) -> Result<ClientRecord, FieldError> {
    Ok(ClientRecord {
        id: number(record, "clid")?,
        nickname: required(record, "client_nickname")?.to_string(),
        channel_id: number(record, "cid")?,
        client_type: number(record, "client_type")?,
        input_muted: flag(record, "client_input_muted")?,
        output_muted: flag(record, "client_output_muted")?,
    })
}
