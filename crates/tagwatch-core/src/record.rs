//! Event records and their CSV line encoding.

use core::fmt::{self, Write};

use heapless::String;

use crate::{
    clock::{DATE_BYTES, DateTime, TIME_BYTES},
    config::{LOGGER_ID_MAX_BYTES, OPERATOR_ID_LEN, SITE_ID_LEN},
    frame::{TAG_TEXT_BYTES, TagText},
    session::SessionIdentity,
};

pub const LOG_HEADER: &str = "date, time, siteID, event, tag_ID, loggerID, operatorID";
pub const LINE_ENDING: &str = "\r\n";
/// Worst case: every quoted character doubled.
pub const RECORD_LINE_BYTES: usize = DATE_BYTES
    + TIME_BYTES
    + 2 * (SITE_ID_LEN + TAG_TEXT_BYTES + LOGGER_ID_MAX_BYTES)
    + OPERATOR_ID_LEN
    + 1 // event digit
    + 6 // quotes
    + 6 // separators
    + LINE_ENDING.len();

const FIELD_COUNT: usize = 7;
const FIELD_BYTES: usize = TAG_TEXT_BYTES;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventCode {
    /// Logger powered up and opened its file.
    SessionStart = 0,
    /// Presence switch activated, window opened.
    WindowOpen = 1,
    /// First accepted tag in the window.
    FirstRead = 2,
    /// Any later accepted tag in the same window.
    RepeatRead = 3,
    /// Window timed out with the switch released.
    WindowClose = 4,
}

impl EventCode {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::SessionStart),
            1 => Some(Self::WindowOpen),
            2 => Some(Self::FirstRead),
            3 => Some(Self::RepeatRead),
            4 => Some(Self::WindowClose),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogRecord {
    pub date: String<DATE_BYTES>,
    pub time: String<TIME_BYTES>,
    pub site_id: String<SITE_ID_LEN>,
    pub event: EventCode,
    pub tag_id: TagText,
    pub logger_id: String<LOGGER_ID_MAX_BYTES>,
    pub operator_id: String<OPERATOR_ID_LEN>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordParseError {
    FieldCount,
    UnterminatedQuote,
    FieldTooLong,
    BadEvent,
}

/// Append-only sink for records. Each append must be durable on return.
pub trait EventLog {
    type Error: core::fmt::Debug;

    fn append(&mut self, record: &LogRecord) -> Result<(), Self::Error>;
}

impl LogRecord {
    pub fn new(at: &DateTime, identity: &SessionIdentity, event: EventCode, tag_id: &str) -> Self {
        Self {
            date: at.date_string(),
            time: at.time_string(),
            site_id: bounded(identity.site_id()),
            event,
            tag_id: bounded(tag_id),
            logger_id: bounded(identity.logger_id()),
            operator_id: bounded(identity.operator_id()),
        }
    }

    /// Writes the record as one CSV line, including the line ending.
    pub fn write_line<W: Write>(&self, out: &mut W) -> fmt::Result {
        write!(out, "{},{},", self.date, self.time)?;
        write_quoted(out, &self.site_id)?;
        write!(out, ",{},", self.event.as_u8())?;
        write_quoted(out, &self.tag_id)?;
        out.write_char(',')?;
        write_quoted(out, &self.logger_id)?;
        write!(out, ",{}{}", self.operator_id, LINE_ENDING)
    }

    pub fn to_line(&self) -> String<RECORD_LINE_BYTES> {
        let mut line = String::new();
        // Capacity covers the worst case, so this cannot fail.
        let _ = self.write_line(&mut line);
        line
    }

    /// Parses a line produced by [`LogRecord::write_line`].
    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut fields: [String<FIELD_BYTES>; FIELD_COUNT] = Default::default();

        for (index, field) in fields.iter_mut().enumerate() {
            let (value, tail) = next_field(rest)?;
            *field = value;
            match tail {
                Some(tail) => rest = tail,
                None if index == FIELD_COUNT - 1 => rest = "",
                None => return Err(RecordParseError::FieldCount),
            }
        }
        if !rest.is_empty() {
            return Err(RecordParseError::FieldCount);
        }

        let [date, time, site_id, event, tag_id, logger_id, operator_id] = fields;
        let event = event
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(EventCode::from_u8)
            .ok_or(RecordParseError::BadEvent)?;

        Ok(Self {
            date: exact(&date)?,
            time: exact(&time)?,
            site_id: exact(&site_id)?,
            event,
            tag_id: exact(&tag_id)?,
            logger_id: exact(&logger_id)?,
            operator_id: exact(&operator_id)?,
        })
    }
}

fn write_quoted<W: Write>(out: &mut W, value: &str) -> fmt::Result {
    out.write_char('"')?;
    for ch in value.chars() {
        if ch == '"' {
            out.write_char('"')?;
        }
        out.write_char(ch)?;
    }
    out.write_char('"')
}

/// Splits one field off the front of `input`. The tail is `None` when this
/// was the last field on the line.
fn next_field(input: &str) -> Result<(String<FIELD_BYTES>, Option<&str>), RecordParseError> {
    let mut value = String::new();

    let Some(quoted) = input.strip_prefix('"') else {
        let (field, tail) = match input.split_once(',') {
            Some((field, tail)) => (field, Some(tail)),
            None => (input, None),
        };
        value
            .push_str(field)
            .map_err(|_| RecordParseError::FieldTooLong)?;
        return Ok((value, tail));
    };

    let mut chars = quoted.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if ch != '"' {
            value.push(ch).map_err(|_| RecordParseError::FieldTooLong)?;
            continue;
        }
        if chars.peek().is_some_and(|&(_, next)| next == '"') {
            chars.next();
            value.push('"').map_err(|_| RecordParseError::FieldTooLong)?;
            continue;
        }

        let after = &quoted[index + 1..];
        return match after.strip_prefix(',') {
            Some(tail) => Ok((value, Some(tail))),
            None if after.is_empty() => Ok((value, None)),
            None => Err(RecordParseError::FieldCount),
        };
    }

    Err(RecordParseError::UnterminatedQuote)
}

fn exact<const N: usize>(value: &str) -> Result<String<N>, RecordParseError> {
    let mut out = String::new();
    out.push_str(value)
        .map_err(|_| RecordParseError::FieldTooLong)?;
    Ok(out)
}

fn bounded<const N: usize>(value: &str) -> String<N> {
    let mut out = String::new();
    for ch in value.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
