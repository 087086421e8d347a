//! Host message feedback.
//!
//! Nearly every host reply carries zero or more messages. The native call
//! interface returns them as a message feedback block at the front of its
//! reply buffer; the DDM server sends one `S38MSGRM` object per message.
//!
//! Message feedback block (all integers big-endian):
//!
//! ```text
//! Offset  Len  Field
//! 0       2    Messages-occurred flag (0 = none, 1 = present)
//! 2       2    Message count
//! 4       ...  Entries, back to back:
//!              0   2  Severity (0-99)
//!              2   2  Type (two EBCDIC digits)
//!              4   7  Message ID (EBCDIC)
//!              11  1  Reserved
//!              12  2  Text length in bytes
//!              14  n  Text (EBCDIC)
//! ```
//!
//! The text length is always explicit; entries are never fixed-size slots.

use bytes::{Buf, BufMut, BytesMut};
use open_mainframe_encoding::CodePage;

use crate::code_points::*;
use crate::ddm::DdmObject;
use crate::error::{RlaError, RlaResult};

/// Message ID the host uses for "end of file".
pub const MSG_END_OF_FILE: &str = "CPF5001";
/// Message ID the host uses for "record not found".
pub const MSG_RECORD_NOT_FOUND: &str = "CPF5006";

/// Severity at and above which a message ends the request.
pub const ESCAPE_SEVERITY: u8 = 30;

const ENTRY_FIXED_LEN: usize = 14;
const MESSAGE_ID_LEN: usize = 7;

/// Host message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Completion,
    Diagnostic,
    Informational,
    Inquiry,
    Escape,
    Other(u8),
}

impl MessageType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => MessageType::Completion,
            2 => MessageType::Diagnostic,
            4 => MessageType::Informational,
            5 => MessageType::Inquiry,
            15 => MessageType::Escape,
            other => MessageType::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MessageType::Completion => 1,
            MessageType::Diagnostic => 2,
            MessageType::Informational => 4,
            MessageType::Inquiry => 5,
            MessageType::Escape => 15,
            MessageType::Other(code) => code,
        }
    }
}

/// A decoded host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMessage {
    /// Seven-character identifier, e.g. `CPF5001`.
    pub id: String,
    /// First-level message text.
    pub text: String,
    /// Severity, 0 to 99.
    pub severity: u8,
    pub message_type: MessageType,
}

impl HostMessage {
    pub fn new(id: &str, text: &str, severity: u8, message_type: MessageType) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            severity,
            message_type,
        }
    }

    /// End of file or record not found.
    pub fn is_benign(&self) -> bool {
        self.id == MSG_END_OF_FILE || self.id == MSG_RECORD_NOT_FOUND
    }
}

fn type_digits(page: &CodePage, bytes: &[u8]) -> u8 {
    let text = page.decode(bytes);
    text.trim().parse().unwrap_or(0)
}

/// Decode a message feedback block. Returns the messages and the number of
/// bytes the block occupied.
pub fn parse_feedback_block(data: &[u8], page: &CodePage) -> RlaResult<(Vec<HostMessage>, usize)> {
    let mut cursor = data;
    if cursor.remaining() < 2 {
        return Err(RlaError::UnexpectedReply(
            "message feedback block truncated".to_string(),
        ));
    }
    if cursor.get_u16() == 0 {
        return Ok((Vec::new(), 2));
    }
    if cursor.remaining() < 2 {
        return Err(RlaError::UnexpectedReply(
            "message count missing".to_string(),
        ));
    }
    let count = cursor.get_u16() as usize;
    let mut messages = Vec::with_capacity(count);
    for index in 0..count {
        if cursor.remaining() < ENTRY_FIXED_LEN {
            return Err(RlaError::UnexpectedReply(format!(
                "message entry {} truncated",
                index
            )));
        }
        let severity = cursor.get_u16();
        let message_type = MessageType::from_code(type_digits(page, &cursor[..2]));
        cursor.advance(2);
        let id = page.decode(&cursor[..MESSAGE_ID_LEN]);
        cursor.advance(MESSAGE_ID_LEN + 1);
        let text_len = cursor.get_u16() as usize;
        if cursor.remaining() < text_len {
            return Err(RlaError::UnexpectedReply(format!(
                "message {} text length {} exceeds block",
                id, text_len
            )));
        }
        let text = page.decode(&cursor[..text_len]).trim_end().to_string();
        cursor.advance(text_len);
        messages.push(HostMessage {
            id: id.trim_end().to_string(),
            text,
            severity: severity.min(99) as u8,
            message_type,
        });
    }
    Ok((messages, data.len() - cursor.remaining()))
}

/// Encode messages as a feedback block, the inverse of
/// [`parse_feedback_block`].
pub fn encode_feedback_block(messages: &[HostMessage], page: &CodePage) -> RlaResult<Vec<u8>> {
    let mut buf = BytesMut::new();
    if messages.is_empty() {
        buf.put_u16(0);
        return Ok(buf.to_vec());
    }
    buf.put_u16(1);
    buf.put_u16(messages.len() as u16);
    for message in messages {
        buf.put_u16(message.severity as u16);
        buf.extend_from_slice(&page.encode(&format!("{:02}", message.message_type.code()))?);
        buf.extend_from_slice(&page.encode_padded(&message.id, MESSAGE_ID_LEN)?);
        buf.put_u8(0);
        let text = page.encode(&message.text)?;
        buf.put_u16(text.len() as u16);
        buf.extend_from_slice(&text);
    }
    Ok(buf.to_vec())
}

/// Decode an `S38MSGRM` reply object. Returns the message and its SVRCOD.
pub fn parse_message_reply(obj: &DdmObject, page: &CodePage) -> RlaResult<(HostMessage, u16)> {
    let svrcod = obj.get_u16_param(SVRCOD)?.unwrap_or(SVRCOD_ERROR);
    let id = obj
        .get_raw_param(S38MSGID)?
        .map(|b| page.decode(&b).trim_end().to_string())
        .unwrap_or_default();
    let message_type = obj
        .get_raw_param(S38MTYPE)?
        .map(|b| MessageType::from_code(type_digits(page, &b)))
        .unwrap_or(MessageType::Other(0));
    let severity = obj.get_u16_param(S38MSEV)?.unwrap_or(0).min(99) as u8;
    let text = obj
        .get_raw_param(S38MTEXT)?
        .map(|b| page.decode(&b).trim_end().to_string())
        .unwrap_or_default();
    Ok((
        HostMessage {
            id,
            text,
            severity,
            message_type,
        },
        svrcod,
    ))
}

/// How a reply's messages resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request completed.
    Completed,
    /// End of file or record not found; the caller gets no data.
    NoData,
}

/// Decide what a reply means.
///
/// A successful reply logs its messages and completes. A failed reply is
/// benign when `screen_benign` is set, it carries an end-of-file or
/// not-found message, and nothing else reaches escape severity. Any other
/// failure is a host error with all messages kept in order; a failure with
/// no messages at all is an internal error.
pub fn classify(messages: Vec<HostMessage>, failed: bool, screen_benign: bool) -> RlaResult<Outcome> {
    if !failed {
        for message in &messages {
            tracing::warn!(
                id = %message.id,
                severity = message.severity,
                "host message: {}",
                message.text
            );
        }
        return Ok(Outcome::Completed);
    }
    if messages.is_empty() {
        return Err(RlaError::Internal(
            "host reported failure without any messages".to_string(),
        ));
    }
    if screen_benign
        && messages.iter().any(HostMessage::is_benign)
        && messages
            .iter()
            .filter(|m| !m.is_benign())
            .all(|m| m.severity < ESCAPE_SEVERITY)
    {
        tracing::debug!(id = %messages[0].id, "benign host condition");
        return Ok(Outcome::NoData);
    }
    Err(RlaError::Host { messages })
}
