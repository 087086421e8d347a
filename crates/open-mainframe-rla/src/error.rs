//! Record-level access error types.
//!
//! Every failure belongs to one [`ErrorKind`] so callers can tell a retryable
//! transport failure from a local validation error or a protocol mismatch.
//! Benign host conditions (end of file, record not found) never surface
//! here; they come back as [`Fetch::NoData`](crate::strategy::Fetch).

use miette::Diagnostic;
use thiserror::Error;

use open_mainframe_encoding::EncodingError;

use crate::message::HostMessage;

/// Broad category of an [`RlaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected on the client before anything was sent.
    Validation,
    /// The host ended the request with one or more error messages.
    Host,
    /// The session dropped or returned a frame of the wrong shape.
    Transport,
    /// Client and host disagree about the protocol.
    Internal,
}

/// Errors that can occur during record-level access.
#[derive(Error, Debug, Diagnostic)]
pub enum RlaError {
    /// A record's serialized length differs from the open file's record length.
    #[error("record length {actual} does not match the file record length {expected}")]
    #[diagnostic(code(rla::record_length_mismatch))]
    RecordLengthMismatch { expected: usize, actual: usize },

    /// A key value was null.
    #[error("key field '{field}' is null")]
    #[diagnostic(code(rla::null_key_field))]
    NullKeyField { field: String },

    /// A caller-supplied value is out of range or of the wrong type.
    #[error("invalid parameter {name}: {reason}")]
    #[diagnostic(code(rla::invalid_parameter))]
    InvalidParameter { name: String, reason: String },

    /// The operation needs an open file.
    #[error("file is not open")]
    #[diagnostic(code(rla::not_open), help("call open() first, or reopen after a dropped connection"))]
    NotOpen,

    /// The file is already open through this access object.
    #[error("file {path} is already open")]
    #[diagnostic(code(rla::already_open))]
    AlreadyOpen { path: String },

    /// The host rejected the request; all messages are kept in receipt order.
    #[error("host request failed: {}", summarize(.messages))]
    #[diagnostic(code(rla::host))]
    Host { messages: Vec<HostMessage> },

    /// The session went away mid-exchange. Host-side locks and handles are
    /// in an unknown state.
    #[error("connection to the host was dropped")]
    #[diagnostic(code(rla::connection_dropped))]
    ConnectionDropped,

    /// A reply frame did not have the expected shape.
    #[error("unexpected reply: {0}")]
    #[diagnostic(code(rla::unexpected_reply))]
    UnexpectedReply(String),

    /// Invalid DSS frame.
    #[error("invalid DSS frame: {0}")]
    #[diagnostic(code(rla::invalid_dss))]
    InvalidDss(String),

    /// Invalid DDM object.
    #[error("invalid DDM object: {0}")]
    #[diagnostic(code(rla::invalid_ddm))]
    InvalidDdm(String),

    /// Protocol mismatch that should never happen against a conforming host.
    #[error("internal error: {0}")]
    #[diagnostic(code(rla::internal))]
    Internal(String),

    /// Text or numeric conversion failed.
    #[error(transparent)]
    #[diagnostic(code(rla::encoding))]
    Encoding(#[from] EncodingError),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    #[diagnostic(code(rla::io))]
    Io(#[from] std::io::Error),
}

impl RlaError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RlaError::RecordLengthMismatch { .. }
            | RlaError::NullKeyField { .. }
            | RlaError::InvalidParameter { .. }
            | RlaError::NotOpen
            | RlaError::AlreadyOpen { .. }
            | RlaError::Encoding(_) => ErrorKind::Validation,
            RlaError::Host { .. } => ErrorKind::Host,
            RlaError::ConnectionDropped
            | RlaError::UnexpectedReply(_)
            | RlaError::InvalidDss(_)
            | RlaError::Io(_) => ErrorKind::Transport,
            RlaError::InvalidDdm(_) | RlaError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only transport failures are worth retrying, and only after reopening.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// The host messages carried by a [`RlaError::Host`] failure.
    pub fn messages(&self) -> &[HostMessage] {
        match self {
            RlaError::Host { messages } => messages,
            _ => &[],
        }
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        RlaError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

fn summarize(messages: &[HostMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{} (severity {}): {}", m.id, m.severity, m.text))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for record-level access operations.
pub type RlaResult<T> = Result<T, RlaError>;
