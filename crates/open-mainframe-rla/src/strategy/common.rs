//! Request building and reply resolution shared by both strategies.

use std::sync::Arc;

use open_mainframe_encoding::CodePage;

use crate::codec::{
    decode_record_batch, encode_control_list, encode_key, encode_option_list, ControlEntry,
    DataPresence, IoFeedback, OpenFeedback, OperationCode, PositionType, ShareMode, Ufcb,
};
use crate::config::{effective_blocking_factor, OpenType};
use crate::error::{RlaError, RlaResult};
use crate::message::{classify, HostMessage, Outcome};
use crate::record::{FieldValue, RecordFormat};
use crate::strategy::{Fetch, OpenRequest};

use crate::codec::feedback::RECORD_TRAILER_LEN;

/// A host reply after transport framing is stripped.
#[derive(Debug, Default)]
pub struct HostReply {
    pub messages: Vec<HostMessage>,
    pub failed: bool,
    pub io_feedback: Option<IoFeedback>,
    pub open_feedback: Option<OpenFeedback>,
    pub data: Vec<u8>,
}

impl HostReply {
    /// Apply message classification.
    pub fn outcome(self, screen: bool) -> RlaResult<(Outcome, Self)> {
        let Self {
            messages,
            failed,
            io_feedback,
            open_feedback,
            data,
        } = self;
        let kept = messages.clone();
        let outcome = classify(messages, failed, screen)?;
        Ok((
            outcome,
            Self {
                messages: kept,
                failed,
                io_feedback,
                open_feedback,
                data,
            },
        ))
    }

    /// Succeed or fail, with no benign screening.
    pub fn complete(self) -> RlaResult<Self> {
        Ok(self.outcome(false)?.1)
    }
}

/// State of a file while it is open.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub format: Arc<RecordFormat>,
    pub feedback: OpenFeedback,
    pub open_type: OpenType,
    pub blocking_factor: usize,
}

impl OpenFile {
    pub fn new(request: &OpenRequest, feedback: OpenFeedback) -> RlaResult<Self> {
        if request.format.record_length() != feedback.record_length() {
            return Err(RlaError::RecordLengthMismatch {
                expected: feedback.record_length(),
                actual: request.format.record_length(),
            });
        }
        if request.format.field_count() != feedback.field_count() {
            return Err(RlaError::invalid(
                "format",
                format!(
                    "{} has {} fields, the host file has {}",
                    request.format.name,
                    request.format.field_count(),
                    feedback.field_count()
                ),
            ));
        }
        let blocking_factor = if feedback.blocking_factor() > 0 {
            feedback.blocking_factor() as usize
        } else {
            effective_blocking_factor(request.blocking_factor, feedback.record_increment())
        };
        Ok(Self {
            format: Arc::clone(&request.format),
            feedback,
            open_type: request.open_type,
            blocking_factor,
        })
    }

    /// Share mode for reads: read-only files never lock, others take an
    /// update lock released by the next operation.
    pub fn read_share(&self) -> ShareMode {
        match self.open_type {
            OpenType::ReadOnly => ShareMode::ReadReleased,
            _ => ShareMode::UpdateReleased,
        }
    }

    pub fn read_optl(&self, position: PositionType, operation: OperationCode) -> [u8; 4] {
        encode_option_list(position, self.read_share(), DataPresence::RecordData, operation)
    }

    pub fn update_optl(&self) -> [u8; 4] {
        encode_option_list(
            PositionType::Same,
            ShareMode::UpdateReleased,
            DataPresence::RecordData,
            OperationCode::Update,
        )
    }

    pub fn position_optl(&self, position: PositionType) -> [u8; 4] {
        encode_option_list(
            position,
            ShareMode::ReadReleased,
            DataPresence::FeedbackOnly,
            OperationCode::Get,
        )
    }

    pub fn read_ctll(&self, count: usize, page: &CodePage) -> RlaResult<Vec<u8>> {
        encode_control_list(
            &[
                ControlEntry::RecordFormat(self.format.name.clone()),
                ControlEntry::RecordCount(count as u32),
            ],
            page,
        )
    }

    pub fn record_number_ctll(&self, record_number: u32, page: &CodePage) -> RlaResult<Vec<u8>> {
        encode_control_list(
            &[
                ControlEntry::RecordFormat(self.format.name.clone()),
                ControlEntry::RecordNumber(record_number),
                ControlEntry::RecordCount(1),
            ],
            page,
        )
    }

    pub fn key_ctll(&self, key: &[FieldValue], page: &'static CodePage) -> RlaResult<Vec<u8>> {
        let encoded = encode_key(&self.format, key, page, true)?;
        encode_control_list(
            &[
                ControlEntry::RecordFormat(self.format.name.clone()),
                ControlEntry::KeyFieldCount(encoded.field_count as u32),
                ControlEntry::Key(encoded.bytes),
                ControlEntry::RecordCount(1),
            ],
            page,
        )
    }

    pub fn format_ctll(&self, page: &CodePage) -> RlaResult<Vec<u8>> {
        encode_control_list(&[ControlEntry::RecordFormat(self.format.name.clone())], page)
    }

    pub fn put_ctll(&self, count: usize, page: &CodePage) -> RlaResult<Vec<u8>> {
        encode_control_list(
            &[
                ControlEntry::RecordFormat(self.format.name.clone()),
                ControlEntry::RecordCount(count as u32),
            ],
            page,
        )
    }

    /// Turn a data reply into records.
    pub fn fetch(&self, reply: HostReply, screen: bool, page: &'static CodePage) -> RlaResult<Fetch> {
        let (outcome, reply) = reply.outcome(screen)?;
        if outcome == Outcome::NoData {
            return Ok(Fetch::NoData);
        }
        let io = reply.io_feedback.ok_or_else(|| {
            RlaError::Internal("data reply without I/O feedback".to_string())
        })?;
        if io.records_transferred == 0 {
            return Ok(Fetch::NoData);
        }
        let records = decode_record_batch(&reply.data, &io, &self.feedback, &self.format, page)?;
        Ok(Fetch::Records(records))
    }
}

/// Build the open control block for a request.
pub(crate) fn build_ufcb(request: &OpenRequest) -> Ufcb {
    let format = &request.format;
    let mut increment = format.record_length() + RECORD_TRAILER_LEN;
    if format.is_null_capable() {
        increment += format.field_count();
    }
    Ufcb {
        path: request.path.clone(),
        open_type: request.open_type,
        commit_lock_level: request.commit_lock_level,
        blocking_factor: effective_blocking_factor(request.blocking_factor, increment) as u16,
        format_name: format.name.clone(),
        null_capable: format.is_null_capable(),
    }
}

/// Validate a request before any host traffic.
pub(crate) fn check_open_request(request: &OpenRequest) -> RlaResult<()> {
    if request.format.fields.is_empty() {
        return Err(RlaError::invalid("format", "record format has no fields"));
    }
    if request.format.record_length() > u16::MAX as usize {
        return Err(RlaError::invalid(
            "format",
            format!("record length {} is too large", request.format.record_length()),
        ));
    }
    Ok(())
}

/// `count` must be 1..=blocking factor.
pub(crate) fn check_count(count: usize, open: &OpenFile) -> RlaResult<()> {
    if count == 0 || count > open.blocking_factor {
        return Err(RlaError::invalid(
            "count",
            format!("{} is outside 1..={}", count, open.blocking_factor),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitLockLevel;
    use crate::error::ErrorKind;
    use crate::path::QsysPath;
    use crate::record::FieldDescription;
    use open_mainframe_encoding::CP037;

    fn request() -> OpenRequest {
        OpenRequest {
            path: QsysPath::new("QGPL", "F", "*FIRST").unwrap(),
            format: Arc::new(RecordFormat::new("R").field(FieldDescription::character("A", 100))),
            open_type: OpenType::ReadOnly,
            blocking_factor: 0,
            commit_lock_level: CommitLockLevel::None,
        }
    }

    #[test]
    fn test_blocking_from_feedback() {
        let req = request();
        let fb = OpenFeedback::for_format(&req.path, &req.format, 0, 7);
        assert_eq!(OpenFile::new(&req, fb).unwrap().blocking_factor, 7);
        let fb = OpenFeedback::for_format(&req.path, &req.format, 0, 0);
        assert_eq!(OpenFile::new(&req, fb).unwrap().blocking_factor, 32768 / 106);
    }

    #[test]
    fn test_field_count_must_match() {
        let req = request();
        let host = RecordFormat::new("R")
            .field(FieldDescription::character("A", 50).nullable())
            .field(FieldDescription::character("B", 50).nullable());
        let fb = OpenFeedback::for_format(&req.path, &host, 0, 1);
        assert_eq!(fb.record_length(), req.format.record_length());
        let err = OpenFile::new(&req, fb).unwrap_err();
        assert!(matches!(err, RlaError::InvalidParameter { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_ufcb_blocking() {
        assert_eq!(build_ufcb(&request()).blocking_factor, (32768 / 106) as u16);
    }

    #[test]
    fn test_failed_reply_without_messages() {
        let reply = HostReply {
            failed: true,
            ..Default::default()
        };
        assert!(matches!(reply.complete(), Err(RlaError::Internal(_))));
    }

    #[test]
    fn test_read_share() {
        let req = request();
        let fb = OpenFeedback::for_format(&req.path, &req.format, 0, 1);
        let open = OpenFile::new(&req, fb).unwrap();
        assert_eq!(open.read_optl(PositionType::Next, OperationCode::Get), [0x03, 0x00, 0x10, 0x01]);
        assert_eq!(open.position_optl(PositionType::Last), [0x02, 0x00, 0x11, 0x01]);
        assert_eq!(open.read_ctll(5, &CP037).unwrap().len(), 13 + 7 + 1);
    }
}
