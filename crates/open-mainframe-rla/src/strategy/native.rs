//! Native strategy: in-process calls into the host's file service routines.
//!
//! Every call takes pre-built byte arrays and returns one reply buffer:
//!
//! ```text
//! Offset  Len  Field
//! 0       n    Message feedback block (see crate::message)
//! n       2    Return code (0 = success)
//! n+2     2    Feedback area length (0 when absent)
//! n+4     m    Feedback area: I/O feedback, or open feedback for an open
//! n+4+m   ...  Record data
//! ```
//!
//! The service's handle table is process-global on the host side and is
//! not reinitialized between client processes, so opens are serialized
//! under one lock, closes under another, and the table must be reset once at
//! start-up. Ad hoc commands are serialized separately from file I/O.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Buf, BufMut, BytesMut};
use open_mainframe_encoding::CodePage;

use crate::codec::{
    check_record_length, encode_record_batch, IoFeedback, OpenFeedback, OperationCode, PositionType,
};
use crate::error::{RlaError, RlaResult};
use crate::message::{encode_feedback_block, parse_feedback_block, HostMessage};
use crate::record::{FieldValue, Record};
use crate::strategy::common::{build_ufcb, check_count, check_open_request, HostReply, OpenFile};
use crate::strategy::{Direction, Fetch, KeySearch, OpenRequest, RecordAccess};

/// Handle returned by the service's open.
pub struct NativeOpen {
    /// File handle; 0 when the open failed.
    pub handle: u32,
    /// Reply buffer carrying open feedback.
    pub reply: Vec<u8>,
}

/// The host's file service routines.
pub trait NativeService: Send + Sync {
    fn open(&self, ufcb: &[u8]) -> RlaResult<NativeOpen>;
    fn close(&self, handle: u32) -> RlaResult<Vec<u8>>;
    fn commit(&self) -> RlaResult<Vec<u8>>;
    fn rollback(&self) -> RlaResult<Vec<u8>>;
    fn execute_command(&self, command: &[u8]) -> RlaResult<Vec<u8>>;
    /// Sequential get. With `screen`, end of file comes back as a message
    /// the client treats as "no data".
    fn get(&self, handle: u32, optl: &[u8], ctll: &[u8], screen: bool) -> RlaResult<Vec<u8>>;
    fn get_by_record_number(&self, handle: u32, optl: &[u8], ctll: &[u8], screen: bool) -> RlaResult<Vec<u8>>;
    fn get_by_key(&self, handle: u32, optl: &[u8], ctll: &[u8], screen: bool) -> RlaResult<Vec<u8>>;
    fn put(&self, handle: u32, ctll: &[u8], buffer: &[u8]) -> RlaResult<Vec<u8>>;
    fn update(&self, handle: u32, optl: &[u8], ctll: &[u8], buffer: &[u8]) -> RlaResult<Vec<u8>>;
    fn delete_current(&self, handle: u32) -> RlaResult<Vec<u8>>;
    fn force_end_of_data(&self, handle: u32, optl: &[u8]) -> RlaResult<Vec<u8>>;
}

/// Which feedback area a reply carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackArea {
    Io,
    Open,
}

/// Parse a native reply buffer.
pub fn parse_native_reply(bytes: &[u8], area: FeedbackArea, page: &CodePage) -> RlaResult<HostReply> {
    let (messages, used) = parse_feedback_block(bytes, page)?;
    let mut cursor = &bytes[used..];
    if cursor.remaining() < 4 {
        return Err(RlaError::UnexpectedReply(
            "native reply missing return code".to_string(),
        ));
    }
    let return_code = cursor.get_u16();
    let feedback_len = cursor.get_u16() as usize;
    if cursor.remaining() < feedback_len {
        return Err(RlaError::UnexpectedReply(format!(
            "feedback area of {} bytes exceeds reply",
            feedback_len
        )));
    }
    let mut reply = HostReply {
        messages,
        failed: return_code != 0,
        ..Default::default()
    };
    if feedback_len > 0 {
        let area_bytes = &cursor[..feedback_len];
        match area {
            FeedbackArea::Io => reply.io_feedback = Some(IoFeedback::parse(area_bytes, page)?),
            FeedbackArea::Open => reply.open_feedback = Some(OpenFeedback::parse(area_bytes, page)?),
        }
    }
    reply.data = cursor[feedback_len..].to_vec();
    Ok(reply)
}

/// Build a native reply buffer, the inverse of [`parse_native_reply`].
pub fn encode_native_reply(
    messages: &[HostMessage],
    failed: bool,
    feedback: &[u8],
    data: &[u8],
    page: &CodePage,
) -> RlaResult<Vec<u8>> {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode_feedback_block(messages, page)?);
    buf.put_u16(u16::from(failed));
    buf.put_u16(feedback.len() as u16);
    buf.extend_from_slice(feedback);
    buf.extend_from_slice(data);
    Ok(buf.to_vec())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Client-side registry of handles the service has handed out. Handles are
/// unique across the whole service, so every connection bound to one service
/// should share one table.
#[derive(Debug, Default)]
pub struct HandleTable {
    open_lock: Mutex<()>,
    close_lock: Mutex<()>,
    allocated: Mutex<BTreeSet<u32>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every handle. Call when the service starts afresh, as at
    /// process start.
    pub fn reset(&self) {
        let _open = lock(&self.open_lock);
        let _close = lock(&self.close_lock);
        lock(&self.allocated).clear();
    }

    /// Handles currently open, in ascending order.
    pub fn allocated(&self) -> Vec<u32> {
        lock(&self.allocated).iter().copied().collect()
    }

    fn open_with<F>(&self, open: F) -> RlaResult<(u32, HostReply)>
    where
        F: FnOnce() -> RlaResult<(u32, HostReply)>,
    {
        let _guard = lock(&self.open_lock);
        let (handle, reply) = open()?;
        if reply.failed {
            return Ok((handle, reply));
        }
        if handle == 0 {
            return Err(RlaError::Internal("open succeeded without a handle".to_string()));
        }
        if !lock(&self.allocated).insert(handle) {
            return Err(RlaError::Internal(format!(
                "service returned handle {} which is already open",
                handle
            )));
        }
        Ok((handle, reply))
    }

    fn close_with<F>(&self, handle: u32, close: F) -> RlaResult<Vec<u8>>
    where
        F: FnOnce() -> RlaResult<Vec<u8>>,
    {
        let _guard = lock(&self.close_lock);
        let result = close();
        lock(&self.allocated).remove(&handle);
        result
    }

    fn release(&self, handle: u32) {
        lock(&self.allocated).remove(&handle);
    }
}

/// Shared native access state: the service binding, its handle table and
/// the command lock.
pub struct NativeSystem {
    service: Arc<dyn NativeService>,
    handles: Arc<HandleTable>,
    command_lock: Mutex<()>,
    page: &'static CodePage,
}

impl NativeSystem {
    /// Bind `service` with a handle table of its own.
    pub fn new(service: Arc<dyn NativeService>, ccsid: u16) -> RlaResult<Self> {
        Self::with_handles(service, ccsid, Arc::new(HandleTable::new()))
    }

    /// Bind `service` with a handle table shared with other systems bound
    /// to the same service. Opens and closes are serialized across all of
    /// them.
    pub fn with_handles(service: Arc<dyn NativeService>, ccsid: u16, handles: Arc<HandleTable>) -> RlaResult<Self> {
        Ok(Self {
            service,
            handles,
            command_lock: Mutex::new(()),
            page: CodePage::from_ccsid(ccsid)?,
        })
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    pub fn code_page(&self) -> &'static CodePage {
        self.page
    }

    /// Run a CL command outside any open file.
    pub fn execute_command(&self, command: &str) -> RlaResult<Vec<HostMessage>> {
        let encoded = self.page.encode(command)?;
        let bytes = {
            let _guard = lock(&self.command_lock);
            tracing::debug!(command, "native command");
            self.service.execute_command(&encoded)?
        };
        let reply = parse_native_reply(&bytes, FeedbackArea::Io, self.page)?.complete()?;
        Ok(reply.messages)
    }

    pub fn commit(&self) -> RlaResult<()> {
        let bytes = self.service.commit()?;
        parse_native_reply(&bytes, FeedbackArea::Io, self.page)?.complete()?;
        Ok(())
    }

    pub fn rollback(&self) -> RlaResult<()> {
        let bytes = self.service.rollback()?;
        parse_native_reply(&bytes, FeedbackArea::Io, self.page)?.complete()?;
        Ok(())
    }
}

struct NativeOpenFile {
    handle: u32,
    file: OpenFile,
}

/// One file opened through the native service.
pub struct NativeFile {
    system: Arc<NativeSystem>,
    open: Option<NativeOpenFile>,
}

impl NativeFile {
    pub fn new(system: Arc<NativeSystem>) -> Self {
        Self { system, open: None }
    }

    /// Handle of the open file.
    pub fn handle(&self) -> Option<u32> {
        self.open.as_ref().map(|o| o.handle)
    }

    fn state(&self) -> RlaResult<(u32, &OpenFile)> {
        self.open
            .as_ref()
            .map(|o| (o.handle, &o.file))
            .ok_or(RlaError::NotOpen)
    }

    /// Drop local state after a transport failure.
    fn guard<T>(&mut self, result: RlaResult<T>) -> RlaResult<T> {
        if let Err(ref e) = result {
            if e.is_retryable() {
                if let Some(open) = self.open.take() {
                    tracing::error!(handle = open.handle, error = %e, "native file lost");
                    self.system.handles.release(open.handle);
                }
            }
        }
        result
    }

    fn io_reply(&self, bytes: RlaResult<Vec<u8>>) -> RlaResult<HostReply> {
        parse_native_reply(&bytes?, FeedbackArea::Io, self.system.page)
    }

    fn get(&mut self, operation: OperationCode, optl: [u8; 4], ctll: Vec<u8>, screen: bool) -> RlaResult<Fetch> {
        let page = self.system.page;
        let result = (|| {
            let (handle, file) = self.state()?;
            let service = &self.system.service;
            let bytes = match operation {
                OperationCode::GetByRecordNumber => service.get_by_record_number(handle, &optl, &ctll, screen),
                OperationCode::GetByKey => service.get_by_key(handle, &optl, &ctll, screen),
                _ => service.get(handle, &optl, &ctll, screen),
            };
            file.fetch(self.io_reply(bytes)?, screen, page)
        })();
        self.guard(result)
    }

    fn simple(&mut self, call: impl FnOnce(&dyn NativeService, u32) -> RlaResult<Vec<u8>>) -> RlaResult<()> {
        let result = (|| {
            let (handle, _) = self.state()?;
            let bytes = call(self.system.service.as_ref(), handle);
            self.io_reply(bytes)?.complete()?;
            Ok(())
        })();
        self.guard(result)
    }
}

impl RecordAccess for NativeFile {
    fn open(&mut self, request: OpenRequest) -> RlaResult<OpenFeedback> {
        if self.open.is_some() {
            return Err(RlaError::AlreadyOpen {
                path: request.path.to_string(),
            });
        }
        check_open_request(&request)?;
        let page = self.system.page;
        let ufcb = build_ufcb(&request).encode(page)?;
        let service = Arc::clone(&self.system.service);
        let (handle, reply) = self.system.handles.open_with(|| {
            let opened = service.open(&ufcb)?;
            let reply = parse_native_reply(&opened.reply, FeedbackArea::Open, page)?;
            Ok((opened.handle, reply))
        })?;
        let reply = match reply.complete() {
            Ok(reply) => reply,
            Err(e) => {
                self.system.handles.release(handle);
                return Err(e);
            }
        };
        let Some(feedback) = reply.open_feedback else {
            self.system.handles.release(handle);
            return Err(RlaError::Internal("open reply without open feedback".to_string()));
        };
        let file = match OpenFile::new(&request, feedback.clone()) {
            Ok(file) => file,
            Err(e) => {
                // Leave nothing open on the host for a format we cannot use.
                let closed = self
                    .system
                    .handles
                    .close_with(handle, || service.close(handle))
                    .and_then(|bytes| parse_native_reply(&bytes, FeedbackArea::Io, page)?.complete());
                if let Err(close_error) = closed {
                    tracing::warn!(
                        path = %request.path,
                        handle,
                        error = %close_error,
                        "could not close file after a rejected open"
                    );
                }
                return Err(e);
            }
        };
        tracing::debug!(path = %request.path, handle, blocking = file.blocking_factor, "native open");
        self.open = Some(NativeOpenFile { handle, file });
        Ok(feedback)
    }

    fn close(&mut self) -> RlaResult<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let service = Arc::clone(&self.system.service);
        let bytes = self
            .system
            .handles
            .close_with(open.handle, || service.close(open.handle))?;
        parse_native_reply(&bytes, FeedbackArea::Io, self.system.page)?.complete()?;
        tracing::debug!(handle = open.handle, "native close");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn open_feedback(&self) -> Option<&OpenFeedback> {
        self.open.as_ref().map(|o| &o.file.feedback)
    }

    fn blocking_factor(&self) -> usize {
        self.open.as_ref().map_or(0, |o| o.file.blocking_factor)
    }

    fn read(&mut self, direction: Direction, count: usize) -> RlaResult<Fetch> {
        let (_, file) = self.state()?;
        check_count(count, file)?;
        let optl = file.read_optl(direction.position_type(), OperationCode::Get);
        let ctll = file.read_ctll(count, self.system.page)?;
        self.get(OperationCode::Get, optl, ctll, true)
    }

    fn read_by_record_number(&mut self, record_number: u32, screen: bool) -> RlaResult<Fetch> {
        if record_number == 0 {
            return Err(RlaError::invalid("record_number", "record numbers start at 1"));
        }
        let (_, file) = self.state()?;
        let optl = file.read_optl(PositionType::RecordNumber, OperationCode::GetByRecordNumber);
        let ctll = file.record_number_ctll(record_number, self.system.page)?;
        self.get(OperationCode::GetByRecordNumber, optl, ctll, screen)
    }

    fn read_by_key(&mut self, key: &[FieldValue], search: KeySearch) -> RlaResult<Fetch> {
        let (_, file) = self.state()?;
        let optl = file.read_optl(search.position_type(), OperationCode::GetByKey);
        let ctll = file.key_ctll(key, self.system.page)?;
        self.get(OperationCode::GetByKey, optl, ctll, true)
    }

    fn update(&mut self, record: &Record) -> RlaResult<()> {
        let (_, file) = self.state()?;
        check_record_length(record, &file.feedback)?;
        let buffer = encode_record_batch(std::slice::from_ref(record), &file.feedback, self.system.page)?;
        let optl = file.update_optl();
        let ctll = file.format_ctll(self.system.page)?;
        self.simple(|service, handle| service.update(handle, &optl, &ctll, &buffer))
    }

    fn delete_current(&mut self) -> RlaResult<()> {
        self.simple(|service, handle| service.delete_current(handle))
    }

    fn write(&mut self, records: &[Record]) -> RlaResult<()> {
        let (_, file) = self.state()?;
        for record in records {
            check_record_length(record, &file.feedback)?;
        }
        let page = self.system.page;
        let mut batches = Vec::new();
        for chunk in records.chunks(file.blocking_factor.max(1)) {
            let buffer = encode_record_batch(chunk, &file.feedback, page)?;
            batches.push((file.put_ctll(chunk.len(), page)?, buffer));
        }
        for (ctll, buffer) in batches {
            self.simple(|service, handle| service.put(handle, &ctll, &buffer))?;
        }
        Ok(())
    }

    fn position_before_first(&mut self) -> RlaResult<()> {
        let (_, file) = self.state()?;
        let optl = file.position_optl(PositionType::First);
        self.simple(|service, handle| service.force_end_of_data(handle, &optl))
    }

    fn position_after_last(&mut self) -> RlaResult<()> {
        let (_, file) = self.state()?;
        let optl = file.position_optl(PositionType::Last);
        self.simple(|service, handle| service.force_end_of_data(handle, &optl))
    }

    fn commit(&mut self) -> RlaResult<()> {
        let result = self.system.commit();
        self.guard(result)
    }

    fn rollback(&mut self) -> RlaResult<()> {
        let result = self.system.rollback();
        self.guard(result)
    }

    fn execute_command(&mut self, command: &str) -> RlaResult<Vec<HostMessage>> {
        let result = self.system.execute_command(command);
        self.guard(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use open_mainframe_encoding::CP037;

    #[test]
    fn test_native_reply_layout() {
        let io = IoFeedback {
            records_transferred: 1,
            last_record_number: 5,
            format_name: "R".into(),
        }
        .encode(&CP037)
        .unwrap();
        let bytes = encode_native_reply(&[], false, &io, &[1, 2, 3], &CP037).unwrap();
        assert_eq!(&bytes[..6], &[0, 0, 0, 0, 0, 20]);
        let reply = parse_native_reply(&bytes, FeedbackArea::Io, &CP037).unwrap();
        assert!(!reply.failed);
        assert_eq!(reply.io_feedback.unwrap().last_record_number, 5);
        assert_eq!(reply.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_native_reply_failure() {
        let msg = HostMessage::new("CPF5001", "End of file.", 0, MessageType::Escape);
        let bytes = encode_native_reply(&[msg], true, &[], &[], &CP037).unwrap();
        let reply = parse_native_reply(&bytes, FeedbackArea::Io, &CP037).unwrap();
        assert!(reply.failed);
        assert_eq!(reply.messages[0].id, "CPF5001");
        assert!(reply.io_feedback.is_none());
    }

    #[test]
    fn test_native_reply_truncated() {
        assert!(parse_native_reply(&[0, 0, 0], FeedbackArea::Io, &CP037).is_err());
        assert!(parse_native_reply(&[0, 0, 0, 0, 0, 9], FeedbackArea::Io, &CP037).is_err());
    }

    #[test]
    fn test_handle_table() {
        let table = HandleTable::new();
        let ok = || Ok((7, HostReply::default()));
        table.open_with(ok).unwrap();
        assert_eq!(table.allocated(), vec![7]);
        let err = table.open_with(ok).unwrap_err();
        assert!(matches!(err, RlaError::Internal(_)));
        table.close_with(7, || Ok(Vec::new())).unwrap();
        assert!(table.allocated().is_empty());
        table.open_with(ok).unwrap();
        table.reset();
        assert!(table.allocated().is_empty());
    }

    #[test]
    fn test_shared_table_rejects_handle_held_elsewhere() {
        let table = Arc::new(HandleTable::new());
        let other = Arc::clone(&table);
        table.open_with(|| Ok((3, HostReply::default()))).unwrap();
        let err = other.open_with(|| Ok((3, HostReply::default()))).unwrap_err();
        assert!(matches!(err, RlaError::Internal(_)));
        other.open_with(|| Ok((4, HostReply::default()))).unwrap();
        assert_eq!(table.allocated(), vec![3, 4]);
    }

    #[test]
    fn test_handle_zero_is_internal() {
        let table = HandleTable::new();
        let err = table.open_with(|| Ok((0, HostReply::default()))).unwrap_err();
        assert!(matches!(err, RlaError::Internal(_)));
    }
}
