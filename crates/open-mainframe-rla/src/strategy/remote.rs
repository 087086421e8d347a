//! Remote strategy: DDM requests over a host server session.
//!
//! Files are addressed by an 8-byte declared name chosen at open time. Every
//! request carries the same option list, control list and record buffer the
//! native strategy passes in process, wrapped as DDM parameters:
//!
//! ```text
//! S38OPEN   DCLNAM S38UFCB                 -> S38OPNFB
//! S38GET    DCLNAM S38OPTL S38CTLL         -> S38BUF S38IOFB
//! S38GETD   DCLNAM S38OPTL S38CTLL         -> S38BUF S38IOFB
//! S38GETK   DCLNAM S38OPTL S38CTLL         -> S38BUF S38IOFB
//! S38PUTM   DCLNAM S38CTLL     + S38BUF    -> S38IOFB
//! S38UPDAT  DCLNAM S38OPTL S38CTLL + S38BUF -> S38IOFB
//! S38DEL    DCLNAM                         -> S38IOFB
//! S38FEOD   DCLNAM S38OPTL     + S38BUF(0) -> S38IOFB
//! S38CLOSE  DCLNAM                         -> (messages only)
//! S38CMIT / S38ROLB                        -> ENDUOWRM
//! S38CMD    S38CMDST                       -> (messages only)
//! ```
//!
//! Any reply may also carry `S38MSGRM` objects; an SVRCOD of ERROR or worse
//! marks the reply failed.

use std::sync::{Arc, Mutex, MutexGuard};

use open_mainframe_encoding::CodePage;

use crate::code_points::*;
use crate::codec::{
    check_record_length, encode_record_batch, IoFeedback, OpenFeedback, OperationCode, PositionType,
};
use crate::correlation::{CorrelationIds, DeclaredNames, DECLARED_NAME_LEN};
use crate::ddm::{DdmBuilder, DdmObject};
use crate::error::{RlaError, RlaResult};
use crate::framing::{exchange, Request};
use crate::message::{parse_message_reply, HostMessage};
use crate::record::{FieldValue, Record};
use crate::session::HostSession;
use crate::strategy::common::{build_ufcb, check_count, check_open_request, HostReply, OpenFile};
use crate::strategy::{Direction, Fetch, KeySearch, OpenRequest, RecordAccess};

type DeclaredName = [u8; DECLARED_NAME_LEN];

/// Fold the objects of one reply chain into a [`HostReply`].
pub fn parse_remote_reply(objects: &[DdmObject], page: &CodePage) -> RlaResult<HostReply> {
    let mut reply = HostReply::default();
    for obj in objects {
        match obj.code_point {
            S38MSGRM => {
                let (message, svrcod) = parse_message_reply(obj, page)?;
                if svrcod >= SVRCOD_ERROR {
                    reply.failed = true;
                }
                reply.messages.push(message);
            }
            S38IOFB => reply.io_feedback = Some(IoFeedback::parse(&obj.payload, page)?),
            S38OPNFB => reply.open_feedback = Some(OpenFeedback::parse(&obj.payload, page)?),
            S38BUF => reply.data.extend_from_slice(&obj.payload),
            ENDUOWRM => {}
            CMDCHKRM | PRCCNVRM | SYNTAXRM | CMDNSPRM | AGNPRMRM => {
                return Err(RlaError::Internal(format!(
                    "host rejected the request with {}",
                    name(obj.code_point)
                )));
            }
            other => {
                return Err(RlaError::Internal(format!(
                    "unexpected reply object {} (0x{:04X})",
                    name(other),
                    other
                )));
            }
        }
    }
    Ok(reply)
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared remote access state: the server session and the counters that
/// identify requests and files on it.
pub struct RemoteSystem {
    session: Mutex<Box<dyn HostSession>>,
    correlation: Arc<CorrelationIds>,
    names: Arc<DeclaredNames>,
    page: &'static CodePage,
    large_buffers: bool,
}

impl RemoteSystem {
    pub fn new(
        session: Box<dyn HostSession>,
        correlation: Arc<CorrelationIds>,
        names: Arc<DeclaredNames>,
        ccsid: u16,
        large_buffers: bool,
    ) -> RlaResult<Self> {
        Ok(Self {
            session: Mutex::new(session),
            correlation,
            names,
            page: CodePage::from_ccsid(ccsid)?,
            large_buffers,
        })
    }

    pub fn code_page(&self) -> &'static CodePage {
        self.page
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.session).is_connected()
    }

    pub fn disconnect(&self) {
        lock(&self.session).disconnect();
    }

    /// Send one request and collect its reply. The session is held for the
    /// whole exchange so replies cannot interleave.
    fn call(&self, request: &Request) -> RlaResult<HostReply> {
        let objects = {
            let mut session = lock(&self.session);
            exchange(&mut **session, &self.correlation, request, self.large_buffers)?.objects()?
        };
        parse_remote_reply(&objects, self.page)
    }

    /// Run a CL command outside any open file.
    pub fn execute_command(&self, command: &str) -> RlaResult<Vec<HostMessage>> {
        tracing::debug!(command, "remote command");
        let encoded = self.page.encode(command)?;
        let request = Request::new(DdmBuilder::new(S38CMD).add_param(S38CMDST, &encoded).build());
        Ok(self.call(&request)?.complete()?.messages)
    }

    pub fn commit(&self) -> RlaResult<()> {
        self.call(&Request::new(DdmObject::empty(S38CMIT)))?.complete()?;
        Ok(())
    }

    pub fn rollback(&self) -> RlaResult<()> {
        self.call(&Request::new(DdmObject::empty(S38ROLB)))?.complete()?;
        Ok(())
    }
}

struct RemoteOpenFile {
    name: DeclaredName,
    file: OpenFile,
}

/// One file opened through a server session.
pub struct RemoteFile {
    system: Arc<RemoteSystem>,
    open: Option<RemoteOpenFile>,
}

impl RemoteFile {
    pub fn new(system: Arc<RemoteSystem>) -> Self {
        Self { system, open: None }
    }

    /// Declared name of the open file.
    pub fn declared_name(&self) -> Option<DeclaredName> {
        self.open.as_ref().map(|o| o.name)
    }

    fn state(&self) -> RlaResult<(DeclaredName, &OpenFile)> {
        self.open
            .as_ref()
            .map(|o| (o.name, &o.file))
            .ok_or(RlaError::NotOpen)
    }

    /// Forget the declared name after a transport failure.
    fn guard<T>(&mut self, result: RlaResult<T>) -> RlaResult<T> {
        if let Err(ref e) = result {
            if e.is_retryable() {
                if let Some(open) = self.open.take() {
                    tracing::error!(
                        declared_name = %self.system.page.decode(&open.name).trim_end(),
                        error = %e,
                        "remote file lost"
                    );
                }
            }
        }
        result
    }

    fn get(&mut self, request: Request, screen: bool) -> RlaResult<Fetch> {
        let page = self.system.page;
        let result = (|| {
            let reply = self.system.call(&request)?;
            let (_, file) = self.state()?;
            file.fetch(reply, screen, page)
        })();
        self.guard(result)
    }

    fn simple(&mut self, request: Request) -> RlaResult<()> {
        let result = self.system.call(&request).and_then(HostReply::complete);
        self.guard(result).map(|_| ())
    }
}

fn file_command(code_point: u16, name: &DeclaredName) -> DdmBuilder {
    DdmBuilder::new(code_point).add_param(DCLNAM, name)
}

impl RecordAccess for RemoteFile {
    fn open(&mut self, request: OpenRequest) -> RlaResult<OpenFeedback> {
        if self.open.is_some() {
            return Err(RlaError::AlreadyOpen {
                path: request.path.to_string(),
            });
        }
        check_open_request(&request)?;
        let page = self.system.page;
        let ufcb = build_ufcb(&request).encode(page)?;
        let name = self.system.names.next(page)?;
        let command = file_command(S38OPEN, &name).add_param(S38UFCB, &ufcb).build();
        let reply = self.system.call(&Request::new(command))?.complete()?;
        let Some(feedback) = reply.open_feedback else {
            return Err(RlaError::Internal("open reply without open feedback".to_string()));
        };
        let file = match OpenFile::new(&request, feedback.clone()) {
            Ok(file) => file,
            Err(e) => {
                let close = Request::new(file_command(S38CLOSE, &name).build());
                if let Err(close_error) = self.system.call(&close).and_then(|reply| reply.complete()) {
                    tracing::warn!(
                        path = %request.path,
                        error = %close_error,
                        "could not close file after a rejected open"
                    );
                }
                return Err(e);
            }
        };
        tracing::debug!(
            path = %request.path,
            declared_name = %page.decode(&name).trim_end(),
            blocking = file.blocking_factor,
            "remote open"
        );
        self.open = Some(RemoteOpenFile { name, file });
        Ok(feedback)
    }

    fn close(&mut self) -> RlaResult<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let request = Request::new(file_command(S38CLOSE, &open.name).build());
        self.system.call(&request)?.complete()?;
        tracing::debug!(declared_name = %self.system.page.decode(&open.name).trim_end(), "remote close");
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
        let (name, file) = self.state()?;
        check_count(count, file)?;
        let optl = file.read_optl(direction.position_type(), OperationCode::Get);
        let ctll = file.read_ctll(count, self.system.page)?;
        let command = file_command(S38GET, &name)
            .add_param(S38OPTL, &optl)
            .add_param(S38CTLL, &ctll)
            .build();
        self.get(Request::new(command), true)
    }

    fn read_by_record_number(&mut self, record_number: u32, screen: bool) -> RlaResult<Fetch> {
        if record_number == 0 {
            return Err(RlaError::invalid("record_number", "record numbers start at 1"));
        }
        let (name, file) = self.state()?;
        let optl = file.read_optl(PositionType::RecordNumber, OperationCode::GetByRecordNumber);
        let ctll = file.record_number_ctll(record_number, self.system.page)?;
        let command = file_command(S38GETD, &name)
            .add_param(S38OPTL, &optl)
            .add_param(S38CTLL, &ctll)
            .build();
        self.get(Request::new(command), screen)
    }

    fn read_by_key(&mut self, key: &[FieldValue], search: KeySearch) -> RlaResult<Fetch> {
        let (name, file) = self.state()?;
        let optl = file.read_optl(search.position_type(), OperationCode::GetByKey);
        let ctll = file.key_ctll(key, self.system.page)?;
        let command = file_command(S38GETK, &name)
            .add_param(S38OPTL, &optl)
            .add_param(S38CTLL, &ctll)
            .build();
        self.get(Request::new(command), true)
    }

    fn update(&mut self, record: &Record) -> RlaResult<()> {
        let (name, file) = self.state()?;
        check_record_length(record, &file.feedback)?;
        let buffer = encode_record_batch(std::slice::from_ref(record), &file.feedback, self.system.page)?;
        let command = file_command(S38UPDAT, &name)
            .add_param(S38OPTL, &file.update_optl())
            .add_param(S38CTLL, &file.format_ctll(self.system.page)?)
            .build();
        self.simple(Request::new(command).with_data(DdmObject::new(S38BUF, buffer)))
    }

    fn delete_current(&mut self) -> RlaResult<()> {
        let (name, _) = self.state()?;
        self.simple(Request::new(file_command(S38DEL, &name).build()))
    }

    fn write(&mut self, records: &[Record]) -> RlaResult<()> {
        let (name, file) = self.state()?;
        for record in records {
            check_record_length(record, &file.feedback)?;
        }
        let page = self.system.page;
        let mut requests = Vec::new();
        for chunk in records.chunks(file.blocking_factor.max(1)) {
            let buffer = encode_record_batch(chunk, &file.feedback, page)?;
            let command = file_command(S38PUTM, &name)
                .add_param(S38CTLL, &file.put_ctll(chunk.len(), page)?)
                .build();
            requests.push(Request::new(command).with_data(DdmObject::new(S38BUF, buffer)));
        }
        for request in requests {
            self.simple(request)?;
        }
        Ok(())
    }

    fn position_before_first(&mut self) -> RlaResult<()> {
        let (name, file) = self.state()?;
        let command = file_command(S38FEOD, &name)
            .add_param(S38OPTL, &file.position_optl(PositionType::First))
            .build();
        self.simple(Request::new(command).with_data(DdmObject::empty(S38BUF)))
    }

    fn position_after_last(&mut self) -> RlaResult<()> {
        let (name, file) = self.state()?;
        let command = file_command(S38FEOD, &name)
            .add_param(S38OPTL, &file.position_optl(PositionType::Last))
            .build();
        self.simple(Request::new(command).with_data(DdmObject::empty(S38BUF)))
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
