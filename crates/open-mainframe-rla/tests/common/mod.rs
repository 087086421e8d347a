//! In-memory host shared by the integration tests.
//!
//! One physical file lives in [`HostState`]. [`SimService`] serves it through
//! the native call interface and [`SimSession`] through DDM frames. Both
//! record every call so tests can count round trips and buffer sizes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use open_mainframe_encoding::CP037;
use open_mainframe_rla::code_points::*;
use open_mainframe_rla::codec::{decode_record_batch, encode_key, encode_record_batch, IoFeedback, OpenFeedback, Ufcb};
use open_mainframe_rla::ddm::{parse_ddm_list, DdmBuilder, DdmObject};
use open_mainframe_rla::dss::DssSegment;
use open_mainframe_rla::strategy::{encode_native_reply, NativeOpen, NativeService};
use open_mainframe_rla::{
    AccessConfig, FieldDescription, HostConnection, HostMessage, HostSession, MessageType, QsysPath, Record,
    RecordFormat, RlaError, RlaResult, Strategy,
};

pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Item master: keyed on SKU, one null-capable column.
pub fn item_format() -> Arc<RecordFormat> {
    Arc::new(
        RecordFormat::new("ITEMREC")
            .field(FieldDescription::character("SKU", 6))
            .field(FieldDescription::varchar("DESCR", 20))
            .field(FieldDescription::binary("QTY", 4))
            .field(FieldDescription::packed("PRICE", 7, 2).nullable())
            .key("SKU"),
    )
}

pub fn item(format: &Arc<RecordFormat>, sku: &str, qty: i64) -> Record {
    let mut record = Record::new(Arc::clone(format));
    record.set_by_name("SKU", sku).unwrap();
    record.set_by_name("DESCR", format!("Item {}", sku)).unwrap();
    record.set_by_name("QTY", qty).unwrap();
    record.set_null(3).unwrap();
    record
}

pub fn items_path() -> QsysPath {
    QsysPath::new("INV", "ITEMS", "*FIRST").unwrap()
}

pub fn end_of_file() -> HostMessage {
    HostMessage::new("CPF5001", "End of file detected for file ITEMS in INV.", 0, MessageType::Escape)
}

pub fn not_found() -> HostMessage {
    HostMessage::new("CPF5006", "Record not found for member ITEMS.", 30, MessageType::Escape)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pos {
    BeforeFirst,
    On(usize),
    /// Between `i - 1` and `i`, after a delete.
    Gap(usize),
    AfterLast,
}

/// A decoded request, whichever way it arrived.
#[derive(Debug)]
enum Op {
    Open(Vec<u8>),
    Close,
    Get { optl: Vec<u8>, ctll: Vec<u8> },
    GetByRecordNumber { ctll: Vec<u8> },
    GetByKey { optl: Vec<u8>, ctll: Vec<u8> },
    Put { ctll: Vec<u8>, buffer: Vec<u8> },
    Update { buffer: Vec<u8> },
    Delete,
    ForceEndOfData { optl: Vec<u8> },
    Commit,
    Rollback,
    Command(String),
}

#[derive(Debug, Default)]
struct SimReply {
    messages: Vec<HostMessage>,
    failed: bool,
    io: Option<IoFeedback>,
    open: Option<OpenFeedback>,
    data: Vec<u8>,
    end_of_unit: bool,
}

impl SimReply {
    fn failure(messages: Vec<HostMessage>) -> Self {
        Self {
            messages,
            failed: true,
            ..Default::default()
        }
    }
}

fn ctll_entry(ctll: &[u8], id: u8) -> Option<Vec<u8>> {
    let mut rest = ctll;
    while rest.len() >= 3 && rest[0] != 0xFF {
        let len = u16::from_be_bytes([rest[1], rest[2]]) as usize;
        if rest[0] == id {
            return Some(rest[3..3 + len].to_vec());
        }
        rest = &rest[3 + len..];
    }
    None
}

fn ctll_u32(ctll: &[u8], id: u8) -> Option<u32> {
    ctll_entry(ctll, id).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// The host side: one file, its cursor and a log of everything asked of it.
pub struct HostState {
    pub format: Arc<RecordFormat>,
    pub records: Vec<Record>,
    next_rrn: u32,
    pos: Pos,
    feedback: Option<OpenFeedback>,
    /// Blocking factor the host reports at open; 0 leaves it to the client.
    pub feedback_blocking: u16,
    pub calls: Vec<&'static str>,
    pub put_sizes: Vec<usize>,
    pub commands: Vec<String>,
    pub declared_names: Vec<Vec<u8>>,
    pub frames_per_request: Vec<usize>,
    pub correlation_ids: Vec<u16>,
    /// The next request fails with these messages.
    pub fail_next: Option<Vec<HostMessage>>,
    /// The next request loses the connection.
    pub drop_next: bool,
    /// Closes fail with these messages.
    pub fail_close: Option<Vec<HostMessage>>,
    next_handle: u32,
}

impl HostState {
    pub fn new(format: Arc<RecordFormat>) -> Self {
        Self {
            format,
            records: Vec::new(),
            next_rrn: 1,
            pos: Pos::BeforeFirst,
            feedback: None,
            feedback_blocking: 0,
            calls: Vec::new(),
            put_sizes: Vec::new(),
            commands: Vec::new(),
            declared_names: Vec::new(),
            frames_per_request: Vec::new(),
            correlation_ids: Vec::new(),
            fail_next: None,
            drop_next: false,
            fail_close: None,
            next_handle: 1,
        }
    }

    pub fn insert(&mut self, mut record: Record) {
        record.record_number = self.next_rrn;
        self.next_rrn += 1;
        self.records.push(record);
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.put_sizes.clear();
        self.commands.clear();
    }

    fn feedback(&self) -> RlaResult<&OpenFeedback> {
        self.feedback
            .as_ref()
            .ok_or_else(|| RlaError::Internal("simulated file is not open".to_string()))
    }

    fn handle(&mut self, op: Op) -> RlaResult<SimReply> {
        if self.drop_next {
            self.drop_next = false;
            return Err(RlaError::ConnectionDropped);
        }
        self.calls.push(match op {
            Op::Open(_) => "open",
            Op::Close => "close",
            Op::Get { .. } => "get",
            Op::GetByRecordNumber { .. } => "getd",
            Op::GetByKey { .. } => "getk",
            Op::Put { .. } => "put",
            Op::Update { .. } => "update",
            Op::Delete => "delete",
            Op::ForceEndOfData { .. } => "feod",
            Op::Commit => "commit",
            Op::Rollback => "rollback",
            Op::Command(_) => "command",
        });
        if let Some(messages) = self.fail_next.take() {
            return Ok(SimReply::failure(messages));
        }
        if let (Op::Close, Some(messages)) = (&op, &self.fail_close) {
            return Ok(SimReply::failure(messages.clone()));
        }
        match op {
            Op::Open(ufcb) => self.open(&ufcb),
            Op::Close => {
                self.feedback = None;
                Ok(SimReply {
                    io: Some(IoFeedback::default()),
                    ..Default::default()
                })
            }
            Op::Get { optl, ctll } => self.get(&optl, &ctll),
            Op::GetByRecordNumber { ctll } => self.get_by_record_number(&ctll),
            Op::GetByKey { optl, ctll } => self.get_by_key(&optl, &ctll),
            Op::Put { ctll, buffer } => self.put(&ctll, &buffer),
            Op::Update { buffer } => self.update(&buffer),
            Op::Delete => self.delete(),
            Op::ForceEndOfData { optl } => {
                self.pos = if optl[0] == 0x01 { Pos::BeforeFirst } else { Pos::AfterLast };
                Ok(SimReply {
                    io: Some(IoFeedback::default()),
                    ..Default::default()
                })
            }
            Op::Commit | Op::Rollback => Ok(SimReply {
                end_of_unit: true,
                ..Default::default()
            }),
            Op::Command(text) => {
                let failed = text.starts_with("FAIL");
                self.commands.push(text);
                if failed {
                    return Ok(SimReply::failure(vec![HostMessage::new(
                        "CPD0030",
                        "Command not found.",
                        30,
                        MessageType::Diagnostic,
                    )]));
                }
                Ok(SimReply {
                    messages: vec![HostMessage::new("CPC2102", "Command completed.", 0, MessageType::Completion)],
                    ..Default::default()
                })
            }
        }
    }

    fn open(&mut self, ufcb: &[u8]) -> RlaResult<SimReply> {
        let ufcb = Ufcb::parse(ufcb, &CP037)?;
        let feedback = OpenFeedback::for_format(
            &ufcb.path,
            &self.format,
            self.records.len() as u32,
            self.feedback_blocking,
        );
        self.feedback = Some(feedback.clone());
        self.pos = Pos::BeforeFirst;
        Ok(SimReply {
            open: Some(feedback),
            ..Default::default()
        })
    }

    fn step_forward(&mut self) -> Option<usize> {
        let next = match self.pos {
            Pos::BeforeFirst => 0,
            Pos::On(i) => i + 1,
            Pos::Gap(i) => i,
            Pos::AfterLast => return None,
        };
        if next < self.records.len() {
            self.pos = Pos::On(next);
            Some(next)
        } else {
            self.pos = Pos::AfterLast;
            None
        }
    }

    fn step_backward(&mut self) -> Option<usize> {
        let previous = match self.pos {
            Pos::BeforeFirst => None,
            Pos::On(i) | Pos::Gap(i) => i.checked_sub(1),
            Pos::AfterLast => self.records.len().checked_sub(1),
        };
        match previous {
            Some(i) => {
                self.pos = Pos::On(i);
                Some(i)
            }
            None => {
                self.pos = Pos::BeforeFirst;
                None
            }
        }
    }

    fn data_reply(&self, picked: &[usize], missing: HostMessage) -> RlaResult<SimReply> {
        if picked.is_empty() {
            return Ok(SimReply::failure(vec![missing]));
        }
        let records: Vec<Record> = picked.iter().map(|&i| self.records[i].clone()).collect();
        let data = encode_record_batch(&records, self.feedback()?, &CP037)?;
        Ok(SimReply {
            io: Some(IoFeedback {
                records_transferred: records.len() as u32,
                last_record_number: records[records.len() - 1].record_number,
                format_name: self.format.name.clone(),
            }),
            data,
            ..Default::default()
        })
    }

    fn get(&mut self, optl: &[u8], ctll: &[u8]) -> RlaResult<SimReply> {
        let count = ctll_u32(ctll, 0x10).unwrap_or(1) as usize;
        let mut picked = Vec::new();
        match optl[0] {
            0x01 | 0x03 => {
                if optl[0] == 0x01 {
                    self.pos = Pos::BeforeFirst;
                }
                while picked.len() < count {
                    match self.step_forward() {
                        Some(i) => picked.push(i),
                        None => break,
                    }
                }
            }
            0x02 | 0x04 => {
                if optl[0] == 0x02 {
                    self.pos = Pos::AfterLast;
                }
                while picked.len() < count {
                    match self.step_backward() {
                        Some(i) => picked.push(i),
                        None => break,
                    }
                }
            }
            _ => {
                if let Pos::On(i) = self.pos {
                    picked.push(i);
                }
            }
        }
        self.data_reply(&picked, end_of_file())
    }

    fn get_by_record_number(&mut self, ctll: &[u8]) -> RlaResult<SimReply> {
        let rrn = ctll_u32(ctll, 0x02).unwrap_or(0);
        let found = self.records.iter().position(|r| r.record_number == rrn);
        if let Some(i) = found {
            self.pos = Pos::On(i);
        }
        self.data_reply(&found.into_iter().collect::<Vec<_>>(), not_found())
    }

    fn get_by_key(&mut self, optl: &[u8], ctll: &[u8]) -> RlaResult<SimReply> {
        let key = ctll_entry(ctll, 0x07).unwrap_or_default();
        let mut keys = Vec::new();
        for record in &self.records {
            let bytes = encode_key(&self.format, &record.key_values()?, &CP037, true)?.bytes;
            keys.push(bytes[..key.len().min(bytes.len())].to_vec());
        }
        let found = match optl[0] {
            0x0B => keys.iter().position(|k| *k == key),
            0x0C => keys.iter().position(|k| *k >= key),
            0x0D => keys.iter().position(|k| *k > key),
            0x09 => keys.iter().rposition(|k| *k < key),
            _ => keys.iter().rposition(|k| *k <= key),
        };
        if let Some(i) = found {
            self.pos = Pos::On(i);
        }
        self.data_reply(&found.into_iter().collect::<Vec<_>>(), not_found())
    }

    fn put(&mut self, ctll: &[u8], buffer: &[u8]) -> RlaResult<SimReply> {
        let count = ctll_u32(ctll, 0x10).unwrap_or(1);
        self.put_sizes.push(buffer.len());
        let io = IoFeedback {
            records_transferred: count,
            ..Default::default()
        };
        let records = decode_record_batch(buffer, &io, self.feedback()?, &self.format, &CP037)?;
        for record in records {
            self.insert(record);
        }
        Ok(SimReply {
            io: Some(io),
            ..Default::default()
        })
    }

    fn update(&mut self, buffer: &[u8]) -> RlaResult<SimReply> {
        let Pos::On(i) = self.pos else {
            return Ok(SimReply::failure(vec![HostMessage::new(
                "CPF5149",
                "Operation not valid for file ITEMS.",
                40,
                MessageType::Escape,
            )]));
        };
        let io = IoFeedback {
            records_transferred: 1,
            ..Default::default()
        };
        let mut record = decode_record_batch(buffer, &io, self.feedback()?, &self.format, &CP037)?.remove(0);
        record.record_number = self.records[i].record_number;
        self.records[i] = record;
        Ok(SimReply {
            io: Some(io),
            ..Default::default()
        })
    }

    fn delete(&mut self) -> RlaResult<SimReply> {
        let Pos::On(i) = self.pos else {
            return Ok(SimReply::failure(vec![HostMessage::new(
                "CPF5149",
                "Operation not valid for file ITEMS.",
                40,
                MessageType::Escape,
            )]));
        };
        self.records.remove(i);
        self.pos = Pos::Gap(i);
        Ok(SimReply {
            io: Some(IoFeedback::default()),
            ..Default::default()
        })
    }
}

pub type SharedHost = Arc<Mutex<HostState>>;

/// Native call interface over the simulated host.
pub struct SimService {
    pub host: SharedHost,
}

impl SimService {
    fn call(&self, op: Op) -> RlaResult<Vec<u8>> {
        let reply = lock(&self.host).handle(op)?;
        native_bytes(&reply)
    }
}

fn native_bytes(reply: &SimReply) -> RlaResult<Vec<u8>> {
    let feedback = match (&reply.open, &reply.io) {
        (Some(open), _) => open.encode(&CP037)?,
        (None, Some(io)) => io.encode(&CP037)?,
        (None, None) => Vec::new(),
    };
    encode_native_reply(&reply.messages, reply.failed, &feedback, &reply.data, &CP037)
}

impl NativeService for SimService {
    fn open(&self, ufcb: &[u8]) -> RlaResult<NativeOpen> {
        let mut host = lock(&self.host);
        let reply = host.handle(Op::Open(ufcb.to_vec()))?;
        let handle = if reply.failed {
            0
        } else {
            host.next_handle += 1;
            host.next_handle - 1
        };
        Ok(NativeOpen {
            handle,
            reply: native_bytes(&reply)?,
        })
    }

    fn close(&self, _handle: u32) -> RlaResult<Vec<u8>> {
        self.call(Op::Close)
    }

    fn commit(&self) -> RlaResult<Vec<u8>> {
        self.call(Op::Commit)
    }

    fn rollback(&self) -> RlaResult<Vec<u8>> {
        self.call(Op::Rollback)
    }

    fn execute_command(&self, command: &[u8]) -> RlaResult<Vec<u8>> {
        self.call(Op::Command(CP037.decode(command)))
    }

    fn get(&self, _handle: u32, optl: &[u8], ctll: &[u8], _screen: bool) -> RlaResult<Vec<u8>> {
        self.call(Op::Get {
            optl: optl.to_vec(),
            ctll: ctll.to_vec(),
        })
    }

    fn get_by_record_number(&self, _handle: u32, _optl: &[u8], ctll: &[u8], _screen: bool) -> RlaResult<Vec<u8>> {
        self.call(Op::GetByRecordNumber { ctll: ctll.to_vec() })
    }

    fn get_by_key(&self, _handle: u32, optl: &[u8], ctll: &[u8], _screen: bool) -> RlaResult<Vec<u8>> {
        self.call(Op::GetByKey {
            optl: optl.to_vec(),
            ctll: ctll.to_vec(),
        })
    }

    fn put(&self, _handle: u32, ctll: &[u8], buffer: &[u8]) -> RlaResult<Vec<u8>> {
        self.call(Op::Put {
            ctll: ctll.to_vec(),
            buffer: buffer.to_vec(),
        })
    }

    fn update(&self, _handle: u32, _optl: &[u8], _ctll: &[u8], buffer: &[u8]) -> RlaResult<Vec<u8>> {
        self.call(Op::Update {
            buffer: buffer.to_vec(),
        })
    }

    fn delete_current(&self, _handle: u32) -> RlaResult<Vec<u8>> {
        self.call(Op::Delete)
    }

    fn force_end_of_data(&self, _handle: u32, optl: &[u8]) -> RlaResult<Vec<u8>> {
        self.call(Op::ForceEndOfData { optl: optl.to_vec() })
    }
}

/// DDM server session over the simulated host.
pub struct SimSession {
    pub host: SharedHost,
    connected: bool,
    replies: VecDeque<DssSegment>,
}

impl SimSession {
    pub fn new(host: SharedHost) -> Self {
        Self {
            host,
            connected: true,
            replies: VecDeque::new(),
        }
    }
}

fn param(obj: &DdmObject, code_point: u16) -> RlaResult<Vec<u8>> {
    Ok(obj.get_raw_param(code_point)?.unwrap_or_default())
}

fn message_object(message: &HostMessage, failed: bool) -> RlaResult<DdmObject> {
    Ok(DdmBuilder::new(S38MSGRM)
        .add_u16_param(SVRCOD, if failed { SVRCOD_ERROR } else { SVRCOD_INFO })
        .add_param(S38MSGID, &CP037.encode(&message.id)?)
        .add_param(S38MTYPE, &CP037.encode(&format!("{:02}", message.message_type.code()))?)
        .add_u16_param(S38MSEV, message.severity as u16)
        .add_param(S38MTEXT, &CP037.encode(&message.text)?)
        .build())
}

fn reply_objects(reply: &SimReply) -> RlaResult<Vec<DdmObject>> {
    let mut objects = Vec::new();
    for message in &reply.messages {
        objects.push(message_object(message, reply.failed)?);
    }
    if let Some(open) = &reply.open {
        objects.push(DdmObject::new(S38OPNFB, open.encode(&CP037)?));
    }
    if !reply.data.is_empty() {
        objects.push(DdmObject::new(S38BUF, reply.data.clone()));
    }
    if let Some(io) = &reply.io {
        objects.push(DdmObject::new(S38IOFB, io.encode(&CP037)?));
    }
    if reply.end_of_unit || objects.is_empty() {
        objects.push(DdmObject::empty(ENDUOWRM));
    }
    Ok(objects)
}

impl HostSession for SimSession {
    fn send(&mut self, frames: &[DssSegment]) -> RlaResult<()> {
        if !self.connected {
            return Err(RlaError::ConnectionDropped);
        }
        let mut host = lock(&self.host);
        let correlation_id = frames[0].correlation_id;
        host.frames_per_request.push(frames.len());
        host.correlation_ids.push(correlation_id);
        let command = parse_ddm_list(&frames[0].payload)?
            .into_iter()
            .next()
            .ok_or_else(|| RlaError::InvalidDdm("empty request".to_string()))?;
        let data = match frames.get(1) {
            Some(frame) => parse_ddm_list(&frame.payload)?.into_iter().next(),
            None => None,
        };
        let buffer = data.map(|d| d.payload).unwrap_or_default();
        let op = match command.code_point {
            S38OPEN => {
                host.declared_names.push(param(&command, DCLNAM)?);
                Op::Open(param(&command, S38UFCB)?)
            }
            S38CLOSE => Op::Close,
            S38GET => Op::Get {
                optl: param(&command, S38OPTL)?,
                ctll: param(&command, S38CTLL)?,
            },
            S38GETD => Op::GetByRecordNumber {
                ctll: param(&command, S38CTLL)?,
            },
            S38GETK => Op::GetByKey {
                optl: param(&command, S38OPTL)?,
                ctll: param(&command, S38CTLL)?,
            },
            S38PUTM => Op::Put {
                ctll: param(&command, S38CTLL)?,
                buffer,
            },
            S38UPDAT => Op::Update { buffer },
            S38DEL => Op::Delete,
            S38FEOD => Op::ForceEndOfData {
                optl: param(&command, S38OPTL)?,
            },
            S38CMIT => Op::Commit,
            S38ROLB => Op::Rollback,
            S38CMD => Op::Command(CP037.decode(&param(&command, S38CMDST)?)),
            other => return Err(RlaError::InvalidDdm(format!("unsupported command 0x{:04X}", other))),
        };
        let reply = host.handle(op)?;
        let objects = reply_objects(&reply)?;
        let last = objects.len() - 1;
        for (i, obj) in objects.iter().enumerate() {
            let segment = DssSegment::new_reply(correlation_id, obj.serialize(true)?);
            self.replies.push_back(if i < last {
                segment.chained_same_correlator()
            } else {
                segment
            });
        }
        Ok(())
    }

    fn receive(&mut self) -> RlaResult<DssSegment> {
        self.replies.pop_front().ok_or(RlaError::ConnectionDropped)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.replies.clear();
    }
}

/// A connection to a fresh simulated host holding `count` items.
pub fn connect(strategy: Strategy, config: AccessConfig, count: usize) -> (SharedHost, HostConnection) {
    let format = item_format();
    let mut state = HostState::new(Arc::clone(&format));
    for i in 0..count {
        state.insert(item(&format, &format!("A{:05}", i), i as i64));
    }
    let host = Arc::new(Mutex::new(state));
    let config = AccessConfig { strategy, ..config };
    let conn = match strategy {
        Strategy::Native => HostConnection::new(config)
            .with_native(Arc::new(SimService { host: Arc::clone(&host) }))
            .unwrap(),
        Strategy::Remote => HostConnection::new(config)
            .with_remote(Box::new(SimSession::new(Arc::clone(&host))))
            .unwrap(),
    };
    (host, conn)
}
