//! The record access contract and its two implementations.
//!
//! [`RecordAccess`] is one open-file session with the host. The native
//! implementation calls host service routines in process; the remote one
//! sends DDM requests over a server session. Both build the same option
//! lists, control lists and record buffers and resolve replies through the
//! same message classification, so callers cannot tell them apart.
//!
//! ```text
//! RecordFile (cursor, cache)
//!     │
//!     ▼
//! dyn RecordAccess ──┬── NativeFile ──> NativeSystem ──> dyn NativeService
//!                    └── RemoteFile ──> RemoteSystem ──> dyn HostSession
//! ```

pub(crate) mod common;
pub mod native;
pub mod remote;

use std::sync::Arc;

use crate::codec::{OpenFeedback, PositionType};
use crate::config::{CommitLockLevel, OpenType};
use crate::error::RlaResult;
use crate::message::HostMessage;
use crate::path::QsysPath;
use crate::record::{FieldValue, Record, RecordFormat};

pub use common::HostReply;
pub use native::{
    encode_native_reply, parse_native_reply, FeedbackArea, HandleTable, NativeFile, NativeOpen,
    NativeService, NativeSystem,
};
pub use remote::{parse_remote_reply, RemoteFile, RemoteSystem};

/// Sequential read direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    First,
    Last,
    Next,
    Previous,
    /// Re-read the current record.
    Same,
}

impl Direction {
    pub(crate) fn position_type(self) -> PositionType {
        match self {
            Direction::First => PositionType::First,
            Direction::Last => PositionType::Last,
            Direction::Next => PositionType::Next,
            Direction::Previous => PositionType::Previous,
            Direction::Same => PositionType::Same,
        }
    }
}

/// How a keyed read compares the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySearch {
    #[default]
    Equal,
    After,
    AfterOrEqual,
    Before,
    BeforeOrEqual,
}

impl KeySearch {
    pub(crate) fn position_type(self) -> PositionType {
        match self {
            KeySearch::Equal => PositionType::KeyEqual,
            KeySearch::After => PositionType::KeyAfter,
            KeySearch::AfterOrEqual => PositionType::KeyAfterOrEqual,
            KeySearch::Before => PositionType::KeyBefore,
            KeySearch::BeforeOrEqual => PositionType::KeyBeforeOrEqual,
        }
    }
}

/// Result of a read: records, or the host's "nothing there".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Records(Vec<Record>),
    /// End of file or record not found.
    NoData,
}

impl Fetch {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Fetch::Records(records) => records,
            Fetch::NoData => Vec::new(),
        }
    }

    pub fn into_first(self) -> Option<Record> {
        self.into_records().into_iter().next()
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Fetch::NoData)
    }
}

/// What to open and how.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub path: QsysPath,
    pub format: Arc<RecordFormat>,
    pub open_type: OpenType,
    /// Requested records per transfer; 0 sizes it from the record length.
    pub blocking_factor: usize,
    pub commit_lock_level: CommitLockLevel,
}

/// Operations on one open file. Every call blocks until the host answers.
///
/// Local validation (record length, null keys, not open) happens before
/// anything is sent. A transport failure closes the file locally before the
/// error is returned.
pub trait RecordAccess: Send {
    /// Open the file. Fails with `AlreadyOpen` if this object has a file open.
    fn open(&mut self, request: OpenRequest) -> RlaResult<OpenFeedback>;

    fn close(&mut self) -> RlaResult<()>;

    fn is_open(&self) -> bool;

    /// Feedback from the current open.
    fn open_feedback(&self) -> Option<&OpenFeedback>;

    /// Records per transfer for the current open; 0 when closed.
    fn blocking_factor(&self) -> usize;

    /// Read up to `count` records moving in `direction`.
    fn read(&mut self, direction: Direction, count: usize) -> RlaResult<Fetch>;

    fn read_first(&mut self) -> RlaResult<Option<Record>> {
        Ok(self.read(Direction::First, 1)?.into_first())
    }

    fn read_next(&mut self) -> RlaResult<Option<Record>> {
        Ok(self.read(Direction::Next, 1)?.into_first())
    }

    fn read_previous(&mut self) -> RlaResult<Option<Record>> {
        Ok(self.read(Direction::Previous, 1)?.into_first())
    }

    fn read_last(&mut self) -> RlaResult<Option<Record>> {
        Ok(self.read(Direction::Last, 1)?.into_first())
    }

    fn read_same(&mut self) -> RlaResult<Option<Record>> {
        Ok(self.read(Direction::Same, 1)?.into_first())
    }

    /// Read by relative record number. With `screen` unset, "not found"
    /// is an error instead of `NoData`.
    fn read_by_record_number(&mut self, record_number: u32, screen: bool) -> RlaResult<Fetch>;

    /// Read by a full or partial key.
    fn read_by_key(&mut self, key: &[FieldValue], search: KeySearch) -> RlaResult<Fetch>;

    /// Replace the current record without moving the cursor.
    fn update(&mut self, record: &Record) -> RlaResult<()>;

    fn delete_current(&mut self) -> RlaResult<()>;

    /// Append records, `blocking_factor` per physical write.
    fn write(&mut self, records: &[Record]) -> RlaResult<()>;

    fn position_before_first(&mut self) -> RlaResult<()>;

    fn position_after_last(&mut self) -> RlaResult<()>;

    fn commit(&mut self) -> RlaResult<()>;

    fn rollback(&mut self) -> RlaResult<()>;

    /// Run a CL command; returns the messages it produced.
    fn execute_command(&mut self, command: &str) -> RlaResult<Vec<HostMessage>>;
}
