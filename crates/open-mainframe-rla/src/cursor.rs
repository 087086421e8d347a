//! Record cursor over one open file.
//!
//! [`RecordFile`] tracks where the cursor is, serves sequential reads from
//! the optional client cache, and turns the record access contract into the
//! calls applications make: read forward and backward, jump to a record
//! number or key, write, update, delete and lock.
//!
//! ```text
//! open ──> Unpositioned
//!               │ read, key or record number
//!               ▼
//! BeforeFirst <──> OnRecord(n) <──> AfterLast
//!
//! any state ── close ──> Closed
//! ```

use std::fmt;
use std::sync::Arc;

use crate::cache::{CacheRead, RecordCache, SyncTarget};
use crate::codec::OpenFeedback;
use crate::config::{AccessConfig, OpenOptions, OpenType};
use crate::error::{RlaError, RlaResult};
use crate::message::HostMessage;
use crate::path::QsysPath;
use crate::record::{FieldValue, Record, RecordFormat};
use crate::strategy::{Direction, KeySearch, OpenRequest, RecordAccess};

/// Where the cursor of an open file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Just opened; no read has happened.
    Unpositioned,
    BeforeFirst,
    /// On the record with this relative record number.
    OnRecord(u32),
    AfterLast,
    Closed,
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorState::Unpositioned => write!(f, "Unpositioned"),
            CursorState::BeforeFirst => write!(f, "BeforeFirst"),
            CursorState::OnRecord(n) => write!(f, "OnRecord({})", n),
            CursorState::AfterLast => write!(f, "AfterLast"),
            CursorState::Closed => write!(f, "Closed"),
        }
    }
}

/// Explicit object lock on a file member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    /// *SHRRD
    SharedRead,
    /// *SHRNUP
    SharedNoUpdate,
    /// *SHRUPD
    SharedUpdate,
    /// *EXCLRD
    ExclusiveAllowRead,
    /// *EXCL
    Exclusive,
}

impl LockType {
    pub fn cl_value(self) -> &'static str {
        match self {
            LockType::SharedRead => "*SHRRD",
            LockType::SharedNoUpdate => "*SHRNUP",
            LockType::SharedUpdate => "*SHRUPD",
            LockType::ExclusiveAllowRead => "*EXCLRD",
            LockType::Exclusive => "*EXCL",
        }
    }
}

/// An open file and its cursor.
pub struct RecordFile {
    access: Box<dyn RecordAccess>,
    path: QsysPath,
    format: Arc<RecordFormat>,
    open_type: OpenType,
    cache: Option<RecordCache>,
    state: CursorState,
    locks: Vec<LockType>,
}

impl RecordFile {
    /// Open `path` through `access`.
    ///
    /// Reads are cached only when the configuration asks for it, the file
    /// is opened read-only, and more than one record moves per transfer.
    pub fn open(
        mut access: Box<dyn RecordAccess>,
        path: QsysPath,
        format: Arc<RecordFormat>,
        options: &OpenOptions,
        config: &AccessConfig,
    ) -> RlaResult<Self> {
        let path = match &options.member {
            Some(member) => QsysPath::new(&path.library, &path.file, member)?,
            None => path,
        };
        access.open(OpenRequest {
            path: path.clone(),
            format: Arc::clone(&format),
            open_type: options.open_type,
            blocking_factor: options.blocking_factor.unwrap_or(config.blocking_factor),
            commit_lock_level: config.commit_lock_level,
        })?;
        let cached =
            config.cache_records && options.open_type == OpenType::ReadOnly && access.blocking_factor() > 1;
        tracing::info!(%path, blocking = access.blocking_factor(), cached, "file opened");
        Ok(Self {
            access,
            path,
            format,
            open_type: options.open_type,
            cache: cached.then(RecordCache::new),
            state: CursorState::Unpositioned,
            locks: Vec::new(),
        })
    }

    pub fn path(&self) -> &QsysPath {
        &self.path
    }

    pub fn format(&self) -> &Arc<RecordFormat> {
        &self.format
    }

    pub fn open_type(&self) -> OpenType {
        self.open_type
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != CursorState::Closed
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn open_feedback(&self) -> Option<&OpenFeedback> {
        self.access.open_feedback()
    }

    pub fn blocking_factor(&self) -> usize {
        self.access.blocking_factor()
    }

    /// Locks taken with [`RecordFile::lock`] and not yet released.
    pub fn locks(&self) -> &[LockType] {
        &self.locks
    }

    /// A new empty record in this file's format.
    pub fn new_record(&self) -> Record {
        Record::new(Arc::clone(&self.format))
    }

    fn ensure_open(&self) -> RlaResult<()> {
        if self.state == CursorState::Closed {
            return Err(RlaError::NotOpen);
        }
        Ok(())
    }

    fn clear_cache(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    /// After a transport failure the strategy has already forgotten the
    /// file; mirror that here.
    fn track<T>(&mut self, result: RlaResult<T>) -> RlaResult<T> {
        if let Err(ref e) = result {
            if e.is_retryable() {
                tracing::error!(path = %self.path, error = %e, "file closed after transport failure");
                self.cache = None;
                self.locks.clear();
                self.state = CursorState::Closed;
            }
        }
        result
    }

    fn settle(&mut self, direction: Direction, record: Option<Record>) -> Option<Record> {
        self.state = match (&record, direction) {
            (Some(r), _) => CursorState::OnRecord(r.record_number),
            (None, Direction::First | Direction::Next) => CursorState::AfterLast,
            (None, Direction::Last | Direction::Previous) => CursorState::BeforeFirst,
            (None, Direction::Same) => self.state,
        };
        record
    }

    fn read(&mut self, direction: Direction) -> RlaResult<Option<Record>> {
        self.ensure_open()?;
        let cached = self.cache.as_mut().map(|cache| match direction {
            Direction::First => cache.first(),
            Direction::Last => cache.last(),
            Direction::Next => cache.next(),
            Direction::Previous => cache.previous(),
            Direction::Same => cache.current(),
        });
        let record = match cached {
            Some(CacheRead::Hit(record)) => Some(record),
            Some(CacheRead::EndOfData) => None,
            Some(CacheRead::Miss) if direction != Direction::Same => {
                let result = self.refill(direction);
                self.track(result)?
            }
            _ => {
                let result = self.access.read(direction, 1);
                self.track(result)?.into_first()
            }
        };
        Ok(self.settle(direction, record))
    }

    /// Read a full block from the host into the cache and return the
    /// record the caller asked for.
    fn refill(&mut self, direction: Direction) -> RlaResult<Option<Record>> {
        let mut target = None;
        if let Some(cache) = self.cache.as_mut() {
            if matches!(direction, Direction::Next | Direction::Previous) {
                target = cache.sync_target();
            }
            cache.clear();
        }
        match target {
            Some(SyncTarget::BeforeFirst) => self.access.position_before_first()?,
            Some(SyncTarget::AfterLast) => self.access.position_after_last()?,
            Some(SyncTarget::RecordNumber(n)) => {
                tracing::trace!(record_number = n, "resynchronizing host cursor");
                self.access.read_by_record_number(n, false)?;
            }
            None => {}
        }
        let count = self.access.blocking_factor();
        let records = self.access.read(direction, count)?.into_records();
        let short = records.len() < count;
        let (contains_first, contains_last) = match direction {
            Direction::First => (true, short),
            Direction::Last => (short, true),
            Direction::Next => (false, short),
            Direction::Previous => (short, false),
            Direction::Same => (false, false),
        };
        let current = records.first().cloned();
        if let Some(cache) = self.cache.as_mut() {
            let forward = matches!(direction, Direction::First | Direction::Next);
            cache.fill(records, forward, contains_first, contains_last);
        }
        Ok(current)
    }

    pub fn read_first(&mut self) -> RlaResult<Option<Record>> {
        self.read(Direction::First)
    }

    pub fn read_next(&mut self) -> RlaResult<Option<Record>> {
        self.read(Direction::Next)
    }

    pub fn read_previous(&mut self) -> RlaResult<Option<Record>> {
        self.read(Direction::Previous)
    }

    pub fn read_last(&mut self) -> RlaResult<Option<Record>> {
        self.read(Direction::Last)
    }

    /// Re-read the record the cursor is on.
    pub fn read_same(&mut self) -> RlaResult<Option<Record>> {
        self.read(Direction::Same)
    }

    /// Move to a relative record number and return that record, or `None`
    /// if it does not exist.
    pub fn position_to_index(&mut self, record_number: u32) -> RlaResult<Option<Record>> {
        self.ensure_open()?;
        self.clear_cache();
        let result = self.access.read_by_record_number(record_number, true);
        let record = self.track(result)?.into_first();
        self.state = match &record {
            Some(r) => CursorState::OnRecord(r.record_number),
            None => CursorState::Unpositioned,
        };
        Ok(record)
    }

    /// Move to the first record whose key matches and return it, or `None`
    /// if there is none.
    pub fn position_to_key(&mut self, key: &[FieldValue]) -> RlaResult<Option<Record>> {
        self.read_by_key(key, KeySearch::Equal)
    }

    /// Keyed read with an explicit comparison. `key` may name fewer fields
    /// than the file's key.
    pub fn read_by_key(&mut self, key: &[FieldValue], search: KeySearch) -> RlaResult<Option<Record>> {
        self.ensure_open()?;
        self.clear_cache();
        let result = self.access.read_by_key(key, search);
        let record = self.track(result)?.into_first();
        self.state = match &record {
            Some(r) => CursorState::OnRecord(r.record_number),
            None => CursorState::Unpositioned,
        };
        Ok(record)
    }

    /// Every record from the first to end of file, one block per transfer.
    /// Leaves the cursor after the last record.
    pub fn read_all(&mut self) -> RlaResult<Vec<Record>> {
        self.ensure_open()?;
        self.clear_cache();
        let result = self.access.position_before_first();
        self.track(result)?;
        let count = self.access.blocking_factor();
        let mut all = Vec::new();
        loop {
            let result = self.access.read(Direction::Next, count);
            let records = self.track(result)?.into_records();
            let short = records.len() < count;
            all.extend(records);
            if short {
                break;
            }
        }
        tracing::debug!(path = %self.path, records = all.len(), "read all");
        self.state = CursorState::AfterLast;
        Ok(all)
    }

    pub fn position_before_first(&mut self) -> RlaResult<()> {
        self.ensure_open()?;
        if let Some(cache) = self.cache.as_mut() {
            if cache.position_before_first() {
                self.state = CursorState::BeforeFirst;
                return Ok(());
            }
            cache.clear();
        }
        let result = self.access.position_before_first();
        self.track(result)?;
        self.state = CursorState::BeforeFirst;
        Ok(())
    }

    pub fn position_after_last(&mut self) -> RlaResult<()> {
        self.ensure_open()?;
        if let Some(cache) = self.cache.as_mut() {
            if cache.position_after_last() {
                self.state = CursorState::AfterLast;
                return Ok(());
            }
            cache.clear();
        }
        let result = self.access.position_after_last();
        self.track(result)?;
        self.state = CursorState::AfterLast;
        Ok(())
    }

    /// Replace the record the cursor is on.
    pub fn update(&mut self, record: &Record) -> RlaResult<()> {
        self.ensure_open()?;
        self.clear_cache();
        let result = self.access.update(record);
        self.track(result)
    }

    pub fn delete_current(&mut self) -> RlaResult<()> {
        self.ensure_open()?;
        self.clear_cache();
        let result = self.access.delete_current();
        self.track(result)
    }

    pub fn write(&mut self, record: &Record) -> RlaResult<()> {
        self.write_all(std::slice::from_ref(record))
    }

    /// Append records, one physical write per blocking factor.
    pub fn write_all(&mut self, records: &[Record]) -> RlaResult<()> {
        self.ensure_open()?;
        if records.is_empty() {
            return Ok(());
        }
        self.clear_cache();
        let result = self.access.write(records);
        self.track(result)
    }

    pub fn commit(&mut self) -> RlaResult<()> {
        self.ensure_open()?;
        let result = self.access.commit();
        self.track(result)
    }

    /// Roll back the unit of work. Cached records may no longer exist, so
    /// the cache is dropped.
    pub fn rollback(&mut self) -> RlaResult<()> {
        self.ensure_open()?;
        self.clear_cache();
        let result = self.access.rollback();
        self.track(result)
    }

    pub fn execute_command(&mut self, command: &str) -> RlaResult<Vec<HostMessage>> {
        self.ensure_open()?;
        let result = self.access.execute_command(command);
        self.track(result)
    }

    fn lock_command(&self, verb: &str, lock: LockType) -> String {
        format!(
            "{} OBJ(({} *FILE {} {}))",
            verb,
            self.path.qualified_file(),
            lock.cl_value(),
            self.path.member
        )
    }

    /// Take an explicit lock on the member with ALCOBJ.
    pub fn lock(&mut self, lock: LockType) -> RlaResult<()> {
        let command = self.lock_command("ALCOBJ", lock);
        self.execute_command(&command)?;
        self.locks.push(lock);
        Ok(())
    }

    /// Release every lock taken with [`RecordFile::lock`], newest first.
    pub fn release_locks(&mut self) -> RlaResult<()> {
        while let Some(&lock) = self.locks.last() {
            let command = self.lock_command("DLCOBJ", lock);
            self.execute_command(&command)?;
            self.locks.pop();
        }
        Ok(())
    }

    /// Close the file, releasing explicit locks first. Closing a closed file
    /// does nothing.
    pub fn close(&mut self) -> RlaResult<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        if let Err(e) = self.release_locks() {
            tracing::warn!(path = %self.path, error = %e, "could not release locks before close");
        }
        self.cache = None;
        self.state = CursorState::Closed;
        self.access.close()?;
        tracing::info!(path = %self.path, "file closed");
        Ok(())
    }
}
