//! Client-side read-ahead cache for read-only files.
//!
//! Holds one contiguous run of records in file order, as returned by the
//! last blocked read, and serves sequential reads out of it. The cache also
//! remembers where the host's own cursor was left so a miss can put the
//! host back in step before the next physical read.

use crate::record::Record;

/// Where a cursor sits relative to the cached run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePosition {
    /// Nothing cached, or the position is unknown.
    Unset,
    BeforeFirst,
    /// On the cached record at this index.
    At(usize),
    AfterLast,
}

/// Answer to a cached read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRead {
    Hit(Record),
    /// The cache knows the file ends here.
    EndOfData,
    /// The host has to be asked.
    Miss,
}

/// What the host cursor must be moved to before reading past a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    BeforeFirst,
    AfterLast,
    RecordNumber(u32),
}

#[derive(Debug, Clone)]
pub struct RecordCache {
    records: Vec<Record>,
    position: CachePosition,
    host_position: CachePosition,
    contains_first: bool,
    contains_last: bool,
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            position: CachePosition::Unset,
            host_position: CachePosition::Unset,
            contains_first: false,
            contains_last: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn position(&self) -> CachePosition {
        self.position
    }

    /// The cached run starts at the first record of the file.
    pub fn contains_first(&self) -> bool {
        self.contains_first
    }

    /// The cached run ends at the last record of the file.
    pub fn contains_last(&self) -> bool {
        self.contains_last
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Replace the contents with one blocked read.
    ///
    /// `records` are in the order the host returned them: ascending for a
    /// forward read, descending for a backward one. The first record
    /// returned becomes the current one.
    pub fn fill(&mut self, mut records: Vec<Record>, forward: bool, contains_first: bool, contains_last: bool) {
        if !forward {
            records.reverse();
        }
        let len = records.len();
        let (position, host_position) = match (len, forward) {
            (0, true) => (CachePosition::AfterLast, CachePosition::AfterLast),
            (0, false) => (CachePosition::BeforeFirst, CachePosition::BeforeFirst),
            (_, true) if contains_last => (CachePosition::At(0), CachePosition::AfterLast),
            (_, true) => (CachePosition::At(0), CachePosition::At(len - 1)),
            (_, false) if contains_first => (CachePosition::At(len - 1), CachePosition::BeforeFirst),
            (_, false) => (CachePosition::At(len - 1), CachePosition::At(0)),
        };
        tracing::trace!(records = len, forward, contains_first, contains_last, "cache filled");
        *self = Self {
            records,
            position,
            host_position,
            contains_first,
            contains_last,
        };
    }

    fn hit(&mut self, index: usize) -> CacheRead {
        self.position = CachePosition::At(index);
        CacheRead::Hit(self.records[index].clone())
    }

    pub fn first(&mut self) -> CacheRead {
        if self.contains_first && !self.records.is_empty() {
            return self.hit(0);
        }
        CacheRead::Miss
    }

    pub fn last(&mut self) -> CacheRead {
        if self.contains_last && !self.records.is_empty() {
            return self.hit(self.records.len() - 1);
        }
        CacheRead::Miss
    }

    pub fn current(&self) -> CacheRead {
        match self.position {
            CachePosition::At(i) => CacheRead::Hit(self.records[i].clone()),
            _ => CacheRead::Miss,
        }
    }

    pub fn next(&mut self) -> CacheRead {
        let len = self.records.len();
        match self.position {
            CachePosition::BeforeFirst if self.contains_first && len > 0 => self.hit(0),
            CachePosition::At(i) if i + 1 < len => self.hit(i + 1),
            CachePosition::At(_) | CachePosition::AfterLast if self.contains_last => {
                self.position = CachePosition::AfterLast;
                CacheRead::EndOfData
            }
            CachePosition::BeforeFirst if self.contains_first && self.contains_last => {
                self.position = CachePosition::AfterLast;
                CacheRead::EndOfData
            }
            _ => CacheRead::Miss,
        }
    }

    pub fn previous(&mut self) -> CacheRead {
        let len = self.records.len();
        match self.position {
            CachePosition::AfterLast if self.contains_last && len > 0 => self.hit(len - 1),
            CachePosition::At(i) if i > 0 => self.hit(i - 1),
            CachePosition::At(_) | CachePosition::BeforeFirst if self.contains_first => {
                self.position = CachePosition::BeforeFirst;
                CacheRead::EndOfData
            }
            CachePosition::AfterLast if self.contains_first && self.contains_last => {
                self.position = CachePosition::BeforeFirst;
                CacheRead::EndOfData
            }
            _ => CacheRead::Miss,
        }
    }

    /// Move before the first record without the host, if the cache holds it.
    pub fn position_before_first(&mut self) -> bool {
        if self.contains_first {
            self.position = CachePosition::BeforeFirst;
            return true;
        }
        false
    }

    /// Move after the last record without the host, if the cache holds it.
    pub fn position_after_last(&mut self) -> bool {
        if self.contains_last {
            self.position = CachePosition::AfterLast;
            return true;
        }
        false
    }

    /// Where the host cursor must go so a physical read continues from the
    /// cached position. `None` when it is already there or nothing is known.
    pub fn sync_target(&self) -> Option<SyncTarget> {
        if self.position == self.host_position {
            return None;
        }
        match self.position {
            CachePosition::Unset => None,
            CachePosition::BeforeFirst => Some(SyncTarget::BeforeFirst),
            CachePosition::AfterLast => Some(SyncTarget::AfterLast),
            CachePosition::At(i) => Some(SyncTarget::RecordNumber(self.records[i].record_number)),
        }
    }
}
