//! Access configuration: strategy selection, blocking, caching and CCSID.

use serde::{Deserialize, Serialize};

use crate::error::{RlaError, RlaResult};

/// Target size of one blocked transfer when no blocking factor is given.
pub const TARGET_BUFFER_BYTES: usize = 32 * 1024;
/// Largest blocking factor the host accepts.
pub const MAX_BLOCKING_FACTOR: usize = 32767;

/// How requests reach the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// In-process calls into the host's service routines.
    Native,
    /// DDM data streams over a server session.
    #[default]
    Remote,
}

/// Commitment control lock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitLockLevel {
    /// Not under commitment control.
    #[default]
    None,
    /// *CHG: changed records are locked until commit.
    Change,
    /// *CS: cursor stability.
    CursorStability,
    /// *ALL: every record read or changed is locked.
    All,
}

impl CommitLockLevel {
    /// Value used in the open control block.
    pub fn code(self) -> u8 {
        match self {
            CommitLockLevel::None => 0x00,
            CommitLockLevel::Change => 0x01,
            CommitLockLevel::CursorStability => 0x02,
            CommitLockLevel::All => 0x03,
        }
    }

    /// `LCKLVL` parameter of STRCMTCTL.
    pub fn cl_value(self) -> Option<&'static str> {
        match self {
            CommitLockLevel::None => None,
            CommitLockLevel::Change => Some("*CHG"),
            CommitLockLevel::CursorStability => Some("*CS"),
            CommitLockLevel::All => Some("*ALL"),
        }
    }
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenType {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl OpenType {
    pub fn code(self) -> u8 {
        match self {
            OpenType::ReadOnly => 0x01,
            OpenType::WriteOnly => 0x02,
            OpenType::ReadWrite => 0x0F,
        }
    }
}

/// Settings shared by every file opened through one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Native or remote access.
    #[serde(default)]
    pub strategy: Strategy,
    /// Records per transfer; 0 sizes it from the record length.
    #[serde(default)]
    pub blocking_factor: usize,
    /// Keep a client-side window of fetched records for read-only opens.
    #[serde(default)]
    pub cache_records: bool,
    /// Job CCSID for text without a CCSID of its own.
    #[serde(default = "default_ccsid")]
    pub ccsid: u16,
    /// Lock level applied to opens.
    #[serde(default)]
    pub commit_lock_level: CommitLockLevel,
    /// Allow record buffers over 32767 bytes.
    #[serde(default = "default_large_buffers")]
    pub large_buffers: bool,
}

fn default_ccsid() -> u16 {
    37
}

fn default_large_buffers() -> bool {
    true
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            blocking_factor: 0,
            cache_records: false,
            ccsid: default_ccsid(),
            commit_lock_level: CommitLockLevel::default(),
            large_buffers: default_large_buffers(),
        }
    }
}

impl AccessConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> RlaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> RlaResult<Self> {
        toml::from_str(content).map_err(|e| RlaError::invalid("config", e.to_string()))
    }
}

/// Blocking factor for a file: an explicit value wins, otherwise as many
/// records as fit in the target buffer. Always within 1..=32767.
pub fn effective_blocking_factor(requested: usize, record_increment: usize) -> usize {
    let factor = if requested > 0 {
        requested
    } else {
        TARGET_BUFFER_BYTES / record_increment.max(1)
    };
    factor.clamp(1, MAX_BLOCKING_FACTOR)
}

/// Per-file open settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenOptions {
    #[serde(default)]
    pub open_type: OpenType,
    /// Overrides [`AccessConfig::blocking_factor`].
    #[serde(default)]
    pub blocking_factor: Option<usize>,
    /// Member to open; defaults to the path's member.
    #[serde(default)]
    pub member: Option<String>,
}

impl OpenOptions {
    pub fn read_only() -> Self {
        Self {
            open_type: OpenType::ReadOnly,
            ..Self::default()
        }
    }

    pub fn write_only() -> Self {
        Self {
            open_type: OpenType::WriteOnly,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self::default()
    }

    pub fn blocking_factor(mut self, factor: usize) -> Self {
        self.blocking_factor = Some(factor);
        self
    }

    pub fn member(mut self, member: &str) -> Self {
        self.member = Some(member.to_string());
        self
    }
}
