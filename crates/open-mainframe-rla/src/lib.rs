//! Record-level access to IBM i database files.
//!
//! Reads, writes, updates and deletes records of physical and logical files
//! by position, relative record number or key, either through in-process
//! calls into the host's file service routines or through DDM data streams
//! over a host server session. Both paths share one record codec, one
//! message classification and one operation contract.
//!
//! # Architecture
//!
//! ```text
//! HostConnection ── open_file ──> RecordFile (cursor.rs, cache.rs)
//!                                     │
//!                                     ▼
//!                            dyn RecordAccess (strategy/)
//!                     ┌───────────────┴────────────────┐
//!                 NativeFile                       RemoteFile
//!                     │                                 │
//!              dyn NativeService            framing.rs ─ correlation.rs
//!                                                       │
//!                                           dss.rs / ddm.rs over
//!                                           dyn HostSession (session.rs)
//!
//! shared: codec/ (OPTL, CTLL, UFCB, keys, feedback, record buffers)
//!         message.rs (feedback blocks, classification)
//!         record/ (formats, values), path.rs, config.rs
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use std::sync::Arc;
//! use open_mainframe_rla::{
//!     AccessConfig, FieldDescription, HostConnection, OpenOptions, RecordFormat, StreamSession,
//! };
//!
//! # fn main() -> open_mainframe_rla::RlaResult<()> {
//! let stream = TcpStream::connect("ibmi.example.com:446")?;
//! let conn = HostConnection::new(AccessConfig::default())
//!     .with_remote(Box::new(StreamSession::new(stream)))?;
//! let format = Arc::new(
//!     RecordFormat::new("CUSTREC")
//!         .field(FieldDescription::character("NAME", 20))
//!         .field(FieldDescription::packed("BALANCE", 9, 2)),
//! );
//! let mut file = conn.open_path("/QSYS.LIB/SALES.LIB/CUSTOMER.FILE", format, &OpenOptions::read_only())?;
//! while let Some(record) = file.read_next()? {
//!     println!("{:?}", record.get_by_name("NAME"));
//! }
//! file.close()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod code_points;
pub mod codec;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod cursor;
pub mod ddm;
pub mod dss;
pub mod error;
pub mod framing;
pub mod message;
pub mod path;
pub mod record;
pub mod session;
pub mod strategy;

pub use config::{AccessConfig, CommitLockLevel, OpenOptions, OpenType, Strategy};
pub use connection::HostConnection;
pub use correlation::{CorrelationIds, DeclaredNames};
pub use cursor::{CursorState, LockType, RecordFile};
pub use error::{ErrorKind, RlaError, RlaResult};
pub use message::{HostMessage, MessageType};
pub use path::QsysPath;
pub use record::{FieldDescription, FieldKind, FieldValue, Record, RecordFormat};
pub use session::{HostSession, StreamSession};
pub use strategy::{
    Direction, Fetch, HandleTable, KeySearch, NativeFile, NativeService, NativeSystem, OpenRequest,
    RecordAccess, RemoteFile, RemoteSystem,
};
