//! Host connection: the entry point that opens files.
//!
//! A connection binds the native service, a server session, or both, and
//! picks one of them for every open according to [`AccessConfig::strategy`].
//! Commands and commitment control that do not belong to any one file also
//! go through here.

use std::sync::Arc;

use crate::config::{AccessConfig, CommitLockLevel, OpenOptions, Strategy};
use crate::correlation::{CorrelationIds, DeclaredNames};
use crate::cursor::RecordFile;
use crate::error::{RlaError, RlaResult};
use crate::message::HostMessage;
use crate::path::QsysPath;
use crate::record::RecordFormat;
use crate::session::HostSession;
use crate::strategy::{
    HandleTable, NativeFile, NativeService, NativeSystem, RecordAccess, RemoteFile, RemoteSystem,
};

/// Access to one host system.
pub struct HostConnection {
    config: AccessConfig,
    native: Option<Arc<NativeSystem>>,
    remote: Option<Arc<RemoteSystem>>,
}

impl HostConnection {
    pub fn new(config: AccessConfig) -> Self {
        Self {
            config,
            native: None,
            remote: None,
        }
    }

    /// Bind the native service with a new, empty handle table. Connections
    /// that share a service share its table through
    /// [`HostConnection::with_native_table`].
    pub fn with_native(self, service: Arc<dyn NativeService>) -> RlaResult<Self> {
        self.with_native_table(service, Arc::new(HandleTable::new()))
    }

    /// Bind the native service with a handle table shared with other
    /// connections. The table is used as it is; nothing is reset.
    pub fn with_native_table(mut self, service: Arc<dyn NativeService>, handles: Arc<HandleTable>) -> RlaResult<Self> {
        let system = NativeSystem::with_handles(service, self.config.ccsid, handles)?;
        self.native = Some(Arc::new(system));
        Ok(self)
    }

    /// Bind a server session with its own correlation and declared-name
    /// counters.
    pub fn with_remote(self, session: Box<dyn HostSession>) -> RlaResult<Self> {
        self.with_remote_counters(
            session,
            Arc::new(CorrelationIds::new()),
            Arc::new(DeclaredNames::new()),
        )
    }

    /// Bind a server session sharing counters with other connections.
    pub fn with_remote_counters(
        mut self,
        session: Box<dyn HostSession>,
        correlation: Arc<CorrelationIds>,
        names: Arc<DeclaredNames>,
    ) -> RlaResult<Self> {
        let system = RemoteSystem::new(
            session,
            correlation,
            names,
            self.config.ccsid,
            self.config.large_buffers,
        )?;
        self.remote = Some(Arc::new(system));
        Ok(self)
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn native_system(&self) -> Option<&Arc<NativeSystem>> {
        self.native.as_ref()
    }

    pub fn remote_system(&self) -> Option<&Arc<RemoteSystem>> {
        self.remote.as_ref()
    }

    fn unbound(strategy: Strategy) -> RlaError {
        RlaError::invalid(
            "strategy",
            format!("{:?} access is configured but not bound", strategy),
        )
    }

    /// A fresh, unopened file object for the configured strategy.
    pub fn access(&self) -> RlaResult<Box<dyn RecordAccess>> {
        match self.config.strategy {
            Strategy::Native => {
                let system = self.native.as_ref().ok_or_else(|| Self::unbound(Strategy::Native))?;
                Ok(Box::new(NativeFile::new(Arc::clone(system))))
            }
            Strategy::Remote => {
                let system = self.remote.as_ref().ok_or_else(|| Self::unbound(Strategy::Remote))?;
                Ok(Box::new(RemoteFile::new(Arc::clone(system))))
            }
        }
    }

    /// Open a file member.
    pub fn open_file(
        &self,
        path: &QsysPath,
        format: Arc<RecordFormat>,
        options: &OpenOptions,
    ) -> RlaResult<RecordFile> {
        RecordFile::open(self.access()?, path.clone(), format, options, &self.config)
    }

    /// Open a file named by an IFS path such as
    /// `/QSYS.LIB/MYLIB.LIB/MYFILE.FILE`.
    pub fn open_path(&self, path: &str, format: Arc<RecordFormat>, options: &OpenOptions) -> RlaResult<RecordFile> {
        self.open_file(&QsysPath::parse(path)?, format, options)
    }

    /// Run a CL command; returns the messages it produced.
    pub fn execute_command(&self, command: &str) -> RlaResult<Vec<HostMessage>> {
        match self.config.strategy {
            Strategy::Native => self
                .native
                .as_ref()
                .ok_or_else(|| Self::unbound(Strategy::Native))?
                .execute_command(command),
            Strategy::Remote => self
                .remote
                .as_ref()
                .ok_or_else(|| Self::unbound(Strategy::Remote))?
                .execute_command(command),
        }
    }

    pub fn commit(&self) -> RlaResult<()> {
        match self.config.strategy {
            Strategy::Native => self.native.as_ref().ok_or_else(|| Self::unbound(Strategy::Native))?.commit(),
            Strategy::Remote => self.remote.as_ref().ok_or_else(|| Self::unbound(Strategy::Remote))?.commit(),
        }
    }

    pub fn rollback(&self) -> RlaResult<()> {
        match self.config.strategy {
            Strategy::Native => self.native.as_ref().ok_or_else(|| Self::unbound(Strategy::Native))?.rollback(),
            Strategy::Remote => self.remote.as_ref().ok_or_else(|| Self::unbound(Strategy::Remote))?.rollback(),
        }
    }

    /// Start commitment control for the job with STRCMTCTL.
    pub fn start_commitment_control(&self, level: CommitLockLevel) -> RlaResult<Vec<HostMessage>> {
        let Some(value) = level.cl_value() else {
            return Err(RlaError::invalid(
                "level",
                "commitment control needs a lock level other than none",
            ));
        };
        self.execute_command(&format!("STRCMTCTL LCKLVL({})", value))
    }

    /// End commitment control for the job with ENDCMTCTL.
    pub fn end_commitment_control(&self) -> RlaResult<Vec<HostMessage>> {
        self.execute_command("ENDCMTCTL")
    }
}
