//! Normalized process listing on top of the platform's native tool.
//!
//! Unix hosts run `ps` with oversized columns, Windows hosts run `wmic` in
//! CSV mode. Both produce the same [`ProcessRecord`]s.
//!
//! ```no_run
//! # async fn demo() -> Result<(), pslist::QueryError> {
//! let query = pslist::ProcQuery::new(None);
//! for p in query.query(None).await? {
//!     println!("{} {} {}", p.pid, p.exec_path(), p.args);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod completion;
pub mod error;
pub mod platform;
pub mod record;
pub mod spawn;

pub use crate::backends::ps::ColumnSpec;
pub use crate::completion::{CompletionFn, Deferred, SharedResult};
pub use crate::error::{QueryError, RowError};
pub use crate::platform::Platform;
pub use crate::record::{PidFilter, ProcessRecord};

use crate::backends::{ps::PsBackend, wmic::WmicBackend};
use crate::error::Result;
use std::sync::Arc;

/// A platform-specific process lister.
#[async_trait::async_trait]
pub trait ProcBackend: Send + Sync {
    async fn list(&self, pid: Option<&PidFilter>) -> Result<Vec<ProcessRecord>>;
}

/// What to do with an output row that cannot be parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedRows {
    /// Log and drop the row.
    #[default]
    Skip,
    /// Abort the query with [`QueryError::MalformedRow`].
    Fail,
}

#[derive(Clone, Debug)]
pub struct QueryConfig {
    platform: Option<Platform>,
    pub(crate) ps_program: String,
    pub(crate) wmic_program: String,
    pub(crate) columns: ColumnSpec,
    pub(crate) malformed_rows: MalformedRows,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            platform: None,
            ps_program: "ps".to_string(),
            wmic_program: "wmic".to_string(),
            columns: ColumnSpec::default(),
            malformed_rows: MalformedRows::default(),
        }
    }
}

impl QueryConfig {
    /// Pins the platform. Unset, the host is inspected on every query.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn ps_program<S: Into<String>>(mut self, program: S) -> Self {
        self.ps_program = program.into();
        self
    }

    pub fn wmic_program<S: Into<String>>(mut self, program: S) -> Self {
        self.wmic_program = program.into();
        self
    }

    pub fn columns(mut self, columns: ColumnSpec) -> Self {
        self.columns = columns;
        self
    }

    pub fn malformed_rows(mut self, policy: MalformedRows) -> Self {
        self.malformed_rows = policy;
        self
    }

    fn get_platform(&self) -> Platform {
        self.platform.clone().unwrap_or_else(Platform::current)
    }
}

/// Front door: picks the backend for the platform and runs the query.
pub struct ProcQuery {
    config: QueryConfig,
    unix: Arc<dyn ProcBackend>,
    windows: Arc<dyn ProcBackend>,
}

impl ProcQuery {
    pub fn new(cfg: Option<QueryConfig>) -> Self {
        let config = cfg.unwrap_or_default();
        Self {
            unix: Arc::new(PsBackend::new(&config)),
            windows: Arc::new(WmicBackend::new(&config)),
            config,
        }
    }

    pub fn set_platform(&mut self, platform: Platform) {
        self.config.platform = Some(platform);
    }

    pub fn set_unix_backend<B>(&mut self, backend: B)
    where
        B: ProcBackend + 'static,
    {
        self.unix = Arc::new(backend);
    }

    pub fn set_windows_backend<B>(&mut self, backend: B)
    where
        B: ProcBackend + 'static,
    {
        self.windows = Arc::new(backend);
    }

    fn backend(&self) -> Result<Arc<dyn ProcBackend>> {
        match self.config.get_platform() {
            Platform::Unix => Ok(self.unix.clone()),
            Platform::Windows => Ok(self.windows.clone()),
            Platform::Other(name) => Err(QueryError::UnsupportedPlatform(name)),
        }
    }

    /// Lists every process, or only `pid`.
    pub async fn query(&self, pid: Option<PidFilter>) -> Result<Vec<ProcessRecord>> {
        let backend = self.backend()?;
        tracing::debug!(pid = ?pid, "querying processes");
        backend.list(pid.as_ref()).await
    }

    /// Like [`ProcQuery::query`], also handing the outcome to `callback`.
    pub async fn query_with<F>(&self, pid: Option<PidFilter>, callback: F) -> Result<Vec<ProcessRecord>>
    where
        F: FnOnce(Option<&QueryError>, &[ProcessRecord]),
    {
        let result = self.query(pid).await;
        completion::notify(&result, callback);
        result
    }

    /// Every process on the host.
    pub async fn list(&self) -> Result<Vec<ProcessRecord>> {
        self.query(None).await
    }

    /// The process with id `pid`, or `None` when the tool reports no such process.
    pub async fn lookup<P: Into<PidFilter>>(&self, pid: P) -> Result<Option<ProcessRecord>> {
        let pid = pid.into();
        let wanted = pid.as_str().trim().parse::<u32>().ok();
        let records = self.query(Some(pid)).await?;
        Ok(records
            .into_iter()
            .find(|record| wanted.is_none_or(|wanted| record.pid == wanted)))
    }

    /// Starts the query on the current Tokio runtime and returns a shareable
    /// handle. Called outside a runtime, the handle resolves to
    /// [`QueryError::NoRuntime`].
    pub fn deferred(&self, pid: Option<PidFilter>) -> Deferred {
        self.start(pid, None)
    }

    /// Like [`ProcQuery::deferred`]; `callback` runs once when the query ends.
    pub fn deferred_with<F>(&self, pid: Option<PidFilter>, callback: F) -> Deferred
    where
        F: FnOnce(Option<&QueryError>, &[ProcessRecord]) + Send + 'static,
    {
        self.start(pid, Some(Box::new(callback)))
    }

    fn start(&self, pid: Option<PidFilter>, callback: Option<CompletionFn>) -> Deferred {
        let backend = self.backend();
        Deferred::spawn(
            async move {
                let backend = backend?;
                backend.list(pid.as_ref()).await
            },
            callback,
        )
    }
}

impl Default for ProcQuery {
    fn default() -> Self {
        Self::new(None)
    }
}
