use std::io;
use std::process::ExitStatus;

/// Failure of a whole query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unsupported platform `{0}`")]
    UnsupportedPlatform(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` was spawned without a stdout pipe")]
    MissingStdout { program: String },

    #[error("failed to read output of `{program}`: {source}")]
    StreamRead {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("malformed row on line {line}: {source}")]
    MalformedRow {
        line: usize,
        #[source]
        source: RowError,
    },

    #[error("unreadable wmic csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("query task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("no tokio runtime to run the query on: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Why a single output row could not become a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("pid field `{0}` is not a number")]
    BadPid(String),

    #[error("row is missing the `{0}` field")]
    MissingField(&'static str),
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;
