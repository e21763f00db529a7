//! Unix backend: `ps` with oversized columns.
//!
//! Each header label is padded with underscores far past any realistic
//! value, so `ps` never truncates a field. Data rows are not padded to the
//! header though, so rows are split on the padding gap rather than on
//! header offsets.

use crate::error::{QueryError, Result, RowError};
use crate::record::{PidFilter, ProcessRecord, split_exec_path};
use crate::spawn::{Spawner, TokioSpawner};
use crate::{MalformedRows, ProcBackend, QueryConfig};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const UNIX_SEPARATORS: &[char] = &['/'];

// Linux keeps at most 15 bytes of the command name (TASK_COMM_LEN - 1).
const COMM_TRUNCATED_LEN: usize = 15;

/// Widths requested for the `pid`, `comm` and `args` columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub pid: usize,
    pub comm: usize,
    pub args: usize,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            pid: 10,
            comm: 8192,
            args: 8192,
        }
    }
}

impl ColumnSpec {
    pub fn columns(&self) -> [(&'static str, usize); 3] {
        [("pid", self.pid), ("comm", self.comm), ("args", self.args)]
    }

    /// The `-o` format string, e.g. `pid=pid_______,comm=comm___…,args=args___…`.
    pub fn render(&self) -> String {
        self.columns()
            .iter()
            .map(|(name, width)| format!("{}={}", name, padded_label(name, *width)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The header line `ps` prints for this spec.
    pub fn header(&self) -> String {
        self.columns()
            .iter()
            .map(|(name, width)| padded_label(name, *width))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn padded_label(name: &str, width: usize) -> String {
    let mut label = name.to_string();
    while label.len() < width {
        label.push('_');
    }
    label
}

/// Builds the `ps` argument list. `columns` is consulted exactly once.
pub fn spawn_args<F>(pid: Option<&PidFilter>, columns: F) -> Vec<String>
where
    F: FnOnce() -> String,
{
    let mut args = match pid {
        Some(pid) => vec!["-p".to_string(), pid.to_string()],
        None => vec!["-A".to_string()],
    };
    args.push("-o".to_string());
    args.push(columns());
    args
}

fn is_kernel_thread(path: &str, args: &str) -> bool {
    args.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) == Some(path)
}

// A directory with whitespace in it only counts when it still reads as a
// single path, not as a program followed by more arguments.
fn is_argv0_dir(dir: &str) -> bool {
    !dir.contains(char::is_whitespace)
        || (dir.starts_with(['/', '.']) && !dir.contains(" -") && !dir.contains(" /"))
}

/// Byte length of the argv[0] prefix of `args` naming the executable in `record`.
fn argv0_len(args: &str, path: &str, command: &str) -> Option<usize> {
    let ends = args
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(idx, _)| idx)
        .chain(std::iter::once(args.len()));

    for end in ends {
        let candidate = &args[..end];
        if candidate == path {
            return Some(end);
        }
        let (dir, name) = split_exec_path(candidate, UNIX_SEPARATORS);
        if dir.is_empty() || !is_argv0_dir(dir) {
            continue;
        }
        let truncated = command.len() == COMM_TRUNCATED_LEN
            && name.len() > COMM_TRUNCATED_LEN
            && name.starts_with(command);
        if name == command || truncated {
            return Some(end);
        }
    }
    None
}

/// Parses one data row of `ps` output.
///
/// Rows are not padded to the header's width, so the fields are found by
/// shape: the pid is the first token, `comm` runs up to the padding gap (two
/// or more spaces) and whatever follows the gap is `args`. A path holding a
/// double space is cut at it.
pub fn parse_row(line: &str) -> Result<ProcessRecord, RowError> {
    let line = line.trim();
    let (pid_field, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    if pid_field.is_empty() {
        return Err(RowError::MissingField("pid"));
    }
    let pid = pid_field
        .parse::<u32>()
        .map_err(|_| RowError::BadPid(pid_field.to_string()))?;

    let rest = rest.trim_start();
    let (path, args) = match rest.find("  ") {
        Some(gap) => (&rest[..gap], rest[gap..].trim_start()),
        None => (rest, ""),
    };
    if path.is_empty() {
        return Err(RowError::MissingField("comm"));
    }

    if is_kernel_thread(path, args) {
        return Ok(ProcessRecord {
            pid,
            command: path.to_string(),
            ..ProcessRecord::default()
        });
    }

    let mut record = ProcessRecord::from_path(pid, path, "", UNIX_SEPARATORS);

    // The args column repeats argv[0]; drop it when it names this executable.
    match argv0_len(args, path, &record.command) {
        Some(end) => {
            let (argv0_dir, argv0_name) = split_exec_path(&args[..end], UNIX_SEPARATORS);
            if record.exec_dir.is_empty() && !argv0_dir.is_empty() {
                record.exec_dir = argv0_dir.to_string();
                record.command = argv0_name.to_string();
            }
            record.args = args[end..].trim_start().to_string();
        }
        None => record.args = args.to_string(),
    }

    Ok(record)
}

/// Rows read from one `ps` run.
#[derive(Debug, Default)]
pub struct Listing {
    /// Whether `ps` got as far as printing its header.
    pub header_seen: bool,
    pub records: Vec<ProcessRecord>,
}

/// Consumes `ps` output line by line: a header, then one row per process.
pub async fn parse_stream<R>(
    reader: &mut R,
    spec: &ColumnSpec,
    malformed_rows: MalformedRows,
    program: &str,
) -> Result<Listing>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut listing = Listing::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|source| QueryError::StreamRead {
                program: program.to_string(),
                source,
            })?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }

        if !listing.header_seen {
            listing.header_seen = true;
            if !line.trim_start().starts_with(&padded_label("pid", spec.pid)) {
                tracing::debug!(program, "header does not carry the requested labels");
            }
            continue;
        }

        match parse_row(line) {
            Ok(record) => listing.records.push(record),
            Err(source) => match malformed_rows {
                MalformedRows::Skip => {
                    tracing::warn!(program, line = line_no, error = %source, "skipping malformed row");
                }
                MalformedRows::Fail => {
                    return Err(QueryError::MalformedRow {
                        line: line_no,
                        source,
                    });
                }
            },
        }
    }

    Ok(listing)
}

/// Lists processes by running `ps`.
pub struct PsBackend {
    program: String,
    columns: ColumnSpec,
    malformed_rows: MalformedRows,
    spawner: Arc<dyn Spawner>,
}

impl PsBackend {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            program: config.ps_program.clone(),
            columns: config.columns,
            malformed_rows: config.malformed_rows,
            spawner: Arc::new(TokioSpawner),
        }
    }

    pub fn with_spawner<S>(mut self, spawner: S) -> Self
    where
        S: Spawner + 'static,
    {
        self.spawner = Arc::new(spawner);
        self
    }

    pub fn invocation(&self, pid: Option<&PidFilter>) -> Vec<String> {
        spawn_args(pid, || self.columns.render())
    }
}

impl Default for PsBackend {
    fn default() -> Self {
        Self::new(&QueryConfig::default())
    }
}

#[async_trait::async_trait]
impl ProcBackend for PsBackend {
    async fn list(&self, pid: Option<&PidFilter>) -> Result<Vec<ProcessRecord>> {
        let args = self.invocation(pid);
        let mut spawned = self.spawner.spawn(&self.program, &args).await?;

        let listing = parse_stream(
            &mut *spawned.stdout,
            &self.columns,
            self.malformed_rows,
            &self.program,
        )
        .await?;

        if let Some(exit) = spawned.wait().await?
            && !exit.success()
        {
            if !listing.header_seen {
                return Err(exit.into_error(&self.program));
            }
            // `ps -p <gone>` prints the header and exits 1.
            tracing::debug!(program = %self.program, status = %exit.status, "ps exited unsuccessfully");
        }

        let records = listing.records;
        tracing::debug!(count = records.len(), "parsed ps rows");
        Ok(records)
    }
}
