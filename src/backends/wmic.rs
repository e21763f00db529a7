//! Windows backend: `wmic process get … /format:csv`.

use crate::error::{QueryError, Result, RowError};
use crate::record::{PidFilter, ProcessRecord, split_exec_path};
use crate::spawn::{Spawner, TokioSpawner};
use crate::{MalformedRows, ProcBackend, QueryConfig};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

pub const WINDOWS_SEPARATORS: &[char] = &['\\', '/'];

pub const WMIC_FIELDS: &str = "CommandLine,ExecutablePath,Name,ProcessId";

const NO_INSTANCES: &str = "No Instance(s) Available";

pub fn spawn_args(pid: Option<&PidFilter>) -> Vec<String> {
    let mut args = vec!["process".to_string()];
    if let Some(pid) = pid {
        args.push("where".to_string());
        args.push(format!("ProcessId={pid}"));
    }
    args.push("get".to_string());
    args.push(WMIC_FIELDS.to_string());
    args.push("/format:csv".to_string());
    args
}

/// Decodes raw `wmic` output, which is UTF-16LE when it carries a BOM.
pub fn decode_output(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Splits a command line into its program token and the raw rest.
///
/// The program token follows the loader's rules rather than argv's: a
/// leading quote runs to the next quote and backslashes are never escapes.
pub fn split_program(command_line: &str) -> (&str, &str) {
    let line = command_line.trim_start();
    if let Some(quoted) = line.strip_prefix('"') {
        return match quoted.split_once('"') {
            Some((program, rest)) => (program, rest.trim()),
            None => (quoted, ""),
        };
    }
    match line.split_once(char::is_whitespace) {
        Some((program, rest)) => (program, rest.trim()),
        None => (line, ""),
    }
}

/// Builds a record from the `CommandLine`, `ExecutablePath` and `Name` fields.
///
/// System processes report no command line; those fall back to the
/// executable path, then to the bare name.
pub fn record_from_command_line(
    pid: u32,
    command_line: &str,
    executable_path: &str,
    name: &str,
) -> ProcessRecord {
    let (program, args) = split_program(command_line);

    if !program.is_empty() {
        let mut record = ProcessRecord::from_path(pid, program, args, WINDOWS_SEPARATORS);
        if record.exec_dir.is_empty() {
            let (exe_dir, exe_name) = split_exec_path(executable_path, WINDOWS_SEPARATORS);
            if exe_name.eq_ignore_ascii_case(&record.command)
                || exe_name.eq_ignore_ascii_case(&format!("{}.exe", record.command))
            {
                record.exec_dir = exe_dir.to_string();
                record.command = exe_name.to_string();
            }
        }
        return record;
    }

    if !executable_path.is_empty() {
        return ProcessRecord::from_path(pid, executable_path, "", WINDOWS_SEPARATORS);
    }

    ProcessRecord {
        pid,
        command: name.to_string(),
        ..ProcessRecord::default()
    }
}

fn names_same_program(command_line: &str, executable_path: &str) -> bool {
    let (program, _) = split_program(command_line);
    let executable_path = executable_path.trim();
    !program.is_empty() && program.eq_ignore_ascii_case(executable_path)
}

struct Columns {
    width: usize,
    pid: usize,
    command_line: Option<usize>,
    executable_path: Option<usize>,
    name: Option<usize>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        Some(Self {
            width: headers.len(),
            pid: find("ProcessId")?,
            command_line: find("CommandLine"),
            executable_path: find("ExecutablePath"),
            name: find("Name"),
        })
    }

    /// Fields of `record` with surplus ones glued back together.
    ///
    /// wmic writes fields verbatim, so every comma inside a value splits it.
    /// Surplus fields belong to `CommandLine`, except that an
    /// `ExecutablePath` right after it takes back its share when that makes
    /// the command line's program and the path agree.
    fn fields(&self, record: &csv::StringRecord) -> Vec<String> {
        let fields: Vec<&str> = record.iter().collect();
        let Some(cl) = self.command_line.filter(|_| fields.len() > self.width) else {
            return fields.iter().map(|s| s.to_string()).collect();
        };
        let extra = fields.len() - self.width;
        let exe_follows = self.executable_path == Some(cl + 1);

        let exe_share = if exe_follows {
            (0..=extra)
                .find(|&share| {
                    let line = fields[cl..=cl + extra - share].join(",");
                    let exe = fields[cl + extra - share + 1..=cl + extra + 1].join(",");
                    names_same_program(&line, &exe)
                })
                .unwrap_or(0)
        } else {
            0
        };

        let cl_end = cl + extra - exe_share;
        let mut out: Vec<String> = fields[..cl].iter().map(|s| s.to_string()).collect();
        out.push(fields[cl..=cl_end].join(","));
        let rest = if exe_follows {
            out.push(fields[cl_end + 1..=cl + extra + 1].join(","));
            cl + extra + 2
        } else {
            cl_end + 1
        };
        out.extend(fields[rest..].iter().map(|s| s.to_string()));
        out
    }

    fn parse(&self, record: &csv::StringRecord) -> Result<ProcessRecord, RowError> {
        let fields = self.fields(record);
        let get = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i))
                .map(|s| s.trim())
                .unwrap_or("")
        };

        let pid_field = get(Some(self.pid));
        if pid_field.is_empty() {
            return Err(RowError::MissingField("ProcessId"));
        }
        let pid = pid_field
            .parse::<u32>()
            .map_err(|_| RowError::BadPid(pid_field.to_string()))?;

        Ok(record_from_command_line(
            pid,
            get(self.command_line),
            get(self.executable_path),
            get(self.name),
        ))
    }
}

/// Parses the CSV blob `wmic /format:csv` writes.
///
/// Despite the name the format has no quoting: a `"` in a field is part of
/// the value.
pub fn parse_csv(text: &str, malformed_rows: MalformedRows) -> Result<Vec<ProcessRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        // `where` matched nothing: wmic prints no table at all.
        return Ok(Vec::new());
    }
    let Some(columns) = Columns::locate(&headers) else {
        return Err(QueryError::MalformedRow {
            line: headers.position().map_or(1, |p| p.line() as usize),
            source: RowError::MissingField("ProcessId"),
        });
    };

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match columns.parse(&row) {
            Ok(record) => records.push(record),
            Err(source) => {
                let line = row.position().map_or(0, |p| p.line() as usize);
                match malformed_rows {
                    MalformedRows::Skip => {
                        tracing::warn!(line, error = %source, "skipping malformed wmic row");
                    }
                    MalformedRows::Fail => {
                        return Err(QueryError::MalformedRow { line, source });
                    }
                }
            }
        }
    }

    Ok(records)
}

/// Lists processes by running `wmic`.
pub struct WmicBackend {
    program: String,
    malformed_rows: MalformedRows,
    spawner: Arc<dyn Spawner>,
}

impl WmicBackend {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            program: config.wmic_program.clone(),
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
}

impl Default for WmicBackend {
    fn default() -> Self {
        Self::new(&QueryConfig::default())
    }
}

#[async_trait::async_trait]
impl ProcBackend for WmicBackend {
    async fn list(&self, pid: Option<&PidFilter>) -> Result<Vec<ProcessRecord>> {
        let args = spawn_args(pid);
        let mut spawned = self.spawner.spawn(&self.program, &args).await?;

        let mut raw = Vec::new();
        spawned
            .stdout
            .read_to_end(&mut raw)
            .await
            .map_err(|source| QueryError::StreamRead {
                program: self.program.clone(),
                source,
            })?;

        let text = decode_output(&raw);
        if let Some(exit) = spawned.wait().await?
            && !exit.success()
        {
            // An empty `where` match is reported on stderr, not as a failure.
            if text.trim().is_empty() && !exit.stderr.contains(NO_INSTANCES) {
                return Err(exit.into_error(&self.program));
            }
            tracing::debug!(program = %self.program, status = %exit.status, "wmic exited unsuccessfully");
        }

        let records = parse_csv(&text, self.malformed_rows)?;
        tracing::debug!(count = records.len(), "parsed wmic rows");
        Ok(records)
    }
}
