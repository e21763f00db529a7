use serde::{Deserialize, Serialize};
use std::fmt;

/// One running process, normalized across backends.
///
/// Serializes as `{ "pid", "command", "args", "execDir" }`; consumers depend
/// on that shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub pid: u32,
    /// Base name of the executable.
    pub command: String,
    /// Raw argument text following the executable.
    pub args: String,
    /// Directory part of the executable path, empty when none was reported.
    pub exec_dir: String,
}

impl ProcessRecord {
    /// Builds a record from a path+command token, splitting off the directory.
    pub fn from_path(pid: u32, path: &str, args: &str, separators: &[char]) -> Self {
        let (exec_dir, command) = split_exec_path(path, separators);
        Self {
            pid,
            command: command.to_string(),
            args: args.to_string(),
            exec_dir: exec_dir.to_string(),
        }
    }

    /// Argument tokens derived from [`ProcessRecord::args`], quotes removed.
    pub fn argv(&self) -> Vec<String> {
        split_command_line(&self.args)
    }

    /// Full executable path, or the bare command when no directory is known.
    pub fn exec_path(&self) -> String {
        if self.exec_dir.is_empty() {
            return self.command.clone();
        }
        if self.exec_dir.ends_with(['/', '\\']) {
            return format!("{}{}", self.exec_dir, self.command);
        }
        format!("{}{}{}", self.exec_dir, self.separator(), self.command)
    }

    // Unix directories are absolute; otherwise the last separator in the
    // directory is the one the path was written with.
    fn separator(&self) -> char {
        if self.exec_dir.starts_with('/') {
            return '/';
        }
        self.exec_dir
            .chars()
            .rev()
            .find(|c| matches!(c, '/' | '\\'))
            .unwrap_or('\\')
    }
}

/// Process id filter handed to a backend.
///
/// Kept as text: the native tool decides what a valid pid is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PidFilter(String);

impl PidFilter {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for PidFilter {
    fn from(pid: u32) -> Self {
        Self(pid.to_string())
    }
}

impl From<i32> for PidFilter {
    fn from(pid: i32) -> Self {
        Self(pid.to_string())
    }
}

impl From<&str> for PidFilter {
    fn from(pid: &str) -> Self {
        Self(pid.to_string())
    }
}

impl From<String> for PidFilter {
    fn from(pid: String) -> Self {
        Self(pid)
    }
}

/// Splits `path` at its last separator into `(directory, name)`.
///
/// A path without a separator yields an empty directory. A file directly
/// under a root (`/init`, `C:\app.exe`) keeps the root, separator included,
/// as its directory.
pub fn split_exec_path<'a>(path: &'a str, separators: &[char]) -> (&'a str, &'a str) {
    let Some(idx) = path.rfind(|c| separators.contains(&c)) else {
        return ("", path);
    };
    // `idx` points at an ASCII separator, so `idx + 1` is a char boundary.
    let (dir, name) = (&path[..idx], &path[idx + 1..]);
    if dir.is_empty() || is_drive(dir) {
        (&path[..=idx], name)
    } else {
        (dir, name)
    }
}

fn is_drive(dir: &str) -> bool {
    let bytes = dir.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Tokenizes a command line the way the Windows C runtime builds `argv`.
///
/// Whitespace separates tokens outside double quotes. Backslashes are
/// literal unless they run into a quote: `2n` backslashes before `"` become
/// `n` and the quote toggles quoting, `2n + 1` become `n` plus a literal `"`.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut arg = String::new();
    let mut in_arg = false;
    let mut quoting = false;
    let mut backslashes = 0usize;

    for ch in line.chars() {
        match ch {
            '\\' => {
                backslashes += 1;
                in_arg = true;
            }
            '"' => {
                arg.extend(std::iter::repeat_n('\\', backslashes / 2));
                if backslashes % 2 == 1 {
                    arg.push('"');
                } else {
                    quoting = !quoting;
                }
                backslashes = 0;
                in_arg = true;
            }
            ' ' | '\t' if !quoting => {
                arg.extend(std::iter::repeat_n('\\', backslashes));
                backslashes = 0;
                if in_arg {
                    argv.push(std::mem::take(&mut arg));
                    in_arg = false;
                }
            }
            _ => {
                arg.extend(std::iter::repeat_n('\\', backslashes));
                backslashes = 0;
                arg.push(ch);
                in_arg = true;
            }
        }
    }

    arg.extend(std::iter::repeat_n('\\', backslashes));
    if in_arg {
        argv.push(arg);
    }

    argv
}
