use std::{fmt, str::FromStr};

/// Host family a query is dispatched on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
    Other(String),
}

const UNIX_FAMILY: &[&str] = &[
    "linux",
    "macos",
    "ios",
    "android",
    "freebsd",
    "netbsd",
    "openbsd",
    "dragonfly",
    "solaris",
    "illumos",
    "aix",
    // Node-style names, accepted from config and the CLI.
    "darwin",
    "sunos",
];

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        let os = os.trim().to_ascii_lowercase();
        if os == "unix" || UNIX_FAMILY.contains(&os.as_str()) {
            Platform::Unix
        } else if os == "windows" || os == "win32" {
            Platform::Windows
        } else {
            Platform::Other(os)
        }
    }
}

impl FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_os(s))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Unix => f.write_str("unix"),
            Platform::Windows => f.write_str("windows"),
            Platform::Other(name) => f.write_str(name),
        }
    }
}
