use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors surfaced by the emulator outside of instruction execution.
///
/// ROM failures are fatal at startup; everything else aborts only the
/// operation that produced it and leaves the machine running.
#[derive(Debug)]
pub enum EmulatorError {
    Io { path: PathBuf, source: io::Error },
    RomMissing { name: &'static str, path: PathBuf },
    RomTooShort { name: &'static str, expected: usize, actual: usize },
    OutOfRange { start: u16, len: usize },
    InvalidRange { start: u16, end: u16 },
    MalformedHex { line: usize, reason: String },
    Config { line: usize, reason: String },
    InvalidSetting { name: &'static str, value: String },
    Snapshot(String),
    Spawn(io::Error),
}

impl fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulatorError::Io { path, source } => {
                write!(f, "I/O error on \"{}\": {}", path.display(), source)
            }
            EmulatorError::RomMissing { name, path } => {
                write!(f, "could not load {} ROM from \"{}\"", name, path.display())
            }
            EmulatorError::RomTooShort { name, expected, actual } => write!(
                f,
                "{} ROM is {} bytes, expected {}",
                name, actual, expected
            ),
            EmulatorError::OutOfRange { start, len } => write!(
                f,
                "{} bytes at ${:04X} would run past the end of the address space",
                len, start
            ),
            EmulatorError::InvalidRange { start, end } => {
                write!(f, "invalid memory range ${:04X}-${:04X}", start, end)
            }
            EmulatorError::MalformedHex { line, reason } => {
                write!(f, "malformed hex record on line {}: {}", line, reason)
            }
            EmulatorError::Config { line, reason } => {
                write!(f, "configuration line {}: {}", line, reason)
            }
            EmulatorError::InvalidSetting { name, value } => {
                write!(f, "invalid value \"{}\" for {}", value, name)
            }
            EmulatorError::Snapshot(reason) => write!(f, "snapshot error: {}", reason),
            EmulatorError::Spawn(e) => write!(f, "could not start the execution thread: {}", e),
        }
    }
}

impl std::error::Error for EmulatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmulatorError::Io { source, .. } => Some(source),
            EmulatorError::Spawn(source) => Some(source),
            _ => None,
        }
    }
}

impl EmulatorError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EmulatorError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
