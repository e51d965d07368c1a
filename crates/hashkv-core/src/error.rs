//! Error types for HashKV operations
//!
//! Every fallible engine operation returns `KvResult<T>`. Command-level
//! failures (wrong arity, non-integer counters) are NOT errors here: they are
//! ordinary `-ERR` replies produced by the command layer.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// HashKV error types with enough context to diagnose a failed startup or append
#[derive(Debug, Clone)]
pub enum KvError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred, if known
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Input is not valid RESP
    Protocol {
        /// Byte offset of the value that failed to decode
        offset: u64,
        /// Description of what was wrong
        reason: String,
    },

    /// Input ended in the middle of a value (crash mid-write, or a half-sent request)
    TruncatedEntry {
        /// Offset where the incomplete value begins
        offset: u64,
    },

    /// A log entry decoded as RESP but is not a command this server ever logs
    CorruptEntry {
        /// Offset of the entry in the log
        offset: u64,
        /// Why the entry was rejected
        reason: String,
    },

    /// The append-only log was already closed
    LogClosed {
        /// Path of the closed log
        path: PathBuf,
    },

    /// A configuration parameter is out of range
    InvalidConfig {
        /// Which parameter and why
        reason: String,
    },
}

impl KvError {
    pub(crate) fn io_at(path: &std::path::Path, err: std::io::Error, context: &str) -> Self {
        KvError::Io {
            path: Some(path.to_path_buf()),
            kind: err.kind(),
            message: format!("{}: {}", context, err),
        }
    }

    pub(crate) fn protocol(offset: u64, reason: impl Into<String>) -> Self {
        KvError::Protocol { offset, reason: reason.into() }
    }
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            KvError::Protocol { offset, reason } => {
                write!(f, "Protocol error at offset {}: {}", offset, reason)
            }

            KvError::TruncatedEntry { offset } => {
                write!(f, "Truncated entry at offset {}", offset)
            }

            KvError::CorruptEntry { offset, reason } => {
                write!(f, "Corrupt log entry at offset {}: {}", offset, reason)
            }

            KvError::LogClosed { path } => {
                write!(f, "Append-only log {} is closed", path.display())
            }

            KvError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
        }
    }
}

impl Error for KvError {}

/// Convert std::io::Error to KvError::Io
impl From<std::io::Error> for KvError {
    fn from(err: std::io::Error) -> Self {
        KvError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for HashKV operations
pub type KvResult<T> = Result<T, KvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KvError::Protocol {
            offset: 42,
            reason: "expected '$', got '?'".to_string(),
        };

        let display = format!("{}", err);
        assert!(display.contains("Protocol error"));
        assert!(display.contains("42"));
        assert!(display.contains("expected '$'"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let kv_err: KvError = io_err.into();

        match kv_err {
            KvError::Io { kind, path, .. } => {
                assert_eq!(kind, std::io::ErrorKind::NotFound);
                assert!(path.is_none());
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_corrupt_entry_display() {
        let err = KvError::CorruptEntry { offset: 97, reason: "ERR unknown command 'bogus'".to_string() };
        let display = err.to_string();
        assert!(display.contains("97"));
        assert!(display.contains("bogus"));
    }

    #[test]
    fn test_io_at_keeps_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = KvError::io_at(std::path::Path::new("/tmp/db.aof"), io_err, "AOF append failed");
        let display = err.to_string();
        assert!(display.contains("/tmp/db.aof"));
        assert!(display.contains("AOF append failed"));
    }
}
