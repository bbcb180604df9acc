//! Crate error type.
//!
//! Errors never escape the observe entry points of the error monitor: capture
//! and parse failures are logged and degrade the event instead. The variants
//! here surface from the fallible building blocks (config loading, thread dump
//! parsing) when those are used directly.

use thiserror::Error as ThisError;

/// Errors produced by `belt` building blocks.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A raw thread dump did not match the expected layout.
    #[error("malformed thread dump at line {line}: {reason}")]
    ThreadDump {
        /// 1-based line number of the offending line.
        line: usize,
        /// What was expected.
        reason: &'static str,
    },

    /// Reading process state failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for thread dump parse failures.
    #[must_use]
    pub const fn is_thread_dump(&self) -> bool {
        matches!(self, Self::ThreadDump { .. })
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_dump_error_display() {
        let err = Error::ThreadDump {
            line: 3,
            reason: "expected thread header",
        };
        assert!(err.is_thread_dump());
        assert_eq!(
            err.to_string(),
            "malformed thread dump at line 3: expected thread header"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(!err.is_thread_dump());
        assert!(err.to_string().contains("gone"));
    }
}
