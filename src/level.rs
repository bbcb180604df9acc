//! Severity levels.
//!
//! Error-monitoring events are stamped [`Level::Error`] or [`Level::Panic`];
//! the remaining levels exist so that logger tools sharing a belt agree on
//! one scale.

use core::fmt;

/// Severity level of an entry.
///
/// Levels are ordered from least to most severe. Filtering can be done
/// by comparing levels: `entry.level() >= Level::Warn`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Fine-grained debugging information (very verbose).
    Trace = 0,
    /// Debugging information for development.
    Debug = 1,
    /// General informational messages.
    #[default]
    Info = 2,
    /// Potentially problematic situations.
    Warn = 3,
    /// Error conditions that don't halt execution.
    Error = 4,
    /// A recovered panic.
    Panic = 5,
}

impl Level {
    /// Returns the level name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Panic => "PANIC",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Panic);
    }

    #[test]
    fn level_strings() {
        assert_eq!(Level::Panic.as_str(), "PANIC");
        assert_eq!(Level::default(), Level::Info);
        assert_eq!(Level::Error.to_string(), "ERROR");
    }
}
