//! Capture configuration.
//!
//! Everything here tunes how much diagnostic data the error monitor gathers.
//! Defaults are usable as-is; TOML loading is available behind the
//! `config-file` feature and two environment variables override the most
//! commonly adjusted knobs:
//!
//! | Variable | Field |
//! |---|---|
//! | `BELT_CAPTURE_THREADS` | [`CaptureConfig::capture_threads`] |
//! | `BELT_THREAD_DUMP_MAX_BYTES` | [`ThreadDumpConfig::max_bytes`] |

use crate::capture::stack::{DEFAULT_POOL_CAPACITY, DEFAULT_STACK_BUFFER_LEN};
use crate::error::{Error, Result};
use serde::Deserialize;

/// Environment variable toggling thread capture.
pub const ENV_CAPTURE_THREADS: &str = "BELT_CAPTURE_THREADS";

/// Environment variable overriding the thread dump ceiling.
pub const ENV_THREAD_DUMP_MAX_BYTES: &str = "BELT_THREAD_DUMP_MAX_BYTES";

/// Bounds for the thread dump scratch buffer.
///
/// The buffer grows with the number of live threads and is capped:
/// `min(threads * bytes_per_thread, max_bytes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThreadDumpConfig {
    /// Bytes reserved per live thread.
    pub bytes_per_thread: usize,
    /// Hard ceiling for the whole dump.
    pub max_bytes: usize,
}

impl ThreadDumpConfig {
    /// 64 KiB per thread.
    pub const DEFAULT_BYTES_PER_THREAD: usize = 64 * 1024;
    /// 10 MiB ceiling.
    pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

    /// Scratch capacity for a process with `threads` live threads.
    #[must_use]
    pub fn capacity_for(&self, threads: usize) -> usize {
        threads
            .max(1)
            .saturating_mul(self.bytes_per_thread)
            .min(self.max_bytes)
    }
}

impl Default for ThreadDumpConfig {
    fn default() -> Self {
        Self {
            bytes_per_thread: Self::DEFAULT_BYTES_PER_THREAD,
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }
}

/// Configuration for [`SystemCapture`](crate::capture::SystemCapture).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Addresses recorded per stack walk.
    pub stack_buffer_len: usize,
    /// Idle scratch buffers kept for reuse.
    pub pool_capacity: usize,
    /// Whether events carry a snapshot of every live thread.
    pub capture_threads: bool,
    /// Thread dump sizing.
    pub thread_dump: ThreadDumpConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stack_buffer_len: DEFAULT_STACK_BUFFER_LEN,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            capture_threads: true,
            thread_dump: ThreadDumpConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()
    }

    /// Reads and parses a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Applies `BELT_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup` (keyed by variable name).
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_CAPTURE_THREADS) {
            self.capture_threads = parse_flag(&raw).ok_or_else(|| {
                Error::Config(format!("{ENV_CAPTURE_THREADS}: expected a boolean, got {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_THREAD_DUMP_MAX_BYTES) {
            self.thread_dump.max_bytes = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{ENV_THREAD_DUMP_MAX_BYTES}: expected a byte count, got {raw:?}"
                ))
            })?;
        }
        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.stack_buffer_len == 0 {
            return Err(Error::Config("stack_buffer_len must be positive".into()));
        }
        if self.thread_dump.bytes_per_thread == 0 {
            return Err(Error::Config(
                "thread_dump.bytes_per_thread must be positive".into(),
            ));
        }
        if self.thread_dump.max_bytes == 0 {
            return Err(Error::Config("thread_dump.max_bytes must be positive".into()));
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.stack_buffer_len, 1000);
        assert_eq!(config.pool_capacity, 16);
        assert!(config.capture_threads);
        assert_eq!(config.thread_dump.bytes_per_thread, 64 * 1024);
        assert_eq!(config.thread_dump.max_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn dump_capacity_is_capped() {
        let dump = ThreadDumpConfig::default();
        assert_eq!(dump.capacity_for(0), 64 * 1024);
        assert_eq!(dump.capacity_for(4), 4 * 64 * 1024);
        assert_eq!(dump.capacity_for(100_000), dump.max_bytes);
    }

    #[test]
    fn overrides_apply() {
        let config = CaptureConfig::default()
            .with_overrides_from(lookup(&[
                (ENV_CAPTURE_THREADS, "off"),
                (ENV_THREAD_DUMP_MAX_BYTES, "4096"),
            ]))
            .expect("valid overrides");
        assert!(!config.capture_threads);
        assert_eq!(config.thread_dump.max_bytes, 4096);
    }

    #[test]
    fn bad_override_is_config_error() {
        let err = CaptureConfig::default()
            .with_overrides_from(lookup(&[(ENV_CAPTURE_THREADS, "maybe")]))
            .expect_err("invalid flag");
        assert!(matches!(err, Error::Config(_)));

        let err = CaptureConfig::default()
            .with_overrides_from(lookup(&[(ENV_THREAD_DUMP_MAX_BYTES, "lots")]))
            .expect_err("invalid size");
        assert!(err.to_string().contains(ENV_THREAD_DUMP_MAX_BYTES));
    }

    #[test]
    fn zero_dump_ceiling_is_rejected() {
        let err = CaptureConfig::default()
            .with_overrides_from(lookup(&[(ENV_THREAD_DUMP_MAX_BYTES, "0")]))
            .expect_err("empty dumps");
        assert!(err.to_string().contains("max_bytes"));
    }

    #[test]
    fn no_overrides_is_identity() {
        let config = CaptureConfig::default()
            .with_overrides_from(|_| None)
            .expect("defaults are valid");
        assert_eq!(config, CaptureConfig::default());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_partial_document() {
        let config = CaptureConfig::from_toml_str(
            r"
            capture_threads = false

            [thread_dump]
            max_bytes = 1048576
            ",
        )
        .expect("valid toml");
        assert!(!config.capture_threads);
        assert_eq!(config.thread_dump.max_bytes, 1_048_576);
        assert_eq!(config.thread_dump.bytes_per_thread, 64 * 1024);
        assert_eq!(config.stack_buffer_len, 1000);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_zero_buffer() {
        let err = CaptureConfig::from_toml_str("stack_buffer_len = 0").expect_err("invalid");
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_loads_and_missing_file_is_io_error() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "pool_capacity = 4").expect("write");
        let config = CaptureConfig::from_toml_file(file.path()).expect("valid file");
        assert_eq!(config.pool_capacity, 4);

        let missing = CaptureConfig::from_toml_file(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
