//! Thread snapshots.
//!
//! A snapshot is taken in two steps: a raw text dump of every live thread,
//! then a parse of that text into [`ThreadSnapshot`]s. The text layout is:
//!
//! ```text
//! thread 4711 [running, locked to thread]:
//! name: worker-3
//! app::handler::charge
//! 	src/handler.rs:42
//! app::main
//! 	src/main.rs:7
//!
//! thread 4712 [sleeping, locked to thread]:
//! name: tokio-runtime-worker
//! ```
//!
//! On Linux thread ids, states and names come from `/proc/self/task`. Only
//! the calling thread can walk its own stack, so other threads are listed
//! without frames. Elsewhere the dump holds just the calling thread.

use super::frame::Frame;
use super::stack::capture_caller_stack;
use crate::config::ThreadDumpConfig;
use crate::error::{Error, Result};
use crate::tracing_compat::debug;
use std::fmt::Write as _;

const HEADER_PREFIX: &str = "thread ";
const LOCKED_SUFFIX: &str = ", locked to thread";
const NAME_PREFIX: &str = "name: ";
const UNKNOWN: &str = "<unknown>";

/// State of one thread at capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadSnapshot {
    /// OS thread id.
    pub id: u64,
    /// Scheduler state, e.g. `running` or `sleeping`.
    pub state: String,
    /// Whether the unit of execution is pinned to its OS thread. Always
    /// `true` for native threads.
    pub is_locked_to_thread: bool,
    /// Thread name, if any.
    pub name: Option<String>,
    /// Frames, innermost first. Empty when the stack could not be walked.
    pub stack: Vec<Frame>,
}

/// Result of [`capture_threads`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadCapture {
    /// Id of the thread that requested the capture, 0 if unknown.
    pub current_id: u64,
    /// Every thread that parsed.
    pub threads: Vec<ThreadSnapshot>,
}

// ============================================================================
// Dumping
// ============================================================================

/// Dumps every live thread of the process.
///
/// Output beyond `config.capacity_for(thread_count)` bytes is truncated.
#[must_use]
pub fn dump_threads(config: &ThreadDumpConfig) -> String {
    let current = current_thread_info();
    let others = sys::other_threads(current.id);
    let capacity = config.capacity_for(others.len() + 1);

    let mut out = String::with_capacity(capacity.min(64 * 1024));
    write_block(&mut out, &current, capture_caller_stack().resolved());
    for info in &others {
        if out.len() >= capacity {
            break;
        }
        write_block(&mut out, info, &[]);
    }
    truncate_at_boundary(&mut out, capacity);
    out
}

/// Dumps only the calling thread.
#[must_use]
pub fn dump_current(config: &ThreadDumpConfig) -> String {
    let mut out = String::new();
    write_block(
        &mut out,
        &current_thread_info(),
        capture_caller_stack().resolved(),
    );
    truncate_at_boundary(&mut out, config.capacity_for(1));
    out
}

/// Id of the calling thread, read back from a single-thread dump.
///
/// Only the header has to survive truncation. Returns 0 if even the header
/// was cut off.
#[must_use]
pub fn current_thread_id(config: &ThreadDumpConfig) -> u64 {
    first_thread_id(&dump_current(config))
}

fn first_thread_id(dump: &str) -> u64 {
    let (threads, failure) = parse_partial(dump);
    if let Some(err) = failure {
        debug!(error = %err, "current thread dump cut short");
    }
    threads.first().map_or(0, |t| t.id)
}

/// Dumps and parses every live thread. Parse failures keep whatever parsed
/// before the failure.
#[must_use]
pub fn capture_threads(config: &ThreadDumpConfig) -> ThreadCapture {
    let current_id = current_thread_id(config);
    let dump = dump_threads(config);
    let (threads, failure) = parse_partial(&dump);
    if let Some(err) = failure {
        debug!(error = %err, parsed = threads.len(), "thread dump parse stopped early");
    }
    ThreadCapture {
        current_id,
        threads,
    }
}

struct ThreadInfo {
    id: u64,
    state: &'static str,
    name: Option<String>,
}

fn current_thread_info() -> ThreadInfo {
    let mut info = sys::current_thread();
    if let Some(name) = std::thread::current().name() {
        info.name = Some(name.to_string());
    }
    info
}

fn write_block(out: &mut String, info: &ThreadInfo, frames: &[Frame]) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "{HEADER_PREFIX}{} [{}{LOCKED_SUFFIX}]:", info.id, info.state);
    if let Some(name) = &info.name {
        // One line per name; a line break would start a bogus block.
        let name = name.replace(['\r', '\n'], " ");
        let _ = writeln!(out, "{NAME_PREFIX}{name}");
    }
    for frame in frames {
        let function = if frame.function.is_empty() {
            UNKNOWN
        } else {
            &frame.function
        };
        let file = frame.file.as_deref().unwrap_or(UNKNOWN);
        let _ = writeln!(out, "{function}\n\t{file}:{}", frame.line);
    }
}

fn truncate_at_boundary(out: &mut String, capacity: usize) {
    if out.len() <= capacity {
        return;
    }
    let mut cut = capacity;
    while !out.is_char_boundary(cut) {
        cut -= 1;
    }
    out.truncate(cut);
}

fn state_name(code: char) -> &'static str {
    match code {
        'R' => "running",
        'S' => "sleeping",
        'D' => "disk sleep",
        'T' => "stopped",
        't' => "tracing stop",
        'Z' => "zombie",
        'X' => "dead",
        'I' => "idle",
        _ => "unknown",
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use super::{ThreadInfo, state_name};
    use crate::tracing_compat::debug;
    use std::fs;

    /// Parses `pid (comm) S ...` from a `/proc/.../stat` line.
    pub(super) fn parse_stat(stat: &str) -> Option<(u64, char, String)> {
        let open = stat.find('(')?;
        let close = stat.rfind(')')?;
        let id = stat[..open].trim().parse().ok()?;
        let name = stat.get(open + 1..close)?.to_string();
        let state = stat.get(close + 1..)?.trim_start().chars().next()?;
        Some((id, state, name))
    }

    fn read_stat(path: &str) -> Option<ThreadInfo> {
        let stat = match fs::read_to_string(path) {
            Ok(stat) => stat,
            Err(err) => {
                debug!(path, error = %err, "thread stat unreadable");
                return None;
            }
        };
        let (id, state, name) = parse_stat(&stat)?;
        Some(ThreadInfo {
            id,
            state: state_name(state),
            name: (!name.is_empty()).then_some(name),
        })
    }

    pub(super) fn current_thread() -> ThreadInfo {
        read_stat("/proc/thread-self/stat").unwrap_or_else(super::fallback::current_thread)
    }

    pub(super) fn other_threads(current: u64) -> Vec<ThreadInfo> {
        let entries = match fs::read_dir("/proc/self/task") {
            Ok(entries) => entries,
            Err(err) => {
                debug!(error = %err, "thread list unreadable");
                return Vec::new();
            }
        };
        let mut ids: Vec<u64> = entries
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .filter(|&id| id != current)
            .collect();
        ids.sort_unstable();
        // Threads may exit between listing and reading; those are skipped.
        ids.into_iter()
            .filter_map(|id| read_stat(&format!("/proc/self/task/{id}/stat")))
            .collect()
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::ThreadInfo;

    pub(super) fn current_thread() -> ThreadInfo {
        super::fallback::current_thread()
    }

    pub(super) fn other_threads(_current: u64) -> Vec<ThreadInfo> {
        Vec::new()
    }
}

mod fallback {
    use super::ThreadInfo;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }

    /// Process-local id for platforms without OS thread ids.
    pub(super) fn current_thread() -> ThreadInfo {
        ThreadInfo {
            id: THREAD_ID.with(|id| *id),
            state: "running",
            name: None,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a dump produced by [`dump_threads`] or [`dump_current`].
///
/// # Errors
///
/// Returns [`Error::ThreadDump`] at the first line that does not fit the
/// layout.
pub fn parse_thread_dump(dump: &str) -> Result<Vec<ThreadSnapshot>> {
    match parse_partial(dump) {
        (threads, None) => Ok(threads),
        (_, Some(err)) => Err(err),
    }
}

/// Parses as far as possible; returns every complete thread before the
/// first error, along with that error.
fn parse_partial(dump: &str) -> (Vec<ThreadSnapshot>, Option<Error>) {
    let mut parser = Parser::default();
    for (idx, line) in dump.lines().enumerate() {
        if let Err(reason) = parser.line(line) {
            parser.finish_thread();
            let err = Error::ThreadDump {
                line: idx + 1,
                reason,
            };
            return (parser.threads, Some(err));
        }
    }
    parser.finish_thread();
    (parser.threads, None)
}

#[derive(Default)]
struct Parser {
    threads: Vec<ThreadSnapshot>,
    current: Option<ThreadSnapshot>,
    pending_function: Option<String>,
}

impl Parser {
    fn line(&mut self, line: &str) -> std::result::Result<(), &'static str> {
        if line.trim().is_empty() {
            self.finish_thread();
            return Ok(());
        }
        if let Some(header) = line.strip_prefix(HEADER_PREFIX) {
            self.finish_thread();
            self.current = Some(parse_header(header)?);
            return Ok(());
        }
        let Some(thread) = self.current.as_mut() else {
            return Err("expected thread header");
        };
        if let Some(location) = line.strip_prefix('\t') {
            let function = self
                .pending_function
                .take()
                .ok_or("frame location without function")?;
            let (file, line) = parse_location(location)?;
            thread.stack.push(Frame::new(function, file, line));
            return Ok(());
        }
        if thread.stack.is_empty() && self.pending_function.is_none() {
            if let Some(name) = line.strip_prefix(NAME_PREFIX) {
                thread.name = Some(name.to_string());
                return Ok(());
            }
        }
        self.flush_pending();
        self.pending_function = Some(line.trim().to_string());
        Ok(())
    }

    /// Keeps a function whose location line never arrived.
    fn flush_pending(&mut self) {
        if let (Some(function), Some(thread)) = (self.pending_function.take(), self.current.as_mut())
        {
            thread.stack.push(Frame::new(function, None, 0));
        }
    }

    fn finish_thread(&mut self) {
        self.flush_pending();
        if let Some(thread) = self.current.take() {
            self.threads.push(thread);
        }
    }
}

fn parse_header(header: &str) -> std::result::Result<ThreadSnapshot, &'static str> {
    let header = header
        .trim_end()
        .strip_suffix(':')
        .ok_or("thread header must end with ':'")?;
    let (id, rest) = header.split_once(' ').unwrap_or((header, ""));
    let id = id.parse().map_err(|_| "invalid thread id")?;

    let rest = rest.trim();
    let (state, is_locked_to_thread) = if rest.is_empty() {
        (String::new(), false)
    } else {
        let inner = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .ok_or("thread state must be bracketed")?;
        match inner.strip_suffix(LOCKED_SUFFIX) {
            Some(state) => (state.to_string(), true),
            None => (inner.to_string(), false),
        }
    };

    Ok(ThreadSnapshot {
        id,
        state,
        is_locked_to_thread,
        name: None,
        stack: Vec::new(),
    })
}

fn parse_location(location: &str) -> std::result::Result<(Option<String>, u32), &'static str> {
    let (file, line) = location
        .trim()
        .rsplit_once(':')
        .ok_or("frame location must be file:line")?;
    let line = line.parse().map_err(|_| "invalid frame line number")?;
    let file = (file != UNKNOWN && !file.is_empty()).then(|| file.to_string());
    Ok((file, line))
}
