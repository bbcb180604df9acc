//! Program counters and resolved stack frames.

use std::ffi::c_void;
use std::fmt;

/// Raw code address of a stack frame.
///
/// The zero value ([`ProgramCounter::NONE`]) means "no frame".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramCounter(pub usize);

impl ProgramCounter {
    /// No frame.
    pub const NONE: Self = Self(0);

    /// Returns `true` for the zero sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Resolves the address to a frame. Unresolvable addresses yield a frame
    /// with an empty function name.
    #[must_use]
    pub fn resolve(self) -> Frame {
        let mut frame = Frame {
            pc: self,
            ..Frame::default()
        };
        if self.is_none() {
            return frame;
        }
        // Inlined code resolves to several symbols; the first one is the
        // innermost function, which is what a reader expects to see.
        let mut first = true;
        backtrace::resolve(self.0 as *mut c_void, |symbol| {
            if !first {
                return;
            }
            first = false;
            if let Some(name) = symbol.name() {
                frame.function = demangle(name.as_bytes());
            }
            frame.file = symbol.filename().map(|p| p.display().to_string());
            frame.line = symbol.lineno().unwrap_or(0);
        });
        frame
    }

    /// Demangled function name of the frame, if the symbol is known.
    #[must_use]
    pub fn function_name(self) -> Option<String> {
        let frame = self.resolve();
        (!frame.function.is_empty()).then_some(frame.function)
    }
}

impl fmt::Display for ProgramCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Demangles a raw symbol name and drops the trailing hash.
pub(crate) fn demangle(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    match rustc_demangle::try_demangle(&raw) {
        Ok(symbol) => format!("{symbol:#}"),
        Err(_) => raw.into_owned(),
    }
}

/// One resolved stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Code address.
    pub pc: ProgramCounter,
    /// Demangled function path, empty when unknown.
    pub function: String,
    /// Source file, when debug info is available.
    pub file: Option<String>,
    /// Source line, 0 when unknown.
    pub line: u32,
}

impl Frame {
    /// Creates a frame from already-known symbol data.
    #[must_use]
    pub fn new(function: impl Into<String>, file: Option<String>, line: u32) -> Self {
        Self {
            pc: ProgramCounter::NONE,
            function: function.into(),
            file,
            line,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = if self.function.is_empty() {
            "<unknown>"
        } else {
            &self.function
        };
        let file = self.file.as_deref().unwrap_or("<unknown>");
        write!(f, "{file}:{}: {function}", self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pc_resolves_to_empty_frame() {
        let frame = ProgramCounter::NONE.resolve();
        assert!(frame.function.is_empty());
        assert!(frame.file.is_none());
        assert!(ProgramCounter::NONE.function_name().is_none());
    }

    #[test]
    fn demangle_strips_hash() {
        let name = demangle(b"_ZN4belt7capture5frame4test17h0123456789abcdefE");
        assert_eq!(name, "belt::capture::frame::test");
    }

    #[test]
    fn demangle_passes_through_plain_names() {
        assert_eq!(demangle(b"main"), "main");
    }

    #[test]
    fn frame_display() {
        let frame = Frame::new("app::handler", Some("src/app.rs".into()), 42);
        assert_eq!(frame.to_string(), "src/app.rs:42: app::handler");
        assert_eq!(Frame::default().to_string(), "<unknown>:0: <unknown>");
    }
}
