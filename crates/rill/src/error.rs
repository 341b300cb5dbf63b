//! Error and warning types for compilation and execution.
//!
//! Lex, parse, and host errors are fatal and surface immediately. Symbol and
//! type errors are deferred: the resolver records them and keeps walking so
//! one run reports as many as possible. Runtime errors carry the call-record
//! trace captured at the point of failure.

use std::fmt::{self, Display, Write as _};

use strum::{Display, EnumString, IntoStaticStr};

/// Result alias for fatal compilation failures.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result alias for runtime failures inside the VM or an extern.
pub type RunResult<T> = Result<T, RunError>;

/// Which stage produced a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CompileErrorKind {
    /// Unexpected character, unterminated string, bad escape.
    Lex,
    /// Unexpected token; the message names expected and actual.
    Parse,
    /// Reference to an undeclared entity, or redeclaration of a global.
    Symbol,
    /// Tag mismatch, missing member, missing return, undefined struct.
    Type,
    /// Binding an extern to an unregistered name, running uncompiled code.
    Host,
}

/// A fatal or deferred compilation error with its source location.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    /// Source file label, empty when no location applies.
    pub file: String,
    /// 1-based line, 0 when no location applies.
    pub line: u32,
    pub message: String,
}

impl CompileError {
    pub(crate) fn new(kind: CompileErrorKind, file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Summarizes a list of deferred resolver errors into one failure.
    pub(crate) fn from_deferred(errors: &[Self]) -> Self {
        let mut message = format!("found {} error(s) in script code, stopping compilation", errors.len());
        for err in errors {
            let _ = write!(message, "\n{err}");
        }
        Self {
            kind: errors.first().map_or(CompileErrorKind::Type, |e| e.kind),
            file: String::new(),
            line: 0,
            message,
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{} error: {}", self.kind, self.message)
        } else {
            write!(f, "{} error ({}:{}): {}", self.kind, self.file, self.line, self.message)
        }
    }
}

impl std::error::Error for CompileError {}

/// One entry of the call-record chain captured when a runtime error fires.
///
/// Argument values are rendered to strings at call time so the trace stays
/// valid even after the originating values are collected.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    pub args: Vec<String>,
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}(", self.file, self.line, self.function)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// A fatal runtime error: stack over/underflow, pop-type mismatch,
/// out-of-bounds access, call of a non-function, zero divisor in `%`, or a
/// compile-time-only extern invoked at runtime.
#[derive(Debug, Clone)]
pub struct RunError {
    pub file: String,
    pub line: u32,
    pub message: String,
    /// Innermost call last.
    pub trace: Vec<TraceFrame>,
}

impl RunError {
    pub(crate) fn new(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
            trace: Vec::new(),
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime error ({}:{}): {}", self.file, self.line, self.message)?;
        for frame in self.trace.iter().rev() {
            write!(f, "\n  at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunError {}

/// Top-level error for host entry points that may fail either way.
#[derive(Debug, Clone)]
pub enum ScriptError {
    Compile(CompileError),
    Run(RunError),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(e) => e.fmt(f),
            Self::Run(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<CompileError> for ScriptError {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<RunError> for ScriptError {
    fn from(e: RunError) -> Self {
        Self::Run(e)
    }
}

/// Non-fatal diagnostics emitted by the type resolver.
///
/// Each warning can be individually disabled with
/// [`Script::disable_warning`](crate::Script::disable_warning). The string
/// form is the stable name used in diagnostics output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Warning {
    /// A non-uniform array literal fell back to `array - dynamic`.
    DynamicArrayLiteral,
    /// An `array - dynamic` value was assigned where a specific element type
    /// was expected.
    DynamicArrayAssign,
    /// A call through a `dynamic` callee skips argument checking.
    DynamicCall,
}
