//! Structured compile/runtime/infrastructure failures.
//!
//! A diagnostic is distinct from a negative goal verdict: verdicts are
//! feedback after a settled run, diagnostics end a run early.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

use super::types::ProgramTrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Malformed block tree or textual syntax error. Nothing was applied.
    CompileError,
    /// A primitive rejected its arguments or user code failed mid-program.
    RuntimeError,
    /// Wall-clock or step budget exceeded, locally or remotely.
    Timeout,
    /// The remote execution service is unreachable or failed at the
    /// transport level. Never retried automatically.
    SandboxUnavailable,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::CompileError => "compile_error",
            DiagnosticKind::RuntimeError => "runtime_error",
            DiagnosticKind::Timeout => "timeout",
            DiagnosticKind::SandboxUnavailable => "sandbox_unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Actions captured before the failure. Empty where the failure mode
    /// discards partial execution (timeouts, compile errors).
    pub partial_trace: ProgramTrace,
}

impl Diagnostic {
    pub fn compile(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::CompileError,
            message: message.into(),
            location: None,
            partial_trace: ProgramTrace::empty(),
        }
    }

    pub fn compile_at(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind: DiagnosticKind::CompileError,
            message: message.into(),
            location: Some(SourceLocation { line, column }),
            partial_trace: ProgramTrace::empty(),
        }
    }

    pub fn runtime(message: impl Into<String>, partial_trace: ProgramTrace) -> Self {
        Self {
            kind: DiagnosticKind::RuntimeError,
            message: message.into(),
            location: None,
            partial_trace,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Timeout,
            message: message.into(),
            location: None,
            partial_trace: ProgramTrace::empty(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::SandboxUnavailable,
            message: message.into(),
            location: None,
            partial_trace: ProgramTrace::empty(),
        }
    }

    pub fn has_partial_trace(&self) -> bool {
        !self.partial_trace.is_empty()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(
                f,
                "{}: {} (line {}, column {})",
                self.kind.as_str(),
                self.message,
                location.line,
                location.column
            ),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

impl Error for Diagnostic {}
