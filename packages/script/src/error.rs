use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostic::ScriptDiagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    DivideByZero,
    Overflow,
    IndexOutOfRange,
    InvalidArgument,
    InvalidOperation,
    Conversion,
    Io,
    Process,
    Thrown,
    MissingReturn,
    StackOverflow,
    StepBudgetExhausted,
}

impl std::fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuntimeErrorKind::DivideByZero => "DivideByZero",
            RuntimeErrorKind::Overflow => "Overflow",
            RuntimeErrorKind::IndexOutOfRange => "IndexOutOfRange",
            RuntimeErrorKind::InvalidArgument => "InvalidArgument",
            RuntimeErrorKind::InvalidOperation => "InvalidOperation",
            RuntimeErrorKind::Conversion => "Conversion",
            RuntimeErrorKind::Io => "Io",
            RuntimeErrorKind::Process => "Process",
            RuntimeErrorKind::Thrown => "Thrown",
            RuntimeErrorKind::MissingReturn => "MissingReturn",
            RuntimeErrorKind::StackOverflow => "StackOverflow",
            RuntimeErrorKind::StepBudgetExhausted => "StepBudgetExhausted",
        };
        f.write_str(name)
    }
}

/// An error raised while a compiled unit runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    /// Source line of the statement that failed, when known.
    pub line: Option<u32>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attach `line` unless a more precise line is already recorded.
    pub fn at_line(mut self, line: u32) -> Self {
        if self.line.is_none() && line > 0 {
            self.line = Some(line);
        }
        self
    }

    pub(crate) fn io(context: &str, error: std::io::Error) -> Self {
        Self::new(RuntimeErrorKind::Io, format!("{}: {}", context, error))
    }
}

/// Errors from converting or (de)serializing values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot convert {from} to {to}")]
    Conversion { from: String, to: String },

    #[error("value {value} was either too large or too small for {to}")]
    Overflow { value: String, to: String },

    #[error("input string '{value}' was not in a correct format for {to}")]
    Format { value: String, to: String },

    #[error("cannot read {found} as {ty}")]
    Json { ty: String, found: &'static str },

    #[error("{0} cannot be represented in JSON")]
    NotRepresentable(String),
}

impl From<ValueError> for RuntimeError {
    fn from(e: ValueError) -> Self {
        let kind = match e {
            ValueError::Overflow { .. } => RuntimeErrorKind::Overflow,
            _ => RuntimeErrorKind::Conversion,
        };
        RuntimeError::new(kind, e.to_string())
    }
}

/// Errors loading a referenced library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library '{}' could not be read: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("library '{}' does not compile", path.display())]
    Invalid {
        path: PathBuf,
        diagnostics: Vec<ScriptDiagnostic>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_wins() {
        let e = RuntimeError::new(RuntimeErrorKind::Overflow, "boom")
            .at_line(4)
            .at_line(9);
        assert_eq!(e.line, Some(4));
        assert_eq!(e.to_string(), "boom");
    }

    #[test]
    fn overflow_maps_to_overflow_kind() {
        let e: RuntimeError = ValueError::Overflow {
            value: "1e40".into(),
            to: "System.Int32".into(),
        }
        .into();
        assert_eq!(e.kind, RuntimeErrorKind::Overflow);
    }
}
