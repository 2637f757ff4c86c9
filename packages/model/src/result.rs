//! Compilation diagnostics and execution results.

use serde::{Deserialize, Serialize};

use crate::call_id::CallId;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

/// A language-neutral compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: String,
    pub description: String,
}

impl Diagnostic {
    pub fn error(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn warning(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        };
        write!(f, "{} {}: {}", kind, self.code, self.description)
    }
}

/// Queries over a list of diagnostics.
pub trait DiagnosticsExt {
    /// True iff any entry is an error.
    fn has_errors(&self) -> bool;

    /// The error entries, in order.
    fn errors(&self) -> Vec<&Diagnostic>;
}

impl DiagnosticsExt for [Diagnostic] {
    fn has_errors(&self) -> bool {
        self.iter().any(Diagnostic::is_error)
    }

    fn errors(&self) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.is_error()).collect()
    }
}

/// Outcome of compiling a code unit.
///
/// `success` always equals `!diagnostics.has_errors()`; build values through
/// [`CompilationResult::from_diagnostics`] to keep it that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilationResult {
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            success: !diagnostics.has_errors(),
            diagnostics,
        }
    }
}

/// Category of an error that crossed the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The code compiled but failed while running or while its result was
    /// converted and serialized.
    Execution,
    /// A declared type name could not be found among the loaded libraries.
    TypeResolution,
    /// The privileged process itself failed while handling the request.
    Proxy,
}

/// Serializable description of an error raised on the privileged side.
///
/// The receiving side rebuilds a local error of the matching kind from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    /// Set for `TypeResolution` errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Cause chain or location text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorDescriptor {
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Execution,
            message: message.into(),
            type_name: None,
            detail: None,
        }
    }

    pub fn type_resolution(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            kind: ErrorKind::TypeResolution,
            message: format!("no type found for {}", type_name),
            type_name: Some(type_name),
            detail: None,
        }
    }

    pub fn proxy(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Proxy,
            message: message.into(),
            type_name: None,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorDescriptor {}

/// Outcome of an execution request.
///
/// `compilation_result` is absent only when the privileged side failed before
/// it could compile anything; `execution_error` then says why.
/// `serialized_result` is present only when compilation succeeded, nothing
/// failed and a return type was declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_result: Option<CompilationResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<ErrorDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_result: Option<String>,
}

impl ExecutionResult {
    /// A result carrying only a compilation outcome.
    pub fn compiled(compilation: CompilationResult) -> Self {
        Self {
            compilation_result: Some(compilation),
            ..Self::default()
        }
    }

    /// A result for a request that failed before or outside compilation.
    pub fn failed(error: ErrorDescriptor) -> Self {
        Self {
            execution_error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_call_id(mut self, call_id: Option<CallId>) -> Self {
        self.call_id = call_id;
        self
    }

    /// Attach an execution error. Any serialized value is discarded.
    pub fn with_error(mut self, error: ErrorDescriptor) -> Self {
        self.execution_error = Some(error);
        self.return_type_name = None;
        self.serialized_result = None;
        self
    }

    /// Attach a serialized return value.
    ///
    /// Ignored unless compilation succeeded and no error is set.
    pub fn with_value(mut self, type_name: impl Into<String>, payload: impl Into<String>) -> Self {
        if self.compiled_successfully() && self.execution_error.is_none() {
            self.return_type_name = Some(type_name.into());
            self.serialized_result = Some(payload.into());
        }
        self
    }

    /// True when nothing failed at run time. Compilation failures are
    /// reported through `compilation_result`, not here.
    pub fn success(&self) -> bool {
        self.execution_error.is_none()
    }

    pub fn compiled_successfully(&self) -> bool {
        self.compilation_result
            .as_ref()
            .is_some_and(|compilation| compilation.success)
    }

    pub fn has_return_type(&self) -> bool {
        self.return_type_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_ignores_warnings() {
        let diagnostics = vec![Diagnostic::warning("W0001", "unused variable")];
        assert!(!diagnostics.has_errors());

        let diagnostics = vec![
            Diagnostic::warning("W0001", "unused variable"),
            Diagnostic::error("E1001", "expected `;`"),
        ];
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.errors().len(), 1);
    }

    #[test]
    fn compilation_success_tracks_errors() {
        assert!(CompilationResult::from_diagnostics(vec![]).success);
        assert!(!CompilationResult::from_diagnostics(vec![Diagnostic::error("E1", "x")]).success);
    }

    #[test]
    fn value_requires_successful_compilation() {
        let failed = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![
            Diagnostic::error("E1001", "bad"),
        ]))
        .with_value("System.Int32", "5");
        assert!(failed.serialized_result.is_none());

        let ok = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![]))
            .with_value("System.Int32", "5");
        assert_eq!(ok.serialized_result.as_deref(), Some("5"));
        assert!(ok.success());
    }

    #[test]
    fn error_discards_value() {
        let result = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![]))
            .with_value("System.Int32", "5")
            .with_error(ErrorDescriptor::execution("boom"));
        assert!(!result.success());
        assert!(result.serialized_result.is_none());
        assert!(!result.has_return_type());
    }

    #[test]
    fn type_resolution_descriptor_names_the_type() {
        let error = ErrorDescriptor::type_resolution("Geometry.Point");
        assert_eq!(error.kind, ErrorKind::TypeResolution);
        assert_eq!(error.type_name.as_deref(), Some("Geometry.Point"));
        assert!(error.to_string().contains("Geometry.Point"));
    }

    #[test]
    fn result_wire_shape() {
        let result = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![]))
            .with_value("Int32", "5");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["compilationResult"]["success"], true);
        assert_eq!(json["serializedResult"], "5");
        assert!(json.get("executionError").is_none());

        let back: ExecutionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
