//! Compiler diagnostics.

/// A 1-based source location. Line 0 means "no location".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// A diagnostic reported by the lexer, parser or checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}

impl ScriptDiagnostic {
    pub fn error(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn warning(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ScriptDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.span.is_known() {
            write!(f, "{}: ", self.span)?;
        }
        write!(f, "{} {}: {}", severity, self.code, self.message)
    }
}

/// Diagnostic codes.
///
/// `E0xxx` lexical, `E1xxx` syntax, `E2xxx` semantic, `E3xxx` library
/// loading, `W0xxx` warnings.
pub mod codes {
    pub const UNEXPECTED_CHARACTER: &str = "E0001";
    pub const UNTERMINATED_STRING: &str = "E0002";
    pub const INVALID_NUMBER: &str = "E0003";
    pub const INVALID_ESCAPE: &str = "E0004";
    pub const UNTERMINATED_COMMENT: &str = "E0005";

    pub const EXPECTED_TOKEN: &str = "E1001";
    pub const UNEXPECTED_TOKEN: &str = "E1002";
    pub const INVALID_ASSIGNMENT_TARGET: &str = "E1003";
    pub const NESTING_TOO_DEEP: &str = "E1004";

    pub const UNKNOWN_NAME: &str = "E2001";
    pub const UNKNOWN_TYPE: &str = "E2002";
    pub const UNKNOWN_FUNCTION: &str = "E2003";
    pub const TYPE_MISMATCH: &str = "E2004";
    pub const ARGUMENT_MISMATCH: &str = "E2005";
    pub const DUPLICATE_DEFINITION: &str = "E2006";
    pub const INVALID_OPERANDS: &str = "E2007";
    pub const UNKNOWN_MEMBER: &str = "E2008";
    pub const UNKNOWN_NAMESPACE: &str = "E2009";
    pub const MISPLACED_JUMP: &str = "E2010";
    pub const MISSING_MAIN: &str = "E2011";
    pub const MISPLACED_ITEM: &str = "E2012";
    pub const AMBIGUOUS_REFERENCE: &str = "E2013";
    pub const RECURSIVE_STRUCT: &str = "E2014";
    pub const VOID_VALUE: &str = "E2015";
    pub const RETURN_MISMATCH: &str = "E2016";
    pub const INVALID_STATEMENT: &str = "E2017";

    pub const LIBRARY_NOT_FOUND: &str = "E3001";
    pub const LIBRARY_INVALID: &str = "E3002";

    pub const UNUSED_VARIABLE: &str = "W0001";
    pub const UNREACHABLE_CODE: &str = "W0002";
}
