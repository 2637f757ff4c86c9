//! Error types for the initiating side.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use trustbridge_channel::ChannelError;
use trustbridge_model::{Diagnostic, ErrorDescriptor, ModelError};

/// Why a call did not produce a result.
///
/// Every variant is terminal for the call that raised it. Nothing here is
/// retried.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The call was malformed and nothing was sent.
    #[error("usage error: {0}")]
    Usage(String),

    /// The code did not compile. Carries every diagnostic, warnings included.
    #[error("compilation failed: {}", summary(.diagnostics))]
    CompilationFailed { diagnostics: Vec<Diagnostic> },

    /// The code compiled but failed while running, or its result could not
    /// be converted. Also raised when the privileged process itself failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(ErrorDescriptor),

    /// A declared parameter or return type is unknown to the privileged side.
    #[error("type resolution failed: {0}")]
    TypeResolution(ErrorDescriptor),

    /// No response arrived before the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A request or result could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ModelError),

    /// A file-backed code source could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn summary(diagnostics: &[Diagnostic]) -> String {
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.to_string())
        .collect();
    match errors.as_slice() {
        [] => "no diagnostics".to_string(),
        [only] => only.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compilation_failure_summarizes_errors() {
        let error = BridgeError::CompilationFailed {
            diagnostics: vec![
                Diagnostic::warning("W0001", "unused variable"),
                Diagnostic::error("E1001", "(1,5): expected ';'"),
                Diagnostic::error("E2001", "(2,1): unknown name"),
            ],
        };
        assert_eq!(
            error.to_string(),
            "compilation failed: error E1001: (1,5): expected ';' (and 1 more)"
        );
    }

    #[test]
    fn timeout_display() {
        assert_eq!(
            BridgeError::Timeout(Duration::from_secs(30)).to_string(),
            "no response within 30s"
        );
    }
}
