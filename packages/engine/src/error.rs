//! Error types for the execution engine.

use std::path::PathBuf;

use thiserror::Error;
use trustbridge_model::Diagnostic;
use trustbridge_script::RuntimeError;

/// Errors raised while building a parameter carrier.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// A parameter's type name is not declared by any loaded library.
    #[error("no type found for {type_name}")]
    UnknownType { type_name: String },

    /// A parameter name cannot be used as a field name.
    #[error("parameter name {0:?} is not usable as a variable name")]
    InvalidName(String),

    /// A parameter's payload does not hold a value of its type.
    #[error("parameter `{name}` could not be read: {message}")]
    Value { name: String, message: String },

    /// The generated carrier declaration was rejected.
    #[error("carrier declaration failed to compile: {0}")]
    Declaration(String),
}

/// Errors that can occur in the engine outside of a request's own outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Building the parameter carrier failed.
    #[error(transparent)]
    Carrier(#[from] CarrierError),

    /// A program artifact could not be written or read.
    #[error("program artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A program artifact is not in the expected format.
    #[error("malformed program artifact: {0}")]
    ArtifactFormat(#[from] serde_json::Error),

    /// No executable is configured to launch programs with.
    #[error("no program runner configured")]
    NoRunner,

    /// Launching a program failed.
    #[error("failed to launch program: {0}")]
    Launch(#[source] std::io::Error),

    /// A program artifact no longer compiles.
    #[error("program does not compile: {}", first_error(.0))]
    Compilation(Vec<Diagnostic>),

    /// A program failed while running.
    #[error("program failed: {0}")]
    Runtime(#[from] RuntimeError),
}

fn first_error(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| d.is_error())
        .map(|d| d.to_string())
        .unwrap_or_default()
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
