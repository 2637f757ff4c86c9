//! Error types for the shared model.

use thiserror::Error;

use crate::request::ProgramKind;

/// Errors raised while validating or (de)serializing model values.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The request carries no code.
    #[error("code is empty")]
    EmptyCode,

    /// Parameters, usings or references were supplied for a kind that does
    /// not accept them.
    #[error("{0} requests do not accept parameters, usings or references")]
    ContextNotSupported(ProgramKind),

    /// A return type was requested for a kind that produces no value.
    #[error("{0} requests do not produce a return value")]
    ReturnTypeNotSupported(ProgramKind),

    /// Two parameters share a name.
    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),

    /// A parameter name is not a valid identifier.
    #[error("invalid parameter name: {0:?}")]
    InvalidParameterName(String),

    /// A message lacks the entry the receiver looks for.
    #[error("message has no `{0}` entry")]
    MissingEntry(&'static str),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
