//! # trustbridge-model
//!
//! Value types exchanged between the restricted (initiating) process and the
//! privileged process of a trustbridge.
//!
//! Nothing in this crate holds shared state: requests and results are plain
//! values that cross the process boundary as serialized text inside a
//! [`Message`]. Both sides depend on this crate so the wire contract lives in
//! exactly one place.
//!
//! ## Message shapes
//!
//! ```text
//! initiating side                          privileged side
//!   Message { "ExecutionRequest": json }  ──▶  ExecutionRequest
//!   ExecutionResult  ◀──  Message { "ExecutionResult": json }
//! ```
//!
//! The channel treats the payload strings as opaque text.

pub mod call_id;
pub mod error;
pub mod message;
pub mod request;
pub mod result;
pub mod script_type;

pub use call_id::CallId;
pub use error::{ModelError, Result};
pub use message::{Message, REQUEST_KEY, RESPONSE_KEY};
pub use request::{is_identifier, ExecutionRequest, Parameter, ProgramKind};
pub use result::{
    CompilationResult, Diagnostic, DiagnosticKind, DiagnosticsExt, ErrorDescriptor, ErrorKind,
    ExecutionResult,
};
pub use script_type::ScriptType;
