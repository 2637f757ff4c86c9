//! # trustbridge-engine
//!
//! The privileged side of a trustbridge.
//!
//! - [`ExecutionEngine`] turns an [`ExecutionRequest`](trustbridge_model::ExecutionRequest)
//!   into an [`ExecutionResult`](trustbridge_model::ExecutionResult): scripts
//!   are compiled and run in place, programs are compiled, written out as an
//!   artifact and launched.
//! - [`carrier`] builds the struct through which a script sees its
//!   parameters.
//! - [`diagnostics`] maps compiler diagnostics onto the wire shape.
//! - [`ProxyService`] answers requests arriving on a channel.
//!
//! ## Example
//!
//! ```ignore
//! let engine = Arc::new(ExecutionEngine::new(EngineConfig::default()));
//! let service = ProxyService::new(Arc::new(StreamChannel::stdio()), engine);
//! service.start();
//! ```

pub mod artifact;
pub mod carrier;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod host;
pub mod service;

pub use artifact::{exit_code, ProgramArtifact};
pub use carrier::{declare, synthesize, Carrier, CarrierType};
pub use config::{EngineConfig, DEFAULT_USINGS};
pub use engine::ExecutionEngine;
pub use error::{CarrierError, EngineError, Result};
pub use host::{Job, NoWindows, ProgramLauncher, RunnerLauncher, UiDispatcher, WindowLabeler};
pub use service::ProxyService;
