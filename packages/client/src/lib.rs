//! # trustbridge-client
//!
//! The initiating side of a trustbridge: a restricted process asks the
//! privileged process to compile and run code, and waits for the answer.
//!
//! [`BridgeClient`] is the correlation engine. It sends one request at a
//! time over a [`DuplexChannel`](trustbridge_channel::DuplexChannel), matches
//! the response that comes back, and gives up after a deadline.
//!
//! ## Example
//!
//! ```ignore
//! let proxy = ProxyProcess::spawn(Path::new("trustbridge-proxy"), ["serve"])?;
//! let mut client = BridgeClient::new(proxy.channel());
//!
//! let sum: i32 = client
//!     .with_parameter("a", &1)
//!     .with_parameter("b", &4)
//!     .execute_script_returning("return a + b;")
//!     .await?;
//! assert_eq!(sum, 5);
//! ```

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod source;

pub use bootstrap::ProxyProcess;
pub use client::BridgeClient;
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use context::CallContext;
pub use error::{BridgeError, Result};
pub use source::ContentRoot;
