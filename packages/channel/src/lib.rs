//! # trustbridge-channel
//!
//! The single message pipe between the restricted process and the privileged
//! process.
//!
//! A channel delivers whole [`Message`]s. It never pairs a reply with the
//! message that caused it: inbound messages are unsolicited and are handed to
//! every registered listener in registration order. Correlating a response
//! with a request is the caller's business.
//!
//! Two transports are provided:
//!
//! - [`MemoryChannel`]: a connected pair of in-process endpoints backed by
//!   tokio channels. Used by tests and by hosts that run both engines in one
//!   process.
//! - [`StreamChannel`]: length-prefixed JSON frames over any async byte
//!   stream, e.g. the stdio pipes of a child process.
//!
//! ```ignore
//! let (left, right) = MemoryChannel::pair(16);
//!
//! right.listeners().register(|message| {
//!     println!("got {:?}", message);
//!     ListenerAction::Keep
//! });
//!
//! left.send(Message::new().with_entry("hello", "world")).await?;
//! ```

pub mod error;
pub mod listeners;
pub mod memory;
pub mod stream;

use async_trait::async_trait;
use trustbridge_model::Message;

pub use error::{ChannelError, ChannelStatus, Result};
pub use listeners::{ListenerAction, ListenerId, Listeners};
pub use memory::MemoryChannel;
pub use stream::{read_frame, write_frame, StreamChannel, MAX_FRAME_LEN};

/// A bidirectional, message-oriented pipe to the peer process.
///
/// Connection establishment and liveness belong to whoever constructs the
/// channel. Implementations dispatch inbound messages to [`Listeners`] on
/// their own task; listeners must therefore be cheap and must not block.
#[async_trait]
pub trait DuplexChannel: Send + Sync {
    /// Send one message to the peer.
    async fn send(&self, message: Message) -> Result<()>;

    /// The listeners receiving inbound messages.
    fn listeners(&self) -> &Listeners;
}
