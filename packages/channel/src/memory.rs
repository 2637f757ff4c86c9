//! In-process channel endpoints.
//!
//! A [`MemoryChannel`] pair connects two endpoints through tokio channels.
//! Each endpoint owns a pump task that drains its inbound queue into its
//! [`Listeners`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trustbridge_model::Message;

use crate::error::{ChannelError, Result};
use crate::listeners::Listeners;
use crate::DuplexChannel;

/// One endpoint of an in-memory duplex channel.
///
/// - **send**: queues a message for the peer's listeners
/// - **listeners**: receive whatever the peer sends
///
/// Dropping or [closing](MemoryChannel::close) an endpoint stops its pump,
/// after which the peer's sends fail with [`ChannelError::Closed`].
///
/// # Example
///
/// ```ignore
/// let (client, proxy) = MemoryChannel::pair(16);
/// proxy.listeners().register(|m| { println!("{:?}", m); ListenerAction::Keep });
/// client.send(Message::new().with_entry("ping", "")).await?;
/// ```
pub struct MemoryChannel {
    /// Queue feeding the peer's pump.
    tx: mpsc::Sender<Message>,

    /// Listeners fed by this endpoint's pump.
    listeners: Arc<Listeners>,

    /// Pump draining this endpoint's inbound queue.
    pump: Option<JoinHandle<()>>,
}

impl MemoryChannel {
    /// Create a connected pair of endpoints with the given buffer capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (tx1, rx1) = mpsc::channel(capacity);
        let (tx2, rx2) = mpsc::channel(capacity);

        let listeners1 = Arc::new(Listeners::new());
        let listeners2 = Arc::new(Listeners::new());

        let left = Self {
            tx: tx1,
            pump: Some(Self::spawn_pump(rx2, listeners1.clone())),
            listeners: listeners1,
        };

        let right = Self {
            tx: tx2,
            pump: Some(Self::spawn_pump(rx1, listeners2.clone())),
            listeners: listeners2,
        };

        (left, right)
    }

    fn spawn_pump(mut rx: mpsc::Receiver<Message>, listeners: Arc<Listeners>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                listeners.dispatch(&message);
            }
            tracing::debug!("memory channel peer closed");
            listeners.clear();
        })
    }

    /// Check if the peer is still receiving.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Stop receiving. Resolves once the inbound queue is gone, so the peer
    /// observes the closure on its next send.
    pub async fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
        self.listeners.clear();
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[async_trait]
impl DuplexChannel for MemoryChannel {
    async fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::ListenerAction;
    use tokio::sync::mpsc::unbounded_channel;

    fn forward_to(
        channel: &MemoryChannel,
    ) -> tokio::sync::mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = unbounded_channel();
        channel.listeners().register(move |message| {
            let _ = tx.send(message.clone());
            ListenerAction::Keep
        });
        rx
    }

    #[tokio::test]
    async fn channel_send_receive() {
        let (left, right) = MemoryChannel::pair(10);
        let mut inbox = forward_to(&right);

        let msg = Message::new().with_entry("greeting", "hello");
        left.send(msg.clone()).await.unwrap();

        assert_eq!(inbox.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn channel_is_bidirectional() {
        let (left, right) = MemoryChannel::pair(10);
        let mut left_inbox = forward_to(&left);
        let mut right_inbox = forward_to(&right);

        left.send(Message::new().with_entry("to", "right")).await.unwrap();
        right.send(Message::new().with_entry("to", "left")).await.unwrap();

        assert_eq!(right_inbox.recv().await.unwrap().get("to"), Some("right"));
        assert_eq!(left_inbox.recv().await.unwrap().get("to"), Some("left"));
    }

    #[tokio::test]
    async fn send_after_peer_closed_fails() {
        let (left, mut right) = MemoryChannel::pair(10);
        assert!(left.is_connected());

        right.close().await;

        let result = left.send(Message::new().with_entry("k", "v")).await;
        assert!(matches!(result, Err(ChannelError::Closed)));
        assert!(!left.is_connected());
    }

    #[tokio::test]
    async fn dropped_peer_releases_listeners() {
        let (left, right) = MemoryChannel::pair(4);
        let (tx, rx) = tokio::sync::oneshot::channel::<Message>();
        let mut waiter = Some(tx);
        left.listeners().register(move |message| {
            if let Some(waiter) = waiter.take() {
                let _ = waiter.send(message.clone());
            }
            ListenerAction::Remove
        });

        drop(right);

        assert!(rx.await.is_err());
        assert!(left.listeners().is_empty());
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (left, right) = MemoryChannel::pair(4);
        let mut inbox = forward_to(&right);

        for i in 0..8 {
            left.send(Message::new().with_entry("n", i.to_string()))
                .await
                .unwrap();
        }

        for i in 0..8 {
            let message = inbox.recv().await.unwrap();
            assert_eq!(message.get("n"), Some(i.to_string().as_str()));
        }
    }
}
