use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use trustbridge_channel::{ChannelError, DuplexChannel, ListenerAction, StreamChannel};
use trustbridge_model::{ExecutionRequest, Message};

fn connected_pair() -> (StreamChannel, StreamChannel) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    (
        StreamChannel::new(a_read, a_write),
        StreamChannel::new(b_read, b_write),
    )
}

fn inbox(channel: &StreamChannel) -> UnboundedReceiver<Message> {
    let (tx, rx) = unbounded_channel();
    channel.listeners().register(move |message| {
        let _ = tx.send(message.clone());
        ListenerAction::Keep
    });
    rx
}

#[tokio::test]
async fn request_crosses_the_stream() {
    let (client, proxy) = connected_pair();
    let mut received = inbox(&proxy);

    let request = ExecutionRequest::script("return 1;").with_return_type("Int32");
    client.send(Message::request(&request).unwrap()).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.decode_request().unwrap(), request);
}

#[tokio::test]
async fn both_directions_carry_messages() {
    let (left, right) = connected_pair();
    let mut left_inbox = inbox(&left);
    let mut right_inbox = inbox(&right);

    left.send(Message::new().with_entry("from", "left")).await.unwrap();
    right.send(Message::new().with_entry("from", "right")).await.unwrap();

    assert_eq!(right_inbox.recv().await.unwrap().get("from"), Some("left"));
    assert_eq!(left_inbox.recv().await.unwrap().get("from"), Some("right"));
}

#[tokio::test]
async fn peer_drop_closes_the_channel() {
    let (left, right) = connected_pair();
    assert!(!left.is_closed());

    drop(right);

    tokio::time::timeout(Duration::from_secs(5), left.closed())
        .await
        .expect("closed should resolve once the peer is gone");
    assert!(left.is_closed());

    let result = left.send(Message::new().with_entry("k", "v")).await;
    assert!(matches!(
        result,
        Err(ChannelError::Closed) | Err(ChannelError::Io(_))
    ));
}
