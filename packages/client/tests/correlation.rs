use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use trustbridge_channel::{ChannelError, DuplexChannel, ListenerAction, MemoryChannel};
use trustbridge_client::{BridgeClient, BridgeError, ClientConfig};
use trustbridge_model::{
    CompilationResult, Diagnostic, ErrorDescriptor, ExecutionRequest, ExecutionResult, Message,
    Parameter,
};

/// A stand-in for the privileged process that lets each test answer by hand.
struct FakeProxy {
    channel: MemoryChannel,
    requests: UnboundedReceiver<ExecutionRequest>,
}

impl FakeProxy {
    async fn next_request(&mut self) -> ExecutionRequest {
        self.requests.recv().await.expect("proxy channel closed")
    }

    async fn reply(&self, result: ExecutionResult) {
        self.channel
            .send(Message::response(&result).unwrap())
            .await
            .unwrap();
    }
}

fn connect(timeout: Duration) -> (BridgeClient, FakeProxy) {
    let (client_end, proxy_end) = MemoryChannel::pair(16);
    let (tx, requests) = unbounded_channel();
    proxy_end.listeners().register(move |message| {
        let _ = tx.send(message.decode_request().unwrap());
        ListenerAction::Keep
    });

    let config = ClientConfig::default().with_timeout(timeout);
    let client = BridgeClient::with_config(Arc::new(client_end), config);
    (
        client,
        FakeProxy {
            channel: proxy_end,
            requests,
        },
    )
}

fn value(request: &ExecutionRequest, payload: &str) -> ExecutionResult {
    ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![]))
        .with_value(request.return_type_name.clone().unwrap_or_default(), payload)
        .with_call_id(request.call_id)
}

#[tokio::test]
async fn script_value_round_trip() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    let answer = async {
        let request = proxy.next_request().await;
        assert_eq!(request.code, "return a + b;");
        assert_eq!(
            request.parameters,
            vec![
                Parameter::new("a", "System.Int32", "1"),
                Parameter::new("b", "System.Int32", "4"),
            ]
        );
        assert_eq!(request.return_type_name.as_deref(), Some("System.Int32"));
        assert!(request.call_id.is_some());
        proxy.reply(value(&request, "5")).await;
    };

    let call = client
        .with_parameter("a", &1)
        .with_parameter("b", &4)
        .execute_script_returning::<i32>("return a + b;");
    let (sum, ()) = tokio::join!(call, answer);
    assert_eq!(sum.unwrap(), 5);
}

#[tokio::test]
async fn context_is_cleared_after_each_call() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    let answer = async {
        let mut seen = Vec::new();
        for _ in 0..2 {
            let request = proxy.next_request().await;
            proxy.reply(value(&request, "")).await;
            seen.push(request);
        }
        seen
    };
    let calls = async {
        client
            .with_parameter("a", &1)
            .with_using("System.IO")
            .with_reference("lib/extra.tsl");
        client.execute_script("Console.WriteLine(a);").await.unwrap();
        assert!(client.context().is_empty());
        client.execute_script("Console.WriteLine(1);").await.unwrap();
    };
    let ((), seen) = tokio::join!(calls, answer);

    assert!(seen[0].has_context());
    assert_eq!(seen[0].usings, vec!["System.IO"]);
    assert!(!seen[1].has_context());
}

#[tokio::test]
async fn main_program_with_context_is_rejected_before_sending() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    client.with_parameter("a", &1);
    let error = client
        .execute_main_program("static void Main() { }")
        .await
        .unwrap_err();
    assert!(matches!(error, BridgeError::Usage(_)));
    assert!(client.context().is_empty());

    tokio::task::yield_now().await;
    assert!(proxy.requests.try_recv().is_err(), "nothing may be sent");
}

#[tokio::test]
async fn empty_code_is_a_usage_error() {
    let (mut client, _proxy) = connect(Duration::from_secs(30));
    assert!(matches!(
        client.execute_script("   ").await,
        Err(BridgeError::Usage(_))
    ));
}

#[tokio::test]
async fn compilation_and_execution_failures_are_distinct() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    let answer = async {
        let request = proxy.next_request().await;
        proxy
            .reply(
                ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![
                    Diagnostic::error("E1001", "(1,6): expected ';'"),
                ]))
                .with_call_id(request.call_id),
            )
            .await;

        let request = proxy.next_request().await;
        proxy
            .reply(
                ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![]))
                    .with_error(ErrorDescriptor::execution("attempted to divide by zero"))
                    .with_call_id(request.call_id),
            )
            .await;
    };
    let calls = async {
        let first = client.execute_script("this does not parse").await;
        assert!(matches!(first, Err(BridgeError::CompilationFailed { .. })));
        let second = client.execute_script("return 1 / 0;").await;
        assert!(matches!(second, Err(BridgeError::ExecutionFailed(e)) if e.message == "attempted to divide by zero"));
    };
    tokio::join!(calls, answer);
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    let started = tokio::time::Instant::now();
    let result = client.execute_script("while (true) { }").await;

    assert!(matches!(result, Err(BridgeError::Timeout(d)) if d == Duration::from_secs(30)));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(proxy.requests.try_recv().is_ok(), "the request was sent");
}

#[tokio::test(start_paused = true)]
async fn late_response_does_not_resolve_the_next_call() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    let timed_out = client
        .execute_script_returning::<i32>("return 1;")
        .await;
    assert!(matches!(timed_out, Err(BridgeError::Timeout(_))));
    let stale = proxy.next_request().await;

    let answer = async {
        let current = proxy.next_request().await;
        assert_ne!(current.call_id, stale.call_id);
        proxy.reply(value(&stale, "1")).await;
        proxy.reply(value(&current, "2")).await;
    };
    let (result, ()) = tokio::join!(client.execute_script_returning::<i32>("return 2;"), answer);
    assert_eq!(result.unwrap(), 2);
}

#[tokio::test]
async fn response_without_call_id_still_matches() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));

    let answer = async {
        proxy.next_request().await;
        proxy
            .reply(ExecutionResult::failed(ErrorDescriptor::proxy("request could not be decoded")))
            .await;
    };
    let (result, ()) = tokio::join!(client.execute_script("return;"), answer);
    assert!(matches!(result, Err(BridgeError::ExecutionFailed(e)) if e.kind == trustbridge_model::ErrorKind::Proxy));
}

#[tokio::test]
async fn closed_peer_is_a_channel_error() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));
    proxy.channel.close().await;

    let result = client.execute_script("return;").await;
    assert!(matches!(result, Err(BridgeError::Channel(ChannelError::Closed))));
}

#[tokio::test(start_paused = true)]
async fn peer_lost_mid_call_is_a_channel_error() {
    let (mut client, mut proxy) = connect(Duration::from_secs(30));
    let started = tokio::time::Instant::now();

    let vanish = async move {
        proxy.next_request().await;
        drop(proxy);
    };
    let (result, ()) = tokio::join!(client.execute_script("return;"), vanish);

    assert!(matches!(result, Err(BridgeError::Channel(ChannelError::Closed))));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn code_from_the_content_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("answer.tbs"), "return 42;").unwrap();

    let (client_end, proxy_end) = MemoryChannel::pair(16);
    let (tx, mut requests) = unbounded_channel();
    proxy_end.listeners().register(move |message| {
        let _ = tx.send(message.decode_request().unwrap());
        ListenerAction::Keep
    });
    let config = ClientConfig::default().with_content_root(dir.path());
    let mut client = BridgeClient::with_config(Arc::new(client_end), config);

    let answer = async {
        let request = requests.recv().await.unwrap();
        assert_eq!(request.code, "return 42;");
        proxy_end
            .send(Message::response(&value(&request, "42")).unwrap())
            .await
            .unwrap();
    };
    let (result, ()) = tokio::join!(
        client.execute_script_returning_from_file::<i64>("answer.tbs"),
        answer
    );
    assert_eq!(result.unwrap(), 42);

    client.with_using("System.IO");
    assert!(matches!(
        client.execute_script_from_file("../outside.tbs").await,
        Err(BridgeError::Usage(_))
    ));
    assert!(client.context().is_empty());
}
