use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use trustbridge_channel::{DuplexChannel, ListenerAction, ListenerId, MemoryChannel};
use trustbridge_engine::{EngineConfig, ExecutionEngine, ProxyService};
use trustbridge_model::{CallId, ErrorKind, ExecutionRequest, ExecutionResult, Message, Parameter};

struct Harness {
    client: MemoryChannel,
    responses: UnboundedReceiver<ExecutionResult>,
    service: ProxyService,
    listener: ListenerId,
}

fn harness() -> Harness {
    let (client, proxy) = MemoryChannel::pair(16);
    let engine = Arc::new(ExecutionEngine::new(EngineConfig {
        working_dir: None,
        ..EngineConfig::default()
    }));
    let service = ProxyService::new(Arc::new(proxy), engine);
    let listener = service.start();

    let (tx, responses) = unbounded_channel();
    client.listeners().register(move |message| {
        let _ = tx.send(message.decode_response().unwrap());
        ListenerAction::Keep
    });

    Harness {
        client,
        responses,
        service,
        listener,
    }
}

async fn next(responses: &mut UnboundedReceiver<ExecutionResult>) -> ExecutionResult {
    tokio::time::timeout(Duration::from_secs(10), responses.recv())
        .await
        .expect("no response in time")
        .expect("channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_request_gets_one_response() {
    let mut h = harness();

    let first = CallId::new();
    let second = CallId::new();
    let slow = ExecutionRequest::script("long total = 0; for (long i = 0; i < 20000; i++) { total += i; } return total;")
        .with_call_id(first)
        .with_return_type("long");
    let fast = ExecutionRequest::script("return a * 2;")
        .with_call_id(second)
        .with_parameter(Parameter::new("a", "int", "21"))
        .with_return_type("int");

    h.client.send(Message::request(&slow).unwrap()).await.unwrap();
    h.client.send(Message::request(&fast).unwrap()).await.unwrap();

    let mut results = vec![next(&mut h.responses).await, next(&mut h.responses).await];
    results.sort_by_key(|r| r.call_id != Some(first));

    assert_eq!(results[0].call_id, Some(first));
    assert_eq!(results[0].serialized_result.as_deref(), Some("199990000"));
    assert_eq!(results[1].call_id, Some(second));
    assert_eq!(results[1].serialized_result.as_deref(), Some("42"));

    assert!(
        tokio::time::timeout(Duration::from_millis(200), h.responses.recv())
            .await
            .is_err(),
        "no extra responses"
    );
}

#[tokio::test]
async fn undecodable_request_gets_a_proxy_error() {
    let mut h = harness();

    h.client
        .send(Message::new().with_entry("ExecutionRequest", "{ not json"))
        .await
        .unwrap();
    let result = next(&mut h.responses).await;
    assert_eq!(result.execution_error.unwrap().kind, ErrorKind::Proxy);
    assert!(result.call_id.is_none());

    h.client
        .send(Message::new().with_entry("Unrelated", "x"))
        .await
        .unwrap();
    let result = next(&mut h.responses).await;
    assert_eq!(result.execution_error.unwrap().kind, ErrorKind::Proxy);
}

#[tokio::test]
async fn stopped_service_ignores_requests() {
    let mut h = harness();
    assert!(h.service.stop(h.listener));
    assert!(!h.service.stop(h.listener));

    let request = ExecutionRequest::script("return 1;").with_return_type("int");
    h.client.send(Message::request(&request).unwrap()).await.unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(200), h.responses.recv())
            .await
            .is_err()
    );
}
