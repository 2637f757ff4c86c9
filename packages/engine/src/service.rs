//! Request-serving loop of the privileged process.
//!
//! Every inbound message is a request. Each one gets its own worker task so
//! a slow script never delays the next message, and each one is answered
//! with exactly one response, whatever goes wrong.

use std::sync::Arc;

use tokio::runtime::Handle;
use trustbridge_channel::{DuplexChannel, ListenerAction, ListenerId};
use trustbridge_model::{CallId, ErrorDescriptor, ExecutionResult, Message};

use crate::engine::ExecutionEngine;

/// Serves execution requests arriving on a channel.
pub struct ProxyService {
    channel: Arc<dyn DuplexChannel>,
    engine: Arc<ExecutionEngine>,
}

impl ProxyService {
    pub fn new(channel: Arc<dyn DuplexChannel>, engine: Arc<ExecutionEngine>) -> Self {
        Self { channel, engine }
    }

    /// Start answering requests. Workers are spawned on the current tokio
    /// runtime; must be called from within one.
    pub fn start(&self) -> ListenerId {
        let runtime = Handle::current();
        let channel = self.channel.clone();
        let engine = self.engine.clone();

        let id = self.channel.listeners().register(move |message| {
            let worker = handle(channel.clone(), engine.clone(), message.clone());
            runtime.spawn(worker);
            ListenerAction::Keep
        });
        tracing::info!(%id, "proxy service started");
        id
    }

    /// Stop answering new requests. Workers already running still reply.
    pub fn stop(&self, id: ListenerId) -> bool {
        let stopped = self.channel.listeners().deregister(id);
        if stopped {
            tracing::info!(%id, "proxy service stopped");
        }
        stopped
    }
}

async fn handle(channel: Arc<dyn DuplexChannel>, engine: Arc<ExecutionEngine>, message: Message) {
    let result = match message.decode_request() {
        Ok(request) => {
            let call_id = request.call_id;
            let execution = tokio::spawn(async move { engine.execute(request).await });
            match execution.await {
                Ok(result) => result,
                Err(error) => {
                    tracing::error!(call_id = ?call_id, %error, "request worker failed");
                    proxy_failure(call_id, "request handler failed", error.to_string())
                }
            }
        }
        Err(error) => {
            tracing::error!(%error, "undecodable request");
            proxy_failure(None, "request could not be decoded", error.to_string())
        }
    };
    respond(channel.as_ref(), &result).await;
}

fn proxy_failure(call_id: Option<CallId>, message: &str, detail: String) -> ExecutionResult {
    ExecutionResult::failed(ErrorDescriptor::proxy(message).with_detail(detail)).with_call_id(call_id)
}

async fn respond(channel: &dyn DuplexChannel, result: &ExecutionResult) {
    let message = match Message::response(result) {
        Ok(message) => message,
        Err(error) => {
            tracing::error!(%error, "result could not be encoded");
            let fallback = proxy_failure(result.call_id, "result could not be encoded", error.to_string());
            match Message::response(&fallback) {
                Ok(message) => message,
                Err(_) => return,
            }
        }
    };

    match channel.send(message).await {
        Ok(()) => tracing::debug!(call_id = ?result.call_id, "response sent"),
        Err(error) => tracing::warn!(call_id = ?result.call_id, %error, "response could not be sent"),
    }
}
