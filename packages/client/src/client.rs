//! The correlation engine.
//!
//! ```text
//!  call ──▶ apply context ──▶ register waiter ──▶ send ──▶ ┬─ response ──▶ result
//!                                                          └─ deadline ──▶ Timeout
//! ```
//!
//! A call owns its waiter from send until resolution. The channel listener
//! can only hand it a response; whichever of response and deadline comes
//! first wins, and the listener is gone afterwards either way.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::Instrument;
use trustbridge_channel::{ChannelError, DuplexChannel, ListenerAction};
use trustbridge_model::{
    CallId, DiagnosticsExt, ErrorKind, ExecutionRequest, ExecutionResult, Message, ModelError,
    ScriptType,
};

use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::error::{BridgeError, Result};
use crate::source::ContentRoot;

/// Sends execution requests to the privileged process.
///
/// At most one call is in flight per client: every call borrows the client
/// mutably until it resolves.
pub struct BridgeClient {
    channel: Arc<dyn DuplexChannel>,
    config: ClientConfig,
    context: CallContext,
}

impl BridgeClient {
    pub fn new(channel: Arc<dyn DuplexChannel>) -> Self {
        Self::with_config(channel, ClientConfig::default())
    }

    pub fn with_config(channel: Arc<dyn DuplexChannel>, config: ClientConfig) -> Self {
        Self {
            channel,
            config,
            context: CallContext::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Context waiting for the next call.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Pass `value` to the next script as `name`.
    pub fn with_parameter<T>(&mut self, name: &str, value: &T) -> &mut Self
    where
        T: ScriptType + Serialize + ?Sized,
    {
        self.context.add_parameter(name, value);
        self
    }

    /// Pass a JSON payload of type `type_name` to the next script as `name`.
    pub fn with_parameter_typed(
        &mut self,
        name: &str,
        type_name: impl Into<String>,
        json: impl Into<String>,
    ) -> &mut Self {
        self.context.add_parameter_typed(name, type_name, json);
        self
    }

    pub fn with_using(&mut self, using: impl Into<String>) -> &mut Self {
        self.context.add_using(using);
        self
    }

    pub fn with_usings<I, S>(&mut self, usings: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for using in usings {
            self.context.add_using(using);
        }
        self
    }

    pub fn with_reference(&mut self, reference: impl Into<String>) -> &mut Self {
        self.context.add_reference(reference);
        self
    }

    pub fn with_references<I, S>(&mut self, references: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reference in references {
            self.context.add_reference(reference);
        }
        self
    }

    /// Run a script for its side effects.
    pub async fn execute_script(&mut self, code: impl Into<String>) -> Result<ExecutionResult> {
        self.call(ExecutionRequest::script(code)).await
    }

    /// Run a script and decode its value as `T`.
    pub async fn execute_script_returning<T>(&mut self, code: impl Into<String>) -> Result<T>
    where
        T: ScriptType + DeserializeOwned,
    {
        let request = ExecutionRequest::script(code).with_return_type(T::type_name());
        let result = self.call(request).await?;
        let payload = result
            .serialized_result
            .ok_or(ModelError::MissingEntry("serializedResult"))?;
        Ok(serde_json::from_str(&payload).map_err(ModelError::from)?)
    }

    /// Compile and launch a standalone program.
    pub async fn execute_main_program(&mut self, code: impl Into<String>) -> Result<ExecutionResult> {
        self.call(ExecutionRequest::main_program(code)).await
    }

    pub async fn execute_script_from_file(&mut self, path: impl AsRef<Path>) -> Result<ExecutionResult> {
        let code = self.read_source(path.as_ref()).await?;
        self.execute_script(code).await
    }

    pub async fn execute_script_returning_from_file<T>(&mut self, path: impl AsRef<Path>) -> Result<T>
    where
        T: ScriptType + DeserializeOwned,
    {
        let code = self.read_source(path.as_ref()).await?;
        self.execute_script_returning(code).await
    }

    pub async fn execute_main_program_from_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<ExecutionResult> {
        let code = self.read_source(path.as_ref()).await?;
        self.execute_main_program(code).await
    }

    /// Send `request` with the accumulated context and map the result onto
    /// [`BridgeError`].
    ///
    /// The context is cleared whatever the outcome.
    pub async fn call(&mut self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let context = std::mem::take(&mut self.context);
        let request = context.apply(request)?;
        request
            .validate()
            .map_err(|e| BridgeError::Usage(e.to_string()))?;

        let result = self.exchange(request).await?;
        interpret(result)
    }

    /// Send `request` as is and wait for its result.
    ///
    /// Fails only if no result arrives: timeout, transport or codec. A
    /// request without a call id gets a fresh one.
    pub async fn exchange(&mut self, mut request: ExecutionRequest) -> Result<ExecutionResult> {
        let call_id = *request.call_id.get_or_insert_with(CallId::new);
        let span = tracing::info_span!("call", %call_id, kind = %request.kind);
        self.exchange_inner(call_id, request).instrument(span).await
    }

    async fn exchange_inner(&mut self, call_id: CallId, request: ExecutionRequest) -> Result<ExecutionResult> {
        let message = Message::request(&request)?;

        let (tx, rx) = oneshot::channel();
        let mut waiter = Some(tx);
        let listeners = self.channel.listeners();
        let listener = listeners.register(move |message| {
            if !message.is_response() {
                return ListenerAction::Keep;
            }
            let decoded = message.decode_response();
            if let Ok(result) = &decoded {
                if result.call_id.is_some_and(|id| id != call_id) {
                    tracing::debug!(stale = ?result.call_id, "dropping response to another call");
                    return ListenerAction::Keep;
                }
            }
            if let Some(tx) = waiter.take() {
                let _ = tx.send(decoded);
            }
            ListenerAction::Remove
        });

        tracing::info!("sending request");
        if let Err(error) = self.channel.send(message).await {
            listeners.deregister(listener);
            tracing::warn!(%error, "request could not be sent");
            return Err(error.into());
        }

        let outcome = tokio::time::timeout(self.config.timeout, rx).await;
        if listeners.deregister(listener) {
            tracing::debug!("waiter listener removed");
        }

        match outcome {
            Ok(Ok(decoded)) => {
                let result = decoded?;
                tracing::info!(
                    compiled = result.compiled_successfully(),
                    success = result.success(),
                    "response received"
                );
                Ok(result)
            }
            Ok(Err(_)) => Err(ChannelError::Closed.into()),
            Err(_) => {
                tracing::warn!(timeout = ?self.config.timeout, "no response before the deadline");
                Err(BridgeError::Timeout(self.config.timeout))
            }
        }
    }

    async fn read_source(&mut self, path: &Path) -> Result<String> {
        let root = match &self.config.content_root {
            Some(root) => ContentRoot::new(root.clone()),
            None => {
                self.context = CallContext::new();
                return Err(BridgeError::Usage("no content root configured".to_string()));
            }
        };
        match root.read(path).await {
            Ok(code) => Ok(code),
            Err(error) => {
                self.context = CallContext::new();
                Err(error)
            }
        }
    }
}

/// Map a remote result onto the error taxonomy.
fn interpret(result: ExecutionResult) -> Result<ExecutionResult> {
    if let Some(compilation) = &result.compilation_result {
        if compilation.diagnostics.has_errors() {
            return Err(BridgeError::CompilationFailed {
                diagnostics: compilation.diagnostics.clone(),
            });
        }
    }

    match result.execution_error {
        None => Ok(result),
        Some(error) if error.kind == ErrorKind::TypeResolution => Err(BridgeError::TypeResolution(error)),
        Some(error) => Err(BridgeError::ExecutionFailed(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustbridge_model::{CompilationResult, Diagnostic, ErrorDescriptor};

    #[test]
    fn interpret_maps_each_outcome() {
        let ok = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![
            Diagnostic::warning("W0001", "unused"),
        ]));
        assert!(interpret(ok).is_ok());

        let broken = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![
            Diagnostic::error("E1001", "expected ';'"),
        ]));
        assert!(matches!(
            interpret(broken),
            Err(BridgeError::CompilationFailed { diagnostics }) if diagnostics.len() == 1
        ));

        let threw = ExecutionResult::compiled(CompilationResult::from_diagnostics(vec![]))
            .with_error(ErrorDescriptor::execution("boom"));
        assert!(matches!(interpret(threw), Err(BridgeError::ExecutionFailed(_))));

        let unknown = ExecutionResult::failed(ErrorDescriptor::type_resolution("Acme.Widget"));
        assert!(matches!(interpret(unknown), Err(BridgeError::TypeResolution(_))));

        let proxy = ExecutionResult::failed(ErrorDescriptor::proxy("request could not be decoded"));
        assert!(matches!(interpret(proxy), Err(BridgeError::ExecutionFailed(_))));
    }
}
