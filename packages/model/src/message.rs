//! Named key/value messages carried by the channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::request::ExecutionRequest;
use crate::result::ExecutionResult;

/// Entry holding a serialized [`ExecutionRequest`].
pub const REQUEST_KEY: &str = "ExecutionRequest";

/// Entry holding a serialized [`ExecutionResult`].
pub const RESPONSE_KEY: &str = "ExecutionResult";

/// A message on the duplex channel: named text entries.
///
/// The channel never looks inside the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(BTreeMap<String, String>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wrap a request in a message.
    pub fn request(request: &ExecutionRequest) -> Result<Self> {
        Ok(Self::new().with_entry(REQUEST_KEY, serde_json::to_string(request)?))
    }

    /// Wrap a result in a message.
    pub fn response(result: &ExecutionResult) -> Result<Self> {
        Ok(Self::new().with_entry(RESPONSE_KEY, serde_json::to_string(result)?))
    }

    pub fn is_request(&self) -> bool {
        self.contains(REQUEST_KEY)
    }

    pub fn is_response(&self) -> bool {
        self.contains(RESPONSE_KEY)
    }

    pub fn decode_request(&self) -> Result<ExecutionRequest> {
        let payload = self
            .get(REQUEST_KEY)
            .ok_or(ModelError::MissingEntry(REQUEST_KEY))?;
        Ok(serde_json::from_str(payload)?)
    }

    pub fn decode_response(&self) -> Result<ExecutionResult> {
        let payload = self
            .get(RESPONSE_KEY)
            .ok_or(ModelError::MissingEntry(RESPONSE_KEY))?;
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Parameter;

    #[test]
    fn request_message_carries_one_entry() {
        let request = ExecutionRequest::script("return a;")
            .with_parameter(Parameter::new("a", "Int32", "1"))
            .with_return_type("Int32");
        let message = Message::request(&request).unwrap();

        assert_eq!(message.keys().collect::<Vec<_>>(), vec![REQUEST_KEY]);
        assert!(message.is_request());
        assert!(!message.is_response());
        assert_eq!(message.decode_request().unwrap(), request);
    }

    #[test]
    fn decoding_the_wrong_shape_fails() {
        let message = Message::response(&ExecutionResult::default()).unwrap();
        assert!(matches!(
            message.decode_request(),
            Err(ModelError::MissingEntry(REQUEST_KEY))
        ));
    }

    #[test]
    fn garbage_payload_is_a_codec_error() {
        let message = Message::new().with_entry(RESPONSE_KEY, "{not json");
        assert!(matches!(
            message.decode_response(),
            Err(ModelError::Codec(_))
        ));
    }

    #[test]
    fn message_serializes_as_flat_object() {
        let message = Message::new().with_entry("k", "v");
        assert_eq!(serde_json::to_string(&message).unwrap(), r#"{"k":"v"}"#);
    }
}
