//! Per-call context accumulated through the builder methods.

use serde::Serialize;
use trustbridge_model::{ExecutionRequest, Parameter, ScriptType};

use crate::error::{BridgeError, Result};

/// Parameters, usings and references waiting for the next call.
///
/// Taken in full by every call, so nothing carries over into the one after.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    parameters: Vec<Parameter>,
    usings: Vec<String>,
    references: Vec<String>,
    rejected: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter named `name`. The type name comes from `T` and the
    /// value is serialized as JSON.
    pub fn add_parameter<T>(&mut self, name: &str, value: &T)
    where
        T: ScriptType + Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(json) => self.add_parameter_typed(name, T::type_name(), json),
            Err(e) => self.reject(format!("parameter {} could not be serialized: {}", name, e)),
        }
    }

    /// Add a parameter with an explicit type name and JSON payload.
    pub fn add_parameter_typed(
        &mut self,
        name: &str,
        type_name: impl Into<String>,
        json: impl Into<String>,
    ) {
        self.parameters.push(Parameter::new(name, type_name, json));
    }

    pub fn add_using(&mut self, using: impl Into<String>) {
        push_unique(&mut self.usings, using.into());
    }

    pub fn add_reference(&mut self, reference: impl Into<String>) {
        push_unique(&mut self.references, reference.into());
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn usings(&self) -> &[String] {
        &self.usings
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.usings.is_empty() && self.references.is_empty()
    }

    /// Fold this context into `request`.
    ///
    /// Fails if a builder call was rejected, or if context is attached to a
    /// request kind that does not take any.
    pub fn apply(self, request: ExecutionRequest) -> Result<ExecutionRequest> {
        if let Some(reason) = self.rejected {
            return Err(BridgeError::Usage(reason));
        }
        if !self.is_empty() && request.kind != trustbridge_model::ProgramKind::Script {
            return Err(BridgeError::Usage(format!(
                "{} requests do not accept parameters, usings or references",
                request.kind
            )));
        }

        let request = self
            .parameters
            .into_iter()
            .fold(request, |request, p| request.with_parameter(p));
        let request = self
            .usings
            .into_iter()
            .fold(request, |request, u| request.with_using(u));
        Ok(self
            .references
            .into_iter()
            .fold(request, |request, r| request.with_reference(r)))
    }

    fn reject(&mut self, reason: String) {
        tracing::debug!(%reason, "builder call rejected");
        self.rejected.get_or_insert(reason);
    }
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection_literals::btree;
    use std::collections::BTreeMap;

    #[test]
    fn parameters_take_their_type_from_rust() {
        let mut context = CallContext::new();
        context.add_parameter("count", &3i32);
        context.add_parameter("names", &vec!["a".to_string()]);
        context.add_parameter("label", "hi");

        let names: Vec<(&str, &str, &str)> = context
            .parameters()
            .iter()
            .map(|p| (p.name.as_str(), p.type_name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("count", "System.Int32", "3"),
                ("names", "System.String[]", "[\"a\"]"),
                ("label", "System.String", "\"hi\""),
            ]
        );
    }

    #[test]
    fn usings_and_references_are_deduplicated() {
        let mut context = CallContext::new();
        context.add_using("System.IO");
        context.add_using("System.IO");
        context.add_reference("lib/a.tsl");
        assert_eq!(context.usings(), ["System.IO"]);
        assert_eq!(context.references(), ["lib/a.tsl"]);
    }

    #[test]
    fn apply_folds_into_request() {
        let mut context = CallContext::new();
        context.add_parameter("a", &1i32);
        context.add_using("System.IO");
        context.add_reference("lib/a.tsl");

        let request = context.apply(ExecutionRequest::script("return a;")).unwrap();
        assert_eq!(request.parameters.len(), 1);
        assert_eq!(request.usings, vec!["System.IO"]);
        assert_eq!(request.references, vec!["lib/a.tsl"]);
    }

    #[test]
    fn main_program_rejects_context() {
        let mut context = CallContext::new();
        context.add_using("System.IO");
        assert!(matches!(
            context.apply(ExecutionRequest::main_program("static void Main() { }")),
            Err(BridgeError::Usage(_))
        ));

        assert!(CallContext::new()
            .apply(ExecutionRequest::main_program("static void Main() { }"))
            .is_ok());
    }

    #[test]
    fn unserializable_parameter_is_reported_on_apply() {
        #[derive(Serialize)]
        struct Keyed(BTreeMap<(i32, i32), i32>);
        impl ScriptType for Keyed {
            fn type_name() -> String {
                "Keyed".to_string()
            }
        }

        let mut context = CallContext::new();
        context.add_parameter("k", &Keyed(btree! { (1, 2) => 3 }));
        assert!(context.parameters().is_empty());
        assert!(matches!(
            context.apply(ExecutionRequest::script("return 1;")),
            Err(BridgeError::Usage(_))
        ));
    }
}
