//! Execution requests.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::call_id::CallId;
use crate::error::{ModelError, Result};

/// What kind of code unit a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramKind {
    /// A fragment evaluated with injected parameters, usings and references,
    /// optionally producing a typed value.
    Script,
    /// A standalone program compiled to an artifact and launched as a new
    /// process.
    MainProgram,
}

impl std::fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramKind::Script => write!(f, "Script"),
            ProgramKind::MainProgram => write!(f, "MainProgram"),
        }
    }
}

/// A named value handed to a script.
///
/// `name` becomes a field of the synthesized carrier, so it has to be a valid
/// identifier. `value` is the JSON text of a value of `type_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: value.into(),
        }
    }
}

/// A request to compile and run a code unit on the privileged side.
///
/// Created fresh per call and never modified once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Echoed back in the result so stale responses can be told apart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,

    pub code: String,

    pub kind: ProgramKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    /// Namespaces imported in addition to the engine defaults (Script only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usings: Vec<String>,

    /// Library paths loaded in addition to the engine defaults (Script only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type_name: Option<String>,
}

impl ExecutionRequest {
    fn new(code: impl Into<String>, kind: ProgramKind) -> Self {
        Self {
            call_id: None,
            code: code.into(),
            kind,
            parameters: Vec::new(),
            usings: Vec::new(),
            references: Vec::new(),
            return_type_name: None,
        }
    }

    /// A Script request with no context.
    pub fn script(code: impl Into<String>) -> Self {
        Self::new(code, ProgramKind::Script)
    }

    /// A MainProgram request.
    pub fn main_program(code: impl Into<String>) -> Self {
        Self::new(code, ProgramKind::MainProgram)
    }

    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = Some(call_id);
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Add a namespace import. Duplicates are ignored.
    pub fn with_using(mut self, using: impl Into<String>) -> Self {
        push_unique(&mut self.usings, using.into());
        self
    }

    /// Add a library reference. Duplicates are ignored.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        push_unique(&mut self.references, reference.into());
        self
    }

    pub fn with_return_type(mut self, type_name: impl Into<String>) -> Self {
        self.return_type_name = Some(type_name.into());
        self
    }

    pub fn has_return_type(&self) -> bool {
        self.return_type_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    /// Whether parameters, usings or references are attached.
    pub fn has_context(&self) -> bool {
        !self.parameters.is_empty() || !self.usings.is_empty() || !self.references.is_empty()
    }

    /// Check the shape of the request before it is sent.
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(ModelError::EmptyCode);
        }

        if self.kind == ProgramKind::MainProgram {
            if self.has_context() {
                return Err(ModelError::ContextNotSupported(self.kind));
            }
            if self.has_return_type() {
                return Err(ModelError::ReturnTypeNotSupported(self.kind));
            }
        }

        let mut seen = BTreeSet::new();
        for parameter in &self.parameters {
            if !is_identifier(&parameter.name) {
                return Err(ModelError::InvalidParameterName(parameter.name.clone()));
            }
            if !seen.insert(parameter.name.as_str()) {
                return Err(ModelError::DuplicateParameter(parameter.name.clone()));
            }
        }

        Ok(())
    }
}

/// Whether `name` is lexically a valid identifier.
///
/// First char: XID_Start or underscore. Rest: XID_Continue.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    if !(unicode_ident::is_xid_start(first) || first == '_') {
        return false;
    }

    chars.all(unicode_ident::is_xid_continue)
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_request_accepts_context() {
        let request = ExecutionRequest::script("return a + b;")
            .with_parameter(Parameter::new("a", "System.Int32", "1"))
            .with_parameter(Parameter::new("b", "System.Int32", "4"))
            .with_using("System.IO")
            .with_return_type("System.Int32");
        assert!(request.validate().is_ok());
        assert!(request.has_return_type());
    }

    #[test]
    fn main_program_rejects_context() {
        let request = ExecutionRequest::main_program("void Main() {}").with_using("System.IO");
        assert!(matches!(
            request.validate(),
            Err(ModelError::ContextNotSupported(ProgramKind::MainProgram))
        ));
    }

    #[test]
    fn main_program_rejects_return_type() {
        let request = ExecutionRequest::main_program("void Main() {}").with_return_type("Int32");
        assert!(matches!(
            request.validate(),
            Err(ModelError::ReturnTypeNotSupported(_))
        ));
    }

    #[test]
    fn empty_code_is_rejected() {
        assert!(matches!(
            ExecutionRequest::script("   ").validate(),
            Err(ModelError::EmptyCode)
        ));
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let request = ExecutionRequest::script("return a;")
            .with_parameter(Parameter::new("a", "Int32", "1"))
            .with_parameter(Parameter::new("a", "Int32", "2"));
        assert!(matches!(
            request.validate(),
            Err(ModelError::DuplicateParameter(name)) if name == "a"
        ));
    }

    #[test]
    fn parameter_names_must_be_identifiers() {
        let request =
            ExecutionRequest::script("return 1;").with_parameter(Parameter::new("1a", "Int32", "1"));
        assert!(matches!(
            request.validate(),
            Err(ModelError::InvalidParameterName(_))
        ));
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("a"));
        assert!(is_identifier("_count"));
        assert!(is_identifier("名前"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn usings_and_references_are_deduplicated() {
        let request = ExecutionRequest::script("return 1;")
            .with_using("System.IO")
            .with_using("System.IO")
            .with_reference("lib/geometry.tbl")
            .with_reference("lib/geometry.tbl");
        assert_eq!(request.usings.len(), 1);
        assert_eq!(request.references.len(), 1);
    }

    #[test]
    fn empty_context_is_omitted_on_the_wire() {
        let json = serde_json::to_value(ExecutionRequest::script("return 1;")).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.get("kind").unwrap(), "Script");
        assert!(!object.contains_key("parameters"));
        assert!(!object.contains_key("returnTypeName"));
    }
}
