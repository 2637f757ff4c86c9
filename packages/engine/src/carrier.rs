//! Parameter carrier synthesizer.
//!
//! A request's parameters become the fields of a struct generated for that
//! request. The struct is declared as TrustScript source and compiled by the
//! same front end that compiles the script, so a script reads parameter `a`
//! simply as the variable `a`.

use std::sync::Arc;

use trustbridge_model::Parameter;
use trustbridge_script::{
    compile_struct, is_keyword, resolve_type_name, Library, StructType, StructValue, Type, Value,
};

use crate::error::CarrierError;

/// Name of every generated carrier struct.
pub const CARRIER_TYPE: &str = "Carrier";

/// A generated carrier type and its populated instance.
#[derive(Debug, Clone)]
pub struct Carrier {
    ty: Arc<StructType>,
    value: StructValue,
}

impl Carrier {
    pub fn ty(&self) -> &Arc<StructType> {
        &self.ty
    }

    /// The populated instance.
    pub fn value(&self) -> Value {
        Value::Struct(self.value.clone())
    }

    /// The value of the field for parameter `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    pub fn into_parts(self) -> (Arc<StructType>, Value) {
        (self.ty, Value::Struct(self.value))
    }
}

/// A declared carrier struct, not yet holding any parameter value.
#[derive(Debug, Clone)]
pub struct CarrierType {
    ty: Arc<StructType>,
    types: Vec<Type>,
}

impl CarrierType {
    pub fn ty(&self) -> &Arc<StructType> {
        &self.ty
    }

    /// Read each parameter's payload into a new instance.
    ///
    /// `parameters` must be the ones the type was declared from.
    pub fn populate(&self, parameters: &[Parameter]) -> Result<Carrier, CarrierError> {
        let mut value = StructValue {
            ty: self.ty.clone(),
            fields: self.ty.fields().iter().map(|f| Value::default_for(&f.ty)).collect(),
        };
        for (parameter, ty) in parameters.iter().zip(&self.types) {
            let field = read_value(parameter, ty)?;
            value.set(&parameter.name, field);
        }

        tracing::debug!(fields = parameters.len(), "carrier populated");
        Ok(Carrier {
            ty: self.ty.clone(),
            value,
        })
    }
}

/// Declare the carrier struct for `parameters`, resolving type names
/// against `libraries` in order. No payload is read.
///
/// Every type is resolved before anything is generated, so an unknown type
/// produces no carrier at all.
pub fn declare(
    parameters: &[Parameter],
    libraries: &[Arc<Library>],
) -> Result<CarrierType, CarrierError> {
    let mut types = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let ty = resolve_type_name(libraries, &parameter.type_name).ok_or_else(|| {
            CarrierError::UnknownType {
                type_name: parameter.type_name.clone(),
            }
        })?;
        if is_keyword(&parameter.name) || !trustbridge_model::is_identifier(&parameter.name) {
            return Err(CarrierError::InvalidName(parameter.name.clone()));
        }
        types.push(ty);
    }

    let fragment = declaration(parameters, &types);
    tracing::trace!(%fragment, "carrier declaration");
    let ty = compile_struct(&fragment, libraries).map_err(|diagnostics| {
        let message = diagnostics
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        CarrierError::Declaration(message)
    })?;

    Ok(CarrierType { ty, types })
}

/// Declare and populate in one step.
pub fn synthesize(
    parameters: &[Parameter],
    libraries: &[Arc<Library>],
) -> Result<Carrier, CarrierError> {
    declare(parameters, libraries)?.populate(parameters)
}

fn declaration(parameters: &[Parameter], types: &[Type]) -> String {
    let mut fragment = format!("struct {} {{\n", CARRIER_TYPE);
    for (parameter, ty) in parameters.iter().zip(types) {
        fragment.push_str(&format!("    {} {};\n", ty.name(), parameter.name));
    }
    fragment.push('}');
    fragment
}

fn read_value(parameter: &Parameter, ty: &Type) -> Result<Value, CarrierError> {
    let invalid = |message: String| CarrierError::Value {
        name: parameter.name.clone(),
        message,
    };
    let json: serde_json::Value =
        serde_json::from_str(&parameter.value).map_err(|e| invalid(e.to_string()))?;
    Value::from_json(ty, &json).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> Vec<Arc<Library>> {
        vec![Library::standard()]
    }

    #[test]
    fn fields_follow_parameters() {
        let parameters = vec![
            Parameter::new("a", "System.Int32", "1"),
            Parameter::new("names", "System.String[]", r#"["x","y"]"#),
            Parameter::new("ratio", "Double", "0.25"),
        ];
        let carrier = synthesize(&parameters, &standard()).unwrap();

        assert_eq!(carrier.ty().name(), CARRIER_TYPE);
        let fields: Vec<&str> = carrier.ty().fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["a", "names", "ratio"]);

        assert_eq!(carrier.get("a"), Some(&Value::Int32(1)));
        assert_eq!(
            carrier.get("names"),
            Some(&Value::Array(vec![
                Value::String("x".into()),
                Value::String("y".into())
            ]))
        );
        assert_eq!(carrier.get("ratio"), Some(&Value::Double(0.25)));
    }

    #[test]
    fn unknown_type_produces_no_carrier() {
        let parameters = vec![
            Parameter::new("a", "System.Int32", "1"),
            Parameter::new("w", "Acme.Widget", "{}"),
        ];
        match synthesize(&parameters, &standard()) {
            Err(CarrierError::UnknownType { type_name }) => assert_eq!(type_name, "Acme.Widget"),
            other => panic!("expected an unknown type, got {:?}", other),
        }
    }

    #[test]
    fn keyword_names_are_rejected() {
        let parameters = vec![Parameter::new("while", "System.Int32", "1")];
        assert!(matches!(
            synthesize(&parameters, &standard()),
            Err(CarrierError::InvalidName(name)) if name == "while"
        ));
    }

    #[test]
    fn payload_must_match_type() {
        let parameters = vec![Parameter::new("a", "System.Int32", "\"one\"")];
        assert!(matches!(
            synthesize(&parameters, &standard()),
            Err(CarrierError::Value { name, .. }) if name == "a"
        ));

        let parameters = vec![Parameter::new("a", "System.Int32", "{oops")];
        assert!(matches!(
            synthesize(&parameters, &standard()),
            Err(CarrierError::Value { .. })
        ));
    }

    #[test]
    fn declaring_reads_no_payload() {
        let parameters = vec![Parameter::new("a", "System.Int32", "\"oops\"")];
        let declared = declare(&parameters, &standard()).unwrap();
        assert_eq!(declared.ty().fields()[0].ty, Type::Int32);

        assert!(matches!(
            declared.populate(&parameters),
            Err(CarrierError::Value { name, .. }) if name == "a"
        ));
        let parameters = vec![Parameter::new("a", "System.Int32", "12")];
        let carrier = declared.populate(&parameters).unwrap();
        assert_eq!(carrier.get("a"), Some(&Value::Int32(12)));
    }

    #[test]
    fn declaration_uses_full_type_names() {
        let parameters = vec![Parameter::new("n", "long", "3")];
        let fragment = declaration(&parameters, &[Type::Int64]);
        assert_eq!(fragment, "struct Carrier {\n    System.Int64 n;\n}");
    }
}
