//! Script-level types.

use std::sync::{Arc, OnceLock};

/// Type of a value or expression.
#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Int32,
    Int64,
    Double,
    Boolean,
    String,
    Array(Box<Type>),
    Struct(Arc<StructType>),
    /// Stand-in after a reported error; compatible with everything.
    Error,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Void, Type::Void)
            | (Type::Int32, Type::Int32)
            | (Type::Int64, Type::Int64)
            | (Type::Double, Type::Double)
            | (Type::Boolean, Type::Boolean)
            | (Type::String, Type::String)
            | (Type::Error, Type::Error) => true,
            (Type::Array(a), Type::Array(b)) => a == b,
            (Type::Struct(a), Type::Struct(b)) => a == b,
            _ => false,
        }
    }
}

impl Type {
    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    /// Fully qualified name, e.g. `System.Int32[]`.
    pub fn name(&self) -> String {
        match self {
            Type::Void => "System.Void".to_string(),
            Type::Int32 => "System.Int32".to_string(),
            Type::Int64 => "System.Int64".to_string(),
            Type::Double => "System.Double".to_string(),
            Type::Boolean => "System.Boolean".to_string(),
            Type::String => "System.String".to_string(),
            Type::Array(element) => format!("{}[]", element.name()),
            Type::Struct(s) => s.name().to_string(),
            Type::Error => "?".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    fn numeric_rank(&self) -> Option<u8> {
        match self {
            Type::Int32 => Some(0),
            Type::Int64 => Some(1),
            Type::Double => Some(2),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Whether a value of `from` converts implicitly to `self`:
    /// identity, or widening along Int32, Int64, Double.
    pub fn accepts(&self, from: &Type) -> bool {
        if self.is_error() || from.is_error() || self == from {
            return true;
        }
        match (from.numeric_rank(), self.numeric_rank()) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        }
    }

    /// The wider of two numeric types.
    pub fn common_numeric(a: &Type, b: &Type) -> Option<Type> {
        let (ra, rb) = (a.numeric_rank()?, b.numeric_rank()?);
        Some(if ra >= rb { a.clone() } else { b.clone() })
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// A struct type. Fields are set once, after every struct of the unit has
/// been declared, so structs may refer to each other.
pub struct StructType {
    name: String,
    fields: OnceLock<Vec<Field>>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fields: OnceLock::new(),
        })
    }

    pub fn with_fields(name: impl Into<String>, fields: Vec<Field>) -> Arc<Self> {
        let ty = Self::new(name);
        ty.define(fields);
        ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns false if the fields were already defined.
    pub fn define(&self, fields: Vec<Field>) -> bool {
        self.fields.set(fields).is_ok()
    }

    pub fn fields(&self) -> &[Field] {
        self.fields.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields().iter().enumerate().find(|(_, f)| f.name == name)
    }
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::fmt::Debug for StructType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "struct {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening() {
        assert!(Type::Int64.accepts(&Type::Int32));
        assert!(Type::Double.accepts(&Type::Int64));
        assert!(!Type::Int32.accepts(&Type::Int64));
        assert!(!Type::String.accepts(&Type::Int32));
        assert!(Type::String.accepts(&Type::Error));
    }

    #[test]
    fn arrays_are_invariant() {
        let ints = Type::array_of(Type::Int32);
        let longs = Type::array_of(Type::Int64);
        assert!(ints.accepts(&ints.clone()));
        assert!(!longs.accepts(&ints));
        assert_eq!(ints.name(), "System.Int32[]");
    }

    #[test]
    fn struct_fields_are_defined_once() {
        let point = StructType::new("Point");
        assert!(point.fields().is_empty());
        assert!(point.define(vec![Field {
            name: "X".into(),
            ty: Type::Int32
        }]));
        assert!(!point.define(Vec::new()));
        assert_eq!(point.field("X").map(|(i, _)| i), Some(0));
        assert_eq!(Type::Struct(point).name(), "Point");
    }

    #[test]
    fn common_numeric_picks_the_wider() {
        assert_eq!(
            Type::common_numeric(&Type::Int32, &Type::Double),
            Some(Type::Double)
        );
        assert_eq!(Type::common_numeric(&Type::Int32, &Type::String), None);
    }
}
