//! Runtime values, their JSON form, and explicit conversion between types.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::ValueError;
use crate::types::{StructType, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Int32(i32),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    String(String),
    Array(Vec<Value>),
    Struct(StructValue),
}

/// A struct instance. Fields are stored in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub ty: Arc<StructType>,
    pub fields: Vec<Value>,
}

impl StructValue {
    pub fn get(&self, name: &str) -> Option<&Value> {
        let (index, _) = self.ty.field(name)?;
        self.fields.get(index)
    }

    /// Assign a field by name, widening numerics to the field's type.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        let Some((index, field)) = self.ty.field(name) else {
            return false;
        };
        let value = value.widen(&field.ty);
        match self.fields.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Two numeric operands brought to a common representation.
pub(crate) enum Numbers {
    Int32(i32, i32),
    Int64(i64, i64),
    Double(f64, f64),
}

impl Numbers {
    pub(crate) fn of(a: &Value, b: &Value) -> Option<Numbers> {
        match (a, b) {
            (Value::Int32(x), Value::Int32(y)) => Some(Numbers::Int32(*x, *y)),
            (Value::Double(_), _) | (_, Value::Double(_)) => {
                Some(Numbers::Double(a.as_f64()?, b.as_f64()?))
            }
            _ => Some(Numbers::Int64(a.as_i64()?, b.as_i64()?)),
        }
    }
}

impl Value {
    /// The zero value of `ty`.
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Int32 => Value::Int32(0),
            Type::Int64 => Value::Int64(0),
            Type::Double => Value::Double(0.0),
            Type::Boolean => Value::Boolean(false),
            Type::String => Value::String(String::new()),
            Type::Array(_) => Value::Array(Vec::new()),
            Type::Struct(s) => Value::Struct(StructValue {
                ty: s.clone(),
                fields: s.fields().iter().map(|f| Value::default_for(&f.ty)).collect(),
            }),
            Type::Void | Type::Error => Value::Void,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Runtime type name, for messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Void => "System.Void".to_string(),
            Value::Int32(_) => "System.Int32".to_string(),
            Value::Int64(_) => "System.Int64".to_string(),
            Value::Double(_) => "System.Double".to_string(),
            Value::Boolean(_) => "System.Boolean".to_string(),
            Value::String(_) => "System.String".to_string(),
            Value::Array(items) => match items.first() {
                Some(first) => format!("{}[]", first.type_name()),
                None => "System.Array".to_string(),
            },
            Value::Struct(s) => s.ty.name().to_string(),
        }
    }

    /// Implicit numeric widening to `to`; anything else is returned as is.
    pub fn widen(self, to: &Type) -> Value {
        match (self, to) {
            (Value::Int32(v), Type::Int64) => Value::Int64(i64::from(v)),
            (Value::Int32(v), Type::Double) => Value::Double(f64::from(v)),
            (Value::Int64(v), Type::Double) => Value::Double(v as f64),
            (Value::Array(items), Type::Array(element)) => {
                Value::Array(items.into_iter().map(|v| v.widen(element)).collect())
            }
            (value, _) => value,
        }
    }

    /// Read a value of type `ty` from JSON.
    ///
    /// Missing struct fields take their zero value; `null` reads as an empty
    /// string or array.
    pub fn from_json(ty: &Type, json: &Json) -> Result<Value, ValueError> {
        let mismatch = || ValueError::Json {
            ty: ty.name(),
            found: json_kind(json),
        };

        Ok(match ty {
            Type::Int32 => Value::Int32(
                json.as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(mismatch)?,
            ),
            Type::Int64 => Value::Int64(json.as_i64().ok_or_else(mismatch)?),
            Type::Double => Value::Double(json.as_f64().ok_or_else(mismatch)?),
            Type::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
            Type::String => match json {
                Json::String(s) => Value::String(s.clone()),
                Json::Null => Value::String(String::new()),
                _ => return Err(mismatch()),
            },
            Type::Array(element) => match json {
                Json::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| Value::from_json(element, item))
                        .collect::<Result<_, _>>()?,
                ),
                Json::Null => Value::Array(Vec::new()),
                _ => return Err(mismatch()),
            },
            Type::Struct(s) => match json {
                Json::Object(map) => Value::Struct(StructValue {
                    ty: s.clone(),
                    fields: s
                        .fields()
                        .iter()
                        .map(|field| match map.get(&field.name) {
                            Some(v) => Value::from_json(&field.ty, v),
                            None => Ok(Value::default_for(&field.ty)),
                        })
                        .collect::<Result<_, _>>()?,
                }),
                _ => return Err(mismatch()),
            },
            Type::Void | Type::Error => return Err(mismatch()),
        })
    }

    /// JSON form of the value. `Void` becomes `null`.
    pub fn to_json(&self) -> Result<Json, ValueError> {
        Ok(match self {
            Value::Void => Json::Null,
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .ok_or_else(|| ValueError::NotRepresentable(v.to_string()))?,
            Value::Boolean(b) => Json::Bool(*b),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Struct(s) => {
                let mut map = serde_json::Map::new();
                for (field, value) in s.ty.fields().iter().zip(&s.fields) {
                    map.insert(field.name.clone(), value.to_json()?);
                }
                Json::Object(map)
            }
        })
    }

    /// Explicit conversion to `to`, as `Convert.ChangeType` would do it.
    ///
    /// Doubles round half to even before narrowing to an integer; narrowing
    /// that does not fit is an overflow.
    pub fn convert(self, to: &Type) -> Result<Value, ValueError> {
        let to_name = || to.name();
        let conversion = |from: &Value| ValueError::Conversion {
            from: from.type_name(),
            to: to.name(),
        };

        match (self, to) {
            (Value::Void, _) => Err(ValueError::Conversion {
                from: "System.Void".to_string(),
                to: to_name(),
            }),
            (value, Type::String) => Ok(Value::String(value.to_string())),

            (Value::Int32(v), Type::Int32) => Ok(Value::Int32(v)),
            (Value::Int64(v), Type::Int32) => i32::try_from(v)
                .map(Value::Int32)
                .map_err(|_| overflow(v, to)),
            (Value::Double(v), Type::Int32) => {
                let r = v.round_ties_even();
                if r.is_finite() && r >= f64::from(i32::MIN) && r <= f64::from(i32::MAX) {
                    Ok(Value::Int32(r as i32))
                } else {
                    Err(overflow(v, to))
                }
            }
            (Value::Boolean(b), Type::Int32) => Ok(Value::Int32(i32::from(b))),
            (Value::String(s), Type::Int32) => parse_integer(&s, to).and_then(|v| {
                i32::try_from(v).map(Value::Int32).map_err(|_| overflow(&s, to))
            }),

            (Value::Int32(v), Type::Int64) => Ok(Value::Int64(i64::from(v))),
            (Value::Int64(v), Type::Int64) => Ok(Value::Int64(v)),
            (Value::Double(v), Type::Int64) => {
                let r = v.round_ties_even();
                // i64::MAX is not representable; its f64 neighbour is 2^63.
                if r.is_finite() && r >= -9_223_372_036_854_775_808.0 && r < 9_223_372_036_854_775_808.0 {
                    Ok(Value::Int64(r as i64))
                } else {
                    Err(overflow(v, to))
                }
            }
            (Value::Boolean(b), Type::Int64) => Ok(Value::Int64(i64::from(b))),
            (Value::String(s), Type::Int64) => parse_integer(&s, to).map(Value::Int64),

            (Value::Int32(v), Type::Double) => Ok(Value::Double(f64::from(v))),
            (Value::Int64(v), Type::Double) => Ok(Value::Double(v as f64)),
            (Value::Double(v), Type::Double) => Ok(Value::Double(v)),
            (Value::Boolean(b), Type::Double) => Ok(Value::Double(if b { 1.0 } else { 0.0 })),
            (Value::String(s), Type::Double) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| ValueError::Format {
                    value: s.clone(),
                    to: to_name(),
                }),

            (Value::Boolean(b), Type::Boolean) => Ok(Value::Boolean(b)),
            (Value::Int32(v), Type::Boolean) => Ok(Value::Boolean(v != 0)),
            (Value::Int64(v), Type::Boolean) => Ok(Value::Boolean(v != 0)),
            (Value::Double(v), Type::Boolean) => Ok(Value::Boolean(v != 0.0)),
            (Value::String(s), Type::Boolean) => {
                let t = s.trim();
                if t.eq_ignore_ascii_case("true") {
                    Ok(Value::Boolean(true))
                } else if t.eq_ignore_ascii_case("false") {
                    Ok(Value::Boolean(false))
                } else {
                    Err(ValueError::Format {
                        value: s.clone(),
                        to: to_name(),
                    })
                }
            }

            (Value::Array(items), Type::Array(element)) => items
                .into_iter()
                .map(|item| item.convert(element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            (Value::Struct(s), Type::Struct(target)) if s.ty.name() == target.name() => {
                Ok(Value::Struct(s))
            }

            (value, _) => Err(conversion(&value)),
        }
    }
}

fn parse_integer(s: &str, to: &Type) -> Result<i64, ValueError> {
    let t = s.trim();
    match t.parse::<i64>() {
        Ok(v) => Ok(v),
        Err(_) if !t.is_empty() && t.trim_start_matches(['-', '+']).chars().all(|c| c.is_ascii_digit()) => {
            Err(overflow(s, to))
        }
        Err(_) => Err(ValueError::Format {
            value: s.to_string(),
            to: to.name(),
        }),
    }
}

fn overflow(value: impl std::fmt::Display, to: &Type) -> ValueError {
    ValueError::Overflow {
        value: value.to_string(),
        to: to.name(),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(n) if n.is_f64() => "a fractional number",
        Json::Number(_) => "an integer",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        let sign = if v > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else {
        v.to_string()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => f.write_str(&format_double(*v)),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
            Value::String(s) => f.write_str(s),
            Value::Array(_) | Value::Struct(_) => f.write_str(&self.type_name()),
        }
    }
}
