//! JSON encode/decode of [`Value`] against a [`TypeDescriptor`].
//!
//! The codec never coerces a mismatched scalar type (§4.4's hard
//! requirement) except for one documented laxity inherited from the
//! original implementation: an integer JSON number is accepted for a
//! `float` field (booleans remain rejected for numeric fields either way).

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as Json};
use thiserror::Error;

use nrpc_protocol::{ScalarValue, Value};

use crate::descriptor::{FieldType, TypeDescriptor};

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("type `{0}` is not known to this endpoint's schema")]
    UnknownType(String),
    #[error("expected JSON {expected} for field `{field}`, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("expected a JSON array for list field `{0}`")]
    ExpectedArray(String),
    #[error("expected a JSON object for record type `{0}`")]
    ExpectedObject(String),
}

/// Resolves a named type to its descriptor. Implemented by
/// [`crate::SchemaRegistry`]; kept as a trait so the codec doesn't need to
/// know about registry internals.
pub trait TypeResolver {
    fn resolve(&self, type_name: &str) -> Option<&TypeDescriptor>;
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Builds the default-valued instance for a field type, used both for a
/// missing field on decode and for a `null` nested record.
pub fn default_value(resolver: &dyn TypeResolver, field_type: &FieldType) -> Value {
    match field_type {
        FieldType::Int => Value::Scalar(ScalarValue::Int(0)),
        FieldType::Float => Value::Scalar(ScalarValue::Float(0.0)),
        FieldType::Bool => Value::Scalar(ScalarValue::Bool(false)),
        FieldType::Str => Value::Scalar(ScalarValue::Str(String::new())),
        FieldType::Dict => Value::Dynamic(JsonMap::new()),
        FieldType::List(_) => Value::List(Vec::new()),
        FieldType::Named(name) => {
            let Some(descriptor) = resolver.resolve(name) else {
                return Value::Null;
            };
            let mut fields = IndexMap::new();
            for field in descriptor.fields.values().filter(|f| f.local) {
                fields.insert(
                    field.field_name.clone(),
                    default_value(resolver, &field.field_type),
                );
            }
            Value::Record(name.clone(), fields)
        }
    }
}

/// Decodes a JSON payload into a [`Value`] per the declared field type.
pub fn decode(
    resolver: &dyn TypeResolver,
    field_type: &FieldType,
    json: &Json,
) -> Result<Value, CodecError> {
    match field_type {
        FieldType::Int => match json {
            Json::Number(n) if n.is_i64() || n.is_u64() => {
                Ok(Value::Scalar(ScalarValue::Int(n.as_i64().unwrap_or(0))))
            }
            other => Err(CodecError::TypeMismatch {
                field: String::new(),
                expected: "integer",
                found: json_kind(other),
            }),
        },
        FieldType::Float => match json {
            // Documented laxity: an integer JSON number is accepted for a
            // float field (the original implementation's `assign_values`
            // does not distinguish int from float, only rejects bool).
            Json::Number(n) => Ok(Value::Scalar(ScalarValue::Float(n.as_f64().unwrap_or(0.0)))),
            other => Err(CodecError::TypeMismatch {
                field: String::new(),
                expected: "number",
                found: json_kind(other),
            }),
        },
        FieldType::Bool => match json {
            Json::Bool(b) => Ok(Value::Scalar(ScalarValue::Bool(*b))),
            other => Err(CodecError::TypeMismatch {
                field: String::new(),
                expected: "bool",
                found: json_kind(other),
            }),
        },
        FieldType::Str => match json {
            Json::String(s) => Ok(Value::Scalar(ScalarValue::Str(s.clone()))),
            other => Err(CodecError::TypeMismatch {
                field: String::new(),
                expected: "string",
                found: json_kind(other),
            }),
        },
        FieldType::Dict => match json {
            Json::Object(map) => Ok(Value::Dynamic(map.clone())),
            other => Err(CodecError::TypeMismatch {
                field: String::new(),
                expected: "object",
                found: json_kind(other),
            }),
        },
        FieldType::List(inner) => match json {
            Json::Array(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    decoded.push(decode(resolver, inner, item)?);
                }
                Ok(Value::List(decoded))
            }
            other => Err(CodecError::ExpectedArray(json_kind(other).to_owned())),
        },
        FieldType::Named(name) => {
            if json.is_null() {
                return Ok(default_value(resolver, field_type));
            }
            let Json::Object(map) = json else {
                return Err(CodecError::ExpectedObject(name.clone()));
            };
            let descriptor = resolver
                .resolve(name)
                .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
            let mut fields = IndexMap::new();
            for field in descriptor.fields.values() {
                if !field.local {
                    // Learned-from-peer field: no local slot to decode into.
                    continue;
                }
                if !field.field_errors.is_empty() {
                    // Annotated mismatch (e.g. numbering conflict): left
                    // unused rather than decoded against a disagreement.
                    continue;
                }
                let value = match map.get(&field.field_name) {
                    Some(json_value) => decode(resolver, &field.field_type, json_value)
                        .map_err(|e| attach_field_name(e, &field.field_name))?,
                    None => default_value(resolver, &field.field_type),
                };
                fields.insert(field.field_name.clone(), value);
            }
            Ok(Value::Record(name.clone(), fields))
        }
    }
}

fn attach_field_name(err: CodecError, field_name: &str) -> CodecError {
    match err {
        CodecError::TypeMismatch {
            expected, found, ..
        } => CodecError::TypeMismatch {
            field: field_name.to_owned(),
            expected,
            found,
        },
        other => other,
    }
}

/// Encodes a [`Value`] into JSON per the declared field type.
pub fn encode(
    resolver: &dyn TypeResolver,
    field_type: &FieldType,
    value: &Value,
) -> Result<Json, CodecError> {
    match (field_type, value) {
        (FieldType::Int, Value::Scalar(ScalarValue::Int(n))) => Ok(Json::Number((*n).into())),
        (FieldType::Float, Value::Scalar(ScalarValue::Float(f))) => Ok(Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null)),
        (FieldType::Float, Value::Scalar(ScalarValue::Int(n))) => Ok(Json::Number((*n).into())),
        (FieldType::Bool, Value::Scalar(ScalarValue::Bool(b))) => Ok(Json::Bool(*b)),
        (FieldType::Str, Value::Scalar(ScalarValue::Str(s))) => Ok(Json::String(s.clone())),
        (FieldType::Dict, Value::Dynamic(map)) => Ok(Json::Object(map.clone())),
        (FieldType::List(inner), Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode(resolver, inner, item)?);
            }
            Ok(Json::Array(out))
        }
        (FieldType::Named(name), Value::Null) => {
            let _ = name;
            Ok(Json::Null)
        }
        (FieldType::Named(name), Value::Record(_, value_fields)) => {
            let descriptor = resolver
                .resolve(name)
                .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
            let mut out = JsonMap::new();
            for field in descriptor.fields.values() {
                if !field.local || !field.field_errors.is_empty() {
                    continue;
                }
                if let Some(field_value) = value_fields.get(&field.field_name) {
                    if field_value.is_null() {
                        continue;
                    }
                    let encoded = encode(resolver, &field.field_type, field_value)
                        .map_err(|e| attach_field_name(e, &field.field_name))?;
                    out.insert(field.field_name.clone(), encoded);
                }
            }
            Ok(Json::Object(out))
        }
        (expected, found) => Err(CodecError::TypeMismatch {
            field: String::new(),
            expected: expected_kind(expected),
            found: value_kind(found),
        }),
    }
}

fn expected_kind(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Int => "int",
        FieldType::Float => "float",
        FieldType::Bool => "bool",
        FieldType::Str => "str",
        FieldType::Dict => "dict",
        FieldType::Named(_) => "record",
        FieldType::List(_) => "list",
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Scalar(ScalarValue::Int(_)) => "int",
        Value::Scalar(ScalarValue::Float(_)) => "float",
        Value::Scalar(ScalarValue::Bool(_)) => "bool",
        Value::Scalar(ScalarValue::Str(_)) => "str",
        Value::Dynamic(_) => "dict",
        Value::Record(..) => "record",
        Value::List(_) => "list",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;
    use crate::{FieldDescriptor, TypeDescriptor};

    fn registry_with_child() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.declare_type(
            TypeDescriptor::new("ChildInfo")
                .with_field(FieldDescriptor::new("name", "str", 1))
                .with_field(FieldDescriptor::new("value", "int", 2)),
        );
        registry
    }

    #[test]
    fn round_trip_named_record() {
        let registry = registry_with_child();
        let field_type = FieldType::Named("ChildInfo".to_owned());
        let json = serde_json::json!({"name": "c", "value": 555});
        let decoded = decode(&registry, &field_type, &json).unwrap();
        let encoded = encode(&registry, &field_type, &decoded).unwrap();
        assert_eq!(encoded, json);
    }

    #[test]
    fn missing_field_decodes_to_default() {
        let registry = registry_with_child();
        let field_type = FieldType::Named("ChildInfo".to_owned());
        let json = serde_json::json!({"name": "c"});
        let decoded = decode(&registry, &field_type, &json).unwrap();
        let (_, fields) = decoded.as_record().unwrap();
        assert_eq!(
            fields.get("value"),
            Some(&Value::Scalar(ScalarValue::Int(0)))
        );
    }

    #[test]
    fn null_nested_record_becomes_default_and_is_omitted_on_encode() {
        let registry = registry_with_child();
        let field_type = FieldType::Named("ChildInfo".to_owned());
        let decoded = decode(&registry, &field_type, &Json::Null).unwrap();
        let (_, fields) = decoded.as_record().unwrap();
        assert_eq!(
            fields.get("name"),
            Some(&Value::Scalar(ScalarValue::Str(String::new())))
        );
    }

    #[test]
    fn int_accepted_for_float_field_but_bool_rejected() {
        let registry = SchemaRegistry::new();
        let decoded = decode(&registry, &FieldType::Float, &serde_json::json!(3)).unwrap();
        assert_eq!(decoded, Value::Scalar(ScalarValue::Float(3.0)));
        assert!(decode(&registry, &FieldType::Float, &serde_json::json!(true)).is_err());
    }

    #[test]
    fn scalar_type_mismatch_is_a_hard_error() {
        let registry = SchemaRegistry::new();
        assert!(decode(&registry, &FieldType::Int, &serde_json::json!("oops")).is_err());
        assert!(decode(&registry, &FieldType::Str, &serde_json::json!(1)).is_err());
        assert!(decode(&registry, &FieldType::Bool, &serde_json::json!(1)).is_err());
    }

    #[test]
    fn unknown_incoming_keys_are_ignored() {
        let registry = registry_with_child();
        let field_type = FieldType::Named("ChildInfo".to_owned());
        let json = serde_json::json!({"name": "c", "value": 1, "mystery": true});
        let decoded = decode(&registry, &field_type, &json).unwrap();
        let (_, fields) = decoded.as_record().unwrap();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn list_of_records_recurses() {
        let registry = registry_with_child();
        let field_type = FieldType::List(Box::new(FieldType::Named("ChildInfo".to_owned())));
        let json = serde_json::json!([{"name": "a", "value": 1}, {"name": "b", "value": 2}]);
        let decoded = decode(&registry, &field_type, &json).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items.len(), 2);
        let encoded = encode(&registry, &field_type, &decoded).unwrap();
        assert_eq!(encoded, json);
    }

    #[test]
    fn non_local_field_is_skipped_on_encode_and_ignored_on_decode() {
        let mut registry = registry_with_child();
        // Simulate a peer-learned field with no local slot.
        if let Some(descriptor) = registry.type_mut("ChildInfo") {
            descriptor.fields.insert(
                "newonserver".to_owned(),
                FieldDescriptor {
                    field_name: "newonserver".to_owned(),
                    field_type: FieldType::Int,
                    id_value: 3,
                    local: false,
                    field_errors: String::new(),
                },
            );
        }
        let field_type = FieldType::Named("ChildInfo".to_owned());
        let json = serde_json::json!({"name": "c", "value": 1, "newonserver": 99});
        let decoded = decode(&registry, &field_type, &json).unwrap_or_else(|e| panic!("{e}"));
        let (_, fields) = decoded.as_record().unwrap();
        assert!(!fields.contains_key("newonserver"));

        let encoded = encode(&registry, &field_type, &decoded).unwrap();
        assert!(encoded.get("newonserver").is_none());
    }
}
