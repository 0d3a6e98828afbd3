//! The `Value` variant: "anything can be a record or a dynamic bag."
//!
//! The codec (in `nrpc-schema`) converts between `Value` and JSON; callers
//! convert between their own Rust record types and `Value` via the
//! `RpcRecord` trait defined there. Keeping `Value` here (schema-agnostic)
//! lets the transport and routing crates speak payloads without depending
//! on the schema registry.

use indexmap::IndexMap;
use serde_json::Map as JsonMap;
use serde_json::Value as Json;

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// The tagged variant every encoded payload reduces to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(ScalarValue),
    /// A named record: `type_name` plus its field values in declaration order.
    Record(String, IndexMap<String, Value>),
    /// `T[]` — a homogeneous list of either scalars or records.
    List(Vec<Value>),
    /// The well-known `dict` type: an opaque JSON object copied verbatim.
    Dynamic(JsonMap<String, Json>),
    /// The `null` case for an absent nested record (decodes to default).
    Null,
}

impl Value {
    pub fn as_record(&self) -> Option<(&str, &IndexMap<String, Value>)> {
        match self {
            Value::Record(name, fields) => Some((name.as_str(), fields)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_dynamic(&self) -> Option<&JsonMap<String, Json>> {
        match self {
            Value::Dynamic(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        let mut fields = IndexMap::new();
        fields.insert("name".to_owned(), Value::Scalar(ScalarValue::Str("c".into())));
        let record = Value::Record("ChildInfo".to_owned(), fields);
        let (name, fields) = record.as_record().expect("record");
        assert_eq!(name, "ChildInfo");
        assert_eq!(fields.len(), 1);

        let list = Value::List(vec![Value::Scalar(ScalarValue::Int(1))]);
        assert_eq!(list.as_list().unwrap().len(), 1);

        assert!(Value::Null.is_null());
    }
}
