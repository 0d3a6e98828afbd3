//! `ChildInfo`/`ParentInfo`/`HelloService` — the record and service types
//! §8's end-to-end scenarios (S1/S2) are written against.
//!
//! `ChildInfo`/`ParentInfo` are ordinary Rust structs; per Design Note
//! "Dynamic reflection -> explicit schema" they attach their wire shape by
//! hand through [`RpcRecord`] rather than through any derive or reflection.

use indexmap::IndexMap;

use nrpc_protocol::{ScalarValue, Value};
use nrpc_schema::{FieldDescriptor, MethodDescriptor, RpcRecord, ServiceDescriptor, TypeDescriptor};
use nrpc_routing::ServiceBinding;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChildInfo {
    pub name: String,
    pub value: i64,
}

impl RpcRecord for ChildInfo {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::new("ChildInfo")
            .with_field(FieldDescriptor::new("name", "str", 1))
            .with_field(FieldDescriptor::new("value", "int", 2))
    }

    fn into_value(self) -> Value {
        let mut fields = IndexMap::new();
        fields.insert("name".to_owned(), Value::Scalar(ScalarValue::Str(self.name)));
        fields.insert("value".to_owned(), Value::Scalar(ScalarValue::Int(self.value)));
        Value::Record("ChildInfo".to_owned(), fields)
    }

    fn from_value(value: &Value) -> Self {
        let Some((_, fields)) = value.as_record() else {
            return Self::default();
        };
        Self {
            name: scalar_str(fields.get("name")),
            value: scalar_int(fields.get("value")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParentInfo {
    pub summary: String,
    pub values: Vec<i64>,
    pub echos: Vec<ChildInfo>,
}

impl RpcRecord for ParentInfo {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::new("ParentInfo")
            .with_field(FieldDescriptor::new("summary", "str", 1))
            .with_field(FieldDescriptor::new("values", "int[]", 2))
            .with_field(FieldDescriptor::new("echos", "ChildInfo[]", 3))
    }

    fn into_value(self) -> Value {
        let mut fields = IndexMap::new();
        fields.insert(
            "summary".to_owned(),
            Value::Scalar(ScalarValue::Str(self.summary)),
        );
        fields.insert(
            "values".to_owned(),
            Value::List(
                self.values
                    .into_iter()
                    .map(|v| Value::Scalar(ScalarValue::Int(v)))
                    .collect(),
            ),
        );
        fields.insert(
            "echos".to_owned(),
            Value::List(self.echos.into_iter().map(ChildInfo::into_value).collect()),
        );
        Value::Record("ParentInfo".to_owned(), fields)
    }

    fn from_value(value: &Value) -> Self {
        let Some((_, fields)) = value.as_record() else {
            return Self::default();
        };
        let values = fields
            .get("values")
            .and_then(Value::as_list)
            .map(|items| items.iter().map(scalar_int_ref).collect())
            .unwrap_or_default();
        let echos = fields
            .get("echos")
            .and_then(Value::as_list)
            .map(|items| items.iter().map(ChildInfo::from_value).collect())
            .unwrap_or_default();
        Self {
            summary: scalar_str(fields.get("summary")),
            values,
            echos,
        }
    }
}

fn scalar_str(value: Option<&Value>) -> String {
    match value {
        Some(Value::Scalar(ScalarValue::Str(s))) => s.clone(),
        _ => String::new(),
    }
}

fn scalar_int(value: Option<&Value>) -> i64 {
    value.map(scalar_int_ref).unwrap_or(0)
}

fn scalar_int_ref(value: &Value) -> i64 {
    match value {
        Value::Scalar(ScalarValue::Int(n)) => *n,
        _ => 0,
    }
}

/// The canonical `HelloService` descriptor S1/S2 are written against:
/// `Hello(ParentInfo) -> ParentInfo`, `Two(dict) -> dict`.
pub fn hello_service_descriptor() -> ServiceDescriptor {
    ServiceDescriptor::new("HelloService")
        .with_method(MethodDescriptor::new("Hello", "ParentInfo", "ParentInfo", 1))
        .with_method(MethodDescriptor::new("Two", "dict", "dict", 2))
}

/// A bound `HelloService`: `Hello` bumps every value by one and rewrites
/// `summary` to `test=<first value>` (echoing `echos` untouched); `Two`
/// echoes its dynamic-object payload verbatim. Matches §8 S1/S2 literally.
pub fn hello_service_binding() -> ServiceBinding {
    ServiceBinding::builder("HelloService")
        .method(
            MethodDescriptor::new("Hello", "ParentInfo", "ParentInfo", 1),
            |request| {
                let parent = ParentInfo::from_value(&request);
                let first = parent.values.first().copied().unwrap_or(0);
                let response = ParentInfo {
                    summary: format!("test={first}"),
                    values: parent.values.into_iter().map(|v| v + 1).collect(),
                    echos: parent.echos,
                };
                response.into_value()
            },
        )
        .method(
            MethodDescriptor::new("Two", "dict", "dict", 2),
            |request| request,
        )
        .build()
}
