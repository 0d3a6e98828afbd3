//! Type, field, service and method descriptors.
//!
//! The runtime never introspects a host language's class/method attributes
//! (Design Note "Dynamic reflection -> explicit schema"): every record and
//! service is described by an explicit, developer-authored descriptor. The
//! [`RpcRecord`] trait is how a Rust type attaches its descriptor.

use indexmap::IndexMap;

/// The well-known type name for the dynamic-object ("dict") type: an
/// opaque key/value bag copied verbatim, never schema-checked.
pub const DYNAMIC_OBJECT: &str = "dict";

/// A field's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Str,
    /// The dynamic-object type; carries no nested schema.
    Dict,
    /// A named record type, resolved against the registry at encode/decode time.
    Named(String),
    /// `T[]` — a homogeneous list of the inner type.
    List(Box<FieldType>),
}

impl FieldType {
    /// Parses the spec's string encoding (`int`, `float`, `bool`, `str`,
    /// `dict`, a bare type name, or `T[]`).
    pub fn parse(raw: &str) -> Self {
        if let Some(inner) = raw.strip_suffix("[]") {
            return FieldType::List(Box::new(FieldType::parse(inner)));
        }
        match raw {
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "bool" => FieldType::Bool,
            "str" => FieldType::Str,
            DYNAMIC_OBJECT => FieldType::Dict,
            other => FieldType::Named(other.to_owned()),
        }
    }

    /// Renders back to the spec's string encoding.
    pub fn render(&self) -> String {
        match self {
            FieldType::Int => "int".to_owned(),
            FieldType::Float => "float".to_owned(),
            FieldType::Bool => "bool".to_owned(),
            FieldType::Str => "str".to_owned(),
            FieldType::Dict => DYNAMIC_OBJECT.to_owned(),
            FieldType::Named(name) => name.clone(),
            FieldType::List(inner) => format!("{}[]", inner.render()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    pub fn named(&self) -> Option<&str> {
        match self {
            FieldType::Named(name) => Some(name.as_str()),
            FieldType::List(inner) => inner.named(),
            _ => None,
        }
    }
}

/// One declared field of a [`TypeDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field_name: String,
    pub field_type: FieldType,
    /// Per-type-unique stable identifier.
    pub id_value: i64,
    /// `true` when declared by this endpoint, `false` when learned from a peer.
    pub local: bool,
    /// Non-empty when reconciliation found a disagreement with a peer.
    pub field_errors: String,
}

impl FieldDescriptor {
    pub fn new(field_name: impl Into<String>, field_type: &str, id_value: i64) -> Self {
        Self {
            field_name: field_name.into(),
            field_type: FieldType::parse(field_type),
            id_value,
            local: true,
            field_errors: String::new(),
        }
    }
}

/// A named record type: an ordered map of fields, keyed and iterated by
/// declaration order (matching the original `ClassInfo`'s ordered-dict
/// semantics).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDescriptor {
    pub type_name: String,
    pub fields: IndexMap<String, FieldDescriptor>,
    pub local: bool,
    pub type_errors: String,
}

impl TypeDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
            local: true,
            type_errors: String::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.insert(field.field_name.clone(), field);
        self
    }
}

/// One declared method of a [`ServiceDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub method_name: String,
    pub request_type: FieldType,
    pub response_type: FieldType,
    pub id_value: i64,
    pub local: bool,
    pub method_errors: String,
}

impl MethodDescriptor {
    pub fn new(
        method_name: impl Into<String>,
        request_type: &str,
        response_type: &str,
        id_value: i64,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            request_type: FieldType::parse(request_type),
            response_type: FieldType::parse(response_type),
            id_value,
            local: true,
            method_errors: String::new(),
        }
    }

    pub fn is_broken(&self) -> bool {
        !self.method_errors.is_empty()
    }
}

/// A named service: an ordered map of methods.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub methods: IndexMap<String, MethodDescriptor>,
    pub local: bool,
    pub service_errors: String,
    /// Whether a handler instance is bound locally for this service.
    pub has_server: bool,
}

impl ServiceDescriptor {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            methods: IndexMap::new(),
            local: true,
            service_errors: String::new(),
            has_server: false,
        }
    }

    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.insert(method.method_name.clone(), method);
        self
    }
}

/// Attaches a [`TypeDescriptor`] to a Rust record type and converts it to
/// and from the schema-agnostic [`nrpc_protocol::Value`] the codec works
/// with.
///
/// Per Design Note "Dynamic reflection -> explicit schema", the runtime
/// never introspects a struct's fields; each record type declares its own
/// descriptor and conversion explicitly. This is ordinary boilerplate a
/// developer writes once per record type (three short methods), the same
/// way the grounding repo's protocol types are plain `serde`-derived
/// structs rather than introspected at runtime.
pub trait RpcRecord: Sized {
    fn type_descriptor() -> TypeDescriptor;
    fn into_value(self) -> nrpc_protocol::Value;
    fn from_value(value: &nrpc_protocol::Value) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_parse_render_round_trip() {
        for raw in ["int", "float", "bool", "str", "dict", "ChildInfo", "ChildInfo[]", "int[]"] {
            assert_eq!(FieldType::parse(raw).render(), raw);
        }
    }

    #[test]
    fn named_extracts_through_list() {
        assert_eq!(
            FieldType::parse("ChildInfo[]").named(),
            Some("ChildInfo")
        );
        assert_eq!(FieldType::parse("int[]").named(), None);
        assert_eq!(FieldType::parse("ChildInfo").named(), Some("ChildInfo"));
    }
}
