//! The per-endpoint schema catalog and cross-process reconciliation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::codec::TypeResolver;
use crate::descriptor::{DYNAMIC_OBJECT, FieldDescriptor, FieldType, MethodDescriptor,
    ServiceDescriptor, TypeDescriptor};

/// Flattened, wire-shaped snapshot of one endpoint's schema, transmitted by
/// `GetSchema`/`SetSchema`.
///
/// Mirrors `original_source/nrpc_py/common_base.py`'s `SchemaInfo`: types
/// and services are summarized (name + counts), while fields and methods
/// are carried as flat lists each tagged with their owning type/service
/// name, rather than nested — this is what the original actually puts on
/// the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub types: Vec<SchemaTypeSummary>,
    pub services: Vec<SchemaServiceSummary>,
    pub fields: Vec<SchemaFieldEntry>,
    pub methods: Vec<SchemaMethodEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTypeSummary {
    pub type_name: String,
    pub field_count: usize,
    pub local: bool,
    pub type_errors: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaServiceSummary {
    pub service_name: String,
    pub method_count: usize,
    pub local: bool,
    pub has_server: bool,
    pub service_errors: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFieldEntry {
    pub type_name: String,
    pub field_name: String,
    pub field_type: String,
    pub id_value: i64,
    pub local: bool,
    pub field_errors: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMethodEntry {
    pub service_name: String,
    pub method_name: String,
    pub request_type: String,
    pub response_type: String,
    pub id_value: i64,
    pub local: bool,
    pub method_errors: String,
}

/// The per-endpoint catalog of known types, services, and server bindings.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: IndexMap<String, TypeDescriptor>,
    services: IndexMap<String, ServiceDescriptor>,
}

impl TypeResolver for SchemaRegistry {
    fn resolve(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(type_name)
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: IndexMap::new(),
            services: IndexMap::new(),
        };
        registry.types.insert(
            DYNAMIC_OBJECT.to_owned(),
            TypeDescriptor::new(DYNAMIC_OBJECT),
        );
        registry
    }

    /// Declares a locally-owned type or service. Declarations made this way
    /// are always `local = true` (use [`SchemaRegistry::merge_peer`] for
    /// remote-learned entries).
    pub fn declare_type(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.type_name.clone(), descriptor);
    }

    pub fn declare_service(&mut self, descriptor: ServiceDescriptor) {
        self.services
            .insert(descriptor.service_name.clone(), descriptor);
    }

    pub fn mark_service_bound(&mut self, service_name: &str) {
        if let Some(service) = self.services.get_mut(service_name) {
            service.has_server = true;
        }
    }

    pub fn type_mut(&mut self, type_name: &str) -> Option<&mut TypeDescriptor> {
        self.types.get_mut(type_name)
    }

    pub fn service(&self, service_name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(service_name)
    }

    pub fn service_mut(&mut self, service_name: &str) -> Option<&mut ServiceDescriptor> {
        self.services.get_mut(service_name)
    }

    pub fn method(&self, service_name: &str, method_name: &str) -> Option<&MethodDescriptor> {
        self.services.get(service_name)?.methods.get(method_name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    /// Serializes this registry's current state to the wire-shaped snapshot.
    pub fn get_schema(&self) -> SchemaSnapshot {
        let types = self
            .types
            .values()
            .map(|t| SchemaTypeSummary {
                type_name: t.type_name.clone(),
                field_count: t.fields.len(),
                local: t.local,
                type_errors: t.type_errors.clone(),
            })
            .collect();
        let fields = self
            .types
            .values()
            .flat_map(|t| {
                t.fields.values().map(move |f| SchemaFieldEntry {
                    type_name: t.type_name.clone(),
                    field_name: f.field_name.clone(),
                    field_type: f.field_type.render(),
                    id_value: f.id_value,
                    local: f.local,
                    field_errors: f.field_errors.clone(),
                })
            })
            .collect();
        let services = self
            .services
            .values()
            .map(|s| SchemaServiceSummary {
                service_name: s.service_name.clone(),
                method_count: s.methods.len(),
                local: s.local,
                has_server: s.has_server,
                service_errors: s.service_errors.clone(),
            })
            .collect();
        let methods = self
            .services
            .values()
            .flat_map(|s| {
                s.methods.values().map(move |m| SchemaMethodEntry {
                    service_name: s.service_name.clone(),
                    method_name: m.method_name.clone(),
                    request_type: m.request_type.render(),
                    response_type: m.response_type.render(),
                    id_value: m.id_value,
                    local: m.local,
                    method_errors: m.method_errors.clone(),
                })
            })
            .collect();

        SchemaSnapshot {
            types,
            services,
            fields,
            methods,
        }
    }

    /// Merges a peer's schema snapshot into this registry.
    ///
    /// Implements the reconciliation contract of §4.5: new peer-only
    /// types/services/fields/methods are inserted as `local = false`;
    /// entries present on both sides are checked for `id_value` agreement,
    /// with disagreements annotated rather than raised as errors.
    pub fn merge_peer(&mut self, peer: &SchemaSnapshot) {
        for peer_type in &peer.types {
            self.types
                .entry(peer_type.type_name.clone())
                .or_insert_with(|| {
                    let mut t = TypeDescriptor::new(peer_type.type_name.clone());
                    t.local = false;
                    t
                });
        }
        for peer_service in &peer.services {
            self.services
                .entry(peer_service.service_name.clone())
                .or_insert_with(|| {
                    let mut s = ServiceDescriptor::new(peer_service.service_name.clone());
                    s.local = false;
                    s
                });
        }
        self.find_new_fields(&peer.fields);
        self.find_new_methods(&peer.methods);
        self.find_missing_methods(&peer.methods);
    }

    /// Inserts peer-only fields as `local = false`; for fields present on
    /// both sides, annotates an `id_value` disagreement (same name,
    /// different id) or a duplicate-id collision (different name, same id)
    /// without aborting.
    pub fn find_new_fields(&mut self, peer_fields: &[SchemaFieldEntry]) {
        for peer_field in peer_fields {
            let Some(type_descriptor) = self.types.get_mut(&peer_field.type_name) else {
                continue;
            };
            match type_descriptor.fields.get_mut(&peer_field.field_name) {
                Some(local_field) => {
                    if local_field.id_value != peer_field.id_value {
                        let message = format!(
                            "numbering mismatch: local id {} vs peer id {}",
                            local_field.id_value, peer_field.id_value
                        );
                        local_field.field_errors = message.clone();
                    }
                }
                None => {
                    if let Some(duplicate) = type_descriptor
                        .fields
                        .values_mut()
                        .find(|f| f.id_value == peer_field.id_value)
                    {
                        duplicate.field_errors = format!(
                            "duplicate id {} also used by peer field `{}`",
                            peer_field.id_value, peer_field.field_name
                        );
                    }
                    let mut field = FieldDescriptor::new(
                        peer_field.field_name.clone(),
                        &peer_field.field_type,
                        peer_field.id_value,
                    );
                    field.local = false;
                    type_descriptor
                        .fields
                        .insert(field.field_name.clone(), field);
                }
            }
        }
    }

    /// Inserts peer-only methods as `local = false`, annotating id
    /// disagreements the same way [`Self::find_new_fields`] does for fields.
    pub fn find_new_methods(&mut self, peer_methods: &[SchemaMethodEntry]) {
        for peer_method in peer_methods {
            let Some(service) = self.services.get_mut(&peer_method.service_name) else {
                continue;
            };
            match service.methods.get_mut(&peer_method.method_name) {
                Some(local_method) => {
                    if local_method.id_value != peer_method.id_value {
                        local_method.method_errors = format!(
                            "numbering mismatch: local id {} vs peer id {}",
                            local_method.id_value, peer_method.id_value
                        );
                    }
                }
                None => {
                    if let Some(duplicate) = service
                        .methods
                        .values_mut()
                        .find(|m| m.id_value == peer_method.id_value)
                    {
                        duplicate.method_errors = format!(
                            "duplicate id {} also used by peer method `{}`",
                            peer_method.id_value, peer_method.method_name
                        );
                    }
                    let mut method = MethodDescriptor::new(
                        peer_method.method_name.clone(),
                        &peer_method.request_type,
                        &peer_method.response_type,
                        peer_method.id_value,
                    );
                    method.local = false;
                    service.methods.insert(method.method_name.clone(), method);
                }
            }
        }
    }

    /// Annotates local methods that the peer never declared — "missing
    /// methods" from the peer's point of view, surfaced locally so a caller
    /// can see the mismatch without having to inspect the peer's schema.
    pub fn find_missing_methods(&mut self, peer_methods: &[SchemaMethodEntry]) {
        for service in self.services.values_mut() {
            if !service.local {
                continue;
            }
            for method in service.methods.values_mut() {
                if !method.local {
                    continue;
                }
                let present_on_peer = peer_methods.iter().any(|m| {
                    m.service_name == service.service_name && m.method_name == method.method_name
                });
                if !present_on_peer && method.method_errors.is_empty() {
                    method.method_errors = "not declared by peer".to_owned();
                }
            }
        }
    }

    pub fn as_resolver(&self) -> &dyn TypeResolver {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MethodDescriptor as Method;

    fn child_type(id: i64) -> TypeDescriptor {
        TypeDescriptor::new("ChildInfo")
            .with_field(FieldDescriptor::new("name", "str", 1))
            .with_field(FieldDescriptor::new("value", "int", id))
    }

    #[test]
    fn forward_compatible_divergence_adds_fields_both_sides_without_errors() {
        let mut client = SchemaRegistry::new();
        client.declare_type(child_type(2).with_field(FieldDescriptor::new("newonclient", "int", 4)));

        let mut server = SchemaRegistry::new();
        server.declare_type(child_type(2).with_field(FieldDescriptor::new("newonserver", "int", 3)));

        let server_schema = server.get_schema();
        client.merge_peer(&server_schema);
        let client_schema = client.get_schema();
        server.merge_peer(&client_schema);

        let client_child = client.resolve("ChildInfo").unwrap();
        assert!(client_child.fields.contains_key("newonserver"));
        assert!(!client_child.fields.get("newonserver").unwrap().local);
        assert_eq!(client_child.fields.get("newonserver").unwrap().field_errors, "");

        let server_child = server.resolve("ChildInfo").unwrap();
        assert!(server_child.fields.contains_key("newonclient"));
        assert_eq!(server_child.fields.get("newonclient").unwrap().field_errors, "");
    }

    #[test]
    fn id_mismatch_is_annotated_on_both_sides_without_aborting() {
        let mut client = SchemaRegistry::new();
        client.declare_type(child_type(2));

        let mut server = SchemaRegistry::new();
        server.declare_type(child_type(99));

        let server_schema = server.get_schema();
        client.merge_peer(&server_schema);
        let client_schema = client.get_schema();
        server.merge_peer(&client_schema);

        let client_field = &client.resolve("ChildInfo").unwrap().fields["value"];
        assert!(client_field.field_errors.contains("numbering mismatch"));
        let server_field = &server.resolve("ChildInfo").unwrap().fields["value"];
        assert!(server_field.field_errors.contains("numbering mismatch"));
    }

    #[test]
    fn missing_method_on_peer_is_annotated_locally() {
        let mut client = SchemaRegistry::new();
        client.declare_service(
            ServiceDescriptor::new("HelloService")
                .with_method(Method::new("Hello", "ParentInfo", "ParentInfo", 1)),
        );

        let server = SchemaRegistry::new();
        let server_schema = server.get_schema();
        client.find_missing_methods(&server_schema.methods);

        let method = &client.service("HelloService").unwrap().methods["Hello"];
        assert_eq!(method.method_errors, "not declared by peer");
    }
}
