//! S3 — Schema divergence, forward compatible: client and server each
//! declare `ChildInfo` with one extra field the other doesn't know about.
//! After connect-time reconciliation both sides list both fields and
//! neither carries an error annotation.

use nrpc::{FieldDescriptor, SchemaRegistry, ServiceDescriptor, TypeDescriptor};

fn child_info_with_extra(field_name: &str, field_id: i64) -> TypeDescriptor {
    TypeDescriptor::new("ChildInfo")
        .with_field(FieldDescriptor::new("name", "str", 1))
        .with_field(FieldDescriptor::new("value", "int", 2))
        .with_field(FieldDescriptor::new(field_name, "int", field_id))
}

fn registry_with(type_descriptor: TypeDescriptor) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.declare_type(type_descriptor);
    registry.declare_service(ServiceDescriptor::new("HelloService"));
    registry
}

#[tokio::test]
async fn divergent_fields_merge_without_errors_on_either_side() {
    let server_registry = registry_with(child_info_with_extra("newonserver", 3));
    let server = nrpc_test_utils::start_server(server_registry, vec![])
        .await
        .expect("server bind failed");
    let addr = server.local_addr();

    let client_registry = registry_with(child_info_with_extra("newonclient", 4));
    let client = nrpc_test_utils::start_client(addr, "client-s3", client_registry, vec![])
        .await
        .expect("client connect failed");

    let client_schema = client.schema_snapshot().await;
    let client_fields: Vec<_> = client_schema
        .fields
        .iter()
        .filter(|f| f.type_name == "ChildInfo")
        .collect();
    assert!(client_fields.iter().any(|f| f.field_name == "newonclient"));
    assert!(client_fields.iter().any(|f| f.field_name == "newonserver"));
    assert!(client_fields.iter().all(|f| f.field_errors.is_empty()));

    let server_schema = server.schema_snapshot().await;
    let server_fields: Vec<_> = server_schema
        .fields
        .iter()
        .filter(|f| f.type_name == "ChildInfo")
        .collect();
    assert!(server_fields.iter().any(|f| f.field_name == "newonclient"));
    assert!(server_fields.iter().any(|f| f.field_name == "newonserver"));
    assert!(server_fields.iter().all(|f| f.field_errors.is_empty()));
}
